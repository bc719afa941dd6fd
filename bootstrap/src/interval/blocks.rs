//! Store pending blocks alongside the [Tree] that tracks them.

use super::Tree;
use crate::{
    storage::{Batch, Database},
    Block, Error,
};
use bytes::{BufMut, Bytes};
use commonware_codec::{FixedSize, Write};

/// Prefix of the keys used to persist pending blocks.
const BLOCK_PREFIX: u8 = 0;

/// Returns the key under which the block at `height` is stored.
pub fn block_key(height: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + u64::SIZE);
    key.put_u8(BLOCK_PREFIX);
    height.write(&mut key);
    key
}

/// Returns the bytes of the pending block at `height`.
pub async fn get_block<D: Database>(db: &D, height: u64) -> Result<Bytes, Error> {
    db.get(&block_key(height))
        .await?
        .ok_or(Error::MissingBlock(height))
}

/// Returns a cursor over all pending blocks in ascending height order.
pub fn cursor<D: Database>(db: &D) -> Result<D::Cursor, Error> {
    Ok(db.cursor(&[BLOCK_PREFIX])?)
}

/// Store `block` and add its height to `tree` in a single atomic write.
///
/// Blocks at or below `last_accepted` and blocks already in the tree are ignored.
///
/// Returns true if the parent of `block` is still needed: the block is now the lowest height of
/// its interval and that interval is not yet connected to `last_accepted`.
pub async fn add<D: Database, B: Block>(
    db: &mut D,
    tree: &mut Tree,
    last_accepted: u64,
    block: &B,
) -> Result<bool, Error> {
    let height = block.height();
    let next = last_accepted.saturating_add(1);
    if height < next || tree.contains(height) {
        return Ok(false);
    }

    let mut batch = Batch::new();
    batch.put(block_key(height), block.bytes());
    tree.insert(&mut batch, height);
    db.write(batch).await?;

    // The block must be present, so its interval starts at the block when the height
    // below it is not tracked
    Ok(height != next && !tree.contains(height - 1))
}

/// Remove the block at `height` from `tree`, queuing the deletion of its bytes (and any interval
/// changes) in `batch`.
pub fn remove(batch: &mut Batch, tree: &mut Tree, height: u64) {
    batch.delete(block_key(height));
    tree.remove(batch, height);
}
