//! Execute the pending blocks tracked by a [Tree].
//!
//! Execution starts once [crate::missing::missing_blocks] reports that nothing is missing, at which
//! point the tree is either empty or a single interval starting just above the last accepted block.
//! Blocks are read from storage in height order, verified, and accepted. Their removal from
//! storage is batched (every [Config::batch_write_period] blocks) so that progress survives a
//! restart without a write per block.
//!
//! # Snapshots
//!
//! Storage cursors observe the store as of their acquisition. To avoid pinning an old revision for
//! the duration of execution, the cursor is released and reacquired every
//! [Config::cursor_release_period] blocks. Pending deletions are always written before the cursor is
//! reacquired, so the new cursor begins at the first block that has not yet been processed.

use crate::{
    interval::{self, Tree},
    storage::{Batch, Cursor as _, Database},
    utils::estimate_eta,
    Block, Config, Error, Parser,
};
use commonware_runtime::Clock;
use futures::FutureExt;
use std::future::Future;
use tracing::{debug, info};

/// Result of a call to [execute].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Summary {
    /// Number of pending blocks removed from the tree (including those already accepted).
    pub processed: u64,

    /// Number of blocks verified and accepted.
    pub accepted: u64,

    /// Height of the last accepted block after execution.
    pub last_accepted: u64,

    /// Whether execution returned early because `stop` resolved.
    pub stopped: bool,
}

/// Write `batch` if any blocks were processed since the last write.
async fn flush<D: Database>(db: &mut D, batch: &mut Batch, pending: &mut usize) -> Result<(), Error> {
    if *pending == 0 {
        return Ok(());
    }
    *pending = 0;
    db.write(std::mem::take(batch)).await?;
    Ok(())
}

/// Execute all blocks tracked by `tree`.
///
/// Blocks at or below `last_accepted` are removed from the tree without being executed. Any
/// failure to verify or accept a block is fatal.
///
/// `stop` is polled (without blocking) before each block. Once it resolves, execution halts after
/// writing any pending deletions, leaving the remaining blocks in storage for a later call.
pub async fn execute<E, D, P, S>(
    context: &E,
    config: &Config,
    db: &mut D,
    parser: &P,
    tree: &mut Tree,
    last_accepted: u64,
    mut stop: S,
) -> Result<Summary, Error>
where
    E: Clock,
    D: Database,
    P: Parser,
    S: Future + Unpin,
{
    let mut batch = Batch::new();
    let mut since_write = 0;
    let mut since_release = 0;
    let mut cursor = interval::cursor(db)?;

    let start = context.current();
    let mut next_log = start + config.log_period;
    let total = tree.len();
    let mut summary = Summary {
        processed: 0,
        accepted: 0,
        last_accepted,
        stopped: false,
    };
    info!(total, "executing blocks");

    loop {
        if (&mut stop).now_or_never().is_some() {
            summary.stopped = true;
            break;
        }
        let Some((_, bytes)) = cursor.next().await? else {
            break;
        };
        let block = parser.parse(bytes).await?;
        let height = block.height();
        interval::remove(&mut batch, tree, height);
        summary.processed += 1;

        // Periodically write the batch to bound the deletions held in memory
        since_write += 1;
        if since_write >= config.batch_write_period.get() {
            flush(db, &mut batch, &mut since_write).await?;
        }

        // Periodically reacquire the cursor to avoid pinning an old revision of the store.
        // The batch must be written first, otherwise the new cursor would return blocks that
        // were already processed.
        since_release += 1;
        if since_release >= config.cursor_release_period.get() {
            flush(db, &mut batch, &mut since_write).await?;
            since_release = 0;
            drop(cursor);
            cursor = interval::cursor(db)?;
        }

        let now = context.current();
        if now >= next_log {
            let executed = total - tree.len();
            let elapsed = now.duration_since(start).unwrap_or_default();
            let eta = estimate_eta(elapsed, executed, total);
            info!(executed, total, ?eta, "executing blocks");
            next_log = now + config.log_period;
        }

        if height <= last_accepted {
            debug!(height, last_accepted, "skipping accepted block");
            continue;
        }

        block.verify().await.map_err(|err| Error::Verify {
            id: block.id().to_string(),
            height,
            source: Box::new(err),
        })?;
        block.accept().await.map_err(|err| Error::Accept {
            id: block.id().to_string(),
            height,
            source: Box::new(err),
        })?;
        summary.accepted += 1;
        summary.last_accepted = height;
    }
    flush(db, &mut batch, &mut since_write).await?;

    let elapsed = context
        .current()
        .duration_since(start)
        .unwrap_or_default();
    info!(
        executed = total - tree.len(),
        total,
        ?elapsed,
        stopped = summary.stopped,
        "executed blocks"
    );
    Ok(summary)
}
