//! Fold delivered blocks (and their locally available ancestors) into the [Tree].

use crate::{
    interval::{add, Tree},
    storage::Database,
    Block, Error,
};
use std::collections::{BTreeSet, HashMap};

/// Process a series of consecutive blocks starting at `block`, walking down through `ancestors`.
///
/// Each block visited is removed from `missing` (even if it was already tracked) and added to
/// `tree`. The walk stops as soon as a block does not need its parent (it connects to the last
/// accepted block or to an interval already in the tree) or the parent is not in `ancestors`.
///
/// Returns the identifier of the parent that should be fetched next, if any.
pub async fn process<D: Database, B: Block>(
    db: &mut D,
    tree: &mut Tree,
    block: &B,
    ancestors: &HashMap<B::Digest, B>,
    missing: &mut BTreeSet<B::Digest>,
    last_accepted: u64,
) -> Result<Option<B::Digest>, Error> {
    let mut block = block;
    loop {
        // Ancestors may themselves have been requested, so every block in the walk is
        // cleared from the missing set (not just the first)
        missing.remove(&block.id());

        if !add(db, tree, last_accepted, block).await? {
            return Ok(None);
        }

        let parent = block.parent();
        match ancestors.get(&parent) {
            Some(ancestor) => block = ancestor,
            None => return Ok(Some(parent)),
        }
    }
}
