//! Determine which blocks must be fetched to connect the [Tree] to the last accepted block.

use crate::{
    interval::{get_block, Tree},
    storage::Database,
    Block, Error, Parser,
};
use std::collections::BTreeSet;

/// Returns the identifiers of the blocks that should be fetched to attempt to make a single
/// contiguous range from `(last_accepted, highest tracked height]`.
///
/// Only the parent of the lowest block of each disconnected interval is returned, rather than
/// every block in every gap. Fetching a parent either closes its gap or reveals the next parent
/// to fetch.
///
/// For example, if the tree contains heights `[1, 4, 6, 7]` and `last_accepted` is 2, the
/// identifiers of the blocks at heights 3 and 5 are returned.
///
/// An empty set means the tree is either empty or a single interval starting at
/// `last_accepted + 1`, and can be executed.
pub async fn missing_blocks<D: Database, P: Parser>(
    db: &D,
    parser: &P,
    tree: &Tree,
    last_accepted: u64,
) -> Result<BTreeSet<<P::Block as Block>::Digest>, Error> {
    let next = last_accepted.saturating_add(1);
    let mut missing = BTreeSet::new();
    for interval in tree.flatten() {
        if interval.lower <= next {
            continue;
        }

        let bytes = get_block(db, interval.lower).await?;
        let block = parser.parse(bytes).await?;
        missing.insert(block.parent());
    }
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        interval::add,
        mocks::{self, Ledger},
        storage::{self, memory::Memory},
    };
    use commonware_macros::test_traced;
    use commonware_runtime::{deterministic, Runner};
    use std::collections::BTreeSet;

    #[test_traced]
    fn test_one_parent_per_disconnected_interval() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let ledger = Ledger::default();
            let parser = mocks::Parser::new(&ledger);
            let chain = mocks::chain(&ledger, 10);
            let mut db = Memory::default();
            let mut tree = Tree::new();
            for height in [1, 4, 6, 7] {
                add(&mut db, &mut tree, 2, &chain[height]).await.unwrap();
            }

            // Height 1 is below the last accepted height and is never tracked, 7 is interior
            let missing = missing_blocks(&db, &parser, &tree, 2).await.unwrap();
            assert_eq!(
                missing,
                BTreeSet::from([chain[3].id(), chain[5].id()])
            );
            assert!(!missing.contains(&chain[6].id()));
        });
    }

    #[test_traced]
    fn test_empty_only_when_contiguous() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let ledger = Ledger::default();
            let parser = mocks::Parser::new(&ledger);
            let chain = mocks::chain(&ledger, 20);
            let mut db = Memory::default();
            let mut tree = Tree::new();

            // Empty tree
            assert!(missing_blocks(&db, &parser, &tree, 5)
                .await
                .unwrap()
                .is_empty());

            // Connected run
            for height in 6..=10 {
                add(&mut db, &mut tree, 5, &chain[height]).await.unwrap();
            }
            assert!(missing_blocks(&db, &parser, &tree, 5)
                .await
                .unwrap()
                .is_empty());

            // A disconnected run above it
            for height in 12..=15 {
                add(&mut db, &mut tree, 5, &chain[height]).await.unwrap();
            }
            assert_eq!(
                missing_blocks(&db, &parser, &tree, 5).await.unwrap(),
                BTreeSet::from([chain[11].id()])
            );

            // Closing the gap
            add(&mut db, &mut tree, 5, &chain[11]).await.unwrap();
            assert!(missing_blocks(&db, &parser, &tree, 5)
                .await
                .unwrap()
                .is_empty());

            // The same run is disconnected from a lower last accepted height
            assert_eq!(
                missing_blocks(&db, &parser, &tree, 3).await.unwrap(),
                BTreeSet::from([chain[5].id()])
            );
        });
    }

    #[test_traced]
    fn test_storage_failure_aborts() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let ledger = Ledger::default();
            let parser = mocks::Parser::new(&ledger);
            let chain = mocks::chain(&ledger, 10);
            let mut db = Memory::default();
            let mut tree = Tree::new();
            add(&mut db, &mut tree, 0, &chain[5]).await.unwrap();

            db.close();
            assert!(matches!(
                missing_blocks(&db, &parser, &tree, 0).await,
                Err(Error::Storage(storage::Error::Closed))
            ));
        });
    }

    #[test_traced]
    fn test_parse_failure_aborts() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let ledger = Ledger::default();
            let parser = mocks::Parser::new(&ledger);
            let chain = mocks::chain(&ledger, 10);
            let mut db = Memory::default();
            let mut tree = Tree::new();
            add(&mut db, &mut tree, 0, &chain[3]).await.unwrap();
            add(&mut db, &mut tree, 0, &chain[5]).await.unwrap();

            // Corrupt the block at the start of the second interval
            db.put(crate::interval::blocks::block_key(5), vec![0u8; 3])
                .await
                .unwrap();
            assert!(matches!(
                missing_blocks(&db, &parser, &tree, 0).await,
                Err(Error::Malformed(_))
            ));
        });
    }
}
