//! Mock implementations of the traits consumed by the bootstrapper.

mod block;
pub use block::{chain, Block, Digest, Parser};
mod ledger;
pub use ledger::{Ledger, StopAfter};
mod indexer;
pub use indexer::Indexer;
