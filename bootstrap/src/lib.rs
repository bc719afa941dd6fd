//! Backfill, link, and execute historical blocks before joining consensus.
//!
//! # Overview
//!
//! A node that has fallen behind (or is starting from scratch) must obtain and execute every
//! block between its last accepted block and the tip of the chain before it can participate in
//! consensus. Blocks arrive out of order and in fragments from many peers, so the bootstrapper
//! keeps every delivered block in a pending store and tracks the heights it holds as a set of
//! disjoint, non-adjacent [interval::Interval]s.
//!
//! The pieces fit together as follows:
//!
//! - [interval::Tree]: the heights that are stored but not yet executed.
//! - [missing::missing_blocks]: the parent of the lowest block of every interval that is not yet
//!   connected to the last accepted block. Fetching these is enough to eventually close every gap.
//! - [linker::process]: folds a delivered block (and any of its ancestors delivered alongside it)
//!   into the tree in a single walk, returning the next parent to request.
//! - [executor::execute]: once no blocks are missing, drains the tree in height order, verifying
//!   and accepting each block.
//! - [acceptor]: decorates blocks so that acceptance is reported to an external [Acceptor].
//! - [Bootstrapper]: owns the state of a single attempt and drives the above.
//!
//! # Durability
//!
//! Pending blocks and interval bounds are written to a [storage::Database] in atomic batches. After a
//! restart, [interval::Tree::init] recovers the tree from storage and the bootstrapper resumes from
//! wherever it left off. Blocks are only removed from storage (in batches) after they are accepted, so
//! at worst a few already-accepted blocks are found below the last accepted height after an unclean
//! shutdown. These are skipped during execution.
//!
//! # Status
//!
//! `commonware-bootstrap` is **ALPHA** software and is not yet recommended for production use. Developers should
//! expect breaking changes and occasional instability.

use bytes::Bytes;
use commonware_cryptography::Digest;
use std::future::Future;
use thiserror::Error;

pub mod acceptor;
mod bootstrapper;
pub use bootstrapper::Bootstrapper;
mod config;
pub use config::Config;
pub mod executor;
pub mod interval;
pub mod linker;
mod metrics;
pub use metrics::Metrics;
pub mod missing;
pub mod storage;
mod utils;
pub use utils::estimate_eta;

#[cfg(test)]
pub mod mocks;

/// Errors that can occur while bootstrapping.
#[derive(Debug, Error)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(#[from] storage::Error),
    #[error("malformed block: {0}")]
    Malformed(#[from] commonware_codec::Error),
    #[error("invalid block: {0}")]
    Invalid(String),
    #[error("acceptor failed: {0}")]
    Acceptor(String),
    #[error("missing block at height {0}")]
    MissingBlock(u64),
    #[error("{0} blocks still missing")]
    Unresolved(usize),
    #[error("bootstrapper poisoned by a failed execution")]
    Poisoned,
    #[error("failed to verify block {id} ({height}) in bootstrapping: {source}")]
    Verify {
        id: String,
        height: u64,
        source: Box<Error>,
    },
    #[error("failed to accept block {id} ({height}) in bootstrapping: {source}")]
    Accept {
        id: String,
        height: u64,
        source: Box<Error>,
    },
}

/// A block that can be verified and accepted during bootstrapping.
pub trait Block: Send + Sync + 'static {
    /// Identifier of the block.
    type Digest: Digest;

    /// Returns the identifier of the block.
    fn id(&self) -> Self::Digest;

    /// Returns the identifier of the block's parent.
    fn parent(&self) -> Self::Digest;

    /// Returns the height of the block (genesis is 0).
    fn height(&self) -> u64;

    /// Returns the raw bytes of the block (as accepted by [Parser::parse]).
    fn bytes(&self) -> Bytes;

    /// Check that the block is valid on top of its (already accepted) parent.
    fn verify(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Accept the block, making it part of the ledger.
    fn accept(&self) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Converts raw bytes into a [Block].
pub trait Parser: Clone + Send + Sync + 'static {
    /// Block produced by the parser.
    type Block: Block;

    /// Parse `bytes`, returning [Error::Malformed] if they do not encode a block.
    fn parse(&self, bytes: Bytes) -> impl Future<Output = Result<Self::Block, Error>> + Send;
}

/// Receives every block accepted during bootstrapping before the block itself is accepted.
///
/// This is typically used to drive chain-level side effects, like indexing. If [Acceptor::accept]
/// returns an error, the block is not accepted and bootstrapping is aborted.
pub trait Acceptor<D: Digest>: Clone + Send + Sync + 'static {
    /// Called with the identifier and bytes of a block that is about to be accepted.
    fn accept(&self, id: D, bytes: Bytes) -> impl Future<Output = Result<(), Error>> + Send;
}
