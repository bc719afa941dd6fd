//! Own the state of a single bootstrapping attempt and drive fetching and execution.
//!
//! If storage, verification, or acceptance fails midway through [Bootstrapper::deliver] or
//! [Bootstrapper::execute], the in-memory [Tree] may no longer match what was persisted (and some
//! blocks may have been accepted). The bootstrapper is then poisoned: every later call returns
//! [Error::Poisoned] and a new attempt must be initialized from storage with the ledger's last
//! accepted height.

use crate::{
    acceptor::ParseAcceptor,
    executor::{self, Summary},
    interval::Tree,
    linker::process,
    missing::missing_blocks,
    storage::Database,
    utils::estimate_eta,
    Acceptor, Block, Config, Error, Metrics, Parser,
};
use bytes::Bytes;
use commonware_runtime::{Clock, Metrics as RuntimeMetrics};
use std::{
    collections::{BTreeSet, HashMap},
    future::Future,
    time::SystemTime,
};
use tracing::{debug, info};

type Digest<P> = <<P as Parser>::Block as Block>::Digest;

/// Drives a single bootstrapping attempt.
///
/// The bootstrapper owns all state of the attempt (the [Tree] of pending blocks, the set of
/// blocks to fetch, and the last accepted height). Every operation that mutates this state takes
/// `&mut self`, so deliveries and execution can never interleave.
///
/// The caller is responsible for fetching the blocks in [Bootstrapper::missing] from peers and
/// passing the responses to [Bootstrapper::deliver]. Once nothing is missing,
/// [Bootstrapper::execute] verifies and accepts all pending blocks.
pub struct Bootstrapper<E, D, P, A>
where
    E: Clock + RuntimeMetrics,
    D: Database,
    P: Parser,
    A: Acceptor<Digest<P>>,
{
    context: E,
    config: Config,
    db: D,
    parser: ParseAcceptor<P, A>,

    tree: Tree,
    missing: BTreeSet<Digest<P>>,
    last_accepted: u64,
    poisoned: bool,

    // Fetch progress
    target: Option<u64>,
    started: SystemTime,
    pending_at_start: u64,
    next_log: SystemTime,

    metrics: Metrics,
}

impl<E, D, P, A> Bootstrapper<E, D, P, A>
where
    E: Clock + RuntimeMetrics,
    D: Database,
    P: Parser,
    A: Acceptor<Digest<P>>,
{
    /// Recover any pending blocks from `db` and determine which blocks are missing.
    ///
    /// Every block accepted by [Bootstrapper::execute] is first passed to `acceptor`.
    pub async fn init(
        context: E,
        config: Config,
        db: D,
        parser: P,
        acceptor: A,
        last_accepted: u64,
    ) -> Result<Self, Error> {
        let metrics = Metrics::init(&context);
        let parser = ParseAcceptor::new(parser, acceptor, metrics.accepted.clone());
        let tree = Tree::init(&db).await?;
        let missing = missing_blocks(&db, &parser, &tree, last_accepted).await?;
        info!(
            last_accepted,
            pending = tree.len(),
            intervals = tree.flatten().len(),
            missing = missing.len(),
            "initialized bootstrapper"
        );

        let started = context.current();
        Ok(Self {
            next_log: started + config.log_period,
            context,
            config,
            db,
            parser,
            pending_at_start: tree.len(),
            tree,
            missing,
            last_accepted,
            poisoned: false,
            target: None,
            started,
            metrics,
        })
    }

    /// Request the block with the given identifier (e.g. the accepted frontier reported by peers).
    ///
    /// Returns false if the block was already requested.
    pub fn want(&mut self, id: Digest<P>) -> bool {
        self.missing.insert(id)
    }

    /// Set the height being bootstrapped to, used to estimate the time until fetching completes.
    pub fn target(&mut self, height: u64) {
        self.target = Some(height);
        self.update_fetch_eta();
    }

    /// Returns the identifiers of the blocks that must be fetched.
    pub fn missing(&self) -> &BTreeSet<Digest<P>> {
        &self.missing
    }

    /// Returns the heights of all pending blocks.
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Returns the height of the last accepted block.
    pub fn last_accepted(&self) -> u64 {
        self.last_accepted
    }

    /// Recompute the missing blocks from the pending blocks in storage.
    ///
    /// Requests added with [Bootstrapper::want] that are not needed to fill a gap are dropped.
    pub async fn refresh(&mut self) -> Result<(), Error> {
        if self.poisoned {
            return Err(Error::Poisoned);
        }
        self.missing = missing_blocks(&self.db, &self.parser, &self.tree, self.last_accepted).await?;
        Ok(())
    }

    /// Process a response to a request for a missing block.
    ///
    /// The first entry of `response` must be the requested block. Any further entries are treated as
    /// candidate ancestors, which are linked without being fetched again. Responses that cannot be
    /// parsed or that start with a block that was not requested are dropped.
    ///
    /// Returns the identifier of the next block to fetch, if the delivered chain did not connect to
    /// the last accepted block or to another pending block.
    pub async fn deliver(&mut self, response: Vec<Bytes>) -> Result<Option<Digest<P>>, Error> {
        if self.poisoned {
            return Err(Error::Poisoned);
        }
        let mut blocks = Vec::with_capacity(response.len());
        for bytes in response {
            match self.parser.parse(bytes).await {
                Ok(block) => blocks.push(block),
                Err(err) => {
                    debug!(?err, "dropping malformed response");
                    return Ok(None);
                }
            }
        }

        let mut blocks = blocks.into_iter();
        let Some(block) = blocks.next() else {
            debug!("dropping empty response");
            return Ok(None);
        };
        if !self.missing.contains(&block.id()) {
            debug!(id = %block.id(), height = block.height(), "dropping unrequested block");
            return Ok(None);
        }
        let ancestors: HashMap<_, _> = blocks.map(|block| (block.id(), block)).collect();

        let before = self.tree.len();
        let next = process(
            &mut self.db,
            &mut self.tree,
            &block,
            &ancestors,
            &mut self.missing,
            self.last_accepted,
        )
        .await
        .inspect_err(|_| self.poisoned = true)?;
        let fetched = self.tree.len() - before;
        self.metrics.fetched.inc_by(fetched);
        if let Some(parent) = next {
            self.missing.insert(parent);
        }
        debug!(
            height = block.height(),
            fetched,
            missing = self.missing.len(),
            "processed response"
        );
        self.update_fetch_eta();
        Ok(next)
    }

    /// Execute all pending blocks.
    ///
    /// Returns [Error::Unresolved] if any block is still missing. Execution halts early (after
    /// persisting its progress) once `stop` resolves.
    ///
    /// If execution fails, some blocks may have been accepted and the bootstrapper is poisoned. The
    /// caller should start a new attempt from the ledger's last accepted height.
    pub async fn execute<S: Future + Unpin>(&mut self, stop: S) -> Result<Summary, Error> {
        self.refresh().await?;
        if !self.missing.is_empty() {
            return Err(Error::Unresolved(self.missing.len()));
        }
        self.metrics.fetch_eta.set(0);

        let summary = executor::execute(
            &self.context,
            &self.config,
            &mut self.db,
            &self.parser,
            &mut self.tree,
            self.last_accepted,
            stop,
        )
        .await
        .inspect_err(|_| self.poisoned = true)?;
        self.last_accepted = summary.last_accepted;
        Ok(summary)
    }

    /// Update the fetch ETA (and log progress, if due).
    fn update_fetch_eta(&mut self) {
        let Some(target) = self.target else {
            return;
        };
        let total = target
            .saturating_sub(self.last_accepted)
            .saturating_sub(self.pending_at_start);
        let fetched = self.tree.len().saturating_sub(self.pending_at_start);
        let now = self.context.current();
        let elapsed = now.duration_since(self.started).unwrap_or_default();
        let Some(eta) = estimate_eta(elapsed, fetched, total) else {
            return;
        };
        self.metrics
            .fetch_eta
            .set(i64::try_from(eta.as_nanos()).unwrap_or(i64::MAX));

        if now >= self.next_log {
            info!(fetched, total, ?eta, "fetching blocks");
            self.next_log = now + self.config.log_period;
        }
    }
}
