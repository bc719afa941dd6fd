use super::Digest;
use crate::Error;
use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
};

#[derive(Default)]
struct State {
    tip: u64,
    verified: Vec<u64>,
    accepted: Vec<(u64, Digest)>,
}

/// Records the blocks verified and accepted by mock blocks.
///
/// Acceptance must proceed one height at a time on top of the tip.
#[derive(Clone, Default)]
pub struct Ledger {
    state: Arc<Mutex<State>>,
}

impl Ledger {
    /// Create a ledger that has already accepted every height up to `tip`.
    pub fn new(tip: u64) -> Self {
        let ledger = Self::default();
        ledger.state.lock().unwrap().tip = tip;
        ledger
    }

    /// Height of the last accepted block.
    pub fn tip(&self) -> u64 {
        self.state.lock().unwrap().tip
    }

    /// Heights verified, in call order.
    pub fn verified(&self) -> Vec<u64> {
        self.state.lock().unwrap().verified.clone()
    }

    /// Heights accepted, in call order.
    pub fn accepted(&self) -> Vec<u64> {
        self.state
            .lock()
            .unwrap()
            .accepted
            .iter()
            .map(|(height, _)| *height)
            .collect()
    }

    /// Returns a future that resolves once `accepted` blocks have been accepted.
    pub fn stop_after(&self, accepted: usize) -> StopAfter {
        StopAfter {
            ledger: self.clone(),
            accepted,
        }
    }

    pub(super) fn verify(&self, height: u64) {
        self.state.lock().unwrap().verified.push(height);
    }

    pub(super) fn accept(&self, height: u64, id: Digest) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        if height != state.tip + 1 {
            return Err(Error::Invalid(format!(
                "accepted {height} on top of {}",
                state.tip
            )));
        }
        state.tip = height;
        state.accepted.push((height, id));
        Ok(())
    }
}

/// Resolves once a [Ledger] has accepted some number of blocks.
pub struct StopAfter {
    ledger: Ledger,
    accepted: usize,
}

impl Future for StopAfter {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<()> {
        if self.ledger.state.lock().unwrap().accepted.len() >= self.accepted {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}
