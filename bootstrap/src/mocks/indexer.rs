use super::Digest;
use crate::{Acceptor, Error};
use bytes::Bytes;
use std::sync::{Arc, Mutex};

/// An [Acceptor] that records every block it is notified of.
#[derive(Clone, Default)]
pub struct Indexer {
    indexed: Arc<Mutex<Vec<(Digest, Bytes)>>>,
    fail: Option<Digest>,
}

impl Indexer {
    /// Create an indexer that returns an error when notified of `id`.
    pub fn failing(id: Digest) -> Self {
        Self {
            indexed: Arc::default(),
            fail: Some(id),
        }
    }

    /// Identifiers of all indexed blocks, in call order.
    pub fn indexed(&self) -> Vec<Digest> {
        self.indexed
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| *id)
            .collect()
    }
}

impl Acceptor<Digest> for Indexer {
    async fn accept(&self, id: Digest, bytes: Bytes) -> Result<(), Error> {
        if self.fail == Some(id) {
            return Err(Error::Acceptor(format!("failed to index {id}")));
        }
        self.indexed.lock().unwrap().push((id, bytes));
        Ok(())
    }
}
