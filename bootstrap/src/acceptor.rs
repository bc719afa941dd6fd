//! Report accepted blocks to an [Acceptor] and count them.
//!
//! [ParseAcceptor] wraps a [Parser] so that every block it produces is a [BlockAcceptor]. When a
//! [BlockAcceptor] is accepted, it first increments the accepted counter and notifies the
//! [Acceptor], and only then accepts the wrapped block. If the [Acceptor] fails, the wrapped block
//! is never accepted.

use crate::{Acceptor, Block, Error, Parser};
use bytes::Bytes;
use prometheus_client::metrics::counter::Counter;

/// A [Parser] that wraps every parsed block in a [BlockAcceptor].
#[derive(Clone)]
pub struct ParseAcceptor<P, A> {
    parser: P,
    acceptor: A,
    accepted: Counter,
}

impl<P, A> ParseAcceptor<P, A>
where
    P: Parser,
    A: Acceptor<<P::Block as Block>::Digest>,
{
    /// Wrap `parser`, notifying `acceptor` and incrementing `accepted` on every acceptance.
    pub fn new(parser: P, acceptor: A, accepted: Counter) -> Self {
        Self {
            parser,
            acceptor,
            accepted,
        }
    }
}

impl<P, A> Parser for ParseAcceptor<P, A>
where
    P: Parser,
    A: Acceptor<<P::Block as Block>::Digest>,
{
    type Block = BlockAcceptor<P::Block, A>;

    async fn parse(&self, bytes: Bytes) -> Result<Self::Block, Error> {
        let block = self.parser.parse(bytes).await?;
        Ok(BlockAcceptor {
            block,
            acceptor: self.acceptor.clone(),
            accepted: self.accepted.clone(),
        })
    }
}

/// A [Block] that notifies an [Acceptor] before it is accepted.
pub struct BlockAcceptor<B, A> {
    block: B,
    acceptor: A,
    accepted: Counter,
}

impl<B, A> Block for BlockAcceptor<B, A>
where
    B: Block,
    A: Acceptor<B::Digest>,
{
    type Digest = B::Digest;

    fn id(&self) -> Self::Digest {
        self.block.id()
    }

    fn parent(&self) -> Self::Digest {
        self.block.parent()
    }

    fn height(&self) -> u64 {
        self.block.height()
    }

    fn bytes(&self) -> Bytes {
        self.block.bytes()
    }

    async fn verify(&self) -> Result<(), Error> {
        self.block.verify().await
    }

    async fn accept(&self) -> Result<(), Error> {
        self.accepted.inc();
        self.acceptor
            .accept(self.block.id(), self.block.bytes())
            .await?;
        self.block.accept().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{self, Indexer, Ledger};
    use commonware_macros::test_traced;
    use commonware_runtime::{deterministic, Runner};

    #[test_traced]
    fn test_acceptor_notified_before_accept() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let ledger = Ledger::default();
            let chain = mocks::chain(&ledger, 3);
            let indexer = Indexer::default();
            let accepted = Counter::default();
            let parser = ParseAcceptor::new(
                mocks::Parser::new(&ledger),
                indexer.clone(),
                accepted.clone(),
            );

            for block in &chain[1..] {
                let wrapped = parser.parse(block.bytes()).await.unwrap();
                assert_eq!(wrapped.id(), block.id());
                assert_eq!(wrapped.parent(), block.parent());
                assert_eq!(wrapped.height(), block.height());
                wrapped.verify().await.unwrap();
                wrapped.accept().await.unwrap();
            }

            assert_eq!(indexer.indexed(), vec![chain[1].id(), chain[2].id()]);
            assert_eq!(ledger.accepted(), vec![1, 2]);
            assert_eq!(accepted.get(), 2);
        });
    }

    #[test_traced]
    fn test_acceptor_failure_prevents_accept() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let ledger = Ledger::default();
            let chain = mocks::chain(&ledger, 3);
            let indexer = Indexer::failing(chain[1].id());
            let parser = ParseAcceptor::new(
                mocks::Parser::new(&ledger),
                indexer.clone(),
                Counter::default(),
            );

            let wrapped = parser.parse(chain[1].bytes()).await.unwrap();
            assert!(matches!(wrapped.accept().await, Err(Error::Acceptor(_))));
            assert!(indexer.indexed().is_empty());
            assert!(ledger.accepted().is_empty());
        });
    }

    #[test_traced]
    fn test_parse_failure_propagates() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let parser = ParseAcceptor::new(
                mocks::Parser::default(),
                Indexer::default(),
                Counter::default(),
            );
            assert!(matches!(
                parser.parse(Bytes::from_static(b"junk")).await,
                Err(Error::Malformed(_))
            ));
        });
    }
}
