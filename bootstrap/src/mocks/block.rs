use super::Ledger;
use crate::Error;
use bytes::{Buf, BufMut, Bytes};
use commonware_codec::{DecodeExt, Encode, EncodeSize, Error as CodecError, Read, ReadExt, Write};
use commonware_cryptography::{sha256, Hasher, Sha256};

/// SHA-256 digest of an encoded [Block].
pub type Digest = sha256::Digest;

/// The encoded fields of a [Block].
#[derive(Clone, Debug, PartialEq, Eq)]
struct Header {
    parent: Digest,
    height: u64,
    valid: bool,
}

impl Write for Header {
    fn write(&self, buf: &mut impl BufMut) {
        self.parent.write(buf);
        self.height.write(buf);
        self.valid.write(buf);
    }
}

impl Read for Header {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let parent = Digest::read(buf)?;
        let height = u64::read(buf)?;
        let valid = bool::read(buf)?;
        Ok(Self {
            parent,
            height,
            valid,
        })
    }
}

impl EncodeSize for Header {
    fn encode_size(&self) -> usize {
        self.parent.encode_size() + self.height.encode_size() + self.valid.encode_size()
    }
}

/// A block that records verification and acceptance in a [Ledger].
#[derive(Clone)]
pub struct Block {
    id: Digest,
    header: Header,
    bytes: Bytes,
    ledger: Ledger,
}

impl Block {
    /// Create a block at `height` on top of `parent`.
    ///
    /// A block created with `valid == false` fails verification.
    pub fn new(ledger: &Ledger, parent: Digest, height: u64, valid: bool) -> Self {
        let header = Header {
            parent,
            height,
            valid,
        };
        let bytes = header.encode().freeze();
        Self::from_parts(ledger, header, bytes)
    }

    fn from_parts(ledger: &Ledger, header: Header, bytes: Bytes) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Self {
            id: hasher.finalize(),
            header,
            bytes,
            ledger: ledger.clone(),
        }
    }
}

impl crate::Block for Block {
    type Digest = Digest;

    fn id(&self) -> Digest {
        self.id
    }

    fn parent(&self) -> Digest {
        self.header.parent
    }

    fn height(&self) -> u64 {
        self.header.height
    }

    fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    async fn verify(&self) -> Result<(), Error> {
        self.ledger.verify(self.header.height);
        if !self.header.valid {
            return Err(Error::Invalid(format!("block {} rejected", self.id)));
        }
        Ok(())
    }

    async fn accept(&self) -> Result<(), Error> {
        self.ledger.accept(self.header.height, self.id)
    }
}

/// Returns a chain of `len` valid blocks starting at genesis (height 0).
pub fn chain(ledger: &Ledger, len: u64) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::new();
    for height in 0..len {
        let parent = blocks
            .last()
            .map(|b| b.id)
            .unwrap_or_else(|| Digest::from([0u8; 32]));
        blocks.push(Block::new(ledger, parent, height, true));
    }
    blocks
}

/// Parses blocks that record into a shared [Ledger].
#[derive(Clone, Default)]
pub struct Parser {
    ledger: Ledger,
}

impl Parser {
    pub fn new(ledger: &Ledger) -> Self {
        Self {
            ledger: ledger.clone(),
        }
    }
}

impl crate::Parser for Parser {
    type Block = Block;

    async fn parse(&self, bytes: Bytes) -> Result<Block, Error> {
        let header = Header::decode(bytes.clone())?;
        Ok(Block::from_parts(&self.ledger, header, bytes))
    }
}
