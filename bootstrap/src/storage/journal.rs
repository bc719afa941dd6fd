//! [Database] persisted to [Storage] blobs.
//!
//! Entries are served from memory (with the same copy-on-write snapshots as [Memory]) and every
//! [Batch] is appended to a log blob as a single record:
//!
//! ```text
//! +-----------+-------------+-------------+
//! | len (u32) | batch (len) | crc32 (u32) |
//! +-----------+-------------+-------------+
//! ```
//!
//! A record is only replayed if it is complete and its checksum matches, so a batch is recovered
//! in full or not at all. Anything after the first invalid record (a write torn by a crash) is
//! truncated by [Journal::init].
//!
//! # Compaction
//!
//! Each log blob (a "section") begins with a record holding every entry stored when the section
//! was created. Once a section grows past [Config::compaction_threshold] (and twice the size of
//! that first record), a new section is written from the current entries and the old one is
//! removed. At startup, the newest section with a valid first record is replayed and all others
//! are removed.

use super::{
    memory::{Memory, MemoryCursor},
    Batch, Database, Error,
};
use bytes::{Buf, Bytes};
use commonware_codec::{DecodeExt, Encode, FixedSize, ReadExt, Write};
use commonware_runtime::{Blob, Error as RuntimeError, Storage};
use futures::lock::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Configuration for [Journal].
#[derive(Clone, Debug)]
pub struct Config {
    /// Partition that stores the log sections.
    pub partition: String,

    /// Size (in bytes) a section may reach before it is compacted.
    pub compaction_threshold: u64,
}

struct Log<B: Blob> {
    section: u64,
    blob: B,

    /// Offset of the end of the last valid record.
    size: u64,

    /// Size of the first record.
    base: u64,
}

/// A [Database] backed by an append-only log of batches.
#[derive(Clone)]
pub struct Journal<E: Storage> {
    context: E,
    config: Config,

    index: Memory,
    log: Arc<Mutex<Log<E::Blob>>>,
}

fn encode_record(batch: &Batch) -> Vec<u8> {
    let payload = batch.encode();
    let mut record = Vec::with_capacity(u32::SIZE + payload.len() + u32::SIZE);
    (payload.len() as u32).write(&mut record);
    record.extend_from_slice(&payload);
    crc32fast::hash(&payload).write(&mut record);
    record
}

/// Decode the next record in `buf`, returning `None` if it is incomplete or corrupt.
fn decode_record(buf: &mut Bytes) -> Option<Batch> {
    let len = u32::read(buf).ok()? as usize;
    if buf.remaining() < len + u32::SIZE {
        return None;
    }
    let payload = buf.split_to(len);
    let checksum = u32::read(buf).ok()?;
    if crc32fast::hash(&payload) != checksum {
        return None;
    }
    Batch::decode(payload).ok()
}

async fn read_all<B: Blob>(blob: &B, len: u64) -> Result<Bytes, Error> {
    if len == 0 {
        return Ok(Bytes::new());
    }
    let buf = blob.read_at(vec![0u8; len as usize], 0).await?;
    Ok(Bytes::copy_from_slice(buf.as_ref()))
}

impl<E: Storage> Journal<E> {
    /// Open the journal in `config.partition`, replaying all persisted batches.
    pub async fn init(context: E, config: Config) -> Result<Self, Error> {
        let names = match context.scan(&config.partition).await {
            Ok(names) => names,
            Err(RuntimeError::PartitionMissing(_)) => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        let mut sections = Vec::with_capacity(names.len());
        for name in names {
            let Ok(section) = <[u8; 8]>::try_from(name.as_slice()) else {
                return Err(Error::Corrupt(name));
            };
            sections.push(u64::from_be_bytes(section));
        }
        sections.sort_unstable();

        // Replay the newest section that starts with a complete record
        let index = Memory::default();
        let mut log = None;
        while let Some(section) = sections.pop() {
            let (blob, len) = context
                .open(&config.partition, &section.to_be_bytes())
                .await?;
            let data = read_all(&blob, len).await?;
            let mut buf = data.clone();
            let Some(base) = decode_record(&mut buf) else {
                warn!(section, "removing incomplete section");
                drop(blob);
                context
                    .remove(&config.partition, Some(section.to_be_bytes().as_slice()))
                    .await?;
                continue;
            };
            index.apply(base)?;
            let base = (data.len() - buf.remaining()) as u64;
            let mut size = base;
            while let Some(batch) = decode_record(&mut buf) {
                index.apply(batch)?;
                size = (data.len() - buf.remaining()) as u64;
            }
            if size < len {
                warn!(section, size, len, "truncating torn record");
                blob.resize(size).await?;
                blob.sync().await?;
            }
            log = Some(Log {
                section,
                blob,
                size,
                base,
            });
            break;
        }

        // Anything older was superseded by a compaction
        for section in sections {
            context
                .remove(&config.partition, Some(section.to_be_bytes().as_slice()))
                .await?;
        }
        let log = match log {
            Some(log) => log,
            None => Self::create(&context, &config.partition, 0, &Batch::new()).await?,
        };
        debug!(
            section = log.section,
            size = log.size,
            entries = index.len(),
            "initialized journal"
        );

        Ok(Self {
            context,
            config,
            index,
            log: Arc::new(Mutex::new(log)),
        })
    }

    /// Create `section` starting with a record of `base`.
    async fn create(
        context: &E,
        partition: &str,
        section: u64,
        base: &Batch,
    ) -> Result<Log<E::Blob>, Error> {
        let (blob, len) = context.open(partition, &section.to_be_bytes()).await?;
        if len > 0 {
            blob.resize(0).await?;
        }
        let record = encode_record(base);
        let size = record.len() as u64;
        blob.write_at(record, 0).await?;
        blob.sync().await?;
        Ok(Log {
            section,
            blob,
            size,
            base: size,
        })
    }

    /// Number of entries stored.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl<E: Storage> Database for Journal<E> {
    type Cursor = MemoryCursor;

    async fn get(&self, key: &[u8]) -> Result<Option<Bytes>, Error> {
        self.index.get(key).await
    }

    async fn write(&mut self, batch: Batch) -> Result<(), Error> {
        let mut log = self.log.lock().await;
        let record = encode_record(&batch);
        let len = record.len() as u64;
        log.blob.write_at(record, log.size).await?;
        log.blob.sync().await?;
        log.size += len;
        self.index.apply(batch)?;

        if log.size < self.config.compaction_threshold.max(2 * log.base) {
            return Ok(());
        }
        let section = log.section + 1;
        let next = Self::create(
            &self.context,
            &self.config.partition,
            section,
            &self.index.snapshot(),
        )
        .await?;
        let previous = std::mem::replace(&mut *log, next);
        drop(previous.blob);
        self.context
            .remove(
                &self.config.partition,
                Some(previous.section.to_be_bytes().as_slice()),
            )
            .await?;
        debug!(section, size = log.size, "compacted journal");
        Ok(())
    }

    fn cursor(&self, prefix: &[u8]) -> Result<Self::Cursor, Error> {
        self.index.cursor(prefix)
    }
}
