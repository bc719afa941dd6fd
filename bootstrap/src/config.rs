use std::{num::NonZeroUsize, time::Duration};

/// Configuration for executing pending blocks.
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of blocks to process before writing queued deletions to storage.
    ///
    /// Larger values reduce the number of writes at the cost of holding more pending
    /// deletions in memory (and re-skipping more accepted blocks after an unclean shutdown).
    pub batch_write_period: NonZeroUsize,

    /// Number of blocks to process before releasing and reacquiring the storage cursor.
    ///
    /// A cursor pins the revision of the store it was acquired at, so it must not be held
    /// for the entire execution.
    pub cursor_release_period: NonZeroUsize,

    /// Minimum interval between progress logs.
    pub log_period: Duration,
}

const DEFAULT_BATCH_WRITE_PERIOD: NonZeroUsize = match NonZeroUsize::new(64) {
    Some(period) => period,
    None => unreachable!(),
};

const DEFAULT_CURSOR_RELEASE_PERIOD: NonZeroUsize = match NonZeroUsize::new(1024) {
    Some(period) => period,
    None => unreachable!(),
};

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_write_period: DEFAULT_BATCH_WRITE_PERIOD,
            cursor_release_period: DEFAULT_CURSOR_RELEASE_PERIOD,
            log_period: Duration::from_secs(5),
        }
    }
}
