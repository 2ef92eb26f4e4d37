//! Routing table configuration.

use std::time::Duration;

use crate::{
    core::id::Id,
    error::{Error, Result},
};

/// The default maximum number of contacts a bucket can hold.
pub const K: usize = 20;

/// The default duration after which a contact or bucket is considered stale.
pub const STALE_AFTER: Duration = Duration::from_secs(15 * 60);

/// The default period of the refresh task.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Routing table configuration, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// The local peer's identifier, the trie refines itself around it.
    pub local_id: Id,
    /// The maximum number of contacts a bucket can hold.
    ///
    /// Defaults to [`K`].
    pub k: usize,
    /// Contacts and buckets untouched for this long are considered stale.
    ///
    /// Defaults to [`STALE_AFTER`].
    pub stale_after: Duration,
    /// The period at which the refresh task sweeps the table.
    ///
    /// Defaults to [`REFRESH_INTERVAL`].
    pub refresh_interval: Duration,
}

impl Default for Config {
    /// Uses a random local identifier.
    fn default() -> Self {
        Self::new(Id::rand())
    }
}

impl Config {
    /// Creates a default configuration for the supplied local identifier.
    pub fn new(local_id: Id) -> Self {
        Self {
            local_id,
            k: K,
            stale_after: STALE_AFTER,
            refresh_interval: REFRESH_INTERVAL,
        }
    }

    // === Options ===

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_refresh_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    /// Checks the configuration can back a routing table.
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(Error::InvalidCapacity);
        }

        if self.refresh_interval.is_zero() {
            return Err(Error::InvalidInterval);
        }

        Ok(())
    }

    /// Returns the staleness threshold in the timestamp domain, saturating on overflow.
    pub(crate) fn stale_threshold(&self) -> time::Duration {
        time::Duration::try_from(self.stale_after).unwrap_or(time::Duration::MAX)
    }
}
