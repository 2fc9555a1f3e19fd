//! Process-group construction parameters.
//!
//! All values have defaults. Override via environment variables (prefixed
//! `CCLPG_`) or by constructing custom `ProcessGroupOptions`.

use std::time::Duration;

/// Rank, size and timeout requested for a new process group.
///
/// `None` for rank or size means "unspecified, trust the engine".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessGroupOptions {
    pub rank: Option<usize>,
    pub size: Option<usize>,

    /// Accepted and stored; no mechanism enforces it.
    pub timeout: Duration,
}

impl Default for ProcessGroupOptions {
    fn default() -> Self {
        Self {
            rank: None,
            size: None,
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl ProcessGroupOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rank(mut self, rank: usize) -> Self {
        self.rank = Some(rank);
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build from raw integers where any negative value (conventionally `-1`)
    /// means unspecified.
    pub fn from_raw(rank: i64, size: i64, timeout: Duration) -> Self {
        Self {
            rank: usize::try_from(rank).ok(),
            size: usize::try_from(size).ok(),
            timeout,
        }
    }

    /// Load options from environment variables, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `CCLPG_RANK`
    /// - `CCLPG_WORLD_SIZE`
    /// - `CCLPG_TIMEOUT_MS`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut opts = Self::default();

        if let Some(v) = lookup("CCLPG_RANK") {
            if let Ok(r) = v.parse::<i64>() {
                opts.rank = usize::try_from(r).ok();
            }
        }
        if let Some(v) = lookup("CCLPG_WORLD_SIZE") {
            if let Ok(n) = v.parse::<i64>() {
                opts.size = usize::try_from(n).ok();
            }
        }
        if let Some(v) = lookup("CCLPG_TIMEOUT_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                opts.timeout = Duration::from_millis(ms);
            }
        }

        opts
    }
}
