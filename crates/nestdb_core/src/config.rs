//! Database options.

use std::time::Duration;

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Options {
    /// Cap on the number of ids a single index range scan may
    /// accumulate. Scans that hit the cap mark their result truncated.
    pub internal_query_limit: usize,

    /// Upper bound applied to queries that do not carry their own
    /// timeout.
    pub query_timeout: Duration,

    /// How long a write operation may wait for the engine's writer
    /// slot before failing.
    pub transaction_timeout: Duration,

    /// How many revisions each record keeps, including the live one.
    /// The eldest revision is discarded on overflow.
    pub revision_depth: usize,

    /// Whether the file engine fsyncs the journal on every commit
    /// (safer but slower).
    pub sync_on_commit: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            internal_query_limit: 1000,
            query_timeout: Duration::from_secs(30),
            transaction_timeout: Duration::from_secs(10),
            revision_depth: 10,
            sync_on_commit: true,
        }
    }
}

impl Options {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the internal query limit.
    #[must_use]
    pub const fn internal_query_limit(mut self, limit: usize) -> Self {
        self.internal_query_limit = limit;
        self
    }

    /// Sets the default query timeout.
    #[must_use]
    pub const fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Sets the write-transaction timeout.
    #[must_use]
    pub const fn transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transaction_timeout = timeout;
        self
    }

    /// Sets the revision depth.
    #[must_use]
    pub const fn revision_depth(mut self, depth: usize) -> Self {
        self.revision_depth = depth;
        self
    }

    /// Sets whether the file engine syncs on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = Options::default();
        assert_eq!(options.internal_query_limit, 1000);
        assert_eq!(options.revision_depth, 10);
        assert!(options.sync_on_commit);
    }

    #[test]
    fn builder_pattern() {
        let options = Options::new()
            .internal_query_limit(50)
            .revision_depth(3)
            .query_timeout(Duration::from_millis(500))
            .sync_on_commit(false);

        assert_eq!(options.internal_query_limit, 50);
        assert_eq!(options.revision_depth, 3);
        assert_eq!(options.query_timeout, Duration::from_millis(500));
        assert!(!options.sync_on_commit);
    }
}
