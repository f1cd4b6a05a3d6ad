//! Event store configuration.
use std::time::Duration;

/// Transaction isolation levels supported by the store.
///
/// The default is read-committed for both the read and the write path. The
/// DCB condition check constrains against the committed boundary and the
/// caller's cursor, so no behavior of the store depends on the stronger
/// levels for correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// The `SET TRANSACTION` statement raising a fresh transaction to this
    /// level, or `None` when the session default already applies.
    pub(crate) fn set_statement(&self) -> Option<&'static str> {
        match self {
            IsolationLevel::ReadCommitted => None,
            IsolationLevel::RepeatableRead => {
                Some("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            }
            IsolationLevel::Serializable => Some("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE"),
        }
    }
}

/// Configuration for [`PgEventStore`](crate::PgEventStore).
///
/// # Properties
///
/// * `max_batch_size`: appends with more input events are rejected.
/// * `max_event_size`: payloads serializing to more bytes are rejected.
/// * `append_isolation` / `read_isolation`: transaction isolation for the
///   write and read paths.
/// * `append_timeout` / `query_timeout`: fallback deadlines; expiration
///   aborts the operation with a canceled error and rolls back.
/// * `lock_timeout`: how long an append waits for an advisory lock.
/// * `stream_buffer`: channel capacity of the streaming variants.
/// * `max_concurrent_projections`: cap on in-flight streaming projections.
#[derive(Debug, Clone)]
pub struct PgEventStoreConfig {
    pub(crate) max_batch_size: usize,
    pub(crate) max_event_size: usize,
    pub(crate) append_isolation: IsolationLevel,
    pub(crate) read_isolation: IsolationLevel,
    pub(crate) append_timeout: Duration,
    pub(crate) query_timeout: Duration,
    pub(crate) lock_timeout: Duration,
    pub(crate) stream_buffer: usize,
    pub(crate) max_concurrent_projections: usize,
}

impl Default for PgEventStoreConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 1000,
            max_event_size: 1024 * 1024,
            append_isolation: IsolationLevel::default(),
            read_isolation: IsolationLevel::default(),
            append_timeout: Duration::from_secs(10),
            query_timeout: Duration::from_secs(15),
            lock_timeout: Duration::from_secs(5),
            stream_buffer: 1000,
            max_concurrent_projections: 100,
        }
    }
}

impl PgEventStoreConfig {
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    pub fn with_max_event_size(mut self, max_event_size: usize) -> Self {
        self.max_event_size = max_event_size;
        self
    }

    pub fn with_append_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.append_isolation = isolation;
        self
    }

    pub fn with_read_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.read_isolation = isolation;
        self
    }

    pub fn with_append_timeout(mut self, timeout: Duration) -> Self {
        self.append_timeout = timeout;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_stream_buffer(mut self, stream_buffer: usize) -> Self {
        self.stream_buffer = stream_buffer;
        self
    }

    pub fn with_max_concurrent_projections(mut self, max: usize) -> Self {
        self.max_concurrent_projections = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_defaults_to_the_documented_values() {
        let config = PgEventStoreConfig::default();
        assert_eq!(config.max_batch_size, 1000);
        assert_eq!(config.max_event_size, 1024 * 1024);
        assert_eq!(config.append_isolation, IsolationLevel::ReadCommitted);
        assert_eq!(config.read_isolation, IsolationLevel::ReadCommitted);
        assert_eq!(config.append_timeout, Duration::from_secs(10));
        assert_eq!(config.query_timeout, Duration::from_secs(15));
        assert_eq!(config.lock_timeout, Duration::from_secs(5));
        assert_eq!(config.stream_buffer, 1000);
        assert_eq!(config.max_concurrent_projections, 100);
    }

    #[test]
    fn read_committed_needs_no_set_statement() {
        assert_eq!(IsolationLevel::ReadCommitted.set_statement(), None);
        assert!(IsolationLevel::Serializable.set_statement().is_some());
    }
}
