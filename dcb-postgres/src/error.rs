use std::error::Error as StdError;
use thiserror::Error;

/// Error code attached to DCB concurrency violations.
pub const CONCURRENCY_ERROR_CODE: &str = "DCB01";

/// Represents all the ways a method can fail within the Postgres event store.
#[derive(Error, Debug)]
pub enum Error {
    /// Input was rejected before any I/O took place.
    #[error(transparent)]
    Validation(#[from] dcb::ValidationError),
    /// The `events` table exists but is not structurally compatible.
    #[error("incompatible events table: {0}")]
    TableStructure(String),
    /// The DCB condition matched committed events; the append was rejected.
    ///
    /// This is the only business error the store emits. Callers recover by
    /// re-reading, recomputing their decision, and retrying.
    #[error("{code}: append condition matched {matching_events} committed event(s)")]
    Concurrency {
        matching_events: i64,
        code: &'static str,
    },
    /// The cap on in-flight streaming projections was exceeded.
    #[error("too many concurrent projections: {current} of {max} already in flight")]
    TooManyProjections { max: usize, current: usize },
    /// Error returned from the database.
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    /// An advisory lock could not be acquired within the lock timeout.
    #[error("lock acquisition timed out")]
    LockTimeout(#[source] sqlx::Error),
    /// A stored row could not be mapped back to an event.
    #[error("unable to decode a stored event: {0}")]
    Decode(#[source] Box<dyn StdError + Send + Sync + 'static>),
    /// The operation deadline elapsed or the caller canceled.
    #[error("operation canceled or deadline exceeded")]
    Canceled,
}

impl Error {
    pub(crate) fn decode(err: impl StdError + Send + Sync + 'static) -> Self {
        Error::Decode(Box::new(err))
    }
}
