//! The storage contract implemented by backends.
//!
//! An implementation owns a connection pool and exposes batch appends,
//! conditional appends, and cursor-paginated queries over the committed
//! history. Projection entry points live on the concrete backend because
//! they spawn backend-specific work.
use crate::condition::AppendCondition;
use crate::cursor::Cursor;
use crate::event::{Event, PersistedEvent};
use crate::query::Query;

use async_trait::async_trait;
use futures::stream::BoxStream;

/// An append-only event store with DCB concurrency control.
#[async_trait]
pub trait EventStore {
    type Error: Send + Sync;

    /// Appends a batch of events atomically.
    ///
    /// All events of the batch share one `transaction_id`; positions follow
    /// the supplied order. Returns the cursor of the last appended event.
    async fn append(&self, events: Vec<Event>) -> Result<Cursor, Self::Error>;

    /// Appends a batch only if no committed event matches the condition.
    ///
    /// The check runs inside the append transaction against the committed
    /// snapshot. A match rejects the whole batch with the implementation's
    /// concurrency error.
    async fn append_if(
        &self,
        events: Vec<Event>,
        condition: AppendCondition,
    ) -> Result<Cursor, Self::Error>;

    /// Streams committed events matching `query` strictly after `after`,
    /// ordered by `(transaction_id, position)`.
    fn stream<'a>(
        &'a self,
        query: &'a Query,
        after: Option<Cursor>,
    ) -> BoxStream<'a, Result<PersistedEvent, Self::Error>>;

    /// Collects the matching events into memory.
    async fn query(
        &self,
        query: &Query,
        after: Option<Cursor>,
    ) -> Result<Vec<PersistedEvent>, Self::Error>;
}
