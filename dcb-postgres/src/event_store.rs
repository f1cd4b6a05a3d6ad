//! PostgreSQL Event Store
//!
//! This module provides the PostgreSQL implementation of the [`EventStore`]
//! contract: atomic batch appends, conditional appends guarded by a DCB
//! condition check, and cursor-paginated scans over the committed history.
//!
//! The authoritative order of committed events is `(transaction_id,
//! position)`. Positions come from a global sequence; transaction ids come
//! from `pg_current_xact_id`, so a transaction with a larger id may commit
//! before one with a smaller id. Every scan therefore filters on the
//! committed boundary (`pg_snapshot_xmin`) and orders by the pair, which
//! makes reads deterministic without requiring isolation above
//! read-committed.
mod append;
mod criteria;
mod locks;
pub mod projection;

use append::{check_condition, InsertEventsBuilder};
use criteria::ScanBuilder;

use crate::config::PgEventStoreConfig;
use crate::error::CONCURRENCY_ERROR_CODE;
use crate::schema::Schema;
use crate::Error;

use async_stream::stream;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dcb::{validate_batch, AppendCondition, Cursor, Event, EventStore, PersistedEvent, Query, Tag};
use futures::stream::BoxStream;
use futures::StreamExt;
use sqlx::postgres::PgPool;
use sqlx::Row;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tokio::time::timeout;

/// PostgreSQL event store implementation.
#[derive(Clone, Debug)]
pub struct PgEventStore {
    pub(crate) pool: PgPool,
    pub(crate) config: Arc<PgEventStoreConfig>,
    pub(crate) projections: Arc<AtomicUsize>,
}

impl PgEventStore {
    /// Initializes the schema, validates it, and returns a new store.
    ///
    /// # Arguments
    ///
    /// * `pool` - The PostgreSQL connection pool.
    /// * `config` - The store configuration.
    pub async fn try_new(pool: PgPool, config: PgEventStoreConfig) -> Result<Self, Error> {
        Schema::init(&pool).await?;
        Schema::validate(&pool).await?;
        Ok(Self::from_parts(pool, config))
    }

    /// Returns a store without applying any DDL.
    ///
    /// For deployments that manage the schema themselves. The structural
    /// validation still runs; see [`Schema`] for the required layout.
    pub async fn new_uninitialized(
        pool: PgPool,
        config: PgEventStoreConfig,
    ) -> Result<Self, Error> {
        Schema::validate(&pool).await?;
        Ok(Self::from_parts(pool, config))
    }

    fn from_parts(pool: PgPool, config: PgEventStoreConfig) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            projections: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn config(&self) -> &PgEventStoreConfig {
        &self.config
    }

    /// Streams at most `limit` events matching `query` after `after`.
    pub fn stream_limited<'a>(
        &'a self,
        query: &'a Query,
        after: Option<Cursor>,
        limit: i64,
    ) -> BoxStream<'a, Result<PersistedEvent, Error>> {
        self.stream_rows(query, after, Some(limit))
    }

    fn stream_rows<'a>(
        &'a self,
        query: &'a Query,
        after: Option<Cursor>,
        limit: Option<i64>,
    ) -> BoxStream<'a, Result<PersistedEvent, Error>> {
        match self.config.read_isolation.set_statement() {
            None => self.stream_with(&self.pool, query, after, limit),
            Some(set_isolation) => self.stream_tx(set_isolation, query, after, limit),
        }
    }

    /// Streams events matching `query` after `after` from the given
    /// executor, in `(transaction_id, position)` order.
    pub(crate) fn stream_with<'a, EX>(
        &'a self,
        executor: EX,
        query: &'a Query,
        after: Option<Cursor>,
        limit: Option<i64>,
    ) -> BoxStream<'a, Result<PersistedEvent, Error>>
    where
        EX: sqlx::PgExecutor<'a> + Send + Sync + 'a,
    {
        let canonical = query.clone().canonicalize();
        stream! {
            let mut builder = ScanBuilder::new(&canonical).after(after).limit(limit).select();
            let mut rows = builder.build_query_as::<PgEventRow>().fetch(executor);
            while let Some(row) = rows.next().await {
                yield decode_row(row?);
            }
        }
        .boxed()
    }

    /// Streaming variant used when the read path is configured above
    /// read-committed: the scan runs inside its own transaction at the
    /// requested level.
    fn stream_tx<'a>(
        &'a self,
        set_isolation: &'static str,
        query: &'a Query,
        after: Option<Cursor>,
        limit: Option<i64>,
    ) -> BoxStream<'a, Result<PersistedEvent, Error>> {
        let canonical = query.clone().canonicalize();
        stream! {
            let mut tx = self.pool.begin().await?;
            sqlx::query(set_isolation).execute(&mut *tx).await?;
            let mut builder = ScanBuilder::new(&canonical).after(after).limit(limit).select();
            {
                let mut rows = builder.build_query_as::<PgEventRow>().fetch(&mut *tx);
                while let Some(row) = rows.next().await {
                    yield decode_row(row?);
                }
            }
            tx.commit().await?;
        }
        .boxed()
    }

    async fn run_append(
        &self,
        events: Vec<Event>,
        condition: Option<AppendCondition>,
    ) -> Result<Cursor, Error> {
        validate_batch(
            &events,
            self.config.max_batch_size,
            self.config.max_event_size,
        )?;
        let append = self.transactional_append(&events, condition.as_ref());
        timeout(self.config.append_timeout, append)
            .await
            .map_err(|_| Error::Canceled)?
    }

    async fn transactional_append(
        &self,
        events: &[Event],
        condition: Option<&AppendCondition>,
    ) -> Result<Cursor, Error> {
        let mut tx = self.pool.begin().await?;
        if let Some(set_isolation) = self.config.append_isolation.set_statement() {
            sqlx::query(set_isolation).execute(&mut *tx).await?;
        }

        let keys = locks::lock_keys(events);
        if !keys.is_empty() {
            locks::acquire(&mut tx, &keys, self.config.lock_timeout).await?;
        }

        if let Some(condition) = condition {
            let matching = check_condition(&mut tx, condition).await?;
            if matching > 0 {
                tracing::warn!(
                    matching_events = matching,
                    code = CONCURRENCY_ERROR_CODE,
                    "append rejected by condition"
                );
                return Err(Error::Concurrency {
                    matching_events: matching,
                    code: CONCURRENCY_ERROR_CODE,
                });
            }
        }

        let mut insert = InsertEventsBuilder::new(events);
        let rows = insert.build().fetch_all(&mut *tx).await?;
        let mut last = None;
        for row in rows {
            last = Some(Cursor::new(row.try_get(0)?, row.try_get(1)?));
        }
        // Validation rejects empty batches before the transaction starts.
        let last = last.ok_or(Error::Validation(dcb::ValidationError::EmptyBatch))?;

        tx.commit().await?;
        tracing::debug!(
            events = events.len(),
            transaction_id = last.transaction_id,
            "batch appended"
        );
        Ok(last)
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    type Error = Error;

    /// Appends a batch of events atomically.
    ///
    /// All events share the transaction's id; positions are drawn from the
    /// global sequence in the supplied order. Returns the cursor of the last
    /// appended event, valid for pagination once the call returns.
    async fn append(&self, events: Vec<Event>) -> Result<Cursor, Self::Error> {
        self.run_append(events, None).await
    }

    /// Appends a batch only if no committed event matches `condition`.
    ///
    /// The check runs inside the append's transaction against the committed
    /// snapshot; concurrent in-flight transactions are not considered. On a
    /// match the transaction is rolled back and
    /// [`Error::Concurrency`] carries the matching count.
    async fn append_if(
        &self,
        events: Vec<Event>,
        condition: AppendCondition,
    ) -> Result<Cursor, Self::Error> {
        self.run_append(events, Some(condition)).await
    }

    /// Streams committed events matching `query` strictly after `after`.
    fn stream<'a>(
        &'a self,
        query: &'a Query,
        after: Option<Cursor>,
    ) -> BoxStream<'a, Result<PersistedEvent, Self::Error>> {
        self.stream_rows(query, after, None)
    }

    /// Collects the matching events, bounded by the query timeout.
    async fn query(
        &self,
        query: &Query,
        after: Option<Cursor>,
    ) -> Result<Vec<PersistedEvent>, Self::Error> {
        let collect = async {
            let mut events = Vec::new();
            let mut rows = self.stream(query, after);
            while let Some(event) = rows.next().await {
                events.push(event?);
            }
            Ok(events)
        };
        timeout(self.config.query_timeout, collect)
            .await
            .map_err(|_| Error::Canceled)?
    }
}

#[derive(sqlx::FromRow)]
struct PgEventRow {
    event_type: String,
    tags: Vec<String>,
    data: serde_json::Value,
    transaction_id: i64,
    position: i64,
    occurred_at: DateTime<Utc>,
}

fn decode_row(row: PgEventRow) -> Result<PersistedEvent, Error> {
    let mut event = Event::new(row.event_type)
        .map_err(Error::decode)?
        .with_data(row.data);
    for tag in row.tags {
        event = event
            .tag(Tag::parse(&tag).map_err(Error::decode)?)
            .map_err(Error::decode)?;
    }
    Ok(PersistedEvent::new(
        row.transaction_id,
        row.position,
        row.occurred_at,
        event,
    ))
}
