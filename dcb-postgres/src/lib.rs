//! # PostgreSQL DCB Event Store
//!
//! PostgreSQL backend for the [`dcb`] event store: append-only storage with
//! conditional appends checked against the committed snapshot, single-scan
//! queries and projections over a tag/type predicate algebra, and optional
//! per-resource serialization through transaction-scoped advisory locks.
mod config;
mod error;
mod event_store;
mod schema;

pub use crate::config::{IsolationLevel, PgEventStoreConfig};
pub use crate::error::{Error, CONCURRENCY_ERROR_CODE};
pub use crate::event_store::projection::{ProjectionStream, ProjectionUpdate};
pub use crate::event_store::PgEventStore;
pub use crate::schema::Schema;
