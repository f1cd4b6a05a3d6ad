#![doc = include_str!("../README.md")]

mod condition;
mod cursor;
mod error;
mod event;
mod event_store;
mod projector;
mod query;
mod tag;
mod testing;

#[doc(inline)]
pub use crate::condition::AppendCondition;
#[doc(inline)]
pub use crate::cursor::Cursor;
#[doc(inline)]
pub use crate::error::ValidationError;
#[doc(inline)]
pub use crate::event::{validate_batch, Event, PersistedEvent, MAX_EVENT_TYPE_LEN};
#[doc(inline)]
pub use crate::event_store::EventStore;
#[doc(inline)]
pub use crate::projector::{union_query, Projection, Projector, StateProjector};
#[doc(inline)]
pub use crate::query::{Query, QueryItem};
#[doc(inline)]
pub use crate::tag::{Tag, LOCK_TAG_KEY, MAX_TAG_VALUE_LEN};
#[doc(inline)]
pub use crate::testing::TestHarness;
