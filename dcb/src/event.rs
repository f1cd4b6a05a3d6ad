//! Event records, on both sides of the storage boundary.
//!
//! An [`Event`] is the input record a caller builds: a short type name, a
//! non-empty set of tags, and an opaque JSON payload. The store assigns
//! `transaction_id`, `position`, and `occurred_at` on commit, producing a
//! [`PersistedEvent`]. Events are immutable after commit; there is no update
//! or delete path.
use crate::cursor::Cursor;
use crate::error::ValidationError;
use crate::tag::Tag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::Deref;

/// Maximum length of an event type in bytes.
pub const MAX_EVENT_TYPE_LEN: usize = 64;

/// An input event, not yet persisted.
///
/// Tags are kept lexicographically sorted; duplicates are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    event_type: String,
    tags: Vec<Tag>,
    data: Value,
}

impl Event {
    /// Creates an event with the given type, no tags, and a `null` payload.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if the type is empty or exceeds
    /// [`MAX_EVENT_TYPE_LEN`] bytes.
    pub fn new(event_type: impl Into<String>) -> Result<Self, ValidationError> {
        let event_type = event_type.into();
        if event_type.is_empty() {
            return Err(ValidationError::EmptyEventType);
        }
        if event_type.len() > MAX_EVENT_TYPE_LEN {
            return Err(ValidationError::EventTypeTooLong {
                event_type,
                max: MAX_EVENT_TYPE_LEN,
            });
        }
        Ok(Self {
            event_type,
            tags: Vec::new(),
            data: Value::Null,
        })
    }

    /// Adds a tag, keeping the tag set sorted.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if the tag is invalid or already present.
    pub fn with_tag(
        self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        self.tag(Tag::new(key, value)?)
    }

    /// Adds an already-built tag, keeping the tag set sorted.
    pub fn tag(mut self, tag: Tag) -> Result<Self, ValidationError> {
        match self.tags.binary_search(&tag) {
            Ok(_) => Err(ValidationError::DuplicateTag(tag.to_string())),
            Err(at) => {
                self.tags.insert(at, tag);
                Ok(self)
            }
        }
    }

    /// Sets the JSON payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// All tags, lock directives included.
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// The tags that will be stored and matched by queries.
    pub fn filter_tags(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter().filter(|t| !t.is_lock_directive())
    }

    /// The resources named by this event's `lock:` directives.
    pub fn lock_resources(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().filter_map(Tag::lock_resource)
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Serialized size of the payload in bytes.
    pub fn data_size(&self) -> usize {
        serde_json::to_vec(&self.data).map(|v| v.len()).unwrap_or(0)
    }

    /// Checks the per-event invariants that cannot be enforced while the
    /// event is still being built: at least one non-directive tag must be
    /// present.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.filter_tags().next().is_none() {
            return Err(ValidationError::NoTags {
                event_type: self.event_type.clone(),
            });
        }
        Ok(())
    }
}

/// Validates a whole batch before any I/O.
///
/// The batch must be non-empty and within `max_batch_size`; every member
/// must pass [`Event::validate`] and fit `max_event_size`. The first
/// violation fails the entire batch.
pub fn validate_batch(
    events: &[Event],
    max_batch_size: usize,
    max_event_size: usize,
) -> Result<(), ValidationError> {
    if events.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }
    if events.len() > max_batch_size {
        return Err(ValidationError::BatchTooLarge {
            len: events.len(),
            max: max_batch_size,
        });
    }
    for event in events {
        event.validate()?;
        let size = event.data_size();
        if size > max_event_size {
            return Err(ValidationError::PayloadTooLarge {
                size,
                max: max_event_size,
            });
        }
    }
    Ok(())
}

/// An event that has been committed to the store.
///
/// Dereferences to the inner [`Event`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedEvent {
    transaction_id: i64,
    position: i64,
    occurred_at: DateTime<Utc>,
    event: Event,
}

impl PersistedEvent {
    pub fn new(transaction_id: i64, position: i64, occurred_at: DateTime<Utc>, event: Event) -> Self {
        Self {
            transaction_id,
            position,
            occurred_at,
            event,
        }
    }

    /// The commit identifier shared by all events of the same batch.
    pub fn transaction_id(&self) -> i64 {
        self.transaction_id
    }

    /// The globally unique position in the store.
    pub fn position(&self) -> i64 {
        self.position
    }

    /// Wall-clock insertion time. Informational; never used for ordering.
    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// This event's point in the total order.
    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.transaction_id, self.position)
    }

    pub fn into_inner(self) -> Event {
        self.event
    }
}

impl Deref for PersistedEvent {
    type Target = Event;

    fn deref(&self) -> &Self::Target {
        &self.event
    }
}
