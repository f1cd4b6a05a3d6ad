//! The predicate algebra used to filter events.
//!
//! A [`Query`] is an ordered list of [`QueryItem`]s. An item carries two
//! optional conjunctive conditions: a set of event types (match if the
//! event's type is in the set; empty means any type) and a set of tags
//! (match if the event's tags are a superset; empty means any tags). A query
//! matches an event if any of its items does.
//!
//! Two degenerate shapes follow from the algebra and are relied on
//! throughout: a query with no items matches nothing, and a query with a
//! single unconstrained item matches everything.
//!
//! ```
//! use dcb::{Event, Query, QueryItem};
//!
//! let event = Event::new("StudentEnrolled").unwrap()
//!     .with_tag("course_id", "c1").unwrap()
//!     .with_tag("student_id", "s1").unwrap();
//!
//! let query = Query::item(
//!     QueryItem::of_types(["StudentEnrolled"]).with_tag("course_id", "c1").unwrap(),
//! );
//! assert!(query.matches(&event));
//! assert!(!Query::none().matches(&event));
//! assert!(Query::all().matches(&event));
//! ```
use crate::error::ValidationError;
use crate::event::Event;
use crate::tag::Tag;
use serde::{Deserialize, Serialize};

/// One conjunctive filter: type set AND tag containment.
#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryItem {
    types: Vec<String>,
    tags: Vec<Tag>,
}

impl QueryItem {
    /// An unconstrained item. Matches every event.
    pub fn all() -> Self {
        Self::default()
    }

    /// An item constrained to the given event types.
    pub fn of_types<I>(types: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            types: types.into_iter().map(Into::into).collect(),
            tags: Vec::new(),
        }
    }

    /// Adds a tag to the containment condition.
    pub fn with_tag(
        self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Ok(self.tag(Tag::new(key, value)?))
    }

    /// Adds an already-built tag to the containment condition.
    pub fn tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn types(&self) -> &[String] {
        &self.types
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Whether both conditions are absent.
    pub fn is_unconstrained(&self) -> bool {
        self.types.is_empty() && self.tags.is_empty()
    }

    /// Evaluates this item against an event: type in set (or set empty) AND
    /// event tags ⊇ item tags (or item tags empty).
    pub fn matches(&self, event: &Event) -> bool {
        let type_matches =
            self.types.is_empty() || self.types.iter().any(|t| t == event.event_type());
        let tags_match = self
            .tags
            .iter()
            .all(|tag| event.filter_tags().any(|t| t == tag));
        type_matches && tags_match
    }

    fn canonicalize(mut self) -> Self {
        self.types.sort();
        self.types.dedup();
        self.tags.sort();
        self.tags.dedup();
        self
    }
}

/// An OR-combination of [`QueryItem`]s.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    items: Vec<QueryItem>,
}

impl Query {
    /// The query that matches no events.
    pub fn none() -> Self {
        Self::default()
    }

    /// The query that matches every event.
    pub fn all() -> Self {
        Self::item(QueryItem::all())
    }

    /// A query with a single item.
    pub fn item(item: QueryItem) -> Self {
        Self { items: vec![item] }
    }

    /// A query over the given items.
    pub fn new(items: Vec<QueryItem>) -> Self {
        Self { items }
    }

    /// The OR-combination of several queries: the concatenation of their
    /// item lists. Used to drive a single scan for a set of projectors.
    pub fn union<I>(queries: I) -> Self
    where
        I: IntoIterator<Item = Query>,
    {
        Self {
            items: queries.into_iter().flat_map(|q| q.items).collect(),
        }
    }

    pub fn items(&self) -> &[QueryItem] {
        &self.items
    }

    /// Whether the item list is empty, i.e. the query matches nothing.
    pub fn is_none(&self) -> bool {
        self.items.is_empty()
    }

    /// Evaluates the query against an event.
    pub fn matches(&self, event: &Event) -> bool {
        self.items.iter().any(|item| item.matches(event))
    }

    /// Sorts and dedupes each item's sets and drops repeated items, so
    /// equivalent queries compile to identical scan plans.
    pub fn canonicalize(mut self) -> Self {
        self.items = self
            .items
            .into_iter()
            .map(QueryItem::canonicalize)
            .collect();
        self.items.sort();
        self.items.dedup();
        self
    }
}
