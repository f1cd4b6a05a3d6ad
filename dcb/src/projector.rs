//! Projectors are named folds over the events matching a query.
//!
//! A projector owns its scope: the query it declares is both the filter the
//! engine routes events through and the consistency boundary a subsequent
//! conditional append is checked against. The engine only ever invokes the
//! transition; it does not introspect states.
use crate::condition::AppendCondition;
use crate::cursor::Cursor;
use crate::error::ValidationError;
use crate::event::PersistedEvent;
use crate::query::Query;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// A named fold: `(id, query, initial_state, transition)`.
///
/// The transition must be pure with respect to the event: it may only
/// depend on the prior state and the event itself.
pub trait StateProjector: Send + Sync {
    type State: Clone + Send + Sync;

    /// The id of this projector, unique within a projector set.
    fn id(&self) -> &str;

    /// The query defining which events this projector observes.
    fn query(&self) -> &Query;

    /// The state before any event has been applied.
    fn initial_state(&self) -> Self::State;

    /// Folds one event into the state.
    fn apply(&self, state: Self::State, event: &PersistedEvent) -> Self::State;
}

/// A closure-backed [`StateProjector`].
///
/// ```
/// use dcb::{Projector, Query, QueryItem};
///
/// let count = Projector::new(
///     "enrollment_count",
///     Query::item(QueryItem::of_types(["StudentEnrolled"])),
///     0u32,
///     |n, _event| n + 1,
/// );
/// ```
pub struct Projector<S> {
    id: String,
    query: Query,
    initial: S,
    transition: Arc<dyn Fn(S, &PersistedEvent) -> S + Send + Sync>,
}

impl<S: Clone + Send + Sync> Projector<S> {
    pub fn new(
        id: impl Into<String>,
        query: Query,
        initial: S,
        transition: impl Fn(S, &PersistedEvent) -> S + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            query,
            initial,
            transition: Arc::new(transition),
        }
    }
}

impl<S: Clone + Send + Sync> StateProjector for Projector<S> {
    type State = S;

    fn id(&self) -> &str {
        &self.id
    }

    fn query(&self) -> &Query {
        &self.query
    }

    fn initial_state(&self) -> S {
        self.initial.clone()
    }

    fn apply(&self, state: S, event: &PersistedEvent) -> S {
        (self.transition)(state, event)
    }
}

impl<S: Clone> Clone for Projector<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            query: self.query.clone(),
            initial: self.initial.clone(),
            transition: Arc::clone(&self.transition),
        }
    }
}

impl<S> fmt::Debug for Projector<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projector")
            .field("id", &self.id)
            .field("query", &self.query)
            .finish_non_exhaustive()
    }
}

/// The outcome of a projection call.
#[derive(Debug, Clone)]
pub struct Projection<S> {
    /// Final state per projector id.
    pub states: HashMap<String, S>,
    /// The condition a subsequent conditional append should carry: the union
    /// of the projectors' queries, bounded at the last observed cursor.
    pub append_condition: AppendCondition,
    /// The last `(transaction_id, position)` observed by the scan, or the
    /// input cursor when no event matched.
    pub last_cursor: Option<Cursor>,
}

impl<S> Projection<S> {
    pub fn state(&self, id: &str) -> Option<&S> {
        self.states.get(id)
    }
}

/// Checks id uniqueness and returns the canonicalized union query of a
/// projector set.
pub fn union_query<P: StateProjector>(projectors: &[P]) -> Result<Query, ValidationError> {
    let mut seen = HashSet::new();
    for projector in projectors {
        if !seen.insert(projector.id()) {
            return Err(ValidationError::DuplicateProjectorId(
                projector.id().to_string(),
            ));
        }
    }
    Ok(Query::union(projectors.iter().map(|p| p.query().clone())).canonicalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::query::QueryItem;
    use chrono::Utc;

    fn persisted(transaction_id: i64, position: i64, event_type: &str) -> PersistedEvent {
        let event = Event::new(event_type)
            .unwrap()
            .with_tag("course_id", "c1")
            .unwrap();
        PersistedEvent::new(transaction_id, position, Utc::now(), event)
    }

    #[test]
    fn it_folds_events_through_the_transition() {
        let count = Projector::new("count", Query::all(), 0, |n, _| n + 1);
        let state = count.apply(count.initial_state(), &persisted(1, 1, "A"));
        let state = count.apply(state, &persisted(1, 2, "B"));
        assert_eq!(state, 2);
    }

    #[test]
    fn it_unions_projector_queries() {
        let a = Projector::new("a", Query::item(QueryItem::of_types(["A"])), 0, |n, _| n);
        let b = Projector::new("b", Query::item(QueryItem::of_types(["B"])), 0, |n, _| n);
        let union = union_query(&[a, b]).unwrap();
        assert_eq!(union.items().len(), 2);
    }

    #[test]
    fn it_rejects_duplicate_projector_ids() {
        let a = Projector::new("dup", Query::all(), 0, |n, _| n);
        let b = Projector::new("dup", Query::all(), 0, |n, _| n);
        assert_eq!(
            union_query(&[a, b]).unwrap_err(),
            ValidationError::DuplicateProjectorId("dup".into())
        );
    }
}
