//! The condition evaluated inside an append transaction.
use crate::cursor::Cursor;
use crate::query::Query;
use serde::{Deserialize, Serialize};

/// Rejects an append if any committed event matches `fail_if_events_match`
/// strictly after `after_cursor` (or anywhere, when no cursor is given) at
/// the moment of the check.
///
/// A projection emits a condition whose query is the union of its
/// projectors' queries and whose cursor is the last observed point: "fail if
/// anything I looked at has changed since I looked".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendCondition {
    pub fail_if_events_match: Query,
    pub after_cursor: Option<Cursor>,
}

impl AppendCondition {
    /// A condition over the whole history of events matching `query`.
    pub fn new(query: Query) -> Self {
        Self {
            fail_if_events_match: query,
            after_cursor: None,
        }
    }

    /// Bounds the check to events strictly after `cursor`.
    pub fn after(mut self, cursor: Cursor) -> Self {
        self.after_cursor = Some(cursor);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_builds_a_bounded_condition() {
        let condition = AppendCondition::new(Query::all()).after(Cursor::new(3, 14));
        assert_eq!(condition.after_cursor, Some(Cursor::new(3, 14)));
        assert!(!condition.fail_if_events_match.is_none());
    }
}
