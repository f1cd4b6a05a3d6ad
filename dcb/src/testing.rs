//! Utility for testing projectors without a store.
//!
//! The test harness sets up a history of events, folds a projector over the
//! ones its query matches, and makes assertions about the resulting state
//! and the append condition the projection would emit. Each history entry is
//! committed as its own transaction, so cursors behave like they do against
//! a real store.
//!
//! ```
//! use dcb::{Event, Projector, Query, QueryItem, TestHarness};
//!
//! let enrollment = |student: &str| {
//!     Event::new("StudentEnrolled").unwrap()
//!         .with_tag("course_id", "c1").unwrap()
//!         .with_tag("student_id", student).unwrap()
//! };
//!
//! let count = Projector::new(
//!     "enrollment_count",
//!     Query::item(QueryItem::of_types(["StudentEnrolled"])),
//!     0,
//!     |n, _| n + 1,
//! );
//!
//! TestHarness::given([enrollment("s1"), enrollment("s2")])
//!     .when(count)
//!     .then(2);
//! ```
use crate::condition::AppendCondition;
use crate::cursor::Cursor;
use crate::event::{Event, PersistedEvent};
use crate::projector::StateProjector;
use chrono::Utc;
use std::fmt::Debug;

/// Test harness for projectors.
pub struct TestHarness;

impl TestHarness {
    /// Sets up a history of events, each committed as its own transaction
    /// in the given order.
    pub fn given(history: impl Into<Vec<Event>>) -> TestHarnessStep<Given> {
        let history = history
            .into()
            .into_iter()
            .enumerate()
            .map(|(i, event)| {
                let seq = i as i64 + 1;
                PersistedEvent::new(seq, seq, Utc::now(), event)
            })
            .collect();
        TestHarnessStep {
            history,
            _step: Given,
        }
    }
}

/// Represents the given step of the test harness.
pub struct Given;

/// Represents the when step of the test harness.
pub struct When<S> {
    state: S,
    condition: AppendCondition,
}

pub struct TestHarnessStep<ST> {
    history: Vec<PersistedEvent>,
    _step: ST,
}

impl TestHarnessStep<Given> {
    /// Folds the projector over the matching events of the history.
    pub fn when<P>(self, projector: P) -> TestHarnessStep<When<P::State>>
    where
        P: StateProjector,
    {
        let mut state = projector.initial_state();
        let mut last: Option<Cursor> = None;
        for event in self
            .history
            .iter()
            .filter(|event| projector.query().matches(event))
        {
            state = projector.apply(state, event);
            last = Some(event.cursor());
        }
        let condition = AppendCondition {
            fail_if_events_match: projector.query().clone(),
            after_cursor: last,
        };
        TestHarnessStep {
            history: self.history,
            _step: When { state, condition },
        }
    }
}

impl<S: Debug + PartialEq> TestHarnessStep<When<S>> {
    /// Asserts the final state of the projector.
    ///
    /// # Panics
    ///
    /// Panics if the state does not match the expected value.
    #[track_caller]
    pub fn then(self, expected: S) -> Self {
        assert_eq!(self._step.state, expected);
        self
    }

    /// Asserts the cursor the emitted append condition is bounded at.
    ///
    /// # Panics
    ///
    /// Panics if the condition cursor does not match the expected value.
    #[track_caller]
    pub fn then_observed(self, expected: Option<Cursor>) -> Self {
        assert_eq!(self._step.condition.after_cursor, expected);
        self
    }

    /// The append condition the projection would emit, for further checks.
    pub fn append_condition(&self) -> &AppendCondition {
        &self._step.condition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projector::Projector;
    use crate::query::{Query, QueryItem};

    fn enrollment(course: &str, student: &str) -> Event {
        Event::new("StudentEnrolled")
            .unwrap()
            .with_tag("course_id", course)
            .unwrap()
            .with_tag("student_id", student)
            .unwrap()
    }

    fn count(course: &str) -> Projector<i64> {
        Projector::new(
            "enrollment_count",
            Query::item(
                QueryItem::of_types(["StudentEnrolled"])
                    .with_tag("course_id", course)
                    .unwrap(),
            ),
            0,
            |n, _| n + 1,
        )
    }

    #[test]
    fn it_folds_only_the_matching_history() {
        TestHarness::given([
            enrollment("c1", "s1"),
            enrollment("c2", "s1"),
            enrollment("c1", "s2"),
        ])
        .when(count("c1"))
        .then(2)
        .then_observed(Some(Cursor::new(3, 3)));
    }

    #[test]
    fn it_keeps_no_cursor_for_an_unmatched_history() {
        TestHarness::given([enrollment("c2", "s1")])
            .when(count("c1"))
            .then(0)
            .then_observed(None);
    }

    #[test]
    #[should_panic]
    fn it_panics_on_an_unexpected_state() {
        TestHarness::given([enrollment("c1", "s1")])
            .when(count("c1"))
            .then(7);
    }

    #[test]
    fn it_exposes_the_emitted_condition() {
        let step = TestHarness::given([enrollment("c1", "s1")]).when(count("c1"));
        let condition = step.append_condition();
        assert!(condition
            .fail_if_events_match
            .matches(&enrollment("c1", "s9")));
    }
}
