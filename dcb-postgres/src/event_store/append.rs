//! Batch insert and the DCB condition check.
use crate::event_store::criteria::ScanBuilder;
use crate::Error;
use dcb::{AppendCondition, Event, Tag};
use sqlx::postgres::PgArguments;
use sqlx::query::Query as SqlxQuery;
use sqlx::{Postgres, Transaction};

/// SQL Insert Events Builder
///
/// Builds the single set-based insert statement for a batch. The store
/// assigns `transaction_id`, `position`, and `occurred_at` through column
/// defaults; positions are drawn from the global sequence in the order the
/// values appear, so the supplied order defines the per-batch order. Lock
/// directives are stripped here: only filter tags are persisted.
pub(crate) struct InsertEventsBuilder<'a> {
    builder: sqlx::QueryBuilder<'a, Postgres>,
    events: &'a [Event],
}

impl<'a> InsertEventsBuilder<'a> {
    pub fn new(events: &'a [Event]) -> Self {
        Self {
            builder: sqlx::QueryBuilder::new("INSERT INTO events (event_type, tags, data) "),
            events,
        }
    }

    /// Builds the SQL batch insert query.
    pub fn build(&'a mut self) -> SqlxQuery<'a, Postgres, PgArguments> {
        self.builder.push_values(self.events, |mut b, event| {
            b.push_bind(event.event_type().to_string());
            b.push_bind(
                event
                    .filter_tags()
                    .map(Tag::to_string)
                    .collect::<Vec<String>>(),
            );
            b.push_bind(event.data().clone());
        });
        self.builder.push(" RETURNING transaction_id, position");
        self.builder.build()
    }
}

/// Evaluates an append condition against the committed snapshot, inside the
/// append's transaction.
///
/// One count scan; the committed-boundary predicate keeps concurrent
/// in-flight transactions out of the result. A non-zero count is a typed
/// status here, not an error: the append engine maps it.
pub(crate) async fn check_condition(
    tx: &mut Transaction<'_, Postgres>,
    condition: &AppendCondition,
) -> Result<i64, Error> {
    if condition.fail_if_events_match.is_none() {
        return Ok(0);
    }
    let query = condition.fail_if_events_match.clone().canonicalize();
    let mut builder = ScanBuilder::new(&query)
        .after(condition.after_cursor)
        .count();
    let matching: i64 = builder
        .build_query_scalar()
        .fetch_one(&mut **tx)
        .await?;
    Ok(matching)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Execute;

    #[test]
    fn it_builds_a_set_based_insert_returning_the_assigned_order() {
        let events = [
            Event::new("CourseDefined")
                .unwrap()
                .with_tag("course_id", "c1")
                .unwrap(),
            Event::new("StudentEnrolled")
                .unwrap()
                .with_tag("course_id", "c1")
                .unwrap()
                .with_tag("student_id", "s1")
                .unwrap(),
        ];
        let mut insert = InsertEventsBuilder::new(&events);
        assert_eq!(
            insert.build().sql(),
            "INSERT INTO events (event_type, tags, data) VALUES ($1, $2, $3), ($4, $5, $6) \
             RETURNING transaction_id, position"
        );
    }
}
