//! Compiles the query algebra into a single parameterized scan.
//!
//! Every user-supplied value is bound, never concatenated: type sets bind as
//! `TEXT[]` behind `= ANY(..)`, tag sets bind as `TEXT[]` behind the indexed
//! containment operator `@>`, and cursors bind into a row comparison on
//! `(transaction_id, position)`. The committed-boundary predicate is always
//! appended so in-flight transactions never influence a scan.
use dcb::{Cursor, Query, Tag};
use sqlx::{Postgres, QueryBuilder};

/// Columns of a full event scan, in decode order.
const EVENT_COLUMNS: &str = "event_type, tags, data, transaction_id, position, occurred_at";

/// Excludes events whose transaction is not yet part of every reader's
/// visible snapshot. `pg_current_xact_id` assigns ids from the same series,
/// so the text/bigint cast chain keeps the comparison in one domain.
const COMMITTED_BOUNDARY: &str =
    "transaction_id < pg_snapshot_xmin(pg_current_snapshot())::text::bigint";

/// Builder for the two scan shapes of the store: the row scan used by
/// queries and projections, and the count scan used by the condition check.
pub(crate) struct ScanBuilder<'a> {
    query: &'a Query,
    after: Option<Cursor>,
    limit: Option<i64>,
}

impl<'a> ScanBuilder<'a> {
    /// Creates a builder for `query`. The query is compiled as given;
    /// callers canonicalize first so equivalent queries produce identical
    /// statements.
    pub fn new(query: &'a Query) -> Self {
        Self {
            query,
            after: None,
            limit: None,
        }
    }

    /// Restricts the scan to events strictly after the cursor.
    pub fn after(mut self, after: Option<Cursor>) -> Self {
        self.after = after;
        self
    }

    /// Caps the number of returned rows.
    pub fn limit(mut self, limit: Option<i64>) -> Self {
        self.limit = limit;
        self
    }

    /// Builds the row scan, ordered by `(transaction_id, position)`.
    pub fn select(self) -> QueryBuilder<'static, Postgres> {
        let mut builder =
            QueryBuilder::new(format!("SELECT {EVENT_COLUMNS} FROM events WHERE "));
        self.push_predicate(&mut builder);
        builder.push(" ORDER BY transaction_id ASC, position ASC");
        if let Some(limit) = self.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit);
        }
        builder
    }

    /// Builds the count scan of the condition check.
    pub fn count(self) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM events WHERE ");
        self.push_predicate(&mut builder);
        builder
    }

    fn push_predicate(&self, builder: &mut QueryBuilder<'static, Postgres>) {
        if self.query.is_none() {
            builder.push("FALSE");
        } else if self.query.items().iter().any(|item| item.is_unconstrained()) {
            // An unconstrained item absorbs the whole disjunction.
            builder.push("TRUE");
        } else {
            builder.push("(");
            let mut items = self.query.items().iter().peekable();
            while let Some(item) = items.next() {
                builder.push("(");
                if !item.types().is_empty() {
                    builder.push("event_type = ANY(");
                    builder.push_bind(item.types().to_vec());
                    builder.push(")");
                }
                if !item.types().is_empty() && !item.tags().is_empty() {
                    builder.push(" AND ");
                }
                if !item.tags().is_empty() {
                    builder.push("tags @> ");
                    builder.push_bind(wire_form(item.tags()));
                }
                builder.push(")");
                if items.peek().is_some() {
                    builder.push(" OR ");
                }
            }
            builder.push(")");
        }
        if let Some(cursor) = self.after {
            builder.push(" AND (transaction_id, position) > (");
            builder.push_bind(cursor.transaction_id);
            builder.push(", ");
            builder.push_bind(cursor.position);
            builder.push(")");
        }
        builder.push(" AND ");
        builder.push(COMMITTED_BOUNDARY);
    }
}

fn wire_form(tags: &[Tag]) -> Vec<String> {
    tags.iter().map(Tag::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcb::QueryItem;

    const BOUNDARY: &str =
        "transaction_id < pg_snapshot_xmin(pg_current_snapshot())::text::bigint";

    fn select_sql(query: &Query, after: Option<Cursor>) -> String {
        ScanBuilder::new(query).after(after).select().sql().to_string()
    }

    #[test]
    fn it_compiles_a_type_and_tag_item() {
        let query = Query::item(
            QueryItem::of_types(["StudentEnrolled"])
                .with_tag("course_id", "c1")
                .unwrap(),
        );
        assert_eq!(
            select_sql(&query, None),
            format!(
                "SELECT event_type, tags, data, transaction_id, position, occurred_at \
                 FROM events WHERE ((event_type = ANY($1) AND tags @> $2)) AND {BOUNDARY} \
                 ORDER BY transaction_id ASC, position ASC"
            )
        );
    }

    #[test]
    fn it_compiles_a_cursor_into_a_row_comparison() {
        let query = Query::item(QueryItem::of_types(["StudentEnrolled"]));
        assert_eq!(
            select_sql(&query, Some(Cursor::new(7, 42))),
            format!(
                "SELECT event_type, tags, data, transaction_id, position, occurred_at \
                 FROM events WHERE ((event_type = ANY($1))) \
                 AND (transaction_id, position) > ($2, $3) AND {BOUNDARY} \
                 ORDER BY transaction_id ASC, position ASC"
            )
        );
    }

    #[test]
    fn it_ors_items_together() {
        let query = Query::new(vec![
            QueryItem::of_types(["CourseDefined"]),
            QueryItem::all().with_tag("course_id", "c1").unwrap(),
        ]);
        assert_eq!(
            select_sql(&query, None),
            format!(
                "SELECT event_type, tags, data, transaction_id, position, occurred_at \
                 FROM events WHERE ((event_type = ANY($1)) OR (tags @> $2)) AND {BOUNDARY} \
                 ORDER BY transaction_id ASC, position ASC"
            )
        );
    }

    #[test]
    fn an_empty_item_list_compiles_to_false() {
        assert_eq!(
            select_sql(&Query::none(), None),
            format!(
                "SELECT event_type, tags, data, transaction_id, position, occurred_at \
                 FROM events WHERE FALSE AND {BOUNDARY} \
                 ORDER BY transaction_id ASC, position ASC"
            )
        );
    }

    #[test]
    fn an_unconstrained_item_absorbs_the_disjunction() {
        let query = Query::new(vec![QueryItem::of_types(["CourseDefined"]), QueryItem::all()]);
        assert_eq!(
            select_sql(&query, None),
            format!(
                "SELECT event_type, tags, data, transaction_id, position, occurred_at \
                 FROM events WHERE TRUE AND {BOUNDARY} \
                 ORDER BY transaction_id ASC, position ASC"
            )
        );
    }

    #[test]
    fn it_compiles_the_count_scan_for_the_condition_check() {
        let query = Query::item(QueryItem::all().with_tag("course_id", "c1").unwrap());
        let sql = ScanBuilder::new(&query)
            .after(Some(Cursor::new(1, 1)))
            .count()
            .sql()
            .to_string();
        assert_eq!(
            sql,
            format!(
                "SELECT COUNT(*) FROM events WHERE ((tags @> $1)) \
                 AND (transaction_id, position) > ($2, $3) AND {BOUNDARY}"
            )
        );
    }

    #[test]
    fn it_caps_rows_with_a_bound_limit() {
        let sql = ScanBuilder::new(&Query::all())
            .limit(Some(10))
            .select()
            .sql()
            .to_string();
        assert_eq!(
            sql,
            format!(
                "SELECT event_type, tags, data, transaction_id, position, occurred_at \
                 FROM events WHERE TRUE AND {BOUNDARY} \
                 ORDER BY transaction_id ASC, position ASC LIMIT $1"
            )
        );
    }

    #[test]
    fn equivalent_queries_compile_to_identical_statements() {
        let a = Query::item(
            QueryItem::of_types(["B", "A"])
                .with_tag("k", "2")
                .unwrap()
                .with_tag("k", "1")
                .unwrap(),
        )
        .canonicalize();
        let b = Query::item(
            QueryItem::of_types(["A", "B", "A"])
                .with_tag("k", "1")
                .unwrap()
                .with_tag("k", "2")
                .unwrap(),
        )
        .canonicalize();
        assert_eq!(select_sql(&a, None), select_sql(&b, None));
    }
}
