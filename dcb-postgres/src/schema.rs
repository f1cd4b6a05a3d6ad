//! Schema bootstrap and startup validation for the `events` table.
//!
//! The DDL is idempotent and applied statement by statement during
//! [`PgEventStore::try_new`](crate::PgEventStore::try_new). Deployments that
//! manage the schema themselves skip the DDL via
//! [`PgEventStore::new_uninitialized`](crate::PgEventStore::new_uninitialized);
//! the structural validation still runs, because every operation of the
//! store assumes the column contract below.
use crate::Error;
use sqlx::PgPool;

/// The columns the store requires, with the `information_schema` data types
/// they must report.
const REQUIRED_COLUMNS: &[(&str, &str)] = &[
    ("position", "bigint"),
    ("transaction_id", "bigint"),
    ("event_type", "text"),
    ("tags", "ARRAY"),
    ("data", "jsonb"),
    ("occurred_at", "timestamp with time zone"),
];

/// Manages the physical layout of the event store.
pub struct Schema;

impl Schema {
    /// Applies the event store DDL: the position sequence, the `events`
    /// table, and its three indices.
    pub async fn init(pool: &PgPool) -> Result<(), Error> {
        sqlx::query(include_str!("event_store/sql/seq_events_position.sql"))
            .execute(pool)
            .await?;
        sqlx::query(include_str!("event_store/sql/table_events.sql"))
            .execute(pool)
            .await?;
        sqlx::query(include_str!("event_store/sql/idx_events_type.sql"))
            .execute(pool)
            .await?;
        sqlx::query(include_str!("event_store/sql/idx_events_tags.sql"))
            .execute(pool)
            .await?;
        sqlx::query(include_str!(
            "event_store/sql/idx_events_transaction_id_position.sql"
        ))
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Verifies that the `events` table exists and carries the required
    /// columns with compatible types.
    pub async fn validate(pool: &PgPool) -> Result<(), Error> {
        let columns: Vec<(String, String)> = sqlx::query_as(
            "SELECT column_name, data_type FROM information_schema.columns WHERE table_name = 'events'",
        )
        .fetch_all(pool)
        .await?;

        if columns.is_empty() {
            return Err(Error::TableStructure("events table not found".into()));
        }
        for (name, data_type) in REQUIRED_COLUMNS {
            match columns.iter().find(|(n, _)| n == name) {
                None => {
                    return Err(Error::TableStructure(format!("missing column `{name}`")));
                }
                Some((_, actual)) if actual != data_type => {
                    return Err(Error::TableStructure(format!(
                        "column `{name}` has type `{actual}`, expected `{data_type}`"
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}
