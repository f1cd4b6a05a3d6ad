//! Resource serialization through transaction-scoped advisory locks.
//!
//! An input event can carry `lock:<resource>` directives. Before the
//! condition check, the append acquires `pg_advisory_xact_lock` on a stable
//! 64-bit key per distinct resource, inside the transaction that performs
//! the insert. The locks release on commit or rollback; there is no manual
//! release path. Keys are acquired in sorted order so two appends naming the
//! same resources can never deadlock each other.
use crate::Error;
use dcb::Event;
use md5::{Digest, Md5};
use sqlx::{Postgres, Transaction};
use std::collections::BTreeSet;
use std::time::Duration;

/// The sorted advisory lock keys for the distinct `lock:` resources of a
/// batch. Empty when no event carries a directive.
pub(crate) fn lock_keys(events: &[Event]) -> Vec<i64> {
    events
        .iter()
        .flat_map(Event::lock_resources)
        .map(advisory_lock_key)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Derives a stable 64-bit lock key from a resource name: the first eight
/// bytes of its MD5 digest, big-endian.
pub(crate) fn advisory_lock_key(resource: &str) -> i64 {
    let digest = Md5::digest(resource.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}

/// Acquires the given keys in order, bounded by `timeout`.
///
/// The timeout is installed with `set_config(.., true)` so it only applies
/// to this transaction. A wait that exceeds it surfaces the database's
/// `lock_not_available` condition, reported as [`Error::LockTimeout`].
pub(crate) async fn acquire(
    tx: &mut Transaction<'_, Postgres>,
    keys: &[i64],
    timeout: Duration,
) -> Result<(), Error> {
    sqlx::query("SELECT set_config('lock_timeout', $1, true)")
        .bind(format!("{}ms", timeout.as_millis()))
        .execute(&mut **tx)
        .await?;
    for key in keys.iter().copied() {
        tracing::debug!(key, "acquiring advisory lock");
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(key)
            .execute(&mut **tx)
            .await
            .map_err(map_lock_err)?;
    }
    Ok(())
}

fn map_lock_err(err: sqlx::Error) -> Error {
    if let sqlx::Error::Database(ref description) = err {
        if description.code().as_deref() == Some("55P03") {
            return Error::LockTimeout(err);
        }
    }
    Error::Database(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_derives_deterministic_keys() {
        assert_eq!(
            advisory_lock_key("seat:c1"),
            advisory_lock_key("seat:c1")
        );
        assert_ne!(advisory_lock_key("seat:c1"), advisory_lock_key("seat:c2"));
    }

    #[test]
    fn it_collects_distinct_resources_in_sorted_key_order() {
        let events = [
            Event::new("A")
                .unwrap()
                .with_tag("course_id", "c1")
                .unwrap()
                .with_tag("lock", "seat:c1")
                .unwrap(),
            Event::new("B")
                .unwrap()
                .with_tag("course_id", "c1")
                .unwrap()
                .with_tag("lock", "seat:c1")
                .unwrap()
                .with_tag("lock", "room:r9")
                .unwrap(),
        ];
        let keys = lock_keys(&events);
        assert_eq!(keys.len(), 2);
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn it_returns_no_keys_without_directives() {
        let events = [Event::new("A")
            .unwrap()
            .with_tag("course_id", "c1")
            .unwrap()];
        assert!(lock_keys(&events).is_empty());
    }
}
