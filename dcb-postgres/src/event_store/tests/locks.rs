use super::{enrollment, store, store_with};
use crate::event_store::locks::advisory_lock_key;
use crate::{Error, PgEventStoreConfig};
use dcb::{Event, EventStore, Query, QueryItem};
use sqlx::PgPool;
use std::time::Duration;

fn locked_enrollment(course: &str, student: &str) -> Event {
    enrollment(course, student)
        .with_tag("lock", format!("seat:{course}"))
        .unwrap()
}

#[sqlx::test]
async fn it_serializes_concurrent_appends_on_a_resource(pool: PgPool) {
    let store = store(pool).await;

    let (a, b) = tokio::join!(
        store.append(vec![locked_enrollment("c1", "s1")]),
        store.append(vec![locked_enrollment("c1", "s2")]),
    );
    a.unwrap();
    b.unwrap();

    let events = store.query(&Query::all(), None).await.unwrap();
    assert_eq!(events.len(), 2);
}

#[sqlx::test]
async fn lock_directives_never_surface_through_queries(pool: PgPool) {
    let store = store(pool).await;
    store
        .append(vec![locked_enrollment("c1", "s1")])
        .await
        .unwrap();

    // The stored record carries only the filter tags.
    let events = store.query(&Query::all(), None).await.unwrap();
    assert!(events[0].tags().iter().all(|t| !t.is_lock_directive()));

    // And the directive is not addressable as a tag predicate.
    let by_directive = Query::item(QueryItem::all().with_tag("lock", "seat:c1").unwrap());
    assert!(store.query(&by_directive, None).await.unwrap().is_empty());
}

#[sqlx::test]
async fn it_reports_a_lock_timeout_as_such(pool: PgPool) {
    let store = store_with(
        pool.clone(),
        PgEventStoreConfig::default().with_lock_timeout(Duration::from_millis(100)),
    )
    .await;

    // A session-level lock on the same key keeps the append waiting past
    // its lock timeout.
    let mut holder = pool.acquire().await.unwrap();
    sqlx::query("SELECT pg_advisory_lock($1)")
        .bind(advisory_lock_key("seat:c1"))
        .execute(&mut *holder)
        .await
        .unwrap();

    let err = store
        .append(vec![locked_enrollment("c1", "s1")])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::LockTimeout(_)));

    sqlx::query("SELECT pg_advisory_unlock_all()")
        .execute(&mut *holder)
        .await
        .unwrap();
}
