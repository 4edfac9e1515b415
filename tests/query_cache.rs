mod support;

use std::time::Duration;

use agromart::cache::{CacheKey, QueryOptions, QueryStatus, TransportError};
use serde_json::json;

use support::{ScriptedTransport, client};

#[tokio::test(start_paused = true)]
async fn concurrent_queries_share_one_fetch() {
    let transport = ScriptedTransport::new();
    let key = CacheKey::lands();
    transport.script(&key, Duration::from_millis(100), Ok(json!([{ "_id": "l1" }])));
    let client = client(&transport);

    let (a, b, c) = tokio::join!(client.query(&key), client.query(&key), client.query(&key));

    assert_eq!(transport.fetches(&key), 1);
    for result in [a, b, c] {
        assert_eq!(result.status, QueryStatus::Success);
        assert_eq!(result.data.as_deref(), Some(&json!([{ "_id": "l1" }])));
    }
}

#[tokio::test]
async fn fresh_entries_are_served_from_cache() {
    let transport = ScriptedTransport::new();
    let key = CacheKey::products(None);
    transport.respond(&key, json!([{ "_id": "p1" }]));
    let client = client(&transport);

    let first = client.query(&key).await;
    let second = client.query(&key).await;

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(second.data, first.data);
    assert_eq!(transport.fetches(&key), 1);
}

#[tokio::test]
async fn forced_refetch_issues_a_new_request() {
    let transport = ScriptedTransport::new();
    let key = CacheKey::user_orders();
    transport.script(&key, Duration::ZERO, Ok(json!(["v1"])));
    transport.script(&key, Duration::ZERO, Ok(json!(["v2"])));
    let client = client(&transport);

    client.query(&key).await;
    let refreshed = client.refetch(&key).await;

    assert_eq!(transport.fetches(&key), 2);
    assert_eq!(refreshed.data.as_deref(), Some(&json!(["v2"])));
}

#[tokio::test(start_paused = true)]
async fn out_of_order_completion_keeps_the_newest_result() {
    let transport = ScriptedTransport::new();
    let key = CacheKey::lands();
    transport.script(&key, Duration::from_millis(200), Ok(json!(["old"])));
    transport.script(&key, Duration::from_millis(50), Ok(json!(["new"])));
    let client = client(&transport);

    let slow = tokio::spawn({
        let client = client.clone();
        let key = key.clone();
        async move { client.query(&key).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let fast = client.refetch(&key).await;
    assert_eq!(fast.data.as_deref(), Some(&json!(["new"])));

    let slow = slow.await.expect("slow query");
    let entry = client.get(&key).expect("entry");

    assert_eq!(entry.data().map(|data| data.as_ref()), Some(&json!(["new"])));
    assert_eq!(entry.status(), QueryStatus::Success);
    assert!(!entry.is_loading());
    assert_eq!(slow.data.as_deref(), Some(&json!(["new"])));
}

#[tokio::test(start_paused = true)]
async fn shared_failure_reaches_every_caller_and_is_retried_later() {
    let transport = ScriptedTransport::new();
    let key = CacheKey::profile("u1");
    transport.script(
        &key,
        Duration::from_millis(20),
        Err(TransportError::status(500, "database offline")),
    );
    transport.respond(&key, json!({ "_id": "u1" }));
    let client = client(&transport);

    let (a, b) = tokio::join!(client.query(&key), client.query(&key));

    assert_eq!(transport.fetches(&key), 1);
    for result in [&a, &b] {
        assert_eq!(result.status, QueryStatus::Error);
        assert_eq!(
            result.error,
            Some(TransportError::status(500, "database offline"))
        );
    }
    assert_eq!(
        client.get(&key).map(|entry| entry.status()),
        Some(QueryStatus::Error)
    );

    let retried = client.query(&key).await;
    assert_eq!(transport.fetches(&key), 2);
    assert!(retried.is_success());
    assert!(client.get(&key).is_some_and(|entry| entry.error().is_none()));
}

#[tokio::test]
async fn skipped_and_incomplete_keys_never_fetch() {
    let transport = ScriptedTransport::new();
    let client = client(&transport);

    let skipped = client
        .query_with(&CacheKey::lands(), QueryOptions::skipped())
        .await;
    let incomplete = client.query(&CacheKey::user_lands("")).await;

    assert_eq!(skipped.status, QueryStatus::Uninitialized);
    assert_eq!(incomplete.status, QueryStatus::Uninitialized);
    assert_eq!(transport.total_fetches(), 0);
    assert!(client.store().is_empty());
}

#[tokio::test(start_paused = true)]
async fn fetch_completes_after_the_caller_goes_away() {
    let transport = ScriptedTransport::new();
    let key = CacheKey::all_orders();
    transport.script(&key, Duration::from_millis(100), Ok(json!([{ "_id": "o1" }])));
    let client = client(&transport);

    let caller = tokio::spawn({
        let client = client.clone();
        let key = key.clone();
        async move { client.query(&key).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    caller.abort();

    tokio::time::sleep(Duration::from_millis(200)).await;

    let entry = client.get(&key).expect("entry");
    assert_eq!(entry.status(), QueryStatus::Success);
    assert_eq!(transport.fetches(&key), 1);
}

#[tokio::test]
async fn reset_drops_entries_and_refetches_on_next_query() {
    let transport = ScriptedTransport::new();
    let key = CacheKey::lands();
    transport.respond(&key, json!([]));
    let client = client(&transport);

    client.query(&key).await;
    client.reset();
    assert!(client.get(&key).is_none());
    assert_eq!(client.tag_index().key_count(), 0);

    client.query(&key).await;
    assert_eq!(transport.fetches(&key), 2);
}
