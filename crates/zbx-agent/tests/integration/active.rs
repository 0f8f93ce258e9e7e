//! Active checks against a fake server on loopback TCP.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use zbx_agent::{start_active, ActiveError};

use crate::harness::{item, FakeCollector};

#[tokio::test]
async fn test_register_and_push() {
    let collector = FakeCollector::accepting(vec![item("agent.ping", 1000)]).await;

    let (session, items) = start_active("myserver.example.com", &collector.addr.to_string())
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].key, "agent.ping");
    assert_eq!(items[0].item_id, 1000);
    assert_eq!(session.hostname(), "myserver.example.com");
    assert_eq!(session.next_sequence(1000).await, Some(0));

    let mut values = BTreeMap::new();
    values.insert(1000u64, "ok");
    session.push(values).await.unwrap();
    assert_eq!(session.next_sequence(1000).await, Some(1));

    let requests = collector.requests().await;
    assert_eq!(requests.len(), 2);

    let registration = &requests[0];
    assert_eq!(registration["request"], "active checks");
    assert_eq!(registration["host"], "myserver.example.com");
    assert_eq!(registration["version"], "7.0.0");
    assert_eq!(registration["variant"], 2);

    let push = &requests[1];
    assert_eq!(push["request"], "agent data");
    assert_eq!(push["session"], session.session_id());
    assert_eq!(push["host"], "myserver.example.com");
    assert_eq!(push["variant"], 2);
    assert_eq!(push["data"][0]["id"], 0);
    assert_eq!(push["data"][0]["itemid"], 1000);
    assert_eq!(push["data"][0]["value"], "ok");
    assert!(push["data"][0]["clock"].as_i64().unwrap() > 0);
    assert!(push["data"][0]["ns"].as_i64().unwrap() < 1_000_000_000);
}

#[tokio::test]
async fn test_sequence_ids_per_item() {
    let collector =
        FakeCollector::accepting(vec![item("agent.ping", 1000), item("system.uptime", 1001)])
            .await;
    let (session, _) = start_active("example", &collector.addr.to_string())
        .await
        .unwrap();

    session.push([(1000u64, "1"), (1001, "3600")]).await.unwrap();
    session.push([(1000u64, "1")]).await.unwrap();
    session.push([(1001u64, "3660"), (1000, "1")]).await.unwrap();

    let pushes = collector.pushes().await;
    assert_eq!(pushes.len(), 3);

    let ids = |push: &serde_json::Value| -> Vec<(u64, u64)> {
        push["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| (v["itemid"].as_u64().unwrap(), v["id"].as_u64().unwrap()))
            .collect()
    };
    assert_eq!(ids(&pushes[0]), vec![(1000, 0), (1001, 0)]);
    assert_eq!(ids(&pushes[1]), vec![(1000, 1)]);
    assert_eq!(ids(&pushes[2]), vec![(1001, 1), (1000, 2)]);

    assert_eq!(session.next_sequence(1000).await, Some(3));
    assert_eq!(session.next_sequence(1001).await, Some(2));
}

#[tokio::test]
async fn test_sessions_track_sequences_independently() {
    let collector = FakeCollector::accepting(vec![item("agent.ping", 1000)]).await;
    let (first, _) = start_active("example", &collector.addr.to_string())
        .await
        .unwrap();
    let (second, _) = start_active("example", &collector.addr.to_string())
        .await
        .unwrap();
    assert_ne!(first.session_id(), second.session_id());

    for _ in 0..3 {
        first.push([(1000u64, "1")]).await.unwrap();
    }
    second.push([(1000u64, "1")]).await.unwrap();

    let pushes = collector.pushes().await;
    assert_eq!(pushes.len(), 4);
    let from_second: Vec<_> = pushes
        .iter()
        .filter(|p| p["session"] == second.session_id())
        .collect();
    assert_eq!(from_second.len(), 1);
    assert_eq!(from_second[0]["data"][0]["id"], 0);
}

#[tokio::test]
async fn test_concurrent_pushes_never_share_sequence_ids() {
    let collector = FakeCollector::accepting(vec![item("agent.ping", 1000)]).await;
    let (session, _) = start_active("example", &collector.addr.to_string())
        .await
        .unwrap();
    let session = Arc::new(session);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let session = session.clone();
        handles.push(tokio::spawn(async move {
            session.push([(1000u64, "1")]).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let mut ids: Vec<u64> = collector
        .pushes()
        .await
        .iter()
        .map(|p| p["data"][0]["id"].as_u64().unwrap())
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, (0..16).collect::<Vec<_>>());
    assert_eq!(session.next_sequence(1000).await, Some(16));
}

#[tokio::test]
async fn test_push_rejected_surfaces_info() {
    let collector = FakeCollector::start(
        vec![item("agent.ping", 1000)],
        json!({ "response": "failed", "info": "host is not monitored" }),
        None,
    )
    .await;
    let (session, _) = start_active("example", &collector.addr.to_string())
        .await
        .unwrap();

    let err = session.push([(1000u64, "1")]).await.unwrap_err();
    assert!(matches!(err, ActiveError::Send(ref info) if info == "host is not monitored"));
    assert_eq!(err.to_string(), "send error: host is not monitored");
}

#[tokio::test]
async fn test_push_rejected_without_info() {
    let collector = FakeCollector::start(
        vec![item("agent.ping", 1000)],
        json!({ "response": "failed" }),
        None,
    )
    .await;
    let (session, _) = start_active("example", &collector.addr.to_string())
        .await
        .unwrap();

    let err = session.push([(1000u64, "1")]).await.unwrap_err();
    assert_eq!(err.to_string(), "send error: unrecognized reply from server");
}
