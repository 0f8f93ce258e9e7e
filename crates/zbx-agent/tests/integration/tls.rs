//! Certificate-authenticated variants of the passive and active flows.

use zbx_agent::{query, start_active_tls, Dialer, QueryReply};

use crate::harness::{item, FakeCollector, RunningAgent, TestPki};

#[tokio::test]
async fn test_passive_query_over_mutual_tls() {
    let pki = TestPki::generate();
    let agent = RunningAgent::spawn(Some(pki.server_config(true))).await;

    let dialer = Dialer::tls(
        agent.addr.to_string(),
        pki.client_config(true),
        "localhost",
    )
    .unwrap();
    assert_eq!(
        query(&dialer, "agent.ping").await.unwrap(),
        QueryReply::Value("1".into())
    );
    assert_eq!(
        query(&dialer, "generate.error").await.unwrap(),
        QueryReply::NotSupported("this is an error".into())
    );

    agent.shutdown().await;
}

#[tokio::test]
async fn test_passive_tls_rejects_client_without_certificate() {
    let pki = TestPki::generate();
    let agent = RunningAgent::spawn(Some(pki.server_config(true))).await;

    let dialer = Dialer::tls(
        agent.addr.to_string(),
        pki.client_config(false),
        "localhost",
    )
    .unwrap();
    assert!(query(&dialer, "agent.ping").await.is_err());

    // The listener survives failed handshakes
    let dialer = Dialer::tls(
        agent.addr.to_string(),
        pki.client_config(true),
        "localhost",
    )
    .unwrap();
    assert_eq!(
        query(&dialer, "agent.ping").await.unwrap(),
        QueryReply::Value("1".into())
    );

    agent.shutdown().await;
}

#[tokio::test]
async fn test_plain_client_gets_nothing_from_tls_agent() {
    let pki = TestPki::generate();
    let agent = RunningAgent::spawn(Some(pki.server_config(false))).await;

    let result = query(&Dialer::plain(agent.addr.to_string()), "agent.ping").await;
    assert!(result.is_err());

    agent.shutdown().await;
}

#[tokio::test]
async fn test_active_session_over_tls() {
    let pki = TestPki::generate();
    let collector = FakeCollector::start(
        vec![item("agent.ping", 1000)],
        serde_json::json!({ "response": "success", "info": "processed: 1" }),
        Some(pki.server_config(true)),
    )
    .await;

    let (session, items) = start_active_tls(
        "myserver.example.com",
        &collector.addr.to_string(),
        pki.client_config(true),
        "localhost",
    )
    .await
    .unwrap();
    assert_eq!(items.len(), 1);

    session.push([(1000u64, "ok")]).await.unwrap();
    assert_eq!(session.next_sequence(1000).await, Some(1));

    let pushes = collector.pushes().await;
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0]["data"][0]["value"], "ok");
    assert_eq!(pushes[0]["data"][0]["id"], 0);
}

#[tokio::test]
async fn test_active_tls_wrong_server_name_fails() {
    let pki = TestPki::generate();
    let collector = FakeCollector::start(
        vec![item("agent.ping", 1000)],
        serde_json::json!({ "response": "success" }),
        Some(pki.server_config(false)),
    )
    .await;

    let result = start_active_tls(
        "example",
        &collector.addr.to_string(),
        pki.client_config(false),
        "zabbix.example.com",
    )
    .await;
    assert!(result.is_err());
    assert!(collector.requests().await.is_empty());
}
