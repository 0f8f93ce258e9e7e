//! Passive checks over real loopback TCP.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use zbx_agent::{query, Dialer, QueryError, QueryReply};
use zbx_protocol::read_frame;

use crate::harness::RunningAgent;

#[tokio::test]
async fn test_query_known_unknown_and_error_keys() {
    let agent = RunningAgent::spawn(None).await;
    let dialer = Dialer::plain(agent.addr.to_string());

    assert_eq!(
        query(&dialer, "agent.ping").await.unwrap(),
        QueryReply::Value("1".into())
    );
    assert_eq!(
        query(&dialer, "system.hostname").await.unwrap(),
        QueryReply::Value("myserver.example.com".into())
    );
    assert_eq!(
        query(&dialer, "not.a.key").await.unwrap(),
        QueryReply::NotSupported("Item key unknown".into())
    );
    assert_eq!(
        query(&dialer, "generate.error").await.unwrap(),
        QueryReply::NotSupported("this is an error".into())
    );

    agent.shutdown().await;
}

#[tokio::test]
async fn test_panic_in_source_keeps_serving() {
    let agent = RunningAgent::spawn(None).await;
    let dialer = Dialer::plain(agent.addr.to_string());

    assert_eq!(
        query(&dialer, "generate.panic").await.unwrap(),
        QueryReply::NotSupported("Item key unknown".into())
    );
    assert_eq!(
        query(&dialer, "agent.ping").await.unwrap(),
        QueryReply::Value("1".into())
    );

    agent.shutdown().await;
}

#[tokio::test]
async fn test_raw_reply_bytes() {
    let agent = RunningAgent::spawn(None).await;
    let mut conn = TcpStream::connect(agent.addr).await.unwrap();

    let mut request = b"ZBXD\x01".to_vec();
    request.extend_from_slice(&10u32.to_le_bytes());
    request.extend_from_slice(&[0u8; 4]);
    request.extend_from_slice(b"agent.ping");
    conn.write_all(&request).await.unwrap();

    let mut reply = Vec::new();
    conn.read_to_end(&mut reply).await.unwrap();
    assert_eq!(reply, b"ZBXD\x01\x01\x00\x00\x00\x00\x00\x00\x00\x31");

    agent.shutdown().await;
}

#[tokio::test]
async fn test_malformed_header_gets_no_reply() {
    let agent = RunningAgent::spawn(None).await;
    let mut conn = TcpStream::connect(agent.addr).await.unwrap();
    conn.write_all(b"Hack the planet!").await.unwrap();

    // Unread request bytes may turn the close into a reset
    let mut reply = Vec::new();
    match conn.read_to_end(&mut reply).await {
        Ok(_) => assert!(reply.is_empty()),
        Err(e) => assert_eq!(e.kind(), std::io::ErrorKind::ConnectionReset),
    }

    agent.shutdown().await;
}

#[tokio::test]
async fn test_short_body_closed_while_client_waits() {
    let agent = RunningAgent::spawn(None).await;
    let mut conn = TcpStream::connect(agent.addr).await.unwrap();

    // Declares 128 bytes, sends 10, then waits for a reply without closing
    let mut request = b"ZBXD\x01".to_vec();
    request.extend_from_slice(&128u32.to_le_bytes());
    request.extend_from_slice(&[0u8; 4]);
    request.extend_from_slice(b"agent.ping");
    conn.write_all(&request).await.unwrap();

    let mut reply = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(3), conn.read_to_end(&mut reply))
        .await
        .expect("agent kept the short frame open");
    match read {
        Ok(_) => assert!(reply.is_empty()),
        Err(e) => assert_eq!(e.kind(), std::io::ErrorKind::ConnectionReset),
    }

    agent.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_queries() {
    let agent = RunningAgent::spawn(None).await;
    let dialer = Dialer::plain(agent.addr.to_string());

    let mut handles = Vec::new();
    for i in 0..32 {
        let dialer = dialer.clone();
        handles.push(tokio::spawn(async move {
            let key = if i % 2 == 0 { "agent.ping" } else { "not.a.key" };
            (i, query(&dialer, key).await.unwrap())
        }));
    }

    for handle in handles {
        let (i, reply) = handle.await.unwrap();
        if i % 2 == 0 {
            assert_eq!(reply, QueryReply::Value("1".into()));
        } else {
            assert!(matches!(reply, QueryReply::NotSupported(_)));
        }
    }

    agent.shutdown().await;
}

#[tokio::test]
async fn test_stalled_client_does_not_block_accept() {
    let agent = RunningAgent::spawn(None).await;

    // Sends half a header, then goes quiet
    let mut stalled = TcpStream::connect(agent.addr).await.unwrap();
    stalled.write_all(b"ZBX").await.unwrap();

    let dialer = Dialer::plain(agent.addr.to_string());
    let reply = tokio::time::timeout(Duration::from_secs(5), query(&dialer, "agent.ping"))
        .await
        .expect("accept loop blocked by stalled client")
        .unwrap();
    assert_eq!(reply, QueryReply::Value("1".into()));

    drop(stalled);
    agent.shutdown().await;
}

#[tokio::test]
async fn test_query_no_reply() {
    // Reads the request, then closes without answering
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (mut conn, _) = listener.accept().await.unwrap();
        read_frame(&mut conn).await.unwrap()
    });

    let err = query(&Dialer::plain(addr.to_string()), "agent.ping")
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::NoReply));
    assert_eq!(server.await.unwrap(), b"agent.ping");
}
