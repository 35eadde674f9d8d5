// tests/integration/lifecycle_test.rs

//! Integration tests for connecting, authenticating and losing the
//! connection.

use super::test_helpers::{FakeServer, HookLog, connect, eventually};
use ampd::{Client, ConnectionState, DisconnectReason, EventSet, MpdError, ServerTarget};
use std::time::Duration;

#[tokio::test]
async fn test_forced_disconnect_cancels_everything() {
    let server = FakeServer::bind().await;
    let client = Client::new();
    let root = client.executor();
    let child = root.sub_executor().unwrap();
    let root_log = HookLog::attach(root);
    let child_log = HookLog::attach(&child);

    let mut session = connect(&client, &server).await;
    assert_eq!(root_log.connect_count(), 1);
    assert_eq!(child_log.connect_count(), 1);

    let status = child.send("status", &[]).unwrap();
    let parked = root.wait_for(EventSet::PLAYER).unwrap();
    session.expect("noidle").await;
    session.expect("status").await;
    drop(session);

    assert_eq!(status.await_result().await, Err(MpdError::Cancelled));
    assert_eq!(parked.await_result().await, Err(MpdError::Cancelled));
    eventually(|| client.state() == ConnectionState::Disconnected).await;
    assert_eq!(root_log.reasons(), vec![DisconnectReason::Error]);
    assert_eq!(child_log.reasons(), vec![DisconnectReason::Error]);
    assert_eq!(client.protocol_version(), None);
    assert!(!root.is_connected());
}

#[tokio::test]
async fn test_requested_disconnect_is_idempotent() {
    let server = FakeServer::bind().await;
    let client = Client::new();
    let log = HookLog::attach(client.executor());
    let mut session = connect(&client, &server).await;

    client.disconnect_from_server(DisconnectReason::Requested);
    client.disconnect_from_server(DisconnectReason::Requested);
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(client.in_flight(), 0);
    assert_eq!(log.reasons(), vec![DisconnectReason::Requested]);

    // The client hangs up; nothing more is written.
    assert_eq!(session.next_line().await, None);
}

#[tokio::test]
async fn test_connect_while_connected_fails() {
    let server = FakeServer::bind().await;
    let client = Client::new();
    let _session = connect(&client, &server).await;

    let err = client.connect_to_server(server.target()).await.unwrap_err();
    assert!(matches!(err, MpdError::Connection(_)));
    assert_eq!(client.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn test_failed_connect_reports_reason() {
    let target = {
        let server = FakeServer::bind().await;
        server.target()
    };
    let client = Client::new();
    let log = HookLog::attach(client.executor());

    assert!(client.connect_to_server(target).await.is_err());
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(log.reasons(), vec![DisconnectReason::FailedConnect]);
    assert_eq!(log.connect_count(), 0);
}

#[tokio::test]
async fn test_password_is_sent_before_announcing_the_connection() {
    let server = FakeServer::bind().await;
    let client = Client::new();
    let log = HookLog::attach(client.executor());
    let target = server.target().with_password("secret");

    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect_to_server(target).await }
    });
    let mut session = server.accept().await;
    session.expect(r#"password "secret""#).await;
    assert_eq!(log.connect_count(), 0);
    assert!(!client.executor().is_connected());

    session.send("OK\n").await;
    assert_eq!(connecting.await.unwrap().unwrap(), "0.21");
    assert_eq!(log.connect_count(), 1);
    session.expect("idle").await;
}

#[tokio::test]
async fn test_rejected_password_disconnects() {
    let server = FakeServer::bind().await;
    let client = Client::new();
    let log = HookLog::attach(client.executor());
    let target = server.target().with_password("wrong");

    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect_to_server(target).await }
    });
    let mut session = server.accept().await;
    session.expect(r#"password "wrong""#).await;
    session.send("ACK [3@0] {password} incorrect password\n").await;

    let err = connecting.await.unwrap().unwrap_err();
    assert!(matches!(err, MpdError::Reply { code: 3, .. }));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(log.reasons(), vec![DisconnectReason::Password]);
    assert_eq!(log.connect_count(), 0);
}

#[tokio::test]
async fn test_bad_greeting_fails_the_connect() {
    let server = FakeServer::bind().await;
    let client = Client::new();
    let log = HookLog::attach(client.executor());

    let (session, outcome) = tokio::join!(
        async {
            let mut session = server.accept_silently().await;
            session.send("OK HTTP 1.1\n").await;
            session
        },
        client.connect_to_server(server.target())
    );
    assert!(matches!(outcome, Err(MpdError::Protocol(_))));
    assert_eq!(log.reasons(), vec![DisconnectReason::Error]);
    drop(session);
}

#[tokio::test]
async fn test_malformed_reply_is_fatal() {
    let server = FakeServer::bind().await;
    let client = Client::new();
    let log = HookLog::attach(client.executor());
    let mut session = connect(&client, &server).await;

    let status = client.executor().send("status", &[]).unwrap();
    session.expect("noidle").await;
    session.expect("status").await;
    session.send("OK\nACK nonsense\n").await;

    assert_eq!(status.await_result().await, Err(MpdError::Cancelled));
    eventually(|| client.state() == ConnectionState::Disconnected).await;
    assert_eq!(log.reasons(), vec![DisconnectReason::Error]);
}

#[tokio::test]
async fn test_reconnect_uses_the_last_target() {
    let server = FakeServer::bind().await;
    let client = Client::new();
    let log = HookLog::attach(client.executor());
    assert!(client.reconnect_to_server().await.is_err());

    let _first = connect(&client, &server).await;
    let (mut second, version) = tokio::join!(server.accept(), client.reconnect_to_server());
    assert_eq!(version.unwrap(), "0.21");
    second.expect("idle").await;

    assert_eq!(log.connect_count(), 2);
    assert_eq!(log.reasons(), vec![DisconnectReason::Reconnect]);
    assert_eq!(client.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn test_disconnect_during_handshake_fails_the_connect() {
    let server = FakeServer::bind().await;
    let client = Client::builder()
        .connect_timeout(Duration::from_millis(500))
        .build();
    let log = HookLog::attach(client.executor());
    let target: ServerTarget = server.target();

    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect_to_server(target).await }
    });
    // Accepted, but never greeted.
    let _session = server.accept_silently().await;
    eventually(|| client.state() == ConnectionState::Active).await;
    client.disconnect_from_server(DisconnectReason::Requested);

    assert!(connecting.await.unwrap().is_err());
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(log.reasons(), vec![DisconnectReason::Requested]);
    assert_eq!(log.connect_count(), 0);
}
