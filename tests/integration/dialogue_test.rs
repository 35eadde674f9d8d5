// tests/integration/dialogue_test.rs

//! Integration tests for ordinary command/reply exchanges.

use super::test_helpers::{FakeServer, connect};
use ampd::{AckCode, Arg, Client, EventSet, MpdError, Reply};
use std::time::Duration;

#[tokio::test]
async fn test_clean_dialogue() {
    let server = FakeServer::bind().await;
    let client = Client::new();
    let mut session = connect(&client, &server).await;
    assert_eq!(client.protocol_version().as_deref(), Some("0.21"));

    let request = client.executor().send("status", &[]).unwrap();
    session.expect("noidle").await;
    session.expect("status").await;
    session.send("OK\n").await;
    session.send("volume: 50\nOK\n").await;

    let reply = request.await.unwrap();
    assert_eq!(reply.get("volume"), Some("50"));
    assert_eq!(reply.as_dict().unwrap().len(), 1);

    // Once the queue drains, the server is parked again.
    session.expect("idle").await;
}

#[tokio::test]
async fn test_pipelined_replies_reach_their_own_requests() {
    let server = FakeServer::bind().await;
    let client = Client::new();
    let mut session = connect(&client, &server).await;
    let executor = client.executor();

    // Event waiters parked alongside take none of the command replies.
    let database = executor.wait_for(EventSet::DATABASE).unwrap();
    let mixer = executor.wait_for(EventSet::MIXER).unwrap();
    assert_eq!(client.waiting(), 2);

    let status = executor.send("status", &[]).unwrap();
    let outputs = executor.send("outputs", &[]).unwrap();
    let add = executor.send("addid", &["song.flac".into()]).unwrap();
    session.expect("noidle").await;
    session.expect("status").await;
    session.expect("outputs").await;
    session.expect(r#"addid "song.flac""#).await;

    session.send("OK\n").await;
    session
        .send("state: play\nOK\noutputid: 0\noutputname: A\noutputid: 1\noutputname: B\nOK\nId: 7\nOK\n")
        .await;

    assert_eq!(status.await.unwrap().get("state"), Some("play"));
    let outputs = outputs.await.unwrap();
    let outputs = outputs.as_objects().unwrap();
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[1]["outputname"], "B");
    assert_eq!(add.await.unwrap().get("Id"), Some("7"));
    session.expect("idle").await;
    assert!(!database.is_done() && !mixer.is_done());
    assert_eq!(client.waiting(), 2);
}

#[tokio::test]
async fn test_server_error_leaves_connection_usable() {
    let server = FakeServer::bind().await;
    let client = Client::new();
    let mut session = connect(&client, &server).await;
    let executor = client.executor();

    let play = executor.send("play", &[Arg::Int(99)]).unwrap();
    session.expect("noidle").await;
    session.expect("play 99").await;
    session.send("OK\n").await;
    session.send("ACK [2@0] {play} Bad song index\n").await;

    let err = play.await.unwrap_err();
    assert_eq!(
        err,
        MpdError::Reply {
            code: 2,
            index: 0,
            command: "play".into(),
            message: "Bad song index".into(),
        }
    );
    assert_eq!(err.ack_code(), Some(AckCode::Arg));

    session.expect("idle").await;
    let ping = executor.send("ping", &[]).unwrap();
    session.expect("noidle").await;
    session.expect("ping").await;
    session.send("OK\nOK\n").await;
    assert_eq!(ping.await.unwrap(), Reply::Empty);
}

#[tokio::test]
async fn test_cancelled_in_flight_reply_is_discarded() {
    let server = FakeServer::bind().await;
    let client = Client::new();
    let mut session = connect(&client, &server).await;
    let executor = client.executor();

    let abandoned = executor.send("stats", &[]).unwrap();
    let wanted = executor.send("status", &[]).unwrap();
    session.expect("noidle").await;
    session.expect("stats").await;
    session.expect("status").await;
    assert!(abandoned.cancel());

    session.send("OK\nuptime: 10\nOK\nvolume: 20\nOK\n").await;
    assert_eq!(wanted.await.unwrap().get("volume"), Some("20"));
    assert_eq!(abandoned.await_result().await, Err(MpdError::Cancelled));
    assert_eq!(executor.pending_requests(), 0);
}

#[tokio::test]
async fn test_local_failures_are_synchronous() {
    let server = FakeServer::bind().await;
    let client = Client::new();
    let executor = client.executor();

    // Nothing connected yet.
    let err = executor.call("status", &[]).await.unwrap_err();
    assert!(matches!(err, MpdError::Connection(_)));
    assert_eq!(executor.pending_requests(), 0);

    let mut session = connect(&client, &server).await;
    assert_eq!(
        executor.send("frobnicate", &[]).unwrap_err(),
        MpdError::UnknownCommand("frobnicate".into())
    );
    assert!(matches!(
        executor.send("add", &["two\nlines".into()]).unwrap_err(),
        MpdError::Encode(_)
    ));
    assert!(matches!(
        executor.send("idle", &[]).unwrap_err(),
        MpdError::UnknownCommand(_)
    ));
    session.assert_silent(Duration::from_millis(100)).await;
}
