// tests/integration/executor_test.rs

//! Integration tests for executor scopes: subtree close, hooks and
//! supervised background tasks.

use super::test_helpers::{FakeServer, HookLog, connect, eventually};
use ampd::core::executor::{ConnectHook, DisconnectHook};
use ampd::{Client, DisconnectReason, EventSet, MpdError};
use parking_lot::Mutex;
use std::sync::Arc;

#[tokio::test]
async fn test_closing_a_subtree_cancels_its_requests_only() {
    let server = FakeServer::bind().await;
    let client = Client::new();
    let mut session = connect(&client, &server).await;
    let root = client.executor();

    let parent = root.sub_executor().unwrap();
    let first = parent.sub_executor().unwrap();
    let second = parent.sub_executor().unwrap();
    assert_eq!(parent.child_count(), 2);

    let status = first.send("status", &[]).unwrap();
    let waiter = second.wait_for(EventSet::PLAYER).unwrap();
    session.expect("noidle").await;
    session.expect("status").await;

    parent.close();
    assert!(status.is_cancelled());
    assert!(waiter.is_cancelled());
    assert!(parent.is_closed() && first.is_closed() && second.is_closed());
    assert_eq!(root.child_count(), 0);
    assert_eq!(client.waiting(), 0);

    // The reply still arrives and is dropped on the floor.
    session.send("OK\nvolume: 1\nOK\n").await;
    session.expect("idle").await;

    // The rest of the tree keeps working.
    let ping = root.send("ping", &[]).unwrap();
    session.expect("noidle").await;
    session.expect("ping").await;
    session.send("OK\nOK\n").await;
    assert!(ping.await.is_ok());

    // A closed scope refuses new work.
    assert!(matches!(
        first.send("status", &[]),
        Err(MpdError::Connection(_))
    ));
    assert!(parent.sub_executor().is_err());
    parent.close();
}

#[tokio::test]
async fn test_hooks_installed_while_connected_fire_at_once() {
    let server = FakeServer::bind().await;
    let client = Client::new();
    let _session = connect(&client, &server).await;

    let child = client.executor().sub_executor().unwrap();
    let log = HookLog::attach(&child);
    assert_eq!(log.connect_count(), 1);
}

#[tokio::test]
async fn test_connect_hooks_run_top_down() {
    let server = FakeServer::bind().await;
    let client = Client::new();
    let root = client.executor();
    let child = root.sub_executor().unwrap();
    let grandchild = child.sub_executor().unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    let hook = |tag: &'static str| -> ConnectHook {
        let order = order.clone();
        Arc::new(move || order.lock().push(tag))
    };
    grandchild.set_callbacks(Some(hook("grandchild")), None).unwrap();
    root.set_callbacks(Some(hook("root")), None).unwrap();
    child.set_callbacks(Some(hook("child")), None).unwrap();

    let _session = connect(&client, &server).await;
    assert_eq!(*order.lock(), vec!["root", "child", "grandchild"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_hooks_installed_during_connect_fire_once() {
    let server = FakeServer::bind().await;
    let client = Client::new();
    let installers: Vec<_> = (0..4)
        .map(|_| {
            let root = client.executor().clone();
            tokio::spawn(async move {
                let mut installed = Vec::new();
                for _ in 0..50 {
                    let scope = root.sub_executor().unwrap();
                    let log = HookLog::attach(&scope);
                    installed.push((scope, log));
                    tokio::task::yield_now().await;
                }
                installed
            })
        })
        .collect();

    let _session = connect(&client, &server).await;
    for installer in installers {
        for (_scope, log) in installer.await.unwrap() {
            assert_eq!(log.connect_count(), 1);
        }
    }
}

#[tokio::test]
async fn test_disconnect_hooks_run_top_down() {
    let server = FakeServer::bind().await;
    let client = Client::new();
    let root = client.executor();
    let child = root.sub_executor().unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    let hook = |tag: &'static str| -> DisconnectHook {
        let order = order.clone();
        Arc::new(move |_: DisconnectReason, _: Option<&str>| order.lock().push(tag))
    };
    child.set_callbacks(None, Some(hook("child"))).unwrap();
    root.set_callbacks(None, Some(hook("root"))).unwrap();

    let _session = connect(&client, &server).await;
    client.disconnect_from_server(DisconnectReason::Requested);
    assert_eq!(*order.lock(), vec!["root", "child"]);
}

#[tokio::test]
async fn test_closed_scope_hooks_are_dropped() {
    let server = FakeServer::bind().await;
    let client = Client::new();
    let child = client.executor().sub_executor().unwrap();
    let log = HookLog::attach(&child);
    child.close();

    let _session = connect(&client, &server).await;
    assert_eq!(log.connect_count(), 0);
}

#[tokio::test]
async fn test_spawned_task_errors_reach_the_hook() {
    let server = FakeServer::bind().await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let client = Client::builder()
        .error_hook(Arc::new(move |e: &MpdError| sink.lock().push(e.clone())))
        .build();
    let mut session = connect(&client, &server).await;

    client
        .spawn(async { Err(MpdError::Timeout) })
        .await
        .unwrap();
    assert_eq!(*seen.lock(), vec![MpdError::Timeout]);

    // A task whose request is cancelled by a scope close ends silently.
    let scope = client.executor().sub_executor().unwrap();
    let task = client.spawn({
        let scope = scope.clone();
        async move { scope.call("status", &[]).await.map(|_| ()) }
    });
    session.expect("noidle").await;
    session.expect("status").await;
    scope.close();
    task.await.unwrap();
    assert_eq!(seen.lock().len(), 1);

    session.send("OK\nstate: play\nOK\n").await;
    session.expect("idle").await;
    eventually(|| client.in_flight() == 1).await;
}
