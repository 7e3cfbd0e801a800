#[allow(dead_code)]
mod common;

use std::time::Duration;

use common::TestServer;
use quizwire_client::channel::{ConnectionState, RealtimeChannel};
use quizwire_client::config::ReconnectConfig;
use quizwire_core::net::messages::ServerEvent;
use quizwire_core::test_helpers::make_question;

fn test_reconnect() -> ReconnectConfig {
    ReconnectConfig {
        delay_ms: 100,
        max_attempts: None,
    }
}

async fn wait_for_state(
    rx: &mut tokio::sync::watch::Receiver<ConnectionState>,
    want: ConnectionState,
) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if *rx.borrow_and_update() == want {
            return;
        }
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        tokio::time::timeout(remaining, rx.changed())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {want:?}"))
            .expect("connection state watch closed");
    }
}

#[tokio::test]
async fn delivers_events_in_send_order() {
    let server = TestServer::start().await;
    let channel = RealtimeChannel::spawn(server.ws_url(), test_reconnect(), 64);
    let mut events = channel.subscribe();
    let mut state = channel.connection_state();
    wait_for_state(&mut state, ConnectionState::Open).await;
    server.wait_for_ws_clients(1).await;

    server.push_question(make_question(1, 2));
    server.push_question(make_question(2, 2));

    let first = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    let second = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    match (first, second) {
        (ServerEvent::QuestionStart(a), ServerEvent::QuestionStart(b)) => {
            assert_eq!(a.question.id, 1);
            assert_eq!(b.question.id, 2);
        },
        other => panic!("Expected two QuestionStart events, got: {other:?}"),
    }

    channel.shutdown().await;
}

#[tokio::test]
async fn malformed_frames_are_dropped_and_the_connection_survives() {
    let server = TestServer::start().await;
    let channel = RealtimeChannel::spawn(server.ws_url(), test_reconnect(), 64);
    let mut events = channel.subscribe();
    let mut state = channel.connection_state();
    wait_for_state(&mut state, ConnectionState::Open).await;
    server.wait_for_ws_clients(1).await;

    server.push_raw("garbage");
    server.push_raw(r#"{"type": "unheard_of"}"#);
    server.push_question(make_question(7, 2));

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        ServerEvent::QuestionStart(msg) => assert_eq!(msg.question.id, 7),
        other => panic!("Expected QuestionStart, got: {other:?}"),
    }
    assert_eq!(*state.borrow(), ConnectionState::Open);

    channel.shutdown().await;
}

#[tokio::test]
async fn reconnects_after_the_server_drops_the_connection() {
    let server = TestServer::start().await;
    let channel = RealtimeChannel::spawn(server.ws_url(), test_reconnect(), 64);
    let mut events = channel.subscribe();
    let mut state = channel.connection_state();
    wait_for_state(&mut state, ConnectionState::Open).await;
    server.wait_for_ws_clients(1).await;

    server.drop_connections();
    wait_for_state(&mut state, ConnectionState::Closed).await;

    // silent recovery: the channel comes back on its own
    wait_for_state(&mut state, ConnectionState::Open).await;
    server.wait_for_ws_clients(1).await;

    server.push_question(make_question(3, 2));
    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        ServerEvent::QuestionStart(msg) => assert_eq!(msg.question.id, 3),
        other => panic!("Expected QuestionStart, got: {other:?}"),
    }

    channel.shutdown().await;
}

#[tokio::test]
async fn attempt_cap_stops_the_retry_loop() {
    // discard port: nothing is listening there
    let channel = RealtimeChannel::spawn(
        "ws://127.0.0.1:9/ws".to_string(),
        ReconnectConfig {
            delay_ms: 50,
            max_attempts: Some(2),
        },
        8,
    );

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !channel.is_finished() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "channel kept retrying past the attempt cap"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(*channel.connection_state().borrow(), ConnectionState::Closed);
}

#[tokio::test]
async fn close_is_idempotent() {
    let server = TestServer::start().await;
    let channel = RealtimeChannel::spawn(server.ws_url(), test_reconnect(), 8);
    channel.close();
    channel.close();
    channel.shutdown().await;
}
