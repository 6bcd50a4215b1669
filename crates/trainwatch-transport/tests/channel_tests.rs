//! Integration tests for the feed channel against a local WebSocket server.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use trainwatch_core::config::{BackoffConfig, FeedConfig};
use trainwatch_transport::{ConnectionState, TransportChannel};
use trainwatch_types::{ConnectionStatus, PositionUpdate};

const WAIT: Duration = Duration::from_secs(5);

fn fast_config(url: String) -> FeedConfig {
    FeedConfig {
        url,
        heartbeat_interval_ms: 50,
        liveness_multiplier: 3,
        connect_timeout_ms: 1_000,
        backoff: BackoffConfig {
            base_ms: 10,
            factor: 1.6,
            max_ms: 100,
            jitter_ms: 0,
        },
    }
}

async fn listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

async fn wait_for_state(rx: &mut tokio::sync::watch::Receiver<ConnectionState>, want: ConnectionState) {
    timeout(WAIT, rx.wait_for(|state| *state == want))
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn forwards_batches_and_swallows_control_frames() {
    let (listener, url) = listener().await;
    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        ws.send(Message::text(r#"{"type":"pong"}"#)).await.unwrap();
        ws.send(Message::text("definitely not json")).await.unwrap();
        ws.send(Message::text(
            r#"[{"train_id":"12951","lat":19.07,"lon":72.87,"speed":64},{"id":"bad"}]"#,
        ))
        .await
        .unwrap();
        ws.send(Message::text(r#"{"id":"12952","lat":28.61,"lng":77.20}"#))
            .await
            .unwrap();
        // Keep the socket open until the client goes away.
        while let Some(Ok(_)) = ws.next().await {}
    });

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<PositionUpdate>>();
    let handle = TransportChannel::connect(fast_config(url), tx);

    let first = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].entity_id.as_str(), "12951");
    assert_eq!(first[0].speed_kmh, Some(64.0));

    let second = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(second[0].entity_id.as_str(), "12952");
    assert_eq!(handle.status(), ConnectionStatus::Connected);

    handle.close();
    timeout(WAIT, handle.join()).await.unwrap();
    server.abort();
}

#[tokio::test]
async fn reconnects_after_server_drops_connection() {
    let (listener, url) = listener().await;
    let accepts = Arc::new(AtomicUsize::new(0));
    let server = {
        let accepts = Arc::clone(&accepts);
        tokio::spawn(async move {
            loop {
                let (tcp, _) = listener.accept().await.unwrap();
                let mut ws = accept_async(tcp).await.unwrap();
                let n = accepts.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    // First session: drop immediately.
                    let _ = ws.close(None).await;
                } else {
                    ws.send(Message::text(r#"{"id":"after-reconnect","lat":1,"lng":2}"#))
                        .await
                        .unwrap();
                    while let Some(Ok(_)) = ws.next().await {}
                }
            }
        })
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<PositionUpdate>>();
    let handle = TransportChannel::connect(fast_config(url), tx);

    let batch = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(batch[0].entity_id.as_str(), "after-reconnect");
    assert!(accepts.load(Ordering::SeqCst) >= 2);

    handle.close();
    timeout(WAIT, handle.join()).await.unwrap();
    server.abort();
}

#[tokio::test]
async fn sends_heartbeat_pings_and_drops_silent_server() {
    let (listener, url) = listener().await;
    let (ping_tx, mut ping_rx) = mpsc::unbounded_channel::<usize>();
    let server = tokio::spawn(async move {
        let mut session = 0_usize;
        loop {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            session += 1;
            // Never send anything: only read what the client sends.
            while let Some(Ok(message)) = ws.next().await {
                if let Message::Text(text) = message {
                    if text.as_str() == r#"{"type":"ping"}"# {
                        let _ = ping_tx.send(session);
                    }
                }
            }
        }
    });

    let (tx, _rx) = mpsc::unbounded_channel::<Vec<PositionUpdate>>();
    let handle = TransportChannel::connect(fast_config(url), tx);

    // A ping arrives on the first session.
    assert_eq!(timeout(WAIT, ping_rx.recv()).await.unwrap(), Some(1));

    // The server never answers, so the liveness window (150 ms) expires
    // and the client comes back on a new session.
    let reconnected = timeout(WAIT, async {
        loop {
            match ping_rx.recv().await {
                Some(session) if session >= 2 => break session,
                Some(_) => {}
                None => break 0,
            }
        }
    })
    .await
    .unwrap();
    assert!(reconnected >= 2);

    handle.close();
    timeout(WAIT, handle.join()).await.unwrap();
    server.abort();
}

#[tokio::test]
async fn close_is_idempotent_and_stops_reconnecting() {
    // Bind then drop to get a port nobody listens on.
    let (listener, url) = listener().await;
    drop(listener);

    let (tx, _rx) = mpsc::unbounded_channel::<Vec<PositionUpdate>>();
    let handle = TransportChannel::connect(fast_config(url), tx);
    let mut states = handle.subscribe();

    // Let it fail at least once.
    wait_for_state(&mut states, ConnectionState::Connecting).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    handle.close();
    handle.close();
    assert!(handle.is_closed());
    timeout(WAIT, handle.join()).await.unwrap();
    assert_eq!(*states.borrow(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn close_while_connected_ends_session() {
    let (listener, url) = listener().await;
    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        // Stay chatty so liveness never trips.
        loop {
            if ws.send(Message::text(r#"{"type":"heartbeat"}"#)).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    });

    let (tx, _rx) = mpsc::unbounded_channel::<Vec<PositionUpdate>>();
    let handle = TransportChannel::connect(fast_config(url), tx);
    let mut states = handle.subscribe();
    wait_for_state(&mut states, ConnectionState::Connected).await;

    handle.close();
    timeout(WAIT, handle.join()).await.unwrap();
    assert_eq!(*states.borrow(), ConnectionState::Disconnected);
    server.abort();
}

#[tokio::test]
async fn zero_heartbeat_interval_still_connects() {
    let (listener, url) = listener().await;
    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        ws.send(Message::text(r#"{"id":"12951","lat":19.07,"lng":72.87}"#))
            .await
            .unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let config = FeedConfig {
        heartbeat_interval_ms: 0,
        ..fast_config(url)
    };
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<PositionUpdate>>();
    let handle = TransportChannel::connect(config, tx);

    let batch = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(batch[0].entity_id.as_str(), "12951");

    handle.close();
    timeout(WAIT, handle.join()).await.unwrap();
    server.abort();
}
