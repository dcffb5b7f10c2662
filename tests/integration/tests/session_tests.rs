//! Session integration tests
//!
//! Each test runs a scripted mock gateway on a local port and drives a real session
//! against it.
//!
//! Run with: cargo test -p integration-tests --test session_tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use integration_tests::{fixtures::*, wait_until, GatewayConn, MockGateway, TEST_TIMEOUT};
use parking_lot::Mutex;
use shard_gateway::events::{MessageCreateEvent, ReadyEvent};
use shard_gateway::model::{Activity, Status};
use shard_gateway::protocol::{GatewayMessage, OpCode, PresenceUpdatePayload};
use shard_gateway::{
    ConnectionNotice, ConnectionState, Event, GatewayError, HandshakeError, ProtocolError,
    StateTracker, TransportError,
};
use tokio::sync::broadcast;

/// Identify, answer with READY, then keep the connection alive
async fn ready_script(mut conn: GatewayConn, session_id: String) -> anyhow::Result<()> {
    conn.hello(45_000).await?;
    conn.recv_handshake().await?;
    conn.dispatch("READY", 1, ready_payload(&session_id)).await?;
    conn.serve().await
}

async fn next_notice<F>(notices: &mut broadcast::Receiver<ConnectionNotice>, mut wanted: F) -> ConnectionNotice
where
    F: FnMut(&ConnectionNotice) -> bool,
{
    tokio::time::timeout(TEST_TIMEOUT, async {
        loop {
            let notice = notices.recv().await.expect("notice channel closed");
            if wanted(&notice) {
                return notice;
            }
        }
    })
    .await
    .expect("notice not received in time")
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

// ============================================================================
// Handshake Tests
// ============================================================================

#[tokio::test]
async fn test_open_identifies_and_becomes_ready() {
    let gateway = MockGateway::start(|conn| ready_script(conn, "session-1".to_string()))
        .await
        .unwrap();
    let session = gateway.session_builder().build().unwrap();
    let mut notices = session.notices();

    let ready_user = Arc::new(Mutex::new(None));
    let _ready = {
        let ready_user = ready_user.clone();
        session.on::<ReadyEvent, _>(move |session, ready| {
            // Handshake state is settled before READY handlers run
            assert!(session.data_ready());
            *ready_user.lock() = Some(ready.user.username.clone());
        })
    };

    session.open().await.unwrap();

    assert_eq!(session.state(), ConnectionState::Connected);
    assert!(session.is_connected());
    assert!(session.data_ready());
    assert_eq!(session.session_id().as_deref(), Some("session-1"));
    assert_eq!(session.sequence(), Some(1));
    assert_eq!(ready_user.lock().as_deref(), Some("shard-bot"));

    let notice = next_notice(&mut notices, |_| true).await;
    assert!(matches!(notice, ConnectionNotice::Connected { session_id } if session_id == "session-1"));

    let identify = gateway.frames_with_op(OpCode::Identify);
    assert_eq!(identify.len(), 1);
    let payload = identify[0].message.as_identify().unwrap();
    assert_eq!(payload.token, TEST_TOKEN);
    assert_eq!(payload.large_threshold, 250);
    assert!(payload.shard.is_none());
    assert!(!payload.properties.os.is_empty());

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_open_twice_fails() {
    let gateway = MockGateway::start(|conn| ready_script(conn, unique_session_id()))
        .await
        .unwrap();
    let session = gateway.session_builder().build().unwrap();

    session.open().await.unwrap();
    assert!(matches!(session.open().await, Err(GatewayError::AlreadyOpen)));

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_fatal_close_code_fails_open() {
    let gateway = MockGateway::start(|mut conn| async move {
        conn.hello(45_000).await?;
        conn.recv_handshake().await?;
        conn.close(4004).await
    })
    .await
    .unwrap();
    let session = gateway.session_builder().build().unwrap();

    let err = session.open().await.unwrap_err();

    assert!(err.is_fatal());
    assert!(matches!(
        err,
        GatewayError::Handshake(HandshakeError::AuthenticationFailed)
    ));
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(gateway.connections(), 1);
}

#[tokio::test]
async fn test_handshake_timeout() {
    let gateway = MockGateway::start(|mut conn| async move {
        conn.hello(45_000).await?;
        conn.recv_handshake().await?;
        // Never answer the Identify
        conn.serve().await
    })
    .await
    .unwrap();
    let session = gateway
        .session_builder()
        .handshake_timeout(Duration::from_millis(300))
        .build()
        .unwrap();

    let err = session.open().await.unwrap_err();

    assert!(matches!(err, GatewayError::Handshake(HandshakeError::Timeout(_))));
    assert!(!err.is_fatal());
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_zero_heartbeat_interval_fails_open() {
    let gateway = MockGateway::start(|mut conn| async move {
        conn.hello(0).await?;
        conn.serve().await
    })
    .await
    .unwrap();
    let session = gateway.session_builder().build().unwrap();

    let err = session.open().await.unwrap_err();

    assert!(matches!(
        err,
        GatewayError::Protocol(ProtocolError::InvalidHeartbeatInterval(0))
    ));
    assert!(!err.is_fatal());
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(gateway.frames_with_op(OpCode::Identify).is_empty());
}

#[tokio::test]
async fn test_missed_heartbeat_during_handshake_fails_open() {
    let gateway = MockGateway::start(|mut conn| async move {
        conn.auto_ack = false;
        conn.hello(100).await?;
        conn.recv_handshake().await?;
        // Neither READY nor heartbeat acks
        conn.serve().await
    })
    .await
    .unwrap();
    let session = gateway.session_builder().build().unwrap();

    let err = session.open().await.unwrap_err();

    assert!(matches!(
        err,
        GatewayError::Transport(TransportError::Closed { code: None, .. })
    ));
    assert!(!err.is_fatal());
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(wait_until(|| gateway.closes().contains(&(0, Some(4000)))).await);
}

// ============================================================================
// Close Tests
// ============================================================================

#[tokio::test]
async fn test_close_is_idempotent_and_stops_handlers() {
    let gateway = MockGateway::start(|mut conn| async move {
        conn.hello(45_000).await?;
        conn.recv_handshake().await?;
        conn.dispatch("READY", 1, ready_payload("session-1")).await?;
        let mut seq = 2;
        // Keep dispatching until the client closes
        while conn
            .dispatch("MESSAGE_CREATE", seq, message_payload("tick"))
            .await
            .is_ok()
        {
            seq += 1;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok(())
    })
    .await
    .unwrap();
    let session = gateway.session_builder().build().unwrap();
    let mut notices = session.notices();

    let seen = counter();
    let _any = {
        let seen = seen.clone();
        session.on_any(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
    };

    session.open().await.unwrap();
    assert!(wait_until(|| seen.load(Ordering::SeqCst) >= 5).await);

    session.close().await.unwrap();
    let after_close = seen.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(seen.load(Ordering::SeqCst), after_close);
    assert_eq!(session.state(), ConnectionState::Closed);
    assert!(session.close().await.is_ok());

    next_notice(&mut notices, |notice| matches!(notice, ConnectionNotice::Closed)).await;
    assert!(matches!(
        session.send(&GatewayMessage::heartbeat(None)).await,
        Err(GatewayError::Closed)
    ));
}

#[tokio::test]
async fn test_close_sends_normal_closure() {
    let gateway = MockGateway::start(|conn| ready_script(conn, unique_session_id()))
        .await
        .unwrap();
    let session = gateway.session_builder().build().unwrap();

    session.open().await.unwrap();
    session.close().await.unwrap();

    assert!(wait_until(|| !gateway.closes().is_empty()).await);
    assert_eq!(gateway.closes(), vec![(0, Some(1000))]);
}

#[tokio::test]
async fn test_reopen_after_close_identifies_again() {
    let gateway = MockGateway::start(|conn| {
        let session_id = format!("session-{}", conn.index);
        ready_script(conn, session_id)
    })
    .await
    .unwrap();
    let session = gateway.session_builder().build().unwrap();

    session.open().await.unwrap();
    session.close().await.unwrap();
    session.open().await.unwrap();

    assert_eq!(session.session_id().as_deref(), Some("session-1"));
    assert_eq!(gateway.frames_with_op(OpCode::Identify).len(), 2);
    assert!(gateway.frames_with_op(OpCode::Resume).is_empty());

    session.close().await.unwrap();
}

// ============================================================================
// Heartbeat and Resume Tests
// ============================================================================

#[tokio::test]
async fn test_heartbeats_carry_latest_sequence() {
    let gateway = MockGateway::start(|mut conn| async move {
        conn.hello(100).await?;
        conn.recv_handshake().await?;
        conn.dispatch("READY", 1, ready_payload("session-1")).await?;
        conn.dispatch("MESSAGE_CREATE", 2, message_payload("hello"))
            .await?;
        conn.serve().await
    })
    .await
    .unwrap();
    let session = gateway.session_builder().build().unwrap();

    session.open().await.unwrap();
    assert!(wait_until(|| gateway.frames_with_op(OpCode::Heartbeat).len() >= 3).await);

    let last = gateway.frames_with_op(OpCode::Heartbeat).pop().unwrap();
    assert_eq!(last.message.as_heartbeat_seq(), Some(Some(2)));
    // Latency is only defined while the latest beat has been acknowledged
    assert!(wait_until(|| session.heartbeat_latency().is_some()).await);
    assert!(session.last_heartbeat_ack().is_some());
    assert!(session.is_connected());

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_missed_heartbeat_ack_resumes_session() {
    let gateway = MockGateway::start(|mut conn| async move {
        conn.hello(if conn.index == 0 { 200 } else { 45_000 }).await?;

        if conn.index == 0 {
            // Never acknowledge heartbeats on the first connection
            conn.auto_ack = false;
            conn.recv_handshake().await?;
            conn.dispatch("READY", 1, ready_payload("session-1")).await?;
            conn.dispatch("MESSAGE_CREATE", 2, message_payload("before"))
                .await?;
            return conn.serve().await;
        }

        let resume = conn.recv_handshake().await?;
        anyhow::ensure!(resume.op == OpCode::Resume, "expected Resume");
        conn.dispatch("MESSAGE_CREATE", 3, message_payload("replayed"))
            .await?;
        conn.dispatch("RESUMED", 4, serde_json::Value::Null).await?;
        conn.serve().await
    })
    .await
    .unwrap();
    let session = gateway.session_builder().build().unwrap();
    let mut notices = session.notices();

    session.open().await.unwrap();
    next_notice(&mut notices, |notice| matches!(notice, ConnectionNotice::Resumed)).await;

    let resumes = gateway.frames_with_op(OpCode::Resume);
    assert_eq!(resumes.len(), 1);
    assert_eq!(resumes[0].connection, 1);
    let payload = resumes[0].message.as_resume().unwrap();
    assert_eq!(payload.session_id, "session-1");
    assert_eq!(payload.seq, 2);
    assert_eq!(payload.token, TEST_TOKEN);

    assert_eq!(session.session_id().as_deref(), Some("session-1"));
    assert_eq!(session.sequence(), Some(4));
    assert!(session.data_ready());
    assert!(wait_until(|| gateway.closes().contains(&(0, Some(4000)))).await);

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_resume_uses_resume_gateway_url() {
    let resume_gateway = MockGateway::start(|mut conn| async move {
        conn.hello(45_000).await?;
        conn.recv_handshake().await?;
        conn.dispatch("RESUMED", 2, serde_json::json!({})).await?;
        conn.serve().await
    })
    .await
    .unwrap();
    let resume_url = resume_gateway.url();

    let gateway = MockGateway::start(move |mut conn| {
        let resume_url = resume_url.clone();
        async move {
            conn.hello(45_000).await?;
            conn.recv_handshake().await?;
            conn.dispatch("READY", 1, ready_payload_with_resume_url("session-1", &resume_url))
                .await?;
            conn.send(&GatewayMessage::reconnect()).await?;
            conn.serve().await
        }
    })
    .await
    .unwrap();
    let session = gateway.session_builder().build().unwrap();
    let mut notices = session.notices();

    session.open().await.unwrap();
    next_notice(&mut notices, |notice| matches!(notice, ConnectionNotice::Resumed)).await;

    assert_eq!(gateway.connections(), 1);
    assert_eq!(resume_gateway.frames_with_op(OpCode::Resume).len(), 1);

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_invalid_session_triggers_fresh_identify() {
    let gateway = MockGateway::start(|mut conn| async move {
        conn.hello(45_000).await?;
        let handshake = conn.recv_handshake().await?;
        anyhow::ensure!(handshake.op == OpCode::Identify, "expected Identify");

        let session_id = format!("session-{}", conn.index + 1);
        conn.dispatch("READY", 1, ready_payload(&session_id)).await?;
        if conn.index == 0 {
            conn.dispatch("MESSAGE_CREATE", 2, message_payload("soon invalid"))
                .await?;
            conn.send(&GatewayMessage::invalid_session(false)).await?;
        }
        conn.serve().await
    })
    .await
    .unwrap();
    let session = gateway.session_builder().build().unwrap();
    let mut notices = session.notices();

    session.open().await.unwrap();
    next_notice(&mut notices, |notice| {
        matches!(notice, ConnectionNotice::Connected { session_id } if session_id == "session-2")
    })
    .await;

    assert_eq!(gateway.frames_with_op(OpCode::Identify).len(), 2);
    assert!(gateway.frames_with_op(OpCode::Resume).is_empty());
    assert_eq!(session.session_id().as_deref(), Some("session-2"));
    assert_eq!(session.sequence(), Some(1));

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_rejected_resume_falls_back_to_identify() {
    let gateway = MockGateway::start(|mut conn| async move {
        conn.hello(45_000).await?;
        let handshake = conn.recv_handshake().await?;

        match conn.index {
            0 => {
                anyhow::ensure!(handshake.op == OpCode::Identify, "expected Identify");
                conn.dispatch("READY", 1, ready_payload("session-1")).await?;
                conn.dispatch("MESSAGE_CREATE", 2, message_payload("before"))
                    .await?;
                conn.send(&GatewayMessage::reconnect()).await?;
            }
            1 => {
                anyhow::ensure!(handshake.op == OpCode::Resume, "expected Resume");
                conn.send(&GatewayMessage::invalid_session(false)).await?;
            }
            _ => {
                anyhow::ensure!(handshake.op == OpCode::Identify, "expected Identify");
                conn.dispatch("READY", 1, ready_payload("session-2")).await?;
            }
        }
        conn.serve().await
    })
    .await
    .unwrap();
    let session = gateway.session_builder().build().unwrap();
    let mut notices = session.notices();

    session.open().await.unwrap();
    let failed = next_notice(&mut notices, |notice| {
        matches!(notice, ConnectionNotice::ReconnectFailed { .. })
    })
    .await;
    assert!(matches!(
        failed,
        ConnectionNotice::ReconnectFailed { attempt: 1, fatal: false, .. }
    ));
    next_notice(&mut notices, |notice| {
        matches!(notice, ConnectionNotice::Connected { session_id } if session_id == "session-2")
    })
    .await;

    let resumes = gateway.frames_with_op(OpCode::Resume);
    assert_eq!(resumes.len(), 1);
    assert_eq!(resumes[0].connection, 1);
    let payload = resumes[0].message.as_resume().unwrap();
    assert_eq!(payload.session_id, "session-1");
    assert_eq!(payload.seq, 2);

    let identifies: Vec<_> = gateway
        .frames_with_op(OpCode::Identify)
        .into_iter()
        .map(|received| received.connection)
        .collect();
    assert_eq!(identifies, vec![0, 2]);
    assert_eq!(gateway.connections(), 3);

    assert_eq!(session.session_id().as_deref(), Some("session-2"));
    assert_eq!(session.sequence(), Some(1));
    assert!(session.data_ready());

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_reconnect_gives_up_on_fatal_close() {
    let gateway = MockGateway::start(|mut conn| async move {
        conn.hello(45_000).await?;
        conn.recv_handshake().await?;
        if conn.index == 0 {
            conn.dispatch("READY", 1, ready_payload("session-1")).await?;
            return conn.close(4000).await;
        }
        conn.close(4004).await
    })
    .await
    .unwrap();
    let session = gateway.session_builder().build().unwrap();
    let mut notices = session.notices();

    session.open().await.unwrap();
    let notice = next_notice(&mut notices, |notice| {
        matches!(notice, ConnectionNotice::ReconnectFailed { .. })
    })
    .await;

    let ConnectionNotice::ReconnectFailed { attempt, error, fatal } = notice else {
        unreachable!();
    };
    assert_eq!(attempt, 1);
    assert!(fatal);
    assert!(matches!(
        *error,
        GatewayError::Handshake(HandshakeError::AuthenticationFailed)
    ));
    assert!(wait_until(|| session.state() == ConnectionState::Disconnected).await);

    session.close().await.unwrap();
}

// ============================================================================
// Dispatch Tests
// ============================================================================

#[tokio::test]
async fn test_sequence_is_monotonic_and_duplicates_skipped() {
    let gateway = MockGateway::start(|mut conn| async move {
        conn.hello(45_000).await?;
        conn.recv_handshake().await?;
        conn.dispatch("READY", 1, ready_payload("session-1")).await?;
        for seq in [2, 3, 3, 2, 5] {
            conn.dispatch("MESSAGE_CREATE", seq, message_payload(&format!("seq {seq}")))
                .await?;
        }
        conn.serve().await
    })
    .await
    .unwrap();
    let session = gateway.session_builder().build().unwrap();

    let contents = Arc::new(Mutex::new(Vec::new()));
    let _messages = {
        let contents = contents.clone();
        session.on::<MessageCreateEvent, _>(move |_, message| {
            contents.lock().push(message.content.clone());
        })
    };

    session.open().await.unwrap();
    assert!(wait_until(|| session.sequence() == Some(5)).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(*contents.lock(), vec!["seq 2", "seq 3", "seq 5"]);
    assert_eq!(session.sequence(), Some(5));

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_fire_once_handler_survives_reconnect() {
    let gateway = MockGateway::start(|mut conn| async move {
        conn.hello(45_000).await?;
        conn.recv_handshake().await?;
        if conn.index == 0 {
            conn.dispatch("READY", 1, ready_payload("session-1")).await?;
            conn.dispatch("MESSAGE_CREATE", 2, message_payload("one")).await?;
            conn.dispatch("MESSAGE_CREATE", 3, message_payload("two")).await?;
            conn.send(&GatewayMessage::reconnect()).await?;
        } else {
            conn.dispatch("RESUMED", 4, serde_json::json!({})).await?;
            conn.dispatch("MESSAGE_CREATE", 5, message_payload("three")).await?;
        }
        conn.serve().await
    })
    .await
    .unwrap();
    let session = gateway.session_builder().build().unwrap();

    let once = counter();
    let always = counter();
    let _once = {
        let once = once.clone();
        session.once::<MessageCreateEvent, _>(move |_, _| {
            once.fetch_add(1, Ordering::SeqCst);
        })
    };
    let _always = {
        let always = always.clone();
        session.on::<MessageCreateEvent, _>(move |_, _| {
            always.fetch_add(1, Ordering::SeqCst);
        })
    };

    session.open().await.unwrap();
    assert!(wait_until(|| always.load(Ordering::SeqCst) == 3).await);

    assert_eq!(once.load(Ordering::SeqCst), 1);
    assert_eq!(gateway.connections(), 2);

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_state_tracker_sees_events_before_handlers() {
    struct Tracker(Arc<Mutex<Vec<String>>>);

    impl StateTracker for Tracker {
        fn update(&self, event: &Event) {
            self.0.lock().push(event.name().to_string());
        }
    }

    let gateway = MockGateway::start(|mut conn| async move {
        conn.hello(45_000).await?;
        conn.recv_handshake().await?;
        conn.dispatch("READY", 1, ready_payload("session-1")).await?;
        conn.dispatch("MESSAGE_CREATE", 2, message_payload("tracked")).await?;
        conn.serve().await
    })
    .await
    .unwrap();

    let tracked = Arc::new(Mutex::new(Vec::new()));
    let session = gateway
        .session_builder()
        .state_tracker(Tracker(tracked.clone()))
        .build()
        .unwrap();

    let in_order = Arc::new(Mutex::new(true));
    let _any = {
        let tracked = tracked.clone();
        let in_order = in_order.clone();
        session.on_any(move |_, event| {
            if tracked.lock().last().map(String::as_str) != Some(event.name()) {
                *in_order.lock() = false;
            }
        })
    };

    session.open().await.unwrap();
    assert!(wait_until(|| tracked.lock().len() == 2).await);

    assert_eq!(*tracked.lock(), vec!["READY", "MESSAGE_CREATE"]);
    assert!(*in_order.lock());

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_add_handler_by_name() {
    let gateway = MockGateway::start(|conn| ready_script(conn, unique_session_id()))
        .await
        .unwrap();
    let session = gateway.session_builder().build().unwrap();

    let ready = counter();
    let token = {
        let ready = ready.clone();
        session
            .add_handler(
                "READY",
                move |_, event| {
                    assert!(matches!(event, Event::Ready(_)));
                    ready.fetch_add(1, Ordering::SeqCst);
                },
                false,
            )
            .unwrap()
    };
    assert!(matches!(
        session.add_handler("ready", |_, _| {}, false),
        Err(GatewayError::UnknownEventType(_))
    ));

    session.open().await.unwrap();
    assert_eq!(ready.load(Ordering::SeqCst), 1);
    assert!(token.unregister());

    session.close().await.unwrap();
}

// ============================================================================
// Rate Limit Tests
// ============================================================================

#[tokio::test]
async fn test_concurrent_sends_are_rate_limited_and_whole() {
    let gateway = MockGateway::start(|conn| ready_script(conn, unique_session_id()))
        .await
        .unwrap();
    let window = Duration::from_millis(500);
    let session = gateway
        .session_builder()
        .rate_limit(1, window)
        .build()
        .unwrap();

    session.open().await.unwrap();

    let senders: Vec<_> = (0..5)
        .map(|i| {
            let session = session.clone();
            tokio::spawn(async move {
                let presence = PresenceUpdatePayload::new(Status::Online)
                    .with_activity(Activity::playing(format!("game {i}")));
                session.update_status(&presence).await
            })
        })
        .collect();
    for sender in senders {
        sender.await.unwrap().unwrap();
    }

    assert!(wait_until(|| gateway.frames_with_op(OpCode::PresenceUpdate).len() == 5).await);

    let mut games: Vec<String> = gateway
        .frames_with_op(OpCode::PresenceUpdate)
        .iter()
        .map(|received| {
            let data = received.message.d.as_ref().unwrap();
            data["activities"][0]["name"].as_str().unwrap().to_string()
        })
        .collect();
    games.sort();
    assert_eq!(games, (0..5).map(|i| format!("game {i}")).collect::<Vec<_>>());

    // Heartbeat and Identify share the bucket with the presence updates
    let frames: Vec<_> = gateway
        .frames()
        .into_iter()
        .filter(|received| received.connection == 0)
        .collect();
    assert_eq!(frames.len(), 7);
    for pair in frames.windows(2) {
        let gap = pair[1].at - pair[0].at;
        assert!(gap >= window - Duration::from_millis(100), "frames {gap:?} apart");
    }

    session.close().await.unwrap();
}
