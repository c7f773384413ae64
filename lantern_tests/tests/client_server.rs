//! Full socket-based tests: real server, real clients, real frames.

use std::time::Duration;

use axum::body::Body;
use http::{Request, StatusCode};
use lantern_client::GameClient;
use lantern_server::{health, server::bind_ephemeral};
use lantern_shared::{
    net::{decode_client, ClientMsg, ServerMsg},
    rules::{MAX_HEALTH, PLAYER_SPAWN_Y},
    world::SessionId,
};
use lantern_tests::{init_tracing, WAIT};
use tower::ServiceExt;

fn is_chat_from(id: SessionId) -> impl Fn(&ServerMsg) -> bool {
    move |msg| matches!(msg, ServerMsg::ChatMessage(c) if c.id == id)
}

/// Wire-level check that does not need sockets.
#[test]
fn client_events_use_event_and_data_fields() -> anyhow::Result<()> {
    let msg = decode_client(br#"{"event":"flashlight","data":true}"#)?;
    assert_eq!(msg, ClientMsg::Flashlight(true));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn init_contains_self_and_entities() -> anyhow::Result<()> {
    init_tracing();
    let (runtime, cfg) = bind_ephemeral(16).await?;

    let client = GameClient::connect(runtime.addr).await?;
    let me = client
        .init
        .players
        .get(&client.id)
        .expect("init includes own player");
    assert_eq!(me.health, MAX_HEALTH);
    assert_eq!(me.y, PLAYER_SPAWN_Y);
    assert!(me.x.abs() <= 5.0 && me.z.abs() <= 5.0);
    assert!(!me.username.is_empty());
    assert_eq!(client.init.entities.len(), cfg.entity_count);

    client.close().await?;
    runtime.shutdown();
    runtime.join().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn move_is_relayed_to_peers_but_not_echoed() -> anyhow::Result<()> {
    init_tracing();
    let (runtime, _cfg) = bind_ephemeral(16).await?;

    let mut a = GameClient::connect(runtime.addr).await?;
    let mut b = GameClient::connect(runtime.addr).await?;
    let b_id = b.id;
    assert!(b.init.players.contains_key(&a.id));

    let joined = a
        .recv_until(WAIT, |m| matches!(m, ServerMsg::PlayerJoined(_)))
        .await?;
    match joined {
        ServerMsg::PlayerJoined(p) => assert_eq!(p.id, b_id),
        other => panic!("unexpected {other:?}"),
    }

    a.send_move(1.0, 1.6, 2.0, 0.5).await?;
    let moved = b
        .recv_until(WAIT, |m| matches!(m, ServerMsg::PlayerMoved(_)))
        .await?;
    match moved {
        ServerMsg::PlayerMoved(m) => {
            assert_eq!(m.id, a.id);
            assert_eq!((m.x, m.y, m.z, m.rotation), (1.0, 1.6, 2.0, 0.5));
        }
        other => panic!("unexpected {other:?}"),
    }

    // The chat is handled after the move, so any echo would arrive first.
    a.send_chat("marker").await?;
    let a_id = a.id;
    loop {
        let msg = a.recv_until(WAIT, |_| true).await?;
        if let ServerMsg::PlayerMoved(m) = &msg {
            assert_ne!(m.id, a_id, "mover received its own move");
        }
        if is_chat_from(a_id)(&msg) {
            break;
        }
    }

    a.close().await?;
    b.close().await?;
    runtime.shutdown();
    runtime.join().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn chat_reaches_everyone_including_sender() -> anyhow::Result<()> {
    init_tracing();
    let (runtime, _cfg) = bind_ephemeral(16).await?;

    let mut a = GameClient::connect(runtime.addr).await?;
    let mut b = GameClient::connect(runtime.addr).await?;
    let a_name = a.init.players[&a.id].username.clone();

    a.send_chat("   hello lantern   ").await?;
    for client in [&mut a, &mut b] {
        let msg = client
            .recv_until(WAIT, |m| matches!(m, ServerMsg::ChatMessage(_)))
            .await?;
        match msg {
            ServerMsg::ChatMessage(c) => {
                assert_eq!(c.message, "hello lantern");
                assert_eq!(c.username, a_name);
                assert!(c.timestamp > 0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    a.close().await?;
    b.close().await?;
    runtime.shutdown();
    runtime.join().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn flashlight_toggle_is_relayed_to_peers() -> anyhow::Result<()> {
    init_tracing();
    let (runtime, _cfg) = bind_ephemeral(16).await?;

    let mut a = GameClient::connect(runtime.addr).await?;
    let mut b = GameClient::connect(runtime.addr).await?;

    a.send_flashlight(true).await?;
    let msg = b
        .recv_until(WAIT, |m| matches!(m, ServerMsg::PlayerFlashlight(_)))
        .await?;
    match msg {
        ServerMsg::PlayerFlashlight(t) => {
            assert_eq!(t.id, a.id);
            assert!(t.is_on);
        }
        other => panic!("unexpected {other:?}"),
    }

    // Toggles go to the others only; the marker chat bounds the wait.
    let a_id = a.id;
    a.send_chat("marker").await?;
    let mut saw_marker = false;
    while let Some(msg) = a.recv_timeout(WAIT).await? {
        assert!(
            !matches!(msg, ServerMsg::PlayerFlashlight(_)),
            "toggler received its own flashlight"
        );
        if is_chat_from(a_id)(&msg) {
            saw_marker = true;
            break;
        }
    }
    assert!(saw_marker);

    a.close().await?;
    b.close().await?;
    runtime.shutdown();
    runtime.join().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnect_announces_player_left_once() -> anyhow::Result<()> {
    init_tracing();
    let (runtime, _cfg) = bind_ephemeral(16).await?;

    let mut a = GameClient::connect(runtime.addr).await?;
    let b = GameClient::connect(runtime.addr).await?;
    let b_id = b.id;
    b.close().await?;

    let left = a
        .recv_until(WAIT, |m| matches!(m, ServerMsg::PlayerLeft(_)))
        .await?;
    assert!(matches!(left, ServerMsg::PlayerLeft(id) if id == b_id));

    a.send_chat("anyone left?").await?;
    let a_id = a.id;
    loop {
        let msg = a.recv_until(WAIT, |_| true).await?;
        assert!(
            !matches!(msg, ServerMsg::PlayerLeft(_)),
            "duplicate playerLeft"
        );
        if is_chat_from(a_id)(&msg) {
            break;
        }
    }

    let report = runtime.handle.health().await?;
    assert_eq!(report.player_count, 1);

    a.close().await?;
    runtime.shutdown();
    runtime.join().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_events_are_dropped_and_session_survives() -> anyhow::Result<()> {
    init_tracing();
    let (runtime, _cfg) = bind_ephemeral(16).await?;

    let mut a = GameClient::connect(runtime.addr).await?;
    a.send_raw(b"{not json").await?;
    a.send_raw(br#"{"event":"teleport","data":{}}"#).await?;
    a.send_raw(br#"{"event":"move","data":{"x":1e999,"y":0,"z":0,"rotation":0}}"#)
        .await?;
    a.send_chat("    ").await?;
    a.send_chat("still here").await?;

    let msg = a
        .recv_until(WAIT, |m| matches!(m, ServerMsg::ChatMessage(_)))
        .await?;
    match msg {
        ServerMsg::ChatMessage(c) => assert_eq!(c.message, "still here"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(runtime.handle.health().await?.player_count, 1);

    a.close().await?;
    runtime.shutdown();
    runtime.join().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connected_clients_receive_entity_updates() -> anyhow::Result<()> {
    init_tracing();
    let (runtime, cfg) = bind_ephemeral(5).await?;

    let mut a = GameClient::connect(runtime.addr).await?;
    for _ in 0..3 {
        let msg = a
            .recv_until(WAIT, |m| matches!(m, ServerMsg::EntitiesUpdate(_)))
            .await?;
        match msg {
            ServerMsg::EntitiesUpdate(entities) => assert_eq!(entities.len(), cfg.entity_count),
            other => panic!("unexpected {other:?}"),
        }
    }

    a.close().await?;
    runtime.shutdown();
    runtime.join().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_endpoint_reports_counts() -> anyhow::Result<()> {
    init_tracing();
    let (runtime, cfg) = bind_ephemeral(16).await?;

    let runtime_handle = runtime.handle.clone();
    let a = GameClient::connect(runtime.addr).await?;
    let b = GameClient::connect(runtime.addr).await?;

    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())?;
    let resp = health::router(runtime.handle.clone()).oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await?;
    let body: serde_json::Value = serde_json::from_slice(&bytes)?;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["playerCount"], 2);
    assert_eq!(body["entityCount"], cfg.entity_count);
    assert!(body["uptimeSeconds"].is_u64());

    a.close().await?;
    b.close().await?;
    runtime.shutdown();
    runtime.join().await;

    let req = Request::builder().uri("/health").body(Body::empty())?;
    let resp = health::router(runtime_handle).oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_closes_sessions_and_stops_accepting() -> anyhow::Result<()> {
    init_tracing();
    let (runtime, _cfg) = bind_ephemeral(16).await?;
    let addr = runtime.addr;

    let mut a = GameClient::connect(addr).await?;
    runtime.shutdown();
    tokio::time::timeout(WAIT, runtime.join()).await?;

    let closed = tokio::time::timeout(WAIT, async {
        while a.recv().await.is_some() {}
    })
    .await;
    assert!(closed.is_ok(), "session stayed open after shutdown");

    let late = tokio::time::timeout(Duration::from_secs(1), GameClient::connect(addr)).await;
    assert!(matches!(late, Ok(Err(_)) | Err(_)));
    Ok(())
}
