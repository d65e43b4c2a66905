//! Protocol-level session lifecycle tests.
//!
//! These drive the server tick by tick in the test task and talk to it over
//! raw framed connections, so frame ordering and per-tick behavior can be
//! asserted exactly.

use std::net::SocketAddr;
use std::time::Duration;

use wyrm_server::server::{bind_ephemeral, GameServer};
use wyrm_shared::auth::{OpenAuthenticator, PasswordAuthenticator};
use wyrm_shared::codec::{self, Message};
use wyrm_shared::config::ServerConfig;
use wyrm_shared::math::Vec2;
use wyrm_shared::net::FramedConn;
use wyrm_shared::object::{ObjectSnapshot, Planet};

const DT: f32 = 1.0 / 64.0;

/// Lets in-flight bytes land before a non-blocking drain pass.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

/// Connects, lets the server accept, and consumes the greeting.
async fn connect_and_greet(
    server: &mut GameServer,
    addr: SocketAddr,
) -> anyhow::Result<FramedConn> {
    let mut conn = FramedConn::connect(addr).await?;
    settle().await;
    server.step(DT).await?;

    let greeting = conn.recv_frame().await?;
    let (banner, _, _) = codec::parse_greeting(&greeting).expect("well-formed greeting");
    assert_eq!(banner, codec::GREETING);
    Ok(conn)
}

/// Sends credentials and consumes the success acknowledgement.
async fn authenticate(server: &mut GameServer, conn: &mut FramedConn) -> anyhow::Result<()> {
    conn.send_frame(&codec::credentials_frame("anon", "")).await?;
    settle().await;
    server.step(DT).await?;

    let ack = conn.recv_frame().await?;
    assert_eq!(codec::parse_text(&ack).as_deref(), Some(codec::AUTH_SUCCESS));
    Ok(())
}

/// A failed handshake yields exactly one rejection frame and a closed
/// socket; the session never reaches the next tick's active set.
#[tokio::test]
async fn failed_auth_gets_one_rejection_then_close() -> anyhow::Result<()> {
    let auth = PasswordAuthenticator::default().with_account("ormr", "fafnir");
    let (mut server, addr) = bind_ephemeral(Box::new(auth)).await?;
    let mut conn = connect_and_greet(&mut server, addr).await?;

    conn.send_frame(&codec::credentials_frame("ormr", "wrong"))
        .await?;
    settle().await;
    server.step(DT).await?;

    assert_eq!(server.session_count(), 0);
    assert!(server.players().is_empty());

    let rejection = conn.recv_frame().await?;
    assert_eq!(
        codec::parse_text(&rejection).as_deref(),
        Some(codec::AUTH_FAILED)
    );
    // Nothing follows the rejection; the server has dropped the socket.
    assert!(conn.recv_frame().await.is_err());
    Ok(())
}

/// A half-open session that never sends credentials is evicted once the
/// idle window passes, with an explicit reason.
#[tokio::test]
async fn idle_handshake_is_evicted() -> anyhow::Result<()> {
    let cfg = ServerConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        handshake_timeout_secs: 0,
        ..Default::default()
    };
    let mut server = GameServer::bind(cfg, Box::new(OpenAuthenticator)).await?;
    let addr = server.local_addr()?;

    let mut conn = FramedConn::connect(addr).await?;
    settle().await;
    server.step(DT).await?;
    assert_eq!(server.session_count(), 0);

    let greeting = conn.recv_frame().await?;
    assert!(codec::parse_greeting(&greeting).is_some());
    let notice = conn.recv_frame().await?;
    assert_eq!(
        codec::parse_text(&notice).as_deref(),
        Some("Authentication timed out")
    );
    Ok(())
}

/// Disconnecting one of N sessions mid-tick still services the other N-1
/// that same tick, exactly once each: they all see the departed player's
/// ship removed.
#[tokio::test]
async fn disconnect_mid_tick_spares_other_sessions() -> anyhow::Result<()> {
    let (mut server, addr) = bind_ephemeral(Box::new(OpenAuthenticator)).await?;

    let mut a = connect_and_greet(&mut server, addr).await?;
    authenticate(&mut server, &mut a).await?;
    let mut b = connect_and_greet(&mut server, addr).await?;
    authenticate(&mut server, &mut b).await?;
    let mut c = connect_and_greet(&mut server, addr).await?;
    authenticate(&mut server, &mut c).await?;

    assert_eq!(server.session_count(), 3);
    assert_eq!(server.players().len(), 3);

    // Discard the join snapshots and fresh-ship broadcasts.
    settle().await;
    a.drain()?;
    c.drain()?;

    drop(b);
    settle().await;
    server.step(DT).await?;

    assert_eq!(server.session_count(), 2);
    assert_eq!(server.players().len(), 2);

    // The same tick that noticed the disconnect broadcast one removal (the
    // departed ship) to each surviving session.
    settle().await;
    for conn in [&mut a, &mut c] {
        let drain = conn.drain()?;
        let removes = drain
            .frames
            .iter()
            .map(|f| Message::decode(f))
            .filter(|m| m.kind == codec::MSG_OBJECT && m.subtype == codec::OBJECT_REMOVE)
            .count();
        assert_eq!(removes, 1);
    }
    Ok(())
}

/// An object created and deleted within the same tick is still announced
/// before its removal.
#[tokio::test]
async fn state_is_broadcast_before_remove() -> anyhow::Result<()> {
    let (mut server, addr) = bind_ephemeral(Box::new(OpenAuthenticator)).await?;
    let mut conn = connect_and_greet(&mut server, addr).await?;
    authenticate(&mut server, &mut conn).await?;
    settle().await;
    conn.drain()?;

    let id = server
        .objects_mut()
        .insert(Box::new(Planet::new("Vega".into(), Vec2::ZERO, 0.5)));
    server
        .objects_mut()
        .get_mut(id)
        .expect("just inserted")
        .core_mut()
        .mark_for_deletion();
    server.step(DT).await?;
    assert!(server.objects().get(id).is_none());

    settle().await;
    let drain = conn.drain()?;
    let mut state_at = None;
    let mut remove_at = None;
    for (i, frame) in drain.frames.iter().enumerate() {
        let msg = Message::decode(frame);
        if msg.kind != codec::MSG_OBJECT {
            continue;
        }
        match msg.subtype {
            codec::OBJECT_STATE => {
                if ObjectSnapshot::read_full(&msg.payload).is_some_and(|s| s.id == id) {
                    state_at.get_or_insert(i);
                }
            }
            codec::OBJECT_REMOVE => {
                if msg.payload.len() >= 2
                    && u16::from_be_bytes([msg.payload[0], msg.payload[1]]) == id
                {
                    remove_at.get_or_insert(i);
                }
            }
            _ => {}
        }
    }

    let state_at = state_at.expect("full state was broadcast");
    let remove_at = remove_at.expect("removal was broadcast");
    assert!(state_at < remove_at);
    Ok(())
}

/// The full object lifecycle on the wire: one full state while fresh, then
/// partial updates while dirty, then exactly one removal.
#[tokio::test]
async fn object_lifecycle_on_the_wire() -> anyhow::Result<()> {
    let (mut server, addr) = bind_ephemeral(Box::new(OpenAuthenticator)).await?;
    let mut conn = connect_and_greet(&mut server, addr).await?;
    authenticate(&mut server, &mut conn).await?;
    settle().await;
    conn.drain()?;

    let id = server
        .objects_mut()
        .insert(Box::new(Planet::new("Vega".into(), Vec2::ZERO, 0.5)));
    server.step(DT).await?; // fresh: full state
    server.step(DT).await?; // spinning: partial update
    server
        .objects_mut()
        .get_mut(id)
        .expect("still live")
        .core_mut()
        .mark_for_deletion();
    server.step(DT).await?; // removal
    assert!(server.objects().get(id).is_none());

    settle().await;
    let drain = conn.drain()?;
    let mut subtypes = Vec::new();
    for frame in &drain.frames {
        let msg = Message::decode(frame);
        if msg.kind == codec::MSG_OBJECT {
            subtypes.push(msg.subtype);
        }
    }

    assert_eq!(subtypes.first(), Some(&codec::OBJECT_STATE));
    assert_eq!(subtypes.last(), Some(&codec::OBJECT_REMOVE));
    assert_eq!(
        subtypes
            .iter()
            .filter(|&&s| s == codec::OBJECT_REMOVE)
            .count(),
        1
    );
    assert!(subtypes.contains(&codec::OBJECT_UPDATE));
    Ok(())
}
