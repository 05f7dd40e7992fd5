//! Integration tests for danmaku-client.
//!
//! These drive a full session over the in-memory transport: handshake,
//! compressed batches, dispatch and teardown.

use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};

use danmaku_client::protocol::{build_frame, encode, BodyProtocol, Header, Operation};
use danmaku_client::transport::{memory_pair, MemoryConnector, MemoryPeer};
use danmaku_client::{
    ChatKind, ConnectionParams, Connector, DanmakuError, DecodedMessage, EventKind, Session,
    SessionEnd, SessionState, Transport,
};

fn json_frame(value: &Value) -> Vec<u8> {
    let body = value.to_string();
    let header = Header::new(Operation::Message, body.len())
        .with_protocol_version(BodyProtocol::Normal.code());
    build_frame(&header, body.as_bytes()).to_vec()
}

fn brotli_frame(inner: &[u8]) -> Vec<u8> {
    let mut compressed = Vec::new();
    {
        let mut writer = brotli::CompressorWriter::new(&mut compressed, 4096, 5, 22);
        writer.write_all(inner).unwrap();
    }
    let header = Header::new(Operation::Message, compressed.len())
        .with_protocol_version(BodyProtocol::Brotli.code());
    build_frame(&header, &compressed).to_vec()
}

fn chat_command(text: &str, kind: i64) -> Value {
    json!({
        "cmd": "DANMU_MSG:4:0:2:2:2:0",
        "info": [
            [0, 1, 25, 16777215, 1670000000000i64, 555, 0, "h", 0, kind, 0, "",
             {"emoticon_unique": "e1"}, {}, {}, {"mode": 0}],
            text,
            [1001, "viewer", 0, 0, 0, 0, 0, ""],
            [],
            [12],
            [], 0, 0, null,
            {"ts": 1670000000, "ct": "CT"}
        ]
    })
}

fn connect_success() -> Bytes {
    encode(br#"{"code":0}"#, Operation::ConnectSuccess)
}

fn params() -> ConnectionParams {
    ConnectionParams::new("mem://relay/sub", "TOKEN")
}

/// Collects every message for the kinds it is registered under.
fn recorder(session: &Session, kinds: &[EventKind]) -> Arc<Mutex<Vec<DecodedMessage>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for kind in kinds {
        let sink = seen.clone();
        session
            .add_listener(
                kind.clone(),
                danmaku_client::listener(move |msg: &DecodedMessage| {
                    sink.lock().unwrap().push(msg.clone());
                    Ok(())
                }),
            )
            .unwrap();
    }
    seen
}

async fn start_live(session: &Session) -> MemoryPeer {
    let (transport, mut peer) = memory_pair();
    peer.push(connect_success()).unwrap();
    session
        .start(&MemoryConnector::new(transport), &params())
        .await
        .unwrap();
    let auth = peer.next_sent().await.unwrap();
    assert_eq!(
        Header::decode(&auth).unwrap().op(),
        Some(Operation::UserAuthentication)
    );
    peer
}

#[tokio::test]
async fn test_compressed_batch_dispatches_in_order() {
    let session = Session::builder(23219374).build().unwrap();
    let seen = recorder(
        &session,
        &[
            EventKind::Danmaku,
            EventKind::Gift,
            EventKind::Command("INTERACT_WORD".into()),
        ],
    );
    let peer = start_live(&session).await;

    let mut inner = json_frame(&chat_command("first", 0));
    inner.extend(json_frame(&json!({
        "cmd": "SEND_GIFT",
        "data": {"uname": "patron", "giftName": "rocket", "num": 2, "giftId": 9}
    })));
    inner.extend(json_frame(&json!({"cmd": "INTERACT_WORD", "data": {}})));
    inner.extend(json_frame(&chat_command("second", 1)));
    peer.push(brotli_frame(&inner)).unwrap();
    drop(peer);

    assert_eq!(session.wait_for_shutdown().await, SessionEnd::StreamEnded);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 4);
    match &seen[0] {
        DecodedMessage::Chat(chat) => {
            assert_eq!(chat.text, "first");
            assert_eq!(chat.kind, ChatKind::Text);
            assert_eq!(chat.uid, 1001);
            assert_eq!(chat.user_level, 12);
        }
        other => panic!("expected chat, got {:?}", other),
    }
    match &seen[1] {
        DecodedMessage::Gift(gift) => {
            assert_eq!(gift.username, "patron");
            assert_eq!(gift.gift_name, "rocket");
        }
        other => panic!("expected gift, got {:?}", other),
    }
    assert_eq!(seen[2].kind(), EventKind::Command("INTERACT_WORD".into()));
    match &seen[3] {
        DecodedMessage::Chat(chat) => {
            assert_eq!(chat.text, "second");
            assert!(matches!(&chat.kind, ChatKind::Emoji(d) if d["emoticon_unique"] == "e1"));
        }
        other => panic!("expected chat, got {:?}", other),
    }
}

#[tokio::test]
async fn test_json_array_body_is_flattened() {
    let session = Session::builder(1).build().unwrap();
    let seen = recorder(&session, &[EventKind::Live, EventKind::Preparing]);
    let peer = start_live(&session).await;

    let inner = json_frame(&json!([
        {"cmd": "LIVE", "roomid": 1},
        {"cmd": "PREPARING", "roomid": "1"}
    ]));
    peer.push(brotli_frame(&inner)).unwrap();
    drop(peer);

    session.wait_for_shutdown().await;
    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            DecodedMessage::RoomLive { room_id: Some(1) },
            DecodedMessage::RoomPreparing { room_id: Some(1) },
        ]
    );
}

#[tokio::test]
async fn test_bad_buffers_do_not_end_session() {
    let session = Session::builder(1).build().unwrap();
    let seen = recorder(&session, &[EventKind::HeartbeatReply]);
    let peer = start_live(&session).await;

    let mut bad_header = encode(&5u32.to_be_bytes(), Operation::HeartbeatReply).to_vec();
    bad_header[4..6].copy_from_slice(&12u16.to_be_bytes());
    peer.push(bad_header).unwrap();

    let corrupt = Header::new(Operation::Message, 4).with_protocol_version(3);
    peer.push(build_frame(&corrupt, &[0x1c, 0, 0, 0])).unwrap();

    peer.push(encode(&321u32.to_be_bytes(), Operation::HeartbeatReply))
        .unwrap();

    // Wait for the good reply to be dispatched before checking state.
    while seen.lock().unwrap().is_empty() {
        tokio::task::yield_now().await;
    }
    assert_eq!(session.state(), SessionState::Live);
    assert_eq!(
        seen.lock().unwrap()[0],
        DecodedMessage::HeartbeatReply { popularity: 321 }
    );

    session.exit().await.unwrap();
    assert!(peer.is_closed());
}

#[tokio::test]
async fn test_listener_removed_mid_session() {
    let session = Session::builder(1).build().unwrap();
    let count = Arc::new(Mutex::new(0usize));
    let counter = count.clone();
    let l = danmaku_client::listener(move |_msg: &DecodedMessage| {
        *counter.lock().unwrap() += 1;
        Ok(())
    });
    session
        .add_listener(EventKind::HeartbeatReply, l.clone())
        .unwrap();
    assert!(matches!(
        session.add_listener(EventKind::HeartbeatReply, l.clone()),
        Err(DanmakuError::DuplicateListener(_))
    ));

    let peer = start_live(&session).await;
    peer.push(encode(&1u32.to_be_bytes(), Operation::HeartbeatReply))
        .unwrap();
    while *count.lock().unwrap() == 0 {
        tokio::task::yield_now().await;
    }

    session
        .remove_listener(&EventKind::HeartbeatReply, &l)
        .unwrap();
    peer.push(encode(&2u32.to_be_bytes(), Operation::HeartbeatReply))
        .unwrap();
    drop(peer);
    session.wait_for_shutdown().await;

    assert_eq!(*count.lock().unwrap(), 1);
}

/// Accepts the handshake, then fails every receive.
struct BrokenTransport {
    replied: Mutex<bool>,
}

#[async_trait]
impl Transport for BrokenTransport {
    async fn send(&self, _data: Bytes) -> danmaku_client::Result<()> {
        Ok(())
    }

    async fn recv(&self) -> danmaku_client::Result<Option<Bytes>> {
        let mut replied = self.replied.lock().unwrap();
        if *replied {
            return Err(DanmakuError::Transport("connection reset".into()));
        }
        *replied = true;
        Ok(Some(connect_success()))
    }

    async fn close(&self) -> danmaku_client::Result<()> {
        Ok(())
    }
}

struct BrokenConnector;

#[async_trait]
impl Connector for BrokenConnector {
    async fn open(&self, _url: &str) -> danmaku_client::Result<Arc<dyn Transport>> {
        Ok(Arc::new(BrokenTransport {
            replied: Mutex::new(false),
        }))
    }
}

#[tokio::test]
async fn test_transport_failure_is_terminal_event() {
    let session = Session::builder(1).build().unwrap();
    let end = session.run(&BrokenConnector, &params()).await.unwrap();

    assert!(matches!(end, SessionEnd::TransportFailed(ref reason) if reason.contains("connection reset")));
    assert_eq!(session.state(), SessionState::Closed);
}

struct RefusingConnector;

#[async_trait]
impl Connector for RefusingConnector {
    async fn open(&self, url: &str) -> danmaku_client::Result<Arc<dyn Transport>> {
        Err(DanmakuError::Transport(format!("{} refused", url)))
    }
}

#[tokio::test]
async fn test_open_failure_closes_session() {
    let session = Session::builder(1).build().unwrap();
    let err = session.start(&RefusingConnector, &params()).await.unwrap_err();

    assert!(matches!(err, DanmakuError::Transport(_)));
    assert_eq!(session.state(), SessionState::Closed);
    assert!(matches!(session.end_reason(), Some(SessionEnd::StartFailed(_))));
}
