//! Watch Room - print a live room's chat, gifts and lifecycle events.
//!
//! This example demonstrates:
//! - Resolving connection parameters for a room id
//! - Registering listeners by event kind with the builder pattern
//! - Running a session until the relay ends it or Ctrl-C is pressed
//!
//! # Running
//!
//! ```sh
//! RUST_LOG=danmaku_client=debug cargo run --example watch_room -- 23219374
//! ```

use danmaku_client::{
    ChatKind, DecodedMessage, EventKind, RoomInfoClient, Session, SessionEnd, WebSocketConnector,
};

const DEFAULT_ROOM: u64 = 23219374;

fn print_chat(msg: &DecodedMessage) -> danmaku_client::Result<()> {
    if let DecodedMessage::Chat(chat) = msg {
        let kind = match &chat.kind {
            ChatKind::Text => "",
            ChatKind::Emoji(_) => " [emoji]",
            ChatKind::Voice(_) => " [voice]",
        };
        println!(
            "[{}] {} (lv{}): {}{}",
            chat.timestamp.format("%H:%M:%S"),
            chat.username,
            chat.user_level,
            chat.text,
            kind
        );
    }
    Ok(())
}

fn print_gift(msg: &DecodedMessage) -> danmaku_client::Result<()> {
    if let DecodedMessage::Gift(gift) = msg {
        println!("{} {} {} x{}", gift.username, gift.action, gift.gift_name, gift.num);
    }
    Ok(())
}

fn print_lifecycle(msg: &DecodedMessage) -> danmaku_client::Result<()> {
    match msg {
        DecodedMessage::RoomLive { room_id } => println!("room {:?} is live", room_id),
        DecodedMessage::RoomPreparing { room_id } => println!("room {:?} went offline", room_id),
        _ => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let room_id = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => DEFAULT_ROOM,
    };

    let params = RoomInfoClient::new().connection_params(room_id).await?;
    tracing::info!(room_id, url = %params.url, "Resolved relay");

    let session = Session::builder(room_id)
        .on(EventKind::Danmaku, print_chat)
        .on(EventKind::Gift, print_gift)
        .on(EventKind::Live, print_lifecycle)
        .on(EventKind::Preparing, print_lifecycle)
        .on(EventKind::HeartbeatReply, |msg: &DecodedMessage| {
            if let DecodedMessage::HeartbeatReply { popularity } = msg {
                tracing::info!(popularity, "Heartbeat reply");
            }
            Ok(())
        })
        .start(&WebSocketConnector::new(), &params)
        .await?;

    let end = tokio::select! {
        end = session.wait_for_shutdown() => end,
        _ = tokio::signal::ctrl_c() => {
            session.exit().await?;
            SessionEnd::Exited
        }
    };
    session.exit().await?;

    tracing::info!(?end, "Session ended");
    Ok(())
}
