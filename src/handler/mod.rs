//! Handler module - listener registration and event fan-out.
//!
//! Provides:
//! - [`EventKind`] - the key listeners are registered under
//! - [`EventListener`] - anything that can receive a [`DecodedMessage`](crate::message::DecodedMessage)
//! - [`EventDispatcher`] - per-session registry that fans decoded messages out
//!
//! # Example
//!
//! ```
//! use danmaku_client::handler::{listener, EventDispatcher, EventKind};
//! use danmaku_client::message::DecodedMessage;
//!
//! let dispatcher = EventDispatcher::new();
//! let print_popularity = listener(|msg: &DecodedMessage| {
//!     if let DecodedMessage::HeartbeatReply { popularity } = msg {
//!         println!("popularity: {}", popularity);
//!     }
//!     Ok(())
//! });
//!
//! dispatcher.add_listener(EventKind::HeartbeatReply, print_popularity.clone()).unwrap();
//! assert!(dispatcher.add_listener(EventKind::HeartbeatReply, print_popularity).is_err());
//! ```

mod registry;

pub use registry::{listener, EventDispatcher, EventKind, EventListener, HandlerResult, Listener};
