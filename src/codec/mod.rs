//! Codec module - body serialization and decompression.
//!
//! - [`JsonCodec`] - JSON bodies using `serde_json` (auth frames, pushed commands)
//! - [`PayloadExpander`] / [`BrotliExpander`] - expansion of compressed bodies
//!
//! # Design
//!
//! `JsonCodec` is a marker struct with static methods. Expansion sits behind a
//! trait so the frame decoder can be driven with a different expander in tests.
//!
//! # Example
//!
//! ```
//! use danmaku_client::codec::JsonCodec;
//!
//! let encoded = JsonCodec::encode(&serde_json::json!({"uid": 0})).unwrap();
//! let decoded: serde_json::Value = JsonCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded["uid"], 0);
//! ```

mod expander;
mod json;

pub use expander::{BrotliExpander, PayloadExpander};
pub use json::JsonCodec;
