//! Codec module - turning assembled inbound messages into values and back.
//!
//! The session treats a decoded message only as something a [`Matcher`]
//! can inspect; domain semantics stay with the host.
//!
//! - [`JsonCodec`] - JSON text frames via `serde_json` (default)
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (named-field maps)
//! - [`RawCodec`] - pass-through `Bytes`, no decoding
//!
//! # Example
//!
//! ```
//! use pushwire_client::codec::{JsonCodec, MessageCodec};
//!
//! let codec = JsonCodec::<serde_json::Value>::new();
//! let bytes = codec.encode(&serde_json::json!({"op": "ping"})).unwrap();
//! let message = codec.decode(&bytes).unwrap();
//! assert_eq!(message["op"], "ping");
//! ```
//!
//! [`Matcher`]: crate::pending::Matcher

pub mod json;
mod msgpack;
mod raw;

use bytes::Bytes;
use serde::Serialize;

use crate::error::Result;

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;
pub use raw::RawCodec;

/// Pluggable encoding for outbound values and inbound messages.
///
/// Codecs are plain values selected at compile time through the session's
/// type parameter, so `encode` can stay generic over the payload type.
pub trait MessageCodec: Send + Sync + 'static {
    /// Decoded inbound message type.
    type Message: Send + 'static;

    /// Encode a value into a frame payload.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Bytes>;

    /// Decode a complete inbound message.
    fn decode(&self, bytes: &Bytes) -> Result<Self::Message>;
}
