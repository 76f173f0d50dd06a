//! JSON codec using `serde_json`.
//!
//! This is the default codec: outbound values become UTF-8 text frames and
//! inbound text decodes into `M` (a `serde_json::Value` unless told otherwise).

use std::fmt;
use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::MessageCodec;
use crate::error::Result;
use crate::pending::Matcher;

/// JSON codec decoding inbound messages into `M`.
pub struct JsonCodec<M = Value> {
    _message: PhantomData<fn() -> M>,
}

impl<M> JsonCodec<M> {
    /// Create a new JSON codec.
    pub fn new() -> Self {
        Self {
            _message: PhantomData,
        }
    }
}

impl<M> Default for JsonCodec<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for JsonCodec<M> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for JsonCodec<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<M> MessageCodec for JsonCodec<M>
where
    M: DeserializeOwned + Send + 'static,
{
    type Message = M;

    #[inline]
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }

    #[inline]
    fn decode(&self, bytes: &Bytes) -> Result<M> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Build a matcher accepting messages whose top-level `field` equals `expected`.
///
/// This is the usual way to correlate a response carrying the request id.
pub fn field_matcher(field: &str, expected: impl Into<Value>) -> Matcher<Value> {
    let field = field.to_string();
    let expected = expected.into();
    Matcher::new(move |message: &Value| message.get(&field) == Some(&expected))
}
