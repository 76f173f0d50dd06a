//! MsgPack codec using `rmp-serde`.
//!
//! Always encodes with `to_vec_named` so structs travel as maps with field
//! names; positional arrays break peers that decode by key.

use std::fmt;
use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::MessageCodec;
use crate::error::Result;

/// MessagePack codec decoding inbound messages into `M`.
pub struct MsgPackCodec<M = serde_json::Value> {
    _message: PhantomData<fn() -> M>,
}

impl<M> MsgPackCodec<M> {
    /// Create a new MsgPack codec.
    pub fn new() -> Self {
        Self {
            _message: PhantomData,
        }
    }
}

impl<M> Default for MsgPackCodec<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for MsgPackCodec<M> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for MsgPackCodec<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MsgPackCodec")
    }
}

impl<M> MessageCodec for MsgPackCodec<M>
where
    M: DeserializeOwned + Send + 'static,
{
    type Message = M;

    #[inline]
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Bytes> {
        Ok(Bytes::from(rmp_serde::to_vec_named(value)?))
    }

    #[inline]
    fn decode(&self, bytes: &Bytes) -> Result<M> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
