//! Raw codec - pass-through for payloads the host decodes itself.
//!
//! Inbound messages are handed over as the assembled `Bytes` (zero-copy).
//! Structured encoding is not supported; send raw payloads with
//! [`SocketSession::send`](crate::SocketSession::send) instead.

use bytes::Bytes;
use serde::Serialize;

use super::MessageCodec;
use crate::error::{Result, SessionError};

/// Raw codec that passes bytes through without transformation.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl MessageCodec for RawCodec {
    type Message = Bytes;

    fn encode<T: Serialize + ?Sized>(&self, _value: &T) -> Result<Bytes> {
        Err(SessionError::Config(
            "RawCodec cannot encode structured values".into(),
        ))
    }

    #[inline]
    fn decode(&self, bytes: &Bytes) -> Result<Bytes> {
        Ok(bytes.clone())
    }
}
