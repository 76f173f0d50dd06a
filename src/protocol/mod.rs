//! Protocol module - inbound frames and message reassembly.
//!
//! A transport yields [`InboundFrame`]s, which may be fragments of a larger
//! logical message. [`FrameAssembler`] turns them back into complete
//! messages, so dispatch never sees a partial payload.

mod assembler;
mod frame;

pub use assembler::FrameAssembler;
pub use frame::InboundFrame;
