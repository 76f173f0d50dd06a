//! # pushwire-client
//!
//! Resilient client for streaming protocols that push unsolicited events and
//! answer request/response exchanges over one long-lived duplex connection.
//!
//! ## Architecture
//!
//! - **Send pump**: drains a FIFO outbound queue onto the open connection
//! - **Receive pump**: reads frames, reassembles fragments, dispatches messages
//! - **Pending registry**: correlates responses with `send_and_wait` callers
//! - **Supervisor**: connects, resubscribes, and heals dropped connections
//!
//! Inbound messages are offered to pending requests first; anything left
//! over goes to the `on_message` handler.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pushwire_client::{ConnectionStatus, SocketSession, TopicSubscriptions};
//!
//! #[tokio::main]
//! async fn main() -> pushwire_client::Result<()> {
//!     let topics = Arc::new(TopicSubscriptions::with_topics(["tickers.BTC-USD"]));
//!
//!     let session = SocketSession::builder()
//!         .uri("wss://stream.example.com/v1")
//!         .max_reconnect_tries(Some(10))
//!         .subscriptions(topics.clone())
//!         .on_message(|event| println!("{event}"))
//!         .build()?;
//!
//!     if session.connect().await == ConnectionStatus::Connected {
//!         topics.subscribe(&session, &["trades.BTC-USD"]).await?;
//!     }
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!     session.close().await
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod pending;
pub mod protocol;
pub mod status;
pub mod subscription;
pub mod transport;

mod outbound;
mod pump;
mod session;
mod stats;

pub use config::SessionConfig;
pub use error::{Result, SessionError};
pub use session::{MessageHandler, Requester, SessionBuilder, SocketSession};
pub use stats::StatsSnapshot;
pub use status::{ConnectionStatus, StatusChange};
pub use subscription::{SubscriptionProvider, TopicSubscriptions};
