//! Pending module - request/response correlation.
//!
//! Provides:
//! - [`Matcher`] - decides whether an inbound message answers a request
//! - [`PendingRegistry`] - outstanding requests, completed by the receive pump
//! - [`PendingRequest`] - awaitable handle returned by registration
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use pushwire_client::pending::{Matcher, PendingRegistry};
//!
//! # async fn run() -> pushwire_client::Result<()> {
//! let registry = PendingRegistry::<u64>::new();
//! let request = registry.register(Matcher::new(|id: &u64| *id == 7), Duration::from_secs(1));
//!
//! assert!(registry.try_complete(3).is_err()); // not ours, handed back
//! assert!(registry.try_complete(7).is_ok());
//! assert_eq!(request.wait().await?, 7);
//! # Ok(())
//! # }
//! ```

mod matcher;
mod registry;

pub use matcher::{MatchOutcome, Matcher};
pub use registry::{PendingRegistry, PendingRequest};
