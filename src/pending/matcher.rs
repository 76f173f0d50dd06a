//! Response matchers.

use std::fmt;

/// Verdict of a matcher for one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Not a response to this request.
    Skip,
    /// The response; completes the request successfully.
    Accept,
    /// The response, but an explicit rejection; completes the request with
    /// [`SessionError::RequestFailed`](crate::SessionError::RequestFailed).
    Reject(String),
}

/// Predicate deciding whether an inbound message answers a specific request.
///
/// Matchers run inside the registry's critical section on the receive
/// pump, so they must be cheap and must not block.
pub struct Matcher<M> {
    check: Box<dyn Fn(&M) -> MatchOutcome + Send + Sync>,
}

impl<M> Matcher<M> {
    /// Matcher accepting every message for which `predicate` returns true.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&M) -> bool + Send + Sync + 'static,
    {
        Self {
            check: Box::new(move |message| {
                if predicate(message) {
                    MatchOutcome::Accept
                } else {
                    MatchOutcome::Skip
                }
            }),
        }
    }

    /// Matcher that can also classify a response as a rejection.
    pub fn with_outcome<F>(classify: F) -> Self
    where
        F: Fn(&M) -> MatchOutcome + Send + Sync + 'static,
    {
        Self {
            check: Box::new(classify),
        }
    }

    /// Apply the matcher.
    #[inline]
    pub fn check(&self, message: &M) -> MatchOutcome {
        (self.check)(message)
    }
}

impl<M> fmt::Debug for Matcher<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matcher").finish_non_exhaustive()
    }
}
