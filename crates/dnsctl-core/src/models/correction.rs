//! Planned changes
//!
//! A [`Correction`] pairs a human-readable message with a thunk that applies
//! the change. Replaying a correction against a state that already matches
//! must succeed or converge to the same end state.

use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;

use crate::error::Result;

/// Deferred side effect of a correction
pub type CorrectionFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

/// A planned change: message plus the action that performs it
pub struct Correction {
    /// Human-readable description, deterministic for a given diff
    pub msg: String,
    f: Option<CorrectionFn>,
    fatal: bool,
}

impl Correction {
    /// Create a correction that runs `f` when applied.
    pub fn new<F, Fut>(msg: impl Into<String>, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            msg: msg.into(),
            f: Some(Box::new(move || Box::pin(f()))),
            fatal: false,
        }
    }

    /// Create an informational correction with nothing to execute.
    pub fn report(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            f: None,
            fatal: false,
        }
    }

    /// Mark this correction so that its failure skips the rest of the zone.
    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }

    /// Whether a failure must stop the remaining corrections of the zone
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    /// Whether applying this correction has a side effect
    pub fn has_action(&self) -> bool {
        self.f.is_some()
    }

    /// Apply the correction.
    pub async fn run(self) -> Result<()> {
        match self.f {
            Some(f) => f().await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Correction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Correction")
            .field("msg", &self.msg)
            .field("has_action", &self.has_action())
            .field("fatal", &self.fatal)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn thunk_runs_once_when_applied() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let correction = Correction::new("+ CREATE A example.com 1.2.3.4", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert!(correction.has_action());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        correction.run().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn report_has_no_action() {
        let correction = Correction::report("REPORT metadata changed");
        assert!(!correction.has_action());
        tokio_test::assert_ok!(correction.run().await);
    }
}
