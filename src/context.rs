//! Cooperative cancellation threaded through every public operation.

use crate::error::{ErrorKind, VfsError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A cancellation context passed to every public VFS operation.
///
/// Suspension points are backend calls and lock acquisitions; the core checks
/// the context at each of them and bails out with [`ErrorKind::Cancelled`]
/// without attempting rollback. Deadlines are carried alongside the token and
/// count as cancellation once they pass.
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}
impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Derives a child context: cancelling the parent cancels the child, but
    /// cancelling the child leaves the parent alone.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derives a child context that additionally expires at `deadline`.
    ///
    /// An earlier deadline inherited from the parent is kept.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Derives a child context that expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Requests cancellation of this context and all its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Returns `Cancelled` once the context is cancelled or past its
    /// deadline. Called by the core at every suspension point.
    pub fn check(&self) -> Result<(), VfsError> {
        if self.is_cancelled() {
            Err(ErrorKind::Cancelled.into())
        } else {
            Ok(())
        }
    }

    /// The underlying token, for callers that want to `select!` on it.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_is_live() {
        let ctx = Context::background();
        assert!(!ctx.is_cancelled());
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn cancel_propagates_to_children() {
        let parent = Context::background();
        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
        assert_eq!(child.check().unwrap_err(), ErrorKind::Cancelled);
    }

    #[test]
    fn child_cancel_leaves_parent_alone() {
        let parent = Context::background();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expires() {
        let ctx = Context::background().with_timeout(Duration::from_secs(5));
        assert!(ctx.check().is_ok());
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn child_keeps_earlier_deadline() {
        let parent = Context::background().with_timeout(Duration::from_secs(1));
        let child = parent.with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline, parent.deadline);
    }
}
