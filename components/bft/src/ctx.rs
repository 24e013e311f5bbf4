//! Cancellation context passed down the call stack of every blocking operation.
//!
//! Instead of awaiting a channel, a timer or an RPC, a task awaits
//! "the operation OR the context getting canceled". Canceling a context
//! cancels all of its descendants, so canceling the context of a round
//! stops every phase and call of that round.
use std::{fmt, future::Future, sync::Arc, time::Duration};

/// Signal which can be sent only once.
#[derive(Debug)]
struct Once(tokio::sync::Semaphore);

impl Once {
    fn new() -> Self {
        Self(tokio::sync::Semaphore::new(0))
    }

    /// Wakes all receivers. Later calls are no-ops.
    fn send(&self) {
        self.0.close();
    }

    /// Cancel-safe. Completes once `send()` was called.
    async fn recv(&self) {
        // No permits are ever added, so the only way out is the semaphore getting closed.
        let res = self.0.acquire().await;
        debug_assert!(res.is_err());
    }

    fn try_recv(&self) -> bool {
        self.0.is_closed()
    }
}

/// Error returned when the awaited operation was interrupted by cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("canceled")]
pub struct Canceled;

/// Result of an operation which can be interrupted by cancellation.
pub type OrCanceled<T> = std::result::Result<T, Canceled>;

struct Inner {
    canceled: Arc<Once>,
    _parent: Option<Arc<Inner>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Wakes the task propagating cancellation from the parent, so that it doesn't leak.
        self.canceled.send();
    }
}

/// Cancellation context. Contexts form a tree: canceling a context
/// (or letting its deadline pass) cancels all of its children.
#[derive(Clone)]
pub struct Ctx(Arc<Inner>);

impl fmt::Debug for Ctx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ctx")
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

/// Top level context. Should be constructed once, in `main()` or at the start of a test.
pub fn root() -> Ctx {
    Ctx(Arc::new(Inner {
        canceled: Arc::new(Once::new()),
        _parent: None,
    }))
}

impl Ctx {
    fn child_with_deadline(&self, deadline: Option<tokio::time::Instant>) -> Self {
        let parent = self.0.canceled.clone();
        let canceled = Arc::new(Once::new());
        let child = Self(Arc::new(Inner {
            canceled: canceled.clone(),
            _parent: Some(self.0.clone()),
        }));
        if !self.is_active() {
            canceled.send();
            return child;
        }
        // The task only holds the signals, not the contexts, so that dropping
        // the child (which sends its signal) always ends the task.
        tokio::spawn(async move {
            let deadline = async {
                match deadline {
                    Some(t) => tokio::time::sleep_until(t).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                () = deadline => canceled.send(),
                () = parent.recv() => canceled.send(),
                () = canceled.recv() => {}
            }
        });
        child
    }

    /// New child context, canceled together with `self`.
    pub fn child(&self) -> Self {
        self.child_with_deadline(None)
    }

    /// New child context, additionally canceled once `d` elapses.
    pub fn with_timeout(&self, d: Duration) -> Self {
        self.child_with_deadline(Some(tokio::time::Instant::now() + d))
    }

    /// Cancels this context and all its descendants.
    pub fn cancel(&self) {
        self.0.canceled.send();
    }

    /// Whether the context is not canceled yet.
    pub fn is_active(&self) -> bool {
        !self.0.canceled.try_recv()
    }

    /// Completes once the context gets canceled. Cancel-safe.
    pub async fn canceled(&self) {
        self.0.canceled.recv().await
    }

    /// Awaits `fut`, unless the context gets canceled first.
    /// `fut` is dropped on cancellation, so it has to be cancel-safe.
    pub async fn wait<F: Future>(&self, fut: F) -> OrCanceled<F::Output> {
        tokio::select! {
            output = fut => Ok(output),
            () = self.0.canceled.recv() => Err(Canceled),
        }
    }
}

/// Error of a context-aware operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The context was canceled. Not a failure of the operation itself.
    #[error(transparent)]
    Canceled(#[from] Canceled),
    /// Any other failure.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Result of a context-aware operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Like `anyhow::Context`, for errors which wrap an `anyhow::Error`.
/// Use `wrap()` rather than `context()` on such errors, otherwise
/// the structure of the error gets lost.
pub trait Wrap: Sized {
    /// Adds context `c` to the error.
    fn wrap<C: fmt::Display + Send + Sync + 'static>(self, c: C) -> Self {
        self.with_wrap(|| c)
    }
    /// Adds lazily computed context to the error.
    fn with_wrap<C: fmt::Display + Send + Sync + 'static, F: FnOnce() -> C>(self, f: F) -> Self;
}

impl<T, E: Wrap> Wrap for std::result::Result<T, E> {
    fn with_wrap<C: fmt::Display + Send + Sync + 'static, F: FnOnce() -> C>(self, f: F) -> Self {
        self.map_err(|err| err.with_wrap(f))
    }
}

impl Wrap for Error {
    fn with_wrap<C: fmt::Display + Send + Sync + 'static, F: FnOnce() -> C>(self, f: F) -> Self {
        match self {
            Self::Internal(err) => Self::Internal(err.context(f())),
            err => err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn cancel_propagates_to_children() {
        let ctx = root();
        let child = ctx.child();
        let grandchild = child.with_timeout(Duration::from_secs(3600));
        ctx.cancel();
        grandchild.canceled().await;
        assert!(!child.is_active());
    }

    #[tokio::test]
    async fn child_cancel_does_not_touch_parent() {
        let ctx = root();
        let child = ctx.child();
        child.cancel();
        assert!(ctx.is_active());
        assert_matches!(child.wait(std::future::pending::<()>()).await, Err(Canceled));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels() {
        let ctx = root().with_timeout(Duration::from_secs(2));
        let sleep = |secs| tokio::time::sleep(Duration::from_secs(secs));
        assert_matches!(ctx.wait(sleep(1)).await, Ok(()));
        assert_matches!(ctx.wait(sleep(5)).await, Err(Canceled));
    }

    #[test]
    fn wrap_keeps_cancellation() {
        let err: Result<()> = Err(Canceled.into());
        assert_matches!(err.wrap("context"), Err(Error::Canceled(_)));
        let err: Result<()> = Err(anyhow::anyhow!("boom").into());
        let Err(Error::Internal(err)) = err.wrap("context") else {
            panic!("expected internal error");
        };
        assert_eq!(format!("{err:#}"), "context: boom");
    }
}
