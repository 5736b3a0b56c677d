use crate::error::PoolError;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::future::Shared;
use futures::FutureExt;

/// The terminal value of a pool run.
///
/// `Ok(None)` means the source ran dry and every verdict said continue.
/// `Ok(Some(v))` means a resolve hook forced early success with `v`.
pub type PoolOutcome<V, E> = Result<Option<V>, PoolError<E>>;

pub(crate) fn result_channel<V, E>() -> (oneshot::Sender<PoolOutcome<V, E>>, ResultFuture<V, E>)
where
  V: Clone,
  E: Clone,
{
  let (tx, rx) = oneshot::channel();
  (tx, ResultFuture { inner: rx.shared() })
}

pub(crate) fn drain_channel() -> (oneshot::Sender<()>, DrainFuture) {
  let (tx, rx) = oneshot::channel();
  (tx, DrainFuture { inner: rx.shared() })
}

/// The pool's aggregate result. Settles at most once, on the first terminal
/// verdict (or when the source is exhausted and the last task finishes).
///
/// Clones all observe the same settlement, which is how `start()` stays
/// idempotent. A pool that is canceled before any terminal verdict never
/// settles this future; await [`DrainFuture`] as well to observe a
/// canceled-without-result termination.
pub struct ResultFuture<V, E> {
  inner: Shared<oneshot::Receiver<PoolOutcome<V, E>>>,
}

impl<V, E> Clone for ResultFuture<V, E> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
    }
  }
}

impl<V: Clone, E: Clone> Future for ResultFuture<V, E> {
  type Output = PoolOutcome<V, E>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    match self.get_mut().inner.poll_unpin(cx) {
      Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
      // Sender gone without a settlement: the pool was canceled (or dropped)
      // before reaching a terminal verdict. This future stays pending.
      Poll::Ready(Err(oneshot::Canceled)) => Poll::Pending,
      Poll::Pending => Poll::Pending,
    }
  }
}

/// Settles exactly once when the pool is ended and no task remains active.
/// Independent of [`ResultFuture`]: a canceled pool drains without ever
/// producing a result.
pub struct DrainFuture {
  inner: Shared<oneshot::Receiver<()>>,
}

impl Clone for DrainFuture {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
    }
  }
}

impl Future for DrainFuture {
  type Output = ();

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    match self.get_mut().inner.poll_unpin(cx) {
      Poll::Ready(Ok(())) => Poll::Ready(()),
      // Pool dropped before draining; nothing will ever settle this.
      Poll::Ready(Err(oneshot::Canceled)) => Poll::Pending,
      Poll::Pending => Poll::Pending,
    }
  }
}
