use crate::{Promise, State, Value};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

/// A future that completes once its promise settles, yielding `Ok(value)`
/// or `Err(reason)`.
///
/// Polling does not drain the task queue, so a promise whose settlement
/// depends on queued continuations only completes after the host runs them.
///
/// # Examples
///
/// ```
/// use deferred_promise::{Promise, TaskQueue, Value};
/// use futures::executor::block_on;
///
/// let queue = TaskQueue::new();
/// let deferred = Promise::deferred(&queue);
/// let settled = deferred.promise.settled();
/// (deferred.resolve)(Value::from("🍓"));
/// assert_eq!(block_on(settled), Ok(Value::from("🍓")));
/// ```
#[derive(Debug, Clone)]
pub struct Settled {
    promise: Promise,
}

impl Promise {
    pub fn settled(&self) -> Settled {
        Settled {
            promise: self.clone(),
        }
    }
}

impl Future for Settled {
    type Output = Result<Value, Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.promise.state() {
            State::Fulfilled(value) => Poll::Ready(Ok(value)),
            State::Rejected(reason) => Poll::Ready(Err(reason)),
            State::Pending => {
                self.promise.register_waker(cx.waker());
                Poll::Pending
            }
        }
    }
}
