//! The promise state machine.
//!
//! A [`Promise`] settles exactly once. Continuations registered with
//! [`Promise::then`] never run synchronously: their bodies always go through
//! the promise's [`TaskQueue`], even when the promise is already settled.
use crate::{
    resolution::resolve_procedure,
    value::{Callback, ThenFn},
    TaskQueue, Value,
};
use std::{cell::RefCell, fmt, rc::Rc, task::Waker};
use tracing::{debug, trace};

/// The settlement state of a promise.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum State {
    #[default]
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

impl State {
    pub fn is_pending(&self) -> bool {
        matches!(self, State::Pending)
    }

    /// The fulfillment value, if fulfilled.
    pub fn value(&self) -> Option<&Value> {
        match self {
            State::Fulfilled(value) => Some(value),
            _ => None,
        }
    }

    /// The rejection reason, if rejected.
    pub fn reason(&self) -> Option<&Value> {
        match self {
            State::Rejected(reason) => Some(reason),
            _ => None,
        }
    }
}

/// A continuation passed to [`Promise::then`]. An `Err` return is the
/// continuation throwing: it rejects the derived promise.
#[derive(Clone)]
pub struct Handler(Rc<dyn Fn(Value) -> Result<Value, Value>>);

impl Handler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, Value> + 'static,
    {
        Self(Rc::new(f))
    }

    fn call(&self, value: Value) -> Result<Value, Value> {
        (self.0)(value)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler")
    }
}

/// Receives the settled value or reason when its list is drained.
type Waiter = Box<dyn FnOnce(Value)>;

/// An append-only list of waiters, consumed whole at settlement.
#[derive(Default)]
struct Waiters(Vec<Waiter>);

impl Waiters {
    fn push(&mut self, waiter: Waiter) {
        self.0.push(waiter);
    }

    fn drain_into(self, value: &Value) {
        for waiter in self.0 {
            waiter(value.clone());
        }
    }
}

#[derive(Default)]
struct Inner {
    state: State,
    fulfillment_waiters: Waiters,
    rejection_waiters: Waiters,
    wakers: Vec<Waker>,
}

/// A single-assignment container for the eventual outcome of a computation.
///
/// Cloning yields another handle to the same promise.
///
/// # Examples
///
/// ```
/// use deferred_promise::{Handler, Promise, TaskQueue, Value};
///
/// let queue = TaskQueue::new();
/// let p = Promise::new(&queue, |fulfill, _reject| {
///     fulfill(Value::from(20));
///     Ok(())
/// });
/// let doubled = p.then(
///     Some(Handler::new(|v| Ok(Value::from(v.as_number().unwrap_or(0.0) * 2.0)))),
///     None,
/// );
/// assert!(doubled.is_pending());
/// queue.run_until_idle().unwrap();
/// assert_eq!(doubled.state().value(), Some(&Value::from(40)));
/// ```
#[derive(Clone)]
pub struct Promise {
    inner: Rc<RefCell<Inner>>,
    queue: TaskQueue,
}

impl Promise {
    /// Creates a promise and runs `executor` synchronously with its
    /// fulfill and reject capabilities. An executor `Err` rejects the promise.
    pub fn new<F>(queue: &TaskQueue, executor: F) -> Self
    where
        F: FnOnce(Callback, Callback) -> Result<(), Value>,
    {
        let promise = Self::pending(queue);
        let reject = promise.rejecter();
        if let Err(reason) = executor(promise.fulfiller(), reject.clone()) {
            reject(reason);
        }
        promise
    }

    pub(crate) fn pending(queue: &TaskQueue) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner::default())),
            queue: queue.clone(),
        }
    }

    pub(crate) fn fulfiller(&self) -> Callback {
        let promise = self.clone();
        Rc::new(move |value| promise.settle(Ok(value)))
    }

    pub(crate) fn rejecter(&self) -> Callback {
        let promise = self.clone();
        Rc::new(move |reason| promise.settle(Err(reason)))
    }

    /// Moves the promise out of `Pending`. Later calls are ignored.
    fn settle(&self, outcome: Result<Value, Value>) {
        let (waiters, wakers, value) = {
            let mut inner = self.inner.borrow_mut();
            if !inner.state.is_pending() {
                debug!(promise = ?self, "ignoring settlement of an already settled promise");
                return;
            }
            let fulfillment = std::mem::take(&mut inner.fulfillment_waiters);
            let rejection = std::mem::take(&mut inner.rejection_waiters);
            let wakers = std::mem::take(&mut inner.wakers);
            let (waiters, value) = match outcome {
                Ok(value) => {
                    inner.state = State::Fulfilled(value.clone());
                    (fulfillment, value)
                }
                Err(reason) => {
                    inner.state = State::Rejected(reason.clone());
                    (rejection, reason)
                }
            };
            (waiters, wakers, value)
        };
        trace!(promise = ?self, waiters = waiters.0.len(), "promise settled");
        waiters.drain_into(&value);
        for waker in wakers {
            waker.wake();
        }
    }

    /// Registers continuations and returns the promise derived from them.
    ///
    /// A missing `on_fulfilled` passes the value through; a missing
    /// `on_rejected` passes the reason through.
    pub fn then(&self, on_fulfilled: Option<Handler>, on_rejected: Option<Handler>) -> Promise {
        let derived = Promise::pending(&self.queue);
        let reaction = Rc::new(Reaction {
            derived: derived.clone(),
            on_fulfilled,
            on_rejected,
        });

        let settled = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            match &inner.state {
                State::Pending => {
                    let queue = self.queue.clone();
                    let fulfilled = reaction.clone();
                    inner.fulfillment_waiters.push(Box::new(move |value| {
                        queue.enqueue(move || fulfilled.run(Ok(value)));
                    }));
                    let queue = self.queue.clone();
                    let rejected = reaction.clone();
                    inner.rejection_waiters.push(Box::new(move |reason| {
                        queue.enqueue(move || rejected.run(Err(reason)));
                    }));
                    None
                }
                State::Fulfilled(value) => Some(Ok(value.clone())),
                State::Rejected(reason) => Some(Err(reason.clone())),
            }
        };
        if let Some(outcome) = settled {
            self.queue.enqueue(move || reaction.run(outcome));
        }
        derived
    }

    /// Shorthand for `then(None, on_rejected)`.
    pub fn catch(&self, on_rejected: Option<Handler>) -> Promise {
        self.then(None, on_rejected)
    }

    /// The `then` capability other promises see when resolving with this one.
    pub(crate) fn then_fn(&self) -> ThenFn {
        let promise = self.clone();
        ThenFn::new(move |_receiver, on_fulfilled, on_rejected| {
            promise.then(
                Some(Handler::new(move |value| {
                    on_fulfilled(value);
                    Ok(Value::Undefined)
                })),
                Some(Handler::new(move |reason| {
                    on_rejected(reason);
                    Ok(Value::Undefined)
                })),
            );
            Ok(())
        })
    }

    pub fn state(&self) -> State {
        self.inner.borrow().state.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.inner.borrow().state.is_pending()
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn ptr_eq(&self, other: &Promise) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn register_waker(&self, waker: &Waker) {
        let mut inner = self.inner.borrow_mut();
        if !inner.wakers.iter().any(|w| w.will_wake(waker)) {
            inner.wakers.push(waker.clone());
        }
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // try_borrow: a promise can be logged from inside its own settlement.
        match self.inner.try_borrow() {
            Ok(inner) => match &inner.state {
                State::Pending => write!(f, "Promise({:p}, pending)", Rc::as_ptr(&self.inner)),
                State::Fulfilled(_) => write!(f, "Promise({:p}, fulfilled)", Rc::as_ptr(&self.inner)),
                State::Rejected(_) => write!(f, "Promise({:p}, rejected)", Rc::as_ptr(&self.inner)),
            },
            Err(_) => write!(f, "Promise({:p})", Rc::as_ptr(&self.inner)),
        }
    }
}

/// The pair of continuations from one `then` call, shared by the two waiters.
/// Only the waiter matching the settlement ever runs it.
struct Reaction {
    derived: Promise,
    on_fulfilled: Option<Handler>,
    on_rejected: Option<Handler>,
}

impl Reaction {
    fn run(&self, outcome: Result<Value, Value>) {
        let fulfill = self.derived.fulfiller();
        let reject = self.derived.rejecter();
        let (handler, value) = match outcome {
            Ok(value) => match &self.on_fulfilled {
                Some(handler) => (handler, value),
                None => return fulfill(value),
            },
            Err(reason) => match &self.on_rejected {
                Some(handler) => (handler, reason),
                None => return reject(reason),
            },
        };
        match handler.call(value) {
            Ok(x) => resolve_procedure(&self.derived, x, &fulfill, &reject),
            Err(thrown) => reject(thrown),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn recorder(log: &Rc<RefCell<Vec<String>>>, tag: &'static str) -> Handler {
        let log = log.clone();
        Handler::new(move |value| {
            log.borrow_mut().push(format!("{tag}:{value:?}"));
            Ok(value)
        })
    }

    #[test]
    fn test_executor_runs_synchronously() {
        let queue = TaskQueue::new();
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        let p = Promise::new(&queue, move |_, _| {
            flag.set(true);
            Ok(())
        });
        assert!(ran.get());
        assert!(p.is_pending());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_executor_error_rejects() {
        let queue = TaskQueue::new();
        let p = Promise::new(&queue, |_, _| Err(Value::from("thrown")));
        assert_eq!(p.state(), State::Rejected(Value::from("thrown")));
    }

    #[test]
    fn test_executor_error_after_fulfill_is_ignored() {
        let queue = TaskQueue::new();
        let p = Promise::new(&queue, |fulfill, _| {
            fulfill(Value::from(1));
            Err(Value::from("late"))
        });
        assert_eq!(p.state(), State::Fulfilled(Value::from(1)));
    }

    #[test]
    fn test_settlement_is_single_assignment() {
        let queue = TaskQueue::new();
        let p = Promise::new(&queue, |fulfill, reject| {
            reject(Value::from("first"));
            fulfill(Value::from(2));
            reject(Value::from("second"));
            fulfill(Value::from(3));
            Ok(())
        });
        assert_eq!(p.state(), State::Rejected(Value::from("first")));
        assert_eq!(p.state().value(), None);
        assert_eq!(p.state().reason(), Some(&Value::from("first")));
    }

    #[test]
    fn test_then_on_settled_promise_is_deferred() {
        let queue = TaskQueue::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let p = Promise::new(&queue, |fulfill, _| {
            fulfill(Value::from(1));
            Ok(())
        });
        let derived = p.then(Some(recorder(&log, "a")), None);
        assert!(!derived.ptr_eq(&p));
        assert!(log.borrow().is_empty());
        assert!(derived.is_pending());
        queue.run_until_idle().unwrap();
        assert_eq!(*log.borrow(), vec!["a:Number(1)".to_string()]);
        assert_eq!(derived.state(), State::Fulfilled(Value::from(1)));
    }

    #[test]
    fn test_pending_waiters_run_in_registration_order() {
        let queue = TaskQueue::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let (p, fulfill) = {
            let slot = Rc::new(RefCell::new(None));
            let s = slot.clone();
            let p = Promise::new(&queue, move |fulfill, _| {
                *s.borrow_mut() = Some(fulfill);
                Ok(())
            });
            let fulfill = slot.borrow_mut().take().unwrap();
            (p, fulfill)
        };
        p.then(Some(recorder(&log, "a")), Some(recorder(&log, "ra")));
        p.then(Some(recorder(&log, "b")), Some(recorder(&log, "rb")));
        p.catch(Some(recorder(&log, "rc")));
        queue.run_until_idle().unwrap();
        assert!(log.borrow().is_empty());

        fulfill(Value::from(9));
        // settling only enqueues; nothing has run yet
        assert!(log.borrow().is_empty());
        assert_eq!(queue.len(), 3);
        queue.run_until_idle().unwrap();
        assert_eq!(
            *log.borrow(),
            vec!["a:Number(9)".to_string(), "b:Number(9)".to_string()]
        );
    }

    #[test]
    fn test_missing_handlers_pass_through() {
        let queue = TaskQueue::new();
        let fulfilled = Promise::new(&queue, |fulfill, _| {
            fulfill(Value::from("v"));
            Ok(())
        });
        let rejected = Promise::new(&queue, |_, reject| {
            reject(Value::from("r"));
            Ok(())
        });
        let a = fulfilled.catch(Some(Handler::new(|_| Ok(Value::from("wrong")))));
        let b = rejected.then(Some(Handler::new(|_| Ok(Value::from("wrong")))), None);
        queue.run_until_idle().unwrap();
        assert_eq!(a.state(), State::Fulfilled(Value::from("v")));
        assert_eq!(b.state(), State::Rejected(Value::from("r")));
    }

    #[test]
    fn test_handler_error_rejects_derived() {
        let queue = TaskQueue::new();
        let p = Promise::new(&queue, |_, reject| {
            reject(Value::from("r"));
            Ok(())
        });
        let recovered = p.catch(Some(Handler::new(|_| Ok(Value::from("ok")))));
        let failed = p.catch(Some(Handler::new(|_| Err(Value::from("again")))));
        queue.run_until_idle().unwrap();
        assert_eq!(recovered.state(), State::Fulfilled(Value::from("ok")));
        assert_eq!(failed.state(), State::Rejected(Value::from("again")));
    }

    #[test]
    fn test_returned_rejected_promise_rejects_derived() {
        let queue = TaskQueue::new();
        let inner_queue = queue.clone();
        let p = Promise::new(&queue, |fulfill, _| {
            fulfill(Value::from(1));
            Ok(())
        });
        let derived = p.then(
            Some(Handler::new(move |_| {
                let rejected = Promise::new(&inner_queue, |_, reject| {
                    reject(Value::from("inner"));
                    Ok(())
                });
                Ok(Value::Promise(rejected))
            })),
            None,
        );
        queue.run_until_idle().unwrap();
        assert_eq!(derived.state(), State::Rejected(Value::from("inner")));
    }

    #[test]
    fn test_returned_pending_promise_rejection_is_adopted_later() {
        let queue = TaskQueue::new();
        let inner = Promise::pending(&queue);
        let reject_inner = inner.rejecter();
        let returned = inner.clone();
        let p = Promise::new(&queue, |fulfill, _| {
            fulfill(Value::Null);
            Ok(())
        });
        let derived = p.then(
            Some(Handler::new(move |_| Ok(Value::Promise(returned.clone())))),
            None,
        );
        queue.run_until_idle().unwrap();
        assert!(derived.is_pending());

        reject_inner(Value::from("later"));
        assert!(derived.is_pending());
        queue.run_until_idle().unwrap();
        assert_eq!(derived.state(), State::Rejected(Value::from("later")));
    }

    #[test]
    fn test_handler_debug() {
        let handler = Handler::new(Ok);
        assert_eq!(format!("{handler:?}"), "Handler");
        assert_eq!(format!("{:?}", Some(handler)), "Some(Handler)");
    }

    #[test]
    fn test_debug_does_not_panic_while_borrowed() {
        let queue = TaskQueue::new();
        let p = Promise::pending(&queue);
        let _guard = p.inner.borrow_mut();
        assert!(format!("{p:?}").starts_with("Promise("));
    }
}
