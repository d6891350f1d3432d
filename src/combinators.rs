//! Factories and aggregate combinators built on top of [`Promise::then`].
use crate::{
    resolution::resolve_procedure,
    value::Callback,
    Error, Handler, Promise, TaskQueue, Value,
};
use std::{cell::RefCell, fmt, rc::Rc};

/// A fresh pending promise together with its settlement capabilities.
///
/// # Examples
///
/// ```
/// use deferred_promise::{Promise, TaskQueue, Value};
///
/// let queue = TaskQueue::new();
/// let deferred = Promise::deferred(&queue);
/// assert!(deferred.promise.is_pending());
/// (deferred.resolve)(Value::from("done"));
/// (deferred.reject)(Value::from("ignored"));
/// assert_eq!(deferred.promise.state().value(), Some(&Value::from("done")));
/// ```
pub struct Deferred {
    pub promise: Promise,
    pub resolve: Callback,
    pub reject: Callback,
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("promise", &self.promise)
            .finish_non_exhaustive()
    }
}

/// Result slots and countdown shared by the continuations of `all`.
struct AllState {
    results: Vec<Value>,
    remaining: usize,
}

impl Promise {
    /// Returns `value` itself if it is already a promise. Otherwise returns a
    /// new promise settled through the resolution procedure, so thenables
    /// are adopted on both their fulfillment and rejection paths.
    pub fn resolve(queue: &TaskQueue, value: Value) -> Promise {
        if let Value::Promise(promise) = value {
            return promise;
        }
        let promise = Promise::pending(queue);
        resolve_procedure(&promise, value, &promise.fulfiller(), &promise.rejecter());
        promise
    }

    pub fn reject(queue: &TaskQueue, reason: Value) -> Promise {
        Promise::new(queue, move |_, reject| {
            reject(reason);
            Ok(())
        })
    }

    pub fn deferred(queue: &TaskQueue) -> Deferred {
        let promise = Promise::pending(queue);
        Deferred {
            resolve: promise.fulfiller(),
            reject: promise.rejecter(),
            promise,
        }
    }

    /// Fulfills with every input's value, in input order, once all inputs
    /// have fulfilled. The first rejection rejects the aggregate. Entries that
    /// are not promises are taken verbatim.
    ///
    /// Fails with [`Error::NotIterable`] before constructing anything if
    /// `items` is not iterable.
    ///
    /// # Examples
    ///
    /// ```
    /// use deferred_promise::{Promise, TaskQueue, Value};
    ///
    /// let queue = TaskQueue::new();
    /// let items = Value::from(vec![
    ///     Value::from(1),
    ///     Promise::resolve(&queue, Value::from(2)).into(),
    ///     Value::from(3),
    /// ]);
    /// let all = Promise::all(&queue, &items).unwrap();
    /// queue.run_until_idle().unwrap();
    /// assert_eq!(
    ///     all.state().value(),
    ///     Some(&Value::from(vec![Value::from(1), Value::from(2), Value::from(3)]))
    /// );
    /// assert!(Promise::all(&queue, &Value::from(1)).is_err());
    /// ```
    pub fn all(queue: &TaskQueue, items: &Value) -> Result<Promise, Error> {
        let items = items.iterate()?;
        Ok(Promise::new(queue, move |fulfill, reject| {
            if items.is_empty() {
                fulfill(Value::List(Vec::new()));
                return Ok(());
            }
            let state = Rc::new(RefCell::new(AllState {
                results: vec![Value::Undefined; items.len()],
                remaining: items.len(),
            }));
            let record = Rc::new(move |index: usize, value: Value| {
                let done = {
                    let mut state = state.borrow_mut();
                    if let Some(slot) = state.results.get_mut(index) {
                        *slot = value;
                    }
                    state.remaining -= 1;
                    state.remaining == 0
                };
                if done {
                    let results = std::mem::take(&mut state.borrow_mut().results);
                    fulfill(Value::List(results));
                }
            });

            for (index, item) in items.into_iter().enumerate() {
                match item {
                    Value::Promise(promise) => {
                        let record = record.clone();
                        let reject = reject.clone();
                        promise.then(
                            Some(Handler::new(move |value| {
                                record(index, value);
                                Ok(Value::Undefined)
                            })),
                            Some(Handler::new(move |reason| {
                                reject(reason);
                                Ok(Value::Undefined)
                            })),
                        );
                    }
                    other => record(index, other),
                }
            }
            Ok(())
        }))
    }

    /// Settles like whichever input settles first. Entries that are not
    /// promises settle immediately, so they beat any promise that is still
    /// pending.
    ///
    /// Fails with [`Error::NotIterable`] if `items` is not iterable. An empty
    /// input yields a promise that stays pending.
    pub fn race(queue: &TaskQueue, items: &Value) -> Result<Promise, Error> {
        let items = items.iterate()?;
        Ok(Promise::new(queue, move |fulfill, reject| {
            for item in items {
                match item {
                    Value::Promise(promise) => {
                        let fulfill = fulfill.clone();
                        let reject = reject.clone();
                        promise.then(
                            Some(Handler::new(move |value| {
                                fulfill(value);
                                Ok(Value::Undefined)
                            })),
                            Some(Handler::new(move |reason| {
                                reject(reason);
                                Ok(Value::Undefined)
                            })),
                        );
                    }
                    other => fulfill(other),
                }
            }
            Ok(())
        }))
    }
}
