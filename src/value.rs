//! Dynamic values carried by promises.
//!
//! A promise can be fulfilled with anything: a number, a list, another
//! promise, or a foreign object that happens to expose a `then` capability.
//! [`Value`] is the closed set of shapes the resolution machinery knows how to
//! inspect, and [`Object`] is the seam through which foreign promise-like
//! values plug in.
use crate::{Error, Promise};
use std::{fmt, rc::Rc};

/// A settlement capability: fulfills or rejects some promise when called.
pub type Callback = Rc<dyn Fn(Value)>;

/// A value a promise can hold, or a reason it can be rejected with.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    List(Vec<Value>),
    Error(Error),
    Promise(Promise),
    Object(Rc<dyn Object>),
}

/// Foreign object-like values.
///
/// Only the `then` property matters to the resolution procedure. Reading it
/// may fail (`Err`), find nothing callable (`Ok(None)`), or produce a
/// callable capability.
pub trait Object {
    fn then(&self) -> Result<Option<ThenFn>, Value>;
}

/// The outcome of looking for a `then` capability on a value.
pub enum ThenCapability {
    /// Not object-like, or object-like without a callable `then`.
    Absent,
    Callable(ThenFn),
    /// Reading `then` threw.
    AccessFailed(Value),
}

/// A callable `then`: invoked with its receiver and the two callbacks that
/// continue the resolution. An `Err` means the call threw.
#[derive(Clone)]
pub struct ThenFn(Rc<dyn Fn(&Value, Callback, Callback) -> Result<(), Value>>);

impl ThenFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value, Callback, Callback) -> Result<(), Value> + 'static,
    {
        Self(Rc::new(f))
    }

    pub fn call(
        &self,
        receiver: &Value,
        on_fulfilled: Callback,
        on_rejected: Callback,
    ) -> Result<(), Value> {
        (self.0)(receiver, on_fulfilled, on_rejected)
    }
}

impl fmt::Debug for ThenFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ThenFn")
    }
}

/// A foreign promise-like object whose `then` is a plain closure.
///
/// # Examples
///
/// ```
/// use deferred_promise::{Promise, TaskQueue, Thenable, Value};
///
/// let queue = TaskQueue::new();
/// let thenable = Thenable::new(|on_fulfilled, _on_rejected| {
///     on_fulfilled(Value::from(7));
///     Ok(())
/// });
/// let p = Promise::resolve(&queue, thenable.into());
/// queue.run_until_idle().unwrap();
/// assert_eq!(p.state().value(), Some(&Value::from(7)));
/// ```
pub struct Thenable {
    then: ThenFn,
}

impl Thenable {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Callback, Callback) -> Result<(), Value> + 'static,
    {
        Self {
            then: ThenFn::new(move |_receiver, on_fulfilled, on_rejected| {
                f(on_fulfilled, on_rejected)
            }),
        }
    }
}

impl Object for Thenable {
    fn then(&self) -> Result<Option<ThenFn>, Value> {
        Ok(Some(self.then.clone()))
    }
}

impl From<Thenable> for Value {
    fn from(thenable: Thenable) -> Self {
        Value::Object(Rc::new(thenable))
    }
}

impl Value {
    /// Plain values resolve a promise immediately; object-like ones are
    /// inspected for a `then` capability first.
    pub fn is_object_like(&self) -> bool {
        matches!(self, Value::Promise(_) | Value::Object(_))
    }

    pub fn then_capability(&self) -> ThenCapability {
        match self {
            Value::Promise(promise) => ThenCapability::Callable(promise.then_fn()),
            Value::Object(object) => match object.then() {
                Ok(Some(then)) => ThenCapability::Callable(then),
                Ok(None) => ThenCapability::Absent,
                Err(reason) => ThenCapability::AccessFailed(reason),
            },
            _ => ThenCapability::Absent,
        }
    }

    /// Elements of an iterable value, in iteration order.
    pub fn iterate(&self) -> Result<Vec<Value>, Error> {
        match self {
            Value::List(items) => Ok(items.clone()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::from(c.to_string())).collect()),
            _ => Err(Error::NotIterable),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_promise(&self) -> Option<&Promise> {
        match self {
            Value::Promise(promise) => Some(promise),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Promise(a), Value::Promise(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("Undefined"),
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Error(err) => write!(f, "Error({err})"),
            Value::Promise(promise) => write!(f, "{promise:?}"),
            Value::Object(_) => f.write_str("Object"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Error> for Value {
    fn from(err: Error) -> Self {
        Value::Error(err)
    }
}

impl From<Promise> for Value {
    fn from(promise: Promise) -> Self {
        Value::Promise(promise)
    }
}
