//! The promise resolution procedure: decides what settling a promise with a
//! candidate value actually means.
use crate::{
    value::{Callback, ThenCapability},
    Error, Promise, Value,
};
use std::{cell::Cell, rc::Rc};
use tracing::debug;

/// Single-use flag shared by the two callbacks handed to a thenable.
#[derive(Clone, Default)]
struct Latch(Rc<Cell<bool>>);

impl Latch {
    /// Returns `true` only for the first call.
    fn fire(&self) -> bool {
        !self.0.replace(true)
    }
}

/// Settles `target` with `x`, unwrapping thenables.
///
/// - `x` being `target` itself rejects with [`Error::ChainingCycle`].
/// - Plain values and objects without a callable `then` fulfill.
/// - A failing `then` read rejects with the failure.
/// - A callable `then` is invoked with `x` as receiver. Its callbacks share a
///   latch: the first call from either wins and the rest are ignored. A
///   fulfilled `y` goes through this procedure again.
/// - A `then` call that errors rejects, unless a callback already fired.
pub fn resolve_procedure(target: &Promise, x: Value, fulfill: &Callback, reject: &Callback) {
    if let Value::Promise(candidate) = &x {
        if candidate.ptr_eq(target) {
            debug!(promise = ?target, "chaining cycle detected");
            return reject(Value::Error(Error::ChainingCycle));
        }
    }

    let then = match x.then_capability() {
        ThenCapability::Absent => return fulfill(x),
        ThenCapability::AccessFailed(reason) => return reject(reason),
        ThenCapability::Callable(then) => then,
    };

    let latch = Latch::default();
    let on_inner_fulfill: Callback = {
        let (latch, target) = (latch.clone(), target.clone());
        let (fulfill, reject) = (fulfill.clone(), reject.clone());
        Rc::new(move |y| {
            if latch.fire() {
                resolve_procedure(&target, y, &fulfill, &reject);
            }
        })
    };
    let on_inner_reject: Callback = {
        let (latch, reject) = (latch.clone(), reject.clone());
        Rc::new(move |r| {
            if latch.fire() {
                reject(r);
            }
        })
    };

    if let Err(thrown) = then.call(&x, on_inner_fulfill, on_inner_reject) {
        if latch.fire() {
            reject(thrown);
        } else {
            debug!(promise = ?target, "thenable threw after settling, ignoring");
        }
    }
}
