//! Promise/A+ style deferred values.
//!
//! A [`Promise`] is a single-assignment container for the eventual outcome of
//! some computation. Continuations are attached with [`Promise::then`] and
//! always run later, from a [`TaskQueue`] the host drains. Returning a
//! promise, or any foreign [`Object`] with a callable `then`, from a
//! continuation makes the derived promise adopt its outcome.
//!
//! # Examples
//!
//! ```
//! use deferred_promise::{Handler, Promise, TaskQueue, Value};
//!
//! let queue = TaskQueue::new();
//! let deferred = Promise::deferred(&queue);
//! let inner_queue = queue.clone();
//! let chained = deferred
//!     .promise
//!     .then(
//!         Some(Handler::new(move |v| {
//!             Ok(Promise::resolve(&inner_queue, Value::from(vec![v])).into())
//!         })),
//!         None,
//!     )
//!     .catch(Some(Handler::new(|_| Ok(Value::Null))));
//!
//! (deferred.resolve)(Value::from("hi"));
//! queue.run_until_idle().unwrap();
//! assert_eq!(
//!     chained.state().value(),
//!     Some(&Value::from(vec![Value::from("hi")]))
//! );
//! ```
mod combinators;
mod error;
mod promise;
mod queue;
mod resolution;
mod settled;
pub mod value;

pub use combinators::Deferred;
pub use error::Error;
pub use promise::{Handler, Promise, State};
pub use queue::{QueueConfig, TaskQueue};
pub use resolution::resolve_procedure;
pub use settled::Settled;
pub use value::{Callback, Object, ThenCapability, ThenFn, Thenable, Value};
