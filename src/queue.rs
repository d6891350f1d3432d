//! The deferred task queue promises schedule their continuations on.
//!
//! Nothing here runs on its own: the host decides when to drain the queue,
//! typically once its current synchronous step has unwound.
use crate::Error;
use serde::{Deserialize, Serialize};
use std::{cell::RefCell, collections::VecDeque, fmt, rc::Rc};
use tracing::{debug, trace};

type Task = Box<dyn FnOnce()>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of tasks a single [`TaskQueue::run_until_idle`] call
    /// executes. `None`, the default, drains without bound.
    pub drain_limit: Option<usize>,
}

/// A single-threaded FIFO queue of deferred tasks.
///
/// Cloning yields another handle to the same queue.
///
/// # Examples
///
/// ```
/// use deferred_promise::TaskQueue;
/// use std::{cell::RefCell, rc::Rc};
///
/// let queue = TaskQueue::new();
/// let log = Rc::new(RefCell::new(Vec::new()));
/// for i in 0..3 {
///     let log = log.clone();
///     queue.enqueue(move || log.borrow_mut().push(i));
/// }
/// assert!(log.borrow().is_empty());
/// assert_eq!(queue.run_until_idle(), Ok(3));
/// assert_eq!(*log.borrow(), vec![0, 1, 2]);
/// ```
#[derive(Clone, Default)]
pub struct TaskQueue {
    inner: Rc<RefCell<Inner>>,
}

#[derive(Default)]
struct Inner {
    tasks: VecDeque<Task>,
    config: QueueConfig,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: QueueConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                tasks: VecDeque::new(),
                config,
            })),
        }
    }

    pub fn config(&self) -> QueueConfig {
        self.inner.borrow().config.clone()
    }

    pub fn enqueue(&self, task: impl FnOnce() + 'static) {
        self.inner.borrow_mut().tasks.push_back(Box::new(task));
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().tasks.is_empty()
    }

    /// Runs the oldest task, if any. Returns whether a task ran.
    pub fn run_next(&self) -> bool {
        // The borrow must end before the task runs: tasks enqueue more tasks.
        let task = self.inner.borrow_mut().tasks.pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs tasks until the queue is empty, including tasks enqueued while
    /// draining. Returns the number of tasks executed.
    pub fn run_until_idle(&self) -> Result<usize, Error> {
        let limit = self.inner.borrow().config.drain_limit;
        let mut executed = 0;
        loop {
            if let Some(limit) = limit {
                if executed >= limit && !self.is_empty() {
                    debug!(limit, remaining = self.len(), "task queue drain limit hit");
                    return Err(Error::DrainLimitExceeded { limit });
                }
            }
            if !self.run_next() {
                break;
            }
            executed += 1;
        }
        trace!(executed, "task queue idle");
        Ok(executed)
    }

    pub fn ptr_eq(&self, other: &TaskQueue) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.len())
            .finish()
    }
}
