use thiserror::Error;

/// Errors produced by the promise machinery itself.
///
/// `ChainingCycle` never escapes as an `Err`: it is delivered as the rejection
/// reason of the promise that tried to resolve itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Chaining cycle detected for promise")]
    ChainingCycle,

    #[error("Argument is not iterable")]
    NotIterable,

    #[error("Task queue drain limit of {limit} tasks exceeded")]
    DrainLimitExceeded { limit: usize },
}
