//! Module containing the universal error type
use thiserror::Error;

/// Universal error type for this crate
#[derive(Error, Debug)]
pub enum Error {
    /// Rendering was cancelled before it finished
    ///
    /// Pixels written before the cancellation was observed may remain in the
    /// output buffers; callers should treat them as undefined.
    #[error("render was cancelled")]
    Cancelled,

    /// `render` was called with an empty evaluator pool
    #[error("the evaluator pool is empty")]
    EmptyPool,

    /// Failure reported by an [`Evaluator`](crate::eval::Evaluator)
    ///
    /// The renderer propagates these verbatim; it never masks or retries.
    #[error(transparent)]
    Eval(#[from] Box<dyn std::error::Error + Send + Sync>),
}
