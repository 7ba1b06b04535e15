//! Engine error types.

use std::fmt;

/// Errors surfaced by the engine.
///
/// Out-of-range offsets and lines are clamped rather than reported, since
/// they routinely arrive from stale asynchronous events. What remains is the
/// distinction between caller bugs (`Precondition`) and runtime conditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// An operation was invoked before its prerequisite setup; this signals
    /// a programming error in the caller, not a runtime condition.
    Precondition(&'static str),
    /// A background worker terminated before delivering its results.
    WorkerDisconnected,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Precondition(what) => {
                write!(f, "precondition not met: {what}")
            }
            EngineError::WorkerDisconnected => {
                write!(f, "background worker disconnected before completing")
            }
        }
    }
}

impl std::error::Error for EngineError {}
