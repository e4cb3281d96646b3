//! Error types for the scope engine.

use scopewatch_value::{KeyPathError, ScopeId};
use thiserror::Error;

use crate::watch::WatchId;

/// Error returned by a user callback: a watch listener, an event listener
/// or a post-convergence task.
pub type CallbackError = Box<dyn std::error::Error>;

/// What every user callback returns.
pub type CallbackResult = std::result::Result<(), CallbackError>;

/// Errors produced by the engine.
///
/// Only [`EngineError::ConvergenceOverrun`] aborts anything (the current
/// digest cycle). Callback failures are reported and the driving loop
/// carries on. Double deregistration, mutations of destroyed scopes and
/// writes to the reserved self key are silent no-ops, not errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A digest cycle ran out of passes without stabilizing.
    #[error("digest did not stabilize after {passes} passes (limit {limit})")]
    ConvergenceOverrun { passes: usize, limit: usize },

    /// A watch listener returned an error.
    #[error("watch listener {watch} on scope {scope} failed: {source}")]
    WatchListener {
        scope: ScopeId,
        watch: WatchId,
        #[source]
        source: CallbackError,
    },

    /// An event listener returned an error.
    #[error("listener for event '{event}' on scope {scope} failed: {source}")]
    EventListener {
        scope: ScopeId,
        event: String,
        #[source]
        source: CallbackError,
    },

    /// A post-convergence task returned an error.
    #[error("post-convergence task failed: {source}")]
    PostConvergenceTask {
        #[source]
        source: CallbackError,
    },

    /// The expression compiler rejected a watch expression.
    #[error("cannot compile '{expression}': {source}")]
    Compile {
        expression: String,
        #[source]
        source: KeyPathError,
    },

    /// An expression does not support assignment, or its target is not
    /// assignable.
    #[error("cannot assign through '{expression}'")]
    Assign { expression: String },

    /// The scope does not exist or has been destroyed.
    #[error("scope {0} does not exist or was destroyed")]
    ScopeUnavailable(ScopeId),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
