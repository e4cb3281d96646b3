//! Error reporting: where engine errors go.

use scopewatch_value::ScopeId;

use crate::error::EngineError;

/// Receives every error the engine catches.
///
/// The engine itself never logs or panics on these; it only hands them to
/// the installed reporter. Closures taking `(&EngineError, Option<ScopeId>)`
/// are reporters.
pub trait ErrorReporter {
    /// Report an error, with the scope it happened on when there is one.
    fn report(&self, error: &EngineError, scope: Option<ScopeId>);
}

impl<F> ErrorReporter for F
where
    F: Fn(&EngineError, Option<ScopeId>),
{
    fn report(&self, error: &EngineError, scope: Option<ScopeId>) {
        self(error, scope)
    }
}

/// Reporter that forwards errors to `tracing` at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &EngineError, scope: Option<ScopeId>) {
        match scope {
            Some(scope) => tracing::error!(%scope, %error, "scope engine error"),
            None => tracing::error!(%error, "scope engine error"),
        }
    }
}
