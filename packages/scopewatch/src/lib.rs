//! Scopewatch: hierarchical reactive scopes.
//!
//! Scopes form trees. Reads fall through to ancestors, writes stay local,
//! and watches re-run in repeated digest passes until nothing changes.
//! Events travel up (`emit`) or down (`broadcast`) a tree, and tasks queued
//! for after convergence run once the model is stable.
//!
//! This crate re-exports both layers:
//! - [`value`]: the value tree, watch equality rules and key paths
//! - [`engine`]: the scope engine itself
//!
//! # Example
//!
//! ```rust
//! use scopewatch::{key_path, Engine, TickOutcome, Value};
//!
//! let mut engine = Engine::default();
//! let root = engine.create_root();
//! let child = engine.new_child(root).unwrap();
//!
//! engine.on(root, "saved", |engine, event, args| {
//!     engine.set(event.target_scope(), "status", args[0].clone());
//!     Ok(())
//! });
//! engine.emit(child, "saved", &[Value::from("done")]);
//! assert_eq!(engine.get(child, "status"), Value::from("done"));
//!
//! engine.watch(child, key_path!("status"), |engine, _| {
//!     engine.enqueue_post_convergence(|_| Ok(()));
//!     Ok(())
//! });
//! assert!(matches!(engine.tick(), TickOutcome::Settled { .. }));
//! assert_eq!(engine.post_convergence_len(), 0);
//! ```

pub use scopewatch_engine as engine;
pub use scopewatch_value as value;

pub use scopewatch_engine::{
    CallbackError, CallbackResult, CompiledExpression, Engine, EngineConfig, EngineError,
    ErrorReporter, Event, ExpressionCompiler, ListenerHandle, RootOptions, RootScope, ScopeKind,
    ScopeView, TickOutcome, TracingReporter, WatchEvent, WatchHandle, WatchOptions, WatchSource,
    SELF_KEY,
};
pub use scopewatch_value::{key_path, HostObject, KeyPath, ScopeId, Value};
