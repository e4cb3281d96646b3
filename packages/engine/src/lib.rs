//! Scopewatch engine: reactive scope trees and their digest loop.
//!
//! This layer builds on the value layer:
//! - `Engine`: arena of scope trees with read-through, write-local stores
//! - Watch registry: getters or compiled expressions plus change listeners
//! - Digest scheduler: coalesced, repeated passes until nothing changes
//! - Event router: `emit` walks up, `broadcast` walks down
//! - Post-convergence queue: FIFO tasks run after a digest settles
//! - Scope lifecycle: roots, children, isolated and transcluded scopes
//!
//! Mutations never run listeners directly. They schedule the affected tree,
//! and the host calls [`Engine::tick`] once per scheduling tick.
//!
//! # Example
//!
//! ```rust
//! use scopewatch_engine::{Engine, TickOutcome};
//! use scopewatch_value::key_path;
//!
//! let mut engine = Engine::default();
//! let root = engine.create_root();
//! let child = engine.new_child(root).unwrap();
//!
//! engine.watch(child, key_path!("count"), |engine, change| {
//!     let doubled = change.new_value.as_number().unwrap_or(0.0) * 2.0;
//!     engine.set(change.scope, "doubled", doubled);
//!     Ok(())
//! });
//!
//! engine.set(root, "count", 21);
//! assert!(matches!(engine.tick(), TickOutcome::Settled { .. }));
//! assert_eq!(engine.get(child, "doubled").as_number(), Some(42.0));
//! ```

mod config;
mod digest;
mod engine;
mod error;
mod events;
mod expression;
mod lifecycle;
mod post_queue;
mod report;
mod scope;
mod store;
mod watch;

pub use config::{EngineConfig, DEFAULT_MAX_DIGEST_PASSES};
pub use digest::TickOutcome;
pub use engine::{Engine, SELF_KEY};
pub use error::{CallbackError, CallbackResult, EngineError, Result};
pub use events::{Event, EventHandler, ListenerEntry, ListenerHandle, ListenerId, ListenerMap};
pub use expression::{
    ArrayLiteralExpression, CompiledExpression, ConstantExpression, ExpressionCompiler,
    KeyPathCompiler, KeyPathExpression, ScopeView,
};
pub use lifecycle::{RootOptions, RootScope};
pub use post_queue::PostTask;
pub use report::{ErrorReporter, TracingReporter};
pub use scope::ScopeKind;
pub use watch::{
    Getter, WatchEvent, WatchHandle, WatchId, WatchListener, WatchOptions, WatchSource,
};

// Re-export value types for convenience
pub use scopewatch_value::{key_path, HostObject, KeyPath, ScopeId, Value};
