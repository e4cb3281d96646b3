//! Scopewatch value layer.
//!
//! This layer defines what a scope can hold and how a watch decides that
//! something changed:
//! - `Value`: dynamically-typed tree with shared, mutable containers
//! - `Value::same` / `Value::deep_eq`: the shallow and deep watch rules
//! - `HostObject`: application instances backing scope data
//! - `KeyPath`: validated dotted key paths
//!
//! It knows nothing about scopes beyond their ids.
//!
//! # Example
//!
//! ```rust
//! use scopewatch_value::{key_path, Value};
//!
//! let user = Value::from(serde_json::json!({"name": "Alice"}));
//! assert_eq!(user.lookup(&key_path!("name")), Value::from("Alice"));
//!
//! let nan = Value::Number(f64::NAN);
//! assert!(Value::same(&nan, &Value::Number(f64::NAN)));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

mod host;
mod json;
mod key_path;
mod value;

pub use host::HostObject;
pub use key_path::{KeyPath, KeyPathError};
pub use value::{SharedArray, SharedMap, Value};

/// Unique identifier for a scope node.
///
/// Ids are assigned in creation order, so they also give a stable ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeId(u64);

impl ScopeId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
