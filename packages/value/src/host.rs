//! Host objects: application-defined instances stored in a scope.

use std::any::Any;

use crate::Value;

/// An instance supplied by the host application.
///
/// Host objects let a scope be backed by an existing struct: properties are
/// read through [`HostObject::property`], and the concrete type stays
/// reachable with [`Value::downcast_host`] so its methods can be called with
/// the right receiver.
///
/// # Example
///
/// ```rust
/// use std::any::Any;
/// use scopewatch_value::{HostObject, Value};
///
/// #[derive(Debug)]
/// struct Timestamp(f64);
///
/// impl HostObject for Timestamp {
///     fn type_name(&self) -> &str {
///         "Timestamp"
///     }
///
///     fn coerce(&self) -> Option<Value> {
///         Some(Value::Number(self.0))
///     }
///
///     fn as_any(&self) -> &dyn Any {
///         self
///     }
/// }
///
/// let a = Value::host(Timestamp(10.0));
/// let b = Value::host(Timestamp(10.0));
/// assert!(Value::same(&a, &b));
/// ```
pub trait HostObject {
    /// Name used in debug output.
    fn type_name(&self) -> &str;

    /// Read a named property.
    fn property(&self, _key: &str) -> Option<Value> {
        None
    }

    /// Names of the readable properties.
    fn keys(&self) -> Vec<String> {
        Vec::new()
    }

    /// Primitive this instance stands for when compared by a watch.
    ///
    /// Instances without a coercion compare by identity.
    fn coerce(&self) -> Option<Value> {
        None
    }

    /// Whether this instance opts out of reactivity altogether.
    ///
    /// Types that are never reactive override this to return `true`
    /// unconditionally; types that decide per instance inspect their state.
    fn is_non_reactive(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;
}
