//! The Value type - the dynamically-typed tree held in scope stores.
//!
//! Containers (`Array`, `Map`) are shared and interior-mutable: cloning a
//! `Value::Array` clones the handle, not the elements, so a container keeps
//! its identity while it is mutated in place.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use crate::host::HostObject;
use crate::key_path::KeyPath;
use crate::ScopeId;

/// Shared, mutable list storage.
pub type SharedArray = Rc<RefCell<Vec<Value>>>;

/// Shared, mutable map storage with deterministic key order.
pub type SharedMap = Rc<RefCell<BTreeMap<String, Value>>>;

/// A value that can be stored in a scope and observed by a watch.
///
/// # Design Notes
///
/// - `Undefined` is distinct from `Null`: it is what a lookup yields when no
///   scope in the inheritance chain holds the key.
/// - Numbers are `f64` so `NaN` is representable; the watch rule treats two
///   `NaN`s as equal (see [`Value::same`]).
/// - `Scope` holds only the id of another scope node. Resolving it is the
///   engine's job.
#[derive(Clone, Default)]
pub enum Value {
    /// No value anywhere in the lookup chain.
    #[default]
    Undefined,
    /// Explicit absence of a value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit floating point number.
    Number(f64),
    /// UTF-8 string.
    String(String),
    /// Ordered sequence of values, shared by reference.
    Array(SharedArray),
    /// Key-value map with string keys, shared by reference.
    Map(SharedMap),
    /// Opaque instance supplied by the host application.
    Host(Rc<dyn HostObject>),
    /// Reference to a scope node.
    Scope(ScopeId),
}

impl Value {
    /// Create an array value owning the given elements.
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    /// Create a map value owning the given entries.
    pub fn map(entries: BTreeMap<String, Value>) -> Self {
        Value::Map(Rc::new(RefCell::new(entries)))
    }

    /// Create an empty map.
    pub fn empty_map() -> Self {
        Value::map(BTreeMap::new())
    }

    /// Wrap a host object.
    pub fn host<H: HostObject + 'static>(object: H) -> Self {
        Value::Host(Rc::new(object))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value is a container (array, map or host object).
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Map(_) | Value::Host(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_scope(&self) -> Option<ScopeId> {
        match self {
            Value::Scope(id) => Some(*id),
            _ => None,
        }
    }

    /// Downcast a host value to its concrete type.
    pub fn downcast_host<T: 'static>(&self) -> Option<&T> {
        match self {
            Value::Host(h) => h.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Read a single key out of this value.
    ///
    /// Maps are indexed by key, arrays by numeric key, host objects through
    /// [`HostObject::property`]. Anything else yields `Undefined`.
    pub fn get_key(&self, key: &str) -> Value {
        match self {
            Value::Map(map) => map.borrow().get(key).cloned().unwrap_or_default(),
            Value::Array(arr) => key
                .parse::<usize>()
                .ok()
                .and_then(|i| arr.borrow().get(i).cloned())
                .unwrap_or_default(),
            Value::Host(host) => host.property(key).unwrap_or_default(),
            _ => Value::Undefined,
        }
    }

    /// Navigate a key path starting at this value.
    ///
    /// Returns `Undefined` as soon as a component cannot be resolved.
    pub fn lookup(&self, path: &KeyPath) -> Value {
        let mut current = self.clone();
        for component in path.iter() {
            current = current.get_key(component);
            if current.is_undefined() {
                break;
            }
        }
        current
    }

    /// Shallow watch equality.
    ///
    /// - Primitives compare by value, with `NaN` equal to `NaN`.
    /// - Arrays and maps compare by identity: a structurally identical but
    ///   distinct instance is a change.
    /// - Host objects compare by their coerced primitive when both coerce,
    ///   otherwise by identity.
    /// - Scope references compare by id.
    pub fn same(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Number(x), Value::Number(y)) => numbers_equal(*x, *y),
            (Value::String(x), Value::String(y)) => x == y,
            (Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y),
            (Value::Map(x), Value::Map(y)) => Rc::ptr_eq(x, y),
            (Value::Host(x), Value::Host(y)) => hosts_equal(x, y, Value::same),
            (Value::Scope(x), Value::Scope(y)) => x == y,
            _ => false,
        }
    }

    /// Deep watch equality: structural comparison with the same primitive
    /// rules as [`Value::same`].
    ///
    /// A pair of containers met again while it is still being compared is
    /// taken as equal, so self-referencing structures terminate.
    pub fn deep_eq(a: &Value, b: &Value) -> bool {
        Value::deep_eq_with(a, b, &mut BTreeSet::new())
    }

    fn deep_eq_with(a: &Value, b: &Value, seen: &mut BTreeSet<(usize, usize)>) -> bool {
        match (a, b) {
            (Value::Array(x), Value::Array(y)) => {
                if Rc::ptr_eq(x, y) || !seen.insert((address(x), address(y))) {
                    return true;
                }
                let (x, y) = (x.borrow(), y.borrow());
                x.len() == y.len()
                    && x.iter()
                        .zip(y.iter())
                        .all(|(p, q)| Value::deep_eq_with(p, q, seen))
            }
            (Value::Map(x), Value::Map(y)) => {
                if Rc::ptr_eq(x, y) || !seen.insert((address(x), address(y))) {
                    return true;
                }
                let (x, y) = (x.borrow(), y.borrow());
                x.len() == y.len()
                    && x.iter()
                        .zip(y.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && Value::deep_eq_with(va, vb, seen))
            }
            (Value::Host(x), Value::Host(y)) => hosts_equal(x, y, Value::deep_eq),
            _ => Value::same(a, b),
        }
    }

    /// Deep copy into freshly allocated containers.
    ///
    /// Host objects and scope references are copied by handle. A container
    /// reached twice is copied once, so shared and cyclic structure is
    /// reproduced in the copy.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        self.snapshot_with(&mut BTreeMap::new())
    }

    fn snapshot_with(&self, copies: &mut BTreeMap<usize, Value>) -> Value {
        match self {
            Value::Array(arr) => {
                if let Some(copy) = copies.get(&address(arr)) {
                    return copy.clone();
                }
                let fresh = SharedArray::default();
                copies.insert(address(arr), Value::Array(fresh.clone()));
                let items: Vec<Value> =
                    arr.borrow().iter().map(|v| v.snapshot_with(copies)).collect();
                *fresh.borrow_mut() = items;
                Value::Array(fresh)
            }
            Value::Map(map) => {
                if let Some(copy) = copies.get(&address(map)) {
                    return copy.clone();
                }
                let fresh = SharedMap::default();
                copies.insert(address(map), Value::Map(fresh.clone()));
                let entries: BTreeMap<String, Value> = map
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.snapshot_with(copies)))
                    .collect();
                *fresh.borrow_mut() = entries;
                Value::Map(fresh)
            }
            other => other.clone(),
        }
    }
}

fn address<T>(container: &Rc<T>) -> usize {
    Rc::as_ptr(container) as usize
}

fn numbers_equal(x: f64, y: f64) -> bool {
    x == y || (x.is_nan() && y.is_nan())
}

fn hosts_equal(
    x: &Rc<dyn HostObject>,
    y: &Rc<dyn HostObject>,
    compare: fn(&Value, &Value) -> bool,
) -> bool {
    if std::ptr::addr_eq(Rc::as_ptr(x), Rc::as_ptr(y)) {
        return true;
    }
    match (x.coerce(), y.coerce()) {
        (Some(p), Some(q)) => compare(&p, &q),
        _ => false,
    }
}

/// Structural equality for tests and diagnostics.
///
/// This is ordinary Rust equality (`NaN != NaN`, arrays compared by
/// content). Change detection uses [`Value::same`] and [`Value::deep_eq`].
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Number(x), Value::Number(y)) => x == y,
            (Value::String(x), Value::String(y)) => x == y,
            (Value::Array(x), Value::Array(y)) => *x.borrow() == *y.borrow(),
            (Value::Map(x), Value::Map(y)) => *x.borrow() == *y.borrow(),
            (Value::Host(x), Value::Host(y)) => std::ptr::addr_eq(Rc::as_ptr(x), Rc::as_ptr(y)),
            (Value::Scope(x), Value::Scope(y)) => x == y,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "Undefined"),
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Number(n) => write!(f, "Number({})", n),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Array(arr) => f.debug_tuple("Array").field(&*arr.borrow()).finish(),
            Value::Map(map) => f.debug_tuple("Map").field(&*map.borrow()).finish(),
            Value::Host(host) => write!(f, "Host({})", host.type_name()),
            Value::Scope(id) => write!(f, "Scope({})", id),
        }
    }
}

// Conversion from common types

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(f64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(v as f64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Number(v as f64)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<ScopeId> for Value {
    fn from(v: ScopeId) -> Self {
        Value::Scope(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
