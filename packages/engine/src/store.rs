//! Value store operations: read-through, write-local.
//!
//! Reads walk the inheritance chain until some node holds the key. Writes
//! always land on the target node and never touch an ancestor's storage.
//! Every write that changes what a scope holds schedules its tree.

use scopewatch_value::{KeyPath, ScopeId, Value};

use crate::engine::{Engine, SELF_KEY};

impl Engine {
    /// Read a key, falling through inheritance parents.
    ///
    /// The reserved [`SELF_KEY`] yields the scope itself. Unknown keys and
    /// unknown scopes yield `Undefined`.
    pub fn get(&self, scope: ScopeId, key: &str) -> Value {
        if key == SELF_KEY {
            return if self.scopes.contains_key(&scope) {
                Value::Scope(scope)
            } else {
                Value::Undefined
            };
        }

        let mut current = Some(scope);
        while let Some(id) = current {
            let Some(node) = self.scopes.get(&id) else {
                break;
            };
            if let Some(value) = node.own(key) {
                return value;
            }
            current = node.parent_inheritance;
        }
        Value::Undefined
    }

    /// Read a key path.
    ///
    /// The first component resolves against the scope; later components
    /// navigate into the result. A `Value::Scope` met along the way is read
    /// through its own store (with fall-through), except that the self key
    /// only resolves in leading position: `this.this` is `Undefined`. Maps
    /// and host objects may still hold an ordinary `this` key.
    pub fn get_path(&self, scope: ScopeId, path: &KeyPath) -> Value {
        let mut current = self.get(scope, path.first());
        for component in path.rest() {
            if current.is_undefined() {
                break;
            }
            current = match &current {
                Value::Scope(_) if component == SELF_KEY => Value::Undefined,
                Value::Scope(id) => self.get(*id, component),
                other => other.get_key(component),
            };
        }
        current
    }

    /// Whether the scope itself (not an ancestor) holds the key.
    pub fn has_own(&self, scope: ScopeId, key: &str) -> bool {
        self.scopes
            .get(&scope)
            .is_some_and(|node| node.own(key).is_some())
    }

    /// Keys held locally by the scope, store entries first then host
    /// properties.
    pub fn keys(&self, scope: ScopeId) -> Vec<String> {
        let Some(node) = self.scopes.get(&scope) else {
            return Vec::new();
        };
        let mut keys: Vec<String> = node.store.keys().cloned().collect();
        if let Some(host) = &node.backing {
            keys.extend(host.keys().into_iter().filter(|k| !node.store.contains_key(k)));
        }
        keys
    }

    /// Write a key on the scope itself.
    ///
    /// Writing the reserved self key, or writing to a destroyed scope, does
    /// nothing. A scope reference into another tree records a foreign
    /// dependency. Unless the key is a non-scope key, a write that changes
    /// the stored value schedules a digest.
    pub fn set(&mut self, scope: ScopeId, key: &str, value: impl Into<Value>) {
        let value = value.into();
        if key == SELF_KEY {
            tracing::trace!(%scope, "ignored write to reserved key");
            return;
        }

        let Some(node) = self.live_mut(scope) else {
            return;
        };
        let changed = node
            .store
            .get(key)
            .map_or(true, |old| !Value::same(old, &value));
        let opaque = node.non_scope_keys.contains(key);
        let referenced = value.as_scope();
        node.store.insert(key.to_string(), value);

        if opaque {
            return;
        }
        if let Some(other) = referenced {
            self.register_foreign(scope, other);
        }
        if changed {
            self.schedule(scope);
        }
    }

    /// Mutate a value in place.
    ///
    /// A locally held value is mutated where it lives. An inherited value is
    /// mutated through its shared handle (so an inherited array is pushed to
    /// in the ancestor's storage); if `mutate` replaces it with something
    /// else, the replacement is written locally. The tree is scheduled
    /// either way, since in-place changes cannot be compared.
    pub fn update<F>(&mut self, scope: ScopeId, key: &str, mutate: F)
    where
        F: FnOnce(&mut Value),
    {
        if key == SELF_KEY {
            return;
        }
        let inherited = self.get(scope, key);
        let Some(node) = self.live_mut(scope) else {
            return;
        };
        let opaque = node.non_scope_keys.contains(key);

        if let Some(local) = node.store.get_mut(key) {
            mutate(local);
        } else {
            let mut value = inherited.clone();
            mutate(&mut value);
            if !Value::same(&inherited, &value) {
                node.store.insert(key.to_string(), value);
            }
        }

        if !opaque {
            self.schedule(scope);
        }
    }

    /// Delete a key from the scope itself, returning the removed value.
    ///
    /// Inherited values become visible again afterwards.
    pub fn remove(&mut self, scope: ScopeId, key: &str) -> Option<Value> {
        let node = self.live_mut(scope)?;
        let opaque = node.non_scope_keys.contains(key);
        let removed = node.store.remove(key)?;
        if !opaque {
            self.schedule(scope);
        }
        Some(removed)
    }
}
