//! Watch registry: registration, deregistration and watcher counts.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use scopewatch_value::{KeyPath, ScopeId, Value};

use crate::engine::Engine;
use crate::error::{CallbackResult, EngineError, Result};
use crate::expression::{CompiledExpression, KeyPathExpression, ScopeView};

/// Unique identifier for a watch, increasing in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(u64);

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw getter function over a scope view.
pub type Getter = Rc<dyn Fn(&ScopeView<'_>) -> Value>;

/// Listener called when a watched value changes.
pub type WatchListener = Rc<dyn Fn(&mut Engine, &WatchEvent<'_>) -> CallbackResult>;

/// What a watch observes.
#[derive(Clone)]
pub enum WatchSource {
    /// A compiled expression, with its literal/constant metadata.
    Expression(Rc<dyn CompiledExpression>),
    /// A plain function, always treated as non-literal and non-constant.
    Getter(Getter),
}

impl WatchSource {
    pub fn getter<F>(getter: F) -> Self
    where
        F: Fn(&ScopeView<'_>) -> Value + 'static,
    {
        WatchSource::Getter(Rc::new(getter))
    }

    pub fn expression<E: CompiledExpression + 'static>(expression: E) -> Self {
        WatchSource::Expression(Rc::new(expression))
    }

    pub(crate) fn evaluate(&self, view: &ScopeView<'_>) -> Value {
        match self {
            WatchSource::Expression(expression) => expression.evaluate(view),
            WatchSource::Getter(getter) => getter(view),
        }
    }

    fn is_constant(&self) -> bool {
        matches!(self, WatchSource::Expression(e) if e.is_constant())
    }

    /// Direct inputs of a literal expression; `None` for everything else.
    pub(crate) fn literal_inputs(&self) -> Option<Vec<Rc<dyn CompiledExpression>>> {
        match self {
            WatchSource::Expression(e) if e.is_literal() => Some(e.direct_inputs()),
            _ => None,
        }
    }
}

impl From<KeyPath> for WatchSource {
    fn from(path: KeyPath) -> Self {
        WatchSource::expression(KeyPathExpression::new(path))
    }
}

impl From<Rc<dyn CompiledExpression>> for WatchSource {
    fn from(expression: Rc<dyn CompiledExpression>) -> Self {
        WatchSource::Expression(expression)
    }
}

/// A change delivered to a watch listener.
#[derive(Debug)]
pub struct WatchEvent<'a> {
    /// Scope the watch is registered on.
    pub scope: ScopeId,
    pub new_value: &'a Value,
    /// Previous value; the same value as `new_value` on the initial call.
    pub old_value: &'a Value,
    /// True for the first delivery after registration.
    pub initial: bool,
}

/// Deregistration handle for a watch.
///
/// Handles of constant watches (and of watches refused because their scope
/// was gone) are inert. Deregistering twice is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchHandle {
    scope: ScopeId,
    id: Option<WatchId>,
}

impl WatchHandle {
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn id(&self) -> Option<WatchId> {
        self.id
    }

    pub fn is_inert(&self) -> bool {
        self.id.is_none()
    }
}

/// Registration options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Compare by structure against a snapshot instead of by identity.
    pub deep: bool,
}

/// A registered watch.
pub(crate) struct WatchRecord {
    pub(crate) id: WatchId,
    pub(crate) source: WatchSource,
    pub(crate) listener: Option<WatchListener>,
    pub(crate) deep: bool,
    /// `None` until the first evaluation.
    pub(crate) last: RefCell<Option<Value>>,
    /// Previous results of a literal's direct inputs.
    pub(crate) inputs: RefCell<Option<Vec<Value>>>,
}

impl WatchRecord {
    pub(crate) fn equal(&self, a: &Value, b: &Value) -> bool {
        if self.deep {
            Value::deep_eq(a, b)
        } else {
            Value::same(a, b)
        }
    }

    pub(crate) fn keep(&self, value: &Value) -> Value {
        if self.deep {
            value.snapshot()
        } else {
            value.clone()
        }
    }
}

impl Engine {
    /// Register a watch with a listener.
    pub fn watch<S, L>(&mut self, scope: ScopeId, source: S, listener: L) -> WatchHandle
    where
        S: Into<WatchSource>,
        L: Fn(&mut Engine, &WatchEvent<'_>) -> CallbackResult + 'static,
    {
        let listener: WatchListener = Rc::new(listener);
        self.register_watch(scope, source, Some(listener), WatchOptions::default())
    }

    /// Register a deep watch with a listener.
    pub fn watch_deep<S, L>(&mut self, scope: ScopeId, source: S, listener: L) -> WatchHandle
    where
        S: Into<WatchSource>,
        L: Fn(&mut Engine, &WatchEvent<'_>) -> CallbackResult + 'static,
    {
        let listener: WatchListener = Rc::new(listener);
        self.register_watch(scope, source, Some(listener), WatchOptions { deep: true })
    }

    /// Compile `text` with the installed compiler and register it.
    pub fn watch_expression(
        &mut self,
        scope: ScopeId,
        text: &str,
        listener: Option<WatchListener>,
        options: WatchOptions,
    ) -> Result<WatchHandle> {
        let expression = self.compiler.compile(text)?;
        Ok(self.register_watch(scope, expression, listener, options))
    }

    /// Register a watch.
    ///
    /// A constant source is evaluated once, its listener called right away,
    /// and an inert handle returned. Anything else is appended to the
    /// scope's watches, counted on the scope and every structural ancestor,
    /// and scheduled so the next tick delivers its initial value. A watch
    /// registered during a digest joins the running cycle.
    pub fn register_watch<S: Into<WatchSource>>(
        &mut self,
        scope: ScopeId,
        source: S,
        listener: Option<WatchListener>,
        options: WatchOptions,
    ) -> WatchHandle {
        let source = source.into();
        let inert = WatchHandle { scope, id: None };
        if !self.contains(scope) {
            return inert;
        }

        if source.is_constant() {
            let value = source.evaluate(&ScopeView::new(self, scope));
            if let Some(listener) = listener {
                let event = WatchEvent {
                    scope,
                    new_value: &value,
                    old_value: &value,
                    initial: true,
                };
                if let Err(source) = listener(self, &event) {
                    self.report(
                        EngineError::WatchListener {
                            scope,
                            watch: WatchId(0),
                            source,
                        },
                        Some(scope),
                    );
                }
            }
            return inert;
        }

        let id = WatchId(self.allocate_watch_id());
        let record = Rc::new(WatchRecord {
            id,
            source,
            listener,
            deep: options.deep,
            last: RefCell::new(None),
            inputs: RefCell::new(None),
        });
        if let Some(node) = self.live_mut(scope) {
            node.watches.push(record);
        }
        self.adjust_watcher_count(scope, 1);

        if self.digesting {
            self.registered_mid_pass = true;
        }
        self.schedule(scope);
        WatchHandle {
            scope,
            id: Some(id),
        }
    }

    /// Remove a watch. Returns whether anything was removed; a second call
    /// with the same handle removes nothing.
    pub fn unwatch(&mut self, handle: WatchHandle) -> bool {
        let Some(id) = handle.id else {
            return false;
        };
        let Some(node) = self.live_mut(handle.scope) else {
            return false;
        };
        let Ok(index) = node.watches.binary_search_by_key(&id, |record| record.id) else {
            return false;
        };
        node.watches.remove(index);
        self.adjust_watcher_count(handle.scope, -1);
        true
    }

    /// Apply a count delta to `scope` and every structural ancestor.
    pub(crate) fn adjust_watcher_count(&mut self, scope: ScopeId, delta: isize) {
        let mut current = Some(scope);
        while let Some(id) = current {
            let Some(node) = self.scopes.get_mut(&id) else {
                break;
            };
            node.watcher_count = node.watcher_count.saturating_add_signed(delta);
            current = node.parent_structural;
        }
    }

    /// Number of watches registered directly on the scope.
    pub fn own_watch_count(&self, scope: ScopeId) -> usize {
        self.scopes.get(&scope).map_or(0, |node| node.watches.len())
    }
}
