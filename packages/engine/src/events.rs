//! Event router: `emit` walks up the structural tree, `broadcast` walks
//! down it.
//!
//! Dispatch is synchronous and independent of the digest. Listeners are
//! looked up by id right before each call, so a listener removed mid-dispatch
//! never runs and removing one never makes another one be skipped.

use std::collections::BTreeMap;
use std::rc::Rc;

use scopewatch_value::{ScopeId, Value};

use crate::engine::Engine;
use crate::error::{CallbackResult, EngineError};

/// Unique identifier for an event listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Event listener callback.
pub type EventHandler = Rc<dyn Fn(&mut Engine, &mut Event, &[Value]) -> CallbackResult>;

/// A registered event listener.
#[derive(Clone)]
pub struct ListenerEntry {
    id: ListenerId,
    handler: EventHandler,
}

impl ListenerEntry {
    pub fn id(&self) -> ListenerId {
        self.id
    }
}

/// Per-scope listeners by event name, each list in registration order.
pub type ListenerMap = BTreeMap<String, Vec<ListenerEntry>>;

/// Deregistration handle for an event listener.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
    scope: ScopeId,
    name: String,
    id: Option<ListenerId>,
}

impl ListenerHandle {
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The event object passed to every listener of one emit or broadcast.
#[derive(Debug, Clone)]
pub struct Event {
    name: String,
    target_scope: ScopeId,
    current_scope: Option<ScopeId>,
    default_prevented: bool,
    propagation_stopped: bool,
    stoppable: bool,
}

impl Event {
    fn new(name: &str, target_scope: ScopeId, stoppable: bool) -> Self {
        Self {
            name: name.to_string(),
            target_scope,
            current_scope: None,
            default_prevented: false,
            propagation_stopped: false,
            stoppable,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scope the emit or broadcast started on.
    pub fn target_scope(&self) -> ScopeId {
        self.target_scope
    }

    /// Scope whose listeners are running; `None` once propagation is over.
    pub fn current_scope(&self) -> Option<ScopeId> {
        self.current_scope
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    /// Stop an emitted event after the current scope's listeners.
    ///
    /// Broadcasts cannot be stopped; this does nothing on them.
    pub fn stop_propagation(&mut self) {
        if self.stoppable {
            self.propagation_stopped = true;
        }
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }
}

impl Engine {
    /// Listen for `name` on a scope.
    pub fn on<F>(&mut self, scope: ScopeId, name: &str, handler: F) -> ListenerHandle
    where
        F: Fn(&mut Engine, &mut Event, &[Value]) -> CallbackResult + 'static,
    {
        let mut handle = ListenerHandle {
            scope,
            name: name.to_string(),
            id: None,
        };
        if !self.contains(scope) {
            return handle;
        }

        let id = ListenerId(self.allocate_listener_id());
        let entry = ListenerEntry {
            id,
            handler: Rc::new(handler),
        };
        if let Some(node) = self.live_mut(scope) {
            node.listeners
                .get_or_insert_with(ListenerMap::new)
                .entry(name.to_string())
                .or_default()
                .push(entry);
            handle.id = Some(id);
        }
        handle
    }

    /// Remove a listener. Returns whether anything was removed.
    pub fn off(&mut self, handle: &ListenerHandle) -> bool {
        let Some(id) = handle.id else {
            return false;
        };
        let Some(listeners) = self
            .live_mut(handle.scope)
            .and_then(|node| node.listeners.as_mut())
        else {
            return false;
        };
        let Some(entries) = listeners.get_mut(&handle.name) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(&handle.name);
        }
        removed
    }

    /// Number of listeners for `name` on the scope itself.
    pub fn listener_count(&self, scope: ScopeId, name: &str) -> usize {
        self.listeners(scope)
            .and_then(|listeners| listeners.get(name))
            .map_or(0, Vec::len)
    }

    /// Dispatch `name` on the scope, then on each structural ancestor up to
    /// the root, until a listener stops propagation.
    pub fn emit(&mut self, scope: ScopeId, name: &str, args: &[Value]) -> Event {
        let mut event = Event::new(name, scope, true);
        let mut current = Some(scope);
        while let Some(id) = current {
            if !self.contains(id) {
                break;
            }
            self.dispatch(id, &mut event, args);
            if event.propagation_stopped {
                break;
            }
            current = self.parent(id);
        }
        event.current_scope = None;
        event
    }

    /// Dispatch `name` on the scope and then on every structural descendant,
    /// pre-order.
    pub fn broadcast(&mut self, scope: ScopeId, name: &str, args: &[Value]) -> Event {
        let mut event = Event::new(name, scope, false);
        let mut stack = vec![scope];
        while let Some(id) = stack.pop() {
            if !self.contains(id) {
                continue;
            }
            self.dispatch(id, &mut event, args);
            stack.extend(self.children(id).iter().rev().copied());
        }
        event.current_scope = None;
        event
    }

    /// Run the listeners for the event's name registered on one scope.
    fn dispatch(&mut self, scope: ScopeId, event: &mut Event, args: &[Value]) {
        event.current_scope = Some(scope);
        let ids: Vec<ListenerId> = self
            .listeners(scope)
            .and_then(|listeners| listeners.get(&event.name))
            .map(|entries| entries.iter().map(|entry| entry.id).collect())
            .unwrap_or_default();

        for id in ids {
            let Some(handler) = self.live_handler(scope, &event.name, id) else {
                continue;
            };
            if let Err(source) = handler(self, event, args) {
                self.report(
                    EngineError::EventListener {
                        scope,
                        event: event.name.clone(),
                        source,
                    },
                    Some(scope),
                );
            }
        }
    }

    fn live_handler(&self, scope: ScopeId, name: &str, id: ListenerId) -> Option<EventHandler> {
        self.live(scope)?
            .listeners
            .as_ref()?
            .get(name)?
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| Rc::clone(&entry.handler))
    }
}
