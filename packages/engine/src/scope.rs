//! Scope nodes: the per-scope state held in the engine's arena.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use scopewatch_value::{HostObject, ScopeId, Value};

use crate::events::ListenerMap;
use crate::watch::WatchRecord;

/// How a scope was created, which fixes how its two parent links relate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// No parents at all.
    Root,
    /// Structural and inheritance parent are the same node.
    Child,
    /// Structural parent only; reads never fall through to an ancestor.
    Isolated,
    /// Inheritance parent differs from the structural parent.
    Transcluded,
}

/// A node in the scope tree.
///
/// Parents are referenced by id, never owned; a node owns its store, its
/// watch records and its listeners. Children are listed in insertion order.
pub(crate) struct ScopeNode {
    pub(crate) id: ScopeId,
    pub(crate) kind: ScopeKind,

    /// Locally written values.
    pub(crate) store: BTreeMap<String, Value>,

    /// Host instance backing this scope, consulted after `store`.
    pub(crate) backing: Option<Rc<dyn HostObject>>,

    /// Keys stored opaquely, shared across a tree.
    pub(crate) non_scope_keys: Rc<BTreeSet<String>>,

    /// Node whose child list holds this node. Drives events, digest descent
    /// and watcher count aggregation.
    pub(crate) parent_structural: Option<ScopeId>,

    /// Node that reads fall through to.
    pub(crate) parent_inheritance: Option<ScopeId>,

    pub(crate) children: Vec<ScopeId>,

    /// Active watches, ascending by watch id (registration order).
    pub(crate) watches: Vec<Rc<WatchRecord>>,

    /// Own watches plus every descendant's.
    pub(crate) watcher_count: usize,

    /// Created on first local registration.
    pub(crate) listeners: Option<ListenerMap>,

    /// Scopes of other trees that values in this store refer to.
    pub(crate) foreign: BTreeSet<ScopeId>,

    /// Reverse of `foreign`: scopes whose stores refer to this one.
    pub(crate) dependents: BTreeSet<ScopeId>,

    /// Scopes whose reads fall through to this one. A destroyed node stays
    /// in the arena until this is empty.
    pub(crate) heirs: BTreeSet<ScopeId>,

    pub(crate) destroyed: bool,
}

impl ScopeNode {
    pub(crate) fn new(id: ScopeId, kind: ScopeKind, non_scope_keys: Rc<BTreeSet<String>>) -> Self {
        Self {
            id,
            kind,
            store: BTreeMap::new(),
            backing: None,
            non_scope_keys,
            parent_structural: None,
            parent_inheritance: None,
            children: Vec::new(),
            watches: Vec::new(),
            watcher_count: 0,
            listeners: None,
            foreign: BTreeSet::new(),
            dependents: BTreeSet::new(),
            heirs: BTreeSet::new(),
            destroyed: false,
        }
    }

    /// Seed the store from initial data.
    ///
    /// Map entries are copied in (sharing any nested containers); a host
    /// object becomes the backing instance. Other values carry no keys and
    /// are ignored.
    pub(crate) fn seed(&mut self, data: Value) {
        match data {
            Value::Map(entries) => {
                self.store.extend(
                    entries
                        .borrow()
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone())),
                );
            }
            Value::Host(host) => self.backing = Some(host),
            _ => {}
        }
    }

    /// Read a key from this node alone, without falling through.
    pub(crate) fn own(&self, key: &str) -> Option<Value> {
        self.store
            .get(key)
            .cloned()
            .or_else(|| self.backing.as_ref().and_then(|host| host.property(key)))
    }

    pub(crate) fn is_live(&self) -> bool {
        !self.destroyed
    }
}
