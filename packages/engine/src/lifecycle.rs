//! Scope lifecycle: creation, cross-tree links, destruction, lookup.

use std::collections::{BTreeSet, VecDeque};
use std::rc::Rc;

use scopewatch_value::{ScopeId, Value};

use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::scope::{ScopeKind, ScopeNode};

/// Options for creating a root scope.
#[derive(Debug, Clone, Default)]
pub struct RootOptions {
    /// Initial contents: a map's entries are copied in, a host object backs
    /// the scope.
    pub data: Option<Value>,

    /// Overrides the engine's configured non-scope keys for this tree.
    pub non_scope_keys: Option<BTreeSet<String>>,
}

/// Result of creating a root from data.
#[derive(Debug, Clone)]
pub enum RootScope {
    /// A reactive root scope.
    Reactive(ScopeId),
    /// The data opted out of reactivity and is handed back untouched: no id,
    /// no watches, no digest participation.
    Passthrough(Value),
}

impl RootScope {
    pub fn scope(&self) -> Option<ScopeId> {
        match self {
            RootScope::Reactive(id) => Some(*id),
            RootScope::Passthrough(_) => None,
        }
    }
}

impl Engine {
    /// Create an empty root scope.
    pub fn create_root(&mut self) -> ScopeId {
        let keys = Rc::new(self.config.non_scope_keys.clone());
        self.insert_root(None, keys)
    }

    /// Create a root scope from options.
    ///
    /// A host object marked non-reactive is returned as
    /// [`RootScope::Passthrough`] instead of becoming a scope.
    pub fn create_root_with(&mut self, options: RootOptions) -> RootScope {
        if let Some(Value::Host(host)) = &options.data {
            if host.is_non_reactive() {
                return RootScope::Passthrough(Value::Host(Rc::clone(host)));
            }
        }
        let keys = Rc::new(
            options
                .non_scope_keys
                .unwrap_or_else(|| self.config.non_scope_keys.clone()),
        );
        RootScope::Reactive(self.insert_root(options.data, keys))
    }

    fn insert_root(&mut self, data: Option<Value>, keys: Rc<BTreeSet<String>>) -> ScopeId {
        let id = self.allocate_scope_id();
        let mut node = ScopeNode::new(id, ScopeKind::Root, keys);
        if let Some(data) = data {
            node.seed(data);
        }
        self.scopes.insert(id, node);
        tracing::debug!(scope = %id, "root scope created");
        id
    }

    /// Create a child that inherits values from `parent` and sits under it.
    pub fn new_child(&mut self, parent: ScopeId) -> Result<ScopeId> {
        self.attach(ScopeKind::Child, parent, Some(parent), None)
    }

    /// Create a child seeded with initial data.
    pub fn new_child_with(&mut self, parent: ScopeId, data: Value) -> Result<ScopeId> {
        self.attach(ScopeKind::Child, parent, Some(parent), Some(data))
    }

    /// Create a child that sits under `parent` for events and digests but
    /// inherits no values.
    pub fn new_isolated(&mut self, parent: ScopeId) -> Result<ScopeId> {
        self.attach(ScopeKind::Isolated, parent, None, None)
    }

    /// Create a scope that inherits values from `data_parent` but sits under
    /// `structural` (by default the root of `data_parent`'s tree).
    pub fn reparent(
        &mut self,
        data_parent: ScopeId,
        structural: Option<ScopeId>,
    ) -> Result<ScopeId> {
        if !self.contains(data_parent) {
            return Err(EngineError::ScopeUnavailable(data_parent));
        }
        let structural = match structural {
            Some(node) => node,
            None => self
                .root_of(data_parent)
                .ok_or(EngineError::ScopeUnavailable(data_parent))?,
        };
        self.attach(ScopeKind::Transcluded, structural, Some(data_parent), None)
    }

    fn attach(
        &mut self,
        kind: ScopeKind,
        structural: ScopeId,
        inheritance: Option<ScopeId>,
        data: Option<Value>,
    ) -> Result<ScopeId> {
        let keys = self
            .live(structural)
            .map(|node| Rc::clone(&node.non_scope_keys))
            .ok_or(EngineError::ScopeUnavailable(structural))?;

        let id = self.allocate_scope_id();
        let mut node = ScopeNode::new(id, kind, keys);
        node.parent_structural = Some(structural);
        node.parent_inheritance = inheritance;
        if let Some(data) = data {
            node.seed(data);
        }
        self.scopes.insert(id, node);
        if let Some(parent) = self.live_mut(structural) {
            parent.children.push(id);
        }
        if let Some(source) = inheritance.and_then(|source| self.scopes.get_mut(&source)) {
            source.heirs.insert(id);
        }
        tracing::debug!(scope = %id, parent = %structural, ?kind, "scope created");
        Ok(id)
    }

    /// Record that `owner`'s store refers to `other`, so a digest of either
    /// tree includes the other. Links within one tree are not recorded.
    ///
    /// Returns whether a new link was added.
    pub fn register_foreign(&mut self, owner: ScopeId, other: ScopeId) -> bool {
        if !self.contains(other) || self.root_of(owner) == self.root_of(other) {
            return false;
        }
        let added = match self.live_mut(owner) {
            Some(node) => node.foreign.insert(other),
            None => false,
        };
        if let Some(target) = self.live_mut(other) {
            target.dependents.insert(owner);
        }
        added
    }

    /// Destroy a scope.
    ///
    /// The scope leaves its parent's child list and its watcher count is
    /// subtracted from every ancestor. Its watches, listeners and foreign
    /// links are dropped. Children are not destroyed: they become roots of
    /// their own trees and can be destroyed separately.
    ///
    /// While some scope still reads through it, the node is kept as a
    /// read-only tombstone so inherited values stay visible; every mutating
    /// operation on it is a no-op. Once nothing reads through it, the node
    /// is dropped from the engine.
    pub fn destroy(&mut self, scope: ScopeId) {
        let Some(node) = self.live_mut(scope) else {
            return;
        };
        node.destroyed = true;
        node.watches.clear();
        node.listeners = None;
        let removed = std::mem::take(&mut node.watcher_count);
        let parent = node.parent_structural.take();
        let orphans = std::mem::take(&mut node.children);
        let foreign = std::mem::take(&mut node.foreign);
        let dependents = std::mem::take(&mut node.dependents);
        let inherited_from = !node.heirs.is_empty();

        if let Some(parent) = parent {
            if let Some(parent_node) = self.scopes.get_mut(&parent) {
                parent_node.children.retain(|child| *child != scope);
            }
            self.adjust_watcher_count(parent, -(removed as isize));
        }
        for orphan in orphans {
            if let Some(child) = self.scopes.get_mut(&orphan) {
                child.parent_structural = None;
            }
        }
        for target in foreign {
            if let Some(node) = self.scopes.get_mut(&target) {
                node.dependents.remove(&scope);
            }
        }
        for source in dependents {
            if let Some(node) = self.scopes.get_mut(&source) {
                node.foreign.remove(&scope);
            }
        }
        self.pending.remove(&scope);

        if inherited_from {
            tracing::debug!(%scope, "scope destroyed, kept for inheriting scopes");
        } else {
            self.release(scope);
            tracing::debug!(%scope, "scope destroyed");
        }
    }

    /// Drop a destroyed node nothing reads through, then any tombstones up
    /// its inheritance chain that this leaves unread.
    fn release(&mut self, scope: ScopeId) {
        let mut next = Some(scope);
        while let Some(id) = next.take() {
            let Some(node) = self.scopes.remove(&id) else {
                break;
            };
            tracing::trace!(scope = %id, "scope released");
            let Some(source) = node
                .parent_inheritance
                .and_then(|source| self.scopes.get_mut(&source))
            else {
                continue;
            };
            source.heirs.remove(&id);
            if source.destroyed && source.heirs.is_empty() {
                next = Some(source.id);
            }
        }
    }

    /// Find a live scope by id within the structural subtree at `scope`
    /// (inclusive), breadth first.
    pub fn get_by_id(&self, scope: ScopeId, target: ScopeId) -> Option<ScopeId> {
        let mut queue = VecDeque::from([scope]);
        while let Some(id) = queue.pop_front() {
            let Some(node) = self.live(id) else {
                continue;
            };
            if id == target {
                return Some(id);
            }
            queue.extend(node.children.iter().copied());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::ScopeView;
    use crate::watch::WatchSource;
    use collection_literals::btree;
    use scopewatch_value::{key_path, HostObject};
    use std::any::Any;

    #[derive(Debug)]
    struct Frozen;

    impl HostObject for Frozen {
        fn type_name(&self) -> &str {
            "Frozen"
        }

        fn is_non_reactive(&self) -> bool {
            true
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Debug)]
    struct Profile {
        name: String,
    }

    impl Profile {
        fn greeting(&self) -> String {
            format!("hello {}", self.name)
        }
    }

    impl HostObject for Profile {
        fn type_name(&self) -> &str {
            "Profile"
        }

        fn property(&self, key: &str) -> Option<Value> {
            (key == "name").then(|| Value::from(self.name.as_str()))
        }

        fn keys(&self) -> Vec<String> {
            vec!["name".into()]
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn noop_watch(engine: &mut Engine, scope: ScopeId) {
        engine.watch(scope, key_path!("a"), |_, _| Ok(()));
    }

    #[test]
    fn ids_increase_and_children_keep_order() {
        let mut engine = Engine::default();
        let root = engine.create_root();
        let a = engine.new_child(root).unwrap();
        let b = engine.new_isolated(root).unwrap();
        let c = engine.new_child(root).unwrap();

        assert!(root < a && a < b && b < c);
        assert_eq!(engine.children(root), &[a, b, c]);
        assert_eq!(engine.kind(b), Some(ScopeKind::Isolated));
    }

    #[test]
    fn isolated_scope_breaks_read_through() {
        let mut engine = Engine::default();
        let root = engine.create_root();
        engine.set(root, "shared", 1);
        let isolated = engine.new_isolated(root).unwrap();

        assert!(engine.get(isolated, "shared").is_undefined());
        assert_eq!(engine.parent(isolated), Some(root));
        assert_eq!(engine.inheritance_parent(isolated), None);
    }

    #[test]
    fn reparented_scope_reads_from_data_parent() {
        let mut engine = Engine::default();
        let root = engine.create_root();
        let component = engine.new_isolated(root).unwrap();
        engine.set(component, "title", "inner");
        let host = engine.new_child(root).unwrap();

        let content = engine.reparent(component, Some(host)).unwrap();
        assert_eq!(engine.get(content, "title"), Value::from("inner"));
        assert_eq!(engine.parent(content), Some(host));
        assert_eq!(engine.children(host), &[content]);

        let defaulted = engine.reparent(component, None).unwrap();
        assert_eq!(engine.parent(defaulted), Some(root));
        assert_eq!(engine.kind(defaulted), Some(ScopeKind::Transcluded));
    }

    #[test]
    fn destroy_subtracts_counts_and_unlinks() {
        let mut engine = Engine::default();
        let root = engine.create_root();
        let child = engine.new_child(root).unwrap();
        let grandchild = engine.new_child(child).unwrap();
        noop_watch(&mut engine, root);
        noop_watch(&mut engine, grandchild);
        assert_eq!(engine.watcher_count(root), 2);

        engine.destroy(grandchild);
        assert_eq!(engine.watcher_count(child), 0);
        assert_eq!(engine.watcher_count(root), 1);
        assert!(engine.children(child).is_empty());
        assert!(engine.is_destroyed(grandchild));

        // Second destroy is a no-op.
        engine.destroy(grandchild);
        assert_eq!(engine.watcher_count(root), 1);
    }

    #[test]
    fn destroy_orphans_children_without_destroying_them() {
        let mut engine = Engine::default();
        let root = engine.create_root();
        let mid = engine.new_child(root).unwrap();
        let leaf = engine.new_child(mid).unwrap();
        engine.set(mid, "inherited", "yes");
        noop_watch(&mut engine, leaf);

        engine.destroy(mid);
        assert_eq!(engine.held_scope_count(), 3);
        assert_eq!(engine.watcher_count(root), 0);
        assert!(engine.contains(leaf));
        assert_eq!(engine.root_of(leaf), Some(leaf));
        assert_eq!(engine.watcher_count(leaf), 1);
        assert_eq!(engine.get(leaf, "inherited"), Value::from("yes"));

        engine.destroy(leaf);
        assert!(!engine.contains(leaf));
        assert!(engine.is_destroyed(mid));
        assert_eq!(engine.held_scope_count(), 1);
    }

    #[test]
    fn tombstone_chain_is_released_by_its_last_reader() {
        let mut engine = Engine::default();
        let root = engine.create_root();
        let a = engine.new_child(root).unwrap();
        let b = engine.new_child(a).unwrap();
        let c = engine.new_child(b).unwrap();
        engine.set(a, "from_a", 1);

        engine.destroy(a);
        engine.destroy(b);
        assert_eq!(engine.held_scope_count(), 4);
        assert_eq!(engine.get(c, "from_a"), Value::from(1));

        engine.destroy(c);
        assert_eq!(engine.held_scope_count(), 1);
        assert!(engine.get(c, "from_a").is_undefined());
        assert!([a, b, c].iter().all(|scope| engine.is_destroyed(*scope)));
    }

    #[test]
    fn repeated_create_destroy_does_not_grow() {
        let mut engine = Engine::default();
        let root = engine.create_root();
        let mut last = root;
        for _ in 0..1000 {
            last = engine.new_child(root).unwrap();
            noop_watch(&mut engine, last);
            engine.destroy(last);
        }
        assert_eq!(engine.held_scope_count(), 1);
        assert_eq!(engine.watcher_count(root), 0);
        assert!(engine.children(root).is_empty());
        assert!(engine.is_destroyed(last));
        assert!(engine.new_child(last).is_err());
    }

    #[test]
    fn get_by_id_finds_transcluded_descendants() {
        let mut engine = Engine::default();
        let root = engine.create_root();
        let isolated = engine.new_isolated(root).unwrap();
        let slot = engine.new_child(isolated).unwrap();
        let content = engine.reparent(root, Some(slot)).unwrap();

        assert_eq!(engine.get_by_id(root, content), Some(content));
        assert_eq!(engine.get_by_id(slot, content), Some(content));
        assert_eq!(engine.get_by_id(content, root), None);

        engine.destroy(slot);
        assert_eq!(engine.get_by_id(root, content), None);
    }

    #[test]
    fn non_reactive_host_passes_through() {
        let mut engine = Engine::default();
        let created = engine.create_root_with(RootOptions {
            data: Some(Value::host(Frozen)),
            ..RootOptions::default()
        });
        assert!(matches!(created, RootScope::Passthrough(_)));
        assert!(created.scope().is_none());
        assert_eq!(engine.scope_count(), 0);
    }

    #[test]
    fn host_backed_root_reads_properties_and_keeps_methods() {
        let mut engine = Engine::default();
        let root = engine
            .create_root_with(RootOptions {
                data: Some(Value::host(Profile {
                    name: "Ada".into(),
                })),
                ..RootOptions::default()
            })
            .scope()
            .unwrap();
        let child = engine.new_child(root).unwrap();

        assert_eq!(engine.get(child, "name"), Value::from("Ada"));
        assert_eq!(engine.keys(root), vec!["name".to_string()]);

        engine.set(root, "profile", Value::host(Profile { name: "Bob".into() }));
        let profile = engine.get(child, "profile");
        let greeting = profile.downcast_host::<Profile>().map(Profile::greeting);
        assert_eq!(greeting.as_deref(), Some("hello Bob"));
    }

    #[test]
    fn root_options_override_non_scope_keys() {
        let mut engine = Engine::default();
        let root = engine
            .create_root_with(RootOptions {
                data: Some(Value::map(btree! { "a".into() => Value::from(1) })),
                non_scope_keys: Some(BTreeSet::from(["opaque".to_string()])),
            })
            .scope()
            .unwrap();
        let child = engine.new_child(root).unwrap();

        assert_eq!(engine.get(child, "a"), Value::from(1));
        engine.set(child, "opaque", 5);
        assert!(!engine.has_pending());
        engine.set(child, "visible", 5);
        assert!(engine.has_pending());
    }

    #[test]
    fn foreign_links_only_cross_trees() {
        let mut engine = Engine::default();
        let a = engine.create_root();
        let a_child = engine.new_child(a).unwrap();
        let b = engine.create_root();

        assert!(!engine.register_foreign(a_child, a));
        assert!(engine.register_foreign(a_child, b));
        assert!(!engine.register_foreign(a_child, b));
        assert_eq!(engine.foreign_dependencies(a_child), vec![b]);

        engine.destroy(b);
        assert!(engine.foreign_dependencies(a_child).is_empty());
        assert_eq!(engine.held_scope_count(), 2);
    }

    #[test]
    fn creating_under_destroyed_scope_fails_closed() {
        let mut engine = Engine::default();
        let root = engine.create_root();
        engine.destroy(root);
        assert!(matches!(
            engine.new_child(root),
            Err(EngineError::ScopeUnavailable(id)) if id == root
        ));
        let handle = engine.watch(root, WatchSource::getter(|view: &ScopeView<'_>| view.get("a")), |_, _| Ok(()));
        assert!(handle.is_inert());
    }
}
