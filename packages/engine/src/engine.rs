//! The engine: an arena of scope trees plus the scheduler state that drives
//! them.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;

use scopewatch_value::{ScopeId, Value};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::ListenerMap;
use crate::expression::{ExpressionCompiler, KeyPathCompiler};
use crate::post_queue::PostTask;
use crate::report::ErrorReporter;
use crate::scope::{ScopeKind, ScopeNode};

/// The reserved self-reference key.
///
/// Reading it yields the scope itself (`Value::Scope`); writing it is
/// ignored.
pub const SELF_KEY: &str = "this";

/// A reactive scope engine.
///
/// The engine owns every scope node it creates, keyed by id. Independent
/// engines share nothing, including the post-convergence queue.
///
/// Scheduling is single-threaded and cooperative: mutations only mark trees
/// as pending, and the host calls [`Engine::tick`] once per scheduling tick
/// to run the coalesced digest.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use scopewatch_engine::{Engine, EngineConfig, WatchSource};
/// use scopewatch_value::{key_path, Value};
///
/// let mut engine = Engine::new(EngineConfig::default());
/// let root = engine.create_root();
/// engine.set(root, "a", 1);
///
/// let fired = Rc::new(Cell::new(0));
/// let seen = fired.clone();
/// engine.watch(root, WatchSource::from(key_path!("a")), move |_, _| {
///     seen.set(seen.get() + 1);
///     Ok(())
/// });
///
/// engine.tick();
/// assert_eq!(fired.get(), 1);
///
/// engine.set(root, "a", 2);
/// engine.tick();
/// assert_eq!(fired.get(), 2);
/// ```
pub struct Engine {
    pub(crate) config: EngineConfig,

    pub(crate) scopes: BTreeMap<ScopeId, ScopeNode>,

    /// Scopes mutated since the last digest; resolved to trees at tick time.
    pub(crate) pending: BTreeSet<ScopeId>,

    pub(crate) post_queue: VecDeque<PostTask>,

    /// True while a convergence loop runs.
    pub(crate) digesting: bool,

    /// Set when a watch is registered mid-digest, forcing another pass.
    pub(crate) registered_mid_pass: bool,

    pub(crate) compiler: Rc<dyn ExpressionCompiler>,

    reporter: Option<Box<dyn ErrorReporter>>,

    next_scope: u64,
    next_watch: u64,
    next_listener: u64,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    /// Create an engine with the given configuration.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            scopes: BTreeMap::new(),
            pending: BTreeSet::new(),
            post_queue: VecDeque::new(),
            digesting: false,
            registered_mid_pass: false,
            compiler: Rc::new(KeyPathCompiler),
            reporter: None,
            next_scope: 0,
            next_watch: 0,
            next_listener: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Install the reporter that receives every caught error.
    pub fn set_error_reporter<R: ErrorReporter + 'static>(&mut self, reporter: R) {
        self.reporter = Some(Box::new(reporter));
    }

    /// Replace the compiler used by [`Engine::watch_expression`].
    pub fn set_compiler<C: ExpressionCompiler + 'static>(&mut self, compiler: C) {
        self.compiler = Rc::new(compiler);
    }

    pub(crate) fn report(&self, error: EngineError, scope: Option<ScopeId>) {
        if let Some(reporter) = &self.reporter {
            reporter.report(&error, scope);
        }
    }

    pub(crate) fn allocate_scope_id(&mut self) -> ScopeId {
        self.next_scope += 1;
        ScopeId::new(self.next_scope)
    }

    pub(crate) fn allocate_watch_id(&mut self) -> u64 {
        self.next_watch += 1;
        self.next_watch
    }

    pub(crate) fn allocate_listener_id(&mut self) -> u64 {
        self.next_listener += 1;
        self.next_listener
    }

    /// Mark a scope's tree as needing a digest on the next tick.
    pub(crate) fn schedule(&mut self, scope: ScopeId) {
        if self.pending.insert(scope) {
            tracing::trace!(%scope, "digest scheduled");
        }
    }

    /// Look up a live node.
    pub(crate) fn live(&self, scope: ScopeId) -> Option<&ScopeNode> {
        self.scopes.get(&scope).filter(|node| node.is_live())
    }

    pub(crate) fn live_mut(&mut self, scope: ScopeId) -> Option<&mut ScopeNode> {
        self.scopes.get_mut(&scope).filter(|node| node.is_live())
    }

    /// Walk structural parents up to the root of `scope`'s tree.
    pub fn root_of(&self, scope: ScopeId) -> Option<ScopeId> {
        let mut current = self.scopes.get(&scope)?;
        while let Some(parent) = current.parent_structural {
            match self.scopes.get(&parent) {
                Some(node) => current = node,
                None => break,
            }
        }
        Some(current.id)
    }

    /// Every live node of the structural subtree at `scope`, pre-order.
    pub(crate) fn subtree(&self, scope: ScopeId) -> Vec<ScopeId> {
        let mut order = Vec::new();
        let mut stack = vec![scope];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.live(id) {
                order.push(id);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        order
    }

    // Introspection

    /// Whether the engine holds a live scope with this id.
    pub fn contains(&self, scope: ScopeId) -> bool {
        self.live(scope).is_some()
    }

    /// Whether the scope was created by this engine and has been destroyed.
    pub fn is_destroyed(&self, scope: ScopeId) -> bool {
        match self.scopes.get(&scope) {
            Some(node) => node.destroyed,
            None => (1..=self.next_scope).contains(&scope.as_u64()),
        }
    }

    pub fn kind(&self, scope: ScopeId) -> Option<ScopeKind> {
        self.scopes.get(&scope).map(|node| node.kind)
    }

    /// Structural parent.
    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes.get(&scope).and_then(|node| node.parent_structural)
    }

    /// Parent that reads fall through to.
    pub fn inheritance_parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes.get(&scope).and_then(|node| node.parent_inheritance)
    }

    /// Children in insertion order. Empty for unknown scopes.
    pub fn children(&self, scope: ScopeId) -> &[ScopeId] {
        self.scopes
            .get(&scope)
            .map_or(&[][..], |node| node.children.as_slice())
    }

    /// Watches on this scope plus all of its descendants.
    pub fn watcher_count(&self, scope: ScopeId) -> usize {
        self.scopes.get(&scope).map_or(0, |node| node.watcher_count)
    }

    /// Listener storage of this scope; `None` until it registers a listener.
    pub fn listeners(&self, scope: ScopeId) -> Option<&ListenerMap> {
        self.scopes.get(&scope).and_then(|node| node.listeners.as_ref())
    }

    pub fn foreign_dependencies(&self, scope: ScopeId) -> Vec<ScopeId> {
        self.scopes
            .get(&scope)
            .map(|node| node.foreign.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of live scopes across all trees.
    pub fn scope_count(&self) -> usize {
        self.scopes.values().filter(|node| node.is_live()).count()
    }

    /// Number of nodes the engine holds: live scopes plus destroyed ones
    /// that an orphaned scope still reads through.
    pub fn held_scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// Whether a tick has work to do.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty() || !self.post_queue.is_empty()
    }

    /// Read a value as a `Value::Scope` reference when it is one.
    pub fn resolve_scope(&self, value: &Value) -> Option<ScopeId> {
        value.as_scope().filter(|id| self.contains(*id))
    }
}
