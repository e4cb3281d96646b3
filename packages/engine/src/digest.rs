//! Digest scheduler: the convergence loop.
//!
//! A tick resolves every pending scope to the root of its tree, closes that
//! set over foreign dependencies, then runs full passes over the selected
//! trees until one pass sees no change. Each pass visits scopes root to leaf,
//! depth first, and each scope's watches in registration order.

use std::collections::BTreeSet;
use std::rc::Rc;

use scopewatch_value::{ScopeId, Value};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::expression::ScopeView;
use crate::watch::{WatchEvent, WatchId, WatchRecord};

/// What a call to [`Engine::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was pending, or a digest was already running.
    Idle,
    /// The digest converged after `passes` passes and the post-convergence
    /// queue was drained.
    Settled { passes: usize },
    /// The pass limit was hit; the cycle was aborted and reported.
    Overrun { passes: usize },
}

impl Engine {
    /// Run one scheduling tick.
    ///
    /// All mutations since the previous tick are coalesced into a single
    /// digest cycle. Calling `tick` from inside a watch listener is a no-op:
    /// the running cycle already picks up the listener's mutations. Calling it
    /// from a post-convergence task runs a nested cycle.
    pub fn tick(&mut self) -> TickOutcome {
        if self.digesting {
            return TickOutcome::Idle;
        }
        if self.pending.is_empty() {
            if !self.post_queue.is_empty() {
                self.flush_post_convergence();
            }
            return TickOutcome::Idle;
        }

        let seeds = std::mem::take(&mut self.pending);
        let roots = self.affected_roots(seeds);
        let outcome = self.converge(roots);
        if let TickOutcome::Settled { .. } = outcome {
            self.flush_post_convergence();
        }
        outcome
    }

    /// Force a digest of `scope`'s tree (and everything linked to it)
    /// without waiting for a mutation.
    pub fn digest(&mut self, scope: ScopeId) -> TickOutcome {
        if !self.contains(scope) {
            return TickOutcome::Idle;
        }
        self.schedule(scope);
        self.tick()
    }

    /// Resolve seed scopes to tree roots, closed over cross-tree links.
    ///
    /// Foreign links count in both directions: a dirty tree pulls in the
    /// trees it refers to and the trees that refer to it. Inheritance counts
    /// downward only: a dirty tree pulls in every tree holding a scope that
    /// reads through one of its nodes, including reads that pass through
    /// destroyed nodes.
    pub(crate) fn affected_roots(&self, seeds: BTreeSet<ScopeId>) -> BTreeSet<ScopeId> {
        let mut roots = BTreeSet::new();
        let mut queue: Vec<ScopeId> = seeds
            .into_iter()
            .filter_map(|scope| self.root_of(scope))
            .collect();

        while let Some(root) = queue.pop() {
            if !roots.insert(root) {
                continue;
            }
            for id in self.subtree(root) {
                let Some(node) = self.live(id) else {
                    continue;
                };
                queue.extend(
                    node.foreign
                        .iter()
                        .chain(&node.dependents)
                        .filter_map(|other| self.root_of(*other)),
                );
                queue.extend(self.inheriting_roots(id));
            }
        }
        roots
    }

    /// Roots of the trees holding live scopes that read through `scope`,
    /// other than plain children sitting in `scope`'s own tree.
    fn inheriting_roots(&self, scope: ScopeId) -> Vec<ScopeId> {
        let mut found = Vec::new();
        let mut stack: Vec<(ScopeId, ScopeId)> = self
            .scopes
            .get(&scope)
            .map(|node| node.heirs.iter().map(|heir| (scope, *heir)).collect())
            .unwrap_or_default();

        while let Some((source, id)) = stack.pop() {
            let Some(node) = self.scopes.get(&id) else {
                continue;
            };
            if node.destroyed {
                stack.extend(node.heirs.iter().map(|heir| (id, *heir)));
            } else if node.parent_structural != Some(source) {
                found.extend(self.root_of(id));
            }
        }
        found
    }

    /// Repeat passes until one is clean or the pass limit is reached.
    fn converge(&mut self, mut roots: BTreeSet<ScopeId>) -> TickOutcome {
        let limit = self.config.pass_limit();
        tracing::debug!(roots = roots.len(), "digest started");
        self.digesting = true;

        let mut passes = 0;
        let outcome = loop {
            self.registered_mid_pass = false;
            let mut dirty = false;
            for root in roots.clone() {
                dirty |= self.digest_tree(root);
            }
            passes += 1;

            // Mutations made by listeners, possibly in trees not yet selected.
            let late = std::mem::take(&mut self.pending);
            if !late.is_empty() {
                let before = roots.len();
                roots.extend(self.affected_roots(late));
                dirty |= roots.len() != before;
            }
            dirty |= self.registered_mid_pass;

            if !dirty {
                break TickOutcome::Settled { passes };
            }
            if passes >= limit {
                break TickOutcome::Overrun { passes };
            }
        };

        self.digesting = false;
        match outcome {
            TickOutcome::Overrun { passes } => {
                tracing::debug!(passes, "digest aborted");
                self.pending.clear();
                let root = roots.iter().next().copied();
                self.report(EngineError::ConvergenceOverrun { passes, limit }, root);
            }
            _ => tracing::debug!(passes, "digest settled"),
        }
        outcome
    }

    /// One pass over a tree. Returns whether any watch changed.
    fn digest_tree(&mut self, root: ScopeId) -> bool {
        let mut dirty = false;
        let mut stack = vec![root];
        while let Some(scope) = stack.pop() {
            if self.live(scope).is_none() {
                continue;
            }
            dirty |= self.digest_scope(scope);
            // Children are read after the scope's listeners ran, so scopes
            // they created are visited in this same pass.
            if let Some(node) = self.live(scope) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        dirty
    }

    /// Check every watch of one scope, in registration order.
    ///
    /// The watch list is re-read after every check: a watch removed by a
    /// listener is never checked, and one appended by a listener is checked
    /// in turn.
    fn digest_scope(&mut self, scope: ScopeId) -> bool {
        let mut dirty = false;
        let mut cursor: Option<WatchId> = None;
        loop {
            let Some(node) = self.live(scope) else {
                break;
            };
            let next = match cursor {
                None => node.watches.first(),
                Some(after) => {
                    let index = node.watches.partition_point(|record| record.id <= after);
                    node.watches.get(index)
                }
            };
            let Some(record) = next.map(Rc::clone) else {
                break;
            };
            cursor = Some(record.id);
            dirty |= self.check_watch(scope, &record);
        }
        dirty
    }

    /// Evaluate one watch and deliver a change to its listener.
    ///
    /// The cached value is updated before the listener runs, so mutations the
    /// listener makes are seen as changes on the next pass.
    fn check_watch(&mut self, scope: ScopeId, record: &WatchRecord) -> bool {
        let view = ScopeView::new(self, scope);

        let value = match record.source.literal_inputs() {
            Some(inputs) => {
                let current: Vec<Value> = inputs.iter().map(|input| input.evaluate(&view)).collect();
                let unchanged = record.inputs.borrow().as_ref().is_some_and(|previous| {
                    previous.len() == current.len()
                        && previous
                            .iter()
                            .zip(&current)
                            .all(|(old, new)| record.equal(old, new))
                });
                if unchanged {
                    return false;
                }
                let value = record.source.evaluate(&view);
                *record.inputs.borrow_mut() =
                    Some(current.iter().map(|input| record.keep(input)).collect());
                value
            }
            None => {
                let value = record.source.evaluate(&view);
                let unchanged = record
                    .last
                    .borrow()
                    .as_ref()
                    .is_some_and(|last| record.equal(last, &value));
                if unchanged {
                    return false;
                }
                value
            }
        };

        let previous = record.last.replace(Some(record.keep(&value)));
        let Some(listener) = record.listener.clone() else {
            return true;
        };

        let initial = previous.is_none();
        let old_value = previous.unwrap_or_else(|| value.clone());
        let event = WatchEvent {
            scope,
            new_value: &value,
            old_value: &old_value,
            initial,
        };
        if let Err(source) = listener(self, &event) {
            self.report(
                EngineError::WatchListener {
                    scope,
                    watch: record.id,
                    source,
                },
                Some(scope),
            );
        }
        true
    }
}
