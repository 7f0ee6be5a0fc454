//! Dependency graph construction and mutation primitives.
//!
//! # Overview
//!
//! [`DependencyGraph::build`] validates an item set (referential integrity,
//! duplicate IDs, cycles) and partitions it into *blocked* nodes (non-empty
//! blocking set) and *ready* nodes (empty blocking set). The mutation
//! primitives — edge removal on success, transitive dependent removal on a
//! cascading skip — are crate-private: the graph is owned exclusively by
//! [`crate::queue::ItemQueue`], which exposes all mutation (see the
//! single-writer contract documented there).
//!
//! # Edge Direction
//!
//! An edge `A → B` means "A **blocks** B": A must be applied before B.
//! Blocking sets only ever shrink; a node moves to the ready partition
//! exactly when its blocking set becomes empty.

use std::collections::{HashMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use tracing::instrument;

use crate::error::ErrorCode;
use crate::item::{Item, ItemId};

/// Errors from graph construction and lookup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// A dependency or lookup referenced an ID outside the item set.
    ///
    /// Self-dependencies are reported through this variant too: an item
    /// blocking on itself can never be satisfied.
    #[error("{}", no_such_item_message(.id, .wanted_by.as_deref()))]
    NoSuchItem {
        id: String,
        wanted_by: Option<String>,
    },

    /// The same `kind:name` was declared more than once.
    #[error("duplicate item ID: {id}")]
    DuplicateItem { id: String },

    /// The declared dependencies form a cycle.
    #[error("dependency cycle between: {}", .members.join(", "))]
    DependencyCycle { members: Vec<String> },
}

fn no_such_item_message(id: &str, wanted_by: Option<&str>) -> String {
    wanted_by.map_or_else(
        || format!("no such item: {id}"),
        |by| format!("item {by} depends on {id}, which is not part of the item set"),
    )
}

impl GraphError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NoSuchItem { .. } => ErrorCode::NoSuchItem,
            Self::DuplicateItem { .. } => ErrorCode::DuplicateItem,
            Self::DependencyCycle { .. } => ErrorCode::DependencyCycle,
        }
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

/// An item plus its current set of unresolved blocking IDs.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub(crate) item: Item,
    pub(crate) blocked_on: HashSet<ItemId>,
    pub(crate) triggered: bool,
}

impl GraphNode {
    fn new(item: Item) -> Self {
        let blocked_on = item.deps().cloned().collect();
        Self {
            item,
            blocked_on,
            triggered: false,
        }
    }
}

/// Validated item graph, partitioned into blocked and ready nodes.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    blocked: Vec<GraphNode>,
    ready: Vec<GraphNode>,
}

impl DependencyGraph {
    /// Build a graph from item declarations.
    ///
    /// Validates that every referenced dependency exists in the item set,
    /// that no ID is declared twice, and that the dependency relation is
    /// acyclic. Cycles are a hard build error here rather than a silent
    /// scheduling hang later.
    ///
    /// # Errors
    ///
    /// [`GraphError::NoSuchItem`] for unknown or self-referential deps,
    /// [`GraphError::DuplicateItem`], or [`GraphError::DependencyCycle`]
    /// naming the sorted cycle members.
    #[instrument(skip(items), fields(items = items.len()))]
    pub fn build(items: Vec<Item>) -> Result<Self, GraphError> {
        let mut ids: HashSet<&ItemId> = HashSet::with_capacity(items.len());
        for item in &items {
            if !ids.insert(&item.id) {
                return Err(GraphError::DuplicateItem {
                    id: item.id.to_string(),
                });
            }
        }

        for item in &items {
            for dep in item.deps() {
                if dep == &item.id || !ids.contains(dep) {
                    return Err(GraphError::NoSuchItem {
                        id: dep.to_string(),
                        wanted_by: Some(item.id.to_string()),
                    });
                }
            }
        }

        if let Some(members) = find_cycle(&items) {
            return Err(GraphError::DependencyCycle { members });
        }

        let (blocked, ready) = items
            .into_iter()
            .map(GraphNode::new)
            .partition(|node| !node.blocked_on.is_empty());

        Ok(Self { blocked, ready })
    }

    /// Look up an item by ID.
    ///
    /// # Errors
    ///
    /// [`GraphError::NoSuchItem`] if `id` is absent from `items`.
    pub fn find<'a>(id: &ItemId, items: &'a [Item]) -> Result<&'a Item, GraphError> {
        items
            .iter()
            .find(|item| &item.id == id)
            .ok_or_else(|| GraphError::NoSuchItem {
                id: id.to_string(),
                wanted_by: None,
            })
    }

    /// Remove `id` from every remaining blocking set.
    ///
    /// Nodes whose blocking set becomes empty move to the ready partition,
    /// in no guaranteed order.
    pub(crate) fn remove_edge(&mut self, id: &ItemId) {
        for node in &mut self.blocked {
            node.blocked_on.remove(id);
        }
        let (still_blocked, now_ready): (Vec<_>, Vec<_>) = self
            .blocked
            .drain(..)
            .partition(|node| !node.blocked_on.is_empty());
        self.blocked = still_blocked;
        self.ready.extend(now_ready);
    }

    /// Remove every node that transitively blocks on `id` and return them.
    ///
    /// Only blocked nodes can depend on anything, so the ready partition is
    /// never touched.
    pub(crate) fn remove_dependents(&mut self, id: &ItemId) -> Vec<Item> {
        let mut closure: HashSet<ItemId> = HashSet::from([id.clone()]);
        loop {
            let before = closure.len();
            for node in &self.blocked {
                if !closure.contains(&node.item.id)
                    && node.blocked_on.iter().any(|dep| closure.contains(dep))
                {
                    closure.insert(node.item.id.clone());
                }
            }
            if closure.len() == before {
                break;
            }
        }

        let (removed, kept): (Vec<_>, Vec<_>) = self
            .blocked
            .drain(..)
            .partition(|node| closure.contains(&node.item.id));
        self.blocked = kept;
        removed.into_iter().map(|node| node.item).collect()
    }

    /// Take one ready node, or `None` if the ready partition is empty.
    ///
    /// Which node is returned when several are ready is
    /// implementation-defined; callers must not rely on the order.
    pub(crate) fn pop_ready(&mut self) -> Option<GraphNode> {
        self.ready.pop()
    }

    /// Set the `triggered` flag on a node still in the graph.
    ///
    /// Returns `false` if `id` is no longer (or never was) present.
    pub(crate) fn mark_triggered(&mut self, id: &ItemId) -> bool {
        for node in self.blocked.iter_mut().chain(self.ready.iter_mut()) {
            if &node.item.id == id {
                node.triggered = true;
                return true;
            }
        }
        false
    }

    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }

    #[must_use]
    pub fn blocked_count(&self) -> usize {
        self.blocked.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty() && self.ready.is_empty()
    }

    /// Blocked IDs with their remaining blocking sets, sorted for stable
    /// diagnostics. Used by orchestrators to report unreachable work.
    #[must_use]
    pub fn blocked_report(&self) -> Vec<(ItemId, Vec<ItemId>)> {
        let mut report: Vec<(ItemId, Vec<ItemId>)> = self
            .blocked
            .iter()
            .map(|node| {
                let mut deps: Vec<ItemId> = node.blocked_on.iter().cloned().collect();
                deps.sort();
                (node.item.id.clone(), deps)
            })
            .collect();
        report.sort();
        report
    }
}

/// Detect a dependency cycle via Tarjan SCC; returns sorted member IDs of
/// the first non-trivial component. Self-loops are rejected before this
/// runs, so single-node components are never cycles here.
fn find_cycle(items: &[Item]) -> Option<Vec<String>> {
    let mut graph = DiGraph::<&ItemId, ()>::new();
    let mut index = HashMap::with_capacity(items.len());
    for item in items {
        index.insert(&item.id, graph.add_node(&item.id));
    }
    for item in items {
        for dep in item.deps() {
            // blocker → blocked
            graph.add_edge(index[dep], index[&item.id], ());
        }
    }

    tarjan_scc(&graph)
        .into_iter()
        .find(|component| component.len() > 1)
        .map(|component| {
            let mut members: Vec<String> = component
                .into_iter()
                .map(|idx| graph[idx].to_string())
                .collect();
            members.sort_unstable();
            members
        })
}
