//! Stateful item scheduler layered on [`DependencyGraph`].
//!
//! # State machine
//!
//! Per item: `blocked → ready → in-flight → {done | skipped}`, with an
//! orthogonal `triggered` flag settable while blocked or ready. At any
//! instant every item is in exactly one of blocked/ready/pending; the union
//! of the three is the full remaining item set.
//!
//! # Single-writer contract
//!
//! One caller thread drives a queue synchronously; there is no internal
//! synchronization. If item execution is offloaded to background work, the
//! caller must still serialize all [`ItemQueue::pop`] / outcome calls.
//! Cross-node parallelism needs no coordination here: each node owns an
//! independent queue.

use std::collections::HashSet;

use tracing::{debug, instrument};

use crate::graph::{DependencyGraph, GraphError};
use crate::item::{Item, ItemId};

/// A popped item together with its remediation-forcing flag.
#[derive(Debug, Clone)]
pub struct QueuedItem {
    pub item: Item,
    /// Set when an earlier `item_fixed` listed this item in its triggers.
    /// The executor must treat the item as needing remediation regardless
    /// of its own correctness check.
    pub triggered: bool,
}

/// Scheduler over one node's item set.
#[derive(Debug)]
pub struct ItemQueue {
    graph: DependencyGraph,
    pending: HashSet<ItemId>,
}

impl ItemQueue {
    /// Build the queue, validating the item set.
    ///
    /// # Errors
    ///
    /// Any [`GraphError`] from [`DependencyGraph::build`]; construction
    /// errors abort the whole run.
    #[instrument(skip(items), fields(items = items.len()))]
    pub fn new(items: Vec<Item>) -> Result<Self, GraphError> {
        Ok(Self {
            graph: DependencyGraph::build(items)?,
            pending: HashSet::new(),
        })
    }

    /// Move one ready item to in-flight and return it.
    ///
    /// Returns `None` when nothing is ready; use [`Self::is_done`] and
    /// [`Self::is_deadlocked`] to tell completion from starvation. The
    /// choice among multiple ready items is non-deterministic.
    pub fn pop(&mut self) -> Option<QueuedItem> {
        let node = self.graph.pop_ready()?;
        self.pending.insert(node.item.id.clone());
        Some(QueuedItem {
            item: node.item,
            triggered: node.triggered,
        })
    }

    /// Record that an item was checked and needed no fixing.
    ///
    /// Drops it from pending and unblocks everything that waited on it;
    /// several items may become ready at once, in no guaranteed order.
    pub fn item_ok(&mut self, item: &Item) {
        let was_pending = self.pending.remove(&item.id);
        debug_assert!(was_pending, "item_ok for {} which was not in flight", item.id);
        self.graph.remove_edge(&item.id);
    }

    /// Record that an item was successfully fixed, then fire its triggers.
    ///
    /// Trigger targets no longer in the graph (already applied or skipped)
    /// are logged and ignored; firing never fails.
    pub fn item_fixed(&mut self, item: &Item) {
        self.item_ok(item);
        for target in &item.triggers {
            if self.graph.mark_triggered(target) {
                debug!(item = %item.id, target = %target, "trigger fired");
            } else {
                debug!(
                    item = %item.id,
                    target = %target,
                    "trigger target not available, must have been applied or skipped already",
                );
            }
        }
    }

    /// Record that an item was skipped.
    ///
    /// With `cascade_skip` set, every transitive dependent is removed from
    /// the graph and returned (placeholder items excluded) so skip
    /// statistics stay accurate — each dependent exactly once. Without it,
    /// dependents keep their now-unsatisfiable blocking entry; reporting
    /// that as unreachable work is the orchestrator's job, not the queue's.
    #[must_use = "cascade-skipped dependents must be recorded by the caller"]
    pub fn item_skipped(&mut self, item: &Item) -> Vec<Item> {
        let was_pending = self.pending.remove(&item.id);
        debug_assert!(
            was_pending,
            "item_skipped for {} which was not in flight",
            item.id
        );
        if !item.cascade_skip {
            return Vec::new();
        }
        self.graph
            .remove_dependents(&item.id)
            .into_iter()
            .filter(|dependent| !dependent.is_placeholder())
            .collect()
    }

    /// True when blocked, ready, and pending are all empty.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.graph.is_empty() && self.pending.is_empty()
    }

    /// True when blocked items remain but nothing is ready or in flight.
    ///
    /// Reached via a non-cascading skip; the remaining items can never run.
    #[must_use]
    pub fn is_deadlocked(&self) -> bool {
        self.graph.blocked_count() > 0
            && self.graph.ready_count() == 0
            && self.pending.is_empty()
    }

    /// IDs currently in flight, sorted.
    #[must_use]
    pub fn pending_ids(&self) -> Vec<ItemId> {
        let mut ids: Vec<ItemId> = self.pending.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Remaining blocked items with their blocking sets, for diagnostics.
    #[must_use]
    pub fn blocked_report(&self) -> Vec<(ItemId, Vec<ItemId>)> {
        self.graph.blocked_report()
    }

    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.graph.ready_count()
    }

    #[must_use]
    pub fn blocked_count(&self) -> usize {
        self.graph.blocked_count()
    }
}
