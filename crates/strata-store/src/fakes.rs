//! In-memory fake for the graph store
//!
//! `MemoryGraphStore` satisfies the [`GraphStore`] contract without any
//! external dependency. It also carries two fault-injection switches so tests
//! can exercise the engine's failure isolation:
//!
//! - `set_available(false)` makes every call fail with `StorageError::Unavailable`.
//! - `fail_edge_writes(true)` makes only `insert_edge` fail.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::graph::*;

#[derive(Debug, Default)]
struct GraphState {
    nodes: BTreeMap<NodeId, GraphNode>,
    edges: BTreeMap<EdgeKey, GraphEdge>,
}

/// In-memory graph store backed by ordered maps.
#[derive(Debug)]
pub struct MemoryGraphStore {
    state: Mutex<GraphState>,
    available: AtomicBool,
    edge_writes_fail: AtomicBool,
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self {
            state: Mutex::new(GraphState::default()),
            available: AtomicBool::new(true),
            edge_writes_fail: AtomicBool::new(false),
        }
    }
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make every `insert_edge` call fail while enabled.
    pub fn fail_edge_writes(&self, fail: bool) {
        self.edge_writes_fail.store(fail, Ordering::SeqCst);
    }

    /// Number of nodes currently stored.
    pub fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }

    /// Number of edges currently stored.
    pub fn edge_count(&self) -> usize {
        self.lock().edges.len()
    }

    /// All edges carrying `relation`, in key order.
    pub fn edges_with_relation(&self, relation: EdgeRelation) -> Vec<GraphEdge> {
        self.lock()
            .edges
            .values()
            .filter(|e| e.relation == relation)
            .cloned()
            .collect()
    }

    /// All nodes of `node_type`, ordered by `(timestamp, id)`.
    pub fn nodes_of_type(&self, node_type: &str) -> Vec<GraphNode> {
        let mut nodes: Vec<GraphNode> = self
            .lock()
            .nodes
            .values()
            .filter(|n| n.node_type == node_type)
            .cloned()
            .collect();
        sort_nodes(&mut nodes);
        nodes
    }

    fn lock(&self) -> MutexGuard<'_, GraphState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Unavailable(
                "memory store switched off".to_string(),
            ))
        }
    }
}

fn sort_nodes(nodes: &mut [GraphNode]) {
    nodes.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn get_nodes_in_range(
        &self,
        node_type: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<GraphNode>> {
        self.check_available()?;
        let state = self.lock();
        let mut nodes: Vec<GraphNode> = state
            .nodes
            .values()
            .filter(|n| n.node_type == node_type && n.timestamp >= start && n.timestamp < end)
            .cloned()
            .collect();
        sort_nodes(&mut nodes);
        Ok(nodes)
    }

    async fn nearest_node(
        &self,
        node_type: &str,
        pivot: DateTime<Utc>,
        direction: Direction,
    ) -> StorageResult<Option<GraphNode>> {
        self.check_available()?;
        let state = self.lock();
        let candidates = state.nodes.values().filter(|n| n.node_type == node_type);
        let found = match direction {
            Direction::Before => candidates
                .filter(|n| n.timestamp < pivot)
                .max_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id))),
            Direction::After => candidates
                .filter(|n| n.timestamp > pivot)
                .min_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id))),
        };
        Ok(found.cloned())
    }

    async fn get_node(&self, id: &NodeId) -> StorageResult<Option<GraphNode>> {
        self.check_available()?;
        Ok(self.lock().nodes.get(id).cloned())
    }

    async fn exists_node(&self, id: &NodeId) -> StorageResult<bool> {
        self.check_available()?;
        Ok(self.lock().nodes.contains_key(id))
    }

    async fn upsert_node(&self, node: GraphNode) -> StorageResult<WriteOutcome> {
        self.check_available()?;
        let mut state = self.lock();
        if state.nodes.contains_key(&node.id) {
            return Ok(WriteOutcome::AlreadyExisted);
        }
        state.nodes.insert(node.id.clone(), node);
        Ok(WriteOutcome::Created)
    }

    async fn insert_edge(&self, edge: GraphEdge) -> StorageResult<WriteOutcome> {
        self.check_available()?;
        if self.edge_writes_fail.load(Ordering::SeqCst) {
            return Err(StorageError::Backend(
                "edge writes disabled by fault injection".to_string(),
            ));
        }
        let mut state = self.lock();
        let key = edge.key();
        if state.edges.contains_key(&key) {
            return Ok(WriteOutcome::AlreadyExisted);
        }
        state.edges.insert(key, edge);
        Ok(WriteOutcome::Created)
    }

    async fn edges_from(&self, id: &NodeId) -> StorageResult<Vec<GraphEdge>> {
        self.check_available()?;
        Ok(self
            .lock()
            .edges
            .values()
            .filter(|e| &e.source_id == id)
            .cloned()
            .collect())
    }

    async fn edges_to(&self, id: &NodeId) -> StorageResult<Vec<GraphEdge>> {
        self.check_available()?;
        Ok(self
            .lock()
            .edges
            .values()
            .filter(|e| &e.target_id == id)
            .cloned()
            .collect())
    }

    async fn delete_edges(&self, keys: &[EdgeKey]) -> StorageResult<u64> {
        self.check_available()?;
        let mut state = self.lock();
        let unique: BTreeSet<&EdgeKey> = keys.iter().collect();
        Ok(unique
            .into_iter()
            .filter(|key| state.edges.remove(*key).is_some())
            .count() as u64)
    }

    async fn delete_nodes(&self, ids: &[NodeId]) -> StorageResult<u64> {
        self.check_available()?;
        let mut state = self.lock();
        let doomed: BTreeSet<&NodeId> = ids.iter().collect();
        let mut deleted = 0u64;
        for id in &doomed {
            if state.nodes.remove(*id).is_some() {
                deleted += 1;
            }
        }
        state
            .edges
            .retain(|key, _| !doomed.contains(&key.source_id) && !doomed.contains(&key.target_id));
        Ok(deleted)
    }
}
