//! Node arena and per-scope caches.
//!
//! Every node ever built lives in [`Graph::nodes`], addressed by its
//! [`NodeId`]. Internalized nodes are additionally listed in the cache of
//! their scope, in insertion order; a node's position there is its
//! [`CacheId`]. Because positions only grow, an equal node for a new
//! candidate can only sit above the highest position among the candidate's
//! same-scope inputs (the watermark).

use rustc_hash::FxHashMap;

use arbor_ir::{ConstValue, Scope};

use crate::node::{CacheId, CachePos, Node, NodeKind};
use crate::qualifier::ConstLookup;
use crate::NodeId;

/// Internalized nodes of one scope, in insertion order.
#[derive(Clone, Debug, Default)]
pub struct ScopeCache {
    entries: Vec<NodeId>,
    fingerprints: Vec<u64>,
}

impl ScopeCache {
    pub fn entries(&self) -> &[NodeId] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: CacheId) -> Option<NodeId> {
        self.entries.get(id.index()).copied()
    }
}

/// Result of a cache probe.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Probe {
    pub found: Option<NodeId>,
    /// Entries above the watermark that were looked at.
    pub scanned: usize,
}

#[derive(Clone, Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    caches: FxHashMap<Scope, ScopeCache>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "node count is bounded by the program size"
    )]
    pub(crate) fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, node)| {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "node count is bounded by the program size"
            )]
            let id = NodeId::new(i as u32);
            (id, node)
        })
    }

    /// Follow compaction and placeholder forwards to the live node.
    pub fn resolve(&self, mut id: NodeId) -> NodeId {
        while let Some(next) = self.node(id).pos.forward() {
            id = next;
        }
        id
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(self.resolve(id)).kind
    }

    /// Constant value of a node, after forwarding.
    pub fn constant(&self, id: NodeId) -> Option<&ConstValue> {
        self.kind(id).as_constant()
    }

    pub fn cache(&self, scope: Scope) -> Option<&ScopeCache> {
        self.caches.get(&scope)
    }

    /// Scopes with at least one cached node.
    pub fn scopes(&self) -> impl Iterator<Item = (Scope, &ScopeCache)> {
        self.caches.iter().map(|(scope, cache)| (*scope, cache))
    }

    /// Cached node at `id` in `scope`.
    pub fn cached(&self, scope: Scope, id: CacheId) -> Option<NodeId> {
        self.caches.get(&scope).and_then(|cache| cache.get(id))
    }

    /// Look for a node equal to `kind` above the watermark.
    pub(crate) fn lookup(
        &self,
        scope: Scope,
        watermark: Option<CacheId>,
        fingerprint: u64,
        kind: &NodeKind,
    ) -> Probe {
        let Some(cache) = self.caches.get(&scope) else {
            return Probe {
                found: None,
                scanned: 0,
            };
        };
        let start = watermark.map_or(0, |w| w.index() + 1);
        let tail = start.min(cache.entries.len());
        let mut scanned = 0;
        for (entry, fp) in cache.entries[tail..]
            .iter()
            .zip(&cache.fingerprints[tail..])
        {
            scanned += 1;
            if *fp == fingerprint && self.node(*entry).kind.same_content(kind) {
                return Probe {
                    found: Some(*entry),
                    scanned,
                };
            }
        }
        Probe {
            found: None,
            scanned,
        }
    }

    /// Append `id` to its scope's cache and mark it cached.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "cache size is bounded by the program size"
    )]
    pub(crate) fn insert(&mut self, scope: Scope, id: NodeId, fingerprint: u64) -> CacheId {
        let cache = self.caches.entry(scope).or_default();
        let cache_id = CacheId::new(cache.entries.len() as u32);
        cache.entries.push(id);
        cache.fingerprints.push(fingerprint);
        self.node_mut(id).pos = CachePos::Cached(cache_id);
        cache_id
    }
}

impl ConstLookup for Graph {
    fn constant(&self, node: NodeId) -> Option<&ConstValue> {
        Graph::constant(self, node)
    }
}
