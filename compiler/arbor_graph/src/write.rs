//! Write-reachability.
//!
//! A write `target <- value` lands on the storage cells its target reduces
//! to. Two passes find them:
//!
//! 1. [`mark_writable_path`](GraphBuilder::mark_writable_path) walks up from
//!    every storage cell along reversed write-through edges and flags each
//!    node some cell is reachable from as `WRITABLE`.
//! 2. [`extract_writable_destinations`](GraphBuilder::extract_writable_destinations)
//!    walks down from a write target through writable nodes only, collecting
//!    per cell the attribute path inside it and the conditions under which
//!    the write reaches it.
//!
//! Marks carry the pass generation and are reset lazily on first touch in a
//! later pass.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use arbor_diagnostic::ErrorCode;
use arbor_ir::{ConstValue, Name, Origin};

use crate::builder::Write;
use crate::function::Function;
use crate::node::{AreaOp, NodeFlags, NodeKind};
use crate::qualifier::Guard;
use crate::stack::ensure_sufficient_stack;
use crate::{GraphBuilder, NodeId};

/// One condition on the way from a write target to a cell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardTerm {
    /// The node's value is truthy.
    Truthy(NodeId),
    /// The node's value is falsy.
    Falsy(NodeId),
    /// The selector matches the pattern.
    Matches { selector: NodeId, pattern: NodeId },
    /// A variant alternative's guard holds.
    Qualified(Guard),
}

/// A storage cell a write may land on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteDestination {
    pub storage: NodeId,
    /// Attribute path inside the cell.
    pub path: Vec<Name>,
    /// All of these hold when the write lands here.
    pub guard: Vec<GuardTerm>,
}

/// A write with its destinations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedWrite {
    pub target: NodeId,
    pub value: NodeId,
    pub origin: Option<Origin>,
    pub destinations: Vec<WriteDestination>,
}

#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct WriteMark {
    generation: u32,
    queued: bool,
    processed: bool,
}

/// A write-through edge: writing to the parent at some path writes to
/// `child` at `path`, provided `term` holds.
struct Edge {
    child: NodeId,
    path: Vec<Name>,
    term: Option<GuardTerm>,
}

impl GraphBuilder {
    /// Reset a node's write mark and flags if they are from an older pass.
    fn touch(&mut self, id: NodeId) -> &mut WriteMark {
        if self.write_marks.len() <= id.index() {
            self.write_marks.resize(id.index() + 1, WriteMark::default());
        }
        if self.write_marks[id.index()].generation != self.generation {
            self.write_marks[id.index()] = WriteMark {
                generation: self.generation,
                queued: false,
                processed: false,
            };
            self.graph
                .node_mut(id)
                .flags
                .remove(NodeFlags::WRITABLE | NodeFlags::WRITE_OUTPUT_PATH);
        }
        &mut self.write_marks[id.index()]
    }

    fn has_flag(&mut self, id: NodeId, flag: NodeFlags) -> bool {
        self.touch(id);
        self.graph.node(id).flags.contains(flag)
    }

    /// Nodes a write at `path` on `id` passes on to.
    fn write_edges(&self, id: NodeId, path: &[Name]) -> SmallVec<[Edge; 2]> {
        let mut edges = SmallVec::new();
        let through = |child: NodeId, term: Option<GuardTerm>| Edge {
            child,
            path: path.to_vec(),
            term,
        };
        match self.graph.kind(id) {
            NodeKind::Project { path: prefix, data } => {
                let mut full = prefix.clone();
                full.extend_from_slice(path);
                edges.push(Edge {
                    child: *data,
                    path: full,
                    term: None,
                });
            }
            NodeKind::AttributeSet(pairs) => {
                if let Some((first, rest)) = path.split_first() {
                    if let Ok(pos) = pairs.binary_search_by(|(name, _)| name.cmp(first)) {
                        edges.push(Edge {
                            child: pairs[pos].1,
                            path: rest.to_vec(),
                            term: None,
                        });
                    }
                }
            }
            NodeKind::BoolGate { guard, on_true } => {
                edges.push(through(*on_true, Some(GuardTerm::Truthy(*guard))));
            }
            NodeKind::BoolMatch {
                guard,
                pattern,
                on_match,
            } => edges.push(through(
                *on_match,
                Some(GuardTerm::Matches {
                    selector: *guard,
                    pattern: *pattern,
                }),
            )),
            NodeKind::Cond {
                selector,
                alternatives,
            } => {
                for (on, use_) in alternatives {
                    let term = match self.graph.constant(*on) {
                        Some(ConstValue::Bool(true)) => GuardTerm::Truthy(*selector),
                        Some(ConstValue::Bool(false)) => GuardTerm::Falsy(*selector),
                        _ => GuardTerm::Matches {
                            selector: *selector,
                            pattern: *on,
                        },
                    };
                    edges.push(through(*use_, Some(term)));
                }
            }
            NodeKind::Variant {
                qualifiers,
                alternatives,
            } => {
                if let NodeKind::QualifierSet(guards) = self.graph.kind(*qualifiers) {
                    for (j, (guard, alternative)) in guards.iter().zip(alternatives).enumerate() {
                        // A write lands on the first matching alternative.
                        if guards[..j].iter().any(|earlier| guard.implies(earlier)) {
                            continue;
                        }
                        edges.push(through(*alternative, Some(GuardTerm::Qualified(guard.clone()))));
                    }
                }
            }
            NodeKind::Apply {
                function: Function::Builtin(builtin),
                args,
            } if builtin.info().write_through => {
                if let Some(first) = args.first() {
                    edges.push(through(*first, None));
                }
            }
            NodeKind::Area(nav) => {
                if let AreaOp::Project(export) = nav.op {
                    if let Some(name) = self.scopes.export_name(export) {
                        for template in &nav.templates {
                            if let Some(attribute) = self.defined_attribute(*template, name) {
                                edges.push(through(attribute, None));
                            }
                        }
                    }
                }
            }
            NodeKind::Constant(_)
            | NodeKind::Storage(_)
            | NodeKind::QualifierSet(_)
            | NodeKind::Apply { .. }
            | NodeKind::ClassMembership { .. }
            | NodeKind::Geometry { .. }
            | NodeKind::Sort { .. }
            | NodeKind::QueryApply { .. }
            | NodeKind::OrderedSet(_)
            | NodeKind::Range { .. }
            | NodeKind::Negation(_)
            | NodeKind::Substring(_)
            | NodeKind::Comparison { .. }
            | NodeKind::Closure { .. }
            | NodeKind::Placeholder { .. }
            | NodeKind::CycleSentinel => {}
        }
        edges
    }

    /// Children a write may pass on to at any path. Used for the upward
    /// pass, where the path is not known yet.
    fn writable_children(&self, id: NodeId) -> SmallVec<[NodeId; 4]> {
        match self.graph.kind(id) {
            NodeKind::AttributeSet(pairs) => pairs.iter().map(|(_, node)| *node).collect(),
            _ => self
                .write_edges(id, &[])
                .into_iter()
                .map(|edge| edge.child)
                .collect(),
        }
    }

    /// Whether a storage cell is reachable from `id`: it is one, or some
    /// write-through child is already known writable.
    pub fn check_writability(&mut self, id: NodeId) -> bool {
        let id = self.graph.resolve(id);
        if matches!(self.graph.node(id).kind, NodeKind::Storage(_)) {
            return true;
        }
        let children = self.writable_children(id);
        children.into_iter().any(|child| {
            let child = self.graph.resolve(child);
            self.has_flag(child, NodeFlags::WRITABLE)
        })
    }

    /// Flag every node a storage cell is reachable from as `WRITABLE`.
    pub fn mark_writable_path(&mut self) {
        let mut parents: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();
        let mut queue = VecDeque::new();
        let cached: Vec<NodeId> = self
            .graph
            .iter()
            .filter(|(_, node)| node.is_cached())
            .map(|(id, _)| id)
            .collect();
        for id in cached {
            for child in self.writable_children(id) {
                parents.entry(self.graph.resolve(child)).or_default().push(id);
            }
            if matches!(self.graph.node(id).kind, NodeKind::Storage(_)) {
                self.touch(id).queued = true;
                queue.push_back(id);
            }
        }

        let mut marked = 0usize;
        while let Some(id) = queue.pop_front() {
            if self.touch(id).processed || !self.check_writability(id) {
                continue;
            }
            self.touch(id).processed = true;
            self.graph.node_mut(id).flags |= NodeFlags::WRITABLE;
            marked += 1;
            for parent in parents.get(&id).into_iter().flatten() {
                let mark = self.touch(*parent);
                if !mark.queued && !mark.processed {
                    mark.queued = true;
                    queue.push_back(*parent);
                }
            }
        }
        tracing::debug!(marked, generation = self.generation, "marked writable paths");
    }

    /// Storage cells a write to `target` lands on.
    pub fn extract_writable_destinations(&mut self, target: NodeId) -> Vec<WriteDestination> {
        let mut out = Vec::new();
        let mut on_walk = FxHashSet::default();
        self.extract(target, Vec::new(), Vec::new(), &mut on_walk, &mut out);
        out
    }

    fn extract(
        &mut self,
        id: NodeId,
        path: Vec<Name>,
        guard: Vec<GuardTerm>,
        on_walk: &mut FxHashSet<NodeId>,
        out: &mut Vec<WriteDestination>,
    ) -> bool {
        let id = self.graph.resolve(id);
        if !self.has_flag(id, NodeFlags::WRITABLE) {
            return false;
        }
        if matches!(self.graph.node(id).kind, NodeKind::Storage(_)) {
            out.push(WriteDestination {
                storage: id,
                path,
                guard,
            });
            self.graph.node_mut(id).flags |= NodeFlags::WRITE_OUTPUT_PATH;
            return true;
        }
        if !on_walk.insert(id) {
            return false;
        }
        let mut found = false;
        for edge in self.write_edges(id, &path) {
            let mut terms = guard.clone();
            terms.extend(edge.term);
            found |= ensure_sufficient_stack(|| self.extract(edge.child, edge.path, terms, on_walk, out));
        }
        on_walk.remove(&id);
        if found {
            self.graph.node_mut(id).flags |= NodeFlags::WRITE_OUTPUT_PATH;
        }
        found
    }

    /// Resolve every recorded write. A write that reaches no cell is
    /// reported once per construct and dropped.
    pub fn analyze_writes(&mut self) -> Vec<ResolvedWrite> {
        self.mark_writable_path();
        let mut resolved = Vec::with_capacity(self.writes.len());
        let mut warned: FxHashSet<Option<Origin>> = FxHashSet::default();
        for Write {
            target,
            value,
            origin,
        } in self.writes.clone()
        {
            let destinations = self.extract_writable_destinations(target);
            if destinations.is_empty() {
                if warned.insert(origin) {
                    self.warn(
                        ErrorCode::W3002,
                        format!("write target {target} does not reach any storage"),
                        origin,
                    );
                }
                continue;
            }
            tracing::trace!(%target, destinations = destinations.len(), "write resolved");
            resolved.push(ResolvedWrite {
                target: self.graph.resolve(target),
                value: self.graph.resolve(value),
                origin,
                destinations,
            });
        }
        resolved
    }
}
