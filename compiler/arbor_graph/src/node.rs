//! Graph nodes.
//!
//! Nodes live in one arena and are addressed by [`NodeId`], which doubles as
//! the creation sequence number. Every kind of the catalogue is a variant of
//! [`NodeKind`]; the per-kind behaviors (inputs, structural equality,
//! fingerprint, value type, write-through, export) match on it exhaustively.

use std::fmt;
use std::hash::{Hash, Hasher};

use bitflags::bitflags;
use rustc_hash::FxHasher;
use smallvec::SmallVec;

use arbor_ir::{
    Cardinality, ClosureId, CompareOp, ConstValue, ExportId, Name, Origin, Scope, StorageKind,
    TemplateId, ValueKinds, ValueType,
};

use crate::function::Function;
use crate::qualifier::Guard;

// ── ID newtypes ─────────────────────────────────────────────────────

/// Arena handle of a node. Allocated sequentially from 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Position of a node in its scope's cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct CacheId(u32);

impl CacheId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Cache state of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CachePos {
    /// Built but not yet internalized (or pending a forward reference).
    Uncached,
    Cached(CacheId),
    /// Replaced by an equal or simpler node.
    Compacted(NodeId),
    /// Forward reference not yet resolved.
    Placeholder,
    /// Forward reference resolved to the given node.
    ResolvedPlaceholder(NodeId),
    /// On the probe stack while its inputs are internalized.
    Frozen,
}

impl CachePos {
    pub fn cache_id(self) -> Option<CacheId> {
        match self {
            CachePos::Cached(id) => Some(id),
            _ => None,
        }
    }

    /// Where this node forwards to, if it was replaced or resolved.
    pub fn forward(self) -> Option<NodeId> {
        match self {
            CachePos::Compacted(id) | CachePos::ResolvedPlaceholder(id) => Some(id),
            _ => None,
        }
    }
}

bitflags! {
    /// Per-node analysis flags.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct NodeFlags: u8 {
        /// Value known at compile time.
        const CONSTANT = 1 << 0;
        /// Some storage leaf is reachable through write-through edges.
        const WRITABLE = 1 << 1;
        /// Lies on the path from some write to its destinations.
        const WRITE_OUTPUT_PATH = 1 << 2;
        /// Some input is not ordered before this node.
        const SCHEDULING_VIOLATION = 1 << 3;
        /// Built over an unresolved forward reference.
        const PENDING = 1 << 4;
    }
}

/// Evaluation priority class. Higher classes run in an earlier phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Priority(pub u8);

impl Priority {
    pub const DEFAULT: Priority = Priority(0);
    /// Area-set construction (child areas) must settle before content.
    pub const AREA_SET: Priority = Priority(1);
}

/// A mutable storage cell.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StorageCell {
    pub kind: StorageKind,
    pub label: Name,
    /// Unique per cell; two cells never compare equal.
    pub cell: u32,
    pub initial: Option<ConstValue>,
}

/// Area navigation operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AreaOp {
    /// The current area.
    Me,
    /// The embedding (parent) area.
    Embedding,
    /// Child areas with the given name.
    Children(Name),
    /// Exported attribute of the input areas.
    Project(ExportId),
}

/// Area navigation node payload.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AreaNav {
    pub op: AreaOp,
    pub data: Option<NodeId>,
    /// Templates the resulting areas (or projected areas) may belong to,
    /// sorted.
    pub templates: Vec<TemplateId>,
}

/// The node catalogue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Constant(ConstValue),
    Storage(StorageCell),
    /// Attribute-value construction, sorted by attribute name.
    AttributeSet(Vec<(Name, NodeId)>),
    /// `on_true` when `guard` is truthy, else empty.
    BoolGate { guard: NodeId, on_true: NodeId },
    /// `on_match` when `guard` matches `pattern`, else empty.
    BoolMatch {
        guard: NodeId,
        pattern: NodeId,
        on_match: NodeId,
    },
    /// Guards of a variant, one per alternative.
    QualifierSet(Vec<Guard>),
    Variant {
        qualifiers: NodeId,
        alternatives: Vec<NodeId>,
    },
    Apply { function: Function, args: Vec<NodeId> },
    ClassMembership { class: Name, area: NodeId },
    Geometry { label: Name, area: NodeId },
    Sort {
        data: NodeId,
        keys: Vec<NodeId>,
        ascending: bool,
    },
    QueryApply { query: NodeId, data: NodeId },
    /// Attribute path selection.
    Project { path: Vec<Name>, data: NodeId },
    OrderedSet(Vec<NodeId>),
    Range {
        bounds: Vec<NodeId>,
        closed_low: bool,
        closed_high: bool,
    },
    Negation(Vec<NodeId>),
    Substring(Vec<NodeId>),
    Comparison {
        op: CompareOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    Area(AreaNav),
    /// First alternative whose `on` pattern the selector matches.
    Cond {
        selector: NodeId,
        alternatives: Vec<(NodeId, NodeId)>,
    },
    /// Parameters and body live in the closure's own scope and are not
    /// inputs; the body is attached after the closure node is cached.
    Closure {
        closure: ClosureId,
        params: Vec<NodeId>,
        body: Option<NodeId>,
    },
    Placeholder { target: Option<NodeId> },
    CycleSentinel,
}

impl NodeKind {
    /// Operation name, used in traces and the export.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Constant(_) => "const",
            NodeKind::Storage(_) => "storage",
            NodeKind::AttributeSet(_) => "av",
            NodeKind::BoolGate { .. } => "bool",
            NodeKind::BoolMatch { .. } => "match",
            NodeKind::QualifierSet(_) => "quals",
            NodeKind::Variant { .. } => "variant",
            NodeKind::Apply { .. } => "apply",
            NodeKind::ClassMembership { .. } => "class_of",
            NodeKind::Geometry { .. } => "geometry",
            NodeKind::Sort { .. } => "sort",
            NodeKind::QueryApply { .. } => "query",
            NodeKind::Project { .. } => "project",
            NodeKind::OrderedSet(_) => "oset",
            NodeKind::Range { .. } => "range",
            NodeKind::Negation(_) => "neg",
            NodeKind::Substring(_) => "substr",
            NodeKind::Comparison { .. } => "cmp",
            NodeKind::Area(_) => "area",
            NodeKind::Cond { .. } => "cond",
            NodeKind::Closure { .. } => "closure",
            NodeKind::Placeholder { .. } => "placeholder",
            NodeKind::CycleSentinel => "cycle",
        }
    }

    pub fn as_constant(&self) -> Option<&ConstValue> {
        match self {
            NodeKind::Constant(value) => Some(value),
            _ => None,
        }
    }

    /// Inputs in a fixed per-kind order. [`for_each_input_mut`] visits the
    /// same slots in the same order.
    ///
    /// [`for_each_input_mut`]: NodeKind::for_each_input_mut
    pub fn inputs(&self) -> SmallVec<[NodeId; 4]> {
        let mut out = SmallVec::new();
        match self {
            NodeKind::Constant(_)
            | NodeKind::Storage(_)
            | NodeKind::Closure { .. }
            | NodeKind::Placeholder { .. }
            | NodeKind::CycleSentinel => {}
            NodeKind::AttributeSet(pairs) => out.extend(pairs.iter().map(|(_, id)| *id)),
            NodeKind::BoolGate { guard, on_true } => out.extend([*guard, *on_true]),
            NodeKind::BoolMatch {
                guard,
                pattern,
                on_match,
            } => out.extend([*guard, *pattern, *on_match]),
            NodeKind::QualifierSet(guards) => {
                for guard in guards {
                    out.extend(guard.nodes());
                }
            }
            NodeKind::Variant {
                qualifiers,
                alternatives,
            } => {
                out.push(*qualifiers);
                out.extend(alternatives.iter().copied());
            }
            NodeKind::Apply { function, args } => {
                if let Function::Closure(f) = function {
                    out.push(*f);
                }
                out.extend(args.iter().copied());
            }
            NodeKind::ClassMembership { area, .. } | NodeKind::Geometry { area, .. } => {
                out.push(*area);
            }
            NodeKind::Sort { data, keys, .. } => {
                out.push(*data);
                out.extend(keys.iter().copied());
            }
            NodeKind::QueryApply { query, data } => out.extend([*query, *data]),
            NodeKind::Project { data, .. } => out.push(*data),
            NodeKind::OrderedSet(items)
            | NodeKind::Negation(items)
            | NodeKind::Substring(items)
            | NodeKind::Range { bounds: items, .. } => out.extend(items.iter().copied()),
            NodeKind::Comparison { lhs, rhs, .. } => out.extend([*lhs, *rhs]),
            NodeKind::Area(nav) => out.extend(nav.data),
            NodeKind::Cond {
                selector,
                alternatives,
            } => {
                out.push(*selector);
                for (on, use_) in alternatives {
                    out.extend([*on, *use_]);
                }
            }
        }
        out
    }

    /// Visit every input slot mutably, in [`inputs`](NodeKind::inputs) order.
    pub fn for_each_input_mut(&mut self, mut f: impl FnMut(&mut NodeId)) {
        match self {
            NodeKind::Constant(_)
            | NodeKind::Storage(_)
            | NodeKind::Closure { .. }
            | NodeKind::Placeholder { .. }
            | NodeKind::CycleSentinel => {}
            NodeKind::AttributeSet(pairs) => pairs.iter_mut().for_each(|(_, id)| f(id)),
            NodeKind::BoolGate { guard, on_true } => {
                f(guard);
                f(on_true);
            }
            NodeKind::BoolMatch {
                guard,
                pattern,
                on_match,
            } => {
                f(guard);
                f(pattern);
                f(on_match);
            }
            NodeKind::QualifierSet(guards) => {
                for guard in guards.iter_mut() {
                    guard.nodes_mut().for_each(&mut f);
                }
            }
            NodeKind::Variant {
                qualifiers,
                alternatives,
            } => {
                f(qualifiers);
                alternatives.iter_mut().for_each(f);
            }
            NodeKind::Apply { function, args } => {
                if let Function::Closure(node) = function {
                    f(node);
                }
                args.iter_mut().for_each(f);
            }
            NodeKind::ClassMembership { area, .. } | NodeKind::Geometry { area, .. } => f(area),
            NodeKind::Sort { data, keys, .. } => {
                f(data);
                keys.iter_mut().for_each(f);
            }
            NodeKind::QueryApply { query, data } => {
                f(query);
                f(data);
            }
            NodeKind::Project { data, .. } => f(data),
            NodeKind::OrderedSet(items)
            | NodeKind::Negation(items)
            | NodeKind::Substring(items)
            | NodeKind::Range { bounds: items, .. } => items.iter_mut().for_each(f),
            NodeKind::Comparison { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            NodeKind::Area(nav) => {
                if let Some(data) = &mut nav.data {
                    f(data);
                }
            }
            NodeKind::Cond {
                selector,
                alternatives,
            } => {
                f(selector);
                for (on, use_) in alternatives.iter_mut() {
                    f(on);
                    f(use_);
                }
            }
        }
    }

    /// Restore canonical order after inputs were remapped.
    pub(crate) fn normalize(&mut self) {
        if let NodeKind::QualifierSet(guards) = self {
            for guard in guards.iter_mut() {
                guard.normalize();
            }
        }
    }

    /// Structural equality used by the cache.
    ///
    /// Ordered sets, ranges, negations and substrings compare their inputs
    /// as multisets; comparisons and everything else are order-sensitive.
    /// Closures compare by closure id and parameters, never by body.
    pub fn same_content(&self, other: &NodeKind) -> bool {
        match (self, other) {
            (NodeKind::OrderedSet(a), NodeKind::OrderedSet(b))
            | (NodeKind::Negation(a), NodeKind::Negation(b))
            | (NodeKind::Substring(a), NodeKind::Substring(b)) => same_multiset(a, b),
            (
                NodeKind::Range {
                    bounds: a,
                    closed_low: al,
                    closed_high: ah,
                },
                NodeKind::Range {
                    bounds: b,
                    closed_low: bl,
                    closed_high: bh,
                },
            ) => al == bl && ah == bh && same_multiset(a, b),
            (
                NodeKind::Closure {
                    closure: a,
                    params: pa,
                    ..
                },
                NodeKind::Closure {
                    closure: b,
                    params: pb,
                    ..
                },
            ) => a == b && pa == pb,
            // Placeholders and sentinels are never shared.
            (NodeKind::Placeholder { .. }, _) | (NodeKind::CycleSentinel, _) => false,
            _ => self == other,
        }
    }

    /// Hash consistent with [`same_content`](NodeKind::same_content).
    pub fn fingerprint(&self) -> u64 {
        let mut h = FxHasher::default();
        std::mem::discriminant(self).hash(&mut h);
        match self {
            NodeKind::Constant(value) => value.hash(&mut h),
            NodeKind::Storage(cell) => cell.hash(&mut h),
            NodeKind::AttributeSet(pairs) => pairs.hash(&mut h),
            NodeKind::QualifierSet(guards) => guards.hash(&mut h),
            NodeKind::Apply { function, args } => {
                function.hash(&mut h);
                args.hash(&mut h);
            }
            NodeKind::ClassMembership { class: name, area }
            | NodeKind::Geometry { label: name, area } => {
                name.hash(&mut h);
                area.hash(&mut h);
            }
            NodeKind::Sort {
                data,
                keys,
                ascending,
            } => {
                data.hash(&mut h);
                keys.hash(&mut h);
                ascending.hash(&mut h);
            }
            NodeKind::Project { path, data } => {
                path.hash(&mut h);
                data.hash(&mut h);
            }
            NodeKind::OrderedSet(items) | NodeKind::Negation(items) | NodeKind::Substring(items) => {
                sorted(items).hash(&mut h);
            }
            NodeKind::Range {
                bounds,
                closed_low,
                closed_high,
            } => {
                sorted(bounds).hash(&mut h);
                closed_low.hash(&mut h);
                closed_high.hash(&mut h);
            }
            NodeKind::Comparison { op, lhs, rhs } => {
                op.hash(&mut h);
                lhs.hash(&mut h);
                rhs.hash(&mut h);
            }
            NodeKind::Area(nav) => nav.hash(&mut h),
            NodeKind::Closure {
                closure, params, ..
            } => {
                closure.hash(&mut h);
                params.hash(&mut h);
            }
            NodeKind::BoolGate { .. }
            | NodeKind::BoolMatch { .. }
            | NodeKind::Variant { .. }
            | NodeKind::QueryApply { .. }
            | NodeKind::Cond { .. }
            | NodeKind::Placeholder { .. }
            | NodeKind::CycleSentinel => self.inputs().hash(&mut h),
        }
        h.finish()
    }

    /// Priority class the kind asks for on its own.
    pub fn intrinsic_priority(&self) -> Priority {
        match self {
            NodeKind::Area(AreaNav {
                op: AreaOp::Children(_),
                ..
            }) => Priority::AREA_SET,
            _ => Priority::DEFAULT,
        }
    }

    /// Whether the node's priority may be raised to satisfy a dependent.
    /// Storage is updated by the runtime in the default phase and closures
    /// are evaluated on application.
    pub fn can_raise_priority(&self) -> bool {
        !matches!(
            self,
            NodeKind::Storage(_)
                | NodeKind::Closure { .. }
                | NodeKind::Placeholder { .. }
                | NodeKind::CycleSentinel
        )
    }

    /// Static value type from the input types (in `inputs` order).
    pub fn derive_value_type(&self, inputs: &[ValueType]) -> ValueType {
        let merge_all = |types: &[ValueType]| {
            types
                .iter()
                .fold(ValueType::unknown(), |acc, ty| acc.merge(ty))
        };
        match self {
            NodeKind::Constant(value) => value.value_type(),
            NodeKind::Storage(_) | NodeKind::QueryApply { .. } | NodeKind::Project { .. } => {
                ValueType::any()
            }
            NodeKind::AttributeSet(_) | NodeKind::Geometry { .. } => {
                ValueType::single(ValueKinds::ATTRIBUTE_VALUE)
            }
            NodeKind::BoolGate { .. } => inputs
                .get(1)
                .map_or(ValueType::any(), |ty| ty.merge(&ValueType::empty())),
            NodeKind::BoolMatch { .. } => inputs
                .get(2)
                .map_or(ValueType::any(), |ty| ty.merge(&ValueType::empty())),
            NodeKind::QualifierSet(_) => ValueType::of(ValueKinds::BOOLEAN, Cardinality::ANY),
            NodeKind::Variant { .. } => merge_all(inputs.get(1..).unwrap_or_default())
                .merge(&ValueType::empty()),
            NodeKind::Apply { function, .. } => match function {
                Function::Builtin(b) => b.info().result,
                Function::Closure(_) => ValueType::any(),
            },
            NodeKind::ClassMembership { .. } | NodeKind::Area(_) => {
                ValueType::of(ValueKinds::AREA, Cardinality::ANY)
            }
            NodeKind::Sort { .. } => inputs.first().copied().unwrap_or_else(ValueType::any),
            NodeKind::OrderedSet(_) => inputs
                .iter()
                .fold(ValueType::of(ValueKinds::empty(), Cardinality::ZERO), |acc, ty| {
                    let kinds = acc.kinds() | ty.kinds();
                    ValueType::of(kinds, acc.cardinality().concat(ty.cardinality()))
                }),
            NodeKind::Range { .. } => ValueType::single(ValueKinds::RANGE),
            NodeKind::Negation(_) => ValueType::single(ValueKinds::NEGATION),
            NodeKind::Substring(_) => ValueType::single(ValueKinds::STRING),
            NodeKind::Comparison { .. } => ValueType::single(ValueKinds::BOOLEAN),
            NodeKind::Cond { .. } => {
                let uses: Vec<ValueType> = inputs.iter().skip(2).step_by(2).copied().collect();
                merge_all(&uses).merge(&ValueType::empty())
            }
            NodeKind::Closure { .. } => ValueType::single(ValueKinds::DEFUN),
            NodeKind::Placeholder { .. } | NodeKind::CycleSentinel => ValueType::unknown(),
        }
    }
}

fn sorted(items: &[NodeId]) -> SmallVec<[NodeId; 4]> {
    let mut out: SmallVec<[NodeId; 4]> = items.iter().copied().collect();
    out.sort_unstable();
    out
}

fn same_multiset(a: &[NodeId], b: &[NodeId]) -> bool {
    a.len() == b.len() && sorted(a) == sorted(b)
}

/// A graph node.
#[derive(Clone, Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub pos: CachePos,
    /// Scope the node was requested in; the final scope is the least upper
    /// bound of this and the input scopes.
    pub base_scope: Scope,
    pub scope: Scope,
    pub step: u32,
    pub priority: Priority,
    pub value_type: ValueType,
    pub flags: NodeFlags,
    pub origin: Option<Origin>,
}

impl Node {
    pub fn new(kind: NodeKind, scope: Scope, origin: Option<Origin>) -> Self {
        let flags = if matches!(kind, NodeKind::Constant(_)) {
            NodeFlags::CONSTANT
        } else {
            NodeFlags::empty()
        };
        let pos = if matches!(kind, NodeKind::Placeholder { .. }) {
            CachePos::Placeholder
        } else {
            CachePos::Uncached
        };
        Node {
            priority: kind.intrinsic_priority(),
            kind,
            pos,
            base_scope: scope,
            scope,
            step: 0,
            value_type: ValueType::unknown(),
            flags,
            origin,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self.pos, CachePos::Cached(_))
    }

    pub fn is_constant(&self) -> bool {
        self.flags.contains(NodeFlags::CONSTANT)
    }

    pub fn is_pending(&self) -> bool {
        self.flags.contains(NodeFlags::PENDING)
    }
}

#[cfg(test)]
mod tests;
