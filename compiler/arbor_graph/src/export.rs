//! Export form of a compiled graph.
//!
//! Each scope exports its cached nodes in cache order. A node is a call
//! `op(args..)` with a fixed arity per kind; inputs are referenced by
//! `(level, id)`, where `level` is how many scopes out from the node's own
//! scope the input lives and `id` its cache position there. Closure
//! parameters and bodies live in an inner scope and are referenced
//! absolutely.
//!
//! Text form:
//!
//! ```text
//! scope t0 depth 1
//!   ctx open = #0
//!   #0 = storage(plain, open, none) step 0 prio 0
//!   #1 = bool(#0, ^1#4) step 1 prio 0
//! ```

use std::fmt::{self, Write as _};

use arbor_ir::{Scope, StringInterner};

use crate::node::{AreaOp, CacheId, NodeKind};
use crate::qualifier::Guard;
use crate::write::{GuardTerm, WriteDestination};
use crate::{CompiledGraph, Function, NodeId};

/// An argument of an exported node.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum ExportArg {
    /// Input `level` scopes out, at cache position `id`.
    Ref { level: u32, id: u32 },
    /// Input in the given scope, at cache position `id`.
    Abs {
        template: Option<u32>,
        closure: Option<u32>,
        id: u32,
    },
    None,
    Int(i64),
    Bool(bool),
    Name(String),
    Text(String),
    /// A rendered constant value.
    Value(String),
    List(Vec<ExportArg>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct ExportedNode {
    pub id: u32,
    pub op: String,
    pub args: Vec<ExportArg>,
    pub step: u32,
    pub priority: u8,
    pub flags: u8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct ExportedScope {
    pub template: Option<u32>,
    pub closure: Option<u32>,
    pub depth: u32,
    pub nodes: Vec<ExportedNode>,
    /// Context attributes defined in this template.
    pub context: Vec<(String, ExportArg)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct ExportedDestination {
    pub storage: ExportArg,
    pub path: Vec<String>,
    pub guard: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct ExportedWrite {
    pub origin: Option<u32>,
    pub target: ExportArg,
    pub value: ExportArg,
    pub destinations: Vec<ExportedDestination>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct ExportedGraph {
    /// Sorted by depth, then scope.
    pub scopes: Vec<ExportedScope>,
    pub writes: Vec<ExportedWrite>,
}

impl ExportedGraph {
    pub fn scope(&self, template: Option<u32>, closure: Option<u32>) -> Option<&ExportedScope> {
        self.scopes
            .iter()
            .find(|s| s.template == template && s.closure == closure)
    }

    pub fn node_count(&self) -> usize {
        self.scopes.iter().map(|s| s.nodes.len()).sum()
    }

    #[cfg(feature = "cache")]
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    #[cfg(feature = "cache")]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

struct Exporter<'a> {
    compiled: &'a CompiledGraph,
    interner: &'a StringInterner,
}

impl Exporter<'_> {
    fn name(&self, name: arbor_ir::Name) -> String {
        self.interner.lookup(name).to_owned()
    }

    /// Reference to `input` from a node in `from`.
    fn reference(&self, from: Scope, input: NodeId) -> ExportArg {
        let graph = &self.compiled.graph;
        let node = graph.node(graph.resolve(input));
        let Some(id) = node.pos.cache_id() else {
            return ExportArg::None;
        };
        let scopes = &self.compiled.scopes;
        if scopes.nests(from, node.scope) {
            ExportArg::Ref {
                level: scopes.depth(from) - scopes.depth(node.scope),
                id: id.raw(),
            }
        } else {
            absolute(node.scope, id)
        }
    }

    fn absolute(&self, input: NodeId) -> ExportArg {
        let graph = &self.compiled.graph;
        let node = graph.node(graph.resolve(input));
        node.pos
            .cache_id()
            .map_or(ExportArg::None, |id| absolute(node.scope, id))
    }

    fn refs(&self, from: Scope, inputs: &[NodeId]) -> ExportArg {
        ExportArg::List(inputs.iter().map(|i| self.reference(from, *i)).collect())
    }

    fn node(&self, scope: Scope, cache_id: CacheId, id: NodeId) -> ExportedNode {
        let node = self.compiled.graph.node(id);
        let r = |input: &NodeId| self.reference(scope, *input);
        let args = match &node.kind {
            NodeKind::Constant(value) => vec![ExportArg::Value(value.display(self.interner).to_string())],
            NodeKind::Storage(cell) => vec![
                ExportArg::Name(cell.kind.as_str().to_owned()),
                ExportArg::Name(self.name(cell.label)),
                cell.initial.as_ref().map_or(ExportArg::None, |v| {
                    ExportArg::Value(v.display(self.interner).to_string())
                }),
            ],
            NodeKind::AttributeSet(pairs) => vec![ExportArg::List(
                pairs
                    .iter()
                    .map(|(name, value)| {
                        ExportArg::List(vec![ExportArg::Name(self.name(*name)), r(value)])
                    })
                    .collect(),
            )],
            NodeKind::BoolGate { guard, on_true } => vec![r(guard), r(on_true)],
            NodeKind::BoolMatch {
                guard,
                pattern,
                on_match,
            } => vec![r(guard), r(pattern), r(on_match)],
            NodeKind::QualifierSet(guards) => {
                let mut nodes: Vec<NodeId> = Vec::new();
                for node in guards.iter().flat_map(Guard::nodes) {
                    if !nodes.contains(&node) {
                        nodes.push(node);
                    }
                }
                vec![
                    ExportArg::List(
                        guards
                            .iter()
                            .map(|g| ExportArg::Text(g.display(self.interner, &nodes).to_string()))
                            .collect(),
                    ),
                    self.refs(scope, &nodes),
                ]
            }
            NodeKind::Variant {
                qualifiers,
                alternatives,
            } => vec![r(qualifiers), self.refs(scope, alternatives)],
            NodeKind::Apply { function, args } => {
                let function = match function {
                    Function::Builtin(builtin) => ExportArg::Name(builtin.name().to_owned()),
                    Function::Closure(node) => r(node),
                };
                vec![function, self.refs(scope, args)]
            }
            NodeKind::ClassMembership { class: name, area }
            | NodeKind::Geometry { label: name, area } => {
                vec![ExportArg::Name(self.name(*name)), r(area)]
            }
            NodeKind::Sort {
                data,
                keys,
                ascending,
            } => vec![r(data), self.refs(scope, keys), ExportArg::Bool(*ascending)],
            NodeKind::QueryApply { query, data } => vec![r(query), r(data)],
            NodeKind::Project { path, data } => vec![
                ExportArg::List(path.iter().map(|n| ExportArg::Name(self.name(*n))).collect()),
                r(data),
            ],
            NodeKind::OrderedSet(items) | NodeKind::Negation(items) | NodeKind::Substring(items) => {
                vec![self.refs(scope, items)]
            }
            NodeKind::Range {
                bounds,
                closed_low,
                closed_high,
            } => vec![
                self.refs(scope, bounds),
                ExportArg::Bool(*closed_low),
                ExportArg::Bool(*closed_high),
            ],
            NodeKind::Comparison { op, lhs, rhs } => {
                vec![ExportArg::Name(op.as_str().to_owned()), r(lhs), r(rhs)]
            }
            NodeKind::Area(nav) => {
                let op = match nav.op {
                    AreaOp::Me => "me".to_owned(),
                    AreaOp::Embedding => "embedding".to_owned(),
                    AreaOp::Children(name) => format!("children.{}", self.name(name)),
                    AreaOp::Project(export) => match self.compiled.scopes.export_name(export) {
                        Some(name) => format!("project.{}", self.name(name)),
                        None => format!("project.{export}"),
                    },
                };
                vec![
                    ExportArg::Name(op),
                    nav.data.as_ref().map_or(ExportArg::None, r),
                    ExportArg::List(
                        nav.templates
                            .iter()
                            .map(|t| ExportArg::Int(i64::from(t.raw())))
                            .collect(),
                    ),
                ]
            }
            NodeKind::Cond {
                selector,
                alternatives,
            } => vec![
                r(selector),
                ExportArg::List(
                    alternatives
                        .iter()
                        .map(|(on, use_)| ExportArg::List(vec![r(on), r(use_)]))
                        .collect(),
                ),
            ],
            NodeKind::Closure {
                closure,
                params,
                body,
            } => vec![
                ExportArg::Int(i64::from(closure.raw())),
                ExportArg::List(params.iter().map(|p| self.absolute(*p)).collect()),
                body.map_or(ExportArg::None, |b| self.absolute(b)),
            ],
            NodeKind::Placeholder { .. } | NodeKind::CycleSentinel => Vec::new(),
        };
        ExportedNode {
            id: cache_id.raw(),
            op: node.kind.name().to_owned(),
            args,
            step: node.step,
            priority: node.priority.0,
            flags: node.flags.bits(),
        }
    }

    fn guard_term(&self, term: &GuardTerm) -> String {
        match term {
            GuardTerm::Truthy(node) => format!("truthy({})", self.absolute(*node)),
            GuardTerm::Falsy(node) => format!("falsy({})", self.absolute(*node)),
            GuardTerm::Matches { selector, pattern } => format!(
                "matches({}, {})",
                self.absolute(*selector),
                self.absolute(*pattern)
            ),
            GuardTerm::Qualified(guard) => guard.display(self.interner, &[]).to_string(),
        }
    }

    fn destination(&self, destination: &WriteDestination) -> ExportedDestination {
        ExportedDestination {
            storage: self.absolute(destination.storage),
            path: destination.path.iter().map(|n| self.name(*n)).collect(),
            guard: destination
                .guard
                .iter()
                .map(|term| self.guard_term(term))
                .collect(),
        }
    }

    fn export(&self) -> ExportedGraph {
        let scopes = &self.compiled.scopes;
        let mut order: Vec<Scope> = self.compiled.graph.scopes().map(|(s, _)| s).collect();
        for (template, _, _) in &self.compiled.context {
            let scope = Scope::template(*template);
            if !order.contains(&scope) {
                order.push(scope);
            }
        }
        order.sort_by_key(|s| (scopes.depth(*s), *s));

        let exported = order
            .into_iter()
            .map(|scope| {
                let nodes = self
                    .compiled
                    .graph
                    .cache(scope)
                    .map(|cache| {
                        cache
                            .entries()
                            .iter()
                            .enumerate()
                            .map(|(i, id)| {
                                #[expect(
                                    clippy::cast_possible_truncation,
                                    reason = "cache size is bounded by the program size"
                                )]
                                let cache_id = CacheId::new(i as u32);
                                self.node(scope, cache_id, *id)
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let context = self
                    .compiled
                    .context
                    .iter()
                    .filter(|(t, _, _)| scope.closure.is_none() && scope.template == Some(*t))
                    .map(|(_, name, node)| (self.name(*name), self.reference(scope, *node)))
                    .collect();
                ExportedScope {
                    template: scope.template.map(|t| t.raw()),
                    closure: scope.closure.map(|c| c.raw()),
                    depth: scopes.depth(scope),
                    nodes,
                    context,
                }
            })
            .collect();

        let writes = self
            .compiled
            .writes
            .iter()
            .map(|write| ExportedWrite {
                origin: write.origin.map(|o| o.raw()),
                target: self.absolute(write.target),
                value: self.absolute(write.value),
                destinations: write
                    .destinations
                    .iter()
                    .map(|d| self.destination(d))
                    .collect(),
            })
            .collect();

        ExportedGraph {
            scopes: exported,
            writes,
        }
    }
}

fn absolute(scope: Scope, id: CacheId) -> ExportArg {
    ExportArg::Abs {
        template: scope.template.map(|t| t.raw()),
        closure: scope.closure.map(|c| c.raw()),
        id: id.raw(),
    }
}

pub(crate) fn export(compiled: &CompiledGraph, interner: &StringInterner) -> ExportedGraph {
    Exporter { compiled, interner }.export()
}

impl fmt::Display for ExportArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportArg::Ref { level: 0, id } => write!(f, "#{id}"),
            ExportArg::Ref { level, id } => write!(f, "^{level}#{id}"),
            ExportArg::Abs {
                template,
                closure,
                id,
            } => {
                f.write_char('@')?;
                match template {
                    Some(t) => write!(f, "t{t}")?,
                    None => f.write_str("global")?,
                }
                if let Some(c) = closure {
                    write!(f, "/c{c}")?;
                }
                write!(f, "#{id}")
            }
            ExportArg::None => f.write_str("none"),
            ExportArg::Int(n) => write!(f, "{n}"),
            ExportArg::Bool(b) => write!(f, "{b}"),
            ExportArg::Name(name) | ExportArg::Value(name) => f.write_str(name),
            ExportArg::Text(text) => write!(f, "{text:?}"),
            ExportArg::List(items) => {
                f.write_char('[')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_char(']')
            }
        }
    }
}

impl fmt::Display for ExportedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} = {}(", self.id, self.op)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ") step {} prio {}", self.step, self.priority)?;
        if self.flags != 0 {
            write!(f, " flags {:#04x}", self.flags)?;
        }
        Ok(())
    }
}

impl fmt::Display for ExportedGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for scope in &self.scopes {
            match (scope.template, scope.closure) {
                (None, None) => f.write_str("scope global")?,
                (Some(t), None) => write!(f, "scope t{t}")?,
                (None, Some(c)) => write!(f, "scope global/c{c}")?,
                (Some(t), Some(c)) => write!(f, "scope t{t}/c{c}")?,
            }
            writeln!(f, " depth {}", scope.depth)?;
            for (name, arg) in &scope.context {
                writeln!(f, "  ctx {name} = {arg}")?;
            }
            for node in &scope.nodes {
                writeln!(f, "  {node}")?;
            }
        }
        for write in &self.writes {
            match write.origin {
                Some(origin) => write!(f, "write #{origin}: ")?,
                None => f.write_str("write: ")?,
            }
            writeln!(f, "{} <- {}", write.target, write.value)?;
            for destination in &write.destinations {
                write!(f, "  -> {}", destination.storage)?;
                for segment in &destination.path {
                    write!(f, ".{segment}")?;
                }
                if !destination.guard.is_empty() {
                    write!(f, " if {}", destination.guard.join(" && "))?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
