//! The graph builder.
//!
//! [`GraphBuilder`] owns everything one compilation pass mutates: the node
//! arena with its per-scope caches, the scope registry, the probe stack,
//! the diagnostic queue and the write-analysis marks. Constructors build a
//! node and internalize it right away unless one of its inputs is still a
//! forward reference or under construction, in which case the node stays
//! pending until something internalizes it.
//!
//! The algorithms are split by concern across sibling modules, each adding
//! an `impl GraphBuilder` block:
//!
//! - `cache`: internalization, cycle probing and variant repair
//! - `schedule`: schedule steps and priority classes
//! - `fold`: constant folding per kind
//! - `variant`: variant normalization and qualifier specialization
//! - `write`: write-reachability and destination extraction

use rustc_hash::{FxHashMap, FxHashSet};

use arbor_diagnostic::{Diagnostic, DiagnosticQueue, ErrorCode};
use arbor_ir::{
    ClosureId, ConstValue, Name, Origin, Scope, ScopeTree, StorageKind, TemplateId,
};

use crate::config::BuilderConfig;
use crate::error::{BuildError, TraceEntry};
use crate::function::Function;
use crate::graph::Graph;
use crate::node::{AreaNav, AreaOp, CachePos, Node, NodeFlags, NodeKind, StorageCell};
use crate::probe::ProbeStack;
use crate::qualifier::Knowledge;
use crate::write::{ResolvedWrite, WriteMark};
use crate::{CompileFailure, CompiledGraph, NodeId};

/// An assignment recorded during construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Write {
    pub target: NodeId,
    pub value: NodeId,
    pub origin: Option<Origin>,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct ContextSlot {
    /// The placeholder handed out before the definition, or the definition.
    pub node: NodeId,
    pub defined: bool,
}

/// Counters reported at the end of a pass.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Nodes that got a cache position.
    pub cached: usize,
    /// Internalizations answered by an existing equal node.
    pub hits: usize,
    /// Cache entries compared against during dedup.
    pub scanned: usize,
    /// Nodes replaced by constant folding or normalization.
    pub folded: usize,
    /// Variants rebuilt to break a cycle.
    pub repaired: usize,
}

pub struct GraphBuilder {
    pub(crate) graph: Graph,
    pub(crate) scopes: ScopeTree,
    pub(crate) config: BuilderConfig,
    pub(crate) diagnostics: DiagnosticQueue,
    pub(crate) probe: ProbeStack,
    /// Set while a repaired variant is internalized; cycles are fatal then.
    pub(crate) repairing: bool,
    /// Current compilation pass. Write marks from older passes are stale.
    pub(crate) generation: u32,
    pub(crate) context: FxHashMap<(TemplateId, Name), ContextSlot>,
    /// Context attribute definitions in definition order.
    pub(crate) definitions: Vec<(TemplateId, Name)>,
    pub(crate) writes: Vec<Write>,
    /// Closures whose body is being built.
    pub(crate) closure_bodies: FxHashSet<ClosureId>,
    pub(crate) specialized: FxHashMap<(NodeId, Knowledge), NodeId>,
    pub(crate) specializing: FxHashSet<(NodeId, Knowledge)>,
    pub(crate) write_marks: Vec<WriteMark>,
    reported_cycles: FxHashSet<Option<Origin>>,
    pub(crate) stats: BuildStats,
    next_cell: u32,
}

impl GraphBuilder {
    pub fn new(scopes: ScopeTree, config: BuilderConfig) -> Self {
        let diagnostics = DiagnosticQueue::with_config(config.diagnostics.clone());
        GraphBuilder {
            graph: Graph::new(),
            scopes,
            config,
            diagnostics,
            probe: ProbeStack::default(),
            repairing: false,
            generation: 1,
            context: FxHashMap::default(),
            definitions: Vec::new(),
            writes: Vec::new(),
            closure_bodies: FxHashSet::default(),
            specialized: FxHashMap::default(),
            specializing: FxHashSet::default(),
            write_marks: Vec::new(),
            reported_cycles: FxHashSet::default(),
            stats: BuildStats::default(),
            next_cell: 0,
        }
    }

    // Accessors

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn scopes(&self) -> &ScopeTree {
        &self.scopes
    }

    pub fn scopes_mut(&mut self) -> &mut ScopeTree {
        &mut self.scopes
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> &DiagnosticQueue {
        &self.diagnostics
    }

    pub fn stats(&self) -> BuildStats {
        self.stats
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn node(&self, id: NodeId) -> &Node {
        self.graph.node(self.graph.resolve(id))
    }

    pub fn resolve(&self, id: NodeId) -> NodeId {
        self.graph.resolve(id)
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    // Construction

    /// Build a node and internalize it, or leave it pending if an input is
    /// not cached yet. Returns the live node for the request.
    pub fn add(
        &mut self,
        kind: NodeKind,
        scope: Scope,
        origin: Option<Origin>,
    ) -> Result<NodeId, BuildError> {
        self.scopes
            .check(scope)
            .map_err(|error| BuildError::Scope { error, origin })?;
        let bookkeeping = matches!(
            kind,
            NodeKind::Placeholder { .. } | NodeKind::CycleSentinel
        );
        let id = self.graph.push(Node::new(kind, scope, origin));
        if bookkeeping {
            return Ok(id);
        }
        self.settle(id)
    }

    fn settle(&mut self, id: NodeId) -> Result<NodeId, BuildError> {
        let ready = self
            .graph
            .node(id)
            .kind
            .inputs()
            .iter()
            .all(|input| self.graph.node(self.graph.resolve(*input)).is_cached());
        if ready {
            self.internalize(id)
        } else {
            self.graph.node_mut(id).flags |= NodeFlags::PENDING;
            tracing::trace!(node = %id, "pending on an unresolved input");
            Ok(id)
        }
    }

    /// A constant. Constants live in the global scope.
    pub fn constant(&mut self, value: ConstValue) -> Result<NodeId, BuildError> {
        self.add(NodeKind::Constant(value), Scope::GLOBAL, None)
    }

    pub fn empty(&mut self) -> Result<NodeId, BuildError> {
        self.constant(ConstValue::Empty)
    }

    /// A fresh storage cell. Two cells never share a node.
    pub fn storage(
        &mut self,
        kind: StorageKind,
        label: Name,
        initial: Option<ConstValue>,
        scope: Scope,
        origin: Option<Origin>,
    ) -> Result<NodeId, BuildError> {
        let cell = self.next_cell;
        self.next_cell += 1;
        self.add(
            NodeKind::Storage(StorageCell {
                kind,
                label,
                cell,
                initial,
            }),
            scope,
            origin,
        )
    }

    /// Attribute-value construction. Later duplicates of a name win.
    pub fn attribute_set(
        &mut self,
        pairs: impl IntoIterator<Item = (Name, NodeId)>,
        scope: Scope,
        origin: Option<Origin>,
    ) -> Result<NodeId, BuildError> {
        let mut sorted: Vec<(Name, NodeId)> = Vec::new();
        for (name, node) in pairs {
            match sorted.binary_search_by(|(n, _)| n.cmp(&name)) {
                Ok(pos) => sorted[pos].1 = node,
                Err(pos) => sorted.insert(pos, (name, node)),
            }
        }
        self.add(NodeKind::AttributeSet(sorted), scope, origin)
    }

    /// Function application. Builtins are checked for arity here.
    pub fn apply(
        &mut self,
        function: Function,
        args: Vec<NodeId>,
        scope: Scope,
        origin: Option<Origin>,
    ) -> Result<NodeId, BuildError> {
        if let Function::Builtin(builtin) = function {
            if !builtin.accepts(args.len()) {
                return Err(BuildError::Arity {
                    function: builtin.name(),
                    found: args.len(),
                    origin,
                });
            }
        }
        self.add(NodeKind::Apply { function, args }, scope, origin)
    }

    /// Area navigation. `templates` is sorted and deduplicated.
    pub fn area(
        &mut self,
        op: AreaOp,
        data: Option<NodeId>,
        mut templates: Vec<TemplateId>,
        scope: Scope,
        origin: Option<Origin>,
    ) -> Result<NodeId, BuildError> {
        templates.sort_unstable();
        templates.dedup();
        self.add(
            NodeKind::Area(AreaNav {
                op,
                data,
                templates,
            }),
            scope,
            origin,
        )
    }

    /// Templates the areas produced by `id` may belong to, if known.
    pub fn area_templates(&self, id: NodeId) -> Option<Vec<TemplateId>> {
        match self.graph.kind(id) {
            NodeKind::Area(nav) if !matches!(nav.op, AreaOp::Project(_)) => {
                Some(nav.templates.clone())
            }
            NodeKind::ClassMembership { area, .. } => self.area_templates(*area),
            _ => None,
        }
    }

    /// A closure over parameter cells created in the closure's scope.
    pub fn closure(
        &mut self,
        closure: ClosureId,
        params: Vec<NodeId>,
        scope: Scope,
        origin: Option<Origin>,
    ) -> Result<NodeId, BuildError> {
        self.add(
            NodeKind::Closure {
                closure,
                params,
                body: None,
            },
            scope,
            origin,
        )
    }

    // Closure bodies

    /// Mark the body of `closure_node` as being built.
    pub fn enter_closure_body(&mut self, closure_node: NodeId) -> Result<ClosureId, BuildError> {
        let node = self.node(closure_node);
        let origin = node.origin;
        let NodeKind::Closure { closure, .. } = node.kind else {
            return Err(BuildError::NotAClosure { origin });
        };
        if !self.closure_bodies.insert(closure) {
            return Err(BuildError::ReentrantClosureBody { closure, origin });
        }
        Ok(closure)
    }

    /// Attach a built body, or abandon it on error.
    pub fn exit_closure_body(
        &mut self,
        closure_node: NodeId,
        body: Result<NodeId, BuildError>,
    ) -> Result<NodeId, BuildError> {
        let closure_node = self.resolve(closure_node);
        if let NodeKind::Closure { closure, .. } = self.graph.node(closure_node).kind {
            self.closure_bodies.remove(&closure);
        }
        let body = body?;
        if let NodeKind::Closure { body: slot, .. } = &mut self.graph.node_mut(closure_node).kind {
            *slot = Some(body);
        }
        Ok(body)
    }

    /// Build the body of a closure once. The body is attached after the
    /// closure node itself is cached; asking for it again while `build`
    /// runs is an error.
    pub fn cache_closure_body(
        &mut self,
        closure_node: NodeId,
        build: impl FnOnce(&mut Self) -> Result<NodeId, BuildError>,
    ) -> Result<NodeId, BuildError> {
        if let NodeKind::Closure {
            body: Some(body), ..
        } = self.graph.kind(closure_node)
        {
            return Ok(*body);
        }
        self.enter_closure_body(closure_node)?;
        let body = build(self);
        self.exit_closure_body(closure_node, body)
    }

    // Context attributes

    /// The node of a template's context attribute. Before the attribute is
    /// defined this is a forward-reference placeholder.
    pub fn context_attribute(
        &mut self,
        template: TemplateId,
        name: Name,
    ) -> Result<NodeId, BuildError> {
        if let Some(slot) = self.context.get(&(template, name)) {
            return Ok(self.graph.resolve(slot.node));
        }
        self.scopes
            .template(template)
            .map_err(|error| BuildError::Scope {
                error,
                origin: None,
            })?;
        let placeholder = self.add(
            NodeKind::Placeholder { target: None },
            Scope::template(template),
            None,
        )?;
        self.context.insert(
            (template, name),
            ContextSlot {
                node: placeholder,
                defined: false,
            },
        );
        Ok(placeholder)
    }

    /// Define a context attribute, resolving its placeholder if one was
    /// handed out. A definition that resolves back to its own placeholder
    /// becomes a cycle sentinel.
    pub fn define_context_attribute(
        &mut self,
        template: TemplateId,
        name: Name,
        value: NodeId,
        origin: Option<Origin>,
    ) -> Result<NodeId, BuildError> {
        let key = (template, name);
        match self.context.get(&key).copied() {
            Some(slot) if slot.defined => {
                return Err(BuildError::DuplicateDefinition {
                    name,
                    template,
                    origin,
                });
            }
            Some(slot) => {
                let mut target = self.graph.resolve(value);
                if target == slot.node {
                    target = self.add(NodeKind::CycleSentinel, Scope::template(template), origin)?;
                }
                let placeholder = self.graph.node_mut(slot.node);
                placeholder.pos = CachePos::ResolvedPlaceholder(target);
                placeholder.kind = NodeKind::Placeholder {
                    target: Some(target),
                };
                self.context.insert(
                    key,
                    ContextSlot {
                        node: slot.node,
                        defined: true,
                    },
                );
            }
            None => {
                self.context.insert(
                    key,
                    ContextSlot {
                        node: value,
                        defined: true,
                    },
                );
            }
        }
        self.definitions.push(key);
        Ok(self.graph.resolve(value))
    }

    /// The defined node of a context attribute, if any.
    pub fn defined_attribute(&self, template: TemplateId, name: Name) -> Option<NodeId> {
        self.context
            .get(&(template, name))
            .filter(|slot| slot.defined)
            .map(|slot| self.graph.resolve(slot.node))
    }

    // Writes

    /// Record `target <- value`.
    pub fn add_write(&mut self, target: NodeId, value: NodeId, origin: Option<Origin>) {
        self.writes.push(Write {
            target,
            value,
            origin,
        });
    }

    // Diagnostics

    /// Queue a fatal error. A structural cycle is reported once per origin.
    pub fn report(&mut self, error: BuildError) {
        if matches!(error, BuildError::StructuralCycle { .. })
            && !self.reported_cycles.insert(error.origin())
        {
            return;
        }
        tracing::debug!(code = %error.code(), %error, "construction error");
        self.diagnostics.add(error.to_diagnostic());
    }

    pub(crate) fn warn(&mut self, code: ErrorCode, message: String, origin: Option<Origin>) {
        tracing::warn!(%code, origin = ?origin.map(Origin::raw), "{message}");
        self.diagnostics
            .add(Diagnostic::warning(code).with_message(message).with_origin(origin));
    }

    /// Replace every node of a failed cycle with a sentinel, so later
    /// references report the same cycle instead of probing it again.
    pub(crate) fn poison_cycle(&mut self, trace: &[TraceEntry], origin: Option<Origin>) {
        let Some(first) = trace.first() else {
            return;
        };
        let scope = self.graph.node(first.node).base_scope;
        let sentinel = self.graph.push(Node::new(NodeKind::CycleSentinel, scope, origin));
        for entry in trace {
            let node = self.graph.node_mut(entry.node);
            if matches!(node.pos, CachePos::Uncached | CachePos::Frozen) {
                node.pos = CachePos::Compacted(sentinel);
            }
        }
    }

    // Pass lifecycle

    /// Start a new pass: write marks of the previous pass become stale.
    pub fn begin_pass(&mut self) {
        self.generation += 1;
        tracing::debug!(generation = self.generation, "begin pass");
    }

    /// Internalize every definition and write, run write analysis and hand
    /// out the finished graph.
    pub fn finish(mut self) -> Result<CompiledGraph, CompileFailure> {
        for key in self.definitions.clone() {
            let Some(slot) = self.context.get(&key).copied() else {
                continue;
            };
            if let Err(error) = self.internalize(slot.node) {
                self.report(error);
            }
        }
        for i in 0..self.writes.len() {
            let Write {
                target,
                value,
                origin,
            } = self.writes[i].clone();
            let target = self.internalize(target).map_err(|e| e.or_origin(origin));
            let value = self.internalize(value).map_err(|e| e.or_origin(origin));
            match (target, value) {
                (Ok(target), Ok(value)) => {
                    self.writes[i] = Write {
                        target,
                        value,
                        origin,
                    };
                }
                (Err(error), _) | (_, Err(error)) => self.report(error),
            }
        }
        self.validate();

        self.begin_pass();
        let writes: Vec<ResolvedWrite> = if self.diagnostics.has_errors().is_some() {
            Vec::new()
        } else {
            self.analyze_writes()
        };

        tracing::debug!(
            nodes = self.graph.len(),
            cached = self.stats.cached,
            hits = self.stats.hits,
            scanned = self.stats.scanned,
            folded = self.stats.folded,
            repaired = self.stats.repaired,
            "graph construction finished"
        );

        if self.diagnostics.has_errors().is_some() {
            return Err(CompileFailure {
                diagnostics: self.diagnostics.flush(),
            });
        }
        let context = self
            .definitions
            .iter()
            .filter_map(|key| {
                self.context
                    .get(key)
                    .map(|slot| (key.0, key.1, self.graph.resolve(slot.node)))
            })
            .collect();
        Ok(CompiledGraph {
            graph: self.graph,
            scopes: self.scopes,
            context,
            writes,
            diagnostics: self.diagnostics.flush(),
            stats: self.stats,
        })
    }

    /// Every cached node must only reference cached nodes.
    fn validate(&mut self) {
        let mut broken = Vec::new();
        for (id, node) in self.graph.iter() {
            if !node.is_cached() {
                continue;
            }
            let dangling = node
                .kind
                .inputs()
                .iter()
                .any(|input| !self.graph.node(self.graph.resolve(*input)).is_cached());
            if dangling {
                broken.push((id, node.origin));
            }
        }
        for (id, origin) in broken {
            self.diagnostics.add(
                Diagnostic::error(ErrorCode::E9001)
                    .with_message(format!("cached node {id} references an uncached node"))
                    .with_origin(origin),
            );
        }
    }
}

#[cfg(test)]
mod tests;
