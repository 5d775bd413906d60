//! Graph construction for the Arbor compiler.
//!
//! This crate turns a declarative program into a hash-consed expression
//! graph:
//!
//! - **Hash-consing** ([`GraphBuilder::internalize`]): every node is unique
//!   per scope, so id equality stands in for structural equality. Lookups
//!   only scan cache entries above the node's input watermark.
//!
//! - **Cycle probing and repair**: internalization walks inputs post-order
//!   on a probe stack. A self-referential variant is rebuilt with its
//!   alternatives specialized under their guards; a cycle that survives is
//!   reported once with its probe trace.
//!
//! - **Qualifier algebra** ([`Guard`], [`Conjunction`], [`Qualifier`]) and
//!   variant specialization ([`GraphBuilder::pick_qualified_expression`]).
//!
//! - **Scheduling**: each node gets a step within its priority class.
//!
//! - **Write-reachability** ([`GraphBuilder::mark_writable_path`],
//!   [`GraphBuilder::extract_writable_destinations`]): which storage cells an
//!   assignment lands on, at which attribute path, under which conditions.
//!
//! - **Export** ([`ExportedGraph`]): per-scope node arrays with inputs
//!   referenced by `(level, cache id)`.
//!
//! - **Lowering** ([`lower_program`]): from the pre-IR source tree.
//!
//! # Crate Dependencies
//!
//! `arbor_graph` depends on `arbor_ir` (names, values, scopes, the value-type
//! lattice) and `arbor_diagnostic` (error codes and the diagnostic queue).

mod builder;
mod cache;
mod config;
mod error;
pub mod export;
mod fold;
pub mod function;
pub mod graph;
pub mod lower;
pub mod node;
mod probe;
pub mod qualifier;
mod schedule;
mod stack;
mod variant;
pub mod write;

#[cfg(test)]
mod test_helpers;

use arbor_diagnostic::Diagnostic;
use arbor_ir::{Name, ScopeTree, StringInterner, TemplateId};

pub use builder::{BuildStats, GraphBuilder, Write};
pub use config::BuilderConfig;
pub use error::{render_trace, BuildError, CycleSignal, Interrupt, TraceEntry};
pub use export::{ExportArg, ExportedDestination, ExportedGraph, ExportedNode, ExportedScope, ExportedWrite};
pub use function::{Builtin, Function, FunctionInfo};
pub use graph::{Graph, ScopeCache};
pub use lower::lower_program;
pub use node::{
    AreaNav, AreaOp, CacheId, CachePos, Node, NodeFlags, NodeId, NodeKind, Priority, StorageCell,
};
pub use qualifier::{Conjunction, Guard, Knowledge, Qualifier, QualifierValue, Truth};
pub use stack::ensure_sufficient_stack;
pub use write::{GuardTerm, ResolvedWrite, WriteDestination};

/// The result of a successful compilation pass.
#[derive(Debug)]
pub struct CompiledGraph {
    pub graph: Graph,
    pub scopes: ScopeTree,
    /// Context attribute definitions, in definition order.
    pub context: Vec<(TemplateId, Name, NodeId)>,
    /// Writes that reach at least one storage cell.
    pub writes: Vec<ResolvedWrite>,
    /// Warnings raised during the pass.
    pub diagnostics: Vec<Diagnostic>,
    pub stats: BuildStats,
}

impl CompiledGraph {
    pub fn node(&self, id: NodeId) -> &Node {
        self.graph.node(self.graph.resolve(id))
    }

    /// The node defining a context attribute.
    pub fn attribute(&self, template: TemplateId, name: Name) -> Option<NodeId> {
        self.context
            .iter()
            .find(|(t, n, _)| *t == template && *n == name)
            .map(|(_, _, node)| self.graph.resolve(*node))
    }

    pub fn export(&self, interner: &StringInterner) -> ExportedGraph {
        export::export(self, interner)
    }
}

/// A pass that raised at least one error.
#[derive(Clone, Debug, thiserror::Error)]
#[error("graph construction failed with {} error(s)", self.error_count())]
pub struct CompileFailure {
    /// Every diagnostic of the pass, warnings included.
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileFailure {
    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    pub fn codes(&self) -> Vec<arbor_diagnostic::ErrorCode> {
        self.diagnostics.iter().map(|d| d.code).collect()
    }
}
