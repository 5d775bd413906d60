//! Internalization: hash-consing, cycle probing and variant repair.
//!
//! `intern` walks a node's inputs post-order, then computes the node's
//! scope, value type, fold and schedule, and finally probes the scope's
//! cache above the watermark for an equal node. While its inputs are
//! walked the node is frozen; reaching a frozen node again is a cycle.
//!
//! A cycle that runs through a variant may be repairable: the variant is
//! rebuilt with every alternative specialized under what its guard (and the
//! guards of earlier unmergeable alternatives) establishes, which usually
//! drops the self-reference. The signal travels as [`Interrupt::Cycle`]
//! up to the variant's own frame. The rebuilt variant is internalized with
//! repair disabled, so a cycle that survives is reported once.

use smallvec::SmallVec;

use arbor_ir::{Origin, Scope};

use crate::error::{BuildError, CycleSignal, Interrupt};
use crate::node::{CachePos, NodeFlags, NodeKind};
use crate::probe::{ProbeFrame, ProbeMode};
use crate::qualifier::{Guard, Knowledge};
use crate::stack::ensure_sufficient_stack;
use crate::{GraphBuilder, NodeId};

impl GraphBuilder {
    /// Internalize a node: return it with a cache position, or the cached
    /// node equal to it. Idempotent on cached nodes.
    pub fn internalize(&mut self, id: NodeId) -> Result<NodeId, BuildError> {
        let origin = self.graph.node(id).origin;
        match self.intern(id) {
            Ok(found) => Ok(found),
            Err(interrupt) => {
                let error = interrupt.into_fatal(origin);
                if let BuildError::StructuralCycle { trace, origin } = &error {
                    self.poison_cycle(trace, *origin);
                }
                Err(error)
            }
        }
    }

    pub(crate) fn intern(&mut self, id: NodeId) -> Result<NodeId, Interrupt> {
        let id = self.graph.resolve(id);
        let node = self.graph.node(id);
        match node.pos {
            CachePos::Cached(_) => return Ok(id),
            CachePos::Frozen => return Err(self.cycle_at(id)),
            CachePos::Placeholder => return Err(self.unresolved(id).into()),
            CachePos::Uncached | CachePos::Compacted(_) | CachePos::ResolvedPlaceholder(_) => {}
        }
        if matches!(node.kind, NodeKind::CycleSentinel) {
            return Err(Interrupt::Fatal(BuildError::StructuralCycle {
                trace: vec![crate::error::TraceEntry {
                    node: id,
                    kind: node.kind.name(),
                }],
                origin: node.origin,
            }));
        }

        self.graph.node_mut(id).pos = CachePos::Frozen;
        if let Err(error) = self.probe_enter(id, ProbeMode::Intern, 0) {
            self.graph.node_mut(id).pos = CachePos::Uncached;
            return Err(error.into());
        }
        let result = ensure_sufficient_stack(|| self.intern_frozen(id));
        self.probe.pop();

        match result {
            Ok(found) => Ok(found),
            Err(Interrupt::Cycle(signal)) if signal.variant == id => self.repair_variant(id, signal),
            Err(interrupt) => {
                let node = self.graph.node_mut(id);
                if node.pos == CachePos::Frozen {
                    node.pos = CachePos::Uncached;
                }
                Err(interrupt)
            }
        }
    }

    /// Push a probe frame, checking the stack for a repeating tail each time
    /// it grows by another `max_probe_depth` frames.
    pub(crate) fn probe_enter(
        &mut self,
        id: NodeId,
        mode: ProbeMode,
        salt: u64,
    ) -> Result<(), BuildError> {
        let node = self.graph.node(id);
        self.probe.push(ProbeFrame {
            node: id,
            kind: node.kind.name(),
            origin: node.origin,
            mode,
            fingerprint: node.kind.fingerprint() ^ salt,
        });
        let depth = self.probe.depth();
        let limit = self.config.max_probe_depth.max(1);
        if depth % limit != 0 {
            return Ok(());
        }
        let Some(len) = self.probe.repeating_tail(self.config.cycle_min_repeats) else {
            tracing::debug!(depth, "deep probe stack without a repeating tail");
            return Ok(());
        };
        let trace = self.probe.tail_trace(len);
        let origin = self.graph.node(id).origin;
        self.probe.pop();
        Err(BuildError::StructuralCycle { trace, origin })
    }

    fn intern_frozen(&mut self, id: NodeId) -> Result<NodeId, Interrupt> {
        let inputs = self.graph.node(id).kind.inputs();
        let mut resolved: SmallVec<[NodeId; 4]> = SmallVec::with_capacity(inputs.len());
        for input in inputs {
            resolved.push(self.intern(input)?);
        }

        let mut kind = self.graph.node(id).kind.clone();
        let mut slots = resolved.iter();
        kind.for_each_input_mut(|slot| {
            if let Some(input) = slots.next() {
                *slot = *input;
            }
        });
        kind.normalize();

        let node = self.graph.node(id);
        let origin = node.origin;
        let mut scope = node.base_scope;
        for input in &resolved {
            let input_scope = self.graph.node(*input).scope;
            scope = self
                .scopes
                .least_common_scope(scope, input_scope)
                .map_err(|error| BuildError::ScopeIncompatible { error, origin })?;
        }
        let input_types: SmallVec<[_; 4]> = resolved
            .iter()
            .map(|input| self.graph.node(*input).value_type)
            .collect();
        let value_type = kind.derive_value_type(&input_types);
        let fingerprint = kind.fingerprint();

        let node = self.graph.node_mut(id);
        node.kind = kind;
        node.scope = scope;
        node.value_type = value_type;
        node.flags.remove(NodeFlags::PENDING);

        if let Some(replacement) = self.fold(id)? {
            self.graph.node_mut(id).pos = CachePos::Compacted(replacement);
            self.stats.folded += 1;
            tracing::trace!(node = %id, replacement = %replacement, "folded");
            return Ok(replacement);
        }

        let watermark = resolved
            .iter()
            .map(|input| self.graph.node(*input))
            .filter(|input| input.scope == scope)
            .filter_map(|input| input.pos.cache_id())
            .max();
        let probe = self
            .graph
            .lookup(scope, watermark, fingerprint, &self.graph.node(id).kind);
        self.stats.scanned += probe.scanned;

        if let Some(found) = probe.found {
            let existing = self.graph.node(found).value_type;
            if !existing.is_equal_or_unknown(&value_type) {
                return Err(BuildError::ValueTypeMismatch {
                    node: found,
                    existing,
                    derived: value_type,
                    origin,
                }
                .into());
            }
            self.graph.node_mut(found).value_type = existing.merge(&value_type);
            self.graph.node_mut(id).pos = CachePos::Compacted(found);
            self.stats.hits += 1;
            tracing::trace!(node = %id, found = %found, scanned = probe.scanned, "cache hit");
            return Ok(found);
        }

        self.schedule(id);
        let cache_id = self.graph.insert(scope, id, fingerprint);
        self.stats.cached += 1;
        tracing::trace!(
            node = %id,
            kind = self.graph.node(id).kind.name(),
            %scope,
            cache_id = cache_id.raw(),
            scanned = probe.scanned,
            "cached"
        );
        Ok(id)
    }

    /// Build the interrupt for re-entering the frozen node `id`.
    fn cycle_at(&self, id: NodeId) -> Interrupt {
        let node = self.graph.node(id);
        let origin = node.origin;
        let Some(from) = self.probe.position(id) else {
            return Interrupt::Fatal(BuildError::StructuralCycle {
                trace: Vec::new(),
                origin,
            });
        };
        let trace = self.probe.cycle_trace(from);
        let variant = if matches!(node.kind, NodeKind::Variant { .. }) {
            Some(id)
        } else {
            self.probe
                .segment(from)
                .iter()
                .find(|frame| frame.mode == ProbeMode::Intern && frame.kind == "variant")
                .map(|frame| frame.node)
        };
        match variant {
            Some(variant) if self.config.repair_cycles && !self.repairing => {
                tracing::debug!(%variant, depth = self.probe.depth(), "repairable cycle");
                Interrupt::Cycle(CycleSignal { variant, trace })
            }
            _ => Interrupt::Fatal(BuildError::StructuralCycle { trace, origin }),
        }
    }

    fn unresolved(&self, id: NodeId) -> BuildError {
        let origin = self.graph.node(id).origin;
        let found = self
            .context
            .iter()
            .find(|(_, slot)| slot.node == id)
            .map(|(key, _)| *key);
        match found {
            Some((template, name)) => BuildError::UnresolvedReference {
                name,
                template,
                origin,
            },
            None => BuildError::StructuralCycle {
                trace: Vec::new(),
                origin,
            },
        }
    }

    /// Rebuild the variant `id` with specialized alternatives and
    /// internalize the result with repair disabled.
    fn repair_variant(&mut self, id: NodeId, signal: CycleSignal) -> Result<NodeId, Interrupt> {
        let node = self.graph.node(id);
        let origin: Option<Origin> = node.origin;
        let scope: Scope = node.base_scope;
        let NodeKind::Variant {
            qualifiers,
            alternatives,
        } = node.kind.clone()
        else {
            return Err(Interrupt::Fatal(BuildError::StructuralCycle {
                trace: signal.trace,
                origin,
            }));
        };
        tracing::debug!(
            variant = %id,
            trace = %crate::error::render_trace(&signal.trace),
            "repairing self-referential variant"
        );
        self.graph.node_mut(id).pos = CachePos::Uncached;
        let guards = match self.graph.kind(qualifiers) {
            NodeKind::QualifierSet(guards) => guards.clone(),
            _ => Vec::new(),
        };

        self.repairing = true;
        let result = self.rebuild_repaired(id, guards, &alternatives, scope, origin);
        self.repairing = false;

        match result {
            Ok(repaired) => {
                self.stats.repaired += 1;
                Ok(repaired)
            }
            Err(error) => {
                let node = self.graph.node_mut(id);
                if node.pos == CachePos::Frozen {
                    node.pos = CachePos::Uncached;
                }
                Err(Interrupt::Fatal(error))
            }
        }
    }

    fn rebuild_repaired(
        &mut self,
        id: NodeId,
        guards: Vec<Guard>,
        alternatives: &[NodeId],
        scope: Scope,
        origin: Option<Origin>,
    ) -> Result<NodeId, BuildError> {
        let values = self.specialize_alternatives(&guards, alternatives, &Knowledge::new(), scope)?;
        let rebuilt = self.build_variant(guards.into_iter().zip(values).collect(), scope, origin)?;
        if self.graph.resolve(rebuilt) == id {
            return Err(BuildError::StructuralCycle {
                trace: vec![crate::error::TraceEntry {
                    node: id,
                    kind: "variant",
                }],
                origin,
            });
        }
        self.graph.node_mut(id).pos = CachePos::Compacted(rebuilt);
        self.intern(rebuilt)
            .map_err(|interrupt| interrupt.into_fatal(origin))
    }
}
