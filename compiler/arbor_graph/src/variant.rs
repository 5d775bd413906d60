//! Variant construction and qualifier specialization.
//!
//! A variant holds guarded alternatives. At runtime the alternatives whose
//! guards hold are taken in order: the first value wins unless it is an
//! attribute-value, in which case following attribute-values merge into it
//! (earlier attributes take priority) until a non attribute-value stops the
//! walk. An alternative is *unmergeable* when its value can never be an
//! attribute-value; nothing after a holding unmergeable alternative matters.
//!
//! Specialization rebuilds a node under a [`Knowledge`] set: guards that are
//! decided drop out or collapse, and the surviving alternatives are
//! specialized in turn. It only descends into nodes of the same scope, since
//! a qualifier known in one scope says nothing about another.

use smallvec::SmallVec;

use arbor_ir::{Origin, Scope, ValueKinds};

use crate::error::BuildError;
use crate::node::{CachePos, NodeKind};
use crate::probe::ProbeMode;
use crate::qualifier::{Guard, Knowledge, Qualifier, Truth};
use crate::stack::ensure_sufficient_stack;
use crate::{GraphBuilder, NodeId};

impl GraphBuilder {
    /// Build a variant from parallel guard and alternative lists.
    ///
    /// The alternatives are normalized first; a variant left with nothing
    /// is the empty constant and one left with a single unconditional
    /// alternative is that alternative.
    pub fn variant(
        &mut self,
        guards: Vec<Guard>,
        alternatives: Vec<NodeId>,
        scope: Scope,
        origin: Option<Origin>,
    ) -> Result<NodeId, BuildError> {
        debug_assert_eq!(guards.len(), alternatives.len());
        let pairs = self.normalize_alternatives(guards.into_iter().zip(alternatives).collect());
        if let Some(trivial) = self.trivial_variant(&pairs)? {
            return Ok(trivial);
        }
        let pairs = if self.config.specialize_variants {
            let (guards, values): (Vec<Guard>, Vec<NodeId>) = pairs.into_iter().unzip();
            let values = self.specialize_alternatives(&guards, &values, &Knowledge::new(), scope)?;
            guards.into_iter().zip(values).collect()
        } else {
            pairs
        };
        self.build_variant(pairs, scope, origin)
    }

    /// Normalize and build, without specializing the alternatives.
    pub(crate) fn build_variant(
        &mut self,
        pairs: Vec<(Guard, NodeId)>,
        scope: Scope,
        origin: Option<Origin>,
    ) -> Result<NodeId, BuildError> {
        let pairs = self.normalize_alternatives(pairs);
        if let Some(trivial) = self.trivial_variant(&pairs)? {
            return Ok(trivial);
        }
        let (guards, values): (Vec<Guard>, Vec<NodeId>) = pairs.into_iter().unzip();
        let qualifiers = self.add(NodeKind::QualifierSet(guards), scope, origin)?;
        self.add(
            NodeKind::Variant {
                qualifiers,
                alternatives: values,
            },
            scope,
            origin,
        )
    }

    /// Simplify guards, drop alternatives that can never hold, merge
    /// neighbours with the same value and cut everything after an
    /// unconditional unmergeable alternative.
    pub(crate) fn normalize_alternatives(
        &self,
        pairs: Vec<(Guard, NodeId)>,
    ) -> Vec<(Guard, NodeId)> {
        let empty = Knowledge::new();
        let mut out: Vec<(Guard, NodeId)> = Vec::with_capacity(pairs.len());
        for (guard, value) in pairs {
            let guard = guard.simplify();
            let value = self.graph.resolve(value);
            let truth = guard.evaluate(&empty, &self.graph);
            if truth == Truth::False {
                continue;
            }
            if let Some((last_guard, last_value)) = out.last_mut() {
                if *last_value == value {
                    *last_guard = last_guard.or_guard(&guard).simplify();
                    continue;
                }
            }
            let stop = truth == Truth::True && self.is_unmergeable(value);
            out.push((guard, value));
            if stop {
                break;
            }
        }
        // A merged guard may have become unconditional.
        if let Some(cut) = out.iter().position(|(guard, value)| {
            guard.evaluate(&empty, &self.graph) == Truth::True && self.is_unmergeable(*value)
        }) {
            out.truncate(cut + 1);
        }
        out
    }

    fn trivial_variant(&mut self, pairs: &[(Guard, NodeId)]) -> Result<Option<NodeId>, BuildError> {
        match pairs {
            [] => Ok(Some(self.empty()?)),
            [(guard, value)]
                if guard.evaluate(&Knowledge::new(), &self.graph) == Truth::True =>
            {
                Ok(Some(*value))
            }
            _ => Ok(None),
        }
    }

    /// The value can never be an attribute-value, so no later alternative
    /// merges into it.
    pub fn is_unmergeable(&self, id: NodeId) -> bool {
        let node = self.graph.node(self.graph.resolve(id));
        if let NodeKind::Constant(value) = &node.kind {
            return !matches!(value, arbor_ir::ConstValue::AttributeValue(_));
        }
        node.is_cached()
            && !node.value_type.is_unknown()
            && !node.value_type.kinds().is_empty()
            && !node.value_type.kinds().contains(ValueKinds::ATTRIBUTE_VALUE)
    }

    /// Scope the node's value lives in.
    fn local_scope(&self, id: NodeId) -> Scope {
        let node = self.graph.node(id);
        if node.is_cached() {
            node.scope
        } else {
            node.base_scope
        }
    }

    /// The equivalent of `id` under `know`: decided guards removed, dead
    /// alternatives dropped, and a variant with one certain alternative
    /// replaced by it.
    pub fn pick_qualified_expression(
        &mut self,
        id: NodeId,
        know: &Knowledge,
    ) -> Result<NodeId, BuildError> {
        let id = self.graph.resolve(id);
        let scope = self.local_scope(id);
        self.specialize(id, know, scope)
    }

    pub(crate) fn specialize(
        &mut self,
        id: NodeId,
        know: &Knowledge,
        scope: Scope,
    ) -> Result<NodeId, BuildError> {
        let id = self.graph.resolve(id);
        if know.is_empty() {
            return Ok(id);
        }
        let node = self.graph.node(id);
        if node.is_constant()
            || !matches!(node.pos, CachePos::Cached(_) | CachePos::Uncached)
            || self.local_scope(id) != scope
            || matches!(
                node.kind,
                NodeKind::Storage(_)
                    | NodeKind::Closure { .. }
                    | NodeKind::QualifierSet(_)
                    | NodeKind::Placeholder { .. }
                    | NodeKind::CycleSentinel
            )
        {
            return Ok(id);
        }

        let key = (id, know.clone());
        if let Some(done) = self.specialized.get(&key) {
            return Ok(self.graph.resolve(*done));
        }
        if self.specializing.contains(&key) {
            return Ok(id);
        }
        self.probe_enter(id, ProbeMode::Specialize, know.key())?;
        self.specializing.insert(key.clone());
        let result = ensure_sufficient_stack(|| self.specialize_node(id, know, scope));
        self.specializing.remove(&key);
        self.probe.pop();

        let result = result?;
        self.specialized.insert(key, result);
        Ok(result)
    }

    fn specialize_node(
        &mut self,
        id: NodeId,
        know: &Knowledge,
        scope: Scope,
    ) -> Result<NodeId, BuildError> {
        let mut kind = self.graph.node(id).kind.clone();
        if let NodeKind::Variant {
            qualifiers,
            alternatives,
        } = &kind
        {
            return self.pick_alternatives(id, *qualifiers, alternatives, know, scope);
        }

        let mut changed = false;
        let mut specialized: SmallVec<[NodeId; 4]> = SmallVec::new();
        for input in kind.inputs() {
            let input = self.graph.resolve(input);
            let special = self.specialize(input, know, scope)?;
            changed |= special != input;
            specialized.push(special);
        }
        if !changed {
            return Ok(id);
        }
        let mut slots = specialized.iter();
        kind.for_each_input_mut(|slot| {
            if let Some(special) = slots.next() {
                *slot = *special;
            }
        });
        let node = self.graph.node(id);
        let (base, origin) = (node.base_scope, node.origin);
        self.add(kind, base, origin)
    }

    fn pick_alternatives(
        &mut self,
        id: NodeId,
        qualifiers: NodeId,
        alternatives: &[NodeId],
        know: &Knowledge,
        scope: Scope,
    ) -> Result<NodeId, BuildError> {
        let NodeKind::QualifierSet(guards) = self.graph.kind(qualifiers) else {
            return Ok(id);
        };
        let guards = guards.clone();

        let mut survivors: Vec<(Guard, NodeId)> = Vec::new();
        for (guard, value) in guards.iter().zip(alternatives) {
            let value = self.graph.resolve(*value);
            match guard.evaluate(know, &self.graph) {
                Truth::False => {}
                Truth::True => {
                    survivors.push((Guard::always(), value));
                    if self.is_unmergeable(value) {
                        break;
                    }
                }
                Truth::Unknown => survivors.push((guard.strip_known(know), value)),
            }
        }

        match survivors.as_slice() {
            [] => return self.empty(),
            [(guard, value)] if guard.is_always_true() => {
                return self.specialize(*value, know, scope);
            }
            _ => {}
        }

        let (new_guards, values): (Vec<Guard>, Vec<NodeId>) = survivors.into_iter().unzip();
        let values = self.specialize_alternatives(&new_guards, &values, know, scope)?;
        let unchanged = new_guards == guards
            && values
                .iter()
                .zip(alternatives)
                .all(|(v, a)| *v == self.graph.resolve(*a));
        if unchanged {
            return Ok(id);
        }
        let node = self.graph.node(id);
        let (base, origin) = (node.base_scope, node.origin);
        self.build_variant(new_guards.into_iter().zip(values).collect(), base, origin)
    }

    /// Specialize each alternative under what holds whenever it is
    /// consulted: its own guard (when that is a single conjunction), and the
    /// negation of every earlier single-qualifier guard whose alternative is
    /// unmergeable.
    pub(crate) fn specialize_alternatives(
        &mut self,
        guards: &[Guard],
        values: &[NodeId],
        know: &Knowledge,
        scope: Scope,
    ) -> Result<Vec<NodeId>, BuildError> {
        let mut out = Vec::with_capacity(values.len());
        let mut excluded: Vec<Qualifier> = Vec::new();
        for (guard, value) in guards.iter().zip(values) {
            let mut local = excluded.iter().fold(know.clone(), |k, q| k.with_false(q));
            if let Some(conjunction) = guard.single_conjunction() {
                local = local.with_true(conjunction);
            }
            let special = self.specialize(*value, &local, scope)?;
            if let Some(conjunction) = guard.single_conjunction() {
                if let [qualifier] = conjunction.qualifiers() {
                    if self.is_unmergeable(special) {
                        excluded.push(qualifier.clone());
                    }
                }
            }
            out.push(special);
        }
        Ok(out)
    }
}
