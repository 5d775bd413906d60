//! Schedule steps and priority classes.
//!
//! A node's step is one more than the largest step among its constant inputs
//! and its inputs of the same priority class; constants run first at step 0,
//! so anything reading a constant runs at step 1 or later. Inputs of a lower
//! class are raised to the node's class (transitively), since a node cannot
//! run in an earlier phase than what it reads. Inputs of a higher class run
//! in an earlier phase and do not constrain the step.

use arbor_diagnostic::ErrorCode;

use crate::node::{NodeFlags, Priority};
use crate::stack::ensure_sufficient_stack;
use crate::{GraphBuilder, NodeId};

impl GraphBuilder {
    /// Assign priority and step to a node about to be cached.
    pub(crate) fn schedule(&mut self, id: NodeId) {
        if self.graph.node(id).is_constant() {
            self.graph.node_mut(id).step = 0;
            return;
        }
        let priority = self.graph.node(id).priority;
        for input in self.graph.node(id).kind.inputs() {
            let input = self.graph.resolve(input);
            if self.graph.node(input).priority < priority {
                self.raise_priority(input, priority);
            }
        }
        let step = self.compute_step(id);
        self.graph.node_mut(id).step = step;

        if self.config.check_scheduling && !self.is_scheduled_properly(id) {
            self.flag_violation(id);
        }
    }

    fn compute_step(&self, id: NodeId) -> u32 {
        let node = self.graph.node(id);
        node.kind
            .inputs()
            .iter()
            .map(|input| self.graph.node(self.graph.resolve(*input)))
            .filter(|input| input.is_constant() || input.priority == node.priority)
            .map(|input| input.step + 1)
            .max()
            .unwrap_or(0)
    }

    /// Raise `id` and everything it reads to at least `priority`.
    fn raise_priority(&mut self, id: NodeId, priority: Priority) {
        let node = self.graph.node(id);
        if node.is_constant() || node.priority >= priority || !node.kind.can_raise_priority() {
            return;
        }
        tracing::trace!(node = %id, from = node.priority.0, to = priority.0, "raise priority");
        self.graph.node_mut(id).priority = priority;
        ensure_sufficient_stack(|| {
            for input in self.graph.node(id).kind.inputs() {
                let input = self.graph.resolve(input);
                self.raise_priority(input, priority);
            }
        });
        let step = self.compute_step(id);
        self.graph.node_mut(id).step = step;

        // A raised node may now read a cell stuck in a lower class.
        if self.config.check_scheduling && !self.is_scheduled_properly(id) {
            self.flag_violation(id);
        }
    }

    /// Every input runs in a higher class, or runs earlier in the same
    /// class. Constants count as running earlier in every class.
    pub fn is_scheduled_properly(&self, id: NodeId) -> bool {
        let node = self.graph.node(self.graph.resolve(id));
        node.kind.inputs().iter().all(|input| {
            let input = self.graph.node(self.graph.resolve(*input));
            if input.is_constant() {
                return input.step < node.step;
            }
            input.priority > node.priority
                || (input.priority == node.priority && input.step < node.step)
        })
    }

    /// Mark a violation on the node and, transitively, its inputs.
    fn flag_violation(&mut self, id: NodeId) {
        let origin = self.graph.node(id).origin;
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let node = self.graph.node_mut(next);
            if node.flags.contains(NodeFlags::SCHEDULING_VIOLATION) {
                continue;
            }
            node.flags |= NodeFlags::SCHEDULING_VIOLATION;
            let inputs = node.kind.inputs();
            stack.extend(inputs.iter().map(|input| self.graph.resolve(*input)));
        }
        self.warn(
            ErrorCode::W3001,
            format!("{id} is not scheduled after all of its inputs"),
            origin,
        );
    }
}
