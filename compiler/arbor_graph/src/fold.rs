//! Constant folding.
//!
//! Runs on a node whose inputs are all internalized, before the cache is
//! probed. A fold returns the node that replaces the candidate: a new
//! constant, one of its inputs, or a smaller node of another kind.

use arbor_ir::{ConstValue, Name};

use crate::error::BuildError;
use crate::function::Function;
use crate::node::NodeKind;
use crate::{GraphBuilder, NodeId};

impl GraphBuilder {
    pub(crate) fn fold(&mut self, id: NodeId) -> Result<Option<NodeId>, BuildError> {
        let kind = self.graph.node(id).kind.clone();
        let folded = match kind {
            NodeKind::Constant(_)
            | NodeKind::Storage(_)
            | NodeKind::QualifierSet(_)
            | NodeKind::Geometry { .. }
            | NodeKind::Sort { .. }
            | NodeKind::QueryApply { .. }
            | NodeKind::Substring(_)
            | NodeKind::Area(_)
            | NodeKind::Closure { .. }
            | NodeKind::Placeholder { .. }
            | NodeKind::CycleSentinel => None,

            NodeKind::AttributeSet(pairs) => {
                let values: Option<Vec<(Name, ConstValue)>> = pairs
                    .iter()
                    .map(|(name, node)| self.graph.constant(*node).map(|v| (*name, v.clone())))
                    .collect();
                match values {
                    Some(values) => Some(self.constant(ConstValue::attribute_value(values))?),
                    None => None,
                }
            }

            NodeKind::BoolGate { guard, on_true } => {
                if let Some(value) = self.graph.constant(guard) {
                    if value.is_truthy() {
                        Some(on_true)
                    } else {
                        Some(self.empty()?)
                    }
                } else if self.is_always_true(guard) {
                    Some(on_true)
                } else {
                    None
                }
            }

            NodeKind::BoolMatch {
                guard,
                pattern,
                on_match,
            } => match (self.graph.constant(guard), self.graph.constant(pattern)) {
                (Some(value), Some(pattern)) => {
                    if value.matches(pattern) {
                        Some(on_match)
                    } else {
                        Some(self.empty()?)
                    }
                }
                _ => None,
            },

            NodeKind::Variant {
                qualifiers,
                alternatives,
            } => self.fold_variant(id, qualifiers, &alternatives)?,

            NodeKind::Apply {
                function: Function::Builtin(builtin),
                args,
            } => match self.constants(&args).and_then(|args| builtin.evaluate(&args)) {
                Some(value) => Some(self.constant(value)?),
                None => None,
            },
            // Closure bodies are not evaluated here.
            NodeKind::Apply { .. } => None,

            NodeKind::ClassMembership { class, area } => match self.area_templates(area) {
                Some(templates) if templates.iter().all(|t| self.scopes.is_member(*t, class)) => {
                    Some(area)
                }
                Some(templates) if templates.iter().all(|t| !self.scopes.is_member(*t, class)) => {
                    Some(self.empty()?)
                }
                _ => None,
            },

            NodeKind::Project { path, data } => self.fold_project(id, &path, data)?,

            NodeKind::OrderedSet(items) => match items.as_slice() {
                [] => Some(self.empty()?),
                [single] => Some(*single),
                _ => match self.constants(&items) {
                    Some(values) => Some(self.constant(ConstValue::set(values))?),
                    None => None,
                },
            },

            NodeKind::Negation(items) => match self.constants(&items) {
                Some(values) => Some(self.constant(ConstValue::Negation(values))?),
                None => None,
            },

            NodeKind::Range {
                bounds,
                closed_low,
                closed_high,
            } => match self.constants(&bounds).as_deref() {
                Some([low, high]) => Some(self.constant(ConstValue::Range {
                    low: Box::new(low.clone()),
                    high: Box::new(high.clone()),
                    closed_low,
                    closed_high,
                })?),
                _ => None,
            },

            NodeKind::Comparison { op, lhs, rhs } => {
                let result = match (self.graph.constant(lhs), self.graph.constant(rhs)) {
                    (Some(lhs), Some(rhs)) => op.evaluate(lhs, rhs),
                    _ => None,
                };
                match result {
                    Some(b) => Some(self.constant(ConstValue::Bool(b))?),
                    None => None,
                }
            }

            NodeKind::Cond {
                selector,
                alternatives,
            } => self.fold_cond(selector, &alternatives)?,
        };
        Ok(folded)
    }

    /// Constant values of all `nodes`, or `None` if any is not constant.
    fn constants(&self, nodes: &[NodeId]) -> Option<Vec<ConstValue>> {
        nodes
            .iter()
            .map(|node| self.graph.constant(*node).cloned())
            .collect()
    }

    /// An application of a builtin that never yields a falsy value.
    fn is_always_true(&self, id: NodeId) -> bool {
        matches!(
            self.graph.kind(id),
            NodeKind::Apply {
                function: Function::Builtin(builtin),
                ..
            } if builtin.info().always_true
        )
    }

    fn fold_cond(
        &mut self,
        selector: NodeId,
        alternatives: &[(NodeId, NodeId)],
    ) -> Result<Option<NodeId>, BuildError> {
        let Some(value) = self.graph.constant(selector).cloned() else {
            return Ok(None);
        };
        for (on, use_) in alternatives {
            let Some(pattern) = self.graph.constant(*on) else {
                return Ok(None);
            };
            if value.matches(pattern) {
                return Ok(Some(*use_));
            }
        }
        Ok(Some(self.empty()?))
    }

    fn fold_project(
        &mut self,
        id: NodeId,
        path: &[Name],
        data: NodeId,
    ) -> Result<Option<NodeId>, BuildError> {
        if let Some(value) = self.graph.constant(data) {
            let projected = project_constant(value, path);
            return Ok(Some(self.constant(projected)?));
        }
        let NodeKind::AttributeSet(pairs) = self.graph.kind(data) else {
            return Ok(None);
        };
        let Some((first, rest)) = path.split_first() else {
            return Ok(Some(data));
        };
        let Ok(pos) = pairs.binary_search_by(|(name, _)| name.cmp(first)) else {
            return Ok(Some(self.empty()?));
        };
        let attribute = pairs[pos].1;
        if rest.is_empty() {
            return Ok(Some(attribute));
        }
        let node = self.graph.node(id);
        let (scope, origin) = (node.base_scope, node.origin);
        let inner = self.add(
            NodeKind::Project {
                path: rest.to_vec(),
                data: attribute,
            },
            scope,
            origin,
        )?;
        Ok(Some(inner))
    }

    /// Re-normalize a variant whose inputs are now known. Guards may have
    /// become decidable once their qualifier attributes were cached.
    fn fold_variant(
        &mut self,
        id: NodeId,
        qualifiers: NodeId,
        alternatives: &[NodeId],
    ) -> Result<Option<NodeId>, BuildError> {
        let NodeKind::QualifierSet(guards) = self.graph.kind(qualifiers) else {
            return Ok(None);
        };
        let pairs: Vec<_> = guards
            .iter()
            .cloned()
            .zip(alternatives.iter().copied())
            .collect();
        let normalized = self.normalize_alternatives(pairs.clone());
        if normalized == pairs {
            return Ok(None);
        }
        let node = self.graph.node(id);
        let (scope, origin) = (node.base_scope, node.origin);
        self.build_variant(normalized, scope, origin).map(Some)
    }
}

/// Follow `path` through a constant. Sets project element-wise; a missing
/// attribute selects nothing.
fn project_constant(value: &ConstValue, path: &[Name]) -> ConstValue {
    let Some((first, rest)) = path.split_first() else {
        return value.clone();
    };
    match value {
        ConstValue::Set(items) => {
            ConstValue::set(items.iter().map(|item| project_constant(item, path)))
        }
        ConstValue::AttributeValue(_) => value
            .attribute(*first)
            .map_or(ConstValue::Empty, |inner| project_constant(inner, rest)),
        _ => ConstValue::Empty,
    }
}
