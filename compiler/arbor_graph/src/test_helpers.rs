//! Shared test utilities for the graph builder.
//!
//! Factory functions for builders with a few registered templates, and a
//! small reference evaluator that computes a node's value from concrete
//! storage contents. Only compiled in test builds.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::cell::RefCell;

use rustc_hash::FxHashMap;

use arbor_ir::source::{
    SourceAttribute, SourceDefinition, SourceExpr, SourceProgram, SourceTemplate, SourceWrite,
};
use arbor_ir::{ConstValue, Name, Origin, Scope, ScopeTree, StorageKind, StringInterner, TemplateId};

use crate::function::Function;
use crate::graph::Graph;
use crate::node::NodeKind;
use crate::qualifier::{Guard, Qualifier, QualifierValue};
use crate::{BuilderConfig, CompileFailure, CompiledGraph, GraphBuilder, NodeId};

/// A builder with `n` templates: `t0` is the root, every other template is
/// a child of `t0` named `Name::from_raw(i + 1)`.
pub(crate) fn builder_with_templates(n: usize) -> (GraphBuilder, Vec<TemplateId>) {
    builder_with_config(n, BuilderConfig::default())
}

pub(crate) fn builder_with_config(
    n: usize,
    config: BuilderConfig,
) -> (GraphBuilder, Vec<TemplateId>) {
    let mut scopes = ScopeTree::new();
    let mut templates = Vec::with_capacity(n);
    for i in 0..n {
        let parent = templates.first().copied();
        let name = Name::from_raw(u32::try_from(i).unwrap() + 1);
        templates.push(scopes.add_template(name, parent).unwrap());
    }
    (GraphBuilder::new(scopes, config), templates)
}

/// A plain storage cell labelled `Name::from_raw(label)`.
pub(crate) fn storage(b: &mut GraphBuilder, scope: Scope, label: u32) -> NodeId {
    b.storage(StorageKind::Plain, Name::from_raw(label), None, scope, None)
        .unwrap()
}

pub(crate) fn num(b: &mut GraphBuilder, n: f64) -> NodeId {
    b.constant(ConstValue::number(n)).unwrap()
}

/// `{cell: value}` as a one-qualifier guard.
pub(crate) fn when(cell: NodeId, attribute: u32, value: ConstValue) -> Guard {
    Guard::from_qualifiers([Qualifier::new(
        cell,
        Name::from_raw(attribute),
        QualifierValue::from_const(value),
    )])
}

/// Concrete contents of storage cells.
pub(crate) type Env = FxHashMap<NodeId, ConstValue>;

/// Value of `id` when the storage cells hold what `env` says (empty for
/// cells not listed).
pub(crate) fn eval(graph: &Graph, id: NodeId, env: &Env) -> ConstValue {
    let id = graph.resolve(id);
    match &graph.node(id).kind {
        NodeKind::Constant(value) => value.clone(),
        NodeKind::Storage(_) => env.get(&id).cloned().unwrap_or(ConstValue::Empty),
        NodeKind::AttributeSet(pairs) => ConstValue::attribute_value(
            pairs
                .iter()
                .map(|(name, node)| (*name, eval(graph, *node, env))),
        ),
        NodeKind::BoolGate { guard, on_true } => {
            if eval(graph, *guard, env).is_truthy() {
                eval(graph, *on_true, env)
            } else {
                ConstValue::Empty
            }
        }
        NodeKind::Apply {
            function: Function::Builtin(builtin),
            args,
        } => {
            let args: Vec<ConstValue> = args.iter().map(|a| eval(graph, *a, env)).collect();
            builtin.evaluate(&args).unwrap_or(ConstValue::Empty)
        }
        NodeKind::Cond {
            selector,
            alternatives,
        } => {
            let selector = eval(graph, *selector, env);
            alternatives
                .iter()
                .find(|(on, _)| selector.matches(&eval(graph, *on, env)))
                .map_or(ConstValue::Empty, |(_, use_)| eval(graph, *use_, env))
        }
        NodeKind::Variant {
            qualifiers,
            alternatives,
        } => {
            let NodeKind::QualifierSet(guards) = graph.kind(*qualifiers) else {
                panic!("variant without a qualifier set");
            };
            let mut result: Option<ConstValue> = None;
            for (guard, alternative) in guards.iter().zip(alternatives) {
                if !holds(graph, guard, env) {
                    continue;
                }
                let value = eval(graph, *alternative, env);
                match (result.take(), value) {
                    (None, value @ ConstValue::AttributeValue(_)) => result = Some(value),
                    (None, value) => return value,
                    (Some(acc), ConstValue::AttributeValue(more)) => {
                        result = Some(merge_attribute_values(acc, more));
                    }
                    (Some(acc), _) => return acc,
                }
            }
            result.unwrap_or(ConstValue::Empty)
        }
        other => panic!("reference evaluator does not handle `{}`", other.name()),
    }
}

/// Whether a guard holds under `env`.
pub(crate) fn holds(graph: &Graph, guard: &Guard, env: &Env) -> bool {
    guard.conjunctions().iter().any(|c| {
        c.qualifiers()
            .iter()
            .all(|q| q.value.test(&eval(graph, q.node, env)))
    })
}

/// Earlier attributes take priority.
pub(crate) fn merge_attribute_values(acc: ConstValue, more: Vec<(Name, ConstValue)>) -> ConstValue {
    let ConstValue::AttributeValue(mut pairs) = acc else {
        return acc;
    };
    for (name, value) in more {
        if let Err(pos) = pairs.binary_search_by(|(n, _)| n.cmp(&name)) {
            pairs.insert(pos, (name, value));
        }
    }
    ConstValue::AttributeValue(pairs)
}

/// A source program under construction, with its string table.
pub(crate) struct Program {
    strings: RefCell<Vec<String>>,
    templates: Vec<SourceTemplate>,
    next_origin: u32,
}

impl Program {
    pub(crate) fn new() -> Self {
        Program {
            strings: RefCell::new(vec![String::new()]),
            templates: Vec::new(),
            next_origin: 1,
        }
    }

    pub(crate) fn name(&self, s: &str) -> Name {
        let mut strings = self.strings.borrow_mut();
        let index = strings.iter().position(|x| x == s).unwrap_or_else(|| {
            strings.push(s.to_owned());
            strings.len() - 1
        });
        Name::from_raw(u32::try_from(index).unwrap())
    }

    fn origin(&mut self) -> Origin {
        let origin = Origin::new(self.next_origin);
        self.next_origin += 1;
        origin
    }

    /// Add a template; returns its index.
    pub(crate) fn template(&mut self, name: &str, parent: Option<u32>) -> u32 {
        let name = self.name(name);
        self.templates.push(SourceTemplate {
            name,
            parent,
            classes: Vec::new(),
            exports: Vec::new(),
            context: Vec::new(),
            writes: Vec::new(),
        });
        u32::try_from(self.templates.len() - 1).unwrap()
    }

    fn at(&mut self, template: u32) -> &mut SourceTemplate {
        &mut self.templates[template as usize]
    }

    pub(crate) fn class(&mut self, template: u32, class: &str) {
        let class = self.name(class);
        self.at(template).classes.push(class);
    }

    pub(crate) fn export(&mut self, template: u32, attribute: &str) {
        let attribute = self.name(attribute);
        self.at(template).exports.push(attribute);
    }

    pub(crate) fn storage(&mut self, template: u32, name: &str, initial: Option<ConstValue>) -> Origin {
        let definition = SourceDefinition::Storage {
            kind: StorageKind::Plain,
            initial,
        };
        self.attribute(template, name, definition)
    }

    pub(crate) fn define(&mut self, template: u32, name: &str, expr: SourceExpr) -> Origin {
        self.attribute(template, name, SourceDefinition::Expr(expr))
    }

    fn attribute(&mut self, template: u32, name: &str, definition: SourceDefinition) -> Origin {
        let name = self.name(name);
        let origin = self.origin();
        self.at(template).context.push(SourceAttribute {
            origin,
            name,
            definition,
        });
        origin
    }

    pub(crate) fn write(&mut self, template: u32, target: SourceExpr, value: SourceExpr) -> Origin {
        let origin = self.origin();
        self.at(template).writes.push(SourceWrite {
            origin,
            target,
            value,
        });
        origin
    }

    pub(crate) fn ctx(&self, name: &str) -> SourceExpr {
        SourceExpr::Context(self.name(name))
    }

    pub(crate) fn call(&self, function: &str, args: impl IntoIterator<Item = SourceExpr>) -> SourceExpr {
        SourceExpr::call(self.name(function), args)
    }

    pub(crate) fn program(&self) -> SourceProgram {
        SourceProgram {
            strings: self.strings.borrow().clone(),
            templates: self.templates.clone(),
        }
    }

    pub(crate) fn interner(&self) -> StringInterner {
        StringInterner::from_table(&self.strings.borrow()[..])
    }

    pub(crate) fn compile(&self) -> Result<CompiledGraph, CompileFailure> {
        self.compile_with(BuilderConfig::default())
    }

    pub(crate) fn compile_with(&self, config: BuilderConfig) -> Result<CompiledGraph, CompileFailure> {
        crate::lower_program(&self.program(), &self.interner(), config)
    }
}

pub(crate) fn number(n: f64) -> SourceExpr {
    SourceExpr::Literal(ConstValue::number(n))
}
