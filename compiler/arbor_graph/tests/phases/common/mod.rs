//! Shared fixtures for phase tests.
//!
//! [`Program`] assembles a source program with its string table, so tests
//! can name attributes and functions by text and lower the result.

#![allow(dead_code, reason = "not every phase module uses every fixture")]

use std::cell::RefCell;

use arbor_graph::{BuilderConfig, CompileFailure, CompiledGraph, GraphBuilder, NodeId};
use arbor_ir::source::{
    SourceAttribute, SourceDefinition, SourceExpr, SourceProgram, SourceTemplate, SourceWrite,
    SourceVariant,
};
use arbor_ir::{ConstValue, Name, Origin, Scope, ScopeTree, StorageKind, StringInterner, TemplateId};

/// A source program under construction.
pub struct Program {
    strings: RefCell<Vec<String>>,
    templates: Vec<SourceTemplate>,
    next_origin: u32,
}

impl Program {
    pub fn new() -> Self {
        Program {
            strings: RefCell::new(vec![String::new()]),
            templates: Vec::new(),
            next_origin: 1,
        }
    }

    pub fn name(&self, s: &str) -> Name {
        let mut strings = self.strings.borrow_mut();
        let index = strings.iter().position(|x| x == s).unwrap_or_else(|| {
            strings.push(s.to_owned());
            strings.len() - 1
        });
        Name::from_raw(u32::try_from(index).unwrap())
    }

    fn next_origin(&mut self) -> Origin {
        let origin = Origin::new(self.next_origin);
        self.next_origin += 1;
        origin
    }

    pub fn template(&mut self, name: &str, parent: Option<u32>) -> u32 {
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

    pub fn export(&mut self, template: u32, attribute: &str) {
        let attribute = self.name(attribute);
        self.templates[template as usize].exports.push(attribute);
    }

    pub fn storage(&mut self, template: u32, name: &str, initial: Option<ConstValue>) -> Origin {
        let definition = SourceDefinition::Storage {
            kind: StorageKind::Plain,
            initial,
        };
        self.attribute(template, name, definition)
    }

    pub fn define(&mut self, template: u32, name: &str, expr: SourceExpr) -> Origin {
        self.attribute(template, name, SourceDefinition::Expr(expr))
    }

    fn attribute(&mut self, template: u32, name: &str, definition: SourceDefinition) -> Origin {
        let name = self.name(name);
        let origin = self.next_origin();
        self.templates[template as usize].context.push(SourceAttribute {
            origin,
            name,
            definition,
        });
        origin
    }

    pub fn write(&mut self, template: u32, target: SourceExpr, value: SourceExpr) -> Origin {
        let origin = self.next_origin();
        self.templates[template as usize].writes.push(SourceWrite {
            origin,
            target,
            value,
        });
        origin
    }

    pub fn ctx(&self, name: &str) -> SourceExpr {
        SourceExpr::Context(self.name(name))
    }

    pub fn call(&self, function: &str, args: impl IntoIterator<Item = SourceExpr>) -> SourceExpr {
        SourceExpr::call(self.name(function), args)
    }

    /// `{attribute: value}` qualified alternative.
    pub fn when(&self, attribute: &str, value: ConstValue, then: SourceExpr) -> SourceVariant {
        SourceVariant {
            qualifier: vec![(self.name(attribute), value)],
            value: then,
        }
    }

    pub fn program(&self) -> SourceProgram {
        SourceProgram {
            strings: self.strings.borrow().clone(),
            templates: self.templates.clone(),
        }
    }

    pub fn interner(&self) -> StringInterner {
        StringInterner::from_table(&self.strings.borrow()[..])
    }

    pub fn compile(&self) -> Result<CompiledGraph, CompileFailure> {
        self.compile_with(BuilderConfig::default())
    }

    pub fn compile_with(&self, config: BuilderConfig) -> Result<CompiledGraph, CompileFailure> {
        arbor_graph::lower_program(&self.program(), &self.interner(), config)
    }
}

pub fn number(n: f64) -> SourceExpr {
    SourceExpr::Literal(ConstValue::number(n))
}

/// Unconditional alternative.
pub fn otherwise(value: SourceExpr) -> SourceVariant {
    SourceVariant {
        qualifier: Vec::new(),
        value,
    }
}

/// A builder over a root template and `n - 1` children of it.
pub fn builder(n: usize) -> (GraphBuilder, Vec<TemplateId>) {
    let mut scopes = ScopeTree::new();
    let mut templates = Vec::with_capacity(n);
    for i in 0..n {
        let parent = templates.first().copied();
        let name = Name::from_raw(u32::try_from(i).unwrap() + 1);
        templates.push(scopes.add_template(name, parent).unwrap());
    }
    (GraphBuilder::new(scopes, BuilderConfig::default()), templates)
}

pub fn storage(b: &mut GraphBuilder, scope: Scope, label: u32) -> NodeId {
    b.storage(StorageKind::Plain, Name::from_raw(label), None, scope, None)
        .unwrap()
}
