//! Lowering of the pre-IR source tree into the graph.
//!
//! [`lower_program`] registers the template tree, then lowers every
//! template in order: storage attributes first, so expressions that read
//! them see cached cells, then expression attributes, then writes. A
//! reference to an attribute that is not defined yet gets a forward
//! placeholder, which the later definition resolves.
//!
//! An error while lowering one attribute is reported and the attribute is
//! defined as empty, so the rest of the program still lowers and later
//! references do not cascade into unresolved-reference errors.

use arbor_ir::source::{SourceAttribute, SourceDefinition, SourceExpr, SourceProgram, SourceVariant};
use arbor_ir::{ExportId, Name, Origin, Scope, StorageKind, StringInterner, TemplateId};

use crate::error::BuildError;
use crate::function::{Builtin, Function};
use crate::node::{AreaOp, NodeKind};
use crate::qualifier::{Conjunction, Guard, Qualifier, QualifierValue};
use crate::stack::ensure_sufficient_stack;
use crate::{BuilderConfig, CompileFailure, CompiledGraph, GraphBuilder, NodeId};

/// Lower a whole program and run the compilation pass.
///
/// `interner` must be the one built from `program.strings`.
pub fn lower_program(
    program: &SourceProgram,
    interner: &StringInterner,
    config: BuilderConfig,
) -> Result<CompiledGraph, CompileFailure> {
    let mut builder = GraphBuilder::new(arbor_ir::ScopeTree::new(), config);
    let templates = register_templates(&mut builder, program);
    tracing::debug!(
        templates = templates.len(),
        strings = program.strings.len(),
        "lowering program"
    );

    for (source, template) in program.templates.iter().zip(&templates) {
        let Some(template) = *template else {
            continue;
        };
        let mut lowerer = Lowerer::new(&mut builder, interner, template);
        lowerer.lower_template(source);
    }
    builder.finish()
}

/// Register templates, classes and exports. A template whose parent cannot
/// be registered is reported and skipped.
fn register_templates(builder: &mut GraphBuilder, program: &SourceProgram) -> Vec<Option<TemplateId>> {
    let mut ids: Vec<Option<TemplateId>> = Vec::with_capacity(program.templates.len());
    for source in &program.templates {
        let origin = source.context.first().map(|a| a.origin);
        let parent = match source.parent {
            None => Ok(None),
            Some(index) => ids
                .get(index as usize)
                .copied()
                .flatten()
                .map(Some)
                .ok_or(BuildError::Scope {
                    error: arbor_ir::ScopeError::UnknownTemplate(TemplateId::new(index)),
                    origin,
                }),
        };
        let registered = parent.and_then(|parent| {
            let scopes = builder.scopes_mut();
            let id = scopes
                .add_template(source.name, parent)
                .map_err(|error| BuildError::Scope { error, origin })?;
            for class in &source.classes {
                scopes
                    .add_class(id, *class)
                    .map_err(|error| BuildError::Scope { error, origin })?;
            }
            for export in &source.exports {
                scopes
                    .add_export(id, *export)
                    .map_err(|error| BuildError::Scope { error, origin })?;
            }
            Ok(id)
        });
        match registered {
            Ok(id) => ids.push(Some(id)),
            Err(error) => {
                builder.report(error);
                ids.push(None);
            }
        }
    }
    ids
}

/// A closure whose body is being lowered.
struct ClosureFrame {
    scope: Scope,
    params: Vec<(Name, NodeId)>,
}

/// Lowers the attributes and writes of one template.
pub struct Lowerer<'a> {
    builder: &'a mut GraphBuilder,
    interner: &'a StringInterner,
    template: TemplateId,
    closures: Vec<ClosureFrame>,
    origin: Option<Origin>,
}

impl<'a> Lowerer<'a> {
    pub fn new(builder: &'a mut GraphBuilder, interner: &'a StringInterner, template: TemplateId) -> Self {
        Lowerer {
            builder,
            interner,
            template,
            closures: Vec::new(),
            origin: None,
        }
    }

    /// Scope expressions are currently lowered in.
    fn scope(&self) -> Scope {
        self.closures
            .last()
            .map_or(Scope::template(self.template), |frame| frame.scope)
    }

    fn lower_template(&mut self, source: &arbor_ir::source::SourceTemplate) {
        let (cells, exprs): (Vec<&SourceAttribute>, Vec<&SourceAttribute>) = source
            .context
            .iter()
            .partition(|a| matches!(a.definition, SourceDefinition::Storage { .. }));
        for attribute in cells.into_iter().chain(exprs) {
            self.lower_attribute(attribute);
        }
        for write in &source.writes {
            self.origin = Some(write.origin);
            let lowered = self
                .lower_expr(&write.target)
                .and_then(|target| Ok((target, self.lower_expr(&write.value)?)));
            match lowered {
                Ok((target, value)) => self.builder.add_write(target, value, self.origin),
                Err(error) => self.builder.report(error.or_origin(self.origin)),
            }
        }
        self.origin = None;
    }

    /// Lower and define one context attribute.
    pub fn lower_attribute(&mut self, attribute: &SourceAttribute) {
        self.origin = Some(attribute.origin);
        let value = match &attribute.definition {
            SourceDefinition::Storage { kind, initial } => self.builder.storage(
                *kind,
                attribute.name,
                initial.clone(),
                Scope::template(self.template),
                self.origin,
            ),
            SourceDefinition::Expr(expr) => self.lower_expr(expr),
        };
        let value = match value {
            Ok(value) => value,
            Err(error) => {
                self.builder.report(error.or_origin(self.origin));
                match self.builder.empty() {
                    Ok(empty) => empty,
                    Err(error) => {
                        self.builder.report(error);
                        return;
                    }
                }
            }
        };
        if let Err(error) =
            self.builder
                .define_context_attribute(self.template, attribute.name, value, self.origin)
        {
            self.builder.report(error);
        }
    }

    pub fn lower_expr(&mut self, expr: &SourceExpr) -> Result<NodeId, BuildError> {
        ensure_sufficient_stack(|| self.lower_expr_inner(expr))
    }

    fn lower_all(&mut self, exprs: &[SourceExpr]) -> Result<Vec<NodeId>, BuildError> {
        exprs.iter().map(|expr| self.lower_expr(expr)).collect()
    }

    fn lower_expr_inner(&mut self, expr: &SourceExpr) -> Result<NodeId, BuildError> {
        let scope = self.scope();
        let origin = self.origin;
        match expr {
            SourceExpr::Literal(value) => self.builder.constant(value.clone()),
            SourceExpr::AttributeMap(pairs) => {
                let mut lowered = Vec::with_capacity(pairs.len());
                for (name, value) in pairs {
                    lowered.push((*name, self.lower_expr(value)?));
                }
                self.builder.attribute_set(lowered, scope, origin)
            }
            SourceExpr::OrderedSet(items) => {
                let items = self.lower_all(items)?;
                self.builder.add(NodeKind::OrderedSet(items), scope, origin)
            }
            SourceExpr::Range {
                low,
                high,
                closed_low,
                closed_high,
            } => {
                let bounds = vec![self.lower_expr(low)?, self.lower_expr(high)?];
                self.builder.add(
                    NodeKind::Range {
                        bounds,
                        closed_low: *closed_low,
                        closed_high: *closed_high,
                    },
                    scope,
                    origin,
                )
            }
            SourceExpr::Negation(items) => {
                let items = self.lower_all(items)?;
                self.builder.add(NodeKind::Negation(items), scope, origin)
            }
            SourceExpr::Substring(items) => {
                let items = self.lower_all(items)?;
                self.builder.add(NodeKind::Substring(items), scope, origin)
            }
            SourceExpr::Call { function, args } => {
                let name = self.interner.lookup(*function);
                let builtin = Builtin::from_name(name).ok_or_else(|| BuildError::UnknownFunction {
                    name: name.to_owned(),
                    origin,
                })?;
                let args = self.lower_all(args)?;
                self.builder
                    .apply(Function::Builtin(builtin), args, scope, origin)
            }
            SourceExpr::Compare { op, lhs, rhs } => {
                let lhs = self.lower_expr(lhs)?;
                let rhs = self.lower_expr(rhs)?;
                self.builder
                    .add(NodeKind::Comparison { op: *op, lhs, rhs }, scope, origin)
            }
            SourceExpr::Variant(alternatives) => self.lower_variant(alternatives),
            SourceExpr::Cond {
                selector,
                alternatives,
            } => {
                let selector = self.lower_expr(selector)?;
                let mut lowered = Vec::with_capacity(alternatives.len());
                for (on, use_) in alternatives {
                    lowered.push((self.lower_expr(on)?, self.lower_expr(use_)?));
                }
                self.builder.add(
                    NodeKind::Cond {
                        selector,
                        alternatives: lowered,
                    },
                    scope,
                    origin,
                )
            }
            SourceExpr::Context(name) => self.reference(*name),
            SourceExpr::Me => self.builder.area(
                AreaOp::Me,
                None,
                vec![self.template],
                Scope::template(self.template),
                origin,
            ),
            SourceExpr::Embedding => self.lower_embedding(),
            SourceExpr::Children { of, name } => self.lower_children(of, *name),
            SourceExpr::AreaProject { areas, attribute } => self.lower_area_project(areas, *attribute),
            SourceExpr::Class { areas, class } => {
                let area = self.lower_expr(areas)?;
                self.builder.add(
                    NodeKind::ClassMembership {
                        class: *class,
                        area,
                    },
                    scope,
                    origin,
                )
            }
            SourceExpr::Project { path, data } => {
                let data = self.lower_expr(data)?;
                if path.is_empty() {
                    return Ok(data);
                }
                self.builder.add(
                    NodeKind::Project {
                        path: path.clone(),
                        data,
                    },
                    scope,
                    origin,
                )
            }
            SourceExpr::Query { query, data } => {
                let query = self.lower_expr(query)?;
                let data = self.lower_expr(data)?;
                self.builder
                    .add(NodeKind::QueryApply { query, data }, scope, origin)
            }
            SourceExpr::Sort {
                data,
                keys,
                ascending,
            } => {
                let data = self.lower_expr(data)?;
                let keys = self.lower_all(keys)?;
                self.builder.add(
                    NodeKind::Sort {
                        data,
                        keys,
                        ascending: *ascending,
                    },
                    scope,
                    origin,
                )
            }
            SourceExpr::Geometry { label, area } => {
                let area = self.lower_expr(area)?;
                self.builder.add(
                    NodeKind::Geometry {
                        label: *label,
                        area,
                    },
                    scope,
                    origin,
                )
            }
            SourceExpr::Defun { params, body } => self.lower_defun(params, body),
            SourceExpr::Param(name) => self.parameter(*name).ok_or_else(|| BuildError::UnknownParameter {
                name: self.interner.lookup(*name).to_owned(),
                origin,
            }),
            SourceExpr::Apply { function, args } => {
                let function = self.lower_expr(function)?;
                if self.builder.graph().constant(function).is_some() {
                    return Err(BuildError::NotAClosure { origin });
                }
                let args = self.lower_all(args)?;
                self.builder
                    .apply(Function::Closure(function), args, scope, origin)
            }
        }
    }

    /// Innermost closure parameter called `name`.
    fn parameter(&self, name: Name) -> Option<NodeId> {
        self.closures.iter().rev().find_map(|frame| {
            frame
                .params
                .iter()
                .find(|(param, _)| *param == name)
                .map(|(_, node)| *node)
        })
    }

    /// A parameter shadows the context attribute of the same name.
    fn reference(&mut self, name: Name) -> Result<NodeId, BuildError> {
        match self.parameter(name) {
            Some(param) => Ok(param),
            None => self.builder.context_attribute(self.template, name),
        }
    }

    fn lower_variant(&mut self, alternatives: &[SourceVariant]) -> Result<NodeId, BuildError> {
        let mut guards = Vec::with_capacity(alternatives.len());
        let mut values = Vec::with_capacity(alternatives.len());
        for alternative in alternatives {
            let mut qualifiers = Vec::with_capacity(alternative.qualifier.len());
            for (attribute, value) in &alternative.qualifier {
                let node = self.reference(*attribute)?;
                qualifiers.push(Qualifier::new(
                    node,
                    *attribute,
                    QualifierValue::from_const(value.clone()),
                ));
            }
            guards.push(Guard::from_conjunction(Conjunction::new(qualifiers)));
            values.push(self.lower_expr(&alternative.value)?);
        }
        let scope = self.scope();
        self.builder.variant(guards, values, scope, self.origin)
    }

    fn lower_embedding(&mut self) -> Result<NodeId, BuildError> {
        let parent = self
            .builder
            .scopes()
            .template(self.template)
            .map_err(|error| BuildError::Scope {
                error,
                origin: self.origin,
            })?
            .parent;
        match parent {
            Some(parent) => self.builder.area(
                AreaOp::Embedding,
                None,
                vec![parent],
                Scope::template(self.template),
                self.origin,
            ),
            None => self.builder.empty(),
        }
    }

    /// Templates the areas of `node` may belong to; every template when
    /// that cannot be told statically.
    fn possible_templates(&self, node: NodeId) -> Vec<TemplateId> {
        self.builder
            .area_templates(node)
            .unwrap_or_else(|| self.builder.scopes().templates().collect())
    }

    fn lower_children(&mut self, of: &SourceExpr, name: Name) -> Result<NodeId, BuildError> {
        let areas = self.lower_expr(of)?;
        let scopes = self.builder.scopes();
        let templates: Vec<TemplateId> = self
            .possible_templates(areas)
            .into_iter()
            .filter_map(|parent| scopes.child(parent, name))
            .collect();
        if templates.is_empty() {
            return self.builder.empty();
        }
        let scope = self.scope();
        self.builder
            .area(AreaOp::Children(name), Some(areas), templates, scope, self.origin)
    }

    fn lower_area_project(&mut self, areas: &SourceExpr, attribute: Name) -> Result<NodeId, BuildError> {
        let areas = self.lower_expr(areas)?;
        let Some(export): Option<ExportId> = self.builder.scopes().lookup_export(attribute) else {
            return self.builder.empty();
        };
        let scopes = self.builder.scopes();
        let templates: Vec<TemplateId> = self
            .possible_templates(areas)
            .into_iter()
            .filter(|t| scopes.has_export(*t, export))
            .collect();
        if templates.is_empty() {
            return self.builder.empty();
        }
        let scope = self.scope();
        self.builder
            .area(AreaOp::Project(export), Some(areas), templates, scope, self.origin)
    }

    /// A closure: parameter cells in a fresh closure scope, the closure node
    /// in the enclosing scope, and the body attached once the node exists.
    fn lower_defun(&mut self, params: &[Name], body: &SourceExpr) -> Result<NodeId, BuildError> {
        let outer = self.scope();
        let origin = self.origin;
        let scope_error = |error| BuildError::Scope { error, origin };
        let closure = self
            .builder
            .scopes_mut()
            .add_closure(outer)
            .map_err(scope_error)?;
        let inner = self
            .builder
            .scopes()
            .closure_scope(closure)
            .map_err(scope_error)?;

        let mut cells = Vec::with_capacity(params.len());
        for name in params {
            let cell = self
                .builder
                .storage(StorageKind::Parameter, *name, None, inner, origin)?;
            cells.push((*name, cell));
        }
        let node = self.builder.closure(
            closure,
            cells.iter().map(|(_, cell)| *cell).collect(),
            outer,
            origin,
        )?;

        self.builder.enter_closure_body(node)?;
        self.closures.push(ClosureFrame {
            scope: inner,
            params: cells,
        });
        let built = self.lower_expr(body);
        self.closures.pop();
        self.builder.exit_closure_body(node, built)?;
        tracing::trace!(%closure, node = %node, "closure lowered");
        Ok(node)
    }
}
