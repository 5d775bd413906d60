//! Assignment targets resolved to storage cells.

use pretty_assertions::assert_eq;

use arbor_diagnostic::ErrorCode;
use arbor_graph::{GuardTerm, NodeId};
use arbor_ir::source::SourceExpr;
use arbor_ir::{ConstValue, TemplateId};

use crate::common::{number, otherwise, Program};

#[test]
fn variant_target_splits_by_guard() {
    let mut p = Program::new();
    let app = p.template("app", None);
    p.storage(app, "open", Some(ConstValue::Bool(false)));
    p.storage(app, "a", None);
    p.storage(app, "c", None);
    let target = SourceExpr::Variant(vec![
        p.when("open", ConstValue::Bool(true), p.ctx("a")),
        otherwise(p.ctx("c")),
    ]);
    p.define(app, "target", target);
    let write_target = p.ctx("target");
    p.write(app, write_target, number(1.0));

    let compiled = p.compile().unwrap();
    let t0 = TemplateId::new(0);
    let cell = |name: &str| compiled.attribute(t0, p.name(name)).unwrap();
    let destinations = &compiled.writes[0].destinations;
    let storages: Vec<NodeId> = destinations.iter().map(|d| d.storage).collect();
    assert_eq!(storages, vec![cell("a"), cell("c")]);
    assert!(matches!(
        destinations[0].guard.as_slice(),
        [GuardTerm::Qualified(guard)] if !guard.is_always_true()
    ));
}

#[test]
fn projection_writes_into_a_path() {
    let mut p = Program::new();
    let app = p.template("app", None);
    p.storage(app, "state", None);
    let size = p.name("size");
    let width = p.name("width");
    let target = SourceExpr::project(vec![size, width], p.ctx("state"));
    p.write(app, target, number(3.0));

    let compiled = p.compile().unwrap();
    let state = compiled.attribute(TemplateId::new(0), p.name("state")).unwrap();
    let destination = &compiled.writes[0].destinations[0];
    assert_eq!(destination.storage, state);
    assert_eq!(destination.path, vec![size, width]);
}

#[test]
fn cond_target_is_guarded_by_the_selector() {
    let mut p = Program::new();
    let app = p.template("app", None);
    p.storage(app, "which", None);
    p.storage(app, "a", None);
    p.storage(app, "c", None);
    let target = SourceExpr::Cond {
        selector: Box::new(p.ctx("which")),
        alternatives: vec![
            (SourceExpr::literal(ConstValue::Bool(true)), p.ctx("a")),
            (SourceExpr::literal(ConstValue::Bool(false)), p.ctx("c")),
        ],
    };
    p.write(app, target, number(0.0));

    let compiled = p.compile().unwrap();
    let t0 = TemplateId::new(0);
    let which = compiled.attribute(t0, p.name("which")).unwrap();
    let guards: Vec<Vec<GuardTerm>> = compiled.writes[0]
        .destinations
        .iter()
        .map(|d| d.guard.clone())
        .collect();
    assert_eq!(
        guards,
        vec![vec![GuardTerm::Truthy(which)], vec![GuardTerm::Falsy(which)]]
    );
}

#[test]
fn write_to_a_computed_value_is_dropped_with_a_warning() {
    let mut p = Program::new();
    let app = p.template("app", None);
    p.storage(app, "x", None);
    let sum = p.call("plus", [p.ctx("x"), number(1.0)]);
    p.define(app, "sum", sum);
    let target = p.ctx("sum");
    let origin = p.write(app, target, number(2.0));

    let compiled = p.compile().unwrap();
    assert!(compiled.writes.is_empty());
    assert_eq!(compiled.diagnostics.len(), 1);
    assert_eq!(compiled.diagnostics[0].code, ErrorCode::W3002);
    assert_eq!(compiled.diagnostics[0].origin, Some(origin));
}

#[test]
fn area_projection_reaches_every_child_template() {
    let mut p = Program::new();
    let app = p.template("app", None);
    let left = p.template("left", Some(app));
    let right = p.template("right", Some(app));
    for child in [left, right] {
        p.storage(child, "value", None);
        p.export(child, "value");
    }
    let target = SourceExpr::AreaProject {
        areas: Box::new(SourceExpr::Children {
            of: Box::new(SourceExpr::Me),
            name: p.name("left"),
        }),
        attribute: p.name("value"),
    };
    p.write(app, target, number(9.0));

    let compiled = p.compile().unwrap();
    let left_value = compiled
        .attribute(TemplateId::new(left), p.name("value"))
        .unwrap();
    let storages: Vec<NodeId> = compiled.writes[0]
        .destinations
        .iter()
        .map(|d| d.storage)
        .collect();
    assert_eq!(storages, vec![left_value]);
}
