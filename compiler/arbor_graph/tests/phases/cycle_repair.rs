//! Self-referential variants through lowering.

use pretty_assertions::assert_eq;

use arbor_diagnostic::ErrorCode;
use arbor_graph::{BuilderConfig, NodeKind};
use arbor_ir::source::SourceExpr;
use arbor_ir::{ConstValue, TemplateId};

use crate::common::{number, otherwise, Program};

/// `a: [{open: true}: 5, {}: [{open: true}: a, {}: 7]]`
fn nested_self_reference() -> Program {
    let mut p = Program::new();
    let app = p.template("app", None);
    p.storage(app, "open", Some(ConstValue::Bool(false)));
    let inner = SourceExpr::Variant(vec![
        p.when("open", ConstValue::Bool(true), p.ctx("a")),
        otherwise(number(7.0)),
    ]);
    let outer = SourceExpr::Variant(vec![
        p.when("open", ConstValue::Bool(true), number(5.0)),
        otherwise(inner),
    ]);
    p.define(app, "a", outer);
    p
}

fn alternatives(compiled: &arbor_graph::CompiledGraph, id: arbor_graph::NodeId) -> Vec<Option<ConstValue>> {
    let NodeKind::Variant { alternatives, .. } = &compiled.node(id).kind else {
        panic!("expected a variant, found {}", compiled.node(id).kind.name());
    };
    alternatives
        .iter()
        .map(|alt| compiled.graph.constant(*alt).cloned())
        .collect()
}

#[test]
fn repaired_when_construction_does_not_specialize() {
    let p = nested_self_reference();
    let config = BuilderConfig::default().with_specialize_variants(false);
    let compiled = p.compile_with(config).unwrap();
    assert_eq!(compiled.stats.repaired, 1);
    let a = compiled.attribute(TemplateId::new(0), p.name("a")).unwrap();
    assert_eq!(
        alternatives(&compiled, a),
        vec![Some(ConstValue::number(5.0)), Some(ConstValue::number(7.0))]
    );
    assert!(compiled.diagnostics.is_empty());
}

#[test]
fn same_result_with_specialization() {
    let p = nested_self_reference();
    let compiled = p.compile().unwrap();
    assert_eq!(compiled.stats.repaired, 0);
    let a = compiled.attribute(TemplateId::new(0), p.name("a")).unwrap();
    assert_eq!(
        alternatives(&compiled, a),
        vec![Some(ConstValue::number(5.0)), Some(ConstValue::number(7.0))]
    );
}

#[test]
fn unrepairable_cycle_is_reported_once() {
    let mut p = Program::new();
    let app = p.template("app", None);
    p.storage(app, "open", Some(ConstValue::Bool(false)));
    let a = SourceExpr::Variant(vec![
        p.when("open", ConstValue::Bool(true), p.ctx("a")),
        otherwise(number(7.0)),
    ]);
    p.define(app, "a", a);

    let failure = p.compile().unwrap_err();
    assert_eq!(failure.codes(), vec![ErrorCode::E1002]);
}

#[test]
fn repair_can_be_disabled() {
    let p = nested_self_reference();
    let config = BuilderConfig::default()
        .with_specialize_variants(false)
        .with_repair_cycles(false);
    let failure = p.compile_with(config).unwrap_err();
    assert_eq!(failure.codes(), vec![ErrorCode::E1002]);
}

#[test]
fn mutual_reference_without_variant_is_a_cycle() {
    let mut p = Program::new();
    let app = p.template("app", None);
    let a = p.call("not", [p.ctx("b")]);
    let b = p.call("not", [p.ctx("a")]);
    p.define(app, "a", a);
    p.define(app, "b", b);

    let failure = p.compile().unwrap_err();
    assert!(failure.codes().contains(&ErrorCode::E1002));
    assert!(failure
        .codes()
        .iter()
        .all(|code| *code == ErrorCode::E1002));
}
