#![allow(clippy::unwrap_used, clippy::expect_used)]

use pretty_assertions::assert_eq;

use arbor_diagnostic::ErrorCode;
use arbor_ir::{ConstValue, Name, Origin, Scope, StorageKind, TemplateId};

use crate::function::{Builtin, Function};
use crate::node::{AreaOp, NodeKind};
use crate::test_helpers::{builder_with_templates, num, storage};
use crate::BuildError;

// Constructors

#[test]
fn constants_are_shared() {
    let (mut b, _) = builder_with_templates(1);
    let a = b.constant(ConstValue::String(Name::from_raw(6))).unwrap();
    let c = b.constant(ConstValue::String(Name::from_raw(6))).unwrap();
    assert_eq!(a, c);
    assert!(b.node(a).is_constant());
    assert_eq!(b.node(a).scope, Scope::GLOBAL);
}

#[test]
fn storage_keeps_its_initial_value() {
    let (mut b, t) = builder_with_templates(1);
    let cell = b
        .storage(
            StorageKind::Plain,
            Name::from_raw(4),
            Some(ConstValue::number(2.0)),
            Scope::template(t[0]),
            None,
        )
        .unwrap();
    let NodeKind::Storage(storage) = &b.node(cell).kind else {
        panic!("expected a storage cell");
    };
    assert_eq!(storage.initial, Some(ConstValue::number(2.0)));
    assert_eq!(storage.label, Name::from_raw(4));
}

#[test]
fn attribute_set_later_duplicate_wins() {
    let (mut b, t) = builder_with_templates(1);
    let scope = Scope::template(t[0]);
    let first = storage(&mut b, scope, 1);
    let second = storage(&mut b, scope, 2);
    let set = b
        .attribute_set(
            [(Name::from_raw(9), first), (Name::from_raw(9), second)],
            scope,
            None,
        )
        .unwrap();
    assert_eq!(
        b.node(set).kind,
        NodeKind::AttributeSet(vec![(Name::from_raw(9), second)])
    );
}

#[test]
fn builtin_arity_is_checked() {
    let (mut b, _) = builder_with_templates(1);
    let one = num(&mut b, 1.0);
    let error = b
        .apply(
            Function::Builtin(Builtin::Plus),
            vec![one],
            Scope::GLOBAL,
            Some(Origin::new(2)),
        )
        .unwrap_err();
    assert_eq!(error.code(), ErrorCode::E2002);
    assert_eq!(error.origin(), Some(Origin::new(2)));
}

#[test]
fn unknown_scope_is_rejected() {
    let (mut b, _) = builder_with_templates(1);
    let error = b
        .storage(
            StorageKind::Plain,
            Name::from_raw(1),
            None,
            Scope::template(TemplateId::new(7)),
            None,
        )
        .unwrap_err();
    assert_eq!(error.code(), ErrorCode::E2003);
}

#[test]
fn area_templates_are_sorted() {
    let (mut b, t) = builder_with_templates(3);
    let area = b
        .area(
            AreaOp::Children(Name::from_raw(2)),
            None,
            vec![t[2], t[1], t[2]],
            Scope::template(t[0]),
            None,
        )
        .unwrap();
    assert_eq!(b.area_templates(area), Some(vec![t[1], t[2]]));
}

// Context attributes

#[test]
fn forward_reference_is_handed_out_once() {
    let (mut b, t) = builder_with_templates(1);
    let name = Name::from_raw(3);
    let first = b.context_attribute(t[0], name).unwrap();
    let again = b.context_attribute(t[0], name).unwrap();
    assert_eq!(first, again);
    assert_eq!(b.defined_attribute(t[0], name), None);

    let cell = storage(&mut b, Scope::template(t[0]), 1);
    b.define_context_attribute(t[0], name, cell, None).unwrap();
    assert_eq!(b.defined_attribute(t[0], name), Some(cell));
    assert_eq!(b.context_attribute(t[0], name).unwrap(), cell);
    assert_eq!(b.resolve(first), cell);
}

#[test]
fn duplicate_definition_is_rejected() {
    let (mut b, t) = builder_with_templates(1);
    let name = Name::from_raw(3);
    let one = num(&mut b, 1.0);
    let two = num(&mut b, 2.0);
    b.define_context_attribute(t[0], name, one, None).unwrap();
    let error = b
        .define_context_attribute(t[0], name, two, Some(Origin::new(5)))
        .unwrap_err();
    assert_eq!(error.code(), ErrorCode::E1006);
    assert_eq!(b.defined_attribute(t[0], name), Some(one));
}

#[test]
fn context_of_unknown_template_is_rejected() {
    let (mut b, _) = builder_with_templates(1);
    let error = b
        .context_attribute(TemplateId::new(9), Name::from_raw(1))
        .unwrap_err();
    assert!(matches!(error, BuildError::Scope { .. }));
}

// Closure bodies

fn closure_node(b: &mut crate::GraphBuilder, t: TemplateId) -> crate::NodeId {
    let closure = b.scopes_mut().add_closure(Scope::template(t)).unwrap();
    let inner = b.scopes().closure_scope(closure).unwrap();
    let param = storage(b, inner, 1);
    b.closure(closure, vec![param], Scope::template(t), None)
        .unwrap()
}

#[test]
fn closure_body_is_built_once() {
    let (mut b, t) = builder_with_templates(1);
    let node = closure_node(&mut b, t[0]);
    let body = b.cache_closure_body(node, |b| b.constant(ConstValue::number(1.0))).unwrap();
    let again = b
        .cache_closure_body(node, |_| panic!("body built twice"))
        .unwrap();
    assert_eq!(body, again);
    let NodeKind::Closure { body: attached, .. } = &b.node(node).kind else {
        panic!("expected a closure");
    };
    assert_eq!(*attached, Some(body));
}

#[test]
fn closure_body_reentry_is_an_error() {
    let (mut b, t) = builder_with_templates(1);
    let node = closure_node(&mut b, t[0]);
    let error = b
        .cache_closure_body(node, |b| {
            b.cache_closure_body(node, |b| b.constant(ConstValue::number(1.0)))
        })
        .unwrap_err();
    assert_eq!(error.code(), ErrorCode::E1005);

    // The failed attempt leaves the closure buildable.
    let body = b.cache_closure_body(node, |b| b.constant(ConstValue::number(2.0)));
    assert!(body.is_ok());
}

#[test]
fn closure_body_of_non_closure_is_an_error() {
    let (mut b, _) = builder_with_templates(1);
    let one = num(&mut b, 1.0);
    let error = b.enter_closure_body(one).unwrap_err();
    assert_eq!(error.code(), ErrorCode::E2004);
}

// Diagnostics

#[test]
fn cycle_reported_once_per_origin() {
    let (mut b, _) = builder_with_templates(1);
    let cycle = || BuildError::StructuralCycle {
        trace: Vec::new(),
        origin: Some(Origin::new(1)),
    };
    b.report(cycle());
    b.report(cycle());
    b.report(BuildError::StructuralCycle {
        trace: Vec::new(),
        origin: Some(Origin::new(2)),
    });
    assert_eq!(b.diagnostics().len(), 2);
}

// Finish

#[test]
fn finish_hands_out_definitions() {
    let (mut b, t) = builder_with_templates(1);
    let scope = Scope::template(t[0]);
    let name = Name::from_raw(3);
    let cell = storage(&mut b, scope, 1);
    let forward = b.context_attribute(t[0], name).unwrap();
    let gate = b
        .apply(Function::Builtin(Builtin::Identity), vec![forward], scope, None)
        .unwrap();
    b.define_context_attribute(t[0], name, cell, None).unwrap();
    b.define_context_attribute(t[0], Name::from_raw(4), gate, None)
        .unwrap();

    let compiled = b.finish().unwrap();
    assert_eq!(compiled.attribute(t[0], name), Some(cell));
    let derived = compiled.attribute(t[0], Name::from_raw(4)).unwrap();
    assert!(compiled.node(derived).is_cached());
    assert_eq!(compiled.context.len(), 2);
    assert!(compiled.diagnostics.is_empty());
}

#[test]
fn finish_fails_on_undefined_reference() {
    let (mut b, t) = builder_with_templates(1);
    let scope = Scope::template(t[0]);
    let forward = b.context_attribute(t[0], Name::from_raw(3)).unwrap();
    let not = b
        .apply(Function::Builtin(Builtin::Not), vec![forward], scope, None)
        .unwrap();
    b.define_context_attribute(t[0], Name::from_raw(4), not, Some(Origin::new(1)))
        .unwrap();
    let failure = b.finish().unwrap_err();
    assert_eq!(failure.codes(), vec![ErrorCode::E1003]);
    assert_eq!(failure.error_count(), 1);
}

#[test]
fn finish_resolves_writes() {
    let (mut b, t) = builder_with_templates(1);
    let scope = Scope::template(t[0]);
    let cell = storage(&mut b, scope, 1);
    let five = num(&mut b, 5.0);
    b.add_write(cell, five, Some(Origin::new(1)));
    b.add_write(five, cell, Some(Origin::new(2)));
    let compiled = b.finish().unwrap();
    assert_eq!(compiled.writes.len(), 1);
    assert_eq!(compiled.writes[0].target, cell);
    assert_eq!(compiled.diagnostics.len(), 1);
    assert_eq!(compiled.diagnostics[0].code, ErrorCode::W3002);
}
