#![allow(clippy::unwrap_used, clippy::expect_used)]

use pretty_assertions::assert_eq;

use arbor_ir::{ConstValue, Name, Scope, StorageKind, TemplateId, ValueKinds, ValueType};

use super::*;
use crate::function::{Builtin, Function};

fn n(raw: u32) -> NodeId {
    NodeId::new(raw)
}

#[test]
fn inputs_and_mutable_visit_agree() {
    let mut kind = NodeKind::Cond {
        selector: n(1),
        alternatives: vec![(n(2), n(3)), (n(4), n(5))],
    };
    assert_eq!(kind.inputs().as_slice(), &[n(1), n(2), n(3), n(4), n(5)]);

    let mut seen = Vec::new();
    kind.for_each_input_mut(|id| {
        seen.push(*id);
        *id = NodeId::new(id.raw() + 10);
    });
    assert_eq!(seen, vec![n(1), n(2), n(3), n(4), n(5)]);
    assert_eq!(
        kind.inputs().as_slice(),
        &[n(11), n(12), n(13), n(14), n(15)]
    );
}

#[test]
fn apply_lists_closure_function_first() {
    let kind = NodeKind::Apply {
        function: Function::Closure(n(9)),
        args: vec![n(1), n(2)],
    };
    assert_eq!(kind.inputs().as_slice(), &[n(9), n(1), n(2)]);

    let builtin = NodeKind::Apply {
        function: Function::Builtin(Builtin::Plus),
        args: vec![n(1), n(2)],
    };
    assert_eq!(builtin.inputs().as_slice(), &[n(1), n(2)]);
}

#[test]
fn ordered_sets_compare_as_multisets() {
    let a = NodeKind::OrderedSet(vec![n(1), n(2), n(2)]);
    let b = NodeKind::OrderedSet(vec![n(2), n(1), n(2)]);
    let c = NodeKind::OrderedSet(vec![n(1), n(1), n(2)]);
    assert!(a.same_content(&b));
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert!(!a.same_content(&c));
}

#[test]
fn comparisons_are_order_sensitive() {
    let a = NodeKind::Comparison {
        op: arbor_ir::CompareOp::Less,
        lhs: n(1),
        rhs: n(2),
    };
    let b = NodeKind::Comparison {
        op: arbor_ir::CompareOp::Less,
        lhs: n(2),
        rhs: n(1),
    };
    assert!(!a.same_content(&b));
}

#[test]
fn closures_ignore_body() {
    let closure = arbor_ir::ClosureId::new(0);
    let a = NodeKind::Closure {
        closure,
        params: vec![n(1)],
        body: None,
    };
    let b = NodeKind::Closure {
        closure,
        params: vec![n(1)],
        body: Some(n(5)),
    };
    assert!(a.same_content(&b));
    assert_eq!(a.fingerprint(), b.fingerprint());
}

#[test]
fn storage_cells_never_collapse() {
    let cell = |id| {
        NodeKind::Storage(StorageCell {
            kind: StorageKind::Plain,
            label: Name::from_raw(1),
            cell: id,
            initial: None,
        })
    };
    assert!(!cell(0).same_content(&cell(1)));
    assert!(cell(0).same_content(&cell(0)));
}

#[test]
fn placeholders_are_never_shared() {
    let p = NodeKind::Placeholder { target: None };
    assert!(!p.same_content(&p.clone()));
    assert!(!NodeKind::CycleSentinel.same_content(&NodeKind::CycleSentinel));
}

#[test]
fn children_navigation_runs_in_area_phase() {
    let children = NodeKind::Area(AreaNav {
        op: AreaOp::Children(Name::from_raw(3)),
        data: Some(n(0)),
        templates: vec![TemplateId::new(1)],
    });
    assert_eq!(children.intrinsic_priority(), Priority::AREA_SET);
    let me = NodeKind::Area(AreaNav {
        op: AreaOp::Me,
        data: None,
        templates: vec![TemplateId::new(0)],
    });
    assert_eq!(me.intrinsic_priority(), Priority::DEFAULT);
}

#[test]
fn storage_cannot_be_raised() {
    let storage = NodeKind::Storage(StorageCell {
        kind: StorageKind::Plain,
        label: Name::from_raw(1),
        cell: 0,
        initial: None,
    });
    assert!(!storage.can_raise_priority());
    assert!(NodeKind::OrderedSet(vec![]).can_raise_priority());
}

#[test]
fn ordered_set_type_concatenates_cardinality() {
    let kind = NodeKind::OrderedSet(vec![n(0), n(1)]);
    let number = ValueType::single(ValueKinds::NUMBER);
    let ty = kind.derive_value_type(&[number, number]);
    assert_eq!(ty.kinds(), ValueKinds::NUMBER);
    assert_eq!(ty.cardinality(), arbor_ir::Cardinality::exactly(2));
}

#[test]
fn gate_type_includes_empty() {
    let kind = NodeKind::BoolGate {
        guard: n(0),
        on_true: n(1),
    };
    let ty = kind.derive_value_type(&[
        ValueType::single(ValueKinds::BOOLEAN),
        ValueType::single(ValueKinds::NUMBER),
    ]);
    assert!(ty.kinds().contains(ValueKinds::NUMBER | ValueKinds::UNDEFINED));
}

#[test]
fn new_node_state() {
    let constant = Node::new(
        NodeKind::Constant(ConstValue::Bool(true)),
        Scope::GLOBAL,
        None,
    );
    assert!(constant.is_constant());
    assert_eq!(constant.pos, CachePos::Uncached);

    let placeholder = Node::new(
        NodeKind::Placeholder { target: None },
        Scope::template(TemplateId::new(0)),
        None,
    );
    assert_eq!(placeholder.pos, CachePos::Placeholder);
    assert!(!placeholder.is_constant());
}

#[test]
fn forward_targets() {
    assert_eq!(CachePos::Compacted(n(4)).forward(), Some(n(4)));
    assert_eq!(CachePos::ResolvedPlaceholder(n(2)).forward(), Some(n(2)));
    assert_eq!(CachePos::Frozen.forward(), None);
    assert_eq!(
        CachePos::Cached(CacheId::new(3)).cache_id(),
        Some(CacheId::new(3))
    );
}
