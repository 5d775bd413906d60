//! Hash-consing across the public surface.

use pretty_assertions::assert_eq;

use arbor_graph::{Builtin, Function, NodeKind};
use arbor_ir::{ConstValue, Scope, TemplateId};

use crate::common::{builder, number, storage, Program};

#[test]
fn equal_expressions_share_a_node() {
    let mut p = Program::new();
    let app = p.template("app", None);
    p.storage(app, "x", None);
    let a = p.call("plus", [p.ctx("x"), number(1.0)]);
    let b = p.call("plus", [p.ctx("x"), number(1.0)]);
    let c = p.call("plus", [p.ctx("x"), number(2.0)]);
    p.define(app, "a", a);
    p.define(app, "b", b);
    p.define(app, "c", c);

    let compiled = p.compile().unwrap();
    let t0 = TemplateId::new(0);
    let a = compiled.attribute(t0, p.name("a")).unwrap();
    assert_eq!(compiled.attribute(t0, p.name("b")), Some(a));
    assert_ne!(compiled.attribute(t0, p.name("c")), Some(a));
    assert!(compiled.stats.hits >= 1);
}

#[test]
fn storage_cells_with_equal_labels_stay_apart() {
    let mut p = Program::new();
    let app = p.template("app", None);
    let item = p.template("item", Some(app));
    p.storage(app, "x", Some(ConstValue::number(1.0)));
    p.storage(item, "x", Some(ConstValue::number(1.0)));

    let compiled = p.compile().unwrap();
    let x = p.name("x");
    assert_ne!(
        compiled.attribute(TemplateId::new(0), x),
        compiled.attribute(TemplateId::new(1), x)
    );
}

#[test]
fn lookup_starts_above_the_inputs() {
    let (mut b, t) = builder(1);
    let scope = Scope::template(t[0]);
    let fillers: Vec<_> = (0..5).map(|i| storage(&mut b, scope, 10 + i)).collect();
    for filler in &fillers {
        b.apply(Function::Builtin(Builtin::Not), vec![*filler], scope, None)
            .unwrap();
    }
    let x = storage(&mut b, scope, 1);

    let before = b.stats();
    let first = b
        .apply(Function::Builtin(Builtin::Not), vec![x], scope, None)
        .unwrap();
    let second = b
        .apply(Function::Builtin(Builtin::Not), vec![x], scope, None)
        .unwrap();
    let after = b.stats();

    assert_eq!(first, second);
    assert_eq!(after.hits - before.hits, 1);
    // Only `first` lies above `x`; the ten earlier entries are never compared.
    assert_eq!(after.scanned - before.scanned, 1);
}

#[test]
fn global_constants_are_reached_from_any_template() {
    let mut p = Program::new();
    let app = p.template("app", None);
    let item = p.template("item", Some(app));
    p.define(app, "k", number(4.0));
    p.define(item, "k", number(4.0));

    let compiled = p.compile().unwrap();
    let k = p.name("k");
    let shared = compiled.attribute(TemplateId::new(0), k).unwrap();
    assert_eq!(compiled.attribute(TemplateId::new(1), k), Some(shared));
    assert_eq!(compiled.node(shared).scope, Scope::GLOBAL);
    assert!(matches!(compiled.node(shared).kind, NodeKind::Constant(_)));
}
