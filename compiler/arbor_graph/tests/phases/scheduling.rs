//! Steps assigned while nodes are cached.

use pretty_assertions::assert_eq;

use arbor_graph::{NodeFlags, NodeKind};
use arbor_ir::TemplateId;

use crate::common::{number, Program};

#[test]
fn nested_application_steps() {
    let mut p = Program::new();
    let app = p.template("app", None);
    for cell in ["a", "b", "c"] {
        p.storage(app, cell, None);
    }
    let inner = p.call("plus", [p.ctx("b"), p.ctx("c")]);
    let outer = p.call("plus", [p.ctx("a"), inner.clone()]);
    p.define(app, "inner", inner);
    p.define(app, "outer", outer);
    let offset = p.call("plus", [p.ctx("a"), number(1.0)]);
    p.define(app, "offset", offset);

    let compiled = p.compile().unwrap();
    let t0 = TemplateId::new(0);
    let step = |name: &str| compiled.node(compiled.attribute(t0, p.name(name)).unwrap()).step;

    assert_eq!(step("a"), 0);
    assert_eq!(step("inner"), 1);
    assert_eq!(step("outer"), 2);
    // Constant inputs do not delay a node.
    assert_eq!(step("offset"), 1);
}

#[test]
fn forward_references_are_scheduled_after_their_targets() {
    let mut p = Program::new();
    let app = p.template("app", None);
    let late = p.call("not", [p.ctx("flag")]);
    p.define(app, "late", late);
    p.storage(app, "base", None);
    let flag = p.call("not", [p.ctx("base")]);
    p.define(app, "flag", flag);

    let compiled = p.compile().unwrap();
    let t0 = TemplateId::new(0);
    let late = compiled.attribute(t0, p.name("late")).unwrap();
    let flag = compiled.attribute(t0, p.name("flag")).unwrap();
    let NodeKind::Apply { args, .. } = &compiled.node(late).kind else {
        panic!("expected an application");
    };
    assert_eq!(compiled.graph.resolve(args[0]), flag);
    assert!(compiled.node(late).step > compiled.node(flag).step);
    for (_, cache) in compiled.graph.scopes() {
        for id in cache.entries() {
            assert!(!compiled
                .node(*id)
                .flags
                .contains(NodeFlags::SCHEDULING_VIOLATION));
        }
    }
}
