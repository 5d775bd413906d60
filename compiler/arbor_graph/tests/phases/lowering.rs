//! Source programs through to the export form.

use pretty_assertions::assert_eq;

use arbor_diagnostic::ErrorCode;
use arbor_graph::{ExportArg, NodeKind};
use arbor_ir::source::SourceExpr;
use arbor_ir::{ConstValue, TemplateId};

use crate::common::{number, otherwise, Program};

/// A list with a selectable row: each row reads the list's `selected`
/// attribute through its embedding and writes it when clicked.
fn list_program() -> Program {
    let mut p = Program::new();
    let list = p.template("list", None);
    let row = p.template("row", Some(list));
    p.storage(list, "selected", Some(ConstValue::number(0.0)));
    p.export(list, "selected");
    p.storage(row, "index", Some(ConstValue::number(1.0)));
    p.storage(row, "hover", Some(ConstValue::Bool(false)));

    let selected = SourceExpr::AreaProject {
        areas: Box::new(SourceExpr::Embedding),
        attribute: p.name("selected"),
    };
    p.define(row, "selected", selected);
    let is_selected = SourceExpr::Compare {
        op: arbor_ir::CompareOp::Equal,
        lhs: Box::new(p.ctx("selected")),
        rhs: Box::new(p.ctx("index")),
    };
    p.define(row, "isSelected", is_selected);
    let color = SourceExpr::Variant(vec![
        p.when("hover", ConstValue::Bool(true), number(2.0)),
        otherwise(number(1.0)),
    ]);
    p.define(row, "color", color);
    let target = p.ctx("selected");
    let value = p.ctx("index");
    p.write(row, target, value);
    p
}

#[test]
fn list_program_compiles() {
    let p = list_program();
    let compiled = p.compile().unwrap();
    let t0 = TemplateId::new(0);
    let t1 = TemplateId::new(1);

    let list_selected = compiled.attribute(t0, p.name("selected")).unwrap();
    let row_selected = compiled.attribute(t1, p.name("selected")).unwrap();
    assert!(matches!(compiled.node(row_selected).kind, NodeKind::Area(_)));

    assert_eq!(compiled.writes.len(), 1);
    let storages: Vec<_> = compiled.writes[0]
        .destinations
        .iter()
        .map(|d| d.storage)
        .collect();
    assert_eq!(storages, vec![list_selected]);
    assert!(compiled.diagnostics.is_empty());
}

#[test]
fn list_program_exports() {
    let p = list_program();
    let compiled = p.compile().unwrap();
    let exported = compiled.export(&p.interner());

    let row = exported.scope(Some(1), None).unwrap();
    assert_eq!(row.depth, 2);
    let names: Vec<&str> = row.context.iter().map(|(name, _)| name.as_str()).collect();
    for expected in ["index", "hover", "selected", "isSelected", "color"] {
        assert!(names.contains(&expected), "missing {expected} in {names:?}");
    }
    // Every row-level reference points at the row scope or outwards.
    for node in &row.nodes {
        for arg in &node.args {
            if let ExportArg::Ref { level, .. } = arg {
                assert!(*level <= 2);
            }
        }
    }

    let text = exported.to_string();
    assert!(text.contains("scope t1 depth 2\n"));
    assert!(text.contains("project.selected"));
    assert!(text.contains("-> @t0#"));
}

#[test]
fn errors_in_several_attributes_are_all_reported() {
    let mut p = Program::new();
    let app = p.template("app", None);
    let unknown = p.call("frobnicate", []);
    p.define(app, "a", unknown);
    let arity = p.call("not", [number(1.0), number(2.0)]);
    p.define(app, "b", arity);
    p.define(app, "c", SourceExpr::Param(p.name("nope")));

    let failure = p.compile().unwrap_err();
    assert_eq!(
        failure.codes(),
        vec![ErrorCode::E2001, ErrorCode::E2002, ErrorCode::E2005]
    );
    assert_eq!(failure.error_count(), 3);
}

#[test]
fn closure_applied_in_a_child_template() {
    let mut p = Program::new();
    let app = p.template("app", None);
    let item = p.template("item", Some(app));
    let x = p.name("x");
    let double = p.call("mul", [SourceExpr::Param(x), number(2.0)]);
    p.define(
        app,
        "double",
        SourceExpr::Defun {
            params: vec![x],
            body: Box::new(double),
        },
    );
    p.export(app, "double");
    p.storage(item, "n", Some(ConstValue::number(4.0)));
    let apply = SourceExpr::Apply {
        function: Box::new(SourceExpr::AreaProject {
            areas: Box::new(SourceExpr::Embedding),
            attribute: p.name("double"),
        }),
        args: vec![p.ctx("n")],
    };
    p.define(item, "twice", apply);

    let compiled = p.compile().unwrap();
    let twice = compiled.attribute(TemplateId::new(1), p.name("twice")).unwrap();
    assert!(matches!(compiled.node(twice).kind, NodeKind::Apply { .. }));
    let exported = compiled.export(&p.interner());
    assert!(exported.scope(Some(0), Some(0)).is_some());
}
