use pretty_assertions::assert_eq;

use super::*;

#[test]
fn builder_sets_fields() {
    let diag = Diagnostic::error(ErrorCode::E1002)
        .with_message("structural cycle")
        .with_origin(Some(Origin::new(7)))
        .with_note("n1 -> n2 -> n1");

    assert!(diag.is_error());
    assert_eq!(diag.origin, Some(Origin::new(7)));
    assert_eq!(diag.notes, vec!["n1 -> n2 -> n1".to_string()]);
}

#[test]
fn display_format() {
    let diag = Diagnostic::warning(ErrorCode::W3002)
        .with_message("write target does not reach any storage")
        .with_origin(Some(Origin::new(3)));

    assert_eq!(
        diag.to_string(),
        "warning [W3002]: write target does not reach any storage\n  --> construct #3"
    );
}

#[test]
fn display_without_origin() {
    let diag = Diagnostic::error(ErrorCode::E9001).with_message("oops");
    assert_eq!(diag.to_string(), "error [E9001]: oops");
}
