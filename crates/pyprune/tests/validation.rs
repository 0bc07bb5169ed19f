//! Malformed trees and unparsable sources are rejected before any pass runs.

use pretty_assertions::assert_eq;
use pyprune::{OptimizeError, ParseError, ValidationError, optimize, optimize_source, parse};

fn error_message(code: &str) -> String {
    optimize_source(code).unwrap_err().to_string()
}

#[test]
fn syntax_errors_carry_their_position() {
    let err = optimize_source("def f(:\n    pass\n").unwrap_err();
    assert!(matches!(err, OptimizeError::Parse(ParseError::Syntax { .. })), "{err:?}");
    assert!(err.to_string().starts_with("1:"), "{err}");
}

#[test]
fn unsupported_syntax_is_reported() {
    let err = optimize_source("match x:\n    case 1:\n        pass\n").unwrap_err();
    assert!(matches!(err, OptimizeError::Parse(ParseError::NotImplemented { .. })), "{err:?}");
    assert!(err.to_string().contains("pyprune does not support"), "{err}");
}

#[test]
fn scope_declarations_are_validated() {
    assert_eq!(
        error_message("nonlocal x\n"),
        "1:9: nonlocal declaration of 'x' not allowed at module level"
    );
    assert_eq!(
        error_message("def f():\n    nonlocal x\n    x = 1\n"),
        "2:13: no binding for nonlocal 'x' found"
    );
    assert_eq!(
        error_message("def f(a):\n    global a\n"),
        "2:11: name 'a' is parameter and global or nonlocal"
    );
    assert_eq!(error_message("return 1\n"), "1:0: 'return' outside function");
}

#[test]
fn validation_errors_are_the_error_source() {
    let err = optimize(parse("return 1\n").unwrap()).unwrap_err();
    let OptimizeError::Validation(inner) = &err else {
        panic!("expected a validation error, got {err:?}");
    };
    assert!(matches!(inner, ValidationError::ReturnOutsideFunction { .. }));
    let source = std::error::Error::source(&err).map(ToString::to_string);
    assert_eq!(source, Some(inner.to_string()));
}
