use pretty_assertions::assert_eq;

use treelox::ast::{Expr, Stmt};
use treelox::lox::{self, RunError};

fn static_errors(source: &str) -> Vec<String> {
    match lox::compile(source.as_bytes()) {
        Err(RunError::Static(errors)) => errors.iter().map(ToString::to_string).collect(),
        Err(RunError::Runtime(e)) => panic!("unexpected runtime error: {}", e),
        Ok(_) => panic!("expected static errors"),
    }
}

#[test]
fn locals_get_distances_globals_stay_unresolved() {
    let statements = lox::compile(b"var g = 1; { var a = 2; { print a; print g; } }").unwrap();

    let Stmt::Block(outer) = &statements[1] else {
        panic!("expected block");
    };
    let Stmt::Block(inner) = &outer[1] else {
        panic!("expected inner block");
    };

    let depth_of = |stmt: &Stmt| match stmt {
        Stmt::Print(Expr::Variable { depth, .. }) => depth.get(),
        other => panic!("unexpected statement {:?}", other),
    };

    assert_eq!(depth_of(&inner[0]), Some(1));
    assert_eq!(depth_of(&inner[1]), None);
}

#[test]
fn reading_a_local_in_its_own_initializer() {
    assert_eq!(
        static_errors("var a = 1; { var a = a; }"),
        vec!["[line 1] Error at 'a': Cannot read local variable in its own initializer."]
    );
}

#[test]
fn global_self_reference_in_initializer_is_allowed() {
    assert!(lox::compile(b"var a = 1; var a = a;").is_ok());
}

#[test]
fn return_at_top_level() {
    assert_eq!(
        static_errors("return 1;"),
        vec!["[line 1] Error at 'return': Cannot return from top-level code."]
    );
}

#[test]
fn this_outside_of_a_class() {
    assert_eq!(
        static_errors("fun f() { print this; }"),
        vec!["[line 1] Error at 'this': Cannot use 'this' outside of a class."]
    );
}

#[test]
fn super_outside_of_a_class_and_without_superclass() {
    assert_eq!(
        static_errors("super.m();\nclass A { m() { super.m(); } }"),
        vec![
            "[line 1] Error at 'super': Cannot use 'super' outside of a class.",
            "[line 2] Error at 'super': Cannot use 'super' in a class with no superclass.",
        ]
    );
}

#[test]
fn class_inheriting_from_itself() {
    assert_eq!(
        static_errors("class A < A {}"),
        vec!["[line 1] Error at 'A': A class cannot inherit from itself."]
    );
}

#[test]
fn returning_a_value_from_an_initializer() {
    assert_eq!(
        static_errors("class A { init() { return 1; } }"),
        vec!["[line 1] Error at 'return': Cannot return a value from an initializer."]
    );

    assert!(lox::compile(b"class A { init() { return; } }").is_ok());
}

#[test]
fn duplicate_local_declaration() {
    assert_eq!(
        static_errors("fun f(a) { var a = 1; }"),
        vec!["[line 1] Error at 'a': Already a variable with this name in this scope."]
    );
}

#[test]
fn all_static_errors_are_collected() {
    assert_eq!(static_errors("return 1;\nprint this;\nreturn 2;").len(), 3);
}
