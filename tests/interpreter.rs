use pretty_assertions::assert_eq;

use treelox::error::LoxError;
use treelox::interpreter::Interpreter;
use treelox::lox::{self, RunError};
use treelox::value::Value;

/// Runs `source` on a fresh interpreter and returns what it printed along
/// with the outcome.
fn run(source: &str) -> (String, Result<(), RunError>) {
    let mut interpreter = Interpreter::with_output(Vec::new());
    let result = lox::run(source.as_bytes(), &mut interpreter);
    let output = String::from_utf8(interpreter.into_output()).expect("utf-8 output");

    (output, result)
}

fn output_of(source: &str) -> String {
    let (output, result) = run(source);
    if let Err(e) = result {
        panic!("program failed: {}\noutput so far:\n{}", e, output);
    }
    output
}

fn runtime_error(source: &str) -> (String, LoxError) {
    match run(source) {
        (output, Err(RunError::Runtime(e))) => (output, e),
        (_, other) => panic!("expected a runtime error, got {:?}", other),
    }
}

fn evaluate(source: &str) -> Value {
    let mut interpreter = Interpreter::with_output(Vec::new());
    lox::evaluate(source.as_bytes(), &mut interpreter).expect("expression evaluates")
}

// ───────────────────────────── expressions ─────────────────────────────

#[test]
fn arithmetic_respects_precedence() {
    assert_eq!(evaluate("2 + 3 * 4"), Value::Number(14.0));
    assert_eq!(evaluate("(2 + 3) * 4"), Value::Number(20.0));
    assert_eq!(evaluate("10 - 4 - 3"), Value::Number(3.0));
    assert_eq!(evaluate("-2 * -3"), Value::Number(6.0));
}

#[test]
fn strings_concatenate_and_do_not_coerce() {
    assert_eq!(evaluate("\"a\" + \"b\""), Value::String("ab".into()));
    assert_eq!(evaluate("1 == \"1\""), Value::Bool(false));
    assert_eq!(evaluate("nil == false"), Value::Bool(false));
    assert_eq!(evaluate("nil == nil"), Value::Bool(true));
    assert_eq!(evaluate("\"x\" != \"x\""), Value::Bool(false));
}

#[test]
fn truthiness_only_nil_and_false_are_falsy() {
    assert_eq!(
        output_of("print !0; print !\"\"; print !nil; print !false; print !!true;"),
        "false\nfalse\ntrue\ntrue\ntrue\n"
    );
}

#[test]
fn logical_operators_short_circuit_and_return_operands() {
    assert_eq!(
        output_of(
            "print nil or \"default\";
             print 0 and 2;
             print false and undefined_name;
             print 1 or undefined_name;"
        ),
        "default\n2\nfalse\n1\n"
    );
}

#[test]
fn number_formatting() {
    assert_eq!(
        output_of("print 10.0; print 10.5; print nil; print true; print 1 / 4; print -0.5;"),
        "10\n10.5\nnil\ntrue\n0.25\n-0.5\n"
    );
}

#[test]
fn adding_number_and_string_is_a_type_error() {
    let (_, err) = runtime_error("print 1 + \"a\";");
    assert_eq!(
        err.to_string(),
        "Operands must be two numbers or two strings.\n[line 1]"
    );
}

#[test]
fn comparison_and_negation_require_numbers() {
    let (_, err) = runtime_error("print \"a\" < \"b\";");
    assert_eq!(err.message(), "Operands must be numbers.");

    let (_, err) = runtime_error("\n\nprint -\"a\";");
    assert_eq!(err.line(), Some(3));
    assert_eq!(err.to_string(), "Operand must be a number.\n[line 3]");
}

#[test]
fn division_by_zero_follows_ieee() {
    assert_eq!(evaluate("1 / 0"), Value::Number(f64::INFINITY));
    assert_eq!(
        output_of("print 1 / 0; print -1 / 0; print 0 / 0;"),
        "Infinity\n-Infinity\nNaN\n"
    );
}

// ───────────────────────────── variables ──────────────────────────────

#[test]
fn uninitialized_variable_is_nil() {
    assert_eq!(output_of("var a; print a; a = 3; print a;"), "nil\n3\n");
}

#[test]
fn assigning_an_undeclared_name_is_a_runtime_error() {
    let (_, err) = runtime_error("unknown = 1;");
    assert_eq!(err.to_string(), "Undefined variable 'unknown'.\n[line 1]");
}

#[test]
fn reading_an_undeclared_name_is_a_runtime_error() {
    let (_, err) = runtime_error("print missing;");
    assert_eq!(err.message(), "Undefined variable 'missing'.");
}

#[test]
fn blocks_shadow_and_restore() {
    assert_eq!(
        output_of(
            "var a = \"outer\";
             {
               var a = \"inner\";
               print a;
             }
             print a;"
        ),
        "inner\nouter\n"
    );
}

#[test]
fn resolved_binding_is_not_captured_by_later_shadowing() {
    assert_eq!(
        output_of(
            "var a = \"global\";
             {
               fun show() { print a; }
               show();
               var a = \"block\";
               show();
             }"
        ),
        "global\nglobal\n"
    );
}

#[test]
fn control_flow_statements() {
    assert_eq!(
        output_of(
            "var i = 0;
             while (i < 3) { i = i + 1; }
             if (i == 3) print \"three\"; else print \"other\";
             for (var j = 0; j < 2; j = j + 1) print j;"
        ),
        "three\n0\n1\n"
    );
}

// ───────────────────────────── functions ──────────────────────────────

#[test]
fn recursion_and_return_values() {
    assert_eq!(
        output_of(
            "fun fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); }
             print fib(10);"
        ),
        "55\n"
    );
}

#[test]
fn function_without_return_yields_nil() {
    assert_eq!(output_of("fun f() {} print f(); print f;"), "nil\n<fn f>\n");
}

#[test]
fn return_unwinds_through_loops_and_blocks() {
    assert_eq!(
        output_of(
            "fun first() {
               for (var i = 0; i < 10; i = i + 1) {
                 while (true) { { return i + 100; } }
               }
             }
             print first();
             print \"after\";"
        ),
        "100\nafter\n"
    );
}

#[test]
fn closures_have_independent_state_per_call() {
    assert_eq!(
        output_of(
            "fun makeCounter() {
               var count = 0;
               fun counter() { count = count + 1; return count; }
               return counter;
             }
             var a = makeCounter();
             var b = makeCounter();
             print a(); print a(); print b();"
        ),
        "1\n2\n1\n"
    );
}

#[test]
fn closures_share_mutations_through_a_common_scope() {
    assert_eq!(
        output_of(
            "var get; var set;
             {
               var shared = 1;
               fun g() { return shared; }
               fun s(v) { shared = v; }
               get = g; set = s;
             }
             set(42);
             print get();"
        ),
        "42\n"
    );
}

#[test]
fn for_loop_variable_is_one_binding_per_loop() {
    // The desugared initializer scope is created once per loop, so every
    // closure sees the value the variable holds when it is called.
    assert_eq!(
        output_of(
            "var first; var second;
             for (var i = 0; i < 2; i = i + 1) {
               fun show() { print i; }
               if (first == nil) first = show; else second = show;
             }
             first(); second();"
        ),
        "2\n2\n"
    );
}

#[test]
fn arity_mismatch_names_both_counts() {
    let (_, err) = runtime_error("fun f(a, b) {} f(1);");
    assert_eq!(err.to_string(), "Expected 2 arguments but got 1.\n[line 1]");

    let (_, err) = runtime_error("class P { init(x) {} } P();");
    assert_eq!(err.message(), "Expected 1 arguments but got 0.");
}

#[test]
fn calling_a_non_callable() {
    let (_, err) = runtime_error("\"str\"();");
    assert_eq!(err.message(), "Can only call functions and classes.");
}

#[test]
fn native_clock_is_predefined() {
    assert_eq!(output_of("print clock() > 0; print clock;"), "true\n<native fn clock>\n");
}

#[test]
fn runaway_recursion_is_a_stack_overflow() {
    let mut interpreter = Interpreter::with_output(Vec::new()).with_max_depth(64);
    let result = lox::run(b"fun f() { f(); }\nf();", &mut interpreter);

    match result {
        Err(RunError::Runtime(LoxError::StackOverflow { line })) => assert_eq!(line, 1),
        other => panic!("expected stack overflow, got {:?}", other),
    }
}

#[test]
fn deeply_nested_program_runs_and_is_torn_down() {
    let depth = 100_000;
    let source = format!("print {}1{};", "(".repeat(depth), ")".repeat(depth));

    let statements = lox::compile(source.as_bytes()).expect("program compiles");
    let mut interpreter = Interpreter::with_output(Vec::new());
    interpreter.interpret(&statements).expect("program runs");
    drop(statements);

    assert_eq!(String::from_utf8(interpreter.into_output()).unwrap(), "1\n");
}

#[test]
fn deeply_nested_unary_operators() {
    let source = format!("print {}true;", "!".repeat(100_000));

    assert_eq!(output_of(&source), "true\n");
}

#[test]
fn default_depth_budget_allows_moderate_recursion() {
    assert_eq!(
        output_of(
            "fun count(n) { if (n == 0) return 0; return 1 + count(n - 1); }
             print count(500);"
        ),
        "500\n"
    );
}

// ───────────────────────────── classes ────────────────────────────────

#[test]
fn fields_and_methods() {
    assert_eq!(
        output_of(
            "class Point {
               init(x, y) { this.x = x; this.y = y; }
               sum() { return this.x + this.y; }
             }
             var p = Point(1, 2);
             print p.sum();
             p.x = 10;
             print p.sum();
             print Point;
             print p;"
        ),
        "3\n12\n<class Point>\n<Point instance>\n"
    );
}

#[test]
fn init_always_returns_the_instance() {
    assert_eq!(
        output_of(
            "class A { init() { this.v = 1; return; } }
             var a = A();
             print a.init() == a;
             print a.v;"
        ),
        "true\n1\n"
    );
}

#[test]
fn inherited_overridden_and_super_methods() {
    assert_eq!(
        output_of(
            "class A {
               greet() { return \"A.greet\"; }
               name() { return \"A\"; }
             }
             class B < A {
               name() { return \"B then \" + super.name(); }
             }
             var b = B();
             print b.greet();
             print b.name();"
        ),
        "A.greet\nB then A\n"
    );
}

#[test]
fn super_binds_to_the_lexically_enclosing_class() {
    assert_eq!(
        output_of(
            "class A { method() { print \"A\"; } }
             class B < A { method() { print \"B\"; } test() { super.method(); } }
             class C < B {}
             C().test();"
        ),
        "A\n"
    );
}

#[test]
fn inherited_initializer_runs_for_subclass() {
    assert_eq!(
        output_of(
            "class Base { init(v) { this.v = v; } }
             class Derived < Base {}
             print Derived(7).v;"
        ),
        "7\n"
    );
}

#[test]
fn bound_methods_remember_their_instance() {
    assert_eq!(
        output_of(
            "class Box { init(v) { this.v = v; } get() { return this.v; } }
             var m = Box(\"kept\").get;
             print m();"
        ),
        "kept\n"
    );
}

#[test]
fn fields_shadow_methods() {
    assert_eq!(
        output_of(
            "class A { m() { return \"method\"; } }
             var a = A();
             a.m = \"field\";
             print a.m;"
        ),
        "field\n"
    );
}

#[test]
fn undefined_property_and_non_instance_access() {
    let (_, err) = runtime_error("class A {} A().missing;");
    assert_eq!(err.message(), "Undefined property 'missing'.");

    let (_, err) = runtime_error("var x = 1; x.y;");
    assert_eq!(err.message(), "Only instances have properties.");

    let (_, err) = runtime_error("var x = 1; x.y = 2;");
    assert_eq!(err.message(), "Only instances have fields.");
}

#[test]
fn superclass_must_be_a_class() {
    let (_, err) = runtime_error("var NotAClass = \"nope\";\nclass B < NotAClass {}");
    assert_eq!(err.to_string(), "Superclass must be a class.\n[line 2]");
}

#[test]
fn instances_compare_by_identity() {
    assert_eq!(
        output_of("class A {} var a = A(); var b = a; print a == b; print A() == A();"),
        "true\nfalse\n"
    );
}

// ───────────────────────────── error classes ──────────────────────────

#[test]
fn a_syntax_error_prevents_all_execution() {
    let (output, result) = run("print \"before\";\nprint (;\nprint \"after\";");

    assert_eq!(output, "");
    let err = result.expect_err("syntax error expected");
    assert_eq!(err.exit_code(), 65);
    assert!(matches!(err, RunError::Static(ref errors) if errors.len() == 1));
}

#[test]
fn a_lex_error_prevents_all_execution() {
    let (output, result) = run("print \"before\";\n$");

    assert_eq!(output, "");
    let err = result.expect_err("lex error expected");
    assert_eq!(err.exit_code(), 65);
    match err {
        RunError::Static(errors) => {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            assert_eq!(messages, vec!["[line 2] Error: Unexpected character: $"]);
        }
        other => panic!("expected a static error, got {:?}", other),
    }
}

#[test]
fn a_resolve_error_prevents_all_execution() {
    let (output, result) = run("print \"before\";\nreturn 1;");

    assert_eq!(output, "");
    assert_eq!(result.expect_err("static error").exit_code(), 65);
}

#[test]
fn a_runtime_error_stops_the_remaining_statements() {
    let (output, result) = run("print 1;\nprint nope;\nprint 2;");

    assert_eq!(output, "1\n");
    let err = result.expect_err("runtime error expected");
    assert_eq!(err.exit_code(), 70);
    assert_eq!(err.to_string(), "Undefined variable 'nope'.\n[line 2]");
}

#[test]
fn globals_persist_across_runs_on_one_interpreter() {
    let mut interpreter = Interpreter::with_output(Vec::new());

    lox::run(b"var total = 1;", &mut interpreter).unwrap();
    let _ = lox::run(b"total = total + 1; oops();", &mut interpreter);
    lox::run(b"print total;", &mut interpreter).unwrap();

    assert_eq!(String::from_utf8(interpreter.into_output()).unwrap(), "2\n");
}
