use std::cell::RefCell;
use std::rc::Rc;

use rox::ast::Stmt;
use rox::error::LoxError;
use rox::interpreter::Interpreter;
use rox::parser::parse;
use rox::scanner::scan;
use rox::{Lox, RunStatus};

struct Session {
    lox: Lox,
    output: Rc<RefCell<Vec<u8>>>,
}

impl Session {
    fn new() -> Self {
        let output = Rc::new(RefCell::new(Vec::new()));
        let lox = Lox::with_output(output.clone());
        Self { lox, output }
    }

    /// Run `source`, returning (status, printed lines, error strings).
    fn run(&mut self, source: &str) -> (RunStatus, Vec<String>, Vec<String>) {
        let status = self.lox.run(source);

        let bytes = self.output.take();
        let printed = String::from_utf8(bytes).expect("Output should be valid UTF-8");
        let lines = printed.lines().map(str::to_string).collect();

        let errors = self
            .lox
            .diagnostics()
            .errors()
            .iter()
            .map(|e| e.to_string())
            .collect();

        (status, lines, errors)
    }
}

fn run(source: &str) -> (RunStatus, Vec<String>, Vec<String>) {
    Session::new().run(source)
}

fn assert_output(source: &str, expected: &[&str]) {
    let (status, lines, errors) = run(source);
    assert_eq!(status, RunStatus::Ok, "errors: {:?}", errors);
    assert_eq!(lines, expected);
}

fn assert_runtime_error(source: &str, expected: &str) {
    let (status, _, errors) = run(source);
    assert_eq!(status, RunStatus::RuntimeError);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0], expected);
}

#[test]
fn arithmetic_and_printing() {
    assert_output(
        "print 1 + 2 * 3; print (1 + 2) * 3; print 7 / 2; print -4; print !nil;",
        &["7", "9", "3.5", "-4", "true"],
    );
}

#[test]
fn truthiness() {
    assert_output(
        r#"
        if (0) print "zero"; else print "no";
        if ("") print "empty"; else print "no";
        if (nil) print "nil"; else print "falsey";
        if (false) print "false"; else print "falsey";
        "#,
        &["zero", "empty", "falsey", "falsey"],
    );
}

#[test]
fn equality_without_coercion() {
    assert_output(
        r#"
        print 1 == 1;
        print "1" == 1;
        print nil == false;
        print nil == nil;
        print "a" != "b";
        print 2 != 2;
        "#,
        &["true", "false", "false", "true", "true", "false"],
    );
}

#[test]
fn logical_operators_return_last_evaluated_operand() {
    assert_output(
        r#"
        print "hi" or 2;
        print nil or "yes";
        print nil and boom();
        print 1 and 2;
        var called = false;
        fun mark() { called = true; return true; }
        print true or mark();
        print called;
        "#,
        &["hi", "yes", "nil", "2", "true", "false"],
    );
}

#[test]
fn string_concatenation_is_asymmetric() {
    assert_output(r#"print "a" + 1; print "a" + "b"; print "x" + nil;"#, &["a1", "ab", "xnil"]);

    assert_runtime_error(
        r#"print 1 + "a";"#,
        "[line 1] Error at '+': Operands must be two numbers or a string on the left.",
    );
}

#[test]
fn arithmetic_type_errors_name_the_operator() {
    assert_runtime_error(
        "print 1 - true;",
        "[line 1] Error at '-': Operands must be numbers.",
    );
    assert_runtime_error(
        "print \"a\" < \"b\";",
        "[line 1] Error at '<': Operands must be numbers.",
    );
    assert_runtime_error(
        "print -\"a\";",
        "[line 1] Error at '-': Operand must be a number.",
    );
}

#[test]
fn variables_and_blocks_shadow() {
    assert_output(
        r#"
        var a = "global";
        {
            var a = "outer";
            {
                var a = "inner";
                print a;
            }
            print a;
        }
        print a;
        var b;
        print b;
        "#,
        &["inner", "outer", "global", "nil"],
    );
}

#[test]
fn undefined_variable_errors() {
    assert_runtime_error(
        "print missing;",
        "[line 1] Error at 'missing': Undefined variable 'missing'.",
    );
    assert_runtime_error(
        "missing = 1;",
        "[line 1] Error at 'missing': Undefined variable 'missing'.",
    );
}

#[test]
fn for_loop_matches_hand_written_while() {
    let (_, desugared, _) = run("for (var i = 0; i < 3; i = i + 1) print i;");
    let (_, manual, _) = run("{ var i = 0; while (i < 3) { print i; i = i + 1; } }");

    assert_eq!(desugared, vec!["0", "1", "2"]);
    assert_eq!(desugared, manual);
}

#[test]
fn loop_variable_not_visible_after_loop() {
    assert_runtime_error(
        "for (var i = 0; i < 1; i = i + 1) {} print i;",
        "[line 1] Error at 'i': Undefined variable 'i'.",
    );
}

#[test]
fn recursion() {
    assert_output(
        r#"
        fun fib(n) {
            if (n <= 1) return n;
            return fib(n - 1) + fib(n - 2);
        }
        for (var i = 0; i < 8; i = i + 1) print fib(i);
        "#,
        &["0", "1", "1", "2", "3", "5", "8", "13"],
    );
}

#[test]
fn closures_share_mutable_scope() {
    assert_output(
        r#"
        fun makeCounter() {
            var i = 0;
            fun count() {
                i = i + 1;
                return i;
            }
            return count;
        }
        var counter = makeCounter();
        print counter();
        print counter();
        var other = makeCounter();
        print other();
        "#,
        &["1", "2", "1"],
    );
}

#[test]
fn closure_in_loop_body_sees_later_mutation() {
    assert_output(
        r#"
        var show;
        var i = 0;
        while (i < 1) {
            var captured = "before";
            fun f() { print captured; }
            show = f;
            captured = "after";
            i = i + 1;
        }
        show();
        "#,
        &["after"],
    );
}

#[test]
fn closures_bind_statically() {
    assert_output(
        r#"
        var a = "global";
        {
            fun showA() { print a; }
            showA();
            var a = "block";
            showA();
        }
        "#,
        &["global", "global"],
    );
}

#[test]
fn anonymous_functions() {
    assert_output(
        r#"
        var add = fun (a, b) { return a + b; };
        print add(2, 3);
        fun apply(f, x) { return f(x); }
        print apply(fun (n) { return n * n; }, 4);
        print add;
        "#,
        &["5", "16", "<fn>"],
    );
}

#[test]
fn arity_mismatch_is_distinct_from_not_callable() {
    let source = "fun f(a, b) { return a; }";

    assert_runtime_error(
        &format!("{} f(1);", source),
        "[line 1] Error at ')': Too few arguments: expected 2 but got 1.",
    );
    assert_runtime_error(
        &format!("{} f(1, 2, 3);", source),
        "[line 1] Error at ')': Too many arguments: expected 2 but got 3.",
    );
    assert_runtime_error(
        "\"text\"();",
        "[line 1] Error at ')': Can only call functions and classes.",
    );
}

#[test]
fn function_without_return_yields_nil() {
    assert_output(
        "fun f() {} print f(); fun g() { return; } print g(); print f;",
        &["nil", "nil", "<fn f>"],
    );
}

#[test]
fn clock_is_a_native_number() {
    assert_output(
        "var t = clock(); print t > 0; print clock;",
        &["true", "<native fn clock>"],
    );
    assert_runtime_error(
        "clock(1);",
        "[line 1] Error at ')': Too many arguments: expected 0 but got 1.",
    );
}

#[test]
fn classes_fields_and_methods() {
    assert_output(
        r#"
        class Point {
            init(x, y) {
                this.x = x;
                this.y = y;
            }
            sum() { return this.x + this.y; }
        }
        var p = Point(1, 2);
        print p.sum();
        p.z = 10;
        print p.z;
        print Point;
        print p;
        var m = p.sum;
        p.x = 5;
        print m();
        "#,
        &["3", "10", "<class Point>", "<Point instance>", "7"],
    );
}

#[test]
fn fields_shadow_methods() {
    assert_output(
        r#"
        class A { m() { return "method"; } }
        var a = A();
        print a.m();
        a.m = "field";
        print a.m;
        "#,
        &["method", "field"],
    );
}

#[test]
fn constructor_always_yields_instance() {
    assert_output(
        r#"
        class A {
            init() {
                this.n = 1;
                return;
            }
        }
        var a = A();
        print a;
        print a.init();
        print a.init() == a;
        "#,
        &["<A instance>", "<A instance>", "true"],
    );
}

#[test]
fn class_without_init_has_zero_arity() {
    assert_runtime_error(
        "class A {} A(1);",
        "[line 1] Error at ')': Too many arguments: expected 0 but got 1.",
    );
}

#[test]
fn property_access_requires_instance() {
    assert_runtime_error(
        "var x = 1; print x.y;",
        "[line 1] Error at 'y': Only instances have properties.",
    );
    assert_runtime_error(
        "var x = 1; x.y = 2;",
        "[line 1] Error at 'y': Only instances have fields.",
    );
    assert_runtime_error(
        "class A {} print A().nope;",
        "[line 1] Error at 'nope': Undefined property 'nope'.",
    );
}

#[test]
fn inheritance_and_super_dispatch() {
    assert_output(
        r#"
        class A { greet() { print "A"; } }
        class B < A { greet() { print "B"; super.greet(); } }
        class C < B { greet() { print "C"; super.greet(); } }
        B().greet();
        C().greet();
        "#,
        &["B", "A", "C", "B", "A"],
    );
}

#[test]
fn super_is_lexical_not_dynamic() {
    assert_output(
        r#"
        class A { name() { return "A"; } }
        class B < A {
            name() { return "B"; }
            test() { return super.name(); }
        }
        class C < B { name() { return "C"; } }
        print C().test();
        "#,
        &["A"],
    );
}

#[test]
fn inherited_methods_and_initializer() {
    assert_output(
        r#"
        class Base {
            init(v) { this.v = v; }
            get() { return this.v; }
        }
        class Derived < Base {}
        print Derived(42).get();
        "#,
        &["42"],
    );
}

#[test]
fn methods_can_reference_their_own_class() {
    assert_output(
        r#"
        class Node {
            make() { return Node(); }
        }
        print Node().make();
        "#,
        &["<Node instance>"],
    );
}

#[test]
fn superclass_must_be_a_class() {
    assert_runtime_error(
        "var NotAClass = 1; class A < NotAClass {}",
        "[line 1] Error at 'NotAClass': Superclass must be a class.",
    );
}

#[test]
fn runtime_error_stops_execution() {
    let mut session = Session::new();
    let (status, lines, errors) = session.run("print 1;\nprint nil + 1;\nprint 3;");

    assert_eq!(status, RunStatus::RuntimeError);
    assert!(session.lox.diagnostics().had_runtime_error());
    assert!(!session.lox.diagnostics().had_error());
    assert_eq!(lines, vec!["1"]);
    assert_eq!(
        errors,
        vec!["[line 2] Error at '+': Operands must be two numbers or a string on the left."]
    );
}

#[test]
fn static_errors_skip_execution() {
    let (status, lines, errors) = run("print 1;\nprint ;\nvar = 2;");
    assert_eq!(status, RunStatus::StaticError);
    assert!(lines.is_empty());
    assert_eq!(errors.len(), 2);

    let (status, lines, errors) = run("print 1; { var a = a; }");
    assert_eq!(status, RunStatus::StaticError);
    assert!(lines.is_empty());
    assert_eq!(
        errors,
        vec!["[line 1] Error at 'a': Can't read local variable in its own initializer."]
    );

    let (status, _, errors) = run("print 1; @");
    assert_eq!(status, RunStatus::StaticError);
    assert_eq!(errors, vec!["[line 1] Error: Unexpected character: @"]);
}

#[test]
fn session_keeps_globals_and_resets_errors() {
    let mut session = Session::new();

    let (status, _, _) = session.run("var count = 1; fun bump() { count = count + 1; return count; }");
    assert_eq!(status, RunStatus::Ok);

    let (status, _, errors) = session.run("print undefined;");
    assert_eq!(status, RunStatus::RuntimeError);
    assert_eq!(errors.len(), 1);

    let (status, lines, errors) = session.run("print bump(); print count;");
    assert_eq!(status, RunStatus::Ok);
    assert!(errors.is_empty());
    assert_eq!(lines, vec!["2", "2"]);
}

#[test]
fn closures_survive_across_session_runs() {
    let mut session = Session::new();

    session.run("fun make() { var n = 0; fun inc() { n = n + 1; return n; } return inc; } var f = make();");
    session.run("f();");

    let (status, lines, _) = session.run("print f();");
    assert_eq!(status, RunStatus::Ok);
    assert_eq!(lines, vec!["3"]);
}

/// Scan, parse and resolve `source` into `interpreter` without running it.
fn prepare(interpreter: &mut Interpreter, source: &str) -> Vec<Stmt> {
    let mut errors: Vec<LoxError> = Vec::new();
    let statements = parse(scan(source, &mut errors), &mut errors);
    interpreter.resolve(&statements, &mut errors);
    assert!(errors.is_empty(), "unexpected static errors: {:?}", errors);
    statements
}

#[test]
fn failing_block_restores_enclosing_scope() {
    let output = Rc::new(RefCell::new(Vec::new()));
    let mut interpreter = Interpreter::with_output(output.clone());

    let failing = prepare(&mut interpreter, "{ var a = \"local\"; nil(); }");
    assert!(interpreter.execute(&failing[0]).is_err());

    // Defined in whatever scope the failed block left current.
    let define = prepare(&mut interpreter, "var b = \"global\";");
    assert!(interpreter.execute(&define[0]).is_ok());

    let read = prepare(&mut interpreter, "print b;");
    assert!(interpreter.interpret(&read).is_ok());
    assert_eq!(String::from_utf8(output.take()).unwrap(), "global\n");
}

#[test]
fn deep_recursion_does_not_overflow() {
    assert_output(
        r#"
        fun depth(n) {
            if (n == 0) return 0;
            return 1 + depth(n - 1);
        }
        print depth(5000);
        "#,
        &["5000"],
    );
}

#[test]
fn deeply_nested_expression() {
    let source = format!("print {}1{};", "(".repeat(1000), ")".repeat(1000));
    assert_output(&source, &["1"]);
}

#[test]
fn large_and_negative_zero_numbers_print_shortest_form() {
    assert_output(
        "print 100000000000000000000000; print -0; print 1 / 3;",
        &["100000000000000000000000", "-0", "0.3333333333333333"],
    );
}
