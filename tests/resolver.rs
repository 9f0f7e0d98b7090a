use rox::ast::{Expr, ExprId, Stmt};
use rox::error::LoxError;
use rox::parser::parse;
use rox::resolver::{Locals, Resolver};
use rox::scanner::scan;

fn parse_ok(source: &str) -> Vec<Stmt> {
    let mut errors: Vec<LoxError> = Vec::new();
    let statements = parse(scan(source, &mut errors), &mut errors);
    assert!(errors.is_empty(), "unexpected syntax errors: {:?}", errors);
    statements
}

fn resolve(source: &str) -> (Vec<Stmt>, Locals, Vec<LoxError>) {
    let statements = parse_ok(source);
    let mut errors: Vec<LoxError> = Vec::new();
    let locals = Resolver::new().resolve(&statements, &mut errors);
    (statements, locals, errors)
}

fn resolve_errors(source: &str) -> Vec<String> {
    let (_, _, errors) = resolve(source);
    errors.iter().map(|e| e.message()).collect()
}

/// Every variable‑like node in source order, as (name, id).
fn references(statements: &[Stmt]) -> Vec<(String, ExprId)> {
    fn walk_expr(expr: &Expr, out: &mut Vec<(String, ExprId)>) {
        match expr {
            Expr::Literal(_) => {}
            Expr::Grouping(inner) | Expr::Unary { right: inner, .. } => walk_expr(inner, out),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                walk_expr(left, out);
                walk_expr(right, out);
            }
            Expr::Variable { id, name } => out.push((name.lexeme.clone(), *id)),
            Expr::Assign { id, name, value } => {
                walk_expr(value, out);
                out.push((name.lexeme.clone(), *id));
            }
            Expr::Call {
                callee, arguments, ..
            } => {
                walk_expr(callee, out);
                arguments.iter().for_each(|a| walk_expr(a, out));
            }
            Expr::Function(function) => walk_stmts(&function.body, out),
            Expr::Get { object, .. } => walk_expr(object, out),
            Expr::Set { object, value, .. } => {
                walk_expr(object, out);
                walk_expr(value, out);
            }
            Expr::Super { id, keyword, .. } => out.push((keyword.lexeme.clone(), *id)),
            Expr::This { id, keyword } => out.push((keyword.lexeme.clone(), *id)),
        }
    }

    fn walk_stmts(statements: &[Stmt], out: &mut Vec<(String, ExprId)>) {
        for stmt in statements {
            match stmt {
                Stmt::Expression(expr) | Stmt::Print(expr) => walk_expr(expr, out),
                Stmt::Var { initializer, .. } => {
                    if let Some(expr) = initializer {
                        walk_expr(expr, out);
                    }
                }
                Stmt::Block(inner) => walk_stmts(inner, out),
                Stmt::If {
                    condition,
                    then_branch,
                    else_branch,
                } => {
                    walk_expr(condition, out);
                    walk_stmts(std::slice::from_ref(then_branch.as_ref()), out);
                    if let Some(else_branch) = else_branch {
                        walk_stmts(std::slice::from_ref(else_branch.as_ref()), out);
                    }
                }
                Stmt::While { condition, body } => {
                    walk_expr(condition, out);
                    walk_stmts(std::slice::from_ref(body.as_ref()), out);
                }
                Stmt::Function { function, .. } => walk_stmts(&function.body, out),
                Stmt::Return { value, .. } => {
                    if let Some(expr) = value {
                        walk_expr(expr, out);
                    }
                }
                Stmt::Class {
                    superclass,
                    methods,
                    ..
                } => {
                    if let Some(expr) = superclass {
                        walk_expr(expr, out);
                    }
                    for method in methods {
                        walk_stmts(&method.function.body, out);
                    }
                }
            }
        }
    }

    let mut out = Vec::new();
    walk_stmts(statements, &mut out);
    out
}

fn distances(source: &str) -> Vec<(String, Option<usize>)> {
    let (statements, locals, errors) = resolve(source);
    assert!(errors.is_empty(), "unexpected resolve errors: {:?}", errors);

    references(&statements)
        .into_iter()
        .map(|(name, id)| (name, locals.get(&id).copied()))
        .collect()
}

fn entry(name: &str, distance: Option<usize>) -> (String, Option<usize>) {
    (name.to_string(), distance)
}

#[test]
fn nearest_enclosing_declaration_wins() {
    let source = r#"
        var a = "global";
        {
            var a = "outer";
            {
                print a;
                {
                    print a;
                }
            }
        }
        print a;
    "#;

    assert_eq!(
        distances(source),
        vec![entry("a", Some(1)), entry("a", Some(2)), entry("a", None)]
    );
}

#[test]
fn function_parameters_and_closures() {
    let source = r#"
        fun outer(x) {
            var y = 1;
            fun inner() {
                return x + y + z;
            }
            return inner;
        }
    "#;

    // The body shares the parameter scope; `z` is an unresolved global.
    assert_eq!(
        distances(source),
        vec![
            entry("x", Some(1)),
            entry("y", Some(1)),
            entry("z", None),
            entry("inner", Some(0)),
        ]
    );
}

#[test]
fn this_and_super_get_synthetic_scopes() {
    let source = r#"
        class A { greet() { print "A"; } }
        class B < A {
            greet() {
                super.greet();
                print this;
            }
        }
    "#;

    // method body → `this` scope → `super` scope
    assert_eq!(
        distances(source),
        vec![entry("A", None), entry("super", Some(2)), entry("this", Some(1))]
    );
}

#[test]
fn loop_variable_scoped_to_desugared_block() {
    let source = "{ for (var i = 0; i < 2; i = i + 1) print i; }";

    // Inside the desugared loop body block, `i` is one scope up.
    assert_eq!(
        distances(source),
        vec![
            entry("i", Some(0)),
            entry("i", Some(1)),
            entry("i", Some(1)),
            entry("i", Some(1)),
        ]
    );
}

#[test]
fn resolving_twice_yields_same_table() {
    let statements = parse_ok("{ var a = 1; fun f() { return a; } print f(); }");

    let mut errors: Vec<LoxError> = Vec::new();
    let first = Resolver::new().resolve(&statements, &mut errors);
    let second = Resolver::new().resolve(&statements, &mut errors);

    assert!(errors.is_empty());
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
}

#[test]
fn self_referencing_initializer_is_rejected() {
    assert_eq!(
        resolve_errors("{ var a = a; }"),
        vec!["Can't read local variable in its own initializer."]
    );

    // At global scope the read falls through to the global table instead.
    assert!(resolve_errors("var a = a;").is_empty());
}

#[test]
fn redeclaration_only_in_same_scope() {
    assert_eq!(
        resolve_errors("{ var x = 1; var x = 2; }"),
        vec!["Already a variable with this name in this scope."]
    );
    assert!(resolve_errors("{ var x = 1; { var x = 2; } }").is_empty());
    assert!(resolve_errors("var x = 1; var x = 2;").is_empty());
}

#[test]
fn misplaced_return() {
    assert_eq!(
        resolve_errors("return 1;"),
        vec!["Can't return from top-level code."]
    );
    assert_eq!(
        resolve_errors("class A { init() { return 1; } }"),
        vec!["Can't return a value from an initializer."]
    );
    assert!(resolve_errors("class A { init() { return; } }").is_empty());
    assert!(resolve_errors("fun f() { return 1; }").is_empty());
}

#[test]
fn misplaced_this_and_super() {
    assert_eq!(
        resolve_errors("print this;"),
        vec!["Can't use 'this' outside of a class."]
    );
    assert_eq!(
        resolve_errors("fun f() { return this; }"),
        vec!["Can't use 'this' outside of a class."]
    );
    assert_eq!(
        resolve_errors("super.x();"),
        vec!["Can't use 'super' outside of a class."]
    );
    assert_eq!(
        resolve_errors("class A { f() { super.f(); } }"),
        vec!["Can't use 'super' in a class with no superclass."]
    );

    // Nested functions inside a method still see the class.
    assert!(resolve_errors("class A { f() { fun g() { return this; } return g; } }").is_empty());
}

#[test]
fn class_cannot_inherit_from_itself() {
    assert_eq!(
        resolve_errors("class A < A {}"),
        vec!["A class can't inherit from itself."]
    );
}

#[test]
fn resolution_continues_after_errors() {
    let errors = resolve_errors("return 1; { var a = a; } print this;");

    assert_eq!(errors.len(), 3);
}
