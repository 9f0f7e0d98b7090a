//! Static resolver pass for the **Lox** interpreter.
//!
//! This resolver does three things in one AST walk:
//! 1. Build lexical scopes (stack of `HashMap<String, bool>` tracking declared/defined).
//! 2. Report static errors (redeclaration, read in own initializer, misplaced
//!    `return` / `this` / `super`, self‑inheritance). Errors never stop the walk.
//! 3. Record, for *each* local variable occurrence, how many scopes sit between
//!    the reference and its declaration. Names found in no scope are globals and
//!    get no entry; the interpreter looks them up dynamically.
//!
//! The current function and class kind travel down the walk as an explicit
//! [`Context`] value, so nested declarations restore the outer kind simply by
//! returning.

use crate::ast::{Expr, ExprId, FunctionDecl, Stmt};
use crate::class::INITIALIZER;
use crate::error::{LoxError, Report};
use crate::stack::ensure_sufficient_stack;
use crate::token::Token;
use log::{debug, info};
use std::collections::HashMap;

/// Variable‑distance side table: node identity → number of scopes to skip.
pub type Locals = HashMap<ExprId, usize>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FunctionType {
    None,
    Function,
    Method,
    Initializer,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

/// What kind of function and class body the walk is currently inside.
#[derive(Copy, Clone, Debug)]
struct Context {
    function: FunctionType,
    class: ClassType,
}

impl Context {
    const TOP_LEVEL: Context = Context {
        function: FunctionType::None,
        class: ClassType::None,
    };
}

/// Resolver: tracks scopes, enforces static rules, and *records* binding
/// distances for locals.
#[derive(Default)]
pub struct Resolver {
    scopes: Vec<HashMap<String, bool>>, // false=declared, true=defined
    locals: Locals,
    errors: Vec<LoxError>,
}

impl Resolver {
    pub fn new() -> Self {
        info!("Resolver instantiated");

        Self::default()
    }

    /// Walk all top‑level statements, report every violation and return the
    /// distance table.
    pub fn resolve(mut self, statements: &[Stmt], reporter: &mut dyn Report) -> Locals {
        info!(
            "Beginning resolve pass over {} statement(s)",
            statements.len()
        );

        self.resolve_stmts(statements, Context::TOP_LEVEL);

        info!(
            "Resolved {} local reference(s), {} error(s)",
            self.locals.len(),
            self.errors.len()
        );

        for error in self.errors {
            reporter.report(error);
        }

        self.locals
    }

    fn resolve_stmts(&mut self, statements: &[Stmt], ctx: Context) {
        for stmt in statements {
            self.resolve_stmt(stmt, ctx);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statement resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_stmt(&mut self, stmt: &Stmt, ctx: Context) {
        ensure_sufficient_stack(|| self.resolve_stmt_kind(stmt, ctx))
    }

    fn resolve_stmt_kind(&mut self, stmt: &Stmt, ctx: Context) {
        match stmt {
            Stmt::Block(statements) => {
                self.begin_scope();
                self.resolve_stmts(statements, ctx);
                self.end_scope();
            }

            Stmt::Var { name, initializer } => {
                // declare → resolve initializer → define
                self.declare(name);
                if let Some(expr) = initializer {
                    self.resolve_expr(expr, ctx);
                }
                self.define(name);
            }

            Stmt::Function { name, function } => {
                // name is visible inside its own body, for recursion
                self.declare(name);
                self.define(name);
                self.resolve_function(function, FunctionType::Function, ctx);
            }

            Stmt::Expression(expr) | Stmt::Print(expr) => {
                self.resolve_expr(expr, ctx);
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition, ctx);
                self.resolve_stmt(then_branch, ctx);
                if let Some(eb) = else_branch.as_deref() {
                    self.resolve_stmt(eb, ctx);
                }
            }

            Stmt::While { condition, body } => {
                self.resolve_expr(condition, ctx);
                self.resolve_stmt(body, ctx);
            }

            Stmt::Return { keyword, value } => {
                if ctx.function == FunctionType::None {
                    self.error(keyword, "Can't return from top-level code.");
                }

                if let Some(expr) = value {
                    if ctx.function == FunctionType::Initializer {
                        self.error(keyword, "Can't return a value from an initializer.");
                    }

                    self.resolve_expr(expr, ctx);
                }
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => {
                let mut class_ctx = Context {
                    class: ClassType::Class,
                    ..ctx
                };

                self.declare(name);
                self.define(name);

                if let Some(superclass) = superclass {
                    if let Expr::Variable {
                        name: superclass_name,
                        ..
                    } = superclass
                    {
                        if superclass_name.lexeme == name.lexeme {
                            self.error(superclass_name, "A class can't inherit from itself.");
                        }
                    }

                    class_ctx.class = ClassType::Subclass;
                    self.resolve_expr(superclass, ctx);

                    self.begin_scope();
                    self.bind_synthetic("super");
                }

                self.begin_scope();
                self.bind_synthetic("this");

                for method in methods {
                    let kind = if method.name.lexeme == INITIALIZER {
                        FunctionType::Initializer
                    } else {
                        FunctionType::Method
                    };

                    self.resolve_function(&method.function, kind, class_ctx);
                }

                self.end_scope();

                if superclass.is_some() {
                    self.end_scope();
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expression resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_expr(&mut self, expr: &Expr, ctx: Context) {
        ensure_sufficient_stack(|| self.resolve_expr_kind(expr, ctx))
    }

    fn resolve_expr_kind(&mut self, expr: &Expr, ctx: Context) {
        match expr {
            Expr::Literal(_) => {}

            Expr::Grouping(inner) => self.resolve_expr(inner, ctx),

            Expr::Unary { right, .. } => self.resolve_expr(right, ctx),

            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left, ctx);
                self.resolve_expr(right, ctx);
            }

            Expr::Variable { id, name } => {
                let in_own_initializer: bool = self
                    .scopes
                    .last()
                    .is_some_and(|scope| scope.get(&name.lexeme) == Some(&false));

                if in_own_initializer {
                    self.error(name, "Can't read local variable in its own initializer.");
                }

                self.resolve_local(*id, name);
            }

            Expr::Assign { id, name, value } => {
                // RHS first, then bind LHS
                self.resolve_expr(value, ctx);
                self.resolve_local(*id, name);
            }

            Expr::Call {
                callee, arguments, ..
            } => {
                self.resolve_expr(callee, ctx);
                for arg in arguments {
                    self.resolve_expr(arg, ctx);
                }
            }

            Expr::Function(function) => {
                self.resolve_function(function, FunctionType::Function, ctx);
            }

            Expr::Get { object, .. } => self.resolve_expr(object, ctx),

            Expr::Set { object, value, .. } => {
                self.resolve_expr(object, ctx);
                self.resolve_expr(value, ctx);
            }

            Expr::Super { id, keyword, .. } => {
                match ctx.class {
                    ClassType::None => {
                        self.error(keyword, "Can't use 'super' outside of a class.");
                    }
                    ClassType::Class => {
                        self.error(keyword, "Can't use 'super' in a class with no superclass.");
                    }
                    ClassType::Subclass => {}
                }

                self.resolve_local(*id, keyword);
            }

            Expr::This { id, keyword } => {
                if ctx.class == ClassType::None {
                    self.error(keyword, "Can't use 'this' outside of a class.");
                    return;
                }

                self.resolve_local(*id, keyword);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Function helper
    // ─────────────────────────────────────────────────────────────────────────

    /// Enter a fresh scope for a function's parameters + body.
    fn resolve_function(&mut self, function: &FunctionDecl, kind: FunctionType, ctx: Context) {
        let inner = Context {
            function: kind,
            ..ctx
        };

        self.begin_scope();
        for param in &function.params {
            self.declare(param);
            self.define(param);
        }
        self.resolve_stmts(&function.body, inner);
        self.end_scope();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scope management
    // ─────────────────────────────────────────────────────────────────────────

    #[inline]
    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    #[inline]
    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &Token) {
        let Some(scope) = self.scopes.last_mut() else {
            return; // globals may be redeclared freely
        };

        if scope.contains_key(&name.lexeme) {
            self.error(name, "Already a variable with this name in this scope.");
            return;
        }

        scope.insert(name.lexeme.clone(), false);
    }

    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), true);
        }
    }

    /// `this` / `super` live in their own synthetic scope, already defined.
    fn bind_synthetic(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), true);
        }
    }

    fn error(&mut self, token: &Token, message: &str) {
        self.errors.push(LoxError::resolve(token, message));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Binding‑distance helper
    // ─────────────────────────────────────────────────────────────────────────

    /// Record this occurrence as a local at depth `d` (innermost match wins),
    /// or leave it unrecorded as a global.
    fn resolve_local(&mut self, id: ExprId, name: &Token) {
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(&name.lexeme) {
                debug!("Resolved '{}' {} at depth {}", name.lexeme, id, depth);
                self.locals.insert(id, depth);
                return;
            }
        }

        debug!("Resolved '{}' {} as global", name.lexeme, id);
    }
}
