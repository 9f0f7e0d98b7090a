//! Tree‑walking evaluator.
//!
//! The only mutable execution state is `environment`, the scope statements
//! currently run in. [`Interpreter::execute_block`] swaps it in and puts the
//! previous one back on every exit path, including errors and `return`.
//!
//! Non‑local exits travel as [`Interrupt`] values through ordinary `?`
//! propagation: `Return` stops at the nearest call boundary, `Error` at
//! [`Interpreter::interpret`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::mem;
use std::rc::Rc;

use log::{debug, info};
use thiserror::Error;

use crate::ast::{Expr, ExprId, FunctionDecl, LiteralValue, MethodDecl, Stmt};
use crate::callable::{self, LoxFunction};
use crate::class::{LoxClass, LoxInstance, INITIALIZER};
use crate::environment::{Environment, SharedEnv};
use crate::error::{LoxError, Report, Result};
use crate::resolver::Resolver;
use crate::stack::ensure_sufficient_stack;
use crate::token::{Token, TokenType};
use crate::value::Value;

#[derive(Error, Debug)]
pub enum Interrupt {
    #[error(transparent)]
    Error(#[from] LoxError),

    #[error("Return signal with value: {value}")]
    Return { value: Value, keyword: Token },
}

/// Convenient alias for interpreter results.
pub type IResult<T> = std::result::Result<T, Interrupt>;

pub struct Interpreter {
    globals: SharedEnv,
    environment: SharedEnv,
    locals: HashMap<ExprId, usize>,
    stdout: Rc<RefCell<dyn Write>>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Creates a new Interpreter printing to stdout.
    pub fn new() -> Self {
        Self::with_output(Rc::new(RefCell::new(std::io::stdout())))
    }

    /// Creates a new Interpreter whose `print` output goes to `stdout`, and
    /// defines native functions such as `clock`.
    pub fn with_output(stdout: Rc<RefCell<dyn Write>>) -> Self {
        info!("Initializing Interpreter");

        let globals: SharedEnv = Environment::new().shared();

        debug!("Defining native function 'clock'");
        globals
            .borrow_mut()
            .define("clock", Value::NativeFunction(Rc::new(callable::clock())));

        Self {
            environment: Rc::clone(&globals),
            globals,
            locals: HashMap::new(),
            stdout,
        }
    }

    /// Run the resolver over `statements` and merge its distance table into
    /// this interpreter's. Errors go to `reporter`.
    pub fn resolve(&mut self, statements: &[Stmt], reporter: &mut dyn Report) {
        let locals = Resolver::new().resolve(statements, reporter);
        self.locals.extend(locals);
    }

    /// Interprets a list of statements (a "program"). Stops at the first
    /// runtime error. Globals defined before the error remain.
    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<()> {
        debug!("Interpreting {} statements", statements.len());

        self.environment = Rc::clone(&self.globals);

        for stmt in statements {
            match self.execute(stmt) {
                Ok(()) => {}
                Err(Interrupt::Error(e)) => return Err(e),
                Err(Interrupt::Return { keyword, .. }) => {
                    return Err(LoxError::runtime(
                        &keyword,
                        "Can't return from top-level code.",
                    ));
                }
            }
        }

        info!("Interpretation completed successfully");
        Ok(())
    }

    /// Run `statements` inside `environment`, restoring the current scope
    /// afterwards no matter how the block exits.
    pub fn execute_block(&mut self, statements: &[Stmt], environment: SharedEnv) -> IResult<()> {
        let previous: SharedEnv = mem::replace(&mut self.environment, environment);

        let result: IResult<()> = statements.iter().try_for_each(|stmt| self.execute(stmt));

        self.environment = previous;

        result
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statements
    // ─────────────────────────────────────────────────────────────────────────

    /// Executes a single statement.
    pub fn execute(&mut self, stmt: &Stmt) -> IResult<()> {
        ensure_sufficient_stack(|| self.execute_stmt(stmt))
    }

    fn execute_stmt(&mut self, stmt: &Stmt) -> IResult<()> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;
                Ok(())
            }

            Stmt::Print(expr) => self.execute_print(expr),

            Stmt::Var { name, initializer } => self.execute_var(name, initializer.as_ref()),

            Stmt::Block(statements) => {
                let environment: SharedEnv =
                    Environment::with_enclosing(Rc::clone(&self.environment)).shared();
                self.execute_block(statements, environment)
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)
                } else if let Some(else_stmt) = else_branch {
                    self.execute(else_stmt)
                } else {
                    Ok(())
                }
            }

            Stmt::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    self.execute(body)?;
                }
                Ok(())
            }

            Stmt::Function { name, function } => {
                self.execute_function(name, function);
                Ok(())
            }

            Stmt::Return { keyword, value } => self.execute_return(keyword, value.as_ref()),

            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.execute_class(name, superclass.as_ref(), methods),
        }
    }

    fn execute_print(&mut self, expr: &Expr) -> IResult<()> {
        let value: Value = self.evaluate(expr)?;
        writeln!(self.stdout.borrow_mut(), "{}", value).map_err(LoxError::from)?;
        Ok(())
    }

    fn execute_var(&mut self, name: &Token, initializer: Option<&Expr>) -> IResult<()> {
        let value: Value = match initializer {
            Some(expr) => self.evaluate(expr)?,
            None => Value::Nil,
        };

        debug!("Defining variable '{}' = {}", name.lexeme, value);

        self.environment.borrow_mut().define(&name.lexeme, value);
        Ok(())
    }

    fn execute_function(&mut self, name: &Token, function: &Rc<FunctionDecl>) {
        debug!("Defining function '{}'", name.lexeme);

        let function = LoxFunction::new(
            Some(name.lexeme.clone()),
            Rc::clone(function),
            Rc::clone(&self.environment),
            false,
        );

        self.environment
            .borrow_mut()
            .define(&name.lexeme, Value::Function(Rc::new(function)));
    }

    fn execute_return(&mut self, keyword: &Token, value: Option<&Expr>) -> IResult<()> {
        let value: Value = match value {
            Some(expr) => self.evaluate(expr)?,
            None => Value::Nil,
        };

        debug!("Returning value: {}", value);

        Err(Interrupt::Return {
            value,
            keyword: keyword.clone(),
        })
    }

    fn execute_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[MethodDecl],
    ) -> IResult<()> {
        debug!("Declaring class '{}'", name.lexeme);

        let superclass: Option<Rc<LoxClass>> = match superclass {
            Some(expr) => match self.evaluate(expr)? {
                Value::Class(class) => Some(class),
                _ => {
                    let token: &Token = match expr {
                        Expr::Variable { name, .. } => name,
                        _ => name,
                    };
                    return Err(LoxError::runtime(token, "Superclass must be a class.").into());
                }
            },
            None => None,
        };

        // Reserve the name first so methods can refer to their own class.
        self.environment.borrow_mut().define(&name.lexeme, Value::Nil);

        let enclosing: Option<SharedEnv> = superclass.as_ref().map(|superclass| {
            let mut scope: Environment = Environment::with_enclosing(Rc::clone(&self.environment));
            scope.define("super", Value::Class(Rc::clone(superclass)));
            mem::replace(&mut self.environment, scope.shared())
        });

        let methods: HashMap<String, Rc<LoxFunction>> = methods
            .iter()
            .map(|method| {
                let function = LoxFunction::new(
                    Some(method.name.lexeme.clone()),
                    Rc::clone(&method.function),
                    Rc::clone(&self.environment),
                    method.name.lexeme == INITIALIZER,
                );
                (method.name.lexeme.clone(), Rc::new(function))
            })
            .collect();

        let class = LoxClass::new(name.lexeme.clone(), superclass, methods);

        if let Some(previous) = enclosing {
            self.environment = previous;
        }

        self.environment
            .borrow_mut()
            .assign(name, Value::Class(Rc::new(class)))?;

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expressions
    // ─────────────────────────────────────────────────────────────────────────

    /// Evaluates an expression and returns a Value.
    pub fn evaluate(&mut self, expr: &Expr) -> IResult<Value> {
        ensure_sufficient_stack(|| self.evaluate_expr(expr))
    }

    fn evaluate_expr(&mut self, expr: &Expr) -> IResult<Value> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                LiteralValue::Number(n) => Value::Number(*n),
                LiteralValue::Str(s) => Value::String(s.clone()),
                LiteralValue::Bool(b) => Value::Bool(*b),
                LiteralValue::Nil => Value::Nil,
            }),

            Expr::Grouping(inner) => self.evaluate(inner),

            Expr::Unary { operator, right } => self.evaluate_unary(operator, right),

            Expr::Binary {
                left,
                operator,
                right,
            } => self.evaluate_binary(left, operator, right),

            Expr::Logical {
                left,
                operator,
                right,
            } => self.evaluate_logical(left, operator, right),

            Expr::Variable { id, name } => self.look_up_variable(*id, name),

            Expr::Assign { id, name, value } => self.evaluate_assign(*id, name, value),

            Expr::Call {
                callee,
                paren,
                arguments,
            } => self.evaluate_call(callee, paren, arguments),

            Expr::Function(function) => {
                // Captures the live scope, not a snapshot of it.
                let function =
                    LoxFunction::new(None, Rc::clone(function), Rc::clone(&self.environment), false);
                Ok(Value::Function(Rc::new(function)))
            }

            Expr::Get { object, name } => self.evaluate_get(object, name),

            Expr::Set {
                object,
                name,
                value,
            } => self.evaluate_set(object, name, value),

            Expr::Super {
                id,
                keyword,
                method,
            } => self.evaluate_super(*id, keyword, method),

            Expr::This { id, keyword } => self.look_up_variable(*id, keyword),
        }
    }

    fn evaluate_logical(&mut self, left: &Expr, operator: &Token, right: &Expr) -> IResult<Value> {
        let left_val: Value = self.evaluate(left)?;

        let short_circuit: bool = if operator.token_type == TokenType::OR {
            left_val.is_truthy()
        } else {
            !left_val.is_truthy()
        };

        if short_circuit {
            Ok(left_val)
        } else {
            self.evaluate(right)
        }
    }

    fn evaluate_assign(&mut self, id: ExprId, name: &Token, value: &Expr) -> IResult<Value> {
        let value: Value = self.evaluate(value)?;

        match self.locals.get(&id) {
            Some(&distance) => {
                Environment::assign_at(&self.environment, distance, name, value.clone())?
            }
            None => self.globals.borrow_mut().assign(name, value.clone())?,
        }

        Ok(value)
    }

    fn evaluate_call(&mut self, callee: &Expr, paren: &Token, arguments: &[Expr]) -> IResult<Value> {
        let callee_val: Value = self.evaluate(callee)?;

        let mut arg_values: Vec<Value> = Vec::with_capacity(arguments.len());
        for arg in arguments {
            arg_values.push(self.evaluate(arg)?);
        }

        self.call_value(callee_val, paren, arg_values)
    }

    fn evaluate_get(&mut self, object: &Expr, name: &Token) -> IResult<Value> {
        match self.evaluate(object)? {
            Value::Instance(instance) => Ok(LoxInstance::get(&instance, name)?),
            _ => Err(LoxError::runtime(name, "Only instances have properties.").into()),
        }
    }

    fn evaluate_set(&mut self, object: &Expr, name: &Token, value: &Expr) -> IResult<Value> {
        let Value::Instance(instance) = self.evaluate(object)? else {
            return Err(LoxError::runtime(name, "Only instances have fields.").into());
        };

        let value: Value = self.evaluate(value)?;
        instance.borrow_mut().set(name, value.clone());

        Ok(value)
    }

    fn evaluate_unary(&mut self, operator: &Token, right: &Expr) -> IResult<Value> {
        let right_val: Value = self.evaluate(right)?;

        match operator.token_type {
            TokenType::MINUS => match right_val {
                Value::Number(n) => Ok(Value::Number(-n)),
                _ => Err(LoxError::runtime(operator, "Operand must be a number.").into()),
            },
            TokenType::BANG => Ok(Value::Bool(!right_val.is_truthy())),
            _ => Err(LoxError::runtime(operator, "Invalid unary operator.").into()),
        }
    }

    fn evaluate_binary(&mut self, left: &Expr, operator: &Token, right: &Expr) -> IResult<Value> {
        let left_val: Value = self.evaluate(left)?;
        let right_val: Value = self.evaluate(right)?;

        debug!(
            "Binary {} on {} and {}",
            operator.lexeme,
            left_val.type_name(),
            right_val.type_name()
        );

        let value: Value = match operator.token_type {
            TokenType::EQUAL_EQUAL => Value::Bool(left_val == right_val),
            TokenType::BANG_EQUAL => Value::Bool(left_val != right_val),

            TokenType::PLUS => match (left_val, right_val) {
                (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
                (Value::String(a), right_val) => Value::String(format!("{}{}", a, right_val)),
                _ => {
                    return Err(LoxError::runtime(
                        operator,
                        "Operands must be two numbers or a string on the left.",
                    )
                    .into());
                }
            },

            _ => {
                let (Value::Number(a), Value::Number(b)) = (&left_val, &right_val) else {
                    return Err(LoxError::runtime(operator, "Operands must be numbers.").into());
                };
                let (a, b): (f64, f64) = (*a, *b);

                match operator.token_type {
                    TokenType::MINUS => Value::Number(a - b),
                    TokenType::STAR => Value::Number(a * b),
                    TokenType::SLASH => Value::Number(a / b),
                    TokenType::GREATER => Value::Bool(a > b),
                    TokenType::GREATER_EQUAL => Value::Bool(a >= b),
                    TokenType::LESS => Value::Bool(a < b),
                    TokenType::LESS_EQUAL => Value::Bool(a <= b),
                    _ => {
                        return Err(
                            LoxError::runtime(operator, "Invalid binary operator.").into()
                        );
                    }
                }
            }
        };

        Ok(value)
    }

    /// Resolved locals are read at their recorded depth; anything else is a
    /// global.
    fn look_up_variable(&self, id: ExprId, name: &Token) -> IResult<Value> {
        match self.locals.get(&id) {
            Some(&distance) => Environment::get_at(&self.environment, distance, &name.lexeme)
                .ok_or_else(|| {
                    LoxError::runtime(name, format!("Undefined variable '{}'.", name.lexeme))
                        .into()
                }),
            None => Ok(self.globals.borrow().get(name)?),
        }
    }

    /// `super.method`: look the method up on the superclass captured where
    /// the class was declared, then bind it to the `this` one scope closer.
    fn evaluate_super(&mut self, id: ExprId, keyword: &Token, method: &Token) -> IResult<Value> {
        let distance: usize = *self.locals.get(&id).ok_or_else(|| {
            LoxError::runtime(keyword, "Can't use 'super' outside of a class.")
        })?;

        let Some(Value::Class(superclass)) =
            Environment::get_at(&self.environment, distance, "super")
        else {
            return Err(LoxError::runtime(keyword, "Superclass must be a class.").into());
        };

        let object: Value = distance
            .checked_sub(1)
            .and_then(|depth| Environment::get_at(&self.environment, depth, "this"))
            .unwrap_or(Value::Nil);

        let method: Rc<LoxFunction> = superclass.find_method(&method.lexeme).ok_or_else(|| {
            LoxError::runtime(method, format!("Undefined property '{}'.", method.lexeme))
        })?;

        Ok(Value::Function(Rc::new(method.bind(object))))
    }

    /// Invokes a callable: native function, user function or class.
    fn call_value(&mut self, callee: Value, paren: &Token, arguments: Vec<Value>) -> IResult<Value> {
        let arity: usize = match &callee {
            Value::NativeFunction(native) => native.arity,
            Value::Function(function) => function.arity(),
            Value::Class(class) => class.arity(),
            _ => {
                return Err(
                    LoxError::runtime(paren, "Can only call functions and classes.").into(),
                );
            }
        };

        if arguments.len() < arity {
            return Err(LoxError::runtime(
                paren,
                format!(
                    "Too few arguments: expected {} but got {}.",
                    arity,
                    arguments.len()
                ),
            )
            .into());
        }

        if arguments.len() > arity {
            return Err(LoxError::runtime(
                paren,
                format!(
                    "Too many arguments: expected {} but got {}.",
                    arity,
                    arguments.len()
                ),
            )
            .into());
        }

        match callee {
            Value::NativeFunction(native) => {
                debug!("Calling native function '{}'", native.name);
                (native.func)(&arguments).map_err(|message| LoxError::runtime(paren, message).into())
            }
            Value::Function(function) => function.call(self, arguments),
            Value::Class(class) => LoxClass::instantiate(&class, self, arguments),
            _ => Err(LoxError::runtime(paren, "Can only call functions and classes.").into()),
        }
    }
}
