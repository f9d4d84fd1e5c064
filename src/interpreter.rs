//! Tree‑walking evaluator.
//!
//! Statements execute for effect and report how control left them through
//! [`Flow`]; a `return` travels outward as `Flow::Return` until the call
//! boundary that invoked the function turns it back into a value.  Errors
//! are ordinary `Err(LoxError)` values and never carry control flow.
//!
//! Variable access uses the distances the resolver stored on each node:
//! a resolved node addresses its scope directly, an unresolved one goes to
//! the globals.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Stdout, Write};
use std::mem;
use std::rc::Rc;

use log::{debug, info};

use crate::ast::{ClassDecl, Depth, Expr, LiteralValue, Stmt};
use crate::class::{LoxClass, LoxInstance};
use crate::environment::{EnvRef, Environment};
use crate::error::{LoxError, Result};
use crate::function::{self, Callable, LoxFunction};
use crate::heap::Heap;
use crate::stack::ensure_sufficient_stack;
use crate::token::{Token, TokenType};
use crate::value::Value;

/// Default budget of nested calls before reporting a stack overflow.
pub const DEFAULT_MAX_DEPTH: usize = 1024;

/// How a statement finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Return(Value),
}

pub struct Interpreter<W: Write = Stdout> {
    globals: EnvRef,
    environment: EnvRef,
    output: W,
    call_depth: usize,
    max_depth: usize,
    /// Declared last: dropped after the scope handles above, so its final
    /// collection sees only what outlives the interpreter.
    heap: Heap,
}

impl Interpreter<Stdout> {
    /// An interpreter printing to standard output.
    pub fn new() -> Self {
        Self::with_output(io::stdout())
    }
}

impl Default for Interpreter<Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> Interpreter<W> {
    /// An interpreter whose `print` statements write to `output`.
    pub fn with_output(output: W) -> Self {
        info!("Initializing Interpreter");

        let globals = Environment::new().into_ref();

        for native in function::globals() {
            debug!("Defining native function '{}'", native.name);
            globals
                .borrow_mut()
                .define(native.name, Value::Native(native));
        }

        let mut heap = Heap::new();
        heap.track_scope(&globals);

        Self {
            environment: Rc::clone(&globals),
            globals,
            output,
            call_depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            heap,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Runs a program.  The first runtime error aborts the remaining
    /// statements; globals defined so far persist for the next call.
    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<()> {
        info!("Interpreting {} statement(s)", statements.len());

        // A failed nested call may leave us in an inner scope.
        self.environment = Rc::clone(&self.globals);
        self.call_depth = 0;

        for stmt in statements {
            self.execute(stmt)?;
        }

        self.heap.collect_if_due();
        self.output.flush()?;

        info!("Interpretation completed successfully");
        Ok(())
    }

    // ───────────────────────────── statements ─────────────────────────────

    pub fn execute(&mut self, stmt: &Stmt) -> Result<Flow> {
        ensure_sufficient_stack(|| self.execute_inner(stmt))
    }

    fn execute_inner(&mut self, stmt: &Stmt) -> Result<Flow> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;
            }

            Stmt::Print(expr) => {
                let value = self.evaluate(expr)?;
                writeln!(self.output, "{}", value)?;
                debug!("Printed value: {}", value);
            }

            Stmt::Var { name, initializer } => {
                let value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                debug!("Defining variable '{}' = {}", name.lexeme, value);
                self.environment.borrow_mut().define(&name.lexeme, value);
            }

            Stmt::Block(statements) => {
                let env = Environment::with_enclosing(Rc::clone(&self.environment));
                return self.execute_block(statements, env.into_ref());
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    return self.execute(then_branch);
                } else if let Some(else_branch) = else_branch {
                    return self.execute(else_branch);
                }
            }

            Stmt::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    if let Flow::Return(value) = self.execute(body)? {
                        return Ok(Flow::Return(value));
                    }
                }
            }

            Stmt::Function(declaration) => {
                debug!("Defining function '{}'", declaration.name.lexeme);
                let function = LoxFunction::new(
                    Rc::clone(declaration),
                    Rc::clone(&self.environment),
                    false,
                );
                self.environment.borrow_mut().define(
                    &declaration.name.lexeme,
                    Value::Function(Rc::new(function)),
                );
            }

            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                debug!("Returning value: {}", value);
                return Ok(Flow::Return(value));
            }

            Stmt::Class(class) => self.declare_class(class)?,
        }

        Ok(Flow::Normal)
    }

    /// Runs `statements` inside `env`, restoring the current scope however
    /// the block exits.
    pub fn execute_block(&mut self, statements: &[Stmt], env: EnvRef) -> Result<Flow> {
        let previous = mem::replace(&mut self.environment, env);

        let mut result = Ok(Flow::Normal);
        for stmt in statements {
            match self.execute(stmt) {
                Ok(Flow::Normal) => {}
                other => {
                    result = other;
                    break;
                }
            }
        }

        let scope = mem::replace(&mut self.environment, previous);
        self.release_scope(scope);
        result
    }

    /// A scope still referenced once its block is done was captured by a
    /// closure and may sit in a cycle with it.
    fn release_scope(&mut self, scope: EnvRef) {
        if Rc::strong_count(&scope) > 1 {
            self.heap.track_scope(&scope);
        }
        drop(scope);

        self.heap.collect_if_due();
    }

    pub(crate) fn track_instance(&mut self, instance: &Rc<RefCell<LoxInstance>>) {
        self.heap.track_instance(instance);
    }

    fn declare_class(&mut self, class: &ClassDecl) -> Result<()> {
        debug!("Declaring class '{}'", class.name.lexeme);

        let superclass = match &class.superclass {
            Some(expr) => match self.evaluate(expr)? {
                Value::Class(superclass) => Some(superclass),
                _ => {
                    let line = match expr {
                        Expr::Variable { name, .. } => name.line,
                        _ => class.name.line,
                    };
                    return Err(LoxError::runtime(line, "Superclass must be a class."));
                }
            },
            None => None,
        };

        self.environment
            .borrow_mut()
            .define(&class.name.lexeme, Value::Nil);

        // Methods of a subclass close over a scope holding `super`.
        let method_env = match &superclass {
            Some(superclass) => {
                let mut env = Environment::with_enclosing(Rc::clone(&self.environment));
                env.define("super", Value::Class(Rc::clone(superclass)));
                env.into_ref()
            }
            None => Rc::clone(&self.environment),
        };

        let methods: HashMap<String, Rc<LoxFunction>> = class
            .methods
            .iter()
            .map(|method| {
                let is_initializer = method.name.lexeme == "init";
                let function =
                    LoxFunction::new(Rc::clone(method), Rc::clone(&method_env), is_initializer);
                (method.name.lexeme.clone(), Rc::new(function))
            })
            .collect();

        let class_value = LoxClass::new(class.name.lexeme.clone(), superclass, methods);

        self.environment
            .borrow_mut()
            .assign(&class.name, Value::Class(Rc::new(class_value)))
    }

    // ───────────────────────────── expressions ────────────────────────────

    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value> {
        ensure_sufficient_stack(|| self.evaluate_inner(expr))
    }

    fn evaluate_inner(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                LiteralValue::Number(n) => Value::Number(*n),
                LiteralValue::Str(s) => Value::String(s.clone()),
                LiteralValue::True => Value::Bool(true),
                LiteralValue::False => Value::Bool(false),
                LiteralValue::Nil => Value::Nil,
            }),

            Expr::Grouping(inner) => self.evaluate(inner),

            Expr::Unary { operator, right } => {
                let right = self.evaluate(right)?;
                match (operator.token_type, right) {
                    (TokenType::MINUS, Value::Number(n)) => Ok(Value::Number(-n)),
                    (TokenType::MINUS, _) => Err(LoxError::runtime(
                        operator.line,
                        "Operand must be a number.",
                    )),
                    (TokenType::BANG, value) => Ok(Value::Bool(!value.is_truthy())),
                    _ => Err(invalid_operator(operator)),
                }
            }

            Expr::Binary {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                binary(operator, left, right)
            }

            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;
                let short_circuits = match operator.token_type {
                    TokenType::OR => left.is_truthy(),
                    _ => !left.is_truthy(),
                };

                if short_circuits {
                    Ok(left)
                } else {
                    self.evaluate(right)
                }
            }

            Expr::Variable { name, depth } => self.look_up(name, depth),

            Expr::Assign { name, value, depth } => {
                let value = self.evaluate(value)?;

                match depth.get() {
                    Some(distance) => {
                        Environment::assign_at(&self.environment, distance, name, value.clone())?
                    }
                    None => self.globals.borrow_mut().assign(name, value.clone())?,
                }

                Ok(value)
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee = self.evaluate(callee)?;

                let mut values = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    values.push(self.evaluate(argument)?);
                }

                self.call_value(&callee, paren, values)
            }

            Expr::Get { object, name } => match self.evaluate(object)? {
                Value::Instance(instance) => LoxInstance::get(&instance, name),
                _ => Err(LoxError::runtime(
                    name.line,
                    "Only instances have properties.",
                )),
            },

            Expr::Set {
                object,
                name,
                value,
            } => {
                let Value::Instance(instance) = self.evaluate(object)? else {
                    return Err(LoxError::runtime(name.line, "Only instances have fields."));
                };

                let value = self.evaluate(value)?;
                instance.borrow_mut().set(name, value.clone());
                Ok(value)
            }

            Expr::This { keyword, depth } => self.look_up(keyword, depth),

            Expr::Super {
                keyword,
                method,
                depth,
            } => self.super_method(keyword, method, depth),
        }
    }

    fn look_up(&self, name: &Token, depth: &Depth) -> Result<Value> {
        match depth.get() {
            Some(distance) => {
                Environment::get_at(&self.environment, distance, &name.lexeme, name.line)
            }
            None => self.globals.borrow().get(name),
        }
    }

    /// `super.method`: look up from the superclass of the class whose
    /// methods enclose the expression, then bind to the current `this`.
    fn super_method(&self, keyword: &Token, method: &Token, depth: &Depth) -> Result<Value> {
        let distance = depth.get().ok_or_else(|| {
            LoxError::runtime(keyword.line, "Can't use 'super' outside of a class.")
        })?;

        let superclass = match Environment::get_at(
            &self.environment,
            distance,
            "super",
            keyword.line,
        )? {
            Value::Class(class) => class,
            _ => {
                return Err(LoxError::runtime(
                    keyword.line,
                    "Superclass must be a class.",
                ))
            }
        };

        // `this` lives in the scope just inside the one holding `super`.
        let instance = match Environment::get_at(
            &self.environment,
            distance.saturating_sub(1),
            "this",
            keyword.line,
        )? {
            Value::Instance(instance) => instance,
            _ => {
                return Err(LoxError::runtime(
                    keyword.line,
                    "Can't use 'super' outside of a method.",
                ))
            }
        };

        let found = superclass.find_method(&method.lexeme).ok_or_else(|| {
            LoxError::runtime(
                method.line,
                format!("Undefined property '{}'.", method.lexeme),
            )
        })?;

        Ok(Value::Function(Rc::new(found.bind(instance))))
    }

    // ──────────────────────────────── calls ───────────────────────────────

    fn call_value(&mut self, callee: &Value, paren: &Token, arguments: Vec<Value>) -> Result<Value> {
        match callee {
            Value::Native(native) => self.invoke(native, paren, arguments),
            Value::Function(function) => self.invoke(function.as_ref(), paren, arguments),
            Value::Class(class) => self.invoke(class, paren, arguments),
            _ => Err(LoxError::runtime(
                paren.line,
                "Can only call functions and classes.",
            )),
        }
    }

    /// Checks arity and the depth budget around a single call.
    fn invoke<C: Callable>(
        &mut self,
        callee: &C,
        paren: &Token,
        arguments: Vec<Value>,
    ) -> Result<Value> {
        if arguments.len() != callee.arity() {
            return Err(LoxError::runtime(
                paren.line,
                format!(
                    "Expected {} arguments but got {}.",
                    callee.arity(),
                    arguments.len()
                ),
            ));
        }

        if self.call_depth >= self.max_depth {
            debug!("Call depth budget {} exhausted", self.max_depth);
            return Err(LoxError::StackOverflow { line: paren.line });
        }

        self.call_depth += 1;
        let result = callee.call(self, arguments, paren.line);
        self.call_depth -= 1;

        result
    }
}

fn invalid_operator(operator: &Token) -> LoxError {
    LoxError::runtime(
        operator.line,
        format!("Invalid operator '{}'.", operator.lexeme),
    )
}

fn binary(operator: &Token, left: Value, right: Value) -> Result<Value> {
    use Value::{Bool, Number};

    let numbers = || LoxError::runtime(operator.line, "Operands must be numbers.");

    match operator.token_type {
        TokenType::EQUAL_EQUAL => Ok(Bool(left == right)),
        TokenType::BANG_EQUAL => Ok(Bool(left != right)),

        TokenType::PLUS => match (left, right) {
            (Number(a), Number(b)) => Ok(Number(a + b)),
            (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
            _ => Err(LoxError::runtime(
                operator.line,
                "Operands must be two numbers or two strings.",
            )),
        },

        _ => {
            let (Number(a), Number(b)) = (left, right) else {
                return Err(numbers());
            };

            match operator.token_type {
                TokenType::MINUS => Ok(Number(a - b)),
                TokenType::STAR => Ok(Number(a * b)),
                TokenType::SLASH => Ok(Number(a / b)),
                TokenType::GREATER => Ok(Bool(a > b)),
                TokenType::GREATER_EQUAL => Ok(Bool(a >= b)),
                TokenType::LESS => Ok(Bool(a < b)),
                TokenType::LESS_EQUAL => Ok(Bool(a <= b)),
                _ => Err(invalid_operator(operator)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lox;

    fn interpreter() -> Interpreter<Vec<u8>> {
        Interpreter::with_output(Vec::new())
    }

    fn run(interpreter: &mut Interpreter<Vec<u8>>, source: &str) {
        if let Err(e) = lox::run(source.as_bytes(), interpreter) {
            panic!("program failed: {}", e);
        }
    }

    #[test]
    fn local_functions_do_not_accumulate_across_calls() {
        let mut interpreter = interpreter();
        run(
            &mut interpreter,
            "fun outer() {
               var big = \"0123456789012345678901234567890123456789\";
               fun inner() { return big; }
             }
             for (var i = 0; i < 5000; i = i + 1) outer();",
        );

        interpreter.heap.collect();

        // Only the globals remain tracked.
        assert_eq!(interpreter.heap.tracked(), 1);
    }

    #[test]
    fn classes_declared_in_a_function_are_reclaimed() {
        let mut interpreter = interpreter();
        run(
            &mut interpreter,
            "class Base { hello() { return 1; } }
             fun make() {
               class Local < Base { hello() { return super.hello() + 1; } }
               return Local().hello();
             }
             for (var i = 0; i < 200; i = i + 1) make();",
        );

        interpreter.heap.collect();

        assert_eq!(interpreter.heap.tracked(), 1);
    }

    #[test]
    fn escaped_closure_survives_collection_and_dropped_one_does_not() {
        let mut interpreter = interpreter();
        run(
            &mut interpreter,
            "fun counter() {
               var n = 0;
               fun next() { n = n + 1; return n; }
               return next;
             }
             var keep = counter();
             var gone = counter();
             keep();
             gone();",
        );

        let Ok(Value::Function(gone)) = lox::evaluate(b"gone", &mut interpreter) else {
            panic!("gone should be a function");
        };
        let gone_scope = Rc::downgrade(gone.closure());
        drop(gone);

        run(&mut interpreter, "gone = nil;");
        interpreter.heap.collect();

        assert!(gone_scope.upgrade().is_none());
        // The globals and the scope captured by `keep`.
        assert_eq!(interpreter.heap.tracked(), 2);

        run(&mut interpreter, "print keep();");
        assert_eq!(interpreter.into_output(), b"2\n");
    }

    #[test]
    fn dropping_the_interpreter_frees_global_cycles() {
        let mut interpreter = interpreter();
        run(
            &mut interpreter,
            "fun counter() {
               var n = 0;
               fun next() { n = n + 1; return n; }
               return next;
             }
             var c = counter();",
        );

        let Ok(Value::Function(c)) = lox::evaluate(b"c", &mut interpreter) else {
            panic!("c should be a function");
        };
        let scope = Rc::downgrade(c.closure());
        drop(c);

        drop(interpreter);
        assert!(scope.upgrade().is_none());
    }
}
