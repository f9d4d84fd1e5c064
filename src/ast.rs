//! Syntax tree produced by the [`Parser`](crate::parser::Parser).
//!
//! The tree owns its tokens so it can outlive the token buffer and be kept
//! alive by the closures and classes that point into it.  It is immutable
//! after parsing except for the [`Depth`] slots, which the resolver fills in
//! exactly once.
//!
//! Nesting depth is bounded only by the source, so nothing here recurses
//! on the native stack unguarded: serialization grows the stack per level
//! and dropping a tree unlinks it through a worklist.

use std::cell::Cell;
use std::mem;
use std::rc::Rc;

use serde::{Serialize, Serializer};

use crate::stack::ensure_sufficient_stack;
use crate::token::Token;

/// Serializes a child node with enough native stack for its own subtree.
fn nested<T, S>(node: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: Serialize,
    S: Serializer,
{
    ensure_sufficient_stack(|| node.serialize(serializer))
}

/// A **literal constant** that appears directly in the source code.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LiteralValue {
    /// Numeric literal ‑ stored as IEEE‑754 `f64`.
    Number(f64),

    /// String literal without surrounding quotes.
    Str(String),

    True,

    False,

    Nil,
}

/// Resolved scope distance of a variable‑like node.
///
/// `None` means the name was not found in any local scope and is looked up
/// in the global environment at run time.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Depth(Cell<Option<usize>>);

impl Depth {
    pub fn get(&self) -> Option<usize> {
        self.0.get()
    }

    pub fn set(&self, distance: usize) {
        self.0.set(Some(distance));
    }
}

/// **Abstract‑Syntax‑Tree node** representing every kind of *expression*.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    /// A literal constant: number, string, `true`, `false`, or `nil`.
    Literal(LiteralValue),

    /// Prefix unary operator expression: `!isReady` or `-42`.
    Unary {
        /// The operator token (`!` or `-`).
        operator: Token,
        #[serde(serialize_with = "nested")]
        right: Box<Expr>,
    },

    /// Infix arithmetic, comparison or equality expression.
    Binary {
        #[serde(serialize_with = "nested")]
        left: Box<Expr>,
        operator: Token,
        #[serde(serialize_with = "nested")]
        right: Box<Expr>,
    },

    /// Short‑circuiting `and` / `or`.
    Logical {
        #[serde(serialize_with = "nested")]
        left: Box<Expr>,
        operator: Token,
        #[serde(serialize_with = "nested")]
        right: Box<Expr>,
    },

    /// Parenthesised sub‑expression: `"(" expression ")"`.
    Grouping(#[serde(serialize_with = "nested")] Box<Expr>),

    /// Variable access.
    Variable { name: Token, depth: Depth },

    /// Assignment expression: `identifier "=" expression`.
    Assign {
        name: Token,
        #[serde(serialize_with = "nested")]
        value: Box<Expr>,
        depth: Depth,
    },

    /// Function‑ or method‑call expression.
    Call {
        #[serde(serialize_with = "nested")]
        callee: Box<Expr>,
        /// The closing `)` token ‑ retained for error reporting.
        paren: Token,
        #[serde(serialize_with = "nested")]
        arguments: Vec<Expr>,
    },

    /// `object.property`
    Get {
        #[serde(serialize_with = "nested")]
        object: Box<Expr>,
        name: Token,
    },

    /// `object.property = value`
    Set {
        #[serde(serialize_with = "nested")]
        object: Box<Expr>,
        name: Token,
        #[serde(serialize_with = "nested")]
        value: Box<Expr>,
    },

    /// The `this` keyword inside a method.
    This { keyword: Token, depth: Depth },

    /// `super.method`
    Super {
        keyword: Token,
        method: Token,
        depth: Depth,
    },
}

impl Expr {
    pub fn variable(name: Token) -> Self {
        Expr::Variable {
            name,
            depth: Depth::default(),
        }
    }

    /// Moves the direct sub-expressions into `out`, leaving `nil` leaves.
    fn detach_children(&mut self, out: &mut Vec<Expr>) {
        match self {
            Expr::Literal(_) | Expr::Variable { .. } | Expr::This { .. } | Expr::Super { .. } => {}

            Expr::Unary { right: child, .. }
            | Expr::Grouping(child)
            | Expr::Assign { value: child, .. }
            | Expr::Get { object: child, .. } => out.push(mem::take(&mut **child)),

            Expr::Binary { left, right, .. }
            | Expr::Logical { left, right, .. }
            | Expr::Set {
                object: left,
                value: right,
                ..
            } => {
                out.push(mem::take(&mut **left));
                out.push(mem::take(&mut **right));
            }

            Expr::Call {
                callee, arguments, ..
            } => {
                out.push(mem::take(&mut **callee));
                out.append(arguments);
            }
        }
    }
}

impl Default for Expr {
    fn default() -> Self {
        Expr::Literal(LiteralValue::Nil)
    }
}

impl Drop for Expr {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.detach_children(&mut pending);

        while let Some(mut expr) = pending.pop() {
            expr.detach_children(&mut pending);
        }
    }
}

/// A function or method declaration.  Shared by the statement that declares
/// it and every closure created from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDecl {
    pub name: Token,

    /// Parameter name tokens (at most 8).
    pub params: Vec<Token>,

    #[serde(serialize_with = "nested")]
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassDecl {
    pub name: Token,

    /// Always an [`Expr::Variable`] when present.
    pub superclass: Option<Expr>,

    pub methods: Vec<Rc<FunctionDecl>>,
}

/// **Abstract‑Syntax‑Tree node** for *statements*.  A program is a sequence
/// of these nodes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Stmt {
    /// Stand‑alone expression terminated by a semicolon.
    Expression(Expr),

    Print(Expr),

    /// Variable declaration: `"var" IDENT ("=" initializer)? ";"`.
    Var {
        name: Token,
        initializer: Option<Expr>,
    },

    /// Braced scope containing zero or more declarations/statements.
    Block(#[serde(serialize_with = "nested")] Vec<Stmt>),

    If {
        condition: Expr,
        #[serde(serialize_with = "nested")]
        then_branch: Box<Stmt>,
        #[serde(serialize_with = "nested")]
        else_branch: Option<Box<Stmt>>,
    },

    /// `while` loop; `for` loops are desugared into this.
    While {
        condition: Expr,
        #[serde(serialize_with = "nested")]
        body: Box<Stmt>,
    },

    Function(Rc<FunctionDecl>),

    Return {
        /// The `return` keyword token, for error locations.
        keyword: Token,

        /// Absent ⇒ `nil` is returned.
        value: Option<Expr>,
    },

    Class(ClassDecl),
}

impl Stmt {
    /// Moves nested statements into `out`.  Function bodies are only
    /// detached from the last owner of the declaration; closures may still
    /// share it.
    fn detach_children(&mut self, out: &mut Vec<Stmt>) {
        match self {
            Stmt::Block(statements) => out.append(statements),

            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                out.push(mem::take(&mut **then_branch));
                if let Some(else_branch) = else_branch.take() {
                    out.push(*else_branch);
                }
            }

            Stmt::While { body, .. } => out.push(mem::take(&mut **body)),

            Stmt::Function(declaration) => {
                if let Some(declaration) = Rc::get_mut(declaration) {
                    out.append(&mut declaration.body);
                }
            }

            Stmt::Class(class) => {
                for method in &mut class.methods {
                    if let Some(method) = Rc::get_mut(method) {
                        out.append(&mut method.body);
                    }
                }
            }

            Stmt::Expression(_) | Stmt::Print(_) | Stmt::Var { .. } | Stmt::Return { .. } => {}
        }
    }
}

impl Default for Stmt {
    fn default() -> Self {
        Stmt::Block(Vec::new())
    }
}

impl Drop for Stmt {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.detach_children(&mut pending);

        while let Some(mut stmt) = pending.pop() {
            stmt.detach_children(&mut pending);
        }
    }
}
