use crate::ast::{Expr, LiteralValue, Stmt};
use crate::stack::ensure_sufficient_stack;

/// Renders syntax trees in a parenthesised prefix form, for diagnostics.
pub struct AstPrinter;

impl AstPrinter {
    pub fn print(expr: &Expr) -> String {
        let mut out = String::new();
        Self::expr(&mut out, expr);
        out
    }

    pub fn print_stmt(stmt: &Stmt) -> String {
        let mut out = String::new();
        Self::stmt(&mut out, stmt);
        out
    }

    fn expr(out: &mut String, expr: &Expr) {
        ensure_sufficient_stack(|| match expr {
            // ── literals ────────────────────────────────────────────────
            Expr::Literal(lit) => match lit {
                LiteralValue::True => out.push_str("true"),

                LiteralValue::False => out.push_str("false"),

                LiteralValue::Nil => out.push_str("nil"),

                LiteralValue::Str(s) => out.push_str(s),

                LiteralValue::Number(n) => {
                    if n.fract() == 0.0 {
                        // 3.0 stays 3.0
                        out.push_str(&format!("{:.1}", n));
                    } else {
                        out.push_str(&n.to_string());
                    }
                }
            },

            Expr::Grouping(inner) => Self::parenthesize(out, "group", &[&**inner]),

            Expr::Unary { operator, right } => Self::parenthesize(out, &operator.lexeme, &[&**right]),

            Expr::Binary {
                left,
                operator,
                right,
            }
            | Expr::Logical {
                left,
                operator,
                right,
            } => Self::parenthesize(out, &operator.lexeme, &[&**left, &**right]),

            Expr::Variable { name, .. } => out.push_str(&name.lexeme),

            Expr::Assign { name, value, .. } => {
                out.push_str("(= ");
                out.push_str(&name.lexeme);
                out.push(' ');
                Self::expr(out, value);
                out.push(')');
            }

            Expr::Call {
                callee, arguments, ..
            } => {
                out.push_str("(call ");
                Self::expr(out, callee);
                for arg in arguments {
                    out.push(' ');
                    Self::expr(out, arg);
                }
                out.push(')');
            }

            Expr::Get { object, name } => {
                out.push_str("(. ");
                Self::expr(out, object);
                out.push(' ');
                out.push_str(&name.lexeme);
                out.push(')');
            }

            Expr::Set {
                object,
                name,
                value,
            } => {
                out.push_str("(= (. ");
                Self::expr(out, object);
                out.push(' ');
                out.push_str(&name.lexeme);
                out.push_str(") ");
                Self::expr(out, value);
                out.push(')');
            }

            Expr::This { .. } => out.push_str("this"),

            Expr::Super { method, .. } => {
                out.push_str("(super ");
                out.push_str(&method.lexeme);
                out.push(')');
            }
        })
    }

    fn stmt(out: &mut String, stmt: &Stmt) {
        ensure_sufficient_stack(|| match stmt {
            Stmt::Expression(expr) => Self::parenthesize(out, ";", &[expr]),

            Stmt::Print(expr) => Self::parenthesize(out, "print", &[expr]),

            Stmt::Var { name, initializer } => {
                out.push_str("(var ");
                out.push_str(&name.lexeme);
                if let Some(init) = initializer {
                    out.push(' ');
                    Self::expr(out, init);
                }
                out.push(')');
            }

            Stmt::Block(statements) => Self::sequence(out, "block", statements),

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                out.push_str(if else_branch.is_some() { "(if-else " } else { "(if " });
                Self::expr(out, condition);
                out.push(' ');
                Self::stmt(out, then_branch);
                if let Some(else_branch) = else_branch {
                    out.push(' ');
                    Self::stmt(out, else_branch);
                }
                out.push(')');
            }

            Stmt::While { condition, body } => {
                out.push_str("(while ");
                Self::expr(out, condition);
                out.push(' ');
                Self::stmt(out, body);
                out.push(')');
            }

            Stmt::Function(function) => {
                let params: Vec<&str> = function.params.iter().map(|p| p.lexeme.as_str()).collect();
                out.push_str(&format!("(fun {}({}) ", function.name.lexeme, params.join(" ")));
                Self::sequence(out, "body", &function.body);
                out.push(')');
            }

            Stmt::Return { value, .. } => match value {
                Some(value) => Self::parenthesize(out, "return", &[value]),
                None => out.push_str("(return)"),
            },

            Stmt::Class(class) => {
                out.push_str("(class ");
                out.push_str(&class.name.lexeme);
                if let Some(superclass) = &class.superclass {
                    out.push_str(" < ");
                    Self::expr(out, superclass);
                }
                for method in &class.methods {
                    out.push(' ');
                    Self::stmt(out, &Stmt::Function(method.clone()));
                }
                out.push(')');
            }
        })
    }

    fn parenthesize(out: &mut String, tag: &str, exprs: &[&Expr]) {
        out.push('(');
        out.push_str(tag);
        for expr in exprs {
            out.push(' ');
            Self::expr(out, expr);
        }
        out.push(')');
    }

    fn sequence(out: &mut String, tag: &str, statements: &[Stmt]) {
        out.push('(');
        out.push_str(tag);
        for stmt in statements {
            out.push(' ');
            Self::stmt(out, stmt);
        }
        out.push(')');
    }
}
