//! End‑to‑end pipeline: scan → parse → resolve → interpret.
//!
//! Static errors from any front‑end stage are collected together and stop
//! the run before a single statement executes; a runtime error aborts the
//! program that is already running.  The two outcomes stay distinct so a
//! driver can map them to different exit codes.

use std::io::Write;

use log::info;
use thiserror::Error;

use crate::ast::{Expr, Stmt};
use crate::error::LoxError;
use crate::interpreter::Interpreter;
use crate::parser::Parser;
use crate::resolver::Resolver;
use crate::scanner::scan_tokens;
use crate::value::Value;

/// Exit status for programs rejected before execution.
pub const EXIT_STATIC_ERROR: i32 = 65;

/// Exit status for programs that failed while running.
pub const EXIT_RUNTIME_ERROR: i32 = 70;

#[derive(Debug, Error)]
pub enum RunError {
    /// Lex, parse or resolve errors; nothing was executed.
    #[error("{}", render(.0))]
    Static(Vec<LoxError>),

    /// The first runtime error; execution stopped there.
    #[error(transparent)]
    Runtime(LoxError),
}

impl RunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Static(_) => EXIT_STATIC_ERROR,
            RunError::Runtime(_) => EXIT_RUNTIME_ERROR,
        }
    }
}

fn render(errors: &[LoxError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Scan and parse `source` into statements, without resolving.
pub fn parse_program(source: &[u8]) -> Result<Vec<Stmt>, RunError> {
    let (tokens, mut errors) = scan_tokens(source);

    match Parser::new(&tokens).parse() {
        Ok(statements) if errors.is_empty() => Ok(statements),
        Ok(_) => Err(RunError::Static(errors)),
        Err(parse_errors) => {
            errors.extend(parse_errors);
            Err(RunError::Static(errors))
        }
    }
}

/// Scan, parse and resolve `source`.  The returned statements carry their
/// resolved scope distances.
pub fn compile(source: &[u8]) -> Result<Vec<Stmt>, RunError> {
    let statements = parse_program(source)?;

    Resolver::new()
        .resolve(&statements)
        .map_err(RunError::Static)?;

    Ok(statements)
}

/// Compile and execute `source` against `interpreter`'s globals.
pub fn run<W: Write>(source: &[u8], interpreter: &mut Interpreter<W>) -> Result<(), RunError> {
    let statements = compile(source)?;

    info!("Running {} statement(s)", statements.len());

    interpreter
        .interpret(&statements)
        .map_err(RunError::Runtime)
}

/// Compile and evaluate a single expression.
pub fn evaluate<W: Write>(
    source: &[u8],
    interpreter: &mut Interpreter<W>,
) -> Result<Value, RunError> {
    let (tokens, errors) = scan_tokens(source);
    if !errors.is_empty() {
        return Err(RunError::Static(errors));
    }

    let expr: Expr = Parser::new(&tokens)
        .parse_expression()
        .map_err(RunError::Static)?;

    Resolver::new()
        .resolve_expression(&expr)
        .map_err(RunError::Static)?;

    interpreter.evaluate(&expr).map_err(RunError::Runtime)
}
