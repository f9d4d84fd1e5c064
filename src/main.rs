use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use clap::Subcommand;
use env_logger::Builder;
use log::{debug, info};

use treelox::ast_printer::AstPrinter;
use treelox::interpreter::{Interpreter, DEFAULT_MAX_DEPTH};
use treelox::lox::{self, RunError, EXIT_STATIC_ERROR};
use treelox::scanner::Scanner;

#[derive(ClapParser, Debug)]
#[command(version, about = "Tree-walking Lox interpreter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    commands: Commands,

    /// Enable logging to app.log
    #[arg(long, global = true)]
    log: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tokenizes a file, printing each token
    Tokenize { filename: PathBuf },

    /// Parses a file and prints its syntax tree
    Parse {
        filename: PathBuf,

        /// Print the tree as JSON
        #[arg(long)]
        json: bool,
    },

    /// Evaluates a file as a single expression and prints the result
    Evaluate { filename: PathBuf },

    /// Runs a file as a Lox program
    Run {
        filename: PathBuf,

        /// Maximum nesting of calls before reporting a stack overflow
        #[arg(long, env = "TREELOX_MAX_DEPTH", default_value_t = DEFAULT_MAX_DEPTH)]
        max_depth: usize,
    },

    /// Starts an interactive prompt
    Repl {
        #[arg(long, env = "TREELOX_MAX_DEPTH", default_value_t = DEFAULT_MAX_DEPTH)]
        max_depth: usize,
    },
}

fn read_file(filename: &Path) -> Result<Vec<u8>> {
    info!("Reading file: {:?}", filename);

    let file = File::open(filename).context(format!("Failed to open file {:?}", filename))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();

    let bytes = reader
        .read_to_end(&mut buf)
        .context(format!("Failed to read file {:?}", filename))?;

    info!("Read {} bytes from {:?}", bytes, filename);

    Ok(buf)
}

fn init_logger() -> Result<()> {
    let log_file = File::create("app.log").context("Failed to create app.log")?;

    Builder::new()
        .format(|buf, record| {
            let module = record
                .module_path()
                .unwrap_or("<unnamed>")
                .strip_prefix("treelox::")
                .unwrap_or(record.module_path().unwrap_or("<unnamed>"));
            writeln!(
                buf,
                "[{}:{}] - {}",
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug)
        .parse_default_env()
        .init();

    info!("Logger initialized, writing to app.log");
    Ok(())
}

/// Prints `err` to stderr and exits with its status code.
fn fail(err: RunError) -> ! {
    debug!("Exiting after error: {:?}", err);
    eprintln!("{}", err);
    std::process::exit(err.exit_code());
}

fn tokenize(filename: &Path) -> Result<()> {
    let buf = read_file(filename)?;
    let mut tokenized = true;

    for token in Scanner::new(&buf) {
        match token {
            Ok(token) => println!("{}", token),
            Err(e) => {
                tokenized = false;
                eprintln!("{}", e);
            }
        }
    }

    if !tokenized {
        std::process::exit(EXIT_STATIC_ERROR);
    }

    Ok(())
}

fn parse(filename: &Path, json: bool) -> Result<()> {
    let buf = read_file(filename)?;
    let statements = lox::parse_program(&buf).unwrap_or_else(|e| fail(e));

    if json {
        let rendered =
            serde_json::to_string_pretty(&statements).context("Failed to serialize AST")?;
        println!("{}", rendered);
    } else {
        for stmt in &statements {
            println!("{}", AstPrinter::print_stmt(stmt));
        }
    }

    Ok(())
}

fn evaluate(filename: &Path) -> Result<()> {
    let buf = read_file(filename)?;
    let mut interpreter = Interpreter::new();

    let value = lox::evaluate(&buf, &mut interpreter).unwrap_or_else(|e| fail(e));
    println!("{}", value);

    Ok(())
}

fn run(filename: &Path, max_depth: usize) -> Result<()> {
    let buf = read_file(filename)?;
    let mut interpreter = Interpreter::new().with_max_depth(max_depth);

    if let Err(e) = lox::run(&buf, &mut interpreter) {
        fail(e);
    }

    info!("Program executed successfully");
    Ok(())
}

/// One persistent interpreter; every line is a separate program.
fn repl(max_depth: usize) -> Result<()> {
    let mut interpreter = Interpreter::new().with_max_depth(max_depth);
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        io::stdout().flush().context("Failed to flush prompt")?;

        let Some(line) = lines.next() else {
            println!();
            break;
        };
        let line = line.context("Failed to read from stdin")?;

        if let Err(e) = lox::run(line.as_bytes(), &mut interpreter) {
            eprintln!("{}", e);
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    if args.log {
        init_logger()?;
    }

    info!("CLI arguments: {:?}", args);

    match &args.commands {
        Commands::Tokenize { filename } => tokenize(filename),
        Commands::Parse { filename, json } => parse(filename, *json),
        Commands::Evaluate { filename } => evaluate(filename),
        Commands::Run {
            filename,
            max_depth,
        } => run(filename, *max_depth),
        Commands::Repl { max_depth } => repl(*max_depth),
    }
}
