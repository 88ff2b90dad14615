//! `lllc`: drives the middle-end pipeline end to end.
//!
//! Reads either an AST fixture (JSON, lowered via `lll_lower::lower_program`)
//! or an IR text file (parsed via `lll_text::parse`), runs the optimizer,
//! prints the result, and optionally interprets the entry function.

use std::path::PathBuf;
use std::process;

use clap::Parser;

use lll_check::Value;
use lll_core::{Program, Type};
use lll_opt::{Driver, DriverConfig};

/// The LLL middle-end driver: optimize and interpret verified IR.
#[derive(Parser)]
#[command(name = "lllc", about = "LLL middle-end driver: optimize and interpret IR")]
struct Cli {
    /// Path to the input program.
    input: PathBuf,

    /// Treat the input as an AST fixture (JSON) and lower it, instead of
    /// parsing it directly as IR text.
    #[arg(long)]
    ast: bool,

    /// Skip optimization; print (and optionally interpret) the program as
    /// lowered or parsed.
    #[arg(long)]
    no_optimize: bool,

    /// Run the configured pass list once instead of to a fixed point.
    #[arg(long)]
    no_repeat: bool,

    /// Verify structural invariants after every pass, even in release
    /// builds.
    #[arg(long)]
    verify_always: bool,

    /// Inlining size threshold (instructions) for the function-inlining
    /// pass.
    #[arg(long, default_value_t = 10)]
    inline_threshold: usize,

    /// Interpret the entry function after optimizing.
    #[arg(long)]
    interpret: bool,

    /// Name of the entry function, overriding the program's declared entry.
    #[arg(long)]
    entry: Option<String>,

    /// Integer argument for `--interpret`, one per entry parameter, in
    /// order. Repeatable.
    #[arg(long = "arg")]
    interp_args: Vec<i64>,

    /// Increase log verbosity (repeatable: -v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all logging below warnings.
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    process::exit(run(&cli));
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let default_directive = if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Exit codes: 0 success, 1 I/O error, 2 lowering/parsing error,
/// 3 verification failure, 4 runtime trap during interpretation.
fn run(cli: &Cli) -> i32 {
    let text = match std::fs::read_to_string(&cli.input) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: failed to read '{}': {e}", cli.input.display());
            return 1;
        }
    };

    let mut program = match load_program(&text, cli.ast) {
        Ok(p) => p,
        Err(code) => return code,
    };

    if let Some(name) = &cli.entry {
        match find_function(&program, name) {
            Some(id) => program.entry = Some(id),
            None => {
                eprintln!("error: no function named '{name}' in the program");
                return 2;
            }
        }
    }

    if !cli.no_optimize {
        let config = DriverConfig {
            passes: lll_opt::default_pipeline(cli.inline_threshold),
            repeat: !cli.no_repeat,
            verify_after_each_pass: cli.verify_always || cfg!(debug_assertions),
        };
        if let Err(errors) = Driver::new(config).run(&mut program) {
            eprintln!("verification failed after optimization:");
            for e in &errors {
                eprintln!("  - {e}");
            }
            return 3;
        }
    }

    println!("{}", lll_text::print(&program));

    if cli.interpret {
        return interpret(&program, &cli.interp_args);
    }

    0
}

fn load_program(text: &str, is_ast: bool) -> Result<Program, i32> {
    if is_ast {
        let ast: lll_lower::ast::Program = serde_json::from_str(text).map_err(|e| {
            eprintln!("error: malformed AST fixture: {e}");
            2
        })?;
        lll_lower::lower_program(&ast).map_err(|e| {
            eprintln!("error: lowering failed: {e}");
            2
        })
    } else {
        lll_text::parse(text).map_err(|e| {
            eprintln!("error: parse failed: {e}");
            2
        })
    }
}

fn find_function(program: &Program, name: &str) -> Option<lll_core::NodeId> {
    program.functions.iter().copied().find(|&id| {
        program
            .node(id)
            .ok()
            .and_then(|n| n.as_function())
            .is_some_and(|f| f.name == name)
    })
}

fn interpret(program: &Program, interp_args: &[i64]) -> i32 {
    if let Err(errors) = lll_check::verify(program) {
        eprintln!("cannot interpret: program fails verification:");
        for e in &errors {
            eprintln!("  - {e}");
        }
        return 3;
    }

    let Some(entry) = program.entry else {
        eprintln!("error: program has no entry function");
        return 2;
    };
    let Some(func) = program.node(entry).ok().and_then(|n| n.as_function()) else {
        eprintln!("error: entry node is not a function");
        return 2;
    };

    if interp_args.len() != func.params.len() {
        eprintln!(
            "error: entry expects {} argument(s), got {}",
            func.params.len(),
            interp_args.len()
        );
        return 2;
    }

    let mut args = Vec::with_capacity(func.params.len());
    for (&param, &raw) in func.params.iter().zip(interp_args) {
        let param_ty = program.node(param).ok().map(|n| n.ty);
        let width = match param_ty.and_then(|ty| program.types.try_get(ty).cloned()) {
            Some(Type::Integer(w)) => w,
            _ => {
                eprintln!("error: --interpret only supports integer-typed entry parameters");
                return 2;
            }
        };
        args.push(Value::Integer { width, value: raw });
    }

    let config = lll_check::InterpreterConfig::default();
    let mut interp = match lll_check::Interpreter::new(program, entry, args, config) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("error: failed to start interpreter: {e}");
            return 4;
        }
    };
    match interp.run_to_end() {
        Ok(result) => {
            println!("{result:?}");
            0
        }
        Err(e) => {
            eprintln!("runtime trap: {e}");
            4
        }
    }
}
