//! CLI binary for running and inspecting Arbor programs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use arbor_expr::{is_expression, is_formatted, MatchKind};
use arbor_runtime::{default_loader, execute_block, Context, DispatchEvent, RuntimeConfig};
use arbor_types::{Address, ArborError, Tree};

#[derive(Parser)]
#[command(name = "arbor", version, about = "Tree-rewriting interpreter for Hyperlisp programs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a Hyperlisp program and print the resulting tree
    Run {
        /// Path to the program file
        program: PathBuf,

        /// Event raised on the program root (default: the config's entry event, `lambda`)
        #[arg(short, long)]
        event: Option<String>,

        /// Print the tree as JSON instead of Hyperlisp
        #[arg(long)]
        json: bool,

        /// Print the dispatch trace as JSON on stderr
        #[arg(long)]
        trace: bool,

        /// Runtime config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Evaluate an expression against a program's tree
    Eval {
        /// Path to the program file
        program: PathBuf,

        /// Expression, e.g. `@/../_data/*?name`
        expression: String,

        /// Address of the node the expression is evaluated from (default: the root)
        #[arg(long)]
        at: Option<String>,
    },

    /// Parse a program and every expression it holds
    Check {
        /// Path to the program file
        program: PathBuf,
    },

    /// List the events of a fresh context
    Events {
        /// Runtime config file whose preload programs are run first
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.command {
        Commands::Run { config: Some(path), .. } | Commands::Events { config: Some(path) } => {
            RuntimeConfig::load(path).map_err(report)?
        }
        _ => RuntimeConfig::default(),
    };

    // Setup tracing
    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        config.log_filter.clone().unwrap_or_else(|| "info".to_string())
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            program,
            event,
            json,
            trace,
            ..
        } => {
            cmd_run(&program, &config, event.as_deref(), json, trace)?;
        }
        Commands::Eval {
            program,
            expression,
            at,
        } => {
            cmd_eval(&program, &expression, at.as_deref())?;
        }
        Commands::Check { program } => {
            cmd_check(&program)?;
        }
        Commands::Events { .. } => {
            cmd_events(&config)?;
        }
    }

    Ok(())
}

/// Prefix a library error with its category.
fn report(err: ArborError) -> anyhow::Error {
    anyhow::anyhow!("{} error: {}", err.category(), err)
}

fn load_program(path: &Path) -> anyhow::Result<Tree> {
    let source = std::fs::read_to_string(path)?;
    let tree = arbor_hyperlisp::parse(&source)
        .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), report(e)))?;
    Ok(tree)
}

/// A context with `config` applied and its preload programs executed.
fn fresh_context(config: &RuntimeConfig) -> anyhow::Result<Context> {
    let mut ctx = Context::new(Arc::new(default_loader())).map_err(report)?;
    config.apply(&mut ctx);
    for path in &config.preload {
        let mut tree = load_program(path)?;
        let root = tree.root();
        execute_block(&mut ctx, &mut tree, root).map_err(report)?;
        tracing::debug!(path = %path.display(), "preloaded");
    }
    Ok(ctx)
}

/// Raise `event` on the program root; returns the tree and the trace.
fn run_program(
    path: &Path,
    config: &RuntimeConfig,
    event: &str,
    trace: bool,
) -> anyhow::Result<(Tree, Vec<DispatchEvent>)> {
    let mut tree = load_program(path)?;
    let mut ctx = fresh_context(config)?;
    if trace {
        ctx.enable_trace();
    }
    let root = tree.root();
    ctx.raise(event, &mut tree, root).map_err(report)?;
    Ok((tree, ctx.take_trace()))
}

fn cmd_run(
    path: &Path,
    config: &RuntimeConfig,
    event: Option<&str>,
    json: bool,
    trace: bool,
) -> anyhow::Result<()> {
    let event = event.unwrap_or(&config.entry_event);
    tracing::info!(program = %path.display(), event = %event, "running");
    let (tree, dispatch) = run_program(path, config, event, trace || config.trace)?;

    if json {
        let doc = arbor_hyperlisp::to_document(&tree, tree.root()).map_err(report)?;
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        print!("{}", arbor_hyperlisp::to_string(&tree).map_err(report)?);
    }
    if !dispatch.is_empty() {
        eprintln!("{}", serde_json::to_string_pretty(&dispatch)?);
    }
    Ok(())
}

/// One output line per hit: the hit's address, then its value.
fn eval_lines(tree: &Tree, expression: &str, at: Option<&str>) -> anyhow::Result<Vec<String>> {
    let node = match at {
        Some(text) => {
            let address: Address = text.parse().map_err(report)?;
            tree.resolve(&address).map_err(report)?
        }
        None => tree.root(),
    };
    let parsed = arbor_expr::parse(expression).map_err(report)?;
    let matched = parsed.evaluate(tree, node).map_err(report)?;

    if matched.kind() == MatchKind::Count {
        return Ok(vec![matched.count().to_string()]);
    }
    let mut lines = Vec::with_capacity(matched.len());
    for hit in &matched {
        let address = match hit.node {
            Some(node) => tree.path(node).map_err(report)?.to_string(),
            None => "-".to_string(),
        };
        lines.push(format!("{}\t{}", address, tree.stringify(&hit.value)));
    }
    Ok(lines)
}

fn cmd_eval(path: &Path, expression: &str, at: Option<&str>) -> anyhow::Result<()> {
    let tree = load_program(path)?;
    for line in eval_lines(&tree, expression, at)? {
        println!("{}", line);
    }
    Ok(())
}

/// Addresses and errors of every unformatted expression that fails to parse.
fn expression_errors(tree: &Tree) -> anyhow::Result<(usize, Vec<(Address, ArborError)>)> {
    let mut checked = 0;
    let mut errors = Vec::new();
    for node in tree.descendants(tree.root()).map_err(report)? {
        let value = tree.value(node).map_err(report)?;
        if !is_expression(value) || is_formatted(tree, node).map_err(report)? {
            continue;
        }
        checked += 1;
        let text = value.as_text().unwrap_or_default();
        if let Err(err) = arbor_expr::parse(text) {
            errors.push((tree.path(node).map_err(report)?, err));
        }
    }
    Ok((checked, errors))
}

fn cmd_check(path: &Path) -> anyhow::Result<()> {
    let tree = load_program(path)?;
    let (checked, errors) = expression_errors(&tree)?;

    if errors.is_empty() {
        println!("{}: {} nodes, {} expressions OK", path.display(), tree.len(), checked);
        return Ok(());
    }
    for (address, err) in &errors {
        println!("[{}] {}: {}", err.category().to_uppercase(), address, err);
    }
    std::process::exit(1);
}

fn cmd_events(config: &RuntimeConfig) -> anyhow::Result<()> {
    let ctx = fresh_context(config)?;
    for name in ctx.event_names() {
        println!("{}", name);
    }
    for (base, by) in ctx.overrides() {
        println!("{} -> {}", base, by);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, source: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, source).unwrap();
        path
    }

    #[test]
    fn run_program_executes_the_entry_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "main.hl", "_data\nset:@/../_data?value\n  source:success\n");
        let (tree, trace) = run_program(&path, &RuntimeConfig::default(), "lambda", true).unwrap();
        let data = tree.child(tree.root(), 0).unwrap().unwrap();
        assert_eq!(tree.stringify(tree.value(data).unwrap()), "success");
        assert!(trace
            .iter()
            .any(|e| matches!(e, DispatchEvent::Raised { name, .. } if name == "set")));
    }

    #[test]
    fn preload_defines_events_for_the_main_program() {
        let dir = tempfile::tempdir().unwrap();
        let lib = write(
            &dir,
            "lib.hl",
            "event:mark\n  lambda\n    set:@/..?value\n      source:marked\n",
        );
        let main = write(&dir, "main.hl", "mark\n");
        let config = RuntimeConfig {
            preload: vec![lib],
            ..RuntimeConfig::default()
        };
        let (tree, _) = run_program(&main, &config, "lambda", false).unwrap();
        assert_eq!(arbor_hyperlisp::to_string(&tree).unwrap(), "mark:marked\n");
    }

    #[test]
    fn eval_prints_address_and_value() {
        let tree = arbor_hyperlisp::parse("_data\n  a:1\n  b:2\n").unwrap();
        let lines = eval_lines(&tree, "@/_data/*?value", None).unwrap();
        assert_eq!(lines, vec!["0-0\t1", "0-1\t2"]);
        let count = eval_lines(&tree, "@/*?count", Some("0")).unwrap();
        assert_eq!(count, vec!["2"]);
    }

    #[test]
    fn check_reports_broken_expressions_only() {
        let tree = arbor_hyperlisp::parse(
            "ok:@/../_x?value\nbroken:@/../_x?nonsense\nformatted:@/{0}?value\n  :_x\n",
        )
        .unwrap();
        let (checked, errors) = expression_errors(&tree).unwrap();
        assert_eq!(checked, 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0.to_string(), "1");
        assert!(errors[0].1.is_syntax());
    }
}
