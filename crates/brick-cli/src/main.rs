//! CLI binary for running and linting brick pipelines.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use brick_runtime::{
    builtin_registry, lint, Context, EventEmitter, Page, Pipeline, PipelineExecutor, RunOptions,
    Severity, DEFAULT_MAX_DEPTH,
};
use brick_types::ErrorKind;

#[derive(Parser)]
#[command(name = "bricks", version, about = "Runner for declarative brick pipelines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline from a .yaml or .json file
    Run {
        /// Path to the pipeline file
        pipeline: PathBuf,

        /// Initial `@input` as an inline JSON value
        #[arg(short, long, conflicts_with = "input_file")]
        input: Option<String>,

        /// Read the initial `@input` from a JSON file
        #[arg(long)]
        input_file: Option<PathBuf>,

        /// Page document (.yaml or .json) that selectors resolve against
        #[arg(short, long)]
        page: Option<PathBuf>,

        /// Maximum sub-pipeline nesting depth
        #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
        max_depth: usize,
    },

    /// Lint a pipeline file without running it
    Validate {
        /// Path to the pipeline file
        pipeline: PathBuf,
    },

    /// List the built-in bricks
    List,
}

/// `RUST_LOG` directives when set and valid, otherwise the `--verbose` level.
fn log_filter(verbose: bool, rust_log: Option<&str>) -> EnvFilter {
    let default = if verbose { "debug" } else { "info" };
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose, rust_log.as_deref()))
        .init();

    match cli.command {
        Commands::Run {
            pipeline,
            input,
            input_file,
            page,
            max_depth,
        } => {
            let input = match (input, input_file) {
                (Some(raw), _) => parse_input(&raw)?,
                (None, Some(path)) => parse_input(&std::fs::read_to_string(path)?)?,
                (None, None) => Value::Null,
            };
            cmd_run(&pipeline, input, page.as_deref(), max_depth).await?;
        }
        Commands::Validate { pipeline } => {
            cmd_validate(&pipeline)?;
        }
        Commands::List => {
            cmd_list();
        }
    }

    Ok(())
}

fn parse_input(raw: &str) -> anyhow::Result<Value> {
    if raw.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("input is not valid JSON: {e}"))
}

async fn cmd_run(
    path: &Path,
    input: Value,
    page: Option<&Path>,
    max_depth: usize,
) -> anyhow::Result<()> {
    let pipeline = Pipeline::load(path)?;
    let page = match page {
        Some(p) => Page::load(p)?,
        None => Page::default(),
    };

    let events = EventEmitter::default();
    let mut rx = events.subscribe();
    let watcher = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            tracing::debug!(event = ?event, "pipeline event");
        }
    });

    let options = RunOptions::default()
        .with_page(page)
        .with_events(events)
        .with_max_depth(max_depth);
    let executor = PipelineExecutor::new(builtin_registry());
    let result = executor.run(&pipeline, Context::new(input), &options).await;
    drop(options);
    let _ = watcher.await;

    match result {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::Cancel => {
            println!("Pipeline stopped: {err}");
            Ok(())
        }
        Err(err) => {
            eprintln!("Pipeline failed ({:?}): {err}", err.kind());
            std::process::exit(1);
        }
    }
}

fn cmd_validate(path: &Path) -> anyhow::Result<()> {
    let pipeline = Pipeline::load(path)?;
    let registry = builtin_registry();
    let diagnostics = lint(&pipeline, &registry);

    if diagnostics.is_empty() {
        println!("Pipeline is valid");
        return Ok(());
    }

    let mut has_error = false;
    for diag in &diagnostics {
        if diag.severity == Severity::Error {
            has_error = true;
        }
        println!("{diag}");
    }

    if has_error {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_list() {
    let registry = builtin_registry();
    for brick in registry.bricks() {
        println!("{:<28} {:<12} {}", brick.id(), brick.kind(), brick.description());
    }
}
