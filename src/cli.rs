use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value as JsonValue;
use tracing::info;

use crate::config::Config;
use crate::host::{RunReport, TimerHost};
use crate::pool::{EntryId, ThreadPool};
use crate::vm::{Interpreter, Script, Val};

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Cadence - run suspendable scripts on a pooled thread engine", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a JSON script on the thread pool until every instance settles
    Run {
        /// Script file (JSON with "params" and "body")
        script: PathBuf,

        /// Call arguments (JSON array, or a single JSON value)
        #[arg(long, default_value = "[]")]
        args: String,

        /// Number of concurrent instances to start
        #[arg(short = 'n', long, default_value = "1")]
        instances: usize,

        /// Virtual milliseconds an instance may stay suspended (overrides config)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Print the effective configuration as TOML
    Config,
}

/// How one instance ended
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceResult {
    Returned(JsonValue),
    Failed(String),
    TimedOut,
}

/// Everything a `run` produced, in start order
#[derive(Debug)]
pub struct RunSummary {
    pub instances: Vec<(EntryId, InstanceResult)>,
    pub report: RunReport,
}

pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli)
}

pub fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::try_parse_from(args)?;
    run_cli_with_args(cli)
}

fn run_cli_with_args(cli: Cli) -> Result<()> {
    let mut config = match cli.config.as_deref() {
        Some(path) => Config::load_from(Some(path))?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Run {
            script,
            args,
            instances,
            timeout_ms,
        } => {
            if timeout_ms.is_some() {
                config.host.timeout_ms = timeout_ms;
            }
            let script = load_script(&script)?;
            let args = parse_args(&args)?;

            let summary = run_script(&config, script, &args, instances)?;

            for (id, result) in &summary.instances {
                match result {
                    InstanceResult::Returned(value) => println!("{} returned {}", id, value),
                    InstanceResult::Failed(message) => println!("{} failed: {}", id, message),
                    InstanceResult::TimedOut => println!("{} timed out", id),
                }
            }
            let report = summary.report;
            println!(
                "\n{} completed, {} failed, {} timed out, {} resumes, {}ms virtual time",
                report.completed, report.failed, report.timed_out, report.resumed, report.elapsed_ms
            );
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn load_script(path: &Path) -> Result<Rc<Script>> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    let script = Script::from_json(&source)
        .with_context(|| format!("Invalid script {}", path.display()))?;
    Ok(Rc::new(script))
}

fn parse_args(raw: &str) -> Result<Vec<Val>> {
    let json: JsonValue = serde_json::from_str(raw).context("--args must be valid JSON")?;
    Ok(match json {
        JsonValue::Array(items) => items.iter().map(Val::from_json).collect(),
        other => vec![Val::from_json(&other)],
    })
}

/// Start `instances` calls of `script` and drive them to the end
pub fn run_script(
    config: &Config,
    script: Rc<Script>,
    args: &[Val],
    instances: usize,
) -> Result<RunSummary> {
    if instances == 0 {
        bail!("--instances must be at least 1");
    }

    let mut host = TimerHost::new(&config.host);
    let mut interp = Interpreter::new();
    host.install(&mut interp);

    let mut pool = ThreadPool::with_config(interp, config.pool.clone())?;
    let results: Rc<RefCell<Vec<(EntryId, InstanceResult)>>> = Rc::new(RefCell::new(Vec::new()));

    info!(instances, params = script.params.len(), "starting script instances");

    let mut started = Vec::with_capacity(instances);
    for _ in 0..instances {
        let id = pool.get()?;
        let entry = pool
            .entry_mut(id)
            .context("freshly acquired thread is missing")?;

        let sink = Rc::clone(&results);
        entry.on_finish(move |_pool, id, values| {
            let value = values.first().map_or(JsonValue::Null, Val::to_json);
            sink.borrow_mut().push((id, InstanceResult::Returned(value)));
        });
        let sink = Rc::clone(&results);
        entry.on_error(move |_pool, id, err| {
            sink.borrow_mut().push((id, InstanceResult::Failed(err.to_string())));
        });

        let thread = entry
            .thread_mut()
            .context("freshly acquired thread has no engine state")?;
        thread.load(Rc::clone(&script));
        for arg in args {
            thread.push(arg.clone());
        }

        host.spawn(&mut pool, id, args.len())?;
        started.push(id);
    }

    let report = host.run(&mut pool)?;
    pool.free()?;

    let mut results = results.take();
    let instances = started
        .into_iter()
        .map(|id| {
            let result = results
                .iter()
                .position(|(done, _)| *done == id)
                .map(|index| results.swap_remove(index).1)
                .unwrap_or(InstanceResult::TimedOut);
            (id, result)
        })
        .collect();

    Ok(RunSummary { instances, report })
}
