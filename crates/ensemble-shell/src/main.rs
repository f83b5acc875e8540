#![deny(unsafe_code)]

//! ensh: load ensemble definitions and dispatch commands against them.

mod config;

use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use ensemble_dispatch::{split_commands, EnsembleError, EnsembleManager};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::ShellConfig;

/// ensh: a command shell built from ensemble definitions.
#[derive(Parser)]
#[command(name = "ensh", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "ensh.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Definition file to load after the configured ones (repeatable).
    #[arg(short, long = "define", value_name = "FILE")]
    define: Vec<PathBuf>,

    /// Print the usage of an ensemble and exit.
    #[arg(long, value_name = "ENSEMBLE")]
    usage: Option<String>,

    /// Print an ensemble tree as JSON and exit.
    #[arg(long, value_name = "ENSEMBLE")]
    describe: Option<String>,

    /// Command to run; read commands from stdin when empty.
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let filter = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut manager = EnsembleManager::with_config(config.manager.clone());
    for path in config.shell.definitions.iter().chain(&cli.define) {
        load_definitions(&mut manager, path)?;
    }

    if let Some(name) = &cli.usage {
        println!("{}", manager.get_usage(name)?);
        return Ok(());
    }
    if let Some(name) = &cli.describe {
        let summary = manager.describe(name)?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if !cli.command.is_empty() {
        let result = manager.eval(&cli.command)?;
        if !result.is_empty() {
            println!("{result}");
        }
        return Ok(());
    }

    run_stdin(&mut manager, &config.shell.prompt)
}

fn load_config(path: &Path) -> Result<ShellConfig> {
    if path.exists() {
        ShellConfig::load(path).map_err(|e| anyhow::anyhow!(e))
    } else {
        Ok(ShellConfig::default())
    }
}

/// Loads one definition file; a failed file leaves no ensembles behind.
fn load_definitions(manager: &mut EnsembleManager, path: &Path) -> Result<()> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("reading definitions from '{}'", path.display()))?;
    match manager.define(&source) {
        Ok(roots) => {
            info!(path = %path.display(), ensembles = roots.len(), "loaded definitions");
            Ok(())
        }
        Err(EnsembleError::Definition(err)) => {
            manager.unwind(err.created());
            Err(anyhow::anyhow!(err)).with_context(|| format!("in '{}'", path.display()))
        }
        Err(err) => Err(anyhow::anyhow!(err)).with_context(|| format!("in '{}'", path.display())),
    }
}

/// Reads commands line by line. A line with an open brace keeps reading
/// until the brace closes.
fn run_stdin(manager: &mut EnsembleManager, prompt: &str) -> Result<()> {
    let stdin = std::io::stdin();
    let interactive = stdin.is_terminal();
    let mut pending = String::new();
    let mut start_line = 1;

    let show_prompt = |continuing: bool| -> Result<()> {
        if interactive {
            let mut out = std::io::stdout();
            write!(out, "{}", if continuing { "> " } else { prompt })?;
            out.flush()?;
        }
        Ok(())
    };

    show_prompt(false)?;
    for (n, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        if pending.is_empty() {
            start_line = n + 1;
        }
        pending.push_str(&line);
        pending.push('\n');

        let commands = match split_commands(&pending, start_line) {
            Ok(commands) => commands,
            Err(err) if err.message == "missing close-brace" => {
                show_prompt(true)?;
                continue;
            }
            Err(err) => {
                eprintln!("error: {err}");
                pending.clear();
                show_prompt(false)?;
                continue;
            }
        };
        pending.clear();

        for command in commands {
            let words = command.texts();
            debug!(line = command.line, ?words, "evaluating");
            match manager.eval(&words) {
                Ok(result) if result.is_empty() => {}
                Ok(result) => println!("{result}"),
                Err(err) => eprintln!("error: {err}"),
            }
        }
        show_prompt(false)?;
    }

    if !pending.trim().is_empty() {
        eprintln!("error: line {start_line}: missing close-brace");
    }
    Ok(())
}
