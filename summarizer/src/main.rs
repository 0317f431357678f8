//! Clinical summary template completion CLI.
//!
//! `complete` folds every document in a patient folder into a template;
//! `agent` lets the model plan and call file tools to do the same job;
//! `serve-tools` exposes the file tools over stdio for an out-of-process
//! agent; `init-config` writes a default `summarizer.toml`.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use summarizer::agent::{AgentOptions, LoopStop, run_agent};
use summarizer::complete::{CompletionOptions, complete_template};
use summarizer::core::budget::SessionBudget;
use summarizer::error::{ConfigurationError, TransportClosedError};
use summarizer::exit_codes;
use summarizer::io::config::{DEFAULT_CONFIG_PATH, SummarizerConfig, load_config, write_config};
use summarizer::io::oracle::ChatCompletionsOracle;
use summarizer::io::tools::ToolService;
use summarizer::io::tools::local::LocalToolbox;
use summarizer::io::tools::server::serve;
use summarizer::io::tools::stdio::StdioToolClient;
use summarizer::logging;

#[derive(Parser)]
#[command(
    name = "summarizer",
    version,
    about = "Complete clinical summary templates from patient documents with a local model"
)]
struct Cli {
    /// Config file; a missing file means built-in defaults.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Merge every document of the patient folder into the template.
    Complete {
        #[arg(long)]
        patient_folder: PathBuf,
        #[arg(long)]
        template: PathBuf,
    },
    /// Run the plan-and-dispatch agent over the patient folder.
    Agent {
        #[arg(long)]
        patient_folder: PathBuf,
        #[arg(long)]
        template: PathBuf,
        /// Override `agent.max_iterations`.
        #[arg(long)]
        max_iterations: Option<u32>,
    },
    /// Serve the file tools as JSON lines on stdin/stdout.
    ServeTools {
        /// Override `tools.root`.
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Write a default config file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => report(&err),
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Complete {
            patient_folder,
            template,
        } => cmd_complete(&load_config(&cli.config)?, &patient_folder, &template),
        Command::Agent {
            patient_folder,
            template,
            max_iterations,
        } => {
            let mut cfg = load_config(&cli.config)?;
            if let Some(max_iterations) = max_iterations {
                cfg.agent.max_iterations = max_iterations;
                cfg.validate()?;
            }
            cmd_agent(&cfg, &patient_folder, &template)
        }
        Command::ServeTools { root } => {
            let cfg = load_config(&cli.config)?;
            cmd_serve_tools(root.unwrap_or(cfg.tools.root))
        }
        Command::InitConfig { force } => cmd_init_config(&cli.config, force),
    }
}

fn cmd_complete(cfg: &SummarizerConfig, patient_folder: &Path, template: &Path) -> Result<i32> {
    let oracle = ChatCompletionsOracle::new(&cfg.oracle)?;
    let summary = complete_template(
        &oracle,
        patient_folder,
        template,
        &CompletionOptions::from_config(cfg),
    )?;
    println!("{summary}");
    Ok(exit_codes::OK)
}

fn cmd_agent(cfg: &SummarizerConfig, patient_folder: &Path, template: &Path) -> Result<i32> {
    let oracle = ChatCompletionsOracle::new(&cfg.oracle)?;
    let tools: Box<dyn ToolService> = if cfg.tools.command.is_empty() {
        Box::new(LocalToolbox::new(&cfg.tools.root)?)
    } else {
        Box::new(StdioToolClient::spawn(
            &cfg.tools.command,
            &cfg.tools.log_path,
            SessionBudget::new(cfg.agent.session_timeout()),
        )?)
    };

    let outcome = run_agent(
        &oracle,
        tools.as_ref(),
        patient_folder,
        template,
        &AgentOptions::from_config(cfg),
        |meta| {
            eprintln!(
                "iteration {}: {:?} ({} pending)",
                meta.iter, meta.outcome, meta.pending_steps
            );
        },
    )?;

    match outcome.stop {
        LoopStop::Completed | LoopStop::PlanExhausted => {
            println!(
                "finished after {} iterations ({} steps done): {:?}",
                outcome.iterations, outcome.steps_done, outcome.stop
            );
            Ok(exit_codes::OK)
        }
        LoopStop::MaxIterationsExceeded { max_iterations } => {
            eprintln!("stopped: reached max_iterations ({max_iterations})");
            Ok(exit_codes::INCOMPLETE)
        }
    }
}

fn cmd_serve_tools(root: PathBuf) -> Result<i32> {
    let toolbox = LocalToolbox::new(root)?;
    serve(&toolbox, io::stdin().lock(), io::stdout().lock())?;
    Ok(exit_codes::OK)
}

fn cmd_init_config(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        eprintln!("{} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &SummarizerConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

/// Print `err` and pick the exit code for its class.
fn report(err: &anyhow::Error) -> i32 {
    eprintln!("{err:#}");
    if err.downcast_ref::<ConfigurationError>().is_some() {
        return exit_codes::INVALID;
    }
    if let Some(closed) = err.downcast_ref::<TransportClosedError>() {
        if !closed.diagnostic_log.trim().is_empty() {
            eprintln!("--- tool server log ---\n{}", closed.diagnostic_log.trim_end());
        }
    }
    exit_codes::FAILED
}
