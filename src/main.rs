//! seekloop - iterative fix-until-it-passes automation
//!
//! Command-line front end: the editing surface is a file on disk and the
//! configuration comes from `.seekloop/settings.json`, flags and environment.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use tracing::warn;

use seekloop::session::signals::{remove_marker, write_marker};
use seekloop::{
    EditingSurface, FileSurface, PauseHandle, SeekConfig, SeekEngine, SeekError, SessionStore,
    TerminalOutcome,
};

/// Exit code when the iteration cap is reached without success.
const EXIT_EXHAUSTED: i32 = 3;

#[derive(Parser)]
#[command(name = "seekloop")]
#[command(version)]
#[command(about = "Iteratively rewrite code with a language model until a validation command passes", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start seeking a fix (continues a live session if one exists)
    Seek {
        /// File to fix, relative to the project directory
        #[arg(short, long)]
        file: PathBuf,

        /// What the modified code should achieve
        #[arg(short, long)]
        goal: String,

        /// Shell command that validates each candidate
        #[arg(short, long)]
        command: String,

        /// Maximum iterations (overrides maxIterations)
        #[arg(short, long)]
        max_iterations: Option<u32>,

        /// Model identifier (overrides model)
        #[arg(long, env = "SEEKLOOP_MODEL")]
        model: Option<String>,

        /// Sampling temperature (overrides temperature)
        #[arg(short, long)]
        temperature: Option<f32>,
    },

    /// Ask a running seek to pause before its next iteration
    Pause,

    /// Reload the latest snapshot and continue seeking
    Resume {
        /// File to fix, relative to the project directory
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Clear a pending pause request (snapshots are kept)
    Reset,

    /// List saved session snapshots
    History {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write code from the latest snapshot back into a file
    Restore {
        /// File to restore, relative to the project directory
        #[arg(short, long)]
        file: PathBuf,

        /// Restore the code as it was before the session started
        #[arg(long)]
        original: bool,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (API key redacted)
    Show,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "seekloop=debug,info"
    } else {
        "seekloop=info,warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Resolve project path
    let project_path = cli.project.canonicalize().unwrap_or(cli.project.clone());

    if !project_path.exists() {
        eprintln!(
            "{} Project directory does not exist: {}",
            "Error:".red().bold(),
            project_path.display()
        );
        std::process::exit(1);
    }

    match run(cli.command, &project_path).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(command: Commands, project_path: &Path) -> seekloop::Result<i32> {
    match command {
        Commands::Seek {
            file,
            goal,
            command,
            max_iterations,
            model,
            temperature,
        } => {
            let mut config = SeekConfig::load(project_path)?;
            if let Some(max) = max_iterations {
                config.max_iterations = max;
            }
            if let Some(model) = model {
                config.model = model;
            }
            if let Some(temperature) = temperature {
                config.temperature = temperature;
            }

            let surface = file_surface(project_path, &file)?;
            let mut engine = SeekEngine::from_config(config, project_path, surface)?;

            println!(
                "{} Seeking: {} (validating with `{}`)",
                "Info:".blue(),
                goal,
                command
            );

            let listener = spawn_interrupt_listener(engine.pause_handle());
            let result = engine.run(&goal, &command).await;
            listener.abort();

            Ok(report(&result?, &file))
        }

        Commands::Pause => {
            let config = SeekConfig::load(project_path)?;
            let marker = write_marker(&config.history_dir(project_path))?;
            println!(
                "{} Pause requested; a running seek stops before its next iteration",
                "OK".green().bold()
            );
            println!("   Marker: {}", marker.display());
            Ok(0)
        }

        Commands::Resume { file } => {
            let config = SeekConfig::load(project_path)?;
            let surface = file_surface(project_path, &file)?;
            let mut engine = SeekEngine::from_config(config, project_path, surface)?;

            let listener = spawn_interrupt_listener(engine.pause_handle());
            let result = engine.resume().await;
            listener.abort();

            Ok(report(&result?, &file))
        }

        Commands::Reset => {
            let config = SeekConfig::load(project_path)?;
            let history_dir = config.history_dir(project_path);
            let removed = remove_marker(&PauseHandle::marker_path(&history_dir))?;
            let kept = SessionStore::new(&history_dir).count()?;

            if removed {
                println!("{} Pending pause request cleared", "OK".green().bold());
            } else {
                println!("{} No pending pause request", "OK".green().bold());
            }
            println!("   Snapshots kept: {}", kept);
            Ok(0)
        }

        Commands::History { json } => {
            let config = SeekConfig::load(project_path)?;
            let store = SessionStore::new(config.history_dir(project_path));
            let entries = store.list()?;

            let rows: Vec<HistoryRow> = entries
                .iter()
                .map(|entry| {
                    let session = &entry.session;
                    HistoryRow {
                        file: entry.file_name(),
                        session_id: session.metadata.session_id.clone(),
                        saved_at: session.metadata.saved_at.to_rfc3339(),
                        iterations: session.iteration_count(),
                        succeeded: session.has_succeeded(),
                        goal: session.goal.clone(),
                    }
                })
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if rows.is_empty() {
                println!(
                    "{} No snapshots in {}",
                    "Note:".yellow(),
                    store.dir().display()
                );
            } else {
                println!("\n{} {} snapshot(s):", "History:".cyan().bold(), rows.len());
                for row in &rows {
                    let status = if row.succeeded {
                        "succeeded".green().to_string()
                    } else {
                        "open".yellow().to_string()
                    };
                    println!(
                        "   {}  iterations: {:>3}  {}  {}",
                        row.file, row.iterations, status, row.goal
                    );
                }
            }
            Ok(0)
        }

        Commands::Restore { file, original } => {
            let config = SeekConfig::load(project_path)?;
            let store = SessionStore::new(config.history_dir(project_path));
            let session = store.load_latest()?.ok_or_else(|| SeekError::NoSnapshot {
                dir: store.dir().to_path_buf(),
            })?;

            let (code, label) = if original {
                (session.original_code().to_string(), "original code")
            } else {
                let snapshot = session.last_successful().ok_or_else(|| {
                    SeekError::invalid_state(
                        "latest snapshot has no successful attempt; use --original",
                    )
                })?;
                (snapshot.code.clone(), "last successful candidate")
            };

            let surface = file_surface(project_path, &file)?;
            surface.replace_all_text(&code)?;
            println!(
                "{} Restored {} into {}",
                "OK".green().bold(),
                label,
                file.display()
            );
            Ok(0)
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let config = SeekConfig::load(project_path)?;
                println!("{}", serde_json::to_string_pretty(&config.redacted())?);
                Ok(0)
            }
        },
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRow {
    file: String,
    session_id: String,
    saved_at: String,
    iterations: u32,
    succeeded: bool,
    goal: String,
}

fn file_surface(project_path: &Path, file: &Path) -> seekloop::Result<Arc<FileSurface>> {
    let path = if file.is_absolute() {
        file.to_path_buf()
    } else {
        project_path.join(file)
    };
    if !path.is_file() {
        return Err(SeekError::surface(format!(
            "{} is not a readable file",
            path.display()
        )));
    }
    Ok(Arc::new(FileSurface::new(path)))
}

/// Turn the first Ctrl-C into a cooperative pause request.
fn spawn_interrupt_listener(pause: PauseHandle) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = pause.pause_on_interrupt().await {
            warn!("Could not install interrupt handler: {}", e);
        }
    })
}

fn report(outcome: &TerminalOutcome, file: &Path) -> i32 {
    match outcome {
        TerminalOutcome::Succeeded { iteration } => {
            println!(
                "\n{} Validation passed on iteration {}",
                "OK".green().bold(),
                iteration
            );
            0
        }
        TerminalOutcome::Exhausted { iterations } => {
            println!(
                "\n{} No passing candidate after {} iterations",
                "Warning:".yellow().bold(),
                iterations
            );
            println!(
                "   Use {} to put the original code back",
                format!("seekloop restore --original --file {}", file.display()).cyan()
            );
            EXIT_EXHAUSTED
        }
        TerminalOutcome::Paused { iteration } => {
            println!(
                "\n{} Paused after iteration {}",
                "Info:".blue(),
                iteration
            );
            println!(
                "   Use {} to continue",
                format!("seekloop resume --file {}", file.display()).cyan()
            );
            0
        }
    }
}
