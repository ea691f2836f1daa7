mod config;
mod logging;
mod runtime;
mod serve;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use easel_core::{Color, ShapeFilter, ShapeKind};
use easel_engine::{EngineError, ExternalAnswer, ReplayOutcome, SceneResponder, TurnOutcome, TurnStatus};
use easel_storage::SceneStorage;

use crate::config::EaselConfig;
use crate::runtime::Engine;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Conversational editor for a scene of triangles, squares and circles.
#[derive(Parser)]
#[command(name = "easel", version, about = "Conversational 3D scene editor")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Path to easel.toml (default: ./easel.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file, overriding the config and environment
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port to listen on (default from config, 8080)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Send one message to the editor
    Chat {
        /// What to do, e.g. "draw a red circle"
        message: String,
        /// Session the change belongs to (scopes undo/redo)
        #[arg(long)]
        session: String,
        /// Continue an existing thread
        #[arg(long)]
        thread: Option<String>,
        /// Answer scene questions from the database and resume immediately
        #[arg(long)]
        auto_answer: bool,
    },

    /// Resume a suspended thread with a scene answer
    Resume {
        /// Thread id from the suspended outcome
        thread: String,
        /// Resume token from the suspended outcome
        #[arg(long)]
        token: String,
        /// Answer JSON: {"shapes": [{"id": ..., "kind": ..., "position": [x, y, z]}]}
        #[arg(long, conflicts_with = "auto", required_unless_present = "auto")]
        answer: Option<String>,
        /// Compute the answer from the database
        #[arg(long)]
        auto: bool,
    },

    /// Undo the session's most recent change
    Undo {
        #[arg(long)]
        session: String,
    },

    /// Redo the session's most recently undone change
    Redo {
        #[arg(long)]
        session: String,
    },

    /// List shapes in the scene, newest first
    Shapes {
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },

    /// Show the session's recent operations, newest first
    History {
        #[arg(long)]
        session: String,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print the effective configuration (API key masked)
    Config,
}

fn main() {
    let cli = Cli::parse();

    let mut config = match EaselConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => fail(&e.to_string(), cli.output),
    };
    if let Some(db) = &cli.database {
        config.storage.database = db.clone();
    }
    logging::init(&config.log_level);

    if let Commands::Config = cli.command {
        print!("{}", config.masked().to_toml());
        return;
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => fail(&format!("failed to create tokio runtime: {e}"), cli.output),
    };

    if let Commands::Serve { port } = cli.command {
        let port = port.unwrap_or(config.server.port);
        if let Err(e) = rt.block_on(serve::start_server(config, port)) {
            fail(&format!("server error: {e}"), cli.output);
        }
        return;
    }

    let engine = match runtime::build_engine(&config) {
        Ok(engine) => engine,
        Err(e) => fail(&e.to_string(), cli.output),
    };
    let code = rt.block_on(run(cli.command, engine, cli.output));
    process::exit(code);
}

/// Run a one-shot command; returns the process exit code.
async fn run(command: Commands, engine: Arc<Engine>, output: OutputFormat) -> i32 {
    let result = match command {
        Commands::Chat {
            message,
            session,
            thread,
            auto_answer,
        } => cmd_chat(&engine, &session, thread.as_deref(), &message, auto_answer, output).await,
        Commands::Resume {
            thread,
            token,
            answer,
            auto,
        } => cmd_resume(&engine, &thread, &token, answer.as_deref(), auto, output).await,
        Commands::Undo { session } => cmd_undo(&engine, &session, output).await,
        Commands::Redo { session } => cmd_redo(&engine, &session, output).await,
        Commands::Shapes { kind, color } => cmd_shapes(&engine, kind, color, output).await,
        Commands::History { session, limit } => cmd_history(&engine, &session, limit, output).await,
        Commands::Serve { .. } | Commands::Config => Ok(0),
    };
    result.unwrap_or_else(|e| {
        report_error(&e.to_string(), output);
        1
    })
}

async fn cmd_chat(
    engine: &Engine,
    session: &str,
    thread: Option<&str>,
    message: &str,
    auto_answer: bool,
    output: OutputFormat,
) -> Result<i32, CommandError> {
    let mut outcome = engine.submit(session, thread, message).await?;
    if auto_answer {
        if let Some(request) = outcome.suspend_request() {
            let responder = SceneResponder::new(engine.storage().clone());
            let answer = responder.answer(&request).await.map_err(EngineError::from)?;
            let token = outcome.resume_token.clone().unwrap_or_default();
            outcome = engine.resume(&outcome.thread_id, &token, answer).await?;
        }
    }
    Ok(print_outcome(&outcome, output))
}

async fn cmd_resume(
    engine: &Engine,
    thread: &str,
    token: &str,
    answer: Option<&str>,
    auto: bool,
    output: OutputFormat,
) -> Result<i32, CommandError> {
    let answer = if auto {
        let record = engine.storage().get_thread(thread).await.map_err(EngineError::from)?;
        let ctx = easel_engine::ExecutionContext::from_json(&record.context)?;
        let request = ctx.pending.ok_or_else(|| EngineError::NoPendingSuspension {
            thread_id: thread.to_string(),
        })?;
        SceneResponder::new(engine.storage().clone())
            .answer(&request)
            .await
            .map_err(EngineError::from)?
    } else {
        let raw = answer.unwrap_or("{}");
        serde_json::from_str::<ExternalAnswer>(raw)
            .map_err(|e| CommandError::Usage(format!("invalid --answer JSON: {e}")))?
    };
    let outcome = engine.resume(thread, token, answer).await?;
    Ok(print_outcome(&outcome, output))
}

async fn cmd_undo(
    engine: &Engine,
    session: &str,
    output: OutputFormat,
) -> Result<i32, CommandError> {
    let outcome = engine.undo(session).await?;
    Ok(print_replay(&outcome, output))
}

async fn cmd_redo(
    engine: &Engine,
    session: &str,
    output: OutputFormat,
) -> Result<i32, CommandError> {
    let outcome = engine.redo(session).await?;
    Ok(print_replay(&outcome, output))
}

async fn cmd_shapes(
    engine: &Engine,
    kind: Option<String>,
    color: Option<String>,
    output: OutputFormat,
) -> Result<i32, CommandError> {
    let kind = kind
        .map(|k| k.parse::<ShapeKind>())
        .transpose()
        .map_err(CommandError::Usage)?;
    let color = color
        .map(|c| Color::parse(&c))
        .transpose()
        .map_err(|e| CommandError::Usage(e.to_string()))?;
    let shapes = engine
        .storage()
        .list_shapes(&ShapeFilter { kind, color })
        .await
        .map_err(EngineError::from)?;

    match output {
        OutputFormat::Json => print_json(&serde_json::json!({ "count": shapes.len(), "shapes": shapes })),
        OutputFormat::Text if shapes.is_empty() => println!("The scene is empty."),
        OutputFormat::Text => {
            for s in &shapes {
                println!("{}  {:<8} {:<8} at {}", s.id, s.kind, s.color.display_name(), s.center());
            }
        }
    }
    Ok(0)
}

async fn cmd_history(
    engine: &Engine,
    session: &str,
    limit: Option<usize>,
    output: OutputFormat,
) -> Result<i32, CommandError> {
    let entries = engine.history(session, limit).await?;
    match output {
        OutputFormat::Json => print_json(&serde_json::json!({ "entries": entries })),
        OutputFormat::Text if entries.is_empty() => println!("No history for session {session}."),
        OutputFormat::Text => {
            for e in &entries {
                let shape = e.shape_id.as_deref().unwrap_or("-");
                let undone = if e.undone { " (undone)" } else { "" };
                println!("#{} {} {} {}{}", e.id, e.occurred_at, e.kind, shape, undone);
            }
        }
    }
    Ok(0)
}

// ── Output ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
enum CommandError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("{0}")]
    Usage(String),
}

/// Print a turn outcome; failed turns exit 1.
fn print_outcome(outcome: &TurnOutcome, output: OutputFormat) -> i32 {
    match output {
        OutputFormat::Json => print_json(outcome),
        OutputFormat::Text => {
            println!("{}", outcome.message);
            if outcome.status == TurnStatus::Suspended {
                println!("thread: {}", outcome.thread_id);
                if let Some(token) = &outcome.resume_token {
                    println!("token: {token}");
                }
                if let Some(params) = &outcome.params {
                    println!("params: {params}");
                }
            }
        }
    }
    match outcome.status {
        TurnStatus::Failed => 1,
        _ => 0,
    }
}

fn print_replay(outcome: &ReplayOutcome, output: OutputFormat) -> i32 {
    match output {
        OutputFormat::Json => print_json(outcome),
        OutputFormat::Text => println!("{}", outcome.message),
    }
    0
}

fn print_json<T: serde::Serialize>(value: &T) {
    let pretty = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"serialization error: {e}\"}}"));
    println!("{pretty}");
}

fn report_error(message: &str, output: OutputFormat) {
    match output {
        OutputFormat::Json => {
            let body = serde_json::json!({ "error": message });
            eprintln!("{body}");
        }
        OutputFormat::Text => eprintln!("error: {message}"),
    }
}

fn fail(message: &str, output: OutputFormat) -> ! {
    report_error(message, output);
    process::exit(1);
}
