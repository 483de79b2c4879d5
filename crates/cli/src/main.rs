mod config;
mod error;
mod functions;
mod telemetry;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use journal::{Event, EventKind, EventStore, Role, SessionId};
use orchestrator::{
    FunctionRegistry, HttpJobEndpoint, HttpModelEndpoint, Recorder, RunDriver, RunRequest,
    RunState, Session,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use config::Config;
use error::{Error, Result};

const SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Use the available functions when they help. Be concise.";

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(about = "Function-calling orchestration for conversational models", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "switchyard.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat,
    /// Start or resume a server-side run and answer its function calls
    Run {
        /// Thread the run belongs to
        #[arg(short, long)]
        thread: String,
        /// Start a new run for this assistant
        #[arg(short, long, conflicts_with = "run", required_unless_present = "run")]
        assistant: Option<String>,
        /// Resume an existing run
        #[arg(short, long)]
        run: Option<String>,
        /// Instructions overriding the assistant's own
        #[arg(short, long, requires = "assistant")]
        instructions: Option<String>,
    },
    /// List all sessions
    Sessions {
        /// Show only the last N sessions
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Show event logs for a session
    Logs {
        /// Session ID (prefix match supported)
        #[arg(short, long)]
        session: String,
        /// Filter by event kind (message, function_call, function_result, run_status, ...)
        #[arg(short, long)]
        kind: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config)?;
    telemetry::init(&config.logging.level);

    match cli.command {
        Some(Commands::Chat) | None => cmd_chat(&config).await,
        Some(Commands::Run {
            thread,
            assistant,
            run,
            instructions,
        }) => cmd_run(&config, &thread, assistant, run, instructions).await,
        Some(Commands::Sessions { limit }) => cmd_sessions(&config, limit),
        Some(Commands::Logs { session, kind }) => cmd_logs(&config, &session, kind.as_deref()),
    }
}

async fn cmd_chat(config: &Config) -> Result<()> {
    println!("switchyard v{}", env!("CARGO_PKG_VERSION"));

    let http = config.endpoint.http_config("endpoint")?;
    let endpoint = HttpModelEndpoint::new(http);

    let store = Arc::new(create_store(&config.journal.path())?);
    let registry = functions::builtin_registry();
    let function_names: Vec<_> = registry
        .descriptors()
        .iter()
        .map(|d| d.name.as_str())
        .collect();
    println!("Functions: {}", function_names.join(", "));

    println!("Endpoint: {endpoint}");

    let mut session = Session::new(endpoint, registry)
        .with_config(config.loop_config())
        .with_system(config.system.as_deref().unwrap_or(SYSTEM_PROMPT))
        .with_journal(store)?;
    println!("Session ID: {}", session.id);
    println!("Type 'quit' or Ctrl+D to exit, 'reset' to start over.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            break;
        }
        if input == "reset" {
            session.reset();
            println!("History cleared.\n");
            continue;
        }

        match session.chat(input).await {
            Ok(response) => {
                println!("\n{response}\n");
            }
            Err(e) => {
                eprintln!("Error: {e}\n");
            }
        }
    }

    session.end()?;
    println!("\nSession ended.");
    Ok(())
}

async fn cmd_run(
    config: &Config,
    thread: &str,
    assistant: Option<String>,
    run_id: Option<String>,
    instructions: Option<String>,
) -> Result<()> {
    let jobs = HttpJobEndpoint::new(config.jobs.http_config("jobs")?);
    let registry: FunctionRegistry = functions::builtin_registry();

    let store = Arc::new(create_store(&config.journal.path())?);
    let session_id = SessionId::new();
    let recorder = Recorder::new(store, session_id);
    recorder.session_start()?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling run drive");
            on_interrupt.cancel();
        }
    });

    let driver = RunDriver::new(&jobs, &registry)
        .with_poll(config.poll)
        .with_cancellation(cancel)
        .with_recorder(recorder.clone());

    println!("Session ID: {session_id}");
    let outcome = match (assistant, run_id) {
        (_, Some(run_id)) => {
            println!("Resuming run {run_id} on thread {thread}");
            driver.retrieve(thread, &run_id).await
        }
        (Some(assistant), None) => {
            let mut request =
                RunRequest::new(thread, assistant).functions(registry.descriptors().to_vec());
            if let Some(instructions) = instructions {
                request = request.instructions(instructions);
            }
            println!("Starting run on thread {thread}");
            driver.start(&request).await
        }
        (None, None) => Err(orchestrator::Error::Config(
            "either --assistant or --run is required".into(),
        )),
    };
    recorder.session_end()?;

    let snapshot = outcome?;
    println!("Run {} finished: {}", snapshot.id, snapshot.state);
    match snapshot.state {
        RunState::Completed(output) => {
            if let Some(output) = output {
                println!("\n{output}");
            }
            if let Some(usage) = snapshot.usage {
                println!("Tokens: {}", usage.total_tokens);
            }
            Ok(())
        }
        RunState::Failed(failure) => Err(Error::RunUnsuccessful {
            run_id: snapshot.id,
            status: format!("failed ({failure})"),
        }),
        state => Err(Error::RunUnsuccessful {
            run_id: snapshot.id,
            status: state.status().to_string(),
        }),
    }
}

fn cmd_sessions(config: &Config, limit: usize) -> Result<()> {
    let store = open_store(&config.journal.path())?;
    let sessions = store.list_sessions()?;

    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<20}  {:<8}  STATUS",
        "SESSION ID", "STARTED", "MSGS"
    );
    println!("{}", "-".repeat(80));

    for summary in sessions.into_iter().take(limit) {
        let started = Local
            .from_utc_datetime(&summary.started_at.naive_utc())
            .format("%Y-%m-%d %H:%M");
        let status = if summary.ended_at.is_some() {
            "ended"
        } else {
            "active"
        };
        println!(
            "{:<36}  {:<20}  {:<8}  {status}",
            summary.id, started, summary.message_count
        );
    }

    Ok(())
}

fn cmd_logs(config: &Config, session_prefix: &str, kind_filter: Option<&str>) -> Result<()> {
    let store = open_store(&config.journal.path())?;
    let session_id = store.find_session(session_prefix)?;
    let events = store.load_events(session_id, kind_filter)?;

    if events.is_empty() {
        println!("No events found for session {session_id}");
        return Ok(());
    }

    println!("Session: {session_id}\n");

    for event in events {
        print_event(&event);
    }

    Ok(())
}

fn print_event(event: &Event) {
    let time = Local
        .from_utc_datetime(&event.timestamp.naive_utc())
        .format("%H:%M:%S");

    match &event.kind {
        EventKind::SessionStart => {
            println!("[{time}] === Session started ===");
        }
        EventKind::SessionEnd => {
            println!("[{time}] === Session ended ===");
        }
        EventKind::Message { role, content } => {
            let role_str = match role {
                Role::User => "USER",
                Role::Assistant => "ASSISTANT",
                Role::System => "SYSTEM",
            };
            println!("[{time}] {role_str}: {}", truncate(content, 200));
        }
        EventKind::FunctionCall {
            call_id,
            name,
            arguments,
        } => {
            println!("[{time}] CALL {call_id}: {name}({arguments})");
        }
        EventKind::FunctionResult {
            call_id,
            output,
            is_error,
            ..
        } => {
            let label = if *is_error { "ERROR" } else { "RESULT" };
            println!(
                "[{time}] {label} {call_id}: {}",
                truncate(&output.to_string(), 200)
            );
        }
        EventKind::Compacted { removed_turns } => {
            println!("[{time}] --- compacted {removed_turns} turns ---");
        }
        EventKind::RunStatus { run_id, status } => {
            println!("[{time}] RUN {run_id}: {status}");
        }
        EventKind::ToolOutputsSubmitted { run_id, call_ids } => {
            println!("[{time}] RUN {run_id}: submitted {}", call_ids.join(", "));
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn create_store(path: &Path) -> Result<EventStore> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)?;
    }
    Ok(EventStore::open(path)?)
}

fn open_store(path: &Path) -> Result<EventStore> {
    if !path.exists() {
        return Err(Error::JournalNotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(EventStore::open(path)?)
}
