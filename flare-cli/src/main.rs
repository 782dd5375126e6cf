//! # Flare CLI
//!
//! Command-line interface for driving and triaging a fuzzing campaign.
//!
//! Usage:
//!   flare chat [--execute]
//!   flare ask [--execute] [--json] <message>...
//!   flare exec [--json] <command>...
//!   flare status <target>
//!   flare triage [--json] <target>
//!   flare sessions
//!
//! Examples:
//!   flare ask "Write a harness for libpng's png_read_info"
//!   flare -s png ask --execute "Build libpng with afl-clang-fast"
//!   flare exec "mkdir -p in" "echo seed > in/seed"
//!   flare triage libpng

use clap::{ArgAction, Parser, Subcommand};
use flare_agent::{ChatTurn, CorrectionOutcome, Orchestrator};
use flare_core::{
    error, prose, AnyProvider, ChatMessage, ChatRelay, Error, ErrorKind, FlareConfig, FuzzStatusProbe,
    FuzzTarget, Relay, RelayEnvelope, Result, TriageReport, Workspace,
};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const FALLBACK_SUGGESTION: &str = "No suggestion available.";

#[derive(Parser)]
#[command(name = "flare")]
#[command(author, version, about = "Flare - talk to a model to drive and triage a fuzzing campaign")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: $FLARE_CONFIG, then ./flare.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Session ID; each run gets a fresh workspace when omitted
    #[arg(short, long, global = true)]
    session: Option<String>,

    /// More logging on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - no banners
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive multi-turn chat; type 'exit' to quit
    Chat {
        /// Run the command blocks of every reply
        #[arg(long)]
        execute: bool,
    },
    /// Send one message
    Ask {
        /// Run the command blocks of the reply
        #[arg(long)]
        execute: bool,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,

        /// The message
        #[arg(trailing_var_arg = true, required = true)]
        message: Vec<String>,
    },
    /// Run commands in the session workspace, stopping at the first failure
    Exec {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,

        /// One shell command per argument
        #[arg(required = true)]
        commands: Vec<String>,
    },
    /// Show the fuzzer status of a target
    Status {
        target: String,
    },
    /// Replay and explain every crash of a target
    Triage {
        target: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// List session workspaces
    Sessions,
}

/// The configured relay, or the reason it could not be built.
///
/// Commands that only need best-effort advice keep working without
/// credentials; the reason surfaces wherever advice was expected.
enum CliRelay {
    Ready(ChatRelay<AnyProvider>),
    Unavailable { kind: ErrorKind, reason: String },
}

impl CliRelay {
    fn from_config(config: &FlareConfig) -> Self {
        match build_relay(config) {
            Ok(relay) => CliRelay::Ready(relay),
            Err(err) => {
                tracing::info!(error = %err, "relay not configured");
                CliRelay::Unavailable {
                    kind: err.kind(),
                    reason: err.message().to_string(),
                }
            }
        }
    }

    /// Fail fast for commands whose whole point is the relay
    fn require(self) -> Result<Self> {
        match self {
            CliRelay::Unavailable { kind, reason } => Err(Error::new(kind, reason)),
            ready => Ok(ready),
        }
    }
}

impl Relay for CliRelay {
    fn system_prompt(&self) -> Option<&str> {
        match self {
            CliRelay::Ready(relay) => relay.system_prompt(),
            CliRelay::Unavailable { .. } => None,
        }
    }

    async fn exchange(&self, turns: &[ChatMessage]) -> Result<String> {
        match self {
            CliRelay::Ready(relay) => relay.exchange(turns).await,
            CliRelay::Unavailable { kind, reason } => Err(Error::new(*kind, reason.clone())),
        }
    }
}

fn build_relay(config: &FlareConfig) -> Result<ChatRelay<AnyProvider>> {
    let provider = AnyProvider::from_config(config.relay.provider_config()?)
        .map_err(|e| error::from_provider(e).with_operation("cli::build_relay"))?;
    Ok(ChatRelay::new(provider)
        .with_system_prompt(config.relay.system_prompt.clone())
        .with_timeout(config.relay.timeout()))
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open_workspace(config: &FlareConfig, session: Option<&str>) -> Result<Workspace> {
    match session {
        Some(id) => Workspace::open(&config.workspace.root)?.session(id),
        None => Workspace::new_session(&config.workspace.root),
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Failed to serialize output: {}", e),
    }
}

fn print_execution(outcome: &CorrectionOutcome) {
    for result in &outcome.executed {
        println!("$ {}", result.command);
        if !result.stdout.is_empty() {
            print!("{}", result.stdout);
        }
        if !result.stderr.is_empty() {
            eprint!("{}", result.stderr);
        }
        if !result.succeeded() {
            println!("[{}]", result.status_line());
        }
    }

    match (&outcome.failure, &outcome.suggestion) {
        (None, _) => println!("Execution completed successfully."),
        (Some(failure), suggestion) => {
            println!("\nCommand failed: {}", failure.command);
            if !failure.error.is_empty() {
                println!("Error: {}", failure.error);
            }
            if outcome.skipped > 0 {
                println!("Skipped {} remaining command(s).", outcome.skipped);
            }
            let suggestion = suggestion
                .as_ref()
                .map(|s| s.render(FALLBACK_SUGGESTION))
                .unwrap_or_else(|| FALLBACK_SUGGESTION.to_string());
            println!("\nSuggestion:\n{}", suggestion.trim_end());
        }
    }
}

/// Full reply, or its prose followed by what running its blocks did
fn print_turn(turn: &ChatTurn) {
    match &turn.execution {
        None => println!("Flare: {}", turn.reply.trim_end()),
        Some(outcome) => {
            let text = prose(&turn.reply);
            if !text.is_empty() {
                println!("Flare: {}\n", text);
            }
            print_execution(outcome);
        }
    }
}

async fn run_chat(mut orchestrator: Orchestrator<CliRelay>, execute: bool) -> Result<()> {
    println!("Welcome to Flare chat. Type 'exit' to end the chat.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("You: ");
        let _ = std::io::stdout().flush();

        let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| Error::from(e).with_operation("cli::chat"))?
        else {
            println!();
            break;
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") {
            println!("Goodbye!");
            break;
        }

        match orchestrator.chat(input, execute).await {
            Ok(turn) => print_turn(&turn),
            Err(err) => println!("An error occurred: {}", err.message()),
        }
    }
    Ok(())
}

async fn run_ask(orchestrator: &Orchestrator<CliRelay>, message: &str, execute: bool, json: bool) -> Result<bool> {
    match orchestrator.ask(message, execute).await {
        Ok(turn) => {
            let ok = turn.execution.as_ref().map_or(true, |e| e.succeeded());
            if json {
                print_json(&turn);
            } else {
                print_turn(&turn);
            }
            Ok(ok)
        }
        Err(err) if json => {
            print_json(&RelayEnvelope::error(err.message()));
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

async fn run_status(config: &FlareConfig, workspace: &Workspace, target: &str) -> Result<bool> {
    let target = FuzzTarget::locate(target, &config.fuzz)?;
    match FuzzStatusProbe::from_config(&config.fuzz).status(&target, workspace).await {
        Ok(text) => {
            print!("{}", text);
            Ok(true)
        }
        Err(err) => {
            println!("Status unavailable: {}", err.message());
            Ok(false)
        }
    }
}

fn print_report(report: &TriageReport, json: bool) {
    if json {
        print_json(report);
    } else {
        print!("{}", report.render());
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let config = FlareConfig::discover(cli.config.as_deref())?;

    if let Commands::Sessions = cli.command {
        let sessions = Workspace::open(&config.workspace.root)?.list_sessions()?;
        if sessions.is_empty() && !cli.quiet {
            println!("No sessions found in {}", config.workspace.root.display());
        }
        for id in sessions {
            println!("{}", id);
        }
        return Ok(true);
    }

    let workspace = open_workspace(&config, cli.session.as_deref())?;
    let json = matches!(
        cli.command,
        Commands::Ask { json: true, .. } | Commands::Exec { json: true, .. } | Commands::Triage { json: true, .. }
    );
    if !cli.quiet && !json {
        println!("Flare - session {}\n", workspace.session_id().unwrap_or("-"));
    }

    match cli.command {
        Commands::Chat { execute } => {
            let relay = CliRelay::from_config(&config).require()?;
            run_chat(Orchestrator::from_config(relay, workspace, &config)?, execute).await?;
            Ok(true)
        }
        Commands::Ask { execute, json, message } => {
            let relay = CliRelay::from_config(&config);
            let relay = if json { relay } else { relay.require()? };
            let orchestrator = Orchestrator::from_config(relay, workspace, &config)?;
            run_ask(&orchestrator, &message.join(" "), execute, json).await
        }
        Commands::Exec { json, commands } => {
            let orchestrator = Orchestrator::from_config(CliRelay::from_config(&config), workspace, &config)?;
            let outcome = orchestrator.execute(commands).await;
            if json {
                print_json(&outcome);
            } else {
                print_execution(&outcome);
            }
            Ok(outcome.succeeded())
        }
        Commands::Status { target } => run_status(&config, &workspace, &target).await,
        Commands::Triage { target, json } => {
            let orchestrator = Orchestrator::from_config(CliRelay::from_config(&config), workspace, &config)?;
            let report = orchestrator.triage(&target).await?;
            print_report(&report, json);
            Ok(report.error.is_none())
        }
        Commands::Sessions => Ok(true),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let verbose = cli.verbose;

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            if verbose > 0 {
                eprintln!("Error: {}", err);
            } else {
                eprintln!("Error: {}", err.message());
            }
            tracing::debug!("{:?}", err);
            std::process::exit(1);
        }
    }
}
