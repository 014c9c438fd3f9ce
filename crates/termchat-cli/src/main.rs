use anyhow::Result;
use clap::Parser;
use serde_json::json;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use termchat_errors::ErrorHandler;
use termchat_llm::{ChatTransport, OpenAiClient};
use termchat_ui::{PlainSession, SessionController, SessionSettings, run_tui};

mod context;

use context::{
    apply_cli_flags, build_observer, load_config, open_store, redacted_config, resolve_key,
    store_path,
};

#[derive(Parser)]
#[command(name = "termchat", version)]
#[command(about = "Chat with an OpenAI-compatible model from the terminal", long_about = None)]
pub struct Cli {
    /// Model for this session (overrides llm.model).
    #[arg(long)]
    pub model: Option<String>,

    /// Chat completions URL (overrides llm.endpoint).
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Conversation file to load and save.
    #[arg(long, value_name = "PATH")]
    pub store: Option<PathBuf>,

    /// Keep conversations in memory only.
    #[arg(long)]
    pub no_persist: bool,

    /// Line-by-line mode. Used automatically when stdin or stdout is not a terminal.
    #[arg(long)]
    pub plain: bool,

    /// Echo log events to stderr (plain mode only).
    #[arg(long)]
    pub verbose: bool,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    pub print_config: bool,
}

fn main() {
    let cli = Cli::parse();
    let verbose = cli.verbose;
    if let Err(err) = run(cli) {
        eprintln!("{}", ErrorHandler::new().verbose(verbose).handle(&err));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let mut cfg = load_config(&cwd)?;
    apply_cli_flags(&mut cfg, &cli);
    let store_path = store_path(&cfg, &cli, &cwd);

    if cli.print_config {
        let value = redacted_config(&cfg, store_path.as_deref())?;
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let api_key = resolve_key(&cfg, &cwd)?;
    let transport: Arc<dyn ChatTransport> = Arc::new(OpenAiClient::new(cfg.llm.clone(), api_key)?);
    let mut store = open_store(store_path.as_deref());
    let mut observer = build_observer(&cwd, cli.verbose);
    let interactive = !cli.plain && io::stdin().is_terminal() && io::stdout().is_terminal();

    observer.record(
        "session.started",
        json!({
            "mode": if interactive { "tui" } else { "plain" },
            "model": cfg.llm.model,
            "endpoint": cfg.llm.endpoint,
            "store": store.path().map(|p| p.display().to_string()),
            "conversations": store.len(),
        }),
    );

    if interactive {
        // The alternate screen owns the terminal; warnings go to the log only.
        observer.set_stderr_echo(false);
        let mut session = SessionController::new(
            store,
            transport,
            observer,
            SessionSettings::from_config(&cfg),
        );
        return run_tui(&mut session);
    }

    let mut session = PlainSession {
        store: &mut store,
        transport,
        observer: &observer,
        model: cfg.llm.model.clone(),
    };
    session.run(io::stdin().lock(), io::stdout().lock())
}
