use crate::Cli;
use anyhow::Result;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use termchat_core::{AppConfig, resolve_api_key, runtime_dir, user_runtime_dir};
use termchat_errors::errors;
use termchat_observe::Observer;
use termchat_store::ConversationStore;

const REDACTED: &str = "***";

/// Layered settings with invalid files reported as configuration errors.
pub fn load_config(cwd: &Path) -> Result<AppConfig> {
    AppConfig::load(cwd).map_err(|e| errors::invalid_configuration(&e.to_string()).into_error())
}

/// Command-line flags win over every settings layer.
pub fn apply_cli_flags(cfg: &mut AppConfig, cli: &Cli) {
    if let Some(model) = cli.model.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        cfg.llm.model = model.to_string();
    }
    if let Some(endpoint) = cli.endpoint.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        cfg.llm.endpoint = endpoint.to_string();
    }
    if let Some(store) = &cli.store {
        cfg.storage.conversations_path = Some(store.display().to_string());
    }
}

pub fn resolve_key(cfg: &AppConfig, cwd: &Path) -> Result<String> {
    let dotenv = termchat_core::load_dotenv(&cwd.join(".env"));
    resolve_api_key(&cfg.llm, &dotenv)
        .ok_or_else(|| errors::missing_api_key(&cfg.llm.api_key_env).into_error())
}

pub fn store_path(cfg: &AppConfig, cli: &Cli, cwd: &Path) -> Option<PathBuf> {
    (!cli.no_persist).then(|| cfg.conversations_path(cwd))
}

pub fn open_store(path: Option<&Path>) -> ConversationStore {
    match path {
        Some(path) => ConversationStore::open(path),
        None => ConversationStore::in_memory(),
    }
}

/// `~/.termchat/observe.log`, or the workspace runtime dir without a home.
/// Logging is dropped entirely when neither can be created.
pub fn build_observer(cwd: &Path, verbose: bool) -> Observer {
    let dir = user_runtime_dir().unwrap_or_else(|| runtime_dir(cwd));
    let mut observer = Observer::new(&dir).unwrap_or_else(|_| Observer::disabled());
    observer.set_verbose(verbose);
    observer
}

/// Effective configuration as JSON with the stored key hidden.
pub fn redacted_config(cfg: &AppConfig, store: Option<&Path>) -> Result<Value> {
    let mut value = serde_json::to_value(cfg)?;
    if cfg.llm.api_key.is_some() {
        value["llm"]["api_key"] = json!(REDACTED);
    }
    value["storage"]["effective_path"] = match store {
        Some(path) => json!(path.display().to_string()),
        None => Value::Null,
    };
    Ok(value)
}
