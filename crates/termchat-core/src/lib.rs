use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub type Result<T> = anyhow::Result<T>;

pub const DEFAULT_CONVERSATION_TITLE: &str = "New Chat";
/// Number of characters kept from the first user message when deriving a title.
pub const TITLE_MAX_CHARS: usize = 30;
pub const DEFAULT_ENDPOINT: &str = "https://ai.hackclub.com/proxy/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "openai/gpt-5.1";
pub const DEFAULT_API_KEY_ENV: &str = "API_KEY";

pub fn runtime_dir(workspace: &Path) -> PathBuf {
    workspace.join(".termchat")
}

/// Per-user runtime directory (`~/.termchat`), if a home directory is known.
pub fn user_runtime_dir() -> Option<PathBuf> {
    let home = std::env::var("HOME")
        .ok()
        .or_else(|| std::env::var("USERPROFILE").ok())?;
    Some(runtime_dir(Path::new(&home)))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PartKind {
    Text,
    Image,
}

/// One piece of a multipart user message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentPart {
    pub kind: PartKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64_payload: Option<String>,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: PartKind::Text,
            text: Some(text.into()),
            mime_type: None,
            base64_payload: None,
        }
    }

    pub fn image(mime_type: impl Into<String>, base64_payload: impl Into<String>) -> Self {
        Self {
            kind: PartKind::Image,
            text: None,
            mime_type: Some(mime_type.into()),
            base64_payload: Some(base64_payload.into()),
        }
    }

    /// `data:{mime};base64,{payload}` for image parts.
    pub fn data_uri(&self) -> Option<String> {
        if self.kind != PartKind::Image {
            return None;
        }
        let mime = self.mime_type.as_deref()?;
        let payload = self.base64_payload.as_deref()?;
        Some(format!("data:{mime};base64,{payload}"))
    }
}

/// Plain text, or an ordered list of parts when images accompany the text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter(|part| part.kind == PartKind::Text)
                .filter_map(|part| part.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn image_count(&self) -> usize {
        match self {
            MessageContent::Text(_) => 0,
            MessageContent::Parts(parts) => parts
                .iter()
                .filter(|part| part.kind == PartKind::Image)
                .count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn text_content(&self) -> String {
        self.content.text()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub last_updated: DateTime<Utc>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            title: DEFAULT_CONVERSATION_TITLE.to_string(),
            messages: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    /// A title counts as derived once it differs from the seed title.
    pub fn has_derived_title(&self) -> bool {
        self.title != DEFAULT_CONVERSATION_TITLE
    }

    pub fn assistant_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .count()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Title from the first user message: its first 30 characters, plus `...` if longer.
///
/// Whitespace runs (newlines included) count as one space, so the title
/// always fits the one-line header.
pub fn derive_title(messages: &[Message]) -> Option<String> {
    let first = messages.iter().find(|m| m.role == Role::User)?;
    let text = first.text_content();
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.is_empty() {
        return None;
    }
    let mut title: String = flat.chars().take(TITLE_MAX_CHARS).collect();
    if flat.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    Some(title)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
}

/// A single chunk emitted during streaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    /// A content text delta.
    ContentDelta(String),
    /// The server signalled the end of the stream.
    Done,
}

pub type StreamCallback = std::sync::Arc<dyn Fn(StreamChunk) + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub ui: UiConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn user_settings_path() -> Option<PathBuf> {
        user_runtime_dir().map(|dir| dir.join("settings.json"))
    }

    pub fn project_settings_path(workspace: &Path) -> PathBuf {
        runtime_dir(workspace).join("settings.json")
    }

    pub fn project_local_settings_path(workspace: &Path) -> PathBuf {
        runtime_dir(workspace).join("settings.local.json")
    }

    /// Defaults, then user settings, then project settings, then project-local settings.
    pub fn load(workspace: &Path) -> Result<Self> {
        let mut paths = Vec::new();
        if let Some(user) = Self::user_settings_path() {
            paths.push(user);
        }
        paths.push(Self::project_settings_path(workspace));
        paths.push(Self::project_local_settings_path(workspace));
        Self::load_layers(&paths)
    }

    pub fn load_layers(paths: &[PathBuf]) -> Result<Self> {
        let mut merged = serde_json::to_value(Self::default())?;
        for path in paths {
            if !path.exists() {
                continue;
            }
            let raw = fs::read_to_string(path)?;
            let value: serde_json::Value = serde_json::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("invalid configuration in {}: {e}", path.display()))?;
            merge_json_value(&mut merged, &value);
        }
        Ok(serde_json::from_value(merged)?)
    }

    /// Conversation file: explicit setting, else `~/.termchat/conversations.json`,
    /// else the workspace runtime dir.
    pub fn conversations_path(&self, workspace: &Path) -> PathBuf {
        if let Some(path) = self
            .storage
            .conversations_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
        {
            return PathBuf::from(path);
        }
        user_runtime_dir()
            .unwrap_or_else(|| runtime_dir(workspace))
            .join("conversations.json")
    }
}

fn merge_json_value(base: &mut serde_json::Value, overlay: &serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base_obj), serde_json::Value::Object(overlay_obj)) => {
            for (key, overlay_value) in overlay_obj {
                if let Some(base_value) = base_obj.get_mut(key) {
                    merge_json_value(base_value, overlay_value);
                } else {
                    base_obj.insert(key.clone(), overlay_value.clone());
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value.clone();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub endpoint: String,
    pub model: String,
    /// Models offered by the model picker. The active model is always offered.
    pub available_models: Vec<String>,
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub temperature: Option<f32>,
    pub timeout_seconds: u64,
    pub max_retries: u8,
    pub retry_base_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            available_models: vec![
                DEFAULT_MODEL.to_string(),
                "openai/gpt-5-mini".to_string(),
                "anthropic/claude-sonnet-4.5".to_string(),
                "google/gemini-2.5-flash".to_string(),
                "moonshotai/kimi-k2-thinking".to_string(),
            ],
            api_key: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            temperature: None,
            timeout_seconds: 30,
            max_retries: 2,
            retry_base_ms: 400,
        }
    }
}

impl LlmConfig {
    /// Picker entries: configured models with the active one first if missing.
    pub fn model_choices(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.available_models.iter().any(|m| m == &self.model) {
            out.push(self.model.clone());
        }
        for model in &self.available_models {
            if !model.trim().is_empty() && !out.contains(model) {
                out.push(model.clone());
            }
        }
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub show_help_on_start: bool,
    /// Lines of context kept when paging.
    pub page_overlap: usize,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            show_help_on_start: false,
            page_overlap: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub conversations_path: Option<String>,
}

/// Parse `KEY=value` lines of a `.env` file. Comments, blank lines and
/// malformed lines are skipped; an `export ` prefix and matching quotes are
/// stripped.
pub fn parse_dotenv(raw: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            continue;
        }
        let value = value.trim();
        let value = ['"', '\'']
            .iter()
            .find_map(|q| {
                value
                    .strip_prefix(*q)
                    .and_then(|rest| rest.strip_suffix(*q))
            })
            .unwrap_or(value);
        out.insert(key.to_string(), value.to_string());
    }
    out
}

/// Missing or unreadable files yield an empty map.
pub fn load_dotenv(path: &Path) -> HashMap<String, String> {
    fs::read_to_string(path)
        .map(|raw| parse_dotenv(&raw))
        .unwrap_or_default()
}

/// Credential lookup order: process environment, `.env` values, settings file.
pub fn resolve_api_key(cfg: &LlmConfig, dotenv: &HashMap<String, String>) -> Option<String> {
    let non_empty = |value: &str| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    };
    std::env::var(&cfg.api_key_env)
        .ok()
        .and_then(|v| non_empty(&v))
        .or_else(|| dotenv.get(&cfg.api_key_env).and_then(|v| non_empty(v)))
        .or_else(|| cfg.api_key.as_deref().and_then(non_empty))
}
