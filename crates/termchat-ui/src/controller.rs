//! The interactive session: owns the store, the in-memory message list and
//! all cursor state, and turns key events into store mutations and repaints.

use crate::attachments::AttachmentStaging;
use crate::commands::InputCommand;
use crate::editor::{EditOutcome, LineEditor};
use crate::history::HistoryCursor;
use crate::overlay::{ModelPicker, Overlay, OverlayOutcome, OverlayResult, SearchOverlay};
use crate::pipeline::{ReplyOutcome, stream_reply};
use crate::render::{self, Layout, reply_blocks, transcript_blocks};
use crate::surface::RedrawSurface;
use crate::viewport::{Tone, Viewport};
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use termchat_core::{AppConfig, ChatRequest, Message, Role};
use termchat_errors::{ChatError, ErrorHandler};
use termchat_llm::ChatTransport;
use termchat_observe::Observer;
use termchat_store::ConversationStore;

const IDLE_STATUS: &str = "Enter sends | /nav to browse | /help for commands";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Input,
    Nav,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Everything a key source can deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInput {
    Key(KeyEvent),
    Paste(String),
    Resize(u16, u16),
    /// Ctrl+C or a termination signal.
    Interrupt,
    /// The key source is closed.
    Eof,
}

/// Startup options that are not part of the store.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub model: String,
    pub model_choices: Vec<String>,
    pub page_overlap: usize,
    pub show_help_on_start: bool,
}

impl SessionSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            model: cfg.llm.model.clone(),
            model_choices: cfg.llm.model_choices(),
            page_overlap: cfg.ui.page_overlap,
            show_help_on_start: cfg.ui.show_help_on_start,
        }
    }
}

pub struct SessionController {
    store: ConversationStore,
    transport: Arc<dyn ChatTransport>,
    observer: Observer,
    errors: ErrorHandler,
    model: String,
    model_choices: Vec<String>,
    messages: Vec<Message>,
    mode: Mode,
    overlay: Option<Overlay>,
    viewport: Viewport,
    history: HistoryCursor,
    staging: AttachmentStaging,
    editor: LineEditor,
    status: (String, Tone),
    streaming: Option<String>,
    unsaved_partial: Option<String>,
    ended: bool,
}

impl SessionController {
    pub fn new(
        store: ConversationStore,
        transport: Arc<dyn ChatTransport>,
        observer: Observer,
        settings: SessionSettings,
    ) -> Self {
        let messages = store.current().messages.clone();
        let layout = Layout::compute(80, 24);
        let mut ctrl = Self {
            store,
            transport,
            observer,
            errors: ErrorHandler::new(),
            model: settings.model,
            model_choices: settings.model_choices,
            messages,
            mode: Mode::Input,
            overlay: settings.show_help_on_start.then_some(Overlay::Help),
            viewport: Viewport::new(layout.width as usize, layout.pane_height as usize)
                .with_page_overlap(settings.page_overlap),
            history: HistoryCursor::new(),
            staging: AttachmentStaging::new(),
            editor: LineEditor::new(),
            status: (IDLE_STATUS.to_string(), Tone::Dim),
            streaming: None,
            unsaved_partial: None,
            ended: false,
        };
        ctrl.refresh_pane();
        ctrl.viewport.end();
        ctrl
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn overlay(&self) -> Option<&Overlay> {
        self.overlay.as_ref()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn history(&self) -> &HistoryCursor {
        &self.history
    }

    pub fn staging(&self) -> &AttachmentStaging {
        &self.staging
    }

    pub fn editor(&self) -> &LineEditor {
        &self.editor
    }

    pub fn status(&self) -> (&str, Tone) {
        (&self.status.0, self.status.1)
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.is_some()
    }

    pub fn unsaved_partial(&self) -> Option<&str> {
        self.unsaved_partial.as_deref()
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Match the pane to the surface size and repaint everything.
    pub fn render(&mut self, surface: &mut dyn RedrawSurface) -> Result<()> {
        surface.clear();
        let (width, height) = surface.size();
        let layout = Layout::compute(width, height);
        self.viewport
            .resize(layout.width as usize, layout.pane_height as usize);
        render::draw(self, surface)
    }

    pub fn handle(&mut self, input: SessionInput, surface: &mut dyn RedrawSurface) -> Flow {
        let flow = match input {
            SessionInput::Interrupt => self.end("interrupt"),
            SessionInput::Eof => self.end("eof"),
            SessionInput::Resize(width, height) => {
                let layout = Layout::compute(width, height);
                self.viewport
                    .resize(layout.width as usize, layout.pane_height as usize);
                Flow::Continue
            }
            SessionInput::Paste(text) => {
                match self.overlay.as_mut() {
                    Some(Overlay::FileAttach(editor)) => editor.insert_str(text.trim()),
                    Some(Overlay::Search(_)) | Some(Overlay::ModelSelect(_)) => {}
                    _ if self.mode == Mode::Input => self.editor.insert_str(&text),
                    _ => {}
                }
                Flow::Continue
            }
            SessionInput::Key(key) => self.handle_key(key, surface),
        };
        if flow == Flow::Quit {
            self.end("quit");
        }
        flow
    }

    /// Log the end of the session once.
    fn end(&mut self, reason: &str) -> Flow {
        if !self.ended {
            self.ended = true;
            self.observer.record(
                "session.ended",
                json!({
                    "reason": reason,
                    "conversations": self.store.len(),
                }),
            );
        }
        Flow::Quit
    }

    fn handle_key(&mut self, key: KeyEvent, surface: &mut dyn RedrawSurface) -> Flow {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if ctrl && key.code == KeyCode::Char('c') {
            return self.end("interrupt");
        }

        if let Some(mut overlay) = self.overlay.take() {
            let was_help = matches!(overlay, Overlay::Help);
            match overlay.handle_key(key, self.store.conversations()) {
                OverlayOutcome::Stay => {
                    self.overlay = Some(overlay);
                    return Flow::Continue;
                }
                OverlayOutcome::Resolved(result) => {
                    self.apply_overlay_result(result);
                    return Flow::Continue;
                }
                OverlayOutcome::PassThrough => {
                    // h and ? close help in nav mode instead of reopening it
                    if was_help
                        && self.mode == Mode::Nav
                        && matches!(key.code, KeyCode::Char('h') | KeyCode::Char('?'))
                    {
                        return Flow::Continue;
                    }
                }
            }
        }

        match self.mode {
            Mode::Input => match self.editor.handle_key(key) {
                EditOutcome::Submitted(line) => self.submit_line(&line, surface),
                EditOutcome::Eof => self.end("eof"),
                _ => Flow::Continue,
            },
            Mode::Nav => self.nav_key(key, surface),
        }
    }

    /// Run one submitted input line: a command token or a message.
    pub fn submit_line(&mut self, line: &str, surface: &mut dyn RedrawSurface) -> Flow {
        let Some(command) = InputCommand::parse(line) else {
            return Flow::Continue;
        };
        let result = match command {
            InputCommand::Quit => return Flow::Quit,
            InputCommand::Clear => {
                self.clear_conversation();
                Ok(())
            }
            InputCommand::New => {
                self.new_conversation();
                Ok(())
            }
            InputCommand::Delete => self.delete_conversation(),
            InputCommand::Nav => {
                self.mode = Mode::Nav;
                self.set_status("navigation mode, Esc to type, h for help", Tone::Dim);
                Ok(())
            }
            InputCommand::Search(query) => {
                self.open_search(query.as_deref());
                Ok(())
            }
            InputCommand::Model(Some(name)) => {
                self.set_model(name);
                Ok(())
            }
            InputCommand::Model(None) => {
                self.open_model_picker();
                Ok(())
            }
            InputCommand::Stats => {
                self.overlay = Some(Overlay::Stats);
                Ok(())
            }
            InputCommand::Attach(Some(path)) => {
                self.stage_path(Path::new(&path));
                Ok(())
            }
            InputCommand::Attach(None) => {
                self.overlay = Some(Overlay::FileAttach(LineEditor::new()));
                Ok(())
            }
            InputCommand::Detach => {
                self.detach_all();
                Ok(())
            }
            InputCommand::Help => {
                self.overlay = Some(Overlay::Help);
                Ok(())
            }
            InputCommand::Regenerate => self.regenerate_last(surface),
            InputCommand::Send(text) => self.send_message(&text, surface),
        };
        if let Err(err) = result {
            self.report(&err);
        }
        Flow::Continue
    }

    fn nav_key(&mut self, key: KeyEvent, surface: &mut dyn RedrawSurface) -> Flow {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            if key.code == KeyCode::Char('d') {
                return self.end("eof");
            }
            return Flow::Continue;
        }
        let result = match key.code {
            KeyCode::Esc | KeyCode::Char('i') => {
                self.mode = Mode::Input;
                self.set_status(IDLE_STATUS, Tone::Dim);
                Ok(())
            }
            KeyCode::Char('q') => return Flow::Quit,
            KeyCode::Up => {
                self.switch_conversation(-1);
                Ok(())
            }
            KeyCode::Down => {
                self.switch_conversation(1);
                Ok(())
            }
            KeyCode::Char('k') => {
                self.viewport.line_up();
                Ok(())
            }
            KeyCode::Char('j') => {
                self.viewport.line_down();
                Ok(())
            }
            KeyCode::Char('u') | KeyCode::PageUp => {
                self.viewport.page_up();
                Ok(())
            }
            KeyCode::Char('d') | KeyCode::PageDown | KeyCode::Char(' ') => {
                self.viewport.page_down();
                Ok(())
            }
            KeyCode::Char('g') | KeyCode::Home => {
                self.viewport.home();
                Ok(())
            }
            KeyCode::Char('G') | KeyCode::End => {
                self.viewport.end();
                Ok(())
            }
            KeyCode::Left | KeyCode::Char('[') => {
                self.browse_older();
                Ok(())
            }
            KeyCode::Right | KeyCode::Char(']') => {
                self.browse_newer();
                Ok(())
            }
            KeyCode::Char('n') => {
                self.new_conversation();
                Ok(())
            }
            KeyCode::Char('x') => self.delete_conversation(),
            KeyCode::Char('r') => self.regenerate_last(surface),
            KeyCode::Char('h') | KeyCode::Char('?') => {
                self.overlay = Some(Overlay::Help);
                Ok(())
            }
            KeyCode::Char('/') => {
                self.open_search(None);
                Ok(())
            }
            KeyCode::Char('m') => {
                self.open_model_picker();
                Ok(())
            }
            KeyCode::Char('s') => {
                self.overlay = Some(Overlay::Stats);
                Ok(())
            }
            KeyCode::Char('a') => {
                self.overlay = Some(Overlay::FileAttach(LineEditor::new()));
                Ok(())
            }
            KeyCode::Char('c') => {
                self.detach_all();
                Ok(())
            }
            _ => Ok(()),
        };
        if let Err(err) = result {
            self.report(&err);
        }
        Flow::Continue
    }

    fn apply_overlay_result(&mut self, result: OverlayResult) {
        match result {
            OverlayResult::Dismissed => {}
            OverlayResult::Conversation(Some(index)) => {
                if self.store.switch_to(index) {
                    self.sync_from_store();
                    self.set_status(
                        format!("opened \"{}\"", self.store.current().title),
                        Tone::Dim,
                    );
                }
            }
            OverlayResult::Conversation(None) => self.set_status("search closed", Tone::Dim),
            OverlayResult::Model(Some(model)) => self.set_model(model),
            OverlayResult::Model(None) => self.set_status("model unchanged", Tone::Dim),
            OverlayResult::File(Some(path)) => self.stage_path(&path),
            OverlayResult::File(None) => self.set_status("nothing attached", Tone::Dim),
        }
    }

    /// Fold staged files into `text`, append the user turn and stream the reply.
    pub fn send_message(
        &mut self,
        text: &str,
        surface: &mut dyn RedrawSurface,
    ) -> Result<(), ChatError> {
        let text = text.trim();
        if text.is_empty() && self.staging.is_empty() {
            return Err(ChatError::InvalidOperation("nothing to send".to_string()));
        }
        let folded = self.staging.len();
        if folded > 0 {
            let names = self.staging.names();
            self.observer
                .record("attachments.folded", json!({ "count": folded, "names": names }));
        }
        let content = self.staging.fold_into(text);
        self.messages.push(Message {
            role: Role::User,
            content,
        });
        self.run_stream(surface)
    }

    /// Drop a trailing reply and ask again against the shorter history.
    pub fn regenerate_last(&mut self, surface: &mut dyn RedrawSurface) -> Result<(), ChatError> {
        if self.messages.len() < 2 {
            return Err(ChatError::InvalidOperation(
                "nothing to regenerate yet".to_string(),
            ));
        }
        let mut trimmed = self.messages.clone();
        if trimmed.last().map(|m| m.role) == Some(Role::Assistant) {
            trimmed.pop();
        }
        if trimmed.last().map(|m| m.role) != Some(Role::User) {
            return Err(ChatError::InvalidOperation(
                "the last message is not a question to answer".to_string(),
            ));
        }
        self.messages = trimmed;
        self.run_stream(surface)
    }

    fn run_stream(&mut self, surface: &mut dyn RedrawSurface) -> Result<(), ChatError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: self.messages.clone(),
        };
        self.unsaved_partial = None;
        self.history.reset();
        self.streaming = Some(String::new());
        self.set_status(format!("waiting for {}...", self.model), Tone::Dim);
        self.refresh_pane();
        self.viewport.end();
        let _ = self.render(surface);

        let transport = Arc::clone(&self.transport);
        let outcome = stream_reply(transport, request, |fragment| {
            if let Some(buffer) = self.streaming.as_mut() {
                buffer.push_str(fragment);
            }
            self.refresh_pane();
            self.viewport.end();
            self.status = ("receiving...".to_string(), Tone::Dim);
            let _ = self.render(surface);
        });
        self.streaming = None;

        match outcome {
            ReplyOutcome::Completed { text, fragments } => {
                let chars = text.chars().count();
                self.messages.push(Message::assistant(text));
                self.store.commit(self.messages.clone());
                self.note_persistence();
                self.observer.record(
                    "stream.completed",
                    json!({ "model": self.model, "fragments": fragments, "chars": chars }),
                );
                self.set_status(IDLE_STATUS, Tone::Dim);
                self.refresh_pane();
                Ok(())
            }
            ReplyOutcome::TransportFailed { reason, partial } => {
                self.store.commit(self.messages.clone());
                self.note_persistence();
                self.observer.record(
                    "stream.failed",
                    json!({
                        "model": self.model,
                        "reason": reason,
                        "partial_chars": partial.chars().count(),
                    }),
                );
                if !partial.is_empty() {
                    self.unsaved_partial = Some(partial);
                }
                self.refresh_pane();
                self.viewport.end();
                Err(ChatError::Transport(reason))
            }
        }
    }

    fn clear_conversation(&mut self) {
        self.store.clear_current();
        self.note_persistence();
        self.messages.clear();
        self.history.reset();
        self.unsaved_partial = None;
        self.refresh_pane();
        self.viewport.home();
        self.set_status("conversation cleared", Tone::Dim);
    }

    fn new_conversation(&mut self) {
        self.store.new_conversation();
        self.observer
            .record("conversation.created", json!({ "count": self.store.len() }));
        self.sync_from_store();
        self.set_status("started a new conversation", Tone::Dim);
    }

    fn delete_conversation(&mut self) -> Result<(), ChatError> {
        let title = self.store.current().title.clone();
        if !self.store.delete_current() {
            return Err(ChatError::InvalidOperation(
                "cannot delete the only conversation".to_string(),
            ));
        }
        self.observer.record(
            "conversation.deleted",
            json!({ "title": title, "remaining": self.store.len() }),
        );
        self.sync_from_store();
        self.set_status(format!("deleted \"{title}\""), Tone::Dim);
        Ok(())
    }

    fn switch_conversation(&mut self, delta: isize) {
        if self.store.switch_by(delta) {
            self.sync_from_store();
        }
    }

    /// Reload the message copy after the current conversation changed.
    fn sync_from_store(&mut self) {
        self.note_persistence();
        self.messages = self.store.current().messages.clone();
        self.history.reset();
        self.unsaved_partial = None;
        self.refresh_pane();
        self.viewport.home();
    }

    fn browse_older(&mut self) {
        let count = self.reply_count();
        if count == 0 {
            self.set_status("no replies to browse", Tone::Dim);
            return;
        }
        self.history.step_up(count);
        self.refresh_pane();
        self.viewport.home();
    }

    fn browse_newer(&mut self) {
        if self.history.is_live() {
            return;
        }
        self.history.step_down(self.reply_count());
        self.refresh_pane();
        if self.history.is_live() {
            self.viewport.end();
        } else {
            self.viewport.home();
        }
    }

    fn reply_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .count()
    }

    fn open_search(&mut self, query: Option<&str>) {
        self.overlay = Some(Overlay::Search(SearchOverlay::new(
            query,
            self.store.conversations(),
        )));
    }

    fn open_model_picker(&mut self) {
        let mut choices = self.model_choices.clone();
        if !choices.contains(&self.model) {
            choices.insert(0, self.model.clone());
        }
        self.overlay = Some(Overlay::ModelSelect(ModelPicker::new(choices, &self.model)));
    }

    fn set_model(&mut self, model: String) {
        if model == self.model {
            self.set_status(format!("already using {model}"), Tone::Dim);
            return;
        }
        self.observer
            .record("model.changed", json!({ "from": self.model, "to": model }));
        self.set_status(format!("model set to {model}"), Tone::Dim);
        self.model = model;
    }

    fn stage_path(&mut self, path: &Path) {
        let path = expand_home(path);
        match self.staging.stage(&path) {
            Ok(()) => {
                let status = match self.staging.items().last() {
                    Some(item) => format!(
                        "staged {} {} ({} waiting for the next message)",
                        if item.is_image() { "image" } else { "file" },
                        item.name,
                        self.staging.len()
                    ),
                    None => "nothing staged".to_string(),
                };
                self.set_status(status, Tone::Dim);
            }
            Err(err) => {
                self.observer.record(
                    "attachment.rejected",
                    json!({ "path": path.display().to_string(), "error": err.to_string() }),
                );
                self.report(&err);
            }
        }
    }

    fn detach_all(&mut self) {
        let dropped = self.staging.len();
        self.staging.clear();
        self.set_status(format!("dropped {dropped} staged file(s)"), Tone::Dim);
    }

    fn refresh_pane(&mut self) {
        let blocks = match (self.history.position(), self.history.select(&self.messages)) {
            (Some(_), Some((index, _))) => reply_blocks(&self.messages, index),
            _ => transcript_blocks(
                &self.messages,
                self.streaming.as_deref(),
                self.unsaved_partial.as_deref(),
            ),
        };
        self.viewport.follow_end(blocks);
    }

    /// Save failures only reach the log; the session keeps running from memory.
    fn note_persistence(&mut self) {
        if let Some(err) = self.store.take_persistence_error() {
            self.observer
                .record("persistence.failed", json!({ "error": err.to_string() }));
            self.observer.warn_log(&err.to_string());
        }
    }

    fn report(&mut self, err: &ChatError) {
        self.status = (self.errors.status_line(err), Tone::Error);
    }

    fn set_status(&mut self, text: impl Into<String>, tone: Tone) {
        self.status = (text.into(), tone);
    }
}

fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(home) = std::env::var_os("HOME")
    {
        return PathBuf::from(home).join(rest);
    }
    path.to_path_buf()
}
