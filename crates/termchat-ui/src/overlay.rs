//! Modal sub-states. At most one is open at a time; the controller holds
//! an `Option<Overlay>`.

use crate::editor::{EditOutcome, LineEditor};
use crate::search::{SearchHit, search};
use crossterm::event::{KeyCode, KeyEvent};
use std::path::PathBuf;
use termchat_core::Conversation;

#[derive(Debug, Clone)]
pub enum Overlay {
    Search(SearchOverlay),
    ModelSelect(ModelPicker),
    Stats,
    FileAttach(LineEditor),
    Help,
}

/// How an overlay finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayResult {
    /// Stats and Help carry no result.
    Dismissed,
    Conversation(Option<usize>),
    Model(Option<String>),
    File(Option<PathBuf>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayOutcome {
    /// Key consumed, overlay stays open.
    Stay,
    /// Key consumed, overlay closed.
    Resolved(OverlayResult),
    /// Overlay closed; the key still needs normal handling.
    PassThrough,
}

impl Overlay {
    pub fn name(&self) -> &'static str {
        match self {
            Overlay::Search(_) => "search",
            Overlay::ModelSelect(_) => "model",
            Overlay::Stats => "stats",
            Overlay::FileAttach(_) => "attach",
            Overlay::Help => "help",
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent, conversations: &[Conversation]) -> OverlayOutcome {
        match self {
            Overlay::Search(state) => state.handle_key(key, conversations),
            Overlay::ModelSelect(picker) => picker.handle_key(key),
            Overlay::Stats => OverlayOutcome::Resolved(OverlayResult::Dismissed),
            Overlay::FileAttach(editor) => match key.code {
                KeyCode::Esc => OverlayOutcome::Resolved(OverlayResult::File(None)),
                _ => match editor.handle_key(key) {
                    EditOutcome::Submitted(path) => {
                        let path = path.trim();
                        let chosen = (!path.is_empty()).then(|| PathBuf::from(path));
                        OverlayOutcome::Resolved(OverlayResult::File(chosen))
                    }
                    EditOutcome::Eof => OverlayOutcome::Resolved(OverlayResult::File(None)),
                    _ => OverlayOutcome::Stay,
                },
            },
            Overlay::Help => match key.code {
                KeyCode::Esc => OverlayOutcome::Resolved(OverlayResult::Dismissed),
                _ => OverlayOutcome::PassThrough,
            },
        }
    }
}

/// Incremental search: results are recomputed on every edit.
#[derive(Debug, Clone, Default)]
pub struct SearchOverlay {
    pub query: LineEditor,
    pub hits: Vec<SearchHit>,
    pub selected: usize,
}

impl SearchOverlay {
    pub fn new(initial: Option<&str>, conversations: &[Conversation]) -> Self {
        let mut state = Self::default();
        if let Some(text) = initial {
            state.query.set(text);
            state.refresh(conversations);
        }
        state
    }

    fn refresh(&mut self, conversations: &[Conversation]) {
        self.hits = search(self.query.text(), conversations);
        self.selected = self.selected.min(self.hits.len().saturating_sub(1));
    }

    fn handle_key(&mut self, key: KeyEvent, conversations: &[Conversation]) -> OverlayOutcome {
        match key.code {
            KeyCode::Esc => OverlayOutcome::Resolved(OverlayResult::Conversation(None)),
            KeyCode::Up => {
                self.selected = self.selected.saturating_sub(1);
                OverlayOutcome::Stay
            }
            KeyCode::Down => {
                if self.selected + 1 < self.hits.len() {
                    self.selected += 1;
                }
                OverlayOutcome::Stay
            }
            KeyCode::Enter => {
                let chosen = self.hits.get(self.selected).map(|hit| hit.index);
                OverlayOutcome::Resolved(OverlayResult::Conversation(chosen))
            }
            _ => {
                if self.query.handle_key(key) == EditOutcome::Edited {
                    self.refresh(conversations);
                }
                OverlayOutcome::Stay
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelPicker {
    pub choices: Vec<String>,
    pub selected: usize,
}

impl ModelPicker {
    /// Starts on `current` when it is one of the choices.
    pub fn new(choices: Vec<String>, current: &str) -> Self {
        let selected = choices.iter().position(|c| c == current).unwrap_or(0);
        Self { choices, selected }
    }

    pub fn up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn down(&mut self) {
        self.selected = (self.selected + 1).min(self.choices.len().saturating_sub(1));
    }

    pub fn confirm(&self) -> Option<String> {
        self.choices.get(self.selected).cloned()
    }

    fn handle_key(&mut self, key: KeyEvent) -> OverlayOutcome {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.up();
                OverlayOutcome::Stay
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.down();
                OverlayOutcome::Stay
            }
            KeyCode::Enter => OverlayOutcome::Resolved(OverlayResult::Model(self.confirm())),
            KeyCode::Esc | KeyCode::Char('q') => {
                OverlayOutcome::Resolved(OverlayResult::Model(None))
            }
            KeyCode::Char(ch @ '1'..='9') => {
                let idx = (ch as usize) - ('1' as usize);
                match self.choices.get(idx) {
                    Some(model) => {
                        OverlayOutcome::Resolved(OverlayResult::Model(Some(model.clone())))
                    }
                    None => OverlayOutcome::Stay,
                }
            }
            _ => OverlayOutcome::Stay,
        }
    }
}
