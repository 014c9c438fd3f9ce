use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use termchat_core::{Conversation, Message, derive_title};
use termchat_errors::ChatError;

/// On-disk layout of the conversation file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Document {
    conversations: Vec<Conversation>,
    #[serde(default)]
    current_index: usize,
}

/// Owns every conversation. The list is never empty and `current` always
/// points at a valid entry. Every mutation rewrites the whole file.
#[derive(Debug)]
pub struct ConversationStore {
    path: Option<PathBuf>,
    conversations: Vec<Conversation>,
    current: usize,
    last_error: Option<ChatError>,
}

impl ConversationStore {
    /// Load from `path`. A missing, unreadable or malformed file yields a
    /// single empty conversation; the problem is not reported.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (conversations, current) = match read_document(&path) {
            Ok(doc) if !doc.conversations.is_empty() => {
                let current = doc.current_index.min(doc.conversations.len() - 1);
                (doc.conversations, current)
            }
            _ => (vec![Conversation::new()], 0),
        };
        Self {
            path: Some(path),
            conversations,
            current,
            last_error: None,
        }
    }

    /// A store that never touches the disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            conversations: vec![Conversation::new()],
            current: 0,
            last_error: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &Conversation {
        &self.conversations[self.current]
    }

    /// The most recent failed write, if it has not been taken yet.
    pub fn last_persistence_error(&self) -> Option<&ChatError> {
        self.last_error.as_ref()
    }

    pub fn take_persistence_error(&mut self) -> Option<ChatError> {
        self.last_error.take()
    }

    /// Insert an empty conversation at the top and make it current.
    pub fn new_conversation(&mut self) {
        self.conversations.insert(0, Conversation::new());
        self.current = 0;
        self.save();
    }

    /// Remove the current conversation. Refused when it is the only one.
    pub fn delete_current(&mut self) -> bool {
        if self.conversations.len() <= 1 {
            return false;
        }
        self.conversations.remove(self.current);
        self.current = self.current.min(self.conversations.len() - 1);
        self.save();
        true
    }

    /// Replace the current conversation's messages, derive its title the
    /// first time a user message is present, stamp the time, and save.
    pub fn commit(&mut self, messages: Vec<Message>) {
        let conversation = &mut self.conversations[self.current];
        if !conversation.has_derived_title()
            && let Some(title) = derive_title(&messages)
        {
            conversation.title = title;
        }
        conversation.messages = messages;
        conversation.last_updated = Utc::now();
        self.save();
    }

    /// Empty the current conversation's messages, keeping its title.
    pub fn clear_current(&mut self) {
        let conversation = &mut self.conversations[self.current];
        conversation.messages.clear();
        conversation.last_updated = Utc::now();
        self.save();
    }

    pub fn switch_to(&mut self, index: usize) -> bool {
        if index >= self.conversations.len() {
            return false;
        }
        if index != self.current {
            self.current = index;
            self.save();
        }
        true
    }

    /// Move the selection by `delta`, clamped to the list. Returns whether it moved.
    pub fn switch_by(&mut self, delta: isize) -> bool {
        let last = self.conversations.len() - 1;
        let target = self.current.saturating_add_signed(delta).min(last);
        if target == self.current {
            return false;
        }
        self.switch_to(target)
    }

    /// Write the whole list. Failures are recorded, never raised; the
    /// in-memory state stays authoritative.
    pub fn save(&mut self) {
        let Some(path) = &self.path else {
            return;
        };
        let doc = Document {
            conversations: self.conversations.clone(),
            current_index: self.current,
        };
        if let Err(err) = write_document(path, &doc) {
            self.last_error = Some(ChatError::Persistence(format!(
                "{}: {err}",
                path.display()
            )));
        }
    }
}

fn read_document(path: &Path) -> Result<Document> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Written to a sibling file and renamed so a crash never leaves half a document.
fn write_document(path: &Path, doc: &Document) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(doc)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
