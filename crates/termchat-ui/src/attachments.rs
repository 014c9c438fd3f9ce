//! File classification/reading and the staging area for the next message.

use base64::Engine;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use termchat_core::{ContentPart, MessageContent};
use termchat_errors::ChatError;

const MAX_TEXT_BYTES: u64 = 1024 * 1024;
const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;
const SNIFF_BYTES: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Text,
    Image(&'static str),
    Unsupported,
}

fn image_mime(ext: &str) -> Option<&'static str> {
    match ext {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

fn is_text_extension(ext: &str) -> bool {
    matches!(
        ext,
        "txt"
            | "md"
            | "log"
            | "rs"
            | "toml"
            | "json"
            | "yaml"
            | "yml"
            | "csv"
            | "js"
            | "ts"
            | "tsx"
            | "jsx"
            | "py"
            | "go"
            | "java"
            | "c"
            | "h"
            | "cpp"
            | "hpp"
            | "cs"
            | "sh"
            | "html"
            | "css"
            | "xml"
            | "ini"
            | "cfg"
            | "sql"
    )
}

fn is_binary(bytes: &[u8]) -> bool {
    bytes.contains(&0)
}

/// Valid UTF-8 apart from a code point cut off at the end of the sample.
fn is_utf8_prefix(bytes: &[u8]) -> bool {
    match std::str::from_utf8(bytes) {
        Ok(_) => true,
        Err(err) => err.error_len().is_none(),
    }
}

/// Classify by extension, falling back to a look at the first bytes.
pub fn classify(path: &Path) -> Result<FileKind, ChatError> {
    let meta = fs::metadata(path)
        .map_err(|e| ChatError::Attachment(format!("{}: {e}", path.display())))?;
    if !meta.is_file() {
        return Err(ChatError::Attachment(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if let Some(mime) = image_mime(&ext) {
        return Ok(FileKind::Image(mime));
    }
    if is_text_extension(&ext) {
        return Ok(FileKind::Text);
    }

    check_size(path, MAX_TEXT_BYTES)?;
    let mut sample = Vec::with_capacity(SNIFF_BYTES);
    File::open(path)
        .and_then(|file| file.take(SNIFF_BYTES as u64).read_to_end(&mut sample))
        .map_err(|e| ChatError::Attachment(format!("{}: {e}", path.display())))?;
    if is_binary(&sample) || !is_utf8_prefix(&sample) {
        return Ok(FileKind::Unsupported);
    }
    Ok(FileKind::Text)
}

pub fn read_text(path: &Path) -> Result<String, ChatError> {
    check_size(path, MAX_TEXT_BYTES)?;
    let bytes =
        fs::read(path).map_err(|e| ChatError::Attachment(format!("{}: {e}", path.display())))?;
    String::from_utf8(bytes)
        .map_err(|_| ChatError::Attachment(format!("{} is not valid UTF-8", path.display())))
}

pub fn read_binary_base64(path: &Path) -> Result<String, ChatError> {
    check_size(path, MAX_IMAGE_BYTES)?;
    let bytes =
        fs::read(path).map_err(|e| ChatError::Attachment(format!("{}: {e}", path.display())))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

fn check_size(path: &Path, limit: u64) -> Result<(), ChatError> {
    let len = fs::metadata(path)
        .map_err(|e| ChatError::Attachment(format!("{}: {e}", path.display())))?
        .len();
    if len > limit {
        return Err(ChatError::Attachment(format!(
            "{} is too large ({len} bytes, limit {limit})",
            path.display()
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagedPayload {
    Text(String),
    Image { mime_type: String, base64: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedAttachment {
    pub name: String,
    pub payload: StagedPayload,
}

impl StagedAttachment {
    pub fn is_image(&self) -> bool {
        matches!(self.payload, StagedPayload::Image { .. })
    }
}

/// Files queued for the next outgoing message.
#[derive(Debug, Clone, Default)]
pub struct AttachmentStaging {
    items: Vec<StagedAttachment>,
}

impl AttachmentStaging {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[StagedAttachment] {
        &self.items
    }

    pub fn names(&self) -> Vec<String> {
        self.items.iter().map(|item| item.name.clone()).collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Read and queue `path`. On failure nothing is staged.
    pub fn stage(&mut self, path: &Path) -> Result<(), ChatError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let payload = match classify(path)? {
            FileKind::Text => StagedPayload::Text(read_text(path)?),
            FileKind::Image(mime) => StagedPayload::Image {
                mime_type: mime.to_string(),
                base64: read_binary_base64(path)?,
            },
            FileKind::Unsupported => {
                return Err(ChatError::Attachment(format!(
                    "{name}: unsupported file type"
                )));
            }
        };
        self.items.push(StagedAttachment { name, payload });
        Ok(())
    }

    /// Build the outgoing user content from `user_text` and everything staged,
    /// then empty the staging area.
    ///
    /// Text files become delimited blocks ahead of the text, in staging
    /// order. Any staged image turns the message into text + image parts.
    pub fn fold_into(&mut self, user_text: &str) -> MessageContent {
        let mut text = String::new();
        let mut images = Vec::new();
        for item in self.items.drain(..) {
            match item.payload {
                StagedPayload::Text(content) => {
                    text.push_str(&format!(
                        "--- file: {name} ---\n{content}\n--- end of {name} ---\n",
                        name = item.name
                    ));
                }
                StagedPayload::Image { mime_type, base64 } => {
                    images.push(ContentPart::image(mime_type, base64));
                }
            }
        }
        text.push_str(user_text);

        if images.is_empty() {
            return MessageContent::Text(text);
        }
        let mut parts = vec![ContentPart::text(text)];
        parts.extend(images);
        MessageContent::Parts(parts)
    }
}
