pub mod attachments;
pub mod commands;
pub mod controller;
pub mod editor;
pub mod history;
pub mod overlay;
pub mod pipeline;
pub mod plain;
pub mod render;
pub mod search;
pub mod shell;
pub mod surface;
pub mod terminal;
pub mod viewport;

pub use attachments::{AttachmentStaging, FileKind, StagedAttachment};
pub use controller::{Flow, Mode, SessionController, SessionInput, SessionSettings};
pub use history::HistoryCursor;
pub use overlay::{Overlay, OverlayResult};
pub use pipeline::{ReplyOutcome, stream_reply};
pub use plain::PlainSession;
pub use search::{SearchHit, search};
pub use shell::{KeySource, ScriptedKeys, run_loop, run_tui};
pub use surface::{MemorySurface, RedrawSurface};
pub use terminal::TerminalSurface;
pub use viewport::{Block, Tone, Viewport, wrap_text};
