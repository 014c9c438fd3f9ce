//! Screen layout and painting. Everything here reads controller state and
//! writes to a [`RedrawSurface`]; nothing mutates the session.

use crate::controller::{Mode, SessionController};
use crate::editor::LineEditor;
use crate::overlay::Overlay;
use crate::search::HitSource;
use crate::surface::RedrawSurface;
use crate::viewport::{Block, Tone, truncate_to_width};
use anyhow::Result;
use termchat_core::{Message, Role};
use unicode_width::UnicodeWidthStr;

pub const WELCOME: &str = "No messages yet. Type below and press Enter to send.";
pub const UNSAVED_LABEL: &str = "[reply interrupted, partial text not saved]";

const HELP_LINES: &[&str] = &[
    "Input mode",
    "  Enter             send the message",
    "  /nav              switch to navigation mode",
    "  /new  /delete     new or delete conversation",
    "  /clear            clear this conversation",
    "  /search [text]    search conversations",
    "  /model [name]     choose the model",
    "  /attach [path]    stage a file (/detach drops staged files)",
    "  /stats  /regen    statistics, regenerate the last reply",
    "  /quit             exit (also Ctrl+C or Ctrl+D)",
    "",
    "Navigation mode",
    "  j k  u d  g G     scroll by line, page, top and bottom",
    "  Left Right  [ ]   browse earlier replies",
    "  Up Down           previous or next conversation",
    "  n  x  r           new, delete, regenerate",
    "  /  m  s  a  c     search, model, stats, attach, drop staged",
    "  h  ?              toggle this help",
    "  Esc  q            back to typing, quit",
];

const NAV_HINT: &str = "NAV  j/k scroll  [ ] replies  Up/Down chats  / search  h help  Esc type";

/// Row assignment for a `width x height` screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub width: u16,
    pub height: u16,
    pub pane_top: u16,
    pub pane_height: u16,
    pub info_row: u16,
    pub status_row: u16,
    pub input_row: u16,
}

impl Layout {
    pub fn compute(width: u16, height: u16) -> Self {
        let pane_height = height.saturating_sub(4);
        Self {
            width,
            height,
            pane_top: 1,
            pane_height,
            info_row: 1 + pane_height,
            status_row: 2 + pane_height,
            input_row: 3 + pane_height,
        }
    }
}

fn user_display(message: &Message) -> String {
    let text = message.content.text();
    match message.content.image_count() {
        0 => text,
        1 => format!("{text} [1 image attached]"),
        n => format!("{text} [{n} images attached]"),
    }
}

/// The live view: every message, oldest first, then the reply being
/// streamed or the partial text of a failed one.
pub fn transcript_blocks(
    messages: &[Message],
    pending: Option<&str>,
    unsaved: Option<&str>,
) -> Vec<Block> {
    if messages.is_empty() && pending.is_none() && unsaved.is_none() {
        return vec![Block::new(WELCOME, Tone::Dim)];
    }
    let mut blocks = Vec::new();
    for message in messages {
        if !blocks.is_empty() {
            blocks.push(Block::new("", Tone::Normal));
        }
        blocks.push(match message.role {
            Role::User => Block::new(format!("You: {}", user_display(message)), Tone::User),
            Role::Assistant => Block::new(format!("AI: {}", message.text_content()), Tone::Assistant),
        });
    }
    if let Some(text) = pending {
        blocks.push(Block::new("", Tone::Normal));
        blocks.push(Block::new(format!("AI: {text}"), Tone::Assistant));
    }
    if let Some(text) = unsaved {
        blocks.push(Block::new("", Tone::Normal));
        blocks.push(Block::new(format!("AI: {text}"), Tone::Dim));
        blocks.push(Block::new(UNSAVED_LABEL, Tone::Warning));
    }
    blocks
}

/// One browsed reply with the prompt that produced it.
pub fn reply_blocks(messages: &[Message], reply_index: usize) -> Vec<Block> {
    let total = messages.iter().filter(|m| m.role == Role::Assistant).count();
    let mut prompt = None;
    let mut seen = 0;
    for message in messages {
        match message.role {
            Role::User => prompt = Some(message),
            Role::Assistant if seen == reply_index => {
                let mut blocks = vec![Block::new(
                    format!("reply {}/{}", reply_index + 1, total),
                    Tone::Accent,
                )];
                if let Some(prompt) = prompt {
                    blocks.push(Block::new(format!("You: {}", user_display(prompt)), Tone::Dim));
                }
                blocks.push(Block::new("", Tone::Normal));
                blocks.push(Block::new(format!("AI: {}", message.text_content()), Tone::Assistant));
                return blocks;
            }
            Role::Assistant => seen += 1,
        }
    }
    vec![Block::new(WELCOME, Tone::Dim)]
}

/// Slice of `editor` that fits in `room` columns with the cursor visible,
/// and the cursor column inside that slice.
fn input_window(editor: &LineEditor, room: usize) -> (String, usize) {
    let chars: Vec<char> = editor.text().chars().collect();
    let cursor = editor.cursor().min(chars.len());
    let mut start = 0;
    let width_of = |from: usize, to: usize| chars[from..to].iter().collect::<String>().width();
    while start < cursor && width_of(start, cursor) >= room.max(1) {
        start += 1;
    }
    let shown: String = chars[start..].iter().collect();
    (truncate_to_width(&shown, room), width_of(start, cursor))
}

pub fn draw(ctrl: &SessionController, surface: &mut dyn RedrawSurface) -> Result<()> {
    // Clearing may pick up a new terminal size.
    surface.clear();
    let (width, height) = surface.size();
    let layout = Layout::compute(width, height);
    let full = width as usize;

    draw_header(ctrl, surface, &layout);

    for (i, (line, tone)) in ctrl.viewport().visible().into_iter().enumerate() {
        surface.write_at(0, layout.pane_top + i as u16, &line, full, tone);
    }

    let mut info = String::new();
    if let Some(pos) = ctrl.history().position() {
        let total = ctrl.messages().iter().filter(|m| m.role == Role::Assistant).count();
        info.push_str(&format!("browsing reply {}/{}", pos + 1, total));
    }
    if !ctrl.staging().is_empty() {
        if !info.is_empty() {
            info.push_str("  ");
        }
        info.push_str(&format!("staged: {}", ctrl.staging().names().join(", ")));
    }
    let indicator = ctrl.viewport().indicator().unwrap_or_default();
    let indicator_w = indicator.width();
    surface.write_at(0, layout.info_row, &info, full.saturating_sub(indicator_w + 1), Tone::Dim);
    if !indicator.is_empty() {
        surface.write_at(
            width.saturating_sub(indicator_w as u16),
            layout.info_row,
            &indicator,
            indicator_w,
            Tone::Dim,
        );
    }

    let (status, tone) = ctrl.status();
    surface.write_at(0, layout.status_row, status, full, tone);

    match ctrl.mode() {
        Mode::Input => {
            let prompt = "> ";
            let room = full.saturating_sub(prompt.len() + 1);
            let (shown, cursor_col) = input_window(ctrl.editor(), room);
            surface.write_at(0, layout.input_row, prompt, full, Tone::Accent);
            surface.write_at(prompt.len() as u16, layout.input_row, &shown, room, Tone::Normal);
            if !ctrl.is_streaming() {
                surface.set_cursor(Some((
                    (prompt.len() + cursor_col) as u16,
                    layout.input_row,
                )));
            }
        }
        Mode::Nav => {
            surface.write_at(0, layout.input_row, NAV_HINT, full, Tone::Dim);
        }
    }

    if let Some(overlay) = ctrl.overlay() {
        draw_overlay(ctrl, overlay, surface, &layout);
    }

    surface.refresh()
}

fn draw_header(ctrl: &SessionController, surface: &mut dyn RedrawSurface, layout: &Layout) {
    let store = ctrl.store();
    let mode = match ctrl.mode() {
        Mode::Input => "INPUT",
        Mode::Nav => "NAV",
    };
    let left = format!(
        " termchat | {} [{}/{}] | {}",
        store.current().title,
        store.current_index() + 1,
        store.len(),
        ctrl.model()
    );
    let mode_w = mode.width() + 1;
    surface.write_at(
        0,
        0,
        &left,
        (layout.width as usize).saturating_sub(mode_w + 1),
        Tone::Accent,
    );
    surface.write_at(layout.width.saturating_sub(mode_w as u16), 0, mode, mode_w, Tone::Accent);
}

/// Body rows of an overlay box, plus the body row and column (before
/// clipping) where a text cursor belongs, if any.
type OverlayBody = (Vec<(String, Tone)>, Option<(usize, usize)>);

/// Newlines and tabs become spaces so a snippet fits on one row.
fn one_line(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect()
}

fn overlay_body(ctrl: &SessionController, overlay: &Overlay, rows: usize) -> OverlayBody {
    match overlay {
        Overlay::Help => (
            HELP_LINES
                .iter()
                .map(|line| (line.to_string(), Tone::Normal))
                .collect(),
            None,
        ),
        Overlay::Stats => (stats_lines(ctrl), None),
        Overlay::Search(state) => {
            let label = "find: ";
            let mut lines = vec![(format!("{label}{}", state.query.text()), Tone::Accent)];
            if state.query.text().is_empty() {
                lines.push(("type to search titles and messages".to_string(), Tone::Dim));
            } else if state.hits.is_empty() {
                lines.push(("no matches".to_string(), Tone::Dim));
            } else {
                let room = rows.saturating_sub(1).max(1);
                let start = (state.selected + 1).saturating_sub(room);
                for (i, hit) in state.hits.iter().enumerate().skip(start).take(room) {
                    let marker = if i == state.selected { "> " } else { "  " };
                    let text = match hit.source {
                        HitSource::Title => format!("{marker}{}", hit.title),
                        HitSource::Message(_) => {
                            format!("{marker}{} | {}", hit.title, one_line(&hit.snippet))
                        }
                    };
                    let tone = if i == state.selected { Tone::Accent } else { Tone::Normal };
                    lines.push((text, tone));
                }
            }
            let col = label.width() + prefix_width(&state.query);
            (lines, Some((0, col)))
        }
        Overlay::ModelSelect(picker) => {
            let lines = picker
                .choices
                .iter()
                .enumerate()
                .map(|(i, model)| {
                    let marker = if i == picker.selected { "> " } else { "  " };
                    let current = if model == ctrl.model() { "  (current)" } else { "" };
                    let tone = if i == picker.selected { Tone::Accent } else { Tone::Normal };
                    (format!("{marker}{}. {model}{current}", i + 1), tone)
                })
                .collect();
            (lines, None)
        }
        Overlay::FileAttach(editor) => {
            let label = "path: ";
            let mut lines = vec![(format!("{label}{}", editor.text()), Tone::Accent)];
            if !ctrl.staging().is_empty() {
                lines.push((
                    format!("staged: {}", ctrl.staging().names().join(", ")),
                    Tone::Dim,
                ));
            }
            lines.push(("Enter to stage, Esc to cancel".to_string(), Tone::Dim));
            let col = label.width() + prefix_width(editor);
            (lines, Some((0, col)))
        }
    }
}

fn prefix_width(editor: &LineEditor) -> usize {
    editor
        .text()
        .chars()
        .take(editor.cursor())
        .collect::<String>()
        .width()
}

fn draw_overlay(
    ctrl: &SessionController,
    overlay: &Overlay,
    surface: &mut dyn RedrawSurface,
    layout: &Layout,
) {
    let (width, height) = (layout.width as usize, layout.height as usize);
    if width < 8 || height < 3 {
        return;
    }
    let box_w = width.saturating_sub(4).clamp(8, 76);
    let max_rows = height.saturating_sub(4).max(1);
    let (lines, cursor) = overlay_body(ctrl, overlay, max_rows);
    let rows = lines.len().clamp(1, max_rows);
    let box_h = rows + 2;
    let x0 = ((width - box_w) / 2) as u16;
    let y0 = (height.saturating_sub(box_h) / 2) as u16;
    let inner = box_w - 4;

    let title = truncate_to_width(&format!(" {} ", overlay.name()), box_w.saturating_sub(4));
    let top = format!(
        "┌─{title}{}┐",
        "─".repeat(box_w.saturating_sub(3 + title.width()))
    );
    surface.write_at(x0, y0, &top, box_w, Tone::Accent);
    for row in 0..rows {
        let y = y0 + 1 + row as u16;
        surface.write_at(x0, y, &format!("│{}│", " ".repeat(box_w - 2)), box_w, Tone::Accent);
        if let Some((text, tone)) = lines.get(row) {
            surface.write_at(x0 + 2, y, text, inner, *tone);
        }
    }
    let bottom = format!("└{}┘", "─".repeat(box_w - 2));
    surface.write_at(x0, y0 + 1 + rows as u16, &bottom, box_w, Tone::Accent);

    if let Some((row, col)) = cursor {
        surface.set_cursor(Some((
            x0 + 2 + col.min(inner) as u16,
            y0 + 1 + row as u16,
        )));
    } else {
        surface.set_cursor(None);
    }
}

fn stats_lines(ctrl: &SessionController) -> Vec<(String, Tone)> {
    let store = ctrl.store();
    let conversation = store.current();
    let messages = ctrl.messages();
    let users = messages.iter().filter(|m| m.role == Role::User).count();
    let replies = messages.len() - users;
    let chars: usize = messages.iter().map(|m| m.text_content().chars().count()).sum();
    let images: usize = messages.iter().map(|m| m.content.image_count()).sum();
    let everywhere: usize = store.conversations().iter().map(|c| c.messages.len()).sum();
    let location = store
        .path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "in memory only".to_string());
    let updated = conversation
        .last_updated
        .with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M");
    [
        format!("title:          {}", conversation.title),
        format!("messages:       {} ({users} yours, {replies} replies)", messages.len()),
        format!("characters:     {chars}"),
        format!("images:         {images}"),
        format!("last updated:   {updated}"),
        String::new(),
        format!(
            "conversations:  {} ({everywhere} messages in all)",
            store.len()
        ),
        format!("model:          {}", ctrl.model()),
        format!("staged files:   {}", ctrl.staging().len()),
        format!("saved to:       {location}"),
    ]
    .into_iter()
    .map(|line| (line, Tone::Normal))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use termchat_core::{ContentPart, MessageContent};

    #[test]
    fn layout_reserves_header_and_three_bottom_rows() {
        let layout = Layout::compute(80, 24);
        assert_eq!(layout.pane_top, 1);
        assert_eq!(layout.pane_height, 20);
        assert_eq!(layout.info_row, 21);
        assert_eq!(layout.status_row, 22);
        assert_eq!(layout.input_row, 23);
        assert_eq!(Layout::compute(80, 3).pane_height, 0);
    }

    #[test]
    fn empty_transcript_shows_welcome() {
        assert_eq!(
            transcript_blocks(&[], None, None),
            vec![Block::new(WELCOME, Tone::Dim)]
        );
    }

    #[test]
    fn transcript_labels_roles_and_unsaved_partial() {
        let messages = vec![Message::user("hi"), Message::assistant("hello")];
        let blocks = transcript_blocks(&messages, None, Some("half"));
        let texts: Vec<&str> = blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["You: hi", "", "AI: hello", "", "AI: half", UNSAVED_LABEL]
        );
        assert_eq!(blocks.last().map(|b| b.tone), Some(Tone::Warning));
    }

    #[test]
    fn images_are_noted_on_user_lines() {
        let message = Message {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::text("look"),
                ContentPart::image("image/png", "AAAA"),
            ]),
        };
        let blocks = transcript_blocks(&[message], Some("it is"), None);
        assert_eq!(blocks[0].text, "You: look [1 image attached]");
        assert_eq!(blocks[2].text, "AI: it is");
    }

    #[test]
    fn reply_view_pairs_reply_with_its_prompt() {
        let messages = vec![
            Message::user("one"),
            Message::assistant("first"),
            Message::user("two"),
            Message::assistant("second"),
        ];
        let blocks = reply_blocks(&messages, 0);
        assert_eq!(blocks[0].text, "reply 1/2");
        assert_eq!(blocks[1].text, "You: one");
        assert_eq!(blocks[3].text, "AI: first");
    }

    #[test]
    fn input_window_scrolls_to_keep_cursor_visible() {
        let mut editor = LineEditor::new();
        editor.set("abcdefghij");
        let (shown, col) = input_window(&editor, 5);
        assert_eq!(col, 4);
        assert_eq!(shown, "ghij");
        editor.set("abc");
        assert_eq!(input_window(&editor, 5), ("abc".to_string(), 3));
    }
}
