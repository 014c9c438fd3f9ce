//! Word wrapping and the scroll window over wrapped text.

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const TAB_WIDTH: usize = 4;

/// Color role of a line. Surfaces map tones to their own styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tone {
    #[default]
    Normal,
    User,
    Assistant,
    Dim,
    Accent,
    Warning,
    Error,
}

/// A run of text rendered in one tone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub text: String,
    pub tone: Tone,
}

impl Block {
    pub fn new(text: impl Into<String>, tone: Tone) -> Self {
        Self {
            text: text.into(),
            tone,
        }
    }
}

/// Wrap `text` to `width` display columns.
///
/// Paragraphs are split on `\n` and wrapped independently at whitespace.
/// Runs of whitespace between words collapse to one space, leading
/// indentation of a paragraph is kept on its first line, and words wider
/// than `width` are split. An empty or blank paragraph yields one empty line.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut out = Vec::new();
    for paragraph in text.split('\n') {
        wrap_paragraph(paragraph.trim_end_matches('\r'), width, &mut out);
    }
    out
}

fn wrap_paragraph(paragraph: &str, width: usize, out: &mut Vec<String>) {
    let expanded = paragraph.replace('\t', &" ".repeat(TAB_WIDTH));
    if expanded.trim().is_empty() {
        out.push(String::new());
        return;
    }

    let indent_len = expanded.len() - expanded.trim_start().len();
    let indent = &expanded[..indent_len];
    let (mut line, mut line_w) = if indent.width() < width {
        (indent.to_string(), indent.width())
    } else {
        (String::new(), 0)
    };
    let mut has_word = false;

    for word in expanded.split_whitespace() {
        let word_w = word.width();
        if has_word {
            if line_w + 1 + word_w <= width {
                line.push(' ');
                line.push_str(word);
                line_w += 1 + word_w;
                continue;
            }
            out.push(std::mem::take(&mut line));
            line_w = 0;
        }

        if line_w + word_w <= width {
            line.push_str(word);
            line_w += word_w;
            has_word = true;
            continue;
        }

        for ch in word.chars() {
            let ch_w = ch.width().unwrap_or(0);
            if line_w + ch_w > width && line_w > 0 {
                if line.trim().is_empty() {
                    line.clear();
                } else {
                    out.push(std::mem::take(&mut line));
                }
                line_w = 0;
            }
            line.push(ch);
            line_w += ch_w;
        }
        has_word = true;
    }

    if has_word {
        out.push(line);
    }
}

/// Cut `text` to at most `width` display columns.
pub fn truncate_to_width(text: &str, width: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let ch_w = ch.width().unwrap_or(0);
        if used + ch_w > width {
            break;
        }
        out.push(ch);
        used += ch_w;
    }
    out
}

/// A fixed-size window over wrapped, tone-tagged lines.
///
/// `offset` always stays within `[0, max(0, total_lines - height)]`.
#[derive(Debug, Clone)]
pub struct Viewport {
    width: usize,
    height: usize,
    page_overlap: usize,
    blocks: Vec<Block>,
    lines: Vec<String>,
    tones: Vec<Tone>,
    offset: usize,
}

impl Viewport {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width: width.max(1),
            height,
            page_overlap: 0,
            blocks: Vec::new(),
            lines: Vec::new(),
            tones: Vec::new(),
            offset: 0,
        }
    }

    /// Lines repeated between consecutive pages.
    pub fn with_page_overlap(mut self, overlap: usize) -> Self {
        self.page_overlap = overlap;
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn total_lines(&self) -> usize {
        self.lines.len()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn max_offset(&self) -> usize {
        self.lines.len().saturating_sub(self.height)
    }

    pub fn at_end(&self) -> bool {
        self.offset >= self.max_offset()
    }

    pub fn set_text(&mut self, text: &str) {
        self.set_blocks(vec![Block::new(text, Tone::Normal)]);
    }

    pub fn set_blocks(&mut self, blocks: Vec<Block>) {
        self.blocks = blocks;
        self.rewrap();
    }

    /// Replace the content, staying pinned to the bottom if the window was
    /// already there.
    pub fn follow_end(&mut self, blocks: Vec<Block>) {
        let pinned = self.at_end();
        self.set_blocks(blocks);
        if pinned {
            self.end();
        }
    }

    /// Change the window size, rewrapping the current content.
    pub fn resize(&mut self, width: usize, height: usize) {
        let width = width.max(1);
        if width == self.width && height == self.height {
            return;
        }
        let rewrap = width != self.width;
        self.width = width;
        self.height = height;
        if rewrap {
            self.rewrap();
        } else {
            self.clamp();
        }
    }

    fn rewrap(&mut self) {
        self.lines.clear();
        self.tones.clear();
        for block in &self.blocks {
            for line in wrap_text(&block.text, self.width) {
                self.lines.push(line);
                self.tones.push(block.tone);
            }
        }
        self.clamp();
    }

    fn clamp(&mut self) {
        self.offset = self.offset.min(self.max_offset());
    }

    fn page_step(&self) -> usize {
        self.height.saturating_sub(self.page_overlap).max(1)
    }

    pub fn line_up(&mut self) {
        self.offset = self.offset.saturating_sub(1);
    }

    pub fn line_down(&mut self) {
        self.offset = (self.offset + 1).min(self.max_offset());
    }

    pub fn page_up(&mut self) {
        self.offset = self.offset.saturating_sub(self.page_step());
    }

    pub fn page_down(&mut self) {
        self.offset = (self.offset + self.page_step()).min(self.max_offset());
    }

    pub fn home(&mut self) {
        self.offset = 0;
    }

    pub fn end(&mut self) {
        self.offset = self.max_offset();
    }

    /// Lines `[offset, offset + height)`, each cut to the window width.
    pub fn visible(&self) -> Vec<(String, Tone)> {
        self.lines
            .iter()
            .zip(self.tones.iter())
            .skip(self.offset)
            .take(self.height)
            .map(|(line, tone)| (truncate_to_width(line, self.width), *tone))
            .collect()
    }

    /// `"{start+1}-{end}/{total}"` when the content does not fit.
    pub fn indicator(&self) -> Option<String> {
        let total = self.lines.len();
        if total <= self.height {
            return None;
        }
        let end = (self.offset + self.height).min(total);
        Some(format!("{}-{}/{}", self.offset + 1, end, total))
    }
}
