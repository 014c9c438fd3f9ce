use crate::surface::RedrawSurface;
use crate::viewport::Tone;
use anyhow::Result;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::Widget;
use std::io::{self, Stdout};

/// RAII guard that restores the terminal on drop (including panics).
pub struct TerminalGuard;

impl TerminalGuard {
    pub fn enter() -> Result<Self> {
        enable_raw_mode()?;
        crossterm::execute!(
            io::stdout(),
            EnterAlternateScreen,
            crossterm::event::EnableBracketedPaste
        )?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = crossterm::execute!(
            io::stdout(),
            crossterm::event::DisableBracketedPaste,
            LeaveAlternateScreen,
            crossterm::cursor::Show
        );
        let _ = disable_raw_mode();
    }
}

/// Restore the terminal before the default panic message prints.
pub fn install_panic_hook() {
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = crossterm::execute!(io::stdout(), LeaveAlternateScreen, crossterm::cursor::Show);
        let _ = disable_raw_mode();
        prev_hook(info);
    }));
}

pub fn tone_style(tone: Tone) -> Style {
    match tone {
        Tone::Normal => Style::default(),
        Tone::User => Style::default().fg(Color::Cyan),
        Tone::Assistant => Style::default().fg(Color::White),
        Tone::Dim => Style::default().fg(Color::DarkGray),
        Tone::Accent => Style::default()
            .fg(Color::Blue)
            .add_modifier(Modifier::BOLD),
        Tone::Warning => Style::default().fg(Color::Yellow),
        Tone::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    }
}

/// Copies a prepared back buffer into the frame.
struct Prepared<'a>(&'a Buffer);

impl Widget for Prepared<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        for y in area.top()..area.bottom() {
            for x in area.left()..area.right() {
                if let (Some(src), Some(dst)) = (self.0.cell((x, y)), buf.cell_mut((x, y))) {
                    *dst = src.clone();
                }
            }
        }
    }
}

/// Full-screen surface on the alternate screen. Writes land in a back
/// buffer that `refresh` hands to ratatui, which diffs it against the
/// previous frame.
pub struct TerminalSurface {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    back: Buffer,
    cursor: Option<(u16, u16)>,
}

impl TerminalSurface {
    pub fn new() -> Result<Self> {
        let terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
        let (width, height) = crossterm::terminal::size()?;
        Ok(Self {
            terminal,
            back: Buffer::empty(Rect::new(0, 0, width, height)),
            cursor: None,
        })
    }
}

impl RedrawSurface for TerminalSurface {
    fn size(&self) -> (u16, u16) {
        (self.back.area.width, self.back.area.height)
    }

    fn clear(&mut self) {
        if let Ok((width, height)) = crossterm::terminal::size()
            && (width, height) != self.size()
        {
            self.back = Buffer::empty(Rect::new(0, 0, width, height));
        } else {
            self.back.reset();
        }
        self.cursor = None;
    }

    fn write_at(&mut self, x: u16, y: u16, text: &str, max_width: usize, tone: Tone) {
        let (width, height) = self.size();
        if x >= width || y >= height {
            return;
        }
        let room = (width - x) as usize;
        self.back
            .set_stringn(x, y, text, max_width.min(room), tone_style(tone));
    }

    fn set_cursor(&mut self, pos: Option<(u16, u16)>) {
        self.cursor = pos;
    }

    fn refresh(&mut self) -> Result<()> {
        let back = &self.back;
        let cursor = self.cursor;
        self.terminal.draw(|frame| {
            let area = frame.area().intersection(back.area);
            frame.render_widget(Prepared(back), area);
            if let Some(pos) = cursor {
                frame.set_cursor_position(pos);
            }
        })?;
        Ok(())
    }
}
