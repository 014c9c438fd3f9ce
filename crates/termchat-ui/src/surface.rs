use crate::viewport::{Tone, truncate_to_width};
use anyhow::Result;
use unicode_width::UnicodeWidthChar;

/// A fixed rectangle of character cells that the session paints into.
pub trait RedrawSurface {
    /// `(columns, rows)`.
    fn size(&self) -> (u16, u16);
    fn clear(&mut self);
    /// Write `text` starting at column `x` of row `y`, cut to `max_width`
    /// columns and to the edge of the surface.
    fn write_at(&mut self, x: u16, y: u16, text: &str, max_width: usize, tone: Tone);
    fn set_cursor(&mut self, pos: Option<(u16, u16)>);
    /// Push everything written since `clear` to the screen.
    fn refresh(&mut self) -> Result<()>;
}

/// An in-memory surface for tests and headless runs.
#[derive(Debug, Clone)]
pub struct MemorySurface {
    width: u16,
    height: u16,
    cells: Vec<Vec<Option<(char, Tone)>>>,
    cursor: Option<(u16, u16)>,
    refreshes: usize,
}

impl MemorySurface {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            cells: vec![vec![None; width as usize]; height as usize],
            cursor: None,
            refreshes: 0,
        }
    }

    pub fn resize(&mut self, width: u16, height: u16) {
        *self = Self {
            refreshes: self.refreshes,
            ..Self::new(width, height)
        };
    }

    /// Row text with trailing blanks removed.
    pub fn row(&self, y: u16) -> String {
        self.cells
            .get(y as usize)
            .map(|row| {
                row.iter()
                    .map(|cell| cell.map(|(ch, _)| ch).unwrap_or(' '))
                    .filter(|ch| *ch != '\0')
                    .collect::<String>()
                    .trim_end()
                    .to_string()
            })
            .unwrap_or_default()
    }

    pub fn rows(&self) -> Vec<String> {
        (0..self.height).map(|y| self.row(y)).collect()
    }

    pub fn text(&self) -> String {
        self.rows().join("\n")
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.rows().iter().any(|row| row.contains(needle))
    }

    pub fn tone_at(&self, x: u16, y: u16) -> Option<Tone> {
        self.cells
            .get(y as usize)?
            .get(x as usize)?
            .map(|(_, tone)| tone)
    }

    pub fn cursor(&self) -> Option<(u16, u16)> {
        self.cursor
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes
    }
}

impl RedrawSurface for MemorySurface {
    fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    fn clear(&mut self) {
        for row in &mut self.cells {
            row.iter_mut().for_each(|cell| *cell = None);
        }
        self.cursor = None;
    }

    fn write_at(&mut self, x: u16, y: u16, text: &str, max_width: usize, tone: Tone) {
        if x >= self.width || y >= self.height {
            return;
        }
        let room = (self.width - x) as usize;
        let row = &mut self.cells[y as usize];
        let mut col = x as usize;
        for ch in truncate_to_width(text, max_width.min(room)).chars() {
            let w = ch.width().unwrap_or(0);
            if w == 0 {
                continue;
            }
            row[col] = Some((ch, tone));
            for pad in 1..w {
                if let Some(cell) = row.get_mut(col + pad) {
                    *cell = Some(('\0', tone));
                }
            }
            col += w;
        }
    }

    fn set_cursor(&mut self, pos: Option<(u16, u16)>) {
        self.cursor = pos;
    }

    fn refresh(&mut self) -> Result<()> {
        self.refreshes += 1;
        Ok(())
    }
}
