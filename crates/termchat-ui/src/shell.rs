use crate::controller::{Flow, SessionController, SessionInput};
use crate::surface::RedrawSurface;
use crate::terminal::{TerminalGuard, TerminalSurface, install_panic_hook};
use anyhow::Result;
use crossterm::event::{self, Event, KeyEventKind};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(33);

/// Where session input comes from. `Ok(None)` means nothing arrived yet.
pub trait KeySource {
    fn next_input(&mut self) -> Result<Option<SessionInput>>;
}

/// Terminal events plus signal flags set by `signal-hook`.
pub struct CrosstermKeySource {
    interrupted: Arc<AtomicBool>,
}

impl CrosstermKeySource {
    pub fn new(interrupted: Arc<AtomicBool>) -> Self {
        Self { interrupted }
    }
}

impl KeySource for CrosstermKeySource {
    fn next_input(&mut self) -> Result<Option<SessionInput>> {
        if self.interrupted.swap(false, Ordering::SeqCst) {
            return Ok(Some(SessionInput::Interrupt));
        }
        let ready = match event::poll(POLL_INTERVAL) {
            Ok(ready) => ready,
            Err(_) => return Ok(Some(SessionInput::Eof)),
        };
        if !ready {
            return Ok(None);
        }
        let input = match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => SessionInput::Key(key),
            Ok(Event::Paste(text)) => SessionInput::Paste(text),
            Ok(Event::Resize(width, height)) => SessionInput::Resize(width, height),
            Ok(_) => return Ok(None),
            Err(_) => SessionInput::Eof,
        };
        Ok(Some(input))
    }
}

/// A fixed list of inputs; reports EOF once drained.
#[derive(Debug, Default)]
pub struct ScriptedKeys {
    queue: VecDeque<SessionInput>,
}

impl ScriptedKeys {
    pub fn new(inputs: impl IntoIterator<Item = SessionInput>) -> Self {
        Self {
            queue: inputs.into_iter().collect(),
        }
    }
}

impl KeySource for ScriptedKeys {
    fn next_input(&mut self) -> Result<Option<SessionInput>> {
        Ok(Some(self.queue.pop_front().unwrap_or(SessionInput::Eof)))
    }
}

/// Feed `source` into the session, repainting after every input, until it quits.
pub fn run_loop(
    ctrl: &mut SessionController,
    source: &mut dyn KeySource,
    surface: &mut dyn RedrawSurface,
) -> Result<()> {
    ctrl.render(surface)?;
    loop {
        let Some(input) = source.next_input()? else {
            continue;
        };
        if ctrl.handle(input, surface) == Flow::Quit {
            return Ok(());
        }
        ctrl.render(surface)?;
    }
}

/// Run the full-screen session on the alternate screen.
pub fn run_tui(ctrl: &mut SessionController) -> Result<()> {
    // Signals set a flag instead of killing the process mid-save.
    let interrupted = Arc::new(AtomicBool::new(false));
    #[cfg(unix)]
    {
        signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&interrupted))?;
        signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&interrupted))?;
    }
    install_panic_hook();

    let _guard = TerminalGuard::enter()?;
    let mut surface = TerminalSurface::new()?;
    let mut source = CrosstermKeySource::new(interrupted);
    run_loop(ctrl, &mut source, &mut surface)
}
