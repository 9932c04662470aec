//! Raw-mode terminal session that restores the terminal when dropped

use anyhow::Result;
use crossterm::{
    cursor::Show,
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, Stdout, Write};
use std::sync::atomic::{AtomicBool, Ordering};

pub type WizardTerminal = Terminal<CrosstermBackend<Stdout>>;

/// Owns raw mode and the alternate screen for the lifetime of the wizard.
///
/// Restoration runs on drop, so `?` returns and panics (with
/// `install_panic_hook`) leave a usable shell behind.
pub struct TerminalGuard {
    active: AtomicBool,
}

impl TerminalGuard {
    /// Enter raw mode and the alternate screen, returning the guard and a terminal
    pub fn enter() -> Result<(Self, WizardTerminal)> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen)?;
        let guard = Self {
            active: AtomicBool::new(true),
        };
        let terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
        Ok((guard, terminal))
    }

    /// Best-effort restore; safe to call more than once
    pub fn restore() {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, Show);
        let _ = io::stdout().flush();
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if self.active.swap(false, Ordering::SeqCst) {
            Self::restore();
        }
    }
}

/// Restore the terminal before the default hook prints the panic
pub fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        TerminalGuard::restore();
        previous(info);
    }));
}
