pub mod form_field;
pub mod terminal_guard;
pub mod wizard_screen;

pub use terminal_guard::{install_panic_hook, TerminalGuard};
pub use wizard_screen::{ScreenAction, WizardScreen};

use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// A rect of the given percentage size centered in `r`
pub fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
