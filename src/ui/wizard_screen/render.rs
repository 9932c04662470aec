//! Wizard screen rendering

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Gauge, Paragraph, Wrap},
    Frame,
};

use super::WizardScreen;
use crate::availability::AvailabilityStatus;
use crate::form::{Field, FormData, StepKind};
use crate::ui::centered_rect;
use crate::ui::form_field::FormField;
use crate::validation::{PasswordStrength, StrengthLabel};
use crate::wizard::Wizard;

fn is_optional(field: Field) -> bool {
    matches!(field, Field::PhoneNumber | Field::Newsletter)
}

fn strength_color(label: StrengthLabel) -> Color {
    match label {
        StrengthLabel::Weak => Color::Red,
        StrengthLabel::Fair => Color::Yellow,
        StrengthLabel::Good => Color::LightGreen,
        StrengthLabel::Strong => Color::Green,
    }
}

impl WizardScreen {
    pub fn render(&mut self, frame: &mut Frame, wizard: &Wizard) {
        let area = centered_rect(80, 90, frame.area());
        frame.render_widget(Clear, area);

        let block = Block::default()
            .title(Line::from(vec![
                Span::raw(" "),
                Span::styled(
                    "Create your account",
                    Style::default()
                        .fg(Color::LightCyan)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::raw(" "),
            ]))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let banner_height = u16::from(wizard.alert().is_some() || self.notice.is_some()) * 2;
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(1),             // Step trail
                Constraint::Length(1),             // Progress
                Constraint::Length(1),             // Spacer
                Constraint::Length(banner_height), // Alert / notice
                Constraint::Length(2),             // Step title + description
                Constraint::Min(5),                // Body
                Constraint::Length(1),             // Footer
            ])
            .split(inner);

        self.render_trail(frame, chunks[0], wizard);
        self.render_progress(frame, chunks[1], wizard);
        self.render_banner(frame, chunks[3], wizard);

        let heading = vec![
            Line::from(Span::styled(
                self.step.title(),
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(
                self.step.description(),
                Style::default().fg(Color::DarkGray),
            )),
        ];
        frame.render_widget(Paragraph::new(heading), chunks[4]);

        if self.step == StepKind::Review {
            self.render_review(frame, chunks[5], &wizard.form_data());
        } else {
            self.render_fields(frame, chunks[5], wizard);
        }
        self.render_footer(frame, chunks[6]);
    }

    fn render_trail(&self, frame: &mut Frame, area: Rect, wizard: &Wizard) {
        let mut spans = Vec::new();
        for (i, state) in wizard.steps().iter().enumerate() {
            if i > 0 {
                spans.push(Span::styled(" › ", Style::default().fg(Color::DarkGray)));
            }
            let marker = if state.completed {
                "✓".to_string()
            } else {
                (i + 1).to_string()
            };
            let style = if state.kind == wizard.current_step() {
                let color = if state.has_errors() { Color::Red } else { Color::Cyan };
                Style::default().fg(color).add_modifier(Modifier::BOLD)
            } else if state.completed {
                Style::default().fg(Color::Green)
            } else if state.has_errors() {
                Style::default().fg(Color::Red)
            } else {
                Style::default().fg(Color::Gray)
            };
            spans.push(Span::styled(format!("{marker} {}", state.kind), style));
        }
        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn render_progress(&self, frame: &mut Frame, area: Rect, wizard: &Wizard) {
        let progress = wizard.progress();
        let gauge = Gauge::default()
            .gauge_style(Style::default().fg(Color::Cyan).bg(Color::Black))
            .percent(progress.percent())
            .label(format!(
                "Step {} of {} · {}% complete",
                wizard.current_step().index() + 1,
                StepKind::all().len(),
                progress.percent()
            ));
        frame.render_widget(gauge, area);
    }

    fn render_banner(&self, frame: &mut Frame, area: Rect, wizard: &Wizard) {
        if area.height == 0 {
            return;
        }
        let (text, color) = match (wizard.alert(), &self.notice) {
            (Some(alert), _) => (alert.to_string(), Color::Red),
            (None, Some(notice)) => (notice.clone(), Color::Green),
            (None, None) => return,
        };
        let banner = Paragraph::new(vec![
            Line::from(Span::styled(
                text,
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(
                "Esc to dismiss",
                Style::default().fg(Color::DarkGray),
            )),
        ])
        .wrap(Wrap { trim: true });
        frame.render_widget(banner, area);
    }

    fn strength_height(&self, field: Field, widget: &FormField, focused: bool) -> u16 {
        let shown = self.show_strength_meter
            && field == Field::Password
            && (focused || !widget.text().is_empty());
        if shown {
            3
        } else {
            0
        }
    }

    fn render_fields(&mut self, frame: &mut Frame, area: Rect, wizard: &Wizard) {
        let state = wizard.step(self.step);
        let mut constraints = Vec::new();
        for (i, (field, widget)) in self.fields.iter().enumerate() {
            let focused = i == self.focus;
            constraints.push(Constraint::Length(1)); // Label
            constraints.push(Constraint::Length(widget.render_height(focused)));
            constraints.push(Constraint::Length(1)); // Message
            constraints.push(Constraint::Length(self.strength_height(*field, widget, focused)));
        }
        constraints.push(Constraint::Min(0));

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(area);

        for i in 0..self.fields.len() {
            let focused = i == self.focus;
            let field = self.fields[i].0;
            let base = i * 4;

            let label_style = if focused {
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            let required = if is_optional(field) { "" } else { " *" };
            let label = Line::from(vec![
                Span::styled(if focused { "> " } else { "  " }, label_style),
                Span::styled(format!("{}{required}", field.label()), label_style),
            ]);
            frame.render_widget(Paragraph::new(label), rows[base]);

            let widget_area = Rect {
                x: rows[base + 1].x + 4,
                width: rows[base + 1].width.saturating_sub(4),
                ..rows[base + 1]
            };
            self.fields[i].1.render(frame, widget_area, focused);

            let message = self.field_message(field, state.error_for(field));
            frame.render_widget(
                Paragraph::new(message),
                Rect {
                    x: rows[base + 2].x + 4,
                    width: rows[base + 2].width.saturating_sub(4),
                    ..rows[base + 2]
                },
            );

            if rows[base + 3].height > 0 {
                let password = self.fields[i].1.text().to_string();
                self.render_strength(frame, rows[base + 3], &password);
            }
        }

        // errors the step carries for fields shown elsewhere, e.g. the email domain rule
        let unplaced: Vec<Line> = state
            .errors
            .iter()
            .filter(|e| !e.field.is_some_and(|f| self.fields.iter().any(|(g, _)| *g == f)))
            .map(|e| {
                let text = match e.field {
                    Some(field) => format!("{}: {}", field.label(), e.message),
                    None => e.message.clone(),
                };
                Line::from(Span::styled(text, Style::default().fg(Color::Red)))
            })
            .collect();
        if !unplaced.is_empty() {
            let last = rows[self.fields.len() * 4];
            let area = Rect {
                x: last.x + 2,
                y: last.y + u16::from(last.height > 1),
                width: last.width.saturating_sub(2),
                height: last.height.saturating_sub(1).max(1).min(last.height),
            };
            frame.render_widget(Paragraph::new(unplaced).wrap(Wrap { trim: true }), area);
        }
    }

    fn field_message(&self, field: Field, error: Option<&str>) -> Line<'static> {
        if let Some(error) = error {
            return Line::from(Span::styled(
                error.to_string(),
                Style::default().fg(Color::Red),
            ));
        }
        let status = match self.availability_for(field) {
            Some(AvailabilityStatus::Checking) => {
                Some(("Checking availability...".to_string(), Color::Yellow))
            }
            Some(AvailabilityStatus::Available) => Some(("✓ Available".to_string(), Color::Green)),
            _ => None,
        };
        if let Some((text, color)) = status {
            return Line::from(Span::styled(text, Style::default().fg(color)));
        }
        match (field, &self.countries_note) {
            (Field::Country, Some(note)) => Line::from(Span::styled(
                note.clone(),
                Style::default().fg(Color::Yellow),
            )),
            _ => Line::default(),
        }
    }

    fn render_strength(&self, frame: &mut Frame, area: Rect, password: &str) {
        let strength = PasswordStrength::check(password);
        let label = strength.label();
        let color = strength_color(label);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Length(2)])
            .split(Rect {
                x: area.x + 4,
                width: area.width.saturating_sub(4),
                ..area
            });

        let gauge = Gauge::default()
            .gauge_style(Style::default().fg(color))
            .percent(strength.score() as u16)
            .label(format!("Strength: {}", label.as_str()));
        frame.render_widget(gauge, rows[0]);

        let checks: Vec<Span> = strength
            .checklist()
            .iter()
            .flat_map(|(name, ok)| {
                let (mark, style) = if *ok {
                    ("✓ ", Style::default().fg(Color::Green))
                } else {
                    ("✗ ", Style::default().fg(Color::DarkGray))
                };
                [Span::styled(mark, style), Span::styled(format!("{name}  "), style)]
            })
            .collect();
        frame.render_widget(
            Paragraph::new(Line::from(checks)).wrap(Wrap { trim: true }),
            rows[1],
        );
    }

    fn render_review(&self, frame: &mut Frame, area: Rect, form: &FormData) {
        let mut lines = Vec::new();
        for step in StepKind::all().iter().filter(|s| !s.is_terminal()) {
            lines.push(Line::from(Span::styled(
                step.title(),
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )));
            for field in step.fields() {
                let value = match field {
                    Field::Password | Field::ConfirmPassword => {
                        "•".repeat(form.text(*field).chars().count())
                    }
                    Field::AcceptTerms | Field::Newsletter => {
                        let answer = if form.flag(*field) { "Yes" } else { "No" };
                        answer.to_string()
                    }
                    Field::Country => self
                        .countries
                        .iter()
                        .find(|o| o.value == form.country)
                        .map_or_else(|| form.country.clone(), |o| o.label.clone()),
                    _ => form.text(*field).to_string(),
                };
                let value = if value.is_empty() {
                    Span::styled("(not provided)", Style::default().fg(Color::DarkGray))
                } else {
                    Span::raw(value)
                };
                lines.push(Line::from(vec![
                    Span::styled(
                        format!("  {:<18}", field.label()),
                        Style::default().fg(Color::Gray),
                    ),
                    value,
                ]));
            }
            lines.push(Line::default());
        }

        if self.submitting {
            lines.push(Line::from(Span::styled(
                "Submitting registration... (Esc to cancel)",
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )));
        } else {
            lines.push(Line::from(Span::styled(
                "Press Enter to submit, Esc to go back and edit.",
                Style::default().fg(Color::Cyan),
            )));
        }
        frame.render_widget(Paragraph::new(lines), area);
    }

    fn render_footer(&self, frame: &mut Frame, area: Rect) {
        let hints = if self.submitting {
            "Esc cancel submission · Ctrl+C quit"
        } else if self.step == StepKind::Review {
            "Enter submit · Esc back · Ctrl+L clear form · Ctrl+C quit"
        } else {
            "Tab/↑↓ move · Enter next · Esc back · Ctrl+R reload countries · Ctrl+L clear · Ctrl+C quit"
        };
        frame.render_widget(
            Paragraph::new(Span::styled(hints, Style::default().fg(Color::DarkGray)))
                .alignment(Alignment::Center),
            area,
        );
    }
}
