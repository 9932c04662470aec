//! Input widgets for the wizard's fields

use crossterm::event::KeyCode;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{List, ListItem, ListState, Paragraph},
    Frame,
};

use crate::form::{Field, FieldKind, FieldValue};
use crate::validation::rules;

/// One entry of a select list: the stored value and what the user sees
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }

    fn matches(&self, filter: &str) -> bool {
        let filter = filter.to_lowercase();
        self.label.to_lowercase().contains(&filter) || self.value.to_lowercase() == filter
    }
}

pub enum FormField {
    /// Single-line text; `masked` hides the characters
    TextInput {
        value: String,
        /// Cursor position in characters
        cursor_pos: usize,
        placeholder: String,
        max_length: Option<usize>,
        masked: bool,
    },
    /// Yes/no flag
    Toggle { value: bool, label: String },
    /// Pick one option; typing narrows the list
    Select {
        options: Vec<SelectOption>,
        filter: String,
        /// Committed value, empty when nothing is chosen
        value: String,
        list_state: ListState,
        placeholder: String,
    },
}

fn byte_index(value: &str, char_pos: usize) -> usize {
    value
        .char_indices()
        .nth(char_pos)
        .map_or(value.len(), |(i, _)| i)
}

impl FormField {
    /// Widget for `field` with `value` filled in
    pub fn for_field(field: Field, value: &FieldValue, mask_passwords: bool) -> Self {
        match field.kind() {
            FieldKind::Flag => FormField::Toggle {
                value: value.as_flag().unwrap_or(false),
                label: toggle_label(field).to_string(),
            },
            FieldKind::Text if matches!(field, Field::Country | Field::State) => {
                let value = value.as_text().unwrap_or_default().to_string();
                FormField::Select {
                    options: Vec::new(),
                    filter: String::new(),
                    value,
                    list_state: ListState::default(),
                    placeholder: format!("Type to search {}", field.label().to_lowercase()),
                }
            }
            FieldKind::Text => {
                let value = value.as_text().unwrap_or_default().to_string();
                FormField::TextInput {
                    cursor_pos: value.chars().count(),
                    value,
                    placeholder: placeholder(field).to_string(),
                    max_length: max_length(field),
                    masked: mask_passwords && field.is_sensitive(),
                }
            }
        }
    }

    pub fn value(&self) -> FieldValue {
        match self {
            FormField::TextInput { value, .. } => FieldValue::Text(value.clone()),
            FormField::Toggle { value, .. } => FieldValue::Flag(*value),
            FormField::Select { value, .. } => FieldValue::Text(value.clone()),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            FormField::TextInput { value, .. } | FormField::Select { value, .. } => value,
            FormField::Toggle { .. } => "",
        }
    }

    /// Replace the options of a select, keeping the committed value
    pub fn set_options(&mut self, new_options: Vec<SelectOption>) {
        if let FormField::Select {
            options,
            list_state,
            value,
            ..
        } = self
        {
            *options = new_options;
            let selected = options.iter().position(|o| o.value == *value);
            list_state.select(selected.or(if options.is_empty() { None } else { Some(0) }));
        }
    }

    pub fn is_select(&self) -> bool {
        matches!(self, FormField::Select { .. })
    }

    /// Options of a select that pass the current filter
    pub fn visible_options(&self) -> Vec<&SelectOption> {
        match self {
            FormField::Select {
                options, filter, ..
            } => options
                .iter()
                .filter(|o| filter.is_empty() || o.matches(filter))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Label of the committed select value, falling back to the raw value
    pub fn display_value(&self) -> String {
        match self {
            FormField::Select { options, value, .. } => options
                .iter()
                .find(|o| o.value == *value)
                .map_or_else(|| value.clone(), |o| o.label.clone()),
            FormField::TextInput { value, masked, .. } if *masked => {
                "•".repeat(value.chars().count())
            }
            FormField::TextInput { value, .. } => value.clone(),
            FormField::Toggle { value, .. } => if *value { "Yes" } else { "No" }.to_string(),
        }
    }

    /// Handle a key, returning true if the field's value changed
    pub fn handle_key(&mut self, key: KeyCode) -> bool {
        match self {
            FormField::TextInput {
                value,
                cursor_pos,
                max_length,
                ..
            } => match key {
                KeyCode::Char(c) => {
                    if max_length.is_some_and(|m| value.chars().count() >= m) {
                        return false;
                    }
                    let at = byte_index(value, *cursor_pos);
                    value.insert(at, c);
                    *cursor_pos += 1;
                    true
                }
                KeyCode::Backspace if *cursor_pos > 0 => {
                    *cursor_pos -= 1;
                    let at = byte_index(value, *cursor_pos);
                    value.remove(at);
                    true
                }
                KeyCode::Delete if *cursor_pos < value.chars().count() => {
                    let at = byte_index(value, *cursor_pos);
                    value.remove(at);
                    true
                }
                KeyCode::Left => {
                    *cursor_pos = cursor_pos.saturating_sub(1);
                    false
                }
                KeyCode::Right => {
                    *cursor_pos = (*cursor_pos + 1).min(value.chars().count());
                    false
                }
                KeyCode::Home => {
                    *cursor_pos = 0;
                    false
                }
                KeyCode::End => {
                    *cursor_pos = value.chars().count();
                    false
                }
                _ => false,
            },
            FormField::Toggle { value, .. } => match key {
                KeyCode::Char(' ') => {
                    *value = !*value;
                    true
                }
                KeyCode::Char('y') | KeyCode::Right => {
                    let changed = !*value;
                    *value = true;
                    changed
                }
                KeyCode::Char('n') | KeyCode::Left => {
                    let changed = *value;
                    *value = false;
                    changed
                }
                _ => false,
            },
            FormField::Select { .. } => self.handle_select_key(key),
        }
    }

    fn handle_select_key(&mut self, key: KeyCode) -> bool {
        let visible = self.visible_options().len();
        let chosen = self
            .highlighted()
            .map(|o| o.value.clone())
            .unwrap_or_default();
        let FormField::Select {
            filter,
            value,
            list_state,
            ..
        } = self
        else {
            return false;
        };

        match key {
            KeyCode::Up => {
                let i = list_state.selected().map_or(0, |i| i.saturating_sub(1));
                list_state.select(Some(i));
                false
            }
            KeyCode::Down => {
                let i = list_state
                    .selected()
                    .map_or(0, |i| (i + 1).min(visible.saturating_sub(1)));
                list_state.select(Some(i));
                false
            }
            KeyCode::Char(' ') if filter.is_empty() => {
                commit(value, filter, chosen)
            }
            KeyCode::Enter => commit(value, filter, chosen),
            KeyCode::Char(c) => {
                filter.push(c);
                list_state.select(Some(0));
                false
            }
            KeyCode::Backspace if !filter.is_empty() => {
                filter.pop();
                list_state.select(Some(0));
                false
            }
            KeyCode::Backspace | KeyCode::Delete if !value.is_empty() => {
                value.clear();
                true
            }
            _ => false,
        }
    }

    fn highlighted(&self) -> Option<&SelectOption> {
        let FormField::Select { list_state, .. } = self else {
            return None;
        };
        let index = list_state.selected()?;
        self.visible_options().get(index).copied()
    }

    /// Rows this field occupies when focused
    pub fn render_height(&self, focused: bool) -> u16 {
        match self {
            FormField::Select { .. } if focused => {
                1 + (self.visible_options().len() as u16).clamp(1, 6)
            }
            _ => 1,
        }
    }

    pub fn render(&mut self, frame: &mut Frame, area: Rect, focused: bool) {
        let text_style = Style::default().fg(if focused { Color::White } else { Color::Gray });
        let hint = Style::default().fg(Color::DarkGray);

        match self {
            FormField::TextInput {
                value,
                cursor_pos,
                placeholder,
                max_length,
                masked,
            } => {
                if value.is_empty() && !focused {
                    frame.render_widget(Paragraph::new(Span::styled(placeholder.as_str(), hint)), area);
                    return;
                }
                let mut shown: String = if *masked {
                    "•".repeat(value.chars().count())
                } else {
                    value.clone()
                };
                if focused {
                    let at = byte_index(&shown, *cursor_pos);
                    shown.insert(at, '|');
                }
                let mut spans = vec![Span::styled(shown, text_style)];
                if let (Some(max), true) = (max_length, focused) {
                    spans.push(Span::styled(
                        format!(" ({}/{})", value.chars().count(), max),
                        hint,
                    ));
                }
                frame.render_widget(Paragraph::new(Line::from(spans)), area);
            }
            FormField::Toggle { value, label } => {
                let mark = if *value { "[x]" } else { "[ ]" };
                let mark_style = if *value {
                    Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
                } else {
                    text_style
                };
                let line = Line::from(vec![
                    Span::styled(mark, mark_style),
                    Span::raw(" "),
                    Span::styled(label.as_str(), text_style),
                ]);
                frame.render_widget(Paragraph::new(line), area);
            }
            FormField::Select { .. } => self.render_select(frame, area, focused),
        }
    }

    fn render_select(&mut self, frame: &mut Frame, area: Rect, focused: bool) {
        let current = self.display_value();
        let items: Vec<ListItem> = self
            .visible_options()
            .iter()
            .map(|o| ListItem::new(format!("{} ({})", o.label, o.value)))
            .collect();
        let FormField::Select {
            filter,
            list_state,
            placeholder,
            options,
            ..
        } = self
        else {
            return;
        };

        let hint = Style::default().fg(Color::DarkGray);
        let header = if !focused {
            if current.is_empty() {
                Span::styled(placeholder.as_str(), hint)
            } else {
                Span::styled(current, Style::default().fg(Color::Gray))
            }
        } else if filter.is_empty() {
            Span::styled(
                if current.is_empty() {
                    placeholder.clone()
                } else {
                    format!("{current}  (type to search)")
                },
                hint,
            )
        } else {
            Span::styled(format!("search: {filter}|"), Style::default().fg(Color::White))
        };

        let header_area = Rect { height: 1, ..area };
        frame.render_widget(Paragraph::new(header), header_area);
        if !focused || area.height < 2 {
            return;
        }

        let list_area = Rect {
            y: area.y + 1,
            height: area.height - 1,
            ..area
        };
        if items.is_empty() {
            let message = if options.is_empty() {
                "Loading..."
            } else {
                "No matches"
            };
            frame.render_widget(Paragraph::new(Span::styled(message, hint)), list_area);
            return;
        }
        let list = List::new(items)
            .highlight_style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::REVERSED),
            )
            .highlight_symbol("> ");
        frame.render_stateful_widget(list, list_area, list_state);
    }
}

fn commit(value: &mut String, filter: &mut String, chosen: String) -> bool {
    filter.clear();
    if chosen.is_empty() || *value == chosen {
        return false;
    }
    *value = chosen;
    true
}

fn toggle_label(field: Field) -> &'static str {
    match field {
        Field::AcceptTerms => "I accept the terms and conditions",
        Field::Newsletter => "Send me the newsletter",
        _ => field.label(),
    }
}

fn placeholder(field: Field) -> &'static str {
    match field {
        Field::Email => "you@example.com",
        Field::PhoneNumber => "555-123-4567 (optional)",
        Field::Username => "letters, numbers and underscores",
        Field::Password => "at least 8 characters",
        _ => "",
    }
}

fn max_length(field: Field) -> Option<usize> {
    match field {
        Field::FirstName | Field::LastName => Some(rules::NAME_MAX),
        Field::Email => Some(rules::EMAIL_MAX),
        Field::StreetAddress => Some(rules::STREET_MAX),
        Field::City => Some(rules::CITY_MAX),
        Field::Username => Some(rules::USERNAME_MAX),
        Field::Password | Field::ConfirmPassword => Some(rules::PASSWORD_MAX),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(field: Field) -> FormField {
        FormField::for_field(field, &FieldValue::empty(field.kind()), true)
    }

    fn countries() -> Vec<SelectOption> {
        vec![
            SelectOption::new("AU", "Australia"),
            SelectOption::new("CA", "Canada"),
            SelectOption::new("US", "United States"),
        ]
    }

    #[test]
    fn test_text_input_handles_chars() {
        let mut field = text(Field::FirstName);
        assert!(field.handle_key(KeyCode::Char('h')));
        assert!(field.handle_key(KeyCode::Char('i')));
        assert_eq!(field.text(), "hi");

        field.handle_key(KeyCode::Left);
        field.handle_key(KeyCode::Char('é'));
        assert_eq!(field.text(), "héi");
        assert!(field.handle_key(KeyCode::Backspace));
        assert_eq!(field.text(), "hi");
    }

    #[test]
    fn test_text_input_respects_max_length() {
        let mut field = text(Field::FirstName);
        for _ in 0..rules::NAME_MAX {
            field.handle_key(KeyCode::Char('a'));
        }
        assert!(!field.handle_key(KeyCode::Char('b')));
        assert_eq!(field.text().chars().count(), rules::NAME_MAX);
    }

    #[test]
    fn test_password_is_masked() {
        let mut field = text(Field::Password);
        for c in "Secret1!".chars() {
            field.handle_key(KeyCode::Char(c));
        }
        assert_eq!(field.display_value(), "••••••••");
        assert_eq!(field.value(), FieldValue::Text("Secret1!".to_string()));
    }

    #[test]
    fn test_toggle() {
        let mut field = text(Field::AcceptTerms);
        assert_eq!(field.value(), FieldValue::Flag(false));
        assert!(field.handle_key(KeyCode::Char(' ')));
        assert_eq!(field.value(), FieldValue::Flag(true));
        assert!(!field.handle_key(KeyCode::Char('y')));
        assert!(field.handle_key(KeyCode::Char('n')));
    }

    #[test]
    fn test_select_filter_and_commit() {
        let mut field = text(Field::Country);
        field.set_options(countries());
        assert_eq!(field.visible_options().len(), 3);

        for c in "uni".chars() {
            field.handle_key(KeyCode::Char(c));
        }
        assert_eq!(field.visible_options().len(), 1);
        assert!(field.handle_key(KeyCode::Enter));
        assert_eq!(field.text(), "US");
        assert_eq!(field.display_value(), "United States");

        // filter is cleared after committing
        assert_eq!(field.visible_options().len(), 3);
    }

    #[test]
    fn test_select_arrow_navigation() {
        let mut field = text(Field::Country);
        field.set_options(countries());
        field.handle_key(KeyCode::Down);
        assert!(field.handle_key(KeyCode::Enter));
        assert_eq!(field.text(), "CA");

        assert!(field.handle_key(KeyCode::Backspace));
        assert_eq!(field.text(), "");
    }

    #[test]
    fn test_select_keeps_value_when_options_change() {
        let field_value = FieldValue::Text("CA".to_string());
        let mut field = FormField::for_field(Field::Country, &field_value, true);
        assert_eq!(field.display_value(), "CA");
        field.set_options(countries());
        assert_eq!(field.display_value(), "Canada");
        assert_eq!(field.text(), "CA");
    }
}
