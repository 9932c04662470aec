//! The registration wizard screen
//!
//! Holds the input widgets for the current step and turns key presses into
//! `ScreenAction`s. The `App` owns the `Wizard` and applies those actions; the
//! screen only reads wizard state when loading a step or rendering.

mod render;


use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::collections::HashMap;

use crate::availability::{AvailabilityStatus, AvailabilityUpdate, CheckedField};
use crate::config::UiConfig;
use crate::form::{Field, FieldValue, StepKind};
use crate::location::{Country, DataSource, Region};
use crate::ui::form_field::{FormField, SelectOption};
use crate::wizard::Wizard;

/// What the app should do in response to a key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenAction {
    None,
    /// The field's widget value changed
    Edited(Field),
    Next,
    Back,
    Submit,
    CancelSubmit,
    DismissAlert,
    RefreshCountries,
    ClearForm,
    Quit,
}

pub struct WizardScreen {
    pub(crate) step: StepKind,
    pub(crate) fields: Vec<(Field, FormField)>,
    pub(crate) focus: usize,
    pub(crate) mask_passwords: bool,
    pub(crate) show_strength_meter: bool,
    pub(crate) availability: HashMap<CheckedField, (String, AvailabilityStatus)>,
    pub(crate) countries: Vec<SelectOption>,
    pub(crate) countries_note: Option<String>,
    /// Country code the loaded regions belong to
    pub(crate) regions_for: Option<String>,
    pub(crate) regions: Vec<SelectOption>,
    pub submitting: bool,
    /// Success or informational banner, separate from the wizard's error alert
    pub(crate) notice: Option<String>,
}

impl WizardScreen {
    pub fn new(config: &UiConfig) -> Self {
        Self {
            step: StepKind::Personal,
            fields: Vec::new(),
            focus: 0,
            mask_passwords: config.mask_passwords,
            show_strength_meter: config.show_strength_meter,
            availability: HashMap::new(),
            countries: Vec::new(),
            countries_note: None,
            regions_for: None,
            regions: Vec::new(),
            submitting: false,
            notice: None,
        }
    }

    pub fn step(&self) -> StepKind {
        self.step
    }

    /// Rebuild the widgets for the wizard's current step from its data
    pub fn load(&mut self, wizard: &Wizard) {
        let step = wizard.current_step();
        if step != self.step {
            self.focus = 0;
        }
        self.step = step;
        let data = wizard.step_data(step);
        self.fields = step
            .fields()
            .iter()
            .map(|field| {
                let value = data
                    .get(field)
                    .cloned()
                    .unwrap_or_else(|| FieldValue::empty(field.kind()));
                (*field, FormField::for_field(*field, &value, self.mask_passwords))
            })
            .collect();
        self.focus = self.focus.min(self.fields.len().saturating_sub(1));
        self.apply_options();
    }

    /// Reset a single widget to the wizard's value, keeping focus
    pub fn reload_field(&mut self, field: Field, wizard: &Wizard) {
        let Some(value) = wizard.step_data(field.step()).get(&field).cloned() else {
            return;
        };
        if let Some((_, widget)) = self.fields.iter_mut().find(|(f, _)| *f == field) {
            *widget = FormField::for_field(field, &value, self.mask_passwords);
        }
        self.apply_options();
    }

    fn apply_options(&mut self) {
        for (field, widget) in &mut self.fields {
            match field {
                Field::Country => widget.set_options(self.countries.clone()),
                Field::State => widget.set_options(self.regions.clone()),
                _ => {}
            }
        }
    }

    pub fn focused_field(&self) -> Option<Field> {
        self.fields.get(self.focus).map(|(f, _)| *f)
    }

    pub fn field_value(&self, field: Field) -> Option<FieldValue> {
        self.fields
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, w)| w.value())
    }

    pub fn set_countries(&mut self, countries: &[Country], source: DataSource) {
        self.countries = countries
            .iter()
            .map(|c| match &c.flag {
                Some(flag) => SelectOption::new(&c.code, format!("{flag} {}", c.name)),
                None => SelectOption::new(&c.code, &c.name),
            })
            .collect();
        self.countries_note = match source {
            DataSource::Remote | DataSource::Cache => None,
            DataSource::StaleCache => Some("Offline: showing a saved country list".to_string()),
            DataSource::Unavailable => {
                Some("Countries could not be loaded (Ctrl+R to retry)".to_string())
            }
        };
        self.apply_options();
    }

    pub fn countries_loaded(&self) -> bool {
        !self.countries.is_empty()
    }

    pub fn set_regions(&mut self, country_code: &str, regions: &[Region]) {
        self.regions_for = Some(country_code.to_string());
        self.regions = regions
            .iter()
            .map(|r| SelectOption::new(&r.code, &r.name))
            .collect();
        self.apply_options();
    }

    pub fn regions_loaded_for(&self, country_code: &str) -> bool {
        self.regions_for.as_deref() == Some(country_code)
    }

    /// Record the latest availability status shown next to the field
    pub fn set_availability(&mut self, update: &AvailabilityUpdate) {
        self.availability
            .insert(update.field, (update.value.clone(), update.status));
    }

    pub(crate) fn availability_for(&self, field: Field) -> Option<AvailabilityStatus> {
        let checked = CheckedField::from_field(field)?;
        let (value, status) = self.availability.get(&checked)?;
        let current = self.field_value(field)?;
        (current.as_text() == Some(value.as_str())).then_some(*status)
    }

    pub fn set_notice(&mut self, notice: impl Into<String>) {
        self.notice = Some(notice.into());
    }

    pub fn clear_notice(&mut self) {
        self.notice = None;
    }

    pub fn handle_key(&mut self, key: KeyEvent, alert_shown: bool) -> ScreenAction {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') | KeyCode::Char('q') if ctrl => return ScreenAction::Quit,
            KeyCode::Esc if self.submitting => return ScreenAction::CancelSubmit,
            _ if self.submitting => return ScreenAction::None,
            KeyCode::Esc if alert_shown || self.notice.is_some() => {
                self.notice = None;
                return ScreenAction::DismissAlert;
            }
            KeyCode::Esc => return ScreenAction::Back,
            KeyCode::Char('r') if ctrl => return ScreenAction::RefreshCountries,
            KeyCode::Char('l') if ctrl => return ScreenAction::ClearForm,
            KeyCode::Char('n') if ctrl => return self.advance(),
            KeyCode::Char('b') if ctrl => return ScreenAction::Back,
            KeyCode::Tab => {
                self.focus_next();
                return ScreenAction::None;
            }
            KeyCode::BackTab => {
                self.focus_prev();
                return ScreenAction::None;
            }
            _ => {}
        }

        let focused_select = self
            .fields
            .get(self.focus)
            .is_some_and(|(_, w)| w.is_select());

        match key.code {
            KeyCode::Down if !focused_select => {
                self.focus_next();
                ScreenAction::None
            }
            KeyCode::Up if !focused_select => {
                self.focus_prev();
                ScreenAction::None
            }
            KeyCode::Enter if !focused_select => self.advance(),
            _ => {
                let Some((field, widget)) = self.fields.get_mut(self.focus) else {
                    return ScreenAction::None;
                };
                if widget.handle_key(key.code) {
                    self.notice = None;
                    ScreenAction::Edited(*field)
                } else if key.code == KeyCode::Enter {
                    // a select with nothing new to commit moves on
                    self.focus_next();
                    ScreenAction::None
                } else {
                    ScreenAction::None
                }
            }
        }
    }

    fn advance(&self) -> ScreenAction {
        if self.step == StepKind::Review {
            ScreenAction::Submit
        } else {
            ScreenAction::Next
        }
    }

    fn focus_next(&mut self) {
        if !self.fields.is_empty() {
            self.focus = (self.focus + 1) % self.fields.len();
        }
    }

    fn focus_prev(&mut self) {
        if !self.fields.is_empty() {
            self.focus = self.focus.checked_sub(1).unwrap_or(self.fields.len() - 1);
        }
    }

    /// Focus the first field that has an error on the current step
    pub fn focus_first_error(&mut self, wizard: &Wizard) {
        let state = wizard.step(self.step);
        if let Some(index) = self
            .fields
            .iter()
            .position(|(f, _)| state.error_for(*f).is_some())
        {
            self.focus = index;
        }
    }
}
