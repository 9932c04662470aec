//! Registration wizard state machine
//!
//! Owns the current step, one `StepState` per step and the validators that gate
//! forward navigation. Backward navigation is always allowed; moving forward
//! requires every earlier step to be completed and the current step to validate.

mod types;
pub mod validators;

#[cfg(test)]
mod tests;

pub use types::{BlockReason, NavOutcome, Progress, StepState, WizardError};
pub use validators::{
    AccountValidator, AddressValidator, PersonalValidator, SchemaValidator, StepValidator,
};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::error::ApiError;
use crate::api::registration::{RegistrationApi, RegistrationRequest, RegistrationResponse};
use crate::availability::{AvailabilityStatus, AvailabilityUpdate, AvailabilityChecker};
use crate::draft::{Draft, DraftStore};
use crate::form::{Field, FieldValue, FormData, FormPatch, StepKind};
use crate::location::LocationCache;
use crate::validation::{schema, ValidationError};

/// Alert shown when submission is blocked by invalid fields
pub const INVALID_FORM_ALERT: &str =
    "All required fields must be filled correctly before proceeding.";

/// Collaborators used by the default validators and the final submission check
#[derive(Clone, Default)]
pub struct WizardDeps {
    pub availability: Option<Arc<AvailabilityChecker>>,
    pub location: Option<Arc<LocationCache>>,
    pub email_domain_check: bool,
}

pub struct Wizard {
    current: StepKind,
    steps: Vec<StepState>,
    validators: HashMap<StepKind, Arc<dyn StepValidator>>,
    location: Option<Arc<LocationCache>>,
    email_domain_check: bool,
    draft: Option<DraftStore>,
    alert: Option<String>,
    submit_timeout: Duration,
}

impl Default for Wizard {
    fn default() -> Self {
        Self::new()
    }
}

impl Wizard {
    /// Wizard with no validators: a step is valid iff it has no recorded errors
    pub fn new() -> Self {
        Self {
            current: StepKind::Personal,
            steps: StepKind::all().iter().map(|k| StepState::new(*k)).collect(),
            validators: HashMap::new(),
            location: None,
            email_domain_check: false,
            draft: None,
            alert: None,
            submit_timeout: Duration::from_secs(30),
        }
    }

    /// Wizard with the standard validator for every data step
    pub fn with_default_validators(deps: WizardDeps) -> Self {
        let mut wizard = Self::new();
        wizard.register_validator(
            StepKind::Personal,
            Arc::new(PersonalValidator::new(deps.availability.clone())),
        );
        wizard.register_validator(
            StepKind::Address,
            Arc::new(AddressValidator::new(
                deps.location.clone(),
                deps.email_domain_check,
            )),
        );
        wizard.register_validator(
            StepKind::Account,
            Arc::new(AccountValidator::new(deps.availability)),
        );
        wizard.location = deps.location;
        wizard.email_domain_check = deps.email_domain_check;
        wizard
    }

    pub fn with_draft_store(mut self, draft: DraftStore) -> Self {
        self.draft = Some(draft);
        self
    }

    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    pub fn submit_timeout(&self) -> Duration {
        self.submit_timeout
    }

    pub fn register_validator(&mut self, step: StepKind, validator: Arc<dyn StepValidator>) {
        self.validators.insert(step, validator);
    }

    pub fn unregister_validator(&mut self, step: StepKind) {
        self.validators.remove(&step);
    }

    pub fn current_step(&self) -> StepKind {
        self.current
    }

    pub fn step(&self, kind: StepKind) -> &StepState {
        &self.steps[kind.index()]
    }

    fn step_mut(&mut self, kind: StepKind) -> &mut StepState {
        &mut self.steps[kind.index()]
    }

    pub fn steps(&self) -> &[StepState] {
        &self.steps
    }

    pub fn step_data(&self, step: StepKind) -> &std::collections::BTreeMap<Field, FieldValue> {
        &self.step(step).data
    }

    /// Every step's data merged into one record
    pub fn form_data(&self) -> FormData {
        let mut form = FormData::default();
        for step in &self.steps {
            for (field, value) in &step.data {
                // values were kind-checked on the way in
                let _ = form.set(*field, value.clone());
            }
        }
        form
    }

    pub fn progress(&self) -> Progress {
        let data_steps: Vec<_> = self.steps.iter().filter(|s| !s.kind.is_terminal()).collect();
        Progress {
            completed: data_steps.iter().filter(|s| s.completed).count(),
            total: data_steps.len(),
        }
    }

    pub fn alert(&self) -> Option<&str> {
        self.alert.as_deref()
    }

    pub fn set_alert(&mut self, message: impl Into<String>) {
        self.alert = Some(message.into());
    }

    pub fn dismiss_alert(&mut self) {
        self.alert = None;
    }

    /// Move to `target`, validating the current step when moving forward
    pub async fn go_to_step(&mut self, target: StepKind) -> NavOutcome {
        let from = self.current;
        if target == from {
            return NavOutcome::Stayed;
        }

        if target < from {
            self.current = target;
            debug!(from = %from, to = %target, "Moved back");
            self.save_draft();
            return NavOutcome::Moved { from, to: target };
        }

        if let Some(first_incomplete) = self.steps[..target.index()]
            .iter()
            .find(|s| s.kind != from && !s.completed)
            .map(|s| s.kind)
        {
            debug!(to = %target, first_incomplete = %first_incomplete, "Target not reachable");
            return NavOutcome::Blocked(BlockReason::Unreachable { first_incomplete });
        }

        let valid = match self.validators.get(&from).cloned() {
            Some(validator) => {
                let result = validator.validate(&self.form_data()).await;
                let step = self.step_mut(from);
                step.errors = result.errors;
                step.errors.is_empty()
            }
            None => !self.step(from).has_errors(),
        };

        if !valid {
            let step = self.step_mut(from);
            step.valid = false;
            debug!(step = %from, errors = step.errors.len(), "Step failed validation");
            return NavOutcome::Blocked(BlockReason::ValidationFailed);
        }

        let step = self.step_mut(from);
        step.completed = true;
        step.valid = true;
        step.errors.clear();
        self.current = target;
        info!(from = %from, to = %target, "Advanced");
        self.save_draft();
        NavOutcome::Moved { from, to: target }
    }

    pub async fn next_step(&mut self) -> NavOutcome {
        match self.current.next() {
            Some(next) => self.go_to_step(next).await,
            None => NavOutcome::Blocked(BlockReason::AtBoundary),
        }
    }

    /// Step back without validating
    pub async fn previous_step(&mut self) -> NavOutcome {
        match self.current.prev() {
            Some(prev) => self.go_to_step(prev).await,
            None => NavOutcome::Blocked(BlockReason::AtBoundary),
        }
    }

    /// Merge a partial update into `step`'s data. Does not validate.
    ///
    /// The whole patch is rejected if any entry names a field the step does not own
    /// or carries the wrong kind of value. Changing the country clears the state.
    pub fn update_step_data(&mut self, step: StepKind, patch: FormPatch) -> Result<(), WizardError> {
        for (field, value) in patch.entries() {
            if field.step() != step {
                return Err(WizardError::ForeignField {
                    field: *field,
                    step,
                });
            }
            if value.kind() != field.kind() {
                return Err(crate::form::FieldKindMismatch {
                    field: *field,
                    expected: field.kind(),
                }
                .into());
            }
        }

        let state = self.step_mut(step);
        for (field, value) in patch.entries() {
            let previous = state.data.insert(*field, value.clone());
            if *field == Field::Country && previous.as_ref() != Some(value) {
                state
                    .data
                    .insert(Field::State, FieldValue::empty(Field::State.kind()));
            }
        }
        self.save_draft();
        Ok(())
    }

    /// Set a single field on the step that owns it
    pub fn set_field(&mut self, field: Field, value: impl Into<FieldValue>) -> Result<(), WizardError> {
        self.update_step_data(field.step(), FormPatch::new().set(field, value))
    }

    pub fn create_error(&mut self, step: StepKind, error: ValidationError) {
        let state = self.step_mut(step);
        state.errors.push(error);
        state.valid = false;
    }

    pub fn has_step_errors(&self, step: StepKind) -> bool {
        self.step(step).has_errors()
    }

    pub fn clear_step_errors(&mut self, step: StepKind) {
        self.step_mut(step).errors.clear();
    }

    /// Replace any error on `field` with `message`
    pub fn set_field_error(&mut self, field: Field, message: impl Into<String>) {
        let state = self.step_mut(field.step());
        state.errors.retain(|e| e.field != Some(field));
        state.errors.push(ValidationError::field(field, message));
        state.valid = false;
    }

    pub fn clear_field_error(&mut self, field: Field) {
        self.step_mut(field.step())
            .errors
            .retain(|e| e.field != Some(field));
    }

    /// Fold an availability result into the field errors.
    ///
    /// Results for a value the field no longer holds are ignored; returns whether
    /// the update was applied. While the value fails its schema the field errors
    /// are left untouched, so a schema message is never replaced or cleared here.
    pub fn apply_availability(&mut self, update: &AvailabilityUpdate) -> bool {
        let field = update.field.field();
        let form = self.form_data();
        if form.text(field) != update.value {
            return false;
        }
        if update.status == AvailabilityStatus::Checking {
            return false;
        }
        if schema::validate_field(field, &form).is_some() {
            return true;
        }
        match (update.status, &update.message) {
            (AvailabilityStatus::Taken, Some(message))
            | (AvailabilityStatus::Unknown, Some(message)) => {
                self.set_field_error(field, message.clone());
            }
            _ => self.clear_field_error(field),
        }
        true
    }

    /// Reset every step and return to the first one; deletes any draft
    pub fn clear_form(&mut self) {
        self.reset();
        if let Some(draft) = &self.draft {
            if let Err(e) = draft.clear() {
                warn!(error = %e, "Failed to delete draft");
            }
        }
    }

    fn reset(&mut self) {
        self.current = StepKind::Personal;
        self.steps = StepKind::all().iter().map(|k| StepState::new(*k)).collect();
        self.alert = None;
    }

    /// Run the combined schema and build the request, or attach errors and block
    pub async fn prepare_submission(&mut self) -> Result<RegistrationRequest, WizardError> {
        if self.current != StepKind::Review {
            return Err(WizardError::NotOnReviewStep {
                current: self.current,
            });
        }

        let form = self.form_data();
        let countries = match (&self.location, self.email_domain_check) {
            (Some(location), true) => match location.get_countries(false).await {
                Ok(lookup) => Some(lookup.items),
                Err(e) => {
                    warn!(error = %e, "Skipping email domain check on submit");
                    None
                }
            },
            _ => None,
        };

        let result = schema::validate_all(&form, countries.as_deref());
        if !result.is_valid() {
            let count = result.errors.len();
            for error in result.errors {
                let Some(field) = error.field else { continue };
                let state = self.step_mut(field.step());
                if state.error_for(field).is_none() {
                    state.errors.push(error);
                }
                state.valid = false;
            }
            self.alert = Some(INVALID_FORM_ALERT.to_string());
            info!(count, "Submission blocked by validation");
            return Err(WizardError::Invalid { count });
        }

        self.alert = None;
        Ok(RegistrationRequest::from(&form))
    }

    /// Record the outcome of a submission attempt.
    ///
    /// Success resets the wizard and deletes the draft; failure keeps all data,
    /// stores an alert and attaches any per-field messages from the server.
    pub fn finish_submission(
        &mut self,
        outcome: Result<RegistrationResponse, ApiError>,
    ) -> Result<RegistrationResponse, WizardError> {
        match outcome {
            Ok(created) => {
                info!(id = %created.id, "Registration complete");
                self.clear_form();
                Ok(created)
            }
            Err(e) => {
                warn!(error = %e, "Registration failed");
                if let Some(field_errors) = e.field_errors() {
                    for (key, message) in field_errors {
                        if let Some(field) = Field::from_key(key) {
                            self.set_field_error(field, message.clone());
                        }
                    }
                }
                self.alert = Some(e.user_message());
                Err(WizardError::Submission(e))
            }
        }
    }

    /// Validate everything and send the registration, bounded by the submit timeout
    pub async fn submit(
        &mut self,
        api: &dyn RegistrationApi,
    ) -> Result<RegistrationResponse, WizardError> {
        let request = self.prepare_submission().await?;
        let outcome = submit_with_timeout(api, &request, self.submit_timeout).await;
        self.finish_submission(outcome)
    }

    fn snapshot(&self) -> Draft {
        let completed = self
            .steps
            .iter()
            .filter(|s| s.completed)
            .map(|s| s.kind)
            .collect();
        Draft::new(self.current, completed, &self.form_data())
    }

    fn save_draft(&self) {
        let Some(store) = &self.draft else { return };
        let draft = self.snapshot();
        if draft.is_blank() {
            return;
        }
        if let Err(e) = store.save(&draft) {
            warn!(error = %e, "Failed to save draft");
        }
    }

    /// Load a saved draft into the wizard, returning whether one was applied.
    ///
    /// The account step is never restored as completed since its credentials were
    /// not saved; the wizard resumes at the first step that still needs input.
    pub fn restore_draft(&mut self) -> bool {
        let Some(store) = &self.draft else {
            return false;
        };
        let draft = match store.load() {
            Ok(Some(draft)) => draft,
            Ok(None) => return false,
            Err(e) => {
                warn!(error = %e, "Failed to load draft");
                return false;
            }
        };

        self.reset();
        for step in StepKind::all() {
            let patch = FormPatch::from_form(&draft.data, *step);
            let state = self.step_mut(*step);
            for (field, value) in patch.entries() {
                state.data.insert(*field, value.clone());
            }
            state.completed = *step != StepKind::Account
                && !step.is_terminal()
                && draft.completed.contains(step);
            state.valid = state.completed;
        }

        let first_incomplete = self
            .steps
            .iter()
            .find(|s| !s.completed)
            .map_or(StepKind::Review, |s| s.kind);
        self.current = draft.current_step.min(first_incomplete);
        info!(step = %self.current, saved_at = %draft.saved_at, "Restored draft");
        true
    }
}

/// Send a registration request, mapping an elapsed timeout to `ApiError::Timeout`
pub async fn submit_with_timeout(
    api: &dyn RegistrationApi,
    request: &RegistrationRequest,
    timeout: Duration,
) -> Result<RegistrationResponse, ApiError> {
    match tokio::time::timeout(timeout, api.submit_registration(request)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(ApiError::timeout(api.name(), timeout.as_secs())),
    }
}
