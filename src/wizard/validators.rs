//! Step validators
//!
//! A validator sees the whole form and decides whether its step may be left. The
//! defaults run the step schema and then the remote checks that belong to the step.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::availability::{AvailabilityChecker, AvailabilityStatus, CheckedField};
use crate::form::{Field, FormData, StepKind};
use crate::location::LocationCache;
use crate::validation::{schema, ValidationError, ValidationResult};

#[async_trait]
pub trait StepValidator: Send + Sync {
    async fn validate(&self, form: &FormData) -> ValidationResult;
}

/// Schema rules only
pub struct SchemaValidator {
    step: StepKind,
}

impl SchemaValidator {
    pub fn new(step: StepKind) -> Self {
        Self { step }
    }
}

#[async_trait]
impl StepValidator for SchemaValidator {
    async fn validate(&self, form: &FormData) -> ValidationResult {
        schema::validate_step(self.step, form)
    }
}

/// Run the availability check for `field` if its value passed the schema
async fn check_availability(
    checker: &AvailabilityChecker,
    field: CheckedField,
    form: &FormData,
    result: &mut ValidationResult,
) {
    let value = form.text(field.field());
    if value.is_empty() || result.has_error_for(field.field()) {
        return;
    }
    let update = checker.check_now(field, value).await;
    match update.status {
        AvailabilityStatus::Taken | AvailabilityStatus::Unknown => {
            if let Some(message) = update.message {
                result.push_unique(ValidationError::field(field.field(), message));
            }
        }
        AvailabilityStatus::Available | AvailabilityStatus::Checking => {}
    }
}

/// Personal step: schema plus email availability
pub struct PersonalValidator {
    availability: Option<Arc<AvailabilityChecker>>,
}

impl PersonalValidator {
    pub fn new(availability: Option<Arc<AvailabilityChecker>>) -> Self {
        Self { availability }
    }
}

#[async_trait]
impl StepValidator for PersonalValidator {
    async fn validate(&self, form: &FormData) -> ValidationResult {
        let mut result = schema::validate_step(StepKind::Personal, form);
        if let Some(checker) = &self.availability {
            check_availability(checker, CheckedField::Email, form, &mut result).await;
        }
        result
    }
}

/// Address step: schema plus the optional email-domain rule for the chosen country
pub struct AddressValidator {
    location: Option<Arc<LocationCache>>,
    email_domain_check: bool,
}

impl AddressValidator {
    pub fn new(location: Option<Arc<LocationCache>>, email_domain_check: bool) -> Self {
        Self {
            location,
            email_domain_check,
        }
    }
}

#[async_trait]
impl StepValidator for AddressValidator {
    async fn validate(&self, form: &FormData) -> ValidationResult {
        let mut result = schema::validate_step(StepKind::Address, form);
        if !self.email_domain_check || result.has_error_for(Field::Country) {
            return result;
        }
        let Some(location) = &self.location else {
            return result;
        };

        match location.get_countries(false).await {
            Ok(lookup) => {
                if let Some(message) =
                    schema::validate_email_domain(&form.email, &form.country, &lookup.items)
                {
                    result.push_unique(ValidationError::field(Field::Email, message));
                }
            }
            Err(e) => warn!(error = %e, "Skipping email domain check"),
        }
        result
    }
}

/// Account step: schema plus username availability
pub struct AccountValidator {
    availability: Option<Arc<AvailabilityChecker>>,
}

impl AccountValidator {
    pub fn new(availability: Option<Arc<AvailabilityChecker>>) -> Self {
        Self { availability }
    }
}

#[async_trait]
impl StepValidator for AccountValidator {
    async fn validate(&self, form: &FormData) -> ValidationResult {
        let mut result = schema::validate_step(StepKind::Account, form);
        if let Some(checker) = &self.availability {
            check_availability(checker, CheckedField::Username, form, &mut result).await;
        }
        result
    }
}
