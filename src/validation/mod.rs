//! Field rules, step schemas and password strength scoring
//!
//! Validation is synchronous and never touches the network. Availability checks live
//! in `crate::availability` and are layered on top by the wizard's step validators.

pub mod rules;
pub mod schema;
pub mod strength;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::form::Field;

pub use schema::{validate_all, validate_email_domain, validate_step};
pub use strength::{PasswordStrength, StrengthLabel};

/// A single validation failure. `field` is `None` for form-wide messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: Option<Field>,
    pub message: String,
}

impl ValidationError {
    pub fn field(field: Field, message: impl Into<String>) -> Self {
        Self {
            field: Some(field),
            message: message.into(),
        }
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.field {
            Some(field) => write!(f, "{}: {}", field.key(), self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Outcome of validating a step or the whole form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self { errors }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// First message recorded for `field`
    pub fn message_for(&self, field: Field) -> Option<&str> {
        self.errors
            .iter()
            .find(|e| e.field == Some(field))
            .map(|e| e.message.as_str())
    }

    pub fn has_error_for(&self, field: Field) -> bool {
        self.message_for(field).is_some()
    }

    /// Append an error unless the field already carries one
    pub fn push_unique(&mut self, error: ValidationError) {
        if let Some(field) = error.field {
            if self.has_error_for(field) {
                return;
            }
        }
        self.errors.push(error);
    }
}
