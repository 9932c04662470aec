//! Type definitions for the registration wizard

use std::collections::BTreeMap;
use thiserror::Error;

use crate::api::error::ApiError;
use crate::form::{Field, FieldKindMismatch, FieldValue, StepKind};
use crate::validation::ValidationError;

/// Per-step state: completion, validity, errors and the step's slice of the form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepState {
    pub kind: StepKind,
    pub completed: bool,
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub data: BTreeMap<Field, FieldValue>,
}

impl StepState {
    pub fn new(kind: StepKind) -> Self {
        let data = kind
            .fields()
            .iter()
            .map(|f| (*f, FieldValue::empty(f.kind())))
            .collect();
        Self {
            kind,
            completed: false,
            valid: false,
            errors: Vec::new(),
            data,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn error_for(&self, field: Field) -> Option<&str> {
        self.errors
            .iter()
            .find(|e| e.field == Some(field))
            .map(|e| e.message.as_str())
    }

    pub fn title(&self) -> &'static str {
        self.kind.title()
    }
}

/// Why a navigation request did not move the wizard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// An earlier step has not been completed yet
    Unreachable { first_incomplete: StepKind },
    /// The current step failed validation
    ValidationFailed,
    /// Already at the first or last step
    AtBoundary,
}

/// Result of a navigation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavOutcome {
    Moved { from: StepKind, to: StepKind },
    /// Target is the current step
    Stayed,
    Blocked(BlockReason),
}

impl NavOutcome {
    pub fn moved(&self) -> bool {
        matches!(self, NavOutcome::Moved { .. })
    }
}

/// Completed steps over the steps that can be completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn percent(&self) -> u16 {
        if self.total == 0 {
            return 0;
        }
        ((self.completed * 100) / self.total) as u16
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WizardError {
    #[error("field '{field}' does not belong to the {step} step")]
    ForeignField { field: Field, step: StepKind },

    #[error(transparent)]
    WrongKind(#[from] FieldKindMismatch),

    #[error("submission is only possible from the review step (currently on {current})")]
    NotOnReviewStep { current: StepKind },

    #[error("{count} field(s) need attention before submitting")]
    Invalid { count: usize },

    #[error("registration failed: {0}")]
    Submission(#[from] ApiError),
}
