//! Registration form data model
//!
//! `FormData` is the flat record the wizard collects. Every field is either text or a
//! flag; there are no optional values. `Field` names each entry together with its wire
//! key and the wizard step that owns it.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Wizard steps in display order. `Review` owns no fields and is terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Personal,
    Address,
    Account,
    Review,
}

impl StepKind {
    pub fn all() -> &'static [StepKind] {
        &[
            StepKind::Personal,
            StepKind::Address,
            StepKind::Account,
            StepKind::Review,
        ]
    }

    /// Zero-based ordinal of the step
    pub fn index(self) -> usize {
        match self {
            StepKind::Personal => 0,
            StepKind::Address => 1,
            StepKind::Account => 2,
            StepKind::Review => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::all().get(index).copied()
    }

    pub fn title(self) -> &'static str {
        match self {
            StepKind::Personal => "Personal Information",
            StepKind::Address => "Address Details",
            StepKind::Account => "Account Setup",
            StepKind::Review => "Review",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            StepKind::Personal => "Tell us who you are and how to reach you",
            StepKind::Address => "Where do you live?",
            StepKind::Account => "Choose your credentials",
            StepKind::Review => "Check everything before submitting",
        }
    }

    /// Fields collected on this step
    pub fn fields(self) -> &'static [Field] {
        match self {
            StepKind::Personal => &[
                Field::FirstName,
                Field::LastName,
                Field::Email,
                Field::PhoneNumber,
            ],
            StepKind::Address => &[
                Field::StreetAddress,
                Field::City,
                Field::Country,
                Field::State,
            ],
            StepKind::Account => &[
                Field::Username,
                Field::Password,
                Field::ConfirmPassword,
                Field::AcceptTerms,
                Field::Newsletter,
            ],
            StepKind::Review => &[],
        }
    }

    pub fn next(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    pub fn prev(self) -> Option<Self> {
        self.index().checked_sub(1).and_then(Self::from_index)
    }

    pub fn is_terminal(self) -> bool {
        self == StepKind::Review
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title())
    }
}

/// Value kind a field accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Flag,
}

/// Every field of the registration form
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    FirstName,
    LastName,
    Email,
    PhoneNumber,
    StreetAddress,
    City,
    State,
    Country,
    Username,
    Password,
    ConfirmPassword,
    AcceptTerms,
    Newsletter,
}

impl Field {
    pub fn all() -> &'static [Field] {
        &[
            Field::FirstName,
            Field::LastName,
            Field::Email,
            Field::PhoneNumber,
            Field::StreetAddress,
            Field::City,
            Field::State,
            Field::Country,
            Field::Username,
            Field::Password,
            Field::ConfirmPassword,
            Field::AcceptTerms,
            Field::Newsletter,
        ]
    }

    /// Wire name used by the registration API
    pub fn key(self) -> &'static str {
        match self {
            Field::FirstName => "firstName",
            Field::LastName => "lastName",
            Field::Email => "email",
            Field::PhoneNumber => "phoneNumber",
            Field::StreetAddress => "streetAddress",
            Field::City => "city",
            Field::State => "state",
            Field::Country => "country",
            Field::Username => "username",
            Field::Password => "password",
            Field::ConfirmPassword => "confirmPassword",
            Field::AcceptTerms => "acceptTerms",
            Field::Newsletter => "newsletter",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::all().iter().copied().find(|f| f.key() == key)
    }

    pub fn label(self) -> &'static str {
        match self {
            Field::FirstName => "First name",
            Field::LastName => "Last name",
            Field::Email => "Email",
            Field::PhoneNumber => "Phone number",
            Field::StreetAddress => "Street address",
            Field::City => "City",
            Field::State => "State/Province",
            Field::Country => "Country",
            Field::Username => "Username",
            Field::Password => "Password",
            Field::ConfirmPassword => "Confirm password",
            Field::AcceptTerms => "Accept terms and conditions",
            Field::Newsletter => "Subscribe to newsletter",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Field::AcceptTerms | Field::Newsletter => FieldKind::Flag,
            _ => FieldKind::Text,
        }
    }

    /// Step that collects this field
    pub fn step(self) -> StepKind {
        match self {
            Field::FirstName | Field::LastName | Field::Email | Field::PhoneNumber => {
                StepKind::Personal
            }
            Field::StreetAddress | Field::City | Field::State | Field::Country => {
                StepKind::Address
            }
            Field::Username
            | Field::Password
            | Field::ConfirmPassword
            | Field::AcceptTerms
            | Field::Newsletter => StepKind::Account,
        }
    }

    /// Credentials are never written to durable storage
    pub fn is_sensitive(self) -> bool {
        matches!(self, Field::Password | Field::ConfirmPassword)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A single field value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Flag(bool),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::Flag(_) => FieldKind::Flag,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Flag(_) => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            FieldValue::Flag(b) => Some(*b),
            FieldValue::Text(_) => None,
        }
    }

    /// Default value for a field of the given kind
    pub fn empty(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Text => FieldValue::Text(String::new()),
            FieldKind::Flag => FieldValue::Flag(false),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Flag(value)
    }
}

/// A value of the wrong kind was supplied for a field
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("field '{field}' expects a {expected:?} value")]
pub struct FieldKindMismatch {
    pub field: Field,
    pub expected: FieldKind,
}

/// All data collected by the registration wizard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct FormData {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,

    pub street_address: String,
    pub city: String,
    pub state: String,
    pub country: String,

    pub username: String,
    pub password: String,
    pub confirm_password: String,
    pub accept_terms: bool,
    pub newsletter: bool,
}

impl FormData {
    /// Text content of a field; flag fields read as an empty string
    pub fn text(&self, field: Field) -> &str {
        match field {
            Field::FirstName => &self.first_name,
            Field::LastName => &self.last_name,
            Field::Email => &self.email,
            Field::PhoneNumber => &self.phone_number,
            Field::StreetAddress => &self.street_address,
            Field::City => &self.city,
            Field::State => &self.state,
            Field::Country => &self.country,
            Field::Username => &self.username,
            Field::Password => &self.password,
            Field::ConfirmPassword => &self.confirm_password,
            Field::AcceptTerms | Field::Newsletter => "",
        }
    }

    /// Boolean content of a field; text fields read as false
    pub fn flag(&self, field: Field) -> bool {
        match field {
            Field::AcceptTerms => self.accept_terms,
            Field::Newsletter => self.newsletter,
            _ => false,
        }
    }

    pub fn get(&self, field: Field) -> FieldValue {
        match field.kind() {
            FieldKind::Text => FieldValue::Text(self.text(field).to_string()),
            FieldKind::Flag => FieldValue::Flag(self.flag(field)),
        }
    }

    pub fn set(&mut self, field: Field, value: FieldValue) -> Result<(), FieldKindMismatch> {
        let mismatch = FieldKindMismatch {
            field,
            expected: field.kind(),
        };
        match value {
            FieldValue::Flag(b) => match field {
                Field::AcceptTerms => self.accept_terms = b,
                Field::Newsletter => self.newsletter = b,
                _ => return Err(mismatch),
            },
            FieldValue::Text(s) => {
                let slot = match field {
                    Field::FirstName => &mut self.first_name,
                    Field::LastName => &mut self.last_name,
                    Field::Email => &mut self.email,
                    Field::PhoneNumber => &mut self.phone_number,
                    Field::StreetAddress => &mut self.street_address,
                    Field::City => &mut self.city,
                    Field::State => &mut self.state,
                    Field::Country => &mut self.country,
                    Field::Username => &mut self.username,
                    Field::Password => &mut self.password,
                    Field::ConfirmPassword => &mut self.confirm_password,
                    Field::AcceptTerms | Field::Newsletter => return Err(mismatch),
                };
                *slot = s;
            }
        }
        Ok(())
    }

    /// Copy with every credential field blanked
    pub fn without_credentials(&self) -> Self {
        Self {
            password: String::new(),
            confirm_password: String::new(),
            ..self.clone()
        }
    }
}

/// A partial update to the form, applied in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormPatch {
    entries: Vec<(Field, FieldValue)>,
}

impl FormPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: Field, value: impl Into<FieldValue>) -> Self {
        self.entries.push((field, value.into()));
        self
    }

    pub fn entries(&self) -> &[(Field, FieldValue)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Patch that writes every field of `step` from `form`
    pub fn from_form(form: &FormData, step: StepKind) -> Self {
        step.fields()
            .iter()
            .map(|f| (*f, form.get(*f)))
            .collect()
    }
}

impl FromIterator<(Field, FieldValue)> for FormPatch {
    fn from_iter<I: IntoIterator<Item = (Field, FieldValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
