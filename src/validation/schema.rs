//! Step schemas and the combined registration schema

use super::{rules, ValidationError, ValidationResult};
use crate::form::{Field, FormData, StepKind};
use crate::location::Country;

/// Check a single field against its rule set
pub fn validate_field(field: Field, form: &FormData) -> Option<String> {
    let value = form.text(field);
    match field {
        Field::FirstName => rules::first_name(value),
        Field::LastName => rules::last_name(value),
        Field::Email => rules::email(value),
        Field::PhoneNumber => rules::phone_number(value),
        Field::StreetAddress => rules::street_address(value),
        Field::City => rules::city(value),
        Field::State => rules::state(value),
        Field::Country => rules::country(value),
        Field::Username => rules::username(value),
        Field::Password => rules::password(value),
        Field::ConfirmPassword => rules::confirm_password(&form.password, value),
        Field::AcceptTerms => rules::accept_terms(form.accept_terms),
        Field::Newsletter => None,
    }
}

/// Run the schema for one step. `Review` has no fields and always passes.
pub fn validate_step(step: StepKind, form: &FormData) -> ValidationResult {
    let errors = step
        .fields()
        .iter()
        .filter_map(|field| {
            validate_field(*field, form).map(|message| ValidationError::field(*field, message))
        })
        .collect();
    ValidationResult::from_errors(errors)
}

/// Union of every step schema, plus the email-domain rule when `countries` is given
pub fn validate_all(form: &FormData, countries: Option<&[Country]>) -> ValidationResult {
    let mut result = ValidationResult::ok();
    for step in StepKind::all() {
        for error in validate_step(*step, form).errors {
            result.push_unique(error);
        }
    }
    if let Some(countries) = countries {
        if let Some(message) = validate_email_domain(&form.email, &form.country, countries) {
            result.push_unique(ValidationError::field(Field::Email, message));
        }
    }
    result
}

/// Email must end with one of the selected country's TLDs.
///
/// Passes when the email is empty, the country is unknown, or it lists no TLDs.
pub fn validate_email_domain(
    email: &str,
    country_code: &str,
    countries: &[Country],
) -> Option<String> {
    if email.is_empty() {
        return None;
    }
    let country = countries
        .iter()
        .find(|c| c.code.eq_ignore_ascii_case(country_code))?;
    if country.tlds.is_empty() {
        return None;
    }

    let email = email.to_lowercase();
    let matches = country
        .tlds
        .iter()
        .any(|tld| email.ends_with(&tld.to_lowercase()));
    if matches {
        None
    } else {
        Some(format!(
            "Email domain should end with {} for {}",
            country.tlds.join(" or "),
            country.name
        ))
    }
}
