//! Per-field rules
//!
//! Each rule returns the first failing message for its field, checked in the order
//! required, length, pattern. Lengths count characters, not bytes.

use once_cell::sync::Lazy;
use regex::Regex;

pub const NAME_MAX: usize = 50;
pub const EMAIL_MAX: usize = 100;
pub const STREET_MAX: usize = 200;
pub const CITY_MAX: usize = 100;
pub const USERNAME_MIN: usize = 6;
pub const USERNAME_MAX: usize = 30;
pub const PASSWORD_MIN: usize = 8;
pub const PASSWORD_MAX: usize = 50;

/// Characters that satisfy the "special character" password requirement
pub const PASSWORD_SPECIALS: &str = "@$!%*?&";

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z\s'-]+$").expect("name pattern must compile"));

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$")
        .expect("email pattern must compile")
});

static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\+?\(?[0-9]{3}\)?[-\s.]?[0-9]{3}[-\s.]?[0-9]{4,6}$")
        .expect("phone pattern must compile")
});

static CITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z\s'.,-]+$").expect("city pattern must compile"));

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("username pattern must compile"));

pub const PASSWORD_COMPLEXITY_MESSAGE: &str = "Password must include: uppercase letter, lowercase letter, number, and special character (@$!%*?&)";

fn too_long(value: &str, max: usize) -> bool {
    value.chars().count() > max
}

fn person_name(label: &str, value: &str) -> Option<String> {
    if value.is_empty() {
        return Some(format!("{label} is required"));
    }
    if too_long(value, NAME_MAX) {
        return Some(format!("{label} cannot exceed {NAME_MAX} characters"));
    }
    if !NAME_RE.is_match(value) {
        return Some(format!(
            "{label} can only contain letters, spaces, hyphens, and apostrophes"
        ));
    }
    None
}

pub fn first_name(value: &str) -> Option<String> {
    person_name("First name", value)
}

pub fn last_name(value: &str) -> Option<String> {
    person_name("Last name", value)
}

/// Syntax-only email check used by both the schema and the availability gate
pub fn is_email_like(value: &str) -> bool {
    EMAIL_RE.is_match(value)
}

pub fn email(value: &str) -> Option<String> {
    if value.is_empty() {
        return Some("Email is required".to_string());
    }
    if too_long(value, EMAIL_MAX) {
        return Some(format!("Email cannot exceed {EMAIL_MAX} characters"));
    }
    if !is_email_like(value) {
        return Some("Please enter a valid email address (e.g., example@domain.com)".to_string());
    }
    None
}

/// Optional; an empty value passes
pub fn phone_number(value: &str) -> Option<String> {
    if value.is_empty() || PHONE_RE.is_match(value) {
        None
    } else {
        Some("Please enter a valid phone number (e.g., 123-456-7890)".to_string())
    }
}

pub fn street_address(value: &str) -> Option<String> {
    if value.is_empty() {
        return Some("Street address is required".to_string());
    }
    if too_long(value, STREET_MAX) {
        return Some(format!(
            "Street address cannot exceed {STREET_MAX} characters"
        ));
    }
    None
}

pub fn city(value: &str) -> Option<String> {
    if value.is_empty() {
        return Some("City is required".to_string());
    }
    if too_long(value, CITY_MAX) {
        return Some(format!("City cannot exceed {CITY_MAX} characters"));
    }
    if !CITY_RE.is_match(value) {
        return Some(
            "City can only contain letters, spaces, hyphens, apostrophes, commas, and periods"
                .to_string(),
        );
    }
    None
}

pub fn state(value: &str) -> Option<String> {
    value
        .is_empty()
        .then(|| "State/Province is required".to_string())
}

pub fn country(value: &str) -> Option<String> {
    value.is_empty().then(|| "Country is required".to_string())
}

pub fn username(value: &str) -> Option<String> {
    let len = value.chars().count();
    if len < USERNAME_MIN {
        return Some(format!(
            "Username must be at least {USERNAME_MIN} characters"
        ));
    }
    if len > USERNAME_MAX {
        return Some(format!("Username cannot exceed {USERNAME_MAX} characters"));
    }
    if !USERNAME_RE.is_match(value) {
        return Some("Username can only contain letters, numbers, and underscores".to_string());
    }
    None
}

/// Composition check: one of each character class and nothing outside the allowed set
pub fn password_is_complex(value: &str) -> bool {
    let mut upper = false;
    let mut lower = false;
    let mut digit = false;
    let mut special = false;
    for c in value.chars() {
        match c {
            'A'..='Z' => upper = true,
            'a'..='z' => lower = true,
            '0'..='9' => digit = true,
            c if PASSWORD_SPECIALS.contains(c) => special = true,
            _ => return false,
        }
    }
    upper && lower && digit && special
}

pub fn password(value: &str) -> Option<String> {
    let len = value.chars().count();
    if len < PASSWORD_MIN {
        return Some(format!(
            "Password must be at least {PASSWORD_MIN} characters"
        ));
    }
    if len > PASSWORD_MAX {
        return Some(format!("Password cannot exceed {PASSWORD_MAX} characters"));
    }
    if !password_is_complex(value) {
        return Some(PASSWORD_COMPLEXITY_MESSAGE.to_string());
    }
    None
}

pub fn confirm_password(password: &str, confirm: &str) -> Option<String> {
    (password != confirm).then(|| "Passwords do not match".to_string())
}

pub fn accept_terms(accepted: bool) -> Option<String> {
    (!accepted).then(|| "You must accept the terms and conditions".to_string())
}
