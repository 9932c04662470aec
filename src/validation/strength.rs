//! Password strength meter

use super::rules::{PASSWORD_MIN, PASSWORD_SPECIALS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrengthLabel {
    Weak,
    Fair,
    Good,
    Strong,
}

impl StrengthLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            StrengthLabel::Weak => "Weak",
            StrengthLabel::Fair => "Fair",
            StrengthLabel::Good => "Good",
            StrengthLabel::Strong => "Strong",
        }
    }
}

/// Individual checks plus the derived score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordStrength {
    pub length: bool,
    pub uppercase: bool,
    pub lowercase: bool,
    pub number: bool,
    pub special: bool,
}

impl PasswordStrength {
    pub const TOTAL: u32 = 5;

    pub fn check(password: &str) -> Self {
        Self {
            length: password.chars().count() >= PASSWORD_MIN,
            uppercase: password.chars().any(|c| c.is_ascii_uppercase()),
            lowercase: password.chars().any(|c| c.is_ascii_lowercase()),
            number: password.chars().any(|c| c.is_ascii_digit()),
            special: password.chars().any(|c| PASSWORD_SPECIALS.contains(c)),
        }
    }

    pub fn passed(&self) -> u32 {
        [
            self.length,
            self.uppercase,
            self.lowercase,
            self.number,
            self.special,
        ]
        .iter()
        .filter(|c| **c)
        .count() as u32
    }

    /// Percentage of checks passed, 0..=100
    pub fn score(&self) -> u32 {
        self.passed() * 100 / Self::TOTAL
    }

    pub fn label(&self) -> StrengthLabel {
        match self.score() {
            100 => StrengthLabel::Strong,
            s if s >= 60 => StrengthLabel::Good,
            s if s >= 20 => StrengthLabel::Fair,
            _ => StrengthLabel::Weak,
        }
    }

    /// Check names and results in display order
    pub fn checklist(&self) -> [(&'static str, bool); 5] {
        [
            ("At least 8 characters", self.length),
            ("Uppercase letter", self.uppercase),
            ("Lowercase letter", self.lowercase),
            ("Number", self.number),
            ("Special character (@$!%*?&)", self.special),
        ]
    }
}
