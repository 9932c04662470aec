//! Username and email availability checks
//!
//! Keystrokes go through `on_input`, which debounces per field and drops results from
//! anything but the latest request. Step validators call `check_now` instead.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::api::error::ApiError;
use crate::api::registration::RegistrationApi;
use crate::config::AvailabilityConfig;
use crate::form::Field;
use crate::validation::rules;

/// Fields with a remote uniqueness check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CheckedField {
    Username,
    Email,
}

impl CheckedField {
    pub fn field(self) -> Field {
        match self {
            CheckedField::Username => Field::Username,
            CheckedField::Email => Field::Email,
        }
    }

    pub fn from_field(field: Field) -> Option<Self> {
        match field {
            Field::Username => Some(CheckedField::Username),
            Field::Email => Some(CheckedField::Email),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            CheckedField::Username => "username",
            CheckedField::Email => "email",
        }
    }

    /// Message attached to the field when the value is taken
    pub fn taken_message(self, value: &str) -> String {
        match self {
            CheckedField::Username => format!("Username \"{value}\" is already taken"),
            CheckedField::Email => format!("Email \"{value}\" is already registered"),
        }
    }

    pub fn unavailable_message(self) -> String {
        format!(
            "Unable to check {} availability. Please try again.",
            self.label()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AvailabilityStatus {
    /// Not checked, value below the minimum, or the check failed
    Unknown,
    Checking,
    Available,
    Taken,
}

impl fmt::Display for AvailabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AvailabilityStatus::Unknown => "unknown",
            AvailabilityStatus::Checking => "checking",
            AvailabilityStatus::Available => "available",
            AvailabilityStatus::Taken => "taken",
        };
        f.write_str(s)
    }
}

/// Result of one availability check for one value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityUpdate {
    pub field: CheckedField,
    pub value: String,
    pub status: AvailabilityStatus,
    /// Field error for `Taken`, transient notice for a failed check
    pub message: Option<String>,
    pub error: Option<ApiError>,
}

impl AvailabilityUpdate {
    fn new(field: CheckedField, value: &str, status: AvailabilityStatus) -> Self {
        Self {
            field,
            value: value.to_string(),
            status,
            message: None,
            error: None,
        }
    }

    pub fn is_taken(&self) -> bool {
        self.status == AvailabilityStatus::Taken
    }
}

#[derive(Default)]
struct Generations {
    username: AtomicU64,
    email: AtomicU64,
}

impl Generations {
    fn slot(&self, field: CheckedField) -> &AtomicU64 {
        match field {
            CheckedField::Username => &self.username,
            CheckedField::Email => &self.email,
        }
    }
}

async fn run_check(
    api: &dyn RegistrationApi,
    field: CheckedField,
    value: &str,
) -> AvailabilityUpdate {
    let response = match field {
        CheckedField::Username => api.check_username(value).await,
        CheckedField::Email => api.check_email(value).await,
    };

    match response {
        Ok(resp) if resp.available => {
            AvailabilityUpdate::new(field, value, AvailabilityStatus::Available)
        }
        Ok(_) => AvailabilityUpdate {
            message: Some(field.taken_message(value)),
            ..AvailabilityUpdate::new(field, value, AvailabilityStatus::Taken)
        },
        Err(e) => {
            warn!(field = field.label(), error = %e, "Availability check failed");
            AvailabilityUpdate {
                message: Some(field.unavailable_message()),
                error: Some(e),
                ..AvailabilityUpdate::new(field, value, AvailabilityStatus::Unknown)
            }
        }
    }
}

pub struct AvailabilityChecker {
    api: Arc<dyn RegistrationApi>,
    debounce: Duration,
    username_min_len: usize,
    tx: mpsc::UnboundedSender<AvailabilityUpdate>,
    generations: Arc<Generations>,
    pending: Mutex<HashMap<CheckedField, AbortHandle>>,
}

impl AvailabilityChecker {
    /// Create a checker and the receiving end of its update stream
    pub fn new(
        api: Arc<dyn RegistrationApi>,
        config: &AvailabilityConfig,
    ) -> (Self, mpsc::UnboundedReceiver<AvailabilityUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let checker = Self {
            api,
            debounce: config.debounce(),
            username_min_len: config.username_min_len,
            tx,
            generations: Arc::new(Generations::default()),
            pending: Mutex::new(HashMap::new()),
        };
        (checker, rx)
    }

    /// Whether a typed value is complete enough to be worth checking
    pub fn meets_minimum(&self, field: CheckedField, value: &str) -> bool {
        match field {
            CheckedField::Username => value.chars().count() >= self.username_min_len,
            CheckedField::Email => rules::is_email_like(value),
        }
    }

    /// Schedule a debounced check for the latest value of `field`.
    ///
    /// Cancels any pending check for the same field. Values below the minimum
    /// resolve to `Unknown` immediately without a request.
    pub fn on_input(&self, field: CheckedField, value: &str) {
        let generation = self.generations.slot(field).fetch_add(1, Ordering::SeqCst) + 1;

        if let Ok(mut pending) = self.pending.lock() {
            if let Some(previous) = pending.remove(&field) {
                previous.abort();
            }
        }

        if !self.meets_minimum(field, value) {
            let _ = self
                .tx
                .send(AvailabilityUpdate::new(field, value, AvailabilityStatus::Unknown));
            return;
        }

        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();
        let generations = Arc::clone(&self.generations);
        let debounce = self.debounce;
        let value = value.to_string();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let current = |g: &Generations| g.slot(field).load(Ordering::SeqCst) == generation;
            if !current(&generations) {
                return;
            }
            let _ = tx.send(AvailabilityUpdate::new(
                field,
                &value,
                AvailabilityStatus::Checking,
            ));

            debug!(field = field.label(), generation, "Running availability check");
            let update = run_check(api.as_ref(), field, &value).await;
            if current(&generations) {
                let _ = tx.send(update);
            } else {
                debug!(field = field.label(), generation, "Discarding stale availability result");
            }
        });

        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(field, handle.abort_handle());
        }
    }

    /// Check immediately, bypassing debounce and the minimum-length gate
    pub async fn check_now(&self, field: CheckedField, value: &str) -> AvailabilityUpdate {
        run_check(self.api.as_ref(), field, value).await
    }

    /// Abort every pending check
    pub fn cancel_all(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            for (field, handle) in pending.drain() {
                self.generations.slot(field).fetch_add(1, Ordering::SeqCst);
                handle.abort();
            }
        }
    }
}

impl Drop for AvailabilityChecker {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::registration::MockRegistrationApi;

    fn checker(
        api: Arc<MockRegistrationApi>,
        debounce_ms: u64,
    ) -> (AvailabilityChecker, mpsc::UnboundedReceiver<AvailabilityUpdate>) {
        let config = AvailabilityConfig {
            debounce_ms,
            ..AvailabilityConfig::default()
        };
        AvailabilityChecker::new(api, &config)
    }

    /// Wait for the next update that is not `Checking`
    async fn next_result(rx: &mut mpsc::UnboundedReceiver<AvailabilityUpdate>) -> AvailabilityUpdate {
        loop {
            let update = rx.recv().await.unwrap();
            if update.status != AvailabilityStatus::Checking {
                return update;
            }
        }
    }

    #[tokio::test]
    async fn test_check_now_reports_taken_username() {
        let (checker, _rx) = checker(Arc::new(MockRegistrationApi::default()), 500);
        let update = checker.check_now(CheckedField::Username, "admin").await;
        assert_eq!(update.status, AvailabilityStatus::Taken);
        assert_eq!(
            update.message.as_deref(),
            Some("Username \"admin\" is already taken")
        );

        let update = checker.check_now(CheckedField::Username, "ada_lovelace").await;
        assert_eq!(update.status, AvailabilityStatus::Available);
        assert!(update.message.is_none());
    }

    #[tokio::test]
    async fn test_check_now_ignores_minimum_length() {
        let api = Arc::new(MockRegistrationApi::default());
        let (checker, _rx) = checker(api.clone(), 500);
        assert!(!checker.meets_minimum(CheckedField::Username, "admin"));
        let update = checker.check_now(CheckedField::Username, "admin").await;
        assert!(update.is_taken());
        assert_eq!(api.username_checks(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_unknown_never_available() {
        let api = Arc::new(MockRegistrationApi::default());
        api.fail_with(Some(ApiError::network("mock", "connection refused")));
        let (checker, _rx) = checker(api, 500);

        let update = checker.check_now(CheckedField::Username, "ada_lovelace").await;
        assert_eq!(update.status, AvailabilityStatus::Unknown);
        assert_eq!(
            update.message.as_deref(),
            Some("Unable to check username availability. Please try again.")
        );
        assert!(update.error.is_some());
    }

    #[tokio::test]
    async fn test_rapid_input_issues_one_check() {
        let api = Arc::new(MockRegistrationApi::default());
        let (checker, mut rx) = checker(api.clone(), 50);

        for value in ["john_d", "john_do", "john_doe"] {
            checker.on_input(CheckedField::Username, value);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let update = next_result(&mut rx).await;
        assert_eq!(update.value, "john_doe");
        assert_eq!(update.status, AvailabilityStatus::Taken);
        assert_eq!(api.username_checks(), 1);
    }

    #[tokio::test]
    async fn test_short_input_resolves_unknown_without_request() {
        let api = Arc::new(MockRegistrationApi::default());
        let (checker, mut rx) = checker(api.clone(), 10);

        checker.on_input(CheckedField::Username, "adm");
        let update = rx.recv().await.unwrap();
        assert_eq!(update.status, AvailabilityStatus::Unknown);
        assert!(update.message.is_none());

        checker.on_input(CheckedField::Email, "not-an-email");
        let update = rx.recv().await.unwrap();
        assert_eq!(update.field, CheckedField::Email);
        assert_eq!(update.status, AvailabilityStatus::Unknown);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(api.username_checks(), 0);
        assert_eq!(api.email_checks(), 0);
    }

    #[tokio::test]
    async fn test_fields_debounce_independently() {
        let api = Arc::new(MockRegistrationApi::default());
        let (checker, mut rx) = checker(api.clone(), 20);

        checker.on_input(CheckedField::Username, "ada_lovelace");
        checker.on_input(CheckedField::Email, "admin@example.com");

        let mut results = vec![next_result(&mut rx).await, next_result(&mut rx).await];
        results.sort_by_key(|u| u.field == CheckedField::Email);
        assert_eq!(results[0].status, AvailabilityStatus::Available);
        assert_eq!(results[1].status, AvailabilityStatus::Taken);
        assert_eq!(
            results[1].message.as_deref(),
            Some("Email \"admin@example.com\" is already registered")
        );
    }

    #[tokio::test]
    async fn test_cancel_all_drops_pending_checks() {
        let api = Arc::new(MockRegistrationApi::default());
        let (checker, _rx) = checker(api.clone(), 20);
        checker.on_input(CheckedField::Username, "ada_lovelace");
        checker.cancel_all();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(api.username_checks(), 0);
    }
}
