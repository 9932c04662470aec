//! Registration service client
//!
//! `RegistrationApi` is the seam the wizard and the availability checker talk to.
//! `HttpRegistrationApi` speaks the JSON wire format of the registration service;
//! `MockRegistrationApi` is an in-process fake used by tests and the default config.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::error::ApiError;
use crate::config::ApiConfig;
use crate::form::FormData;

const PROVIDER_NAME: &str = "registration";

/// Usernames the mock backend reports as taken
pub const MOCK_TAKEN_USERNAMES: &[&str] = &[
    "john_doe", "admin", "testuser", "username", "demo123", "user123",
];

/// Emails the mock backend reports as registered
pub const MOCK_TAKEN_EMAILS: &[&str] = &["admin@example.com", "john@example.com"];

/// Body of `POST /register`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Omitted when the user left it blank
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub phone_number: Option<String>,
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

impl From<&FormData> for RegistrationRequest {
    fn from(form: &FormData) -> Self {
        Self {
            first_name: form.first_name.clone(),
            last_name: form.last_name.clone(),
            email: form.email.clone(),
            phone_number: (!form.phone_number.is_empty()).then(|| form.phone_number.clone()),
            street_address: form.street_address.clone(),
            city: form.city.clone(),
            state: form.state.clone(),
            country: form.country.clone(),
            username: form.username.clone(),
            password: form.password.clone(),
            confirm_password: form.confirm_password.clone(),
            accept_terms: form.accept_terms,
            newsletter: form.newsletter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AvailabilityResponse {
    pub available: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub message: String,
}

/// Error body returned by the registration service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,
}

/// Registration backend
#[async_trait]
pub trait RegistrationApi: Send + Sync {
    /// Provider name for logs and error messages
    fn name(&self) -> &str;

    async fn check_username(&self, username: &str) -> Result<AvailabilityResponse, ApiError>;

    async fn check_email(&self, email: &str) -> Result<AvailabilityResponse, ApiError>;

    async fn submit_registration(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationResponse, ApiError>;
}

fn availability_message(field: &str, value: &str, available: bool) -> String {
    if available {
        format!("{field} '{value}' is available")
    } else {
        format!("{field} '{value}' is already taken")
    }
}

/// reqwest-backed client for the registration service
pub struct HttpRegistrationApi {
    client: reqwest::Client,
    base_url: String,
    max_retries: usize,
    timeout_secs: u64,
}

impl HttpRegistrationApi {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("regwizard/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ApiError::network(PROVIDER_NAME, e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            timeout_secs: config.request_timeout_secs,
        })
    }

    fn retry_strategy(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(250))
            .with_max_delay(Duration::from_secs(5))
            .with_max_times(self.max_retries)
    }

    /// Map a non-success response to an `ApiError`, preferring the structured body
    async fn error_from_response(response: reqwest::Response) -> ApiError {
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();

        match status {
            401 => ApiError::unauthorized(PROVIDER_NAME),
            403 => ApiError::forbidden(PROVIDER_NAME),
            429 => ApiError::rate_limited(PROVIDER_NAME, retry_after),
            _ => match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(err) if status < 500 => {
                    ApiError::rejected(PROVIDER_NAME, err.code, err.message)
                        .with_field_errors(err.errors.unwrap_or_default())
                }
                _ => ApiError::http(PROVIDER_NAME, status, body),
            },
        }
    }

    async fn get_availability(
        &self,
        path: &str,
        param: &str,
        value: &str,
    ) -> Result<AvailabilityResponse, ApiError> {
        let url = format!("{}/{}", self.base_url, path);

        let op = || async {
            let response = self
                .client
                .get(&url)
                .query(&[(param, value)])
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        ApiError::timeout(PROVIDER_NAME, self.timeout_secs)
                    } else {
                        ApiError::network(PROVIDER_NAME, e.to_string())
                    }
                })?;

            if !response.status().is_success() {
                return Err(Self::error_from_response(response).await);
            }

            response
                .json::<AvailabilityResponse>()
                .await
                .map_err(|e| ApiError::decode(PROVIDER_NAME, e.to_string()))
        };

        op.retry(self.retry_strategy())
            .when(ApiError::is_transient)
            .notify(|err, dur| {
                warn!("Retrying {} after {:?}: {}", path, dur, err);
            })
            .await
    }
}

#[async_trait]
impl RegistrationApi for HttpRegistrationApi {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn check_username(&self, username: &str) -> Result<AvailabilityResponse, ApiError> {
        self.get_availability("check-username", "username", username)
            .await
    }

    async fn check_email(&self, email: &str) -> Result<AvailabilityResponse, ApiError> {
        self.get_availability("check-email", "email", email).await
    }

    async fn submit_registration(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationResponse, ApiError> {
        // Not retried: a repeated POST could register twice
        let url = format!("{}/register", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ApiError::network(PROVIDER_NAME, e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let created = response
            .json::<RegistrationResponse>()
            .await
            .map_err(|e| ApiError::decode(PROVIDER_NAME, e.to_string()))?;
        info!(id = %created.id, username = %created.username, "Registration accepted");
        Ok(created)
    }
}

/// In-memory registration backend
pub struct MockRegistrationApi {
    latency: Duration,
    taken_usernames: Mutex<HashSet<String>>,
    taken_emails: Mutex<HashSet<String>>,
    failure: Mutex<Option<ApiError>>,
    username_checks: AtomicUsize,
    email_checks: AtomicUsize,
    submissions: AtomicUsize,
}

impl Default for MockRegistrationApi {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl MockRegistrationApi {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            taken_usernames: Mutex::new(
                MOCK_TAKEN_USERNAMES.iter().map(|s| s.to_string()).collect(),
            ),
            taken_emails: Mutex::new(MOCK_TAKEN_EMAILS.iter().map(|s| s.to_string()).collect()),
            failure: Mutex::new(None),
            username_checks: AtomicUsize::new(0),
            email_checks: AtomicUsize::new(0),
            submissions: AtomicUsize::new(0),
        }
    }

    /// Every call fails with `error` until cleared with `None`
    pub fn fail_with(&self, error: Option<ApiError>) {
        if let Ok(mut slot) = self.failure.lock() {
            *slot = error;
        }
    }

    pub fn username_checks(&self) -> usize {
        self.username_checks.load(Ordering::SeqCst)
    }

    pub fn email_checks(&self) -> usize {
        self.email_checks.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    async fn simulate(&self) -> Result<(), ApiError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let failure = self
            .failure
            .lock()
            .map_err(|_| ApiError::network(PROVIDER_NAME, "mock state poisoned"))?
            .clone();
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn is_taken(set: &Mutex<HashSet<String>>, value: &str) -> Result<bool, ApiError> {
        let set = set
            .lock()
            .map_err(|_| ApiError::network(PROVIDER_NAME, "mock state poisoned"))?;
        let value = value.to_lowercase();
        Ok(set.iter().any(|taken| taken.to_lowercase() == value))
    }
}

#[async_trait]
impl RegistrationApi for MockRegistrationApi {
    fn name(&self) -> &str {
        "mock"
    }

    async fn check_username(&self, username: &str) -> Result<AvailabilityResponse, ApiError> {
        self.username_checks.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;
        let available = !Self::is_taken(&self.taken_usernames, username)?;
        debug!(username, available, "Mock username check");
        Ok(AvailabilityResponse {
            available,
            message: availability_message("username", username, available),
        })
    }

    async fn check_email(&self, email: &str) -> Result<AvailabilityResponse, ApiError> {
        self.email_checks.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;
        let available = !Self::is_taken(&self.taken_emails, email)?;
        debug!(email, available, "Mock email check");
        Ok(AvailabilityResponse {
            available,
            message: availability_message("email", email, available),
        })
    }

    async fn submit_registration(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationResponse, ApiError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;

        if Self::is_taken(&self.taken_emails, &request.email)? {
            return Err(ApiError::rejected(
                PROVIDER_NAME,
                "DUPLICATE_ERROR",
                "email already registered",
            ));
        }
        if Self::is_taken(&self.taken_usernames, &request.username)? {
            return Err(ApiError::rejected(
                PROVIDER_NAME,
                "DUPLICATE_ERROR",
                "username already taken",
            ));
        }

        if let Ok(mut usernames) = self.taken_usernames.lock() {
            usernames.insert(request.username.clone());
        }
        if let Ok(mut emails) = self.taken_emails.lock() {
            emails.insert(request.email.clone());
        }

        Ok(RegistrationResponse {
            id: uuid::Uuid::new_v4().to_string(),
            username: request.username.clone(),
            email: request.email.clone(),
            created_at: Utc::now(),
            message: "Registration successful".to_string(),
        })
    }
}
