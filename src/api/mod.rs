//! Clients for the external services the wizard depends on
//!
//! - `registration`: username/email availability and the final submission
//! - `error`: the error taxonomy shared with the location providers

pub mod error;
pub mod registration;

pub use error::ApiError;
pub use registration::{
    AvailabilityResponse, ErrorResponse, HttpRegistrationApi, MockRegistrationApi,
    RegistrationApi, RegistrationRequest, RegistrationResponse,
};

use std::sync::Arc;
use std::time::Duration;

use crate::config::{ApiConfig, ApiMode};

/// Build the registration backend selected by `api.mode`
pub fn registration_api(config: &ApiConfig) -> Result<Arc<dyn RegistrationApi>, ApiError> {
    match config.mode {
        ApiMode::Mock => {
            tracing::info!("Using mock registration backend");
            Ok(Arc::new(MockRegistrationApi::new(Duration::from_millis(
                config.mock_latency_ms,
            ))))
        }
        ApiMode::Http => {
            tracing::info!(base_url = %config.base_url, "Using HTTP registration backend");
            Ok(Arc::new(HttpRegistrationApi::new(config)?))
        }
    }
}
