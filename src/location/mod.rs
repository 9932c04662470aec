//! Country and region data
//!
//! Providers fetch the lists; `LocationCache` fronts them with a TTL cache in the
//! key-value store and falls back to stale entries when a fetch fails.

pub mod cache;
pub mod fallback;
pub mod providers;

pub use cache::{LocationCache, Lookup};
pub use providers::{RestCountriesProvider, StaticLocationProvider};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::api::error::ApiError;
use crate::config::{LocationConfig, LocationSource};

/// A selectable country
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Country {
    /// ISO 3166-1 alpha-2 code
    pub code: String,
    pub name: String,
    /// Top-level domains, each with a leading dot (".us")
    #[serde(default)]
    pub tlds: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<String>,
}

/// A state, province or other first-level subdivision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub code: String,
    pub name: String,
    pub country_code: String,
}

/// Where a lookup result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Fetched from the provider just now
    Remote,
    /// Fresh cache entry
    Cache,
    /// Expired cache entry served because the fetch failed
    StaleCache,
    /// Nothing to serve
    Unavailable,
}

impl DataSource {
    pub fn as_str(self) -> &'static str {
        match self {
            DataSource::Remote => "remote",
            DataSource::Cache => "cache",
            DataSource::StaleCache => "stale cache",
            DataSource::Unavailable => "unavailable",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocationError {
    /// A newer country fetch replaced this one
    #[error("country fetch superseded by a newer request")]
    Superseded,

    #[error("location fetch task failed: {0}")]
    Task(String),
}

/// Source of country and region lists
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    async fn list_countries(&self) -> Result<Vec<Country>, ApiError>;

    async fn list_regions(&self, country_code: &str) -> Result<Vec<Region>, ApiError>;
}

/// Build the provider selected by `location.source`
pub fn provider_from_config(config: &LocationConfig) -> Result<Arc<dyn LocationProvider>, ApiError> {
    match config.source {
        LocationSource::Static => Ok(Arc::new(StaticLocationProvider)),
        LocationSource::Remote => Ok(Arc::new(RestCountriesProvider::from_config(config)?)),
    }
}
