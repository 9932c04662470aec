use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub availability: AvailabilityConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub submission: SubmissionConfig,
    #[serde(default)]
    pub draft: DraftConfig,
    pub paths: PathsConfig,
    pub ui: UiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which registration backend to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiMode {
    /// In-process fake with a fixed list of taken usernames and emails
    Mock,
    /// `HttpRegistrationApi` against `api.base_url`
    Http,
}

/// Registration API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_mode")]
    pub mode: ApiMode,
    /// Base URL of the registration service (default: http://localhost:8080/api)
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds for availability checks (default: 10)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Retries for transient failures on idempotent calls (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Simulated latency of the mock backend in milliseconds (default: 300)
    #[serde(default = "default_mock_latency")]
    pub mock_latency_ms: u64,
}

fn default_api_mode() -> ApiMode {
    ApiMode::Mock
}

fn default_api_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_max_retries() -> usize {
    3
}

fn default_mock_latency() -> u64 {
    300
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            mode: default_api_mode(),
            base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            mock_latency_ms: default_mock_latency(),
        }
    }
}

/// Where country and region lists come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationSource {
    /// restcountries.com for countries, GeoDB for regions
    Remote,
    /// Built-in table, no network
    Static,
}

/// Location data configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    #[serde(default = "default_location_source")]
    pub source: LocationSource,
    /// Cache time-to-live in hours (default: 24)
    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: u64,
    #[serde(default = "default_countries_url")]
    pub countries_url: String,
    /// Regions endpoint; `{code}` is replaced by the country code
    #[serde(default = "default_regions_url")]
    pub regions_url: String,
    #[serde(default = "default_geodb_host")]
    pub geodb_host: String,
    /// Environment variable holding the GeoDB RapidAPI key
    #[serde(default = "default_geodb_key_env")]
    pub geodb_key_env: String,
    /// Serve the built-in table for regions when no GeoDB key is configured
    #[serde(default = "default_true")]
    pub static_regions_fallback: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

fn default_location_source() -> LocationSource {
    LocationSource::Remote
}

fn default_cache_ttl_hours() -> u64 {
    24
}

fn default_countries_url() -> String {
    "https://restcountries.com/v3.1/independent?status=true".to_string()
}

fn default_regions_url() -> String {
    "https://wft-geo-db.p.rapidapi.com/v1/geo/countries/{code}/regions".to_string()
}

fn default_geodb_host() -> String {
    "wft-geo-db.p.rapidapi.com".to_string()
}

fn default_geodb_key_env() -> String {
    "REGWIZARD_GEODB_API_KEY".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            source: default_location_source(),
            cache_ttl_hours: default_cache_ttl_hours(),
            countries_url: default_countries_url(),
            regions_url: default_regions_url(),
            geodb_host: default_geodb_host(),
            geodb_key_env: default_geodb_key_env(),
            static_regions_fallback: true,
            max_retries: default_max_retries(),
        }
    }
}

impl LocationConfig {
    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::try_from(self.cache_ttl_hours).unwrap_or(i64::MAX / 3600))
    }
}

/// Username/email availability checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityConfig {
    /// Quiet period after the last keystroke before a check fires (default: 500)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Usernames shorter than this are not checked while typing (default: 6)
    #[serde(default = "default_username_min_len")]
    pub username_min_len: usize,
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_username_min_len() -> usize {
    6
}

impl Default for AvailabilityConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            username_min_len: default_username_min_len(),
        }
    }
}

impl AvailabilityConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Require the email to end with one of the selected country's TLDs
    #[serde(default)]
    pub email_domain_check: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    /// Registration request timeout in seconds (default: 30)
    #[serde(default = "default_submission_timeout")]
    pub timeout_secs: u64,
}

fn default_submission_timeout() -> u64 {
    30
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_submission_timeout(),
        }
    }
}

impl SubmissionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftConfig {
    /// Save non-sensitive progress and offer to resume it (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for DraftConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory for the local store and logs
    pub state: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state: ".regwizard".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    pub tick_rate_ms: u64,
    /// Mask password input with bullets
    #[serde(default = "default_true")]
    pub mask_passwords: bool,
    #[serde(default = "default_true")]
    pub show_strength_meter: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            tick_rate_ms: 100,
            mask_passwords: true,
            show_strength_meter: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to log to file in TUI mode (false = stderr for debugging)
    #[serde(default = "default_true")]
    pub to_file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: true,
        }
    }
}

impl Config {
    /// Project-local config file
    pub fn local_config_path() -> PathBuf {
        PathBuf::from(".regwizard/config.toml")
    }

    pub fn load(config_path: Option<&str>) -> Result<Self> {
        // Embedded defaults so the wizard runs without any config file
        let defaults = Config::default();
        let defaults_json =
            serde_json::to_string(&defaults).context("Failed to serialize default config")?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        let local_config = Self::local_config_path();
        if local_config.exists() {
            builder = builder.add_source(config::File::from(local_config));
        }

        // User config in ~/.config/regwizard/ (optional global overrides)
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("regwizard").join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        // Explicit config file (CLI override)
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment variables, e.g. REGWIZARD__API__BASE_URL
        builder = builder.add_source(
            config::Environment::with_prefix("REGWIZARD")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to load configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Save config to .regwizard/config.toml
    pub fn save(&self) -> Result<()> {
        let config_path = Self::local_config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_str =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        std::fs::write(&config_path, toml_str).context("Failed to write config file")?;

        Ok(())
    }

    /// Get absolute path to state directory
    pub fn state_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.paths.state);
        if path.is_absolute() {
            path
        } else {
            std::env::current_dir().unwrap_or_default().join(path)
        }
    }

    /// Get absolute path to logs directory
    pub fn logs_path(&self) -> PathBuf {
        self.state_path().join("logs")
    }

    pub fn tick_rate(&self) -> Duration {
        Duration::from_millis(self.ui.tick_rate_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            location: LocationConfig::default(),
            availability: AvailabilityConfig::default(),
            validation: ValidationConfig::default(),
            submission: SubmissionConfig::default(),
            draft: DraftConfig::default(),
            paths: PathsConfig::default(),
            ui: UiConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.mode, ApiMode::Mock);
        assert_eq!(config.api.base_url, "http://localhost:8080/api");
        assert_eq!(config.location.cache_ttl(), chrono::Duration::hours(24));
        assert_eq!(config.availability.debounce(), Duration::from_millis(500));
        assert_eq!(config.submission.timeout(), Duration::from_secs(30));
        assert!(!config.validation.email_domain_check);
        assert!(config.draft.enabled);
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
[api]
mode = "http"
base_url = "https://register.example.com/api"

[validation]
email_domain_check = true

[location]
source = "static"
cache_ttl_hours = 6
"#,
        )
        .unwrap();

        let config = Config::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.api.mode, ApiMode::Http);
        assert_eq!(config.api.base_url, "https://register.example.com/api");
        assert!(config.validation.email_domain_check);
        assert_eq!(config.location.source, LocationSource::Static);
        assert_eq!(config.location.cache_ttl_hours, 6);
        // untouched sections keep their defaults
        assert_eq!(config.availability.debounce_ms, 500);
        assert_eq!(config.paths.state, ".regwizard");
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.location.countries_url, config.location.countries_url);
        assert_eq!(parsed.ui.tick_rate_ms, config.ui.tick_rate_ms);
    }

    #[test]
    fn test_relative_state_path_is_absolutized() {
        let config = Config::default();
        assert!(config.state_path().is_absolute());
        assert!(config.logs_path().ends_with(".regwizard/logs"));
    }
}
