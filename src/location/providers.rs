//! Location providers

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::env;
use std::time::Duration;
use tracing::{debug, warn};

use super::{fallback, Country, LocationProvider, Region};
use crate::api::error::ApiError;
use crate::config::LocationConfig;

const COUNTRIES_PROVIDER: &str = "restcountries";
const REGIONS_PROVIDER: &str = "geodb";

/// GeoDB free tier caps page size at 10
const REGIONS_PAGE_LIMIT: u32 = 10;

#[derive(Debug, Deserialize)]
struct CountryName {
    common: String,
}

#[derive(Debug, Deserialize)]
struct CountryResponse {
    name: CountryName,
    cca2: String,
    #[serde(default)]
    tld: Vec<String>,
    #[serde(default)]
    flag: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RegionsResponse {
    data: Vec<RegionResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegionResponse {
    name: String,
    iso_code: String,
}

/// restcountries.com for countries, GeoDB (RapidAPI) for regions
pub struct RestCountriesProvider {
    client: reqwest::Client,
    countries_url: String,
    regions_url: String,
    geodb_host: String,
    api_key: Option<String>,
    static_regions_fallback: bool,
    max_retries: usize,
}

impl RestCountriesProvider {
    /// Create a provider; the GeoDB key is read from `config.geodb_key_env`
    pub fn from_config(config: &LocationConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("regwizard/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| ApiError::network(COUNTRIES_PROVIDER, e.to_string()))?;

        let api_key = env::var(&config.geodb_key_env)
            .ok()
            .filter(|k| !k.is_empty());

        Ok(Self {
            client,
            countries_url: config.countries_url.clone(),
            regions_url: config.regions_url.clone(),
            geodb_host: config.geodb_host.clone(),
            api_key,
            static_regions_fallback: config.static_regions_fallback,
            max_retries: config.max_retries,
        })
    }

    /// Check if a GeoDB key was found in the environment
    pub fn has_regions_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn retry_strategy(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(10))
            .with_max_times(self.max_retries)
    }

    fn regions_url_for(&self, country_code: &str) -> String {
        self.regions_url.replace("{code}", country_code)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        provider: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::network(provider, e.to_string()))?;

        let status = response.status();
        match status.as_u16() {
            200..=299 => {}
            401 => return Err(ApiError::unauthorized(provider)),
            403 => return Err(ApiError::forbidden(provider)),
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                return Err(ApiError::rate_limited(provider, retry_after));
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                return Err(ApiError::http(provider, status.as_u16(), body));
            }
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::decode(provider, e.to_string()))
    }
}

#[async_trait]
impl LocationProvider for RestCountriesProvider {
    fn name(&self) -> &str {
        COUNTRIES_PROVIDER
    }

    async fn list_countries(&self) -> Result<Vec<Country>, ApiError> {
        let op = || async {
            self.get_json::<Vec<CountryResponse>>(
                COUNTRIES_PROVIDER,
                self.client.get(&self.countries_url),
            )
            .await
        };

        let raw = op
            .retry(self.retry_strategy())
            .when(ApiError::is_transient)
            .notify(|err, dur| {
                warn!("Retrying country list after {:?}: {}", dur, err);
            })
            .await?;

        let mut countries: Vec<Country> = raw
            .into_iter()
            .map(|c| Country {
                code: c.cca2,
                name: c.name.common,
                tlds: c.tld,
                flag: c.flag.filter(|f| !f.is_empty()),
            })
            .collect();
        countries.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(count = countries.len(), "Fetched countries");
        Ok(countries)
    }

    async fn list_regions(&self, country_code: &str) -> Result<Vec<Region>, ApiError> {
        let Some(api_key) = &self.api_key else {
            if self.static_regions_fallback {
                debug!(
                    country = country_code,
                    "No GeoDB key configured, serving built-in regions"
                );
                return Ok(fallback::regions(country_code));
            }
            return Err(ApiError::not_configured(REGIONS_PROVIDER));
        };

        let url = self.regions_url_for(country_code);
        let op = || async {
            let request = self
                .client
                .get(&url)
                .header("x-rapidapi-host", &self.geodb_host)
                .header("x-rapidapi-key", api_key)
                .query(&[("limit", REGIONS_PAGE_LIMIT), ("offset", 0)]);
            self.get_json::<RegionsResponse>(REGIONS_PROVIDER, request)
                .await
        };

        let raw = op
            .retry(self.retry_strategy())
            .when(ApiError::is_transient)
            .notify(|err, dur| {
                warn!("Retrying regions for {} after {:?}: {}", country_code, dur, err);
            })
            .await?;

        Ok(raw
            .data
            .into_iter()
            .map(|r| Region {
                code: r.iso_code,
                name: r.name,
                country_code: country_code.to_string(),
            })
            .collect())
    }
}

/// Serves the built-in table without touching the network
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticLocationProvider;

#[async_trait]
impl LocationProvider for StaticLocationProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn list_countries(&self) -> Result<Vec<Country>, ApiError> {
        Ok(fallback::countries())
    }

    async fn list_regions(&self, country_code: &str) -> Result<Vec<Region>, ApiError> {
        Ok(fallback::regions(country_code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_country_response_mapping() {
        let body = r#"[
            {"name": {"common": "Japan", "official": "Japan"}, "cca2": "JP", "tld": [".jp"], "flag": "🇯🇵"},
            {"name": {"common": "Antarctica"}, "cca2": "AQ"}
        ]"#;
        let parsed: Vec<CountryResponse> = serde_json::from_str(body).unwrap();
        assert_eq!(parsed[0].cca2, "JP");
        assert_eq!(parsed[0].tld, vec![".jp"]);
        assert!(parsed[1].tld.is_empty());
        assert!(parsed[1].flag.is_none());
    }

    #[test]
    fn test_region_response_mapping() {
        let body = r#"{"data": [{"name": "Ontario", "isoCode": "ON", "countryCode": "CA"}], "metadata": {}}"#;
        let parsed: RegionsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data[0].iso_code, "ON");
    }

    #[test]
    fn test_regions_url_template() {
        let provider = RestCountriesProvider::from_config(&LocationConfig::default()).unwrap();
        assert_eq!(
            provider.regions_url_for("CA"),
            "https://wft-geo-db.p.rapidapi.com/v1/geo/countries/CA/regions"
        );
    }

    #[tokio::test]
    async fn test_missing_key_falls_back_or_errors() {
        let mut config = LocationConfig {
            geodb_key_env: "REGWIZARD_TEST_UNSET_GEODB_KEY".to_string(),
            ..LocationConfig::default()
        };
        let provider = RestCountriesProvider::from_config(&config).unwrap();
        assert!(!provider.has_regions_key());
        assert_eq!(provider.list_regions("US").await.unwrap().len(), 8);

        config.static_regions_fallback = false;
        let provider = RestCountriesProvider::from_config(&config).unwrap();
        let err = provider.list_regions("US").await.unwrap_err();
        assert_eq!(err, ApiError::not_configured("geodb"));
    }

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticLocationProvider;
        assert_eq!(provider.list_countries().await.unwrap().len(), 8);
        assert_eq!(provider.list_regions("UK").await.unwrap().len(), 4);
    }
}
