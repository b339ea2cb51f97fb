use crate::{
    discovery::DiscoveryCache,
    repository::{default_http_timeout, default_root_url},
};
use anyhow::anyhow;
use config::{Config, File};
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};
use url::Url;

pub const CONFIG_PATH_ENV: &str = "SERVICEMANAGEMENT_CONFIG";
pub const ENV_PREFIX: &str = "SERVICEMANAGEMENT";

/// Global configuration shared by the API clients.
#[serde_as]
#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Rate limits keyed by api name, e.g. `servicemanagement`.
    pub api_rate_limits: HashMap<String, RateLimitSettings>,
    pub cache_discovery: bool,
    pub root_url: Url,
    pub discovery_url: Option<Url>,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub http_timeout: Duration,
    pub max_retries: u32,
    pub access_token: Option<String>,

    /// Shared discovery document cache. Cannot be set from a config source.
    #[serde(skip)]
    pub cache: Option<Arc<dyn DiscoveryCache>>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RateLimitSettings {
    pub max_calls: Option<u32>,
    #[serde(default = "default_quota_period")]
    pub period: f64,
}

fn default_quota_period() -> f64 {
    100.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_rate_limits: HashMap::new(),
            cache_discovery: false,
            root_url: default_root_url(),
            discovery_url: None,
            http_timeout: default_http_timeout(),
            max_retries: 0,
            access_token: None,
            cache: None,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_rate_limits", &self.api_rate_limits)
            .field("cache_discovery", &self.cache_discovery)
            .field("root_url", &self.root_url.as_str())
            .field("discovery_url", &self.discovery_url.as_ref().map(Url::as_str))
            .field("http_timeout", &self.http_timeout)
            .field("max_retries", &self.max_retries)
            .field("cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl Settings {
    /// Reads the file named by `SERVICEMANAGEMENT_CONFIG` (if set), overlaid by
    /// `SERVICEMANAGEMENT__*` environment variables.
    pub fn new() -> anyhow::Result<Self> {
        let config_path = std::env::var(CONFIG_PATH_ENV).ok();
        Self::build(config_path.as_deref())
    }

    pub fn build(config_path: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = Config::builder();
        if let Some(config_path) = config_path {
            builder = builder.add_source(File::with_name(config_path));
        };
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()?
            .try_deserialize()
            .map_err(|err| anyhow!(err))
    }

    pub fn with_cache(mut self, cache: Arc<dyn DiscoveryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Returns `(max_calls, period)` configured for `api_name`.
    ///
    /// A missing entry leaves `max_calls` unset, which disables rate limiting.
    pub fn rate_limiter_config(&self, api_name: &str) -> (Option<u32>, f64) {
        match self.api_rate_limits.get(api_name) {
            Some(limits) => (limits.max_calls, limits.period),
            None => {
                tracing::warn!(api_name, "no rate limit configured, requests are not throttled");
                (None, default_quota_period())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{io::Write, str::FromStr};

    fn config_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp file");
        file.write_all(content.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn defaults_without_sources() {
        let settings = Settings::default();
        assert_eq!(
            settings.root_url,
            Url::from_str("https://servicemanagement.googleapis.com/").unwrap()
        );
        assert_eq!(settings.http_timeout, Duration::from_secs(30));
        assert!(!settings.cache_discovery);
        assert_eq!(settings.rate_limiter_config("servicemanagement"), (None, 100.0));
    }

    #[test]
    fn reads_config_file() {
        let file = config_file(
            r#"
            cache_discovery = true
            http_timeout = 10
            max_retries = 2
            root_url = "http://localhost:8080/"

            [api_rate_limits.servicemanagement]
            max_calls = 5
            period = 1.5

            [api_rate_limits.compute]
            max_calls = 20
            "#,
        );
        let settings = Settings::build(file.path().to_str()).unwrap();

        assert!(settings.cache_discovery);
        assert_eq!(settings.http_timeout, Duration::from_secs(10));
        assert_eq!(settings.max_retries, 2);
        assert_eq!(settings.root_url.as_str(), "http://localhost:8080/");
        assert_eq!(settings.rate_limiter_config("servicemanagement"), (Some(5), 1.5));
        assert_eq!(settings.rate_limiter_config("compute"), (Some(20), 100.0));
        assert_eq!(settings.rate_limiter_config("iam"), (None, 100.0));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let file = config_file("cache_discovrey = true\n");
        assert!(Settings::build(file.path().to_str()).is_err());
    }
}
