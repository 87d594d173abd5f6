//! Catalog configuration.
//!
//! The hosting layer builds a [`CatalogConfig`] once at startup and resolves
//! the endpoint from it; nothing in the cache looks at the environment at call
//! time.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CatalogError, CatalogResult};

/// Base origin candidates, first non-empty value wins.
pub const BASE_URL_VARS: &[&str] = &["ERRCAT_BASE_URL", "ERRCAT_ORIGIN", "APP_BASE_URL"];

/// Origin used when none of [`BASE_URL_VARS`] is set.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Path of the catalog list route on the host application.
pub const DEFAULT_CATALOG_PATH: &str = "/api/error-catalog";

/// Default fetch timeout (10 seconds).
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default snapshot TTL (24 hours).
pub const DEFAULT_TTL_SECS: u64 = 24 * 60 * 60;

/// Catalog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Origin the catalog path is resolved against.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Relative path of the catalog route, or an absolute URL.
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum snapshot age in seconds.
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,

    /// SQLite database for the durable snapshot.
    #[serde(default)]
    pub store_path: Option<PathBuf>,

    /// Whether to use the durable store at all.
    #[serde(default = "default_persist")]
    pub persist: bool,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_catalog_path() -> String {
    DEFAULT_CATALOG_PATH.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_ttl() -> u64 {
    DEFAULT_TTL_SECS
}

fn default_persist() -> bool {
    true
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            catalog_path: default_catalog_path(),
            timeout_secs: default_timeout(),
            ttl_secs: default_ttl(),
            store_path: None,
            persist: default_persist(),
        }
    }
}

impl CatalogConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `ERRCAT_BASE_URL`, `ERRCAT_ORIGIN`, `APP_BASE_URL` | Base origin (first set wins) |
    /// | `ERRCAT_CATALOG_PATH` | Catalog path or absolute URL |
    /// | `ERRCAT_TIMEOUT_SECS` | Request timeout in seconds |
    /// | `ERRCAT_TTL_SECS` | Snapshot TTL in seconds |
    /// | `ERRCAT_STORE_PATH` | SQLite database path |
    /// | `ERRCAT_NO_STORE` | Disable the durable store |
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Self {
            base_url: BASE_URL_VARS
                .iter()
                .find_map(|name| non_empty(name))
                .unwrap_or_else(default_base_url),
            catalog_path: non_empty("ERRCAT_CATALOG_PATH").unwrap_or_else(default_catalog_path),
            timeout_secs: non_empty("ERRCAT_TIMEOUT_SECS")
                .and_then(|v| v.trim().parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or_else(default_timeout),
            ttl_secs: non_empty("ERRCAT_TTL_SECS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or_else(default_ttl),
            store_path: non_empty("ERRCAT_STORE_PATH").map(PathBuf::from),
            persist: !non_empty("ERRCAT_NO_STORE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    /// Set the base origin.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the catalog path (or absolute URL).
    pub fn with_catalog_path(mut self, path: impl Into<String>) -> Self {
        self.catalog_path = path.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_ttl_secs(mut self, secs: u64) -> Self {
        self.ttl_secs = secs;
        self
    }

    /// Use a specific database file.
    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    /// Run without the durable store.
    pub fn without_persistence(mut self) -> Self {
        self.persist = false;
        self
    }

    /// Resolve the absolute catalog URL.
    pub fn endpoint(&self) -> CatalogResult<Url> {
        if let Ok(url) = Url::parse(&self.catalog_path) {
            if url.has_host() {
                return Ok(url);
            }
        }

        let joined = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.catalog_path.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|e| CatalogError::Config {
            message: format!("invalid catalog endpoint {:?}: {}", joined, e),
        })
    }

    /// Fetch timeout. Zero means the default.
    pub fn timeout(&self) -> Duration {
        match self.timeout_secs {
            0 => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            secs => Duration::from_secs(secs),
        }
    }

    pub fn ttl(&self) -> chrono::Duration {
        let secs = i64::try_from(self.ttl_secs)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1000);
        chrono::Duration::seconds(secs)
    }

    /// Database path to open, if persistence is enabled.
    ///
    /// Falls back to `<cache dir>/errcat/catalog.db`.
    pub fn resolved_store_path(&self) -> Option<PathBuf> {
        if !self.persist {
            return None;
        }
        self.store_path.clone().or_else(default_store_path)
    }
}

/// Default database location.
pub fn default_store_path() -> Option<PathBuf> {
    dirs::cache_dir()
        .or_else(dirs::home_dir)
        .map(|base| base.join("errcat").join("catalog.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = CatalogConfig::from_lookup(lookup(&[]));
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.catalog_path, DEFAULT_CATALOG_PATH);
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.ttl(), chrono::Duration::hours(24));
        assert!(config.persist);
        assert_eq!(
            config.endpoint().unwrap().as_str(),
            "http://localhost:3000/api/error-catalog"
        );
    }

    #[test]
    fn test_base_url_precedence() {
        let config = CatalogConfig::from_lookup(lookup(&[
            ("ERRCAT_ORIGIN", "https://second.example"),
            ("APP_BASE_URL", "https://third.example"),
        ]));
        assert_eq!(config.base_url, "https://second.example");

        let config = CatalogConfig::from_lookup(lookup(&[
            ("ERRCAT_BASE_URL", "https://first.example"),
            ("ERRCAT_ORIGIN", "https://second.example"),
        ]));
        assert_eq!(config.base_url, "https://first.example");
    }

    #[test]
    fn test_empty_candidate_is_skipped() {
        let config = CatalogConfig::from_lookup(lookup(&[
            ("ERRCAT_BASE_URL", "  "),
            ("APP_BASE_URL", "https://third.example"),
        ]));
        assert_eq!(config.base_url, "https://third.example");
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = CatalogConfig::from_lookup(lookup(&[
            ("ERRCAT_TIMEOUT_SECS", "soon"),
            ("ERRCAT_TTL_SECS", "-5"),
        ]));
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.ttl_secs, DEFAULT_TTL_SECS);
    }

    #[test]
    fn test_zero_timeout_uses_default() {
        let config = CatalogConfig::default().with_timeout_secs(0);
        assert_eq!(config.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        let config: CatalogConfig = serde_json::from_str(r#"{"timeout_secs": 0}"#).unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn test_no_store_flag() {
        let config = CatalogConfig::from_lookup(lookup(&[
            ("ERRCAT_NO_STORE", "true"),
            ("ERRCAT_STORE_PATH", "/tmp/x.db"),
        ]));
        assert!(!config.persist);
        assert!(config.resolved_store_path().is_none());
    }

    #[test]
    fn test_endpoint_join_keeps_base_path() {
        let config = CatalogConfig::default()
            .with_base_url("https://bank.example/onboarding/")
            .with_catalog_path("api/error-catalog");
        assert_eq!(
            config.endpoint().unwrap().as_str(),
            "https://bank.example/onboarding/api/error-catalog"
        );
    }

    #[test]
    fn test_absolute_catalog_path_wins() {
        let config = CatalogConfig::default()
            .with_base_url("https://ignored.example")
            .with_catalog_path("https://bpms.example/catalog");
        assert_eq!(
            config.endpoint().unwrap().as_str(),
            "https://bpms.example/catalog"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let config = CatalogConfig::default().with_base_url("not a url");
        assert!(matches!(
            config.endpoint(),
            Err(CatalogError::Config { .. })
        ));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: CatalogConfig =
            serde_json::from_str(r#"{"base_url": "https://bank.example"}"#).unwrap();
        assert_eq!(config.base_url, "https://bank.example");
        assert_eq!(config.ttl_secs, DEFAULT_TTL_SECS);
        assert!(config.persist);
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env() {
        std::env::set_var("ERRCAT_BASE_URL", "https://env.example");
        std::env::set_var("ERRCAT_TTL_SECS", "60");
        let config = CatalogConfig::from_env();
        std::env::remove_var("ERRCAT_BASE_URL");
        std::env::remove_var("ERRCAT_TTL_SECS");

        assert_eq!(config.base_url, "https://env.example");
        assert_eq!(config.ttl_secs, 60);
    }
}
