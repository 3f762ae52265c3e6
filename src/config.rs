use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::feed::{FeedOptions, DEFAULT_HOME_PAGE_SIZE};
use crate::fingerprint::{ContentMode, FilterPreferences, Identity};
use crate::search::{
    SearchOptions, DEFAULT_BATCH_SIZE, DEFAULT_FALLBACK_LIMIT, DEFAULT_INITIAL_TARGET,
    DEFAULT_LEGACY_CAP, DEFAULT_PAGE_LIMIT, DEFAULT_SORT_POOL_FLOOR,
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const BASE_URL_ENV: &str = "WATCHSCOUT_BASE_URL";
const API_KEY_ENV: &str = "WATCHSCOUT_API_KEY";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_home_page_size() -> usize {
    DEFAULT_HOME_PAGE_SIZE
}
fn default_initial_target() -> usize {
    DEFAULT_INITIAL_TARGET
}
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_page_limit() -> usize {
    DEFAULT_PAGE_LIMIT
}
fn default_fallback_limit() -> usize {
    DEFAULT_FALLBACK_LIMIT
}
fn default_legacy_cap() -> usize {
    DEFAULT_LEGACY_CAP
}
fn default_sort_pool_floor() -> usize {
    DEFAULT_SORT_POOL_FLOOR
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_home_page_size")]
    pub home_page_size: usize,
    #[serde(default = "default_initial_target")]
    pub search_initial_target: usize,
    #[serde(default = "default_batch_size")]
    pub search_batch_size: usize,
    #[serde(default = "default_page_limit")]
    pub search_page_limit: usize,
    #[serde(default = "default_fallback_limit")]
    pub search_fallback_limit: usize,
    #[serde(default = "default_legacy_cap")]
    pub legacy_result_cap: usize,
    #[serde(default = "default_sort_pool_floor")]
    pub sort_pool_floor: usize,

    /// Signed-in user id; absent for guests
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub provider_ids: Vec<u32>,
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default)]
    pub content_mode: ContentMode,
    #[serde(default)]
    pub vpn: bool,
    #[serde(default)]
    pub hide_watched: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            request_timeout_secs: default_timeout_secs(),
            home_page_size: default_home_page_size(),
            search_initial_target: default_initial_target(),
            search_batch_size: default_batch_size(),
            search_page_limit: default_page_limit(),
            search_fallback_limit: default_fallback_limit(),
            legacy_result_cap: default_legacy_cap(),
            sort_pool_floor: default_sort_pool_floor(),
            identity: None,
            provider_ids: Vec::new(),
            countries: Vec::new(),
            content_mode: ContentMode::default(),
            vpn: false,
            hide_watched: false,
        }
    }
}

impl AppConfig {
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "watchscout", "watchscout")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Load from the platform config dir, falling back to defaults, then
    /// apply environment overrides
    pub fn load() -> Result<Self, anyhow::Error> {
        let mut config = match Self::config_path() {
            Some(path) => Self::load_from(&path)?,
            None => AppConfig::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, anyhow::Error> {
        if !path.exists() {
            return Ok(AppConfig::default());
        }
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), anyhow::Error> {
        if let Some(path) = Self::config_path() {
            self.save_to(&path)?;
        }
        Ok(())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), anyhow::Error> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var(BASE_URL_ENV).ok(),
            std::env::var(API_KEY_ENV).ok(),
        );
    }

    fn apply_overrides(&mut self, base_url: Option<String>, api_key: Option<String>) {
        if let Some(url) = base_url.filter(|v| !v.trim().is_empty()) {
            self.base_url = url.trim().to_string();
        }
        if let Some(key) = api_key.filter(|v| !v.trim().is_empty()) {
            self.api_key = Some(key.trim().to_string());
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn identity(&self) -> Identity {
        Identity::from_user(self.identity.as_deref())
    }

    pub fn preferences(&self) -> FilterPreferences {
        FilterPreferences {
            provider_ids: self.provider_ids.clone(),
            countries: self.countries.clone(),
            content_mode: self.content_mode,
            vpn: self.vpn,
            hide_watched: self.hide_watched,
        }
    }

    pub fn set_preferences(&mut self, preferences: &FilterPreferences) {
        self.provider_ids = preferences.provider_ids.clone();
        self.countries = preferences.countries.clone();
        self.content_mode = preferences.content_mode;
        self.vpn = preferences.vpn;
        self.hide_watched = preferences.hide_watched;
    }

    pub fn feed_options(&self) -> FeedOptions {
        FeedOptions {
            page_size: self.home_page_size.max(1),
            request_timeout: self.request_timeout(),
        }
    }

    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            initial_target: self.search_initial_target.max(1),
            batch_size: self.search_batch_size.max(1),
            page_limit: self.search_page_limit.max(1),
            fallback_limit: self.search_fallback_limit.max(1),
            legacy_cap: self.legacy_result_cap.max(1),
            sort_pool_floor: self.sort_pool_floor,
            request_timeout: self.request_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.search_page_limit, 40);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.identity = Some("u-42".to_string());
        config.countries = vec!["us".to_string(), "GB".to_string()];
        config.content_mode = ContentMode::Free;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.identity(), Identity::User("u-42".to_string()));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"base_url": "https://catalog.example", "vpn": true}"#).unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.base_url, "https://catalog.example");
        assert!(config.vpn);
        assert_eq!(config.home_page_size, 6);
        assert_eq!(config.identity(), Identity::Guest);
    }

    #[test]
    fn test_overrides_ignore_blank_values() {
        let mut config = AppConfig::default();
        config.apply_overrides(Some("  ".to_string()), Some(" secret ".to_string()));
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.api_key.as_deref(), Some("secret"));
    }
}
