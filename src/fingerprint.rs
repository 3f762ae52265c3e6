use serde::{Deserialize, Serialize};
use std::fmt;

use crate::api::CatalogFilters;
use crate::preprocessing::{normalize_countries, normalize_provider_ids};

/// Who is browsing; guests share one cache identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Identity {
    #[default]
    Guest,
    User(String),
}

impl Identity {
    pub fn from_user(user: Option<&str>) -> Self {
        match user.map(str::trim) {
            Some(id) if !id.is_empty() => Identity::User(id.to_string()),
            _ => Identity::Guest,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Guest => write!(f, "guest"),
            Identity::User(id) => write!(f, "user:{}", id),
        }
    }
}

/// Which kinds of availability count as "watchable"
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentMode {
    /// Included with a subscription
    #[default]
    Streaming,
    /// Free or ad-supported only
    Free,
    /// Anything, including rent and buy
    All,
}

impl ContentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentMode::Streaming => "streaming",
            ContentMode::Free => "free",
            ContentMode::All => "all",
        }
    }

    pub fn monetization_types(&self) -> &'static [&'static str] {
        match self {
            ContentMode::Streaming => &["flatrate"],
            ContentMode::Free => &["free", "ads"],
            ContentMode::All => &["flatrate", "free", "ads", "rent", "buy"],
        }
    }
}

impl std::str::FromStr for ContentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "streaming" | "subscription" => Ok(ContentMode::Streaming),
            "free" => Ok(ContentMode::Free),
            "all" => Ok(ContentMode::All),
            other => Err(format!("unknown content mode: {}", other)),
        }
    }
}

/// User-selected filters that shape every catalog request
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterPreferences {
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

impl FilterPreferences {
    pub fn catalog_filters(&self) -> CatalogFilters {
        CatalogFilters {
            provider_ids: normalize_provider_ids(&self.provider_ids),
            countries: normalize_countries(&self.countries),
            content_mode: self.content_mode,
            vpn: self.vpn,
            hide_watched: self.hide_watched,
        }
    }

    pub fn fingerprint(&self, identity: &Identity) -> Fingerprint {
        derive_fingerprint(
            identity,
            &self.provider_ids,
            &self.countries,
            self.content_mode,
            self.vpn,
            self.hide_watched,
        )
    }
}

/// Cache key covering every input that changes fetched content
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inputs are normalized and sorted first, so their order never matters
pub fn derive_fingerprint(
    identity: &Identity,
    providers: &[u32],
    countries: &[String],
    content_mode: ContentMode,
    vpn: bool,
    hide_watched: bool,
) -> Fingerprint {
    let providers: Vec<String> = normalize_provider_ids(providers)
        .iter()
        .map(|id| id.to_string())
        .collect();
    let countries = normalize_countries(countries);

    Fingerprint(format!(
        "{}|p={}|c={}|m={}|vpn={}|hw={}",
        identity,
        providers.join(","),
        countries.join(","),
        content_mode.as_str(),
        u8::from(vpn),
        u8::from(hide_watched),
    ))
}
