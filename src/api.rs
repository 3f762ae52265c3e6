use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::CatalogError;
use crate::fingerprint::ContentMode;
use crate::merge::Identified;
use crate::preprocessing::{self, RawHomePage, RawLegacySearch, RawSearchPage, RawSectionPage};

/// Concrete media type of a catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
        }
    }

    /// Accepts the aliases different catalog endpoints use
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "movie" | "film" => Some(MediaType::Movie),
            "tv" | "series" | "show" => Some(MediaType::Tv),
            _ => None,
        }
    }
}

/// Media-type slice of a surface; each one has its own cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    #[default]
    Mixed,
    Movie,
    Tv,
}

impl Partition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Mixed => "all",
            Partition::Movie => "movie",
            Partition::Tv => "tv",
        }
    }

    /// Concrete media types a request for this partition fans out to
    pub fn media_types(&self) -> &'static [MediaType] {
        match self {
            Partition::Mixed => &[MediaType::Movie, MediaType::Tv],
            Partition::Movie => &[MediaType::Movie],
            Partition::Tv => &[MediaType::Tv],
        }
    }

    pub fn single(&self) -> Option<MediaType> {
        match self {
            Partition::Mixed => None,
            Partition::Movie => Some(MediaType::Movie),
            Partition::Tv => Some(MediaType::Tv),
        }
    }

    pub fn includes(&self, media_type: MediaType) -> bool {
        self.media_types().contains(&media_type)
    }
}

impl From<MediaType> for Partition {
    fn from(media_type: MediaType) -> Self {
        match media_type {
            MediaType::Movie => Partition::Movie,
            MediaType::Tv => Partition::Tv,
        }
    }
}

impl std::str::FromStr for Partition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "mixed" => Ok(Partition::Mixed),
            other => MediaType::parse(other)
                .map(Partition::from)
                .ok_or_else(|| format!("unknown media type: {}", s)),
        }
    }
}

/// Identity of a catalog entry; unique within any displayed list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemKey {
    pub media_type: MediaType,
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub media_type: MediaType,
    pub id: u64,
    pub title: String,
    pub poster_path: Option<String>,
    pub release_date: Option<NaiveDate>,
    /// Only populated by search endpoints
    pub popularity: Option<f64>,
}

impl ContentItem {
    pub fn key(&self) -> ItemKey {
        ItemKey {
            media_type: self.media_type,
            id: self.id,
        }
    }
}

impl Identified for ContentItem {
    type Key = ItemKey;

    fn identity(&self) -> ItemKey {
        self.key()
    }
}

/// How a paginated resource continues; a section carries at most one
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Continuation {
    Page(u32),
    Cursor(String),
}

/// A named row of the home feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub title: String,
    pub items: Vec<ContentItem>,
    pub continuation: Option<Continuation>,
    /// Last page of items loaded into this section
    pub page: u32,
    pub total_pages: Option<u32>,
}

impl Section {
    pub fn has_more(&self) -> bool {
        self.next_continuation().is_some()
    }

    /// Where the next page of this section's items comes from
    pub fn next_continuation(&self) -> Option<Continuation> {
        if let Some(continuation) = &self.continuation {
            return Some(continuation.clone());
        }
        match self.total_pages {
            Some(total) if total > self.page => Some(Continuation::Page(self.page + 1)),
            _ => None,
        }
    }
}

impl Identified for Section {
    type Key = String;

    fn identity(&self) -> String {
        self.id.clone()
    }
}

/// Common shape of every page-number style response
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    pub next_page: Option<u32>,
    pub total_pages: Option<u32>,
}

/// One page of items belonging to a single home section
#[derive(Debug, Clone, PartialEq)]
pub struct SectionPage {
    pub items: Vec<ContentItem>,
    pub continuation: Option<Continuation>,
    pub total_pages: Option<u32>,
}

/// Normalized filter parameters sent with every catalog request
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CatalogFilters {
    pub provider_ids: Vec<u32>,
    pub countries: Vec<String>,
    pub content_mode: ContentMode,
    pub vpn: bool,
    pub hide_watched: bool,
}

impl CatalogFilters {
    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if !self.provider_ids.is_empty() {
            let ids: Vec<String> = self.provider_ids.iter().map(|id| id.to_string()).collect();
            pairs.push(("providers", ids.join(",")));
        }
        if !self.countries.is_empty() {
            pairs.push(("countries", self.countries.join(",")));
        }
        pairs.push(("monetization", self.content_mode.monetization_types().join(",")));
        if self.vpn {
            pairs.push(("vpn", "true".to_string()));
        }
        if self.hide_watched {
            pairs.push(("hide_watched", "true".to_string()));
        }
        pairs
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HomePageRequest {
    pub page: u32,
    pub page_size: usize,
    pub partition: Partition,
    pub filters: CatalogFilters,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchPageRequest {
    pub query: String,
    pub page: u32,
    pub limit: usize,
    pub media_type: MediaType,
    pub filters: CatalogFilters,
}

/// Remote catalog contract consumed by both surfaces
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// One page of home sections
    async fn fetch_home_page(&self, request: &HomePageRequest) -> Result<PageResult<Section>, CatalogError>;

    /// Continue a single section by cursor or page number
    async fn fetch_section(
        &self,
        section_id: &str,
        continuation: &Continuation,
        partition: Partition,
        filters: &CatalogFilters,
    ) -> Result<SectionPage, CatalogError>;

    /// One page of search results for a single media type
    async fn fetch_search_page(&self, request: &SearchPageRequest) -> Result<PageResult<ContentItem>, CatalogError>;

    /// Non-paginated search endpoint; the result is the whole answer
    async fn fetch_search_legacy(&self, query: &str, limit: usize) -> Result<Vec<ContentItem>, CatalogError>;
}

/// Bound a catalog call by a fixed deadline
pub async fn with_deadline<T, F>(deadline: Duration, target: &str, fut: F) -> Result<T, CatalogError>
where
    F: Future<Output = Result<T, CatalogError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(CatalogError::Timeout(target.to_string(), deadline.as_secs())),
    }
}

/// HTTP client for the catalog service
#[derive(Debug, Clone)]
pub struct CatalogClient {
    pub base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl CatalogClient {
    pub fn new(base_url: String, api_key: Option<String>, timeout: Duration) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();

        let client = reqwest::Client::builder()
            .user_agent(concat!("watchscout/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url,
            api_key,
            timeout,
            client,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        mut params: Vec<(&'static str, String)>,
    ) -> Result<T, CatalogError> {
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "catalog request");

        let resp = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| self.classify(path, e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.classify(path, e))?;
        if !status.is_success() {
            return Err(CatalogError::from_status(status.as_u16(), body));
        }
        Ok(serde_json::from_str(&body)?)
    }

    fn classify(&self, path: &str, err: reqwest::Error) -> CatalogError {
        if err.is_timeout() {
            CatalogError::Timeout(path.to_string(), self.timeout.as_secs())
        } else {
            CatalogError::from(err)
        }
    }
}

#[async_trait]
impl CatalogSource for CatalogClient {
    async fn fetch_home_page(&self, request: &HomePageRequest) -> Result<PageResult<Section>, CatalogError> {
        let mut params = vec![
            ("page", request.page.to_string()),
            ("page_size", request.page_size.to_string()),
            ("media_type", request.partition.as_str().to_string()),
        ];
        params.extend(request.filters.query_pairs());

        let raw: RawHomePage = self.get_json("/api/home", params).await?;
        Ok(preprocessing::normalize_home_page(raw, request.page, request.partition))
    }

    async fn fetch_section(
        &self,
        section_id: &str,
        continuation: &Continuation,
        partition: Partition,
        filters: &CatalogFilters,
    ) -> Result<SectionPage, CatalogError> {
        let mut params = vec![("media_type", partition.as_str().to_string())];
        match continuation {
            Continuation::Cursor(cursor) => params.push(("cursor", cursor.clone())),
            Continuation::Page(page) => params.push(("page", page.to_string())),
        }
        params.extend(filters.query_pairs());

        let path = format!("/api/home/sections/{}", section_id);
        let raw: RawSectionPage = self.get_json(&path, params).await?;
        Ok(preprocessing::normalize_section_page(raw, continuation, partition.single()))
    }

    async fn fetch_search_page(&self, request: &SearchPageRequest) -> Result<PageResult<ContentItem>, CatalogError> {
        let mut params = vec![
            ("q", request.query.clone()),
            ("page", request.page.to_string()),
            ("limit", request.limit.to_string()),
            ("media_type", request.media_type.as_str().to_string()),
        ];
        params.extend(request.filters.query_pairs());

        let raw: RawSearchPage = self.get_json("/api/search/multi", params).await?;
        Ok(preprocessing::normalize_search_page(raw, request.page, request.limit, request.media_type))
    }

    async fn fetch_search_legacy(&self, query: &str, limit: usize) -> Result<Vec<ContentItem>, CatalogError> {
        let params = vec![("q", query.to_string()), ("limit", limit.to_string())];
        let raw: RawLegacySearch = self.get_json("/api/search", params).await?;
        Ok(preprocessing::normalize_legacy_results(raw, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(page: u32, continuation: Option<Continuation>, total_pages: Option<u32>) -> Section {
        Section {
            id: "trending".to_string(),
            title: "Trending".to_string(),
            items: Vec::new(),
            continuation,
            page,
            total_pages,
        }
    }

    #[test]
    fn test_section_has_more() {
        assert!(section(1, Some(Continuation::Cursor("abc".into())), None).has_more());
        assert!(section(1, None, Some(3)).has_more());
        assert!(!section(1, None, Some(1)).has_more());
        assert!(!section(3, None, Some(3)).has_more());
        assert!(!section(1, None, None).has_more());
        assert_eq!(
            section(2, None, Some(3)).next_continuation(),
            Some(Continuation::Page(3))
        );
    }

    #[test]
    fn test_partition_parsing() {
        assert_eq!("all".parse::<Partition>(), Ok(Partition::Mixed));
        assert_eq!("series".parse::<Partition>(), Ok(Partition::Tv));
        assert_eq!("Film".parse::<Partition>(), Ok(Partition::Movie));
        assert!("music".parse::<Partition>().is_err());
        assert_eq!(Partition::Mixed.media_types().len(), 2);
    }

    #[tokio::test]
    async fn test_deadline_maps_to_timeout() {
        let result: Result<(), CatalogError> = with_deadline(Duration::from_millis(10), "/api/home", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(CatalogError::Timeout(_, _))));
    }
}
