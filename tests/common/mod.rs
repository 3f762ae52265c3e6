#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use tokio::sync::Notify;

use watchscout_lib::api::{
    CatalogFilters, CatalogSource, ContentItem, Continuation, HomePageRequest, MediaType,
    PageResult, Partition, SearchPageRequest, Section, SectionPage,
};
use watchscout_lib::errors::CatalogError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Gate {
    Home(Partition, u32),
    Search(MediaType, u32),
    Legacy,
}

/// Scripted in-memory catalog. Unscripted requests answer `NotFound`.
/// A gated request records its call, then waits until released.
#[derive(Default)]
pub struct MockCatalog {
    home: Mutex<HashMap<(Partition, u32), Result<PageResult<Section>, CatalogError>>>,
    sections: Mutex<HashMap<(String, Continuation), Result<SectionPage, CatalogError>>>,
    search: Mutex<HashMap<(MediaType, u32, usize), Result<PageResult<ContentItem>, CatalogError>>>,
    legacy: Mutex<Option<Result<Vec<ContentItem>, CatalogError>>>,
    gates: Mutex<HashMap<Gate, Arc<Notify>>>,
    held: Mutex<HashMap<Gate, Arc<Notify>>>,

    pub home_calls: Mutex<Vec<(Partition, u32)>>,
    pub section_calls: Mutex<Vec<(String, Continuation)>>,
    pub search_calls: Mutex<Vec<(MediaType, u32, usize)>>,
    pub legacy_calls: AtomicUsize,
    pub home_completed: AtomicUsize,
}

impl MockCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_home(&self, partition: Partition, page: u32, result: Result<PageResult<Section>, CatalogError>) {
        self.home.lock().insert((partition, page), result);
    }

    pub fn script_section(&self, id: &str, continuation: Continuation, result: Result<SectionPage, CatalogError>) {
        self.sections.lock().insert((id.to_string(), continuation), result);
    }

    pub fn script_search(
        &self,
        media_type: MediaType,
        page: u32,
        limit: usize,
        result: Result<PageResult<ContentItem>, CatalogError>,
    ) {
        self.search.lock().insert((media_type, page, limit), result);
    }

    pub fn script_legacy(&self, result: Result<Vec<ContentItem>, CatalogError>) {
        *self.legacy.lock() = Some(result);
    }

    /// Hold the next matching request open until `release`
    pub fn gate(&self, gate: Gate) {
        self.gates.lock().insert(gate, Arc::new(Notify::new()));
    }

    pub fn release(&self, gate: &Gate) {
        let held = self.held.lock().remove(gate);
        let notify = held.or_else(|| self.gates.lock().get(gate).cloned());
        if let Some(notify) = notify {
            notify.notify_one();
        }
    }

    pub fn home_call_count(&self) -> usize {
        self.home_calls.lock().len()
    }

    pub fn home_calls_for(&self, partition: Partition, page: u32) -> usize {
        self.home_calls
            .lock()
            .iter()
            .filter(|c| **c == (partition, page))
            .count()
    }

    pub fn search_call_count(&self) -> usize {
        self.search_calls.lock().len()
    }

    pub fn legacy_call_count(&self) -> usize {
        self.legacy_calls.load(Ordering::SeqCst)
    }

    /// Only the first request for a gate is held; later ones pass freely
    async fn pass_gate(&self, gate: Gate) {
        let notify = self.gates.lock().remove(&gate);
        if let Some(notify) = notify {
            self.held.lock().insert(gate, notify.clone());
            notify.notified().await;
        }
    }
}

#[async_trait]
impl CatalogSource for MockCatalog {
    async fn fetch_home_page(&self, request: &HomePageRequest) -> Result<PageResult<Section>, CatalogError> {
        let key = (request.partition, request.page);
        self.home_calls.lock().push(key);
        let scripted = self.home.lock().get(&key).cloned();
        self.pass_gate(Gate::Home(request.partition, request.page)).await;
        self.home_completed.fetch_add(1, Ordering::SeqCst);
        scripted.unwrap_or_else(|| Err(CatalogError::NotFound(format!("home page {}", request.page))))
    }

    async fn fetch_section(
        &self,
        section_id: &str,
        continuation: &Continuation,
        _partition: Partition,
        _filters: &CatalogFilters,
    ) -> Result<SectionPage, CatalogError> {
        let key = (section_id.to_string(), continuation.clone());
        self.section_calls.lock().push(key.clone());
        let scripted = self.sections.lock().get(&key).cloned();
        scripted.unwrap_or_else(|| Err(CatalogError::NotFound(format!("section {}", section_id))))
    }

    async fn fetch_search_page(&self, request: &SearchPageRequest) -> Result<PageResult<ContentItem>, CatalogError> {
        let key = (request.media_type, request.page, request.limit);
        self.search_calls.lock().push(key);
        let scripted = self.search.lock().get(&key).cloned();
        self.pass_gate(Gate::Search(request.media_type, request.page)).await;
        scripted.unwrap_or_else(|| Err(CatalogError::NotFound(format!("search page {}", request.page))))
    }

    async fn fetch_search_legacy(&self, _query: &str, _limit: usize) -> Result<Vec<ContentItem>, CatalogError> {
        self.legacy_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.legacy.lock().clone();
        self.pass_gate(Gate::Legacy).await;
        scripted.unwrap_or_else(|| Err(CatalogError::NotFound("legacy search".to_string())))
    }
}

pub fn item(media_type: MediaType, id: u64, popularity: f64) -> ContentItem {
    ContentItem {
        media_type,
        id,
        title: format!("{} {}", media_type.as_str(), id),
        poster_path: None,
        release_date: None,
        popularity: Some(popularity),
    }
}

pub fn dated(media_type: MediaType, id: u64, year: i32) -> ContentItem {
    ContentItem {
        release_date: NaiveDate::from_ymd_opt(year, 6, 1),
        ..item(media_type, id, 1.0)
    }
}

/// `count` items with ids starting at `first` and falling popularity
pub fn items(media_type: MediaType, first: u64, count: usize, top_popularity: f64) -> Vec<ContentItem> {
    (0..count as u64)
        .map(|i| item(media_type, first + i, top_popularity - (i as f64) * 2.0))
        .collect()
}

pub fn section(id: &str, item_ids: &[u64]) -> Section {
    Section {
        id: id.to_string(),
        title: id.to_uppercase(),
        items: item_ids.iter().map(|&i| item(MediaType::Movie, i, 1.0)).collect(),
        continuation: None,
        page: 1,
        total_pages: None,
    }
}

pub fn sections(prefix: &str, count: usize) -> Vec<Section> {
    (0..count)
        .map(|i| section(&format!("{}-{}", prefix, i), &[i as u64 + 1]))
        .collect()
}

pub fn home_page(sections: Vec<Section>, next_page: Option<u32>) -> PageResult<Section> {
    PageResult {
        items: sections,
        has_more: next_page.is_some(),
        next_page,
        total_pages: None,
    }
}

pub fn search_page(items: Vec<ContentItem>, page: u32, total_pages: Option<u32>) -> PageResult<ContentItem> {
    let has_more = total_pages.map(|t| page < t).unwrap_or(true);
    PageResult {
        items,
        has_more,
        next_page: has_more.then_some(page + 1),
        total_pages,
    }
}

pub fn ids(sections: &[Section]) -> Vec<String> {
    sections.iter().map(|s| s.id.clone()).collect()
}

/// Poll `condition` until it holds; panics after about two seconds
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

/// Let spawned background tasks run to completion
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
