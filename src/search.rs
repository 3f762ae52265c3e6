//! Search aggregation and ranking.
//!
//! A search session accumulates results across pages in relevance order.
//! Each `load_more` call surfaces a batch (bigger for the first call):
//! buffered overflow goes first, then pages are fetched until the batch is
//! full or the catalog runs dry. In mixed mode every page is a movie + tv
//! fan-out merged by popularity. Sorting is a read-time projection and
//! never touches the accumulation.
//!
//! Failure policy:
//! - page size rejected: retry the same page once at the fallback limit,
//!   which then sticks for the session
//! - not found on page 1: one call to the legacy endpoint, whose answer is
//!   final for the session
//! - anything else: pagination stops

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::future;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::{
    with_deadline, CatalogFilters, CatalogSource, ContentItem, MediaType, PageResult, Partition,
    SearchPageRequest,
};
use crate::errors::CatalogError;
use crate::feed::DEFAULT_REQUEST_TIMEOUT;
use crate::generation::{GenerationToken, VersionGuard};
use crate::state::{LoadOutcome, SearchSession};

pub const DEFAULT_INITIAL_TARGET: usize = 36;
pub const DEFAULT_BATCH_SIZE: usize = 24;
pub const DEFAULT_PAGE_LIMIT: usize = 40;
pub const DEFAULT_FALLBACK_LIMIT: usize = 20;
pub const DEFAULT_LEGACY_CAP: usize = 60;
pub const DEFAULT_SORT_POOL_FLOOR: usize = 150;
const FILL_RETRY_DELAY: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Relevance,
    Popularity,
    Newest,
    Oldest,
}

impl SortKey {
    /// Date sorts need a large pool before their order means anything
    pub fn is_date_based(&self) -> bool {
        matches!(self, SortKey::Newest | SortKey::Oldest)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Relevance => "relevance",
            SortKey::Popularity => "popularity",
            SortKey::Newest => "newest",
            SortKey::Oldest => "oldest",
        }
    }
}

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relevance" => Ok(SortKey::Relevance),
            "popularity" | "popular" => Ok(SortKey::Popularity),
            "newest" => Ok(SortKey::Newest),
            "oldest" => Ok(SortKey::Oldest),
            other => Err(format!("unknown sort key: {}", other)),
        }
    }
}

fn by_popularity_desc(a: &ContentItem, b: &ContentItem) -> Ordering {
    let a = a.popularity.unwrap_or(f64::NEG_INFINITY);
    let b = b.popularity.unwrap_or(f64::NEG_INFINITY);
    b.total_cmp(&a)
}

/// Stable projection of `items`; undated entries always go last
pub fn sort_items(items: &[ContentItem], key: SortKey) -> Vec<ContentItem> {
    let mut sorted = items.to_vec();
    match key {
        SortKey::Relevance => {}
        SortKey::Popularity => sorted.sort_by(by_popularity_desc),
        SortKey::Newest | SortKey::Oldest => sorted.sort_by(|a, b| match (a.release_date, b.release_date) {
            (Some(x), Some(y)) if key == SortKey::Newest => y.cmp(&x),
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }),
    }
    sorted
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Items surfaced by the first load of a session
    pub initial_target: usize,
    /// Items surfaced by every later load
    pub batch_size: usize,
    pub page_limit: usize,
    /// Page size known to be accepted everywhere
    pub fallback_limit: usize,
    pub legacy_cap: usize,
    pub sort_pool_floor: usize,
    pub request_timeout: Duration,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            initial_target: DEFAULT_INITIAL_TARGET,
            batch_size: DEFAULT_BATCH_SIZE,
            page_limit: DEFAULT_PAGE_LIMIT,
            fallback_limit: DEFAULT_FALLBACK_LIMIT,
            legacy_cap: DEFAULT_LEGACY_CAP,
            sort_pool_floor: DEFAULT_SORT_POOL_FLOOR,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

struct SearchInner {
    guard: VersionGuard,
    session: SearchSession,
    filters: CatalogFilters,
}

/// One fetched page across every media type of the partition
struct FanoutPage {
    items: Vec<ContentItem>,
    total_pages: Option<u32>,
    /// Every sub-request came back with fewer items than asked for
    short: bool,
}

enum Step {
    Continue,
    Finish(LoadOutcome),
    Legacy,
}

#[derive(Clone)]
pub struct SearchAggregator {
    source: Arc<dyn CatalogSource>,
    inner: Arc<Mutex<SearchInner>>,
    options: SearchOptions,
}

impl SearchAggregator {
    pub fn new(source: Arc<dyn CatalogSource>, options: SearchOptions, filters: CatalogFilters) -> Self {
        let inner = SearchInner {
            guard: VersionGuard::new(),
            session: SearchSession::new(options.page_limit),
            filters,
        };
        Self {
            source,
            inner: Arc::new(Mutex::new(inner)),
            options,
        }
    }

    /// Start a new session; results of the previous one still in flight
    /// are discarded
    pub fn set_query(&self, query: &str, partition: Partition) {
        let mut inner = self.inner.lock();
        inner.guard.advance();
        inner.session.reset(query, partition, self.options.page_limit);
        info!(query = %inner.session.query, partition = partition.as_str(), "search session started");
    }

    pub fn reset(&self) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.guard.advance();
        let query = inner.session.query.clone();
        let partition = inner.session.partition;
        inner.session.reset(&query, partition, self.options.page_limit);
    }

    pub fn set_filters(&self, filters: CatalogFilters) {
        self.inner.lock().filters = filters;
        self.reset();
    }

    /// Change the read-time sort. Returns true when a background fill of
    /// the result pool was started for a date sort.
    pub fn set_sort(&self, sort: SortKey) -> bool {
        self.inner.lock().session.sort = sort;
        self.maybe_spawn_fill()
    }

    pub fn sort(&self) -> SortKey {
        self.inner.lock().session.sort
    }

    pub fn query(&self) -> String {
        self.inner.lock().session.query.clone()
    }

    /// Surfaced results under the active sort
    pub fn results(&self) -> Vec<ContentItem> {
        let inner = self.inner.lock();
        sort_items(&inner.session.accumulated, inner.session.sort)
    }

    /// Surfaced results in relevance order
    pub fn accumulated(&self) -> Vec<ContentItem> {
        self.inner.lock().session.accumulated.clone()
    }

    pub fn buffered(&self) -> usize {
        self.inner.lock().session.overflow.len()
    }

    /// Whether the remote may still have pages for this session
    pub fn has_more(&self) -> bool {
        self.inner.lock().session.has_more
    }

    pub fn can_load_more(&self) -> bool {
        self.inner.lock().session.can_load_more()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.lock().session.loading
    }

    /// A background pool fill for a date sort is running
    pub fn is_filling(&self) -> bool {
        self.inner.lock().session.filling
    }

    pub fn page_limit(&self) -> usize {
        self.inner.lock().session.page_limit
    }

    pub fn next_page(&self) -> u32 {
        self.inner.lock().session.next_page
    }

    pub fn total_pages(&self) -> Option<u32> {
        self.inner.lock().session.total_pages
    }

    pub fn used_legacy(&self) -> bool {
        self.inner.lock().session.legacy_used
    }

    /// Surface the next batch of results. Never fails: errors end
    /// pagination for the session.
    pub async fn load_more(&self) -> LoadOutcome {
        let outcome = self.load_batch().await;
        self.maybe_spawn_fill();
        outcome
    }

    /// Keep loading while a date sort is active and the pool is below the
    /// floor. Returns the pool size it stopped at.
    pub async fn fill_sort_pool(&self) -> usize {
        let started = self.inner.lock().guard.token();
        loop {
            let token = {
                let inner = self.inner.lock();
                let session = &inner.session;
                if !inner.guard.is_current(started)
                    || !session.sort.is_date_based()
                    || session.accumulated.len() >= self.options.sort_pool_floor
                    || !session.can_load_more()
                {
                    break;
                }
                inner.guard.token()
            };

            match self.load_batch().await {
                LoadOutcome::Loaded { added, .. } if added > 0 => {}
                // a user-triggered load holds the session; wait for it
                LoadOutcome::Skipped if self.is_loading() => {
                    tokio::time::sleep(FILL_RETRY_DELAY).await;
                    continue;
                }
                _ => break,
            }
            if !self.inner.lock().guard.is_current(token) {
                break;
            }
        }

        let mut inner = self.inner.lock();
        if inner.guard.is_current(started) {
            inner.session.filling = false;
        }
        inner.session.accumulated.len()
    }

    fn maybe_spawn_fill(&self) -> bool {
        {
            let mut inner = self.inner.lock();
            let session = &mut inner.session;
            if session.filling
                || !session.sort.is_date_based()
                || session.accumulated.len() >= self.options.sort_pool_floor
                || !session.can_load_more()
            {
                return false;
            }
            session.filling = true;
        }

        debug!(floor = self.options.sort_pool_floor, "filling result pool for date sort");
        let this = self.clone();
        tokio::spawn(async move {
            let pool = this.fill_sort_pool().await;
            debug!(pool, "sort pool fill finished");
        });
        true
    }

    async fn load_batch(&self) -> LoadOutcome {
        let (token, query, partition, filters, mut page, mut limit, mut room, mut added) = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let session = &mut inner.session;
            if session.loading || !session.can_load_more() {
                return LoadOutcome::Skipped;
            }

            let target = if session.batches == 0 {
                self.options.initial_target
            } else {
                self.options.batch_size
            };
            let drained = session.drain_overflow(target);
            let room = target - drained;
            if room == 0 || !session.has_more {
                session.batches += 1;
                debug!(drained, buffered = session.overflow.len(), "search batch served from buffer");
                return LoadOutcome::Loaded {
                    added: drained,
                    has_more: session.can_load_more(),
                };
            }

            session.loading = true;
            (
                inner.guard.token(),
                session.query.clone(),
                session.partition,
                inner.filters.clone(),
                session.next_page,
                session.page_limit,
                room,
                drained,
            )
        };

        loop {
            debug!(%query, page, limit, room, "fetching search page");
            let result = self.fetch_fanout(&query, partition, &filters, page, limit).await;

            let step = {
                let mut guard = self.inner.lock();
                let inner = &mut *guard;
                if !inner.guard.is_current(token) {
                    debug!(%query, page, "discarding stale search page");
                    return LoadOutcome::Discarded;
                }
                let session = &mut inner.session;

                match result {
                    Ok(fetched) => {
                        let before = room;
                        for item in fetched.items {
                            session.accept(item, &mut room);
                        }
                        added += before - room;

                        session.next_page = page + 1;
                        if fetched.total_pages.is_some() {
                            session.total_pages = fetched.total_pages;
                        }
                        let exhausted = match session.total_pages {
                            Some(total) => session.next_page > total,
                            None => fetched.short,
                        };
                        if exhausted {
                            session.has_more = false;
                        }

                        if room == 0 || !session.has_more {
                            Step::Finish(Self::finish(session, added))
                        } else {
                            page = session.next_page;
                            Step::Continue
                        }
                    }
                    Err(err) if err.is_validation() && limit > self.options.fallback_limit => {
                        warn!(error = %err, page, limit, fallback = self.options.fallback_limit, "page size rejected, retrying");
                        limit = self.options.fallback_limit;
                        session.page_limit = limit;
                        Step::Continue
                    }
                    Err(err) if err.is_not_found() && page == 1 && !session.legacy_used => {
                        warn!(error = %err, %query, "paginated search unavailable, using legacy endpoint");
                        session.legacy_used = true;
                        Step::Legacy
                    }
                    Err(err) => {
                        warn!(error = %err, page, "search fetch failed, stopping pagination");
                        session.has_more = false;
                        if added > 0 {
                            Step::Finish(Self::finish(session, added))
                        } else {
                            session.loading = false;
                            Step::Finish(LoadOutcome::Exhausted)
                        }
                    }
                }
            };

            match step {
                Step::Continue => continue,
                Step::Finish(outcome) => return outcome,
                Step::Legacy => return self.legacy_fallback(token, &query, partition, added).await,
            }
        }
    }

    fn finish(session: &mut SearchSession, added: usize) -> LoadOutcome {
        session.loading = false;
        session.batches += 1;
        LoadOutcome::Loaded {
            added,
            has_more: session.can_load_more(),
        }
    }

    /// Whatever the legacy endpoint returns is the complete answer
    async fn legacy_fallback(
        &self,
        token: GenerationToken,
        query: &str,
        partition: Partition,
        mut added: usize,
    ) -> LoadOutcome {
        let result = with_deadline(
            self.options.request_timeout,
            "/api/search",
            self.source.fetch_search_legacy(query, self.options.legacy_cap),
        )
        .await;

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if !inner.guard.is_current(token) {
            debug!(%query, "discarding stale legacy search result");
            return LoadOutcome::Discarded;
        }
        let session = &mut inner.session;
        session.has_more = false;

        match result {
            Ok(items) => {
                let mut room = usize::MAX;
                for item in items.into_iter().filter(|i| partition.includes(i.media_type)) {
                    if session.accept(item, &mut room) {
                        added += 1;
                    }
                }
                info!(added, "legacy search served");
                Self::finish(session, added)
            }
            Err(err) => {
                warn!(error = %err, "legacy search failed");
                session.loading = false;
                LoadOutcome::Exhausted
            }
        }
    }

    async fn fetch_fanout(
        &self,
        query: &str,
        partition: Partition,
        filters: &CatalogFilters,
        page: u32,
        limit: usize,
    ) -> Result<FanoutPage, CatalogError> {
        if let Some(media_type) = partition.single() {
            let result = self.fetch_one(query, media_type, filters, page, limit).await?;
            return Ok(FanoutPage {
                short: result.items.len() < limit,
                total_pages: result.total_pages,
                items: result.items,
            });
        }

        let (movies, shows) = future::join(
            self.fetch_one(query, MediaType::Movie, filters, page, limit),
            self.fetch_one(query, MediaType::Tv, filters, page, limit),
        )
        .await;
        let (movies, shows) = (movies?, shows?);

        let short = movies.items.len() < limit && shows.items.len() < limit;
        let total_pages = match (movies.total_pages, shows.total_pages) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let mut items = movies.items;
        items.extend(shows.items);
        // interleave by popularity instead of movies-then-tv
        items.sort_by(by_popularity_desc);

        Ok(FanoutPage {
            items,
            total_pages,
            short,
        })
    }

    async fn fetch_one(
        &self,
        query: &str,
        media_type: MediaType,
        filters: &CatalogFilters,
        page: u32,
        limit: usize,
    ) -> Result<PageResult<ContentItem>, CatalogError> {
        let request = SearchPageRequest {
            query: query.to_string(),
            page,
            limit,
            media_type,
            filters: filters.clone(),
        };
        with_deadline(
            self.options.request_timeout,
            "/api/search/multi",
            self.source.fetch_search_page(&request),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn item(id: u64, popularity: Option<f64>, year: Option<i32>) -> ContentItem {
        ContentItem {
            media_type: MediaType::Movie,
            id,
            title: id.to_string(),
            poster_path: None,
            release_date: year.and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1)),
            popularity,
        }
    }

    fn ids(items: &[ContentItem]) -> Vec<u64> {
        items.iter().map(|i| i.id).collect()
    }

    #[test]
    fn test_sort_projections() {
        let items = vec![
            item(1, Some(5.0), Some(2001)),
            item(2, None, None),
            item(3, Some(9.0), Some(1999)),
            item(4, Some(7.0), Some(2020)),
        ];

        assert_eq!(ids(&sort_items(&items, SortKey::Relevance)), vec![1, 2, 3, 4]);
        assert_eq!(ids(&sort_items(&items, SortKey::Popularity)), vec![3, 4, 1, 2]);
        assert_eq!(ids(&sort_items(&items, SortKey::Newest)), vec![4, 1, 3, 2]);
        assert_eq!(ids(&sort_items(&items, SortKey::Oldest)), vec![3, 1, 4, 2]);
        // canonical order untouched
        assert_eq!(ids(&items), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_sort_is_stable_for_ties() {
        let items = vec![item(1, Some(1.0), Some(2000)), item(2, Some(1.0), Some(2000))];
        assert_eq!(ids(&sort_items(&items, SortKey::Popularity)), vec![1, 2]);
        assert_eq!(ids(&sort_items(&items, SortKey::Newest)), vec![1, 2]);
    }

    #[test]
    fn test_sort_key_parsing() {
        assert_eq!("Newest".parse::<SortKey>(), Ok(SortKey::Newest));
        assert!("shuffle".parse::<SortKey>().is_err());
        assert!(SortKey::Oldest.is_date_based());
        assert!(!SortKey::Popularity.is_date_based());
    }
}
