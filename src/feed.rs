//! Home feed surface: paginated sections with read-ahead and a
//! fingerprint-scoped cache.
//!
//! All state lives behind one lock that is never held across an `.await`.
//! Each network round-trip captures the surface generation first and
//! re-checks it on completion, so a reset always wins over a late response.
//! Prefetched pages are stamped with the fingerprint and the reset epoch
//! active at request time, and dropped if either has moved on since. The
//! epoch only moves on resets, so read-ahead survives a partition switch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::api::{with_deadline, CatalogSource, Continuation, HomePageRequest, Partition, Section};
use crate::cache::{CacheEntry, CacheStore, PrefetchEntry};
use crate::fingerprint::{FilterPreferences, Fingerprint, Identity};
use crate::generation::{GenerationToken, VersionGuard};
use crate::merge::append_unique;
use crate::state::{FetchState, LoadOutcome};

pub const DEFAULT_HOME_PAGE_SIZE: usize = 6;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct FeedOptions {
    pub page_size: usize,
    pub request_timeout: Duration,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_HOME_PAGE_SIZE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

struct FeedInner {
    guard: VersionGuard,
    /// Advanced by resets only; stamps read-ahead requests
    epoch: VersionGuard,
    identity: Identity,
    preferences: FilterPreferences,
    fingerprint: Fingerprint,
    partition: Partition,
    states: HashMap<Partition, FetchState>,
    /// Displayed list of the active partition
    sections: Vec<Section>,
    section_loading: HashSet<String>,
    cache: CacheStore<Section>,
}

impl FeedInner {
    fn state(&self, partition: Partition) -> FetchState {
        self.states.get(&partition).cloned().unwrap_or_default()
    }

    fn state_mut(&mut self, partition: Partition) -> &mut FetchState {
        self.states.entry(partition).or_default()
    }

    fn reset_active(&mut self) {
        self.guard.advance();
        self.epoch.advance();
        self.cache.clear_prefetch(self.partition);
        self.sections.clear();
        self.section_loading.clear();
        for state in self.states.values_mut() {
            state.loading = false;
        }
        self.states.insert(self.partition, FetchState::new());
    }

    fn reset_all(&mut self) {
        self.guard.advance();
        self.epoch.advance();
        self.sections.clear();
        self.section_loading.clear();
        self.states.clear();
    }

    /// Returns false when the fingerprint did not change
    fn refingerprint(&mut self) -> bool {
        let fingerprint = self.preferences.fingerprint(&self.identity);
        if fingerprint == self.fingerprint {
            return false;
        }
        info!(%fingerprint, "home feed fingerprint changed");
        self.cache.ensure(&fingerprint);
        self.fingerprint = fingerprint;
        self.reset_all();
        true
    }

    fn request(&self, page: u32, page_size: usize) -> HomePageRequest {
        HomePageRequest {
            page,
            page_size,
            partition: self.partition,
            filters: self.preferences.catalog_filters(),
        }
    }

    fn apply_page(&mut self, page: u32, sections: Vec<Section>, has_more: bool, next_page: Option<u32>) -> LoadOutcome {
        let added = append_unique(&mut self.sections, sections);
        let partition = self.partition;
        let state = self.state_mut(partition);
        state.current_page = next_page.unwrap_or(page + 1);
        state.has_more = has_more;
        state.loading = false;
        self.commit();
        LoadOutcome::Loaded { added, has_more }
    }

    fn commit(&mut self) {
        let state = self.state(self.partition);
        let entry = CacheEntry {
            items: self.sections.clone(),
            page: state.current_page,
            has_more: state.has_more,
        };
        self.cache.put(&self.fingerprint, self.partition, entry);
    }

    /// Read-ahead for the page after the one just applied
    fn prefetch_request(&self, page_size: usize) -> Option<PrefetchJob> {
        let state = self.state(self.partition);
        state.has_more.then(|| PrefetchJob {
            fingerprint: self.fingerprint.clone(),
            epoch: self.epoch.token(),
            request: self.request(state.current_page, page_size),
        })
    }
}

struct PrefetchJob {
    fingerprint: Fingerprint,
    epoch: GenerationToken,
    request: HomePageRequest,
}

/// Paginated home feed controller
#[derive(Clone)]
pub struct HomeFeed {
    source: Arc<dyn CatalogSource>,
    inner: Arc<Mutex<FeedInner>>,
    options: FeedOptions,
}

impl HomeFeed {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        options: FeedOptions,
        identity: Identity,
        preferences: FilterPreferences,
    ) -> Self {
        let fingerprint = preferences.fingerprint(&identity);
        let mut cache = CacheStore::new();
        cache.ensure(&fingerprint);

        let inner = FeedInner {
            guard: VersionGuard::new(),
            epoch: VersionGuard::new(),
            identity,
            preferences,
            fingerprint,
            partition: Partition::Mixed,
            states: HashMap::new(),
            sections: Vec::new(),
            section_loading: HashSet::new(),
            cache,
        };

        Self {
            source,
            inner: Arc::new(Mutex::new(inner)),
            options,
        }
    }

    pub fn partition(&self) -> Partition {
        self.inner.lock().partition
    }

    pub fn sections(&self) -> Vec<Section> {
        self.inner.lock().sections.clone()
    }

    pub fn has_more(&self) -> bool {
        let inner = self.inner.lock();
        inner.state(inner.partition).has_more
    }

    pub fn is_loading(&self) -> bool {
        let inner = self.inner.lock();
        inner.state(inner.partition).loading
    }

    pub fn current_page(&self) -> u32 {
        let inner = self.inner.lock();
        inner.state(inner.partition).current_page
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.inner.lock().fingerprint.clone()
    }

    /// Page held in the read-ahead slot of the active partition
    pub fn prefetched_page(&self) -> Option<u32> {
        let inner = self.inner.lock();
        inner.cache.prefetched_page(inner.partition)
    }

    pub fn cached_partitions(&self) -> usize {
        self.inner.lock().cache.len()
    }

    /// Drop the active partition's list and pagination; in-flight results
    /// for it will be discarded
    pub fn reset(&self) {
        self.inner.lock().reset_active();
    }

    pub fn set_identity(&self, identity: Identity) -> bool {
        let mut inner = self.inner.lock();
        inner.identity = identity;
        inner.refingerprint()
    }

    pub fn set_preferences(&self, preferences: FilterPreferences) -> bool {
        let mut inner = self.inner.lock();
        inner.preferences = preferences;
        inner.refingerprint()
    }

    /// Make `partition` active, restoring its cached list when there is one.
    /// Returns true when the displayed list is ready without a fetch.
    pub fn set_partition(&self, partition: Partition) -> bool {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.partition == partition {
            return !inner.sections.is_empty();
        }

        inner.guard.advance();
        inner.partition = partition;
        inner.section_loading.clear();
        for state in inner.states.values_mut() {
            state.loading = false;
        }

        match inner.cache.get(&inner.fingerprint, partition).cloned() {
            Some(entry) => {
                debug!(partition = partition.as_str(), page = entry.page, "restoring partition from cache");
                inner.sections = entry.items;
                inner.states.insert(
                    partition,
                    FetchState {
                        current_page: entry.page,
                        has_more: entry.has_more,
                        loading: false,
                    },
                );
                true
            }
            None => {
                inner.sections.clear();
                inner.states.insert(partition, FetchState::new());
                false
            }
        }
    }

    /// Switch partitions, fetching page 1 on a cache miss
    pub async fn switch_partition(&self, partition: Partition) -> LoadOutcome {
        if self.set_partition(partition) {
            LoadOutcome::Cached
        } else {
            self.load_more(true).await
        }
    }

    /// Load the next page of sections, or page 1 when `reset` is set.
    /// Never fails: a failed fetch stops pagination instead.
    pub async fn load_more(&self, reset: bool) -> LoadOutcome {
        let page_size = self.options.page_size;
        let (token, request) = {
            let mut inner = self.inner.lock();
            let partition = inner.partition;
            let state = inner.state(partition);
            if state.loading {
                debug!(partition = partition.as_str(), "home fetch already in flight");
                return LoadOutcome::Skipped;
            }
            if reset {
                inner.reset_active();
            } else if !state.has_more {
                return LoadOutcome::Skipped;
            }

            let page = inner.state(partition).current_page;
            let fingerprint = inner.fingerprint.clone();
            if let Some(slot) = inner.cache.take_prefetch(&fingerprint, partition, page) {
                debug!(page, partition = partition.as_str(), "consuming prefetched home page");
                let outcome = inner.apply_page(page, slot.payload, slot.has_more, slot.next_page);
                let follow_up = inner.prefetch_request(page_size);
                drop(inner);
                if let Some(job) = follow_up {
                    self.spawn_prefetch(job);
                }
                return outcome;
            }

            inner.state_mut(partition).loading = true;
            (inner.guard.token(), inner.request(page, page_size))
        };

        info!(page = request.page, partition = request.partition.as_str(), "fetching home page");
        let result = with_deadline(
            self.options.request_timeout,
            "/api/home",
            self.source.fetch_home_page(&request),
        )
        .await;

        let (outcome, follow_up) = {
            let mut inner = self.inner.lock();
            if !inner.guard.is_current(token) {
                debug!(page = request.page, "discarding stale home page");
                return LoadOutcome::Discarded;
            }
            match result {
                Ok(page) => {
                    let outcome = inner.apply_page(request.page, page.items, page.has_more, page.next_page);
                    (outcome, inner.prefetch_request(page_size))
                }
                Err(err) => {
                    warn!(error = %err, page = request.page, "home page fetch failed, stopping pagination");
                    inner.state_mut(request.partition).exhaust();
                    inner.commit();
                    return LoadOutcome::Exhausted;
                }
            }
        };

        if let Some(job) = follow_up {
            self.spawn_prefetch(job);
        }
        outcome
    }

    /// Extend one section's items through its own continuation
    pub async fn load_section_more(&self, section_id: &str) -> LoadOutcome {
        let (token, continuation, partition, filters) = {
            let mut inner = self.inner.lock();
            let continuation = inner
                .sections
                .iter()
                .find(|s| s.id == section_id)
                .and_then(Section::next_continuation);
            let Some(continuation) = continuation else {
                return LoadOutcome::Skipped;
            };
            if !inner.section_loading.insert(section_id.to_string()) {
                return LoadOutcome::Skipped;
            }
            (
                inner.guard.token(),
                continuation,
                inner.partition,
                inner.preferences.catalog_filters(),
            )
        };

        debug!(section_id, ?continuation, "fetching section page");
        let result = with_deadline(
            self.options.request_timeout,
            "/api/home/sections",
            self.source.fetch_section(section_id, &continuation, partition, &filters),
        )
        .await;

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if !inner.guard.is_current(token) {
            debug!(section_id, "discarding stale section page");
            return LoadOutcome::Discarded;
        }
        inner.section_loading.remove(section_id);

        let Some(section) = inner.sections.iter_mut().find(|s| s.id == section_id) else {
            return LoadOutcome::Discarded;
        };
        let outcome = match result {
            Ok(page) => {
                let added = append_unique(&mut section.items, page.items);
                section.page = match continuation {
                    Continuation::Page(n) => n,
                    Continuation::Cursor(_) => section.page + 1,
                };
                section.continuation = page.continuation;
                if page.total_pages.is_some() {
                    section.total_pages = page.total_pages;
                }
                LoadOutcome::Loaded {
                    added,
                    has_more: section.has_more(),
                }
            }
            Err(err) => {
                warn!(error = %err, section_id, "section fetch failed, stopping its pagination");
                section.continuation = None;
                section.total_pages = None;
                LoadOutcome::Exhausted
            }
        };
        inner.commit();
        outcome
    }

    fn spawn_prefetch(&self, job: PrefetchJob) {
        let PrefetchJob {
            fingerprint,
            epoch,
            request,
        } = job;
        let source = Arc::clone(&self.source);
        let inner = Arc::clone(&self.inner);
        let deadline = self.options.request_timeout;
        debug!(page = request.page, partition = request.partition.as_str(), "starting home prefetch");

        tokio::spawn(async move {
            match with_deadline(deadline, "/api/home", source.fetch_home_page(&request)).await {
                Ok(page) => {
                    let entry = PrefetchEntry {
                        expected_page: request.page,
                        payload: page.items,
                        has_more: page.has_more,
                        next_page: page.next_page,
                    };
                    let mut inner = inner.lock();
                    if !inner.epoch.is_current(epoch) {
                        debug!(page = request.page, "dropping prefetch started before a reset");
                    } else if inner.cache.store_prefetch(&fingerprint, request.partition, entry) {
                        debug!(page = request.page, "home prefetch stored");
                    } else {
                        debug!(page = request.page, "dropping prefetch fetched under a stale fingerprint");
                    }
                }
                Err(err) => debug!(error = %err, page = request.page, "home prefetch failed"),
            }
        });
    }
}
