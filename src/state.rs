use std::collections::{HashSet, VecDeque};

use crate::api::{ContentItem, ItemKey, Partition};
use crate::search::SortKey;

/// Pagination state of one surface partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchState {
    /// Page the next load requests
    pub current_page: u32,
    pub has_more: bool,
    /// Set while a fetch for this partition is in flight
    pub loading: bool,
}

impl Default for FetchState {
    fn default() -> Self {
        Self {
            current_page: 1,
            has_more: true,
            loading: false,
        }
    }
}

impl FetchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settle after a fetch that ended pagination, successfully or not
    pub fn exhaust(&mut self) {
        self.has_more = false;
        self.loading = false;
    }
}

/// What a load call did; failures surface only as `Exhausted`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// New entries were merged into the displayed list
    Loaded { added: usize, has_more: bool },
    /// Restored from the cache without a network call
    Cached,
    /// Gated by an in-flight fetch or by `has_more == false`
    Skipped,
    /// The fetch failed; pagination is stopped
    Exhausted,
    /// A reset happened mid-flight; nothing was applied
    Discarded,
}

/// Search session state. Every field is owned by the aggregator and only
/// touched between network round-trips.
#[derive(Debug, Clone)]
pub struct SearchSession {
    pub query: String,
    pub partition: Partition,
    /// Identities already surfaced or buffered
    pub seen: HashSet<ItemKey>,
    /// Fetched but not yet surfaced
    pub overflow: VecDeque<ContentItem>,
    /// Canonical accumulation in relevance order
    pub accumulated: Vec<ContentItem>,
    pub next_page: u32,
    pub total_pages: Option<u32>,
    pub page_limit: usize,
    pub has_more: bool,
    pub loading: bool,
    /// Set once the legacy endpoint answered for this session
    pub legacy_used: bool,
    /// Number of load calls that surfaced results
    pub batches: usize,
    pub sort: SortKey,
    /// A background pool fill for date sorting is running
    pub filling: bool,
}

impl SearchSession {
    pub fn new(page_limit: usize) -> Self {
        Self {
            query: String::new(),
            partition: Partition::Mixed,
            seen: HashSet::new(),
            overflow: VecDeque::new(),
            accumulated: Vec::new(),
            next_page: 1,
            total_pages: None,
            page_limit,
            has_more: false,
            loading: false,
            legacy_used: false,
            batches: 0,
            sort: SortKey::Relevance,
            filling: false,
        }
    }

    /// Start over for `query`. The sort selection survives.
    pub fn reset(&mut self, query: &str, partition: Partition, page_limit: usize) {
        let sort = self.sort;
        *self = Self::new(page_limit);
        self.query = query.trim().to_string();
        self.partition = partition;
        self.has_more = !self.query.is_empty();
        self.sort = sort;
    }

    /// Something is left to surface, buffered or remote
    pub fn can_load_more(&self) -> bool {
        !self.overflow.is_empty() || self.has_more
    }

    /// Move up to `max` buffered items into the accumulation
    pub fn drain_overflow(&mut self, max: usize) -> usize {
        let take = max.min(self.overflow.len());
        self.accumulated.extend(self.overflow.drain(..take));
        take
    }

    /// Surface `item` if the batch has room, buffer it otherwise.
    /// Returns false for an identity already seen.
    pub fn accept(&mut self, item: ContentItem, room: &mut usize) -> bool {
        if !self.seen.insert(item.key()) {
            return false;
        }
        if *room > 0 {
            self.accumulated.push(item);
            *room -= 1;
        } else {
            self.overflow.push_back(item);
        }
        true
    }
}
