//! Normalization of raw catalog payloads and user filter inputs.
//!
//! Catalog endpoints disagree on field names, id encodings and pagination
//! style (page numbers vs opaque cursors). Everything is folded into the
//! shapes in `crate::api` here so the surfaces never see wire details.

use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashSet;

use crate::api::{Continuation, ContentItem, MediaType, PageResult, Partition, Section, SectionPage};
use crate::flex_id::{deserialize_flex_option_f64, deserialize_flex_option_u32, FlexId};

/// Countries beyond this are ignored when scoping requests
pub const MAX_COUNTRIES: usize = 12;

#[derive(Debug, Deserialize, Default)]
pub struct RawItem {
    #[serde(default, alias = "tmdb_id", alias = "tmdbId")]
    pub id: FlexId,
    #[serde(default, alias = "show_type", alias = "showType")]
    pub media_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "poster_url", alias = "posterPath")]
    pub poster_path: Option<String>,
    #[serde(default, alias = "releaseDate")]
    pub release_date: Option<String>,
    #[serde(default, alias = "firstAirDate")]
    pub first_air_date: Option<String>,
    #[serde(default, alias = "releaseYear", deserialize_with = "deserialize_flex_option_u32")]
    pub year: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_flex_option_f64")]
    pub popularity: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RawSection {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "media_type")]
    pub kind: Option<String>,
    #[serde(default, alias = "results")]
    pub items: Vec<RawItem>,
    #[serde(default, alias = "nextCursor")]
    pub next_cursor: Option<String>,
    #[serde(default, alias = "nextPage", deserialize_with = "deserialize_flex_option_u32")]
    pub next_page: Option<u32>,
    #[serde(default, alias = "totalPages", deserialize_with = "deserialize_flex_option_u32")]
    pub total_pages: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RawHomePage {
    #[serde(default)]
    pub sections: Vec<RawSection>,
    #[serde(default, alias = "nextPage", deserialize_with = "deserialize_flex_option_u32")]
    pub next_page: Option<u32>,
    #[serde(default, alias = "totalPages", deserialize_with = "deserialize_flex_option_u32")]
    pub total_pages: Option<u32>,
    #[serde(default, alias = "hasMore")]
    pub has_more: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RawSectionPage {
    #[serde(default, alias = "results")]
    pub items: Vec<RawItem>,
    #[serde(default, alias = "nextCursor")]
    pub next_cursor: Option<String>,
    #[serde(default, alias = "nextPage", deserialize_with = "deserialize_flex_option_u32")]
    pub next_page: Option<u32>,
    #[serde(default, alias = "totalPages", deserialize_with = "deserialize_flex_option_u32")]
    pub total_pages: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RawSearchPage {
    #[serde(default)]
    pub results: Vec<RawItem>,
    #[serde(default, deserialize_with = "deserialize_flex_option_u32")]
    pub page: Option<u32>,
    #[serde(default, alias = "totalPages", deserialize_with = "deserialize_flex_option_u32")]
    pub total_pages: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RawLegacySearch {
    #[serde(default)]
    pub results: Vec<RawItem>,
}

/// Parse `YYYY-MM-DD`, tolerating a bare year
pub fn parse_release_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    raw.get(..4)
        .filter(|_| raw.len() == 4)
        .and_then(|y| y.parse::<i32>().ok())
        .and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1))
}

/// Entries without a usable id or media type are dropped
pub fn normalize_item(raw: RawItem, fallback: Option<MediaType>) -> Option<ContentItem> {
    let id = raw.id.as_u64()?;
    let media_type = raw
        .media_type
        .as_deref()
        .and_then(MediaType::parse)
        .or(fallback)?;

    let release_date = raw
        .release_date
        .as_deref()
        .or(raw.first_air_date.as_deref())
        .and_then(parse_release_date)
        .or_else(|| {
            raw.year
                .and_then(|y| i32::try_from(y).ok())
                .and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1))
        });

    Some(ContentItem {
        media_type,
        id,
        title: raw.title.or(raw.name).unwrap_or_default(),
        poster_path: raw.poster_path.filter(|p| !p.is_empty()),
        release_date,
        popularity: raw.popularity,
    })
}

fn normalize_items(raw: Vec<RawItem>, fallback: Option<MediaType>) -> Vec<ContentItem> {
    raw.into_iter()
        .filter_map(|item| normalize_item(item, fallback))
        .collect()
}

/// Cursor wins over a page number when a payload carries both
fn continuation_of(next_cursor: Option<String>, next_page: Option<u32>) -> Option<Continuation> {
    match next_cursor.filter(|c| !c.is_empty()) {
        Some(cursor) => Some(Continuation::Cursor(cursor)),
        None => next_page.map(Continuation::Page),
    }
}

pub fn normalize_section(raw: RawSection, partition: Partition) -> Section {
    let fallback = raw
        .kind
        .as_deref()
        .and_then(MediaType::parse)
        .or(partition.single());

    Section {
        id: raw.id,
        title: raw.title,
        items: normalize_items(raw.items, fallback),
        continuation: continuation_of(raw.next_cursor, raw.next_page),
        page: 1,
        total_pages: raw.total_pages,
    }
}

pub fn normalize_home_page(raw: RawHomePage, requested_page: u32, partition: Partition) -> PageResult<Section> {
    let has_more = raw.has_more.unwrap_or_else(|| {
        raw.next_page.is_some() || raw.total_pages.is_some_and(|total| total > requested_page)
    });
    let next_page = match raw.next_page {
        Some(page) => Some(page),
        None if has_more => Some(requested_page + 1),
        None => None,
    };

    PageResult {
        items: raw
            .sections
            .into_iter()
            .map(|s| normalize_section(s, partition))
            .collect(),
        has_more,
        next_page,
        total_pages: raw.total_pages,
    }
}

pub fn normalize_section_page(
    raw: RawSectionPage,
    requested: &Continuation,
    fallback: Option<MediaType>,
) -> SectionPage {
    let mut continuation = continuation_of(raw.next_cursor, raw.next_page);
    // Page-numbered sections may only declare a total
    if continuation.is_none() {
        if let (Continuation::Page(page), Some(total)) = (requested, raw.total_pages) {
            if total > *page {
                continuation = Some(Continuation::Page(page + 1));
            }
        }
    }

    SectionPage {
        items: normalize_items(raw.items, fallback),
        continuation,
        total_pages: raw.total_pages,
    }
}

pub fn normalize_search_page(
    raw: RawSearchPage,
    requested_page: u32,
    limit: usize,
    media_type: MediaType,
) -> PageResult<ContentItem> {
    let page = raw.page.unwrap_or(requested_page);
    let raw_len = raw.results.len();
    let has_more = match raw.total_pages {
        Some(total) => page < total,
        None => raw_len >= limit,
    };

    PageResult {
        items: normalize_items(raw.results, Some(media_type)),
        has_more,
        next_page: has_more.then_some(page + 1),
        total_pages: raw.total_pages,
    }
}

/// The legacy endpoint predates mixed search and defaults to movies
pub fn normalize_legacy_results(raw: RawLegacySearch, limit: usize) -> Vec<ContentItem> {
    let mut items = normalize_items(raw.results, Some(MediaType::Movie));
    items.truncate(limit);
    items
}

/// Trim, upper-case, keep two-letter codes only, dedupe, cap
pub fn normalize_countries(countries: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut normalized = Vec::new();
    for code in countries {
        let code = code.trim().to_ascii_uppercase();
        if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            continue;
        }
        if seen.insert(code.clone()) {
            normalized.push(code);
        }
        if normalized.len() >= MAX_COUNTRIES {
            break;
        }
    }
    normalized.sort();
    normalized
}

pub fn normalize_provider_ids(ids: &[u32]) -> Vec<u32> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}
