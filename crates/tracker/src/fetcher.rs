//! Incremental, deduplicating pagination over a newest-first source.
//!
//! Precondition: the source returns items newest-first and never inserts
//! older items behind ones already served. Under that assumption, the first
//! page containing a known key is the last page with anything new on it. A
//! source that reorders or backfills can make this stop early and miss events;
//! nothing here tries to detect that.

use common::types::{RawItem, RecordKey};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::time::Duration;

use crate::identity::identify;
use crate::sources::PageSource;

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub page_delay: Duration,
    pub max_pages: Option<u32>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            page_delay: Duration::from_millis(100),
            max_pages: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EmptyPage,
    CaughtUp,
    LastPage,
    PageLimit,
    Error,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyPage => "empty_page",
            Self::CaughtUp => "caught_up",
            Self::LastPage => "last_page",
            Self::PageLimit => "page_limit",
            Self::Error => "error",
        }
    }
}

#[derive(Debug)]
pub struct FetchOutcome {
    /// New items in source order (newest-first).
    pub items: Vec<RawItem>,
    /// The caller's key set plus every key emitted in this call.
    pub known_keys: HashSet<RecordKey>,
    pub pages: u32,
    pub stop: StopReason,
    /// Set when a page request failed; `items` holds everything before it.
    pub error: Option<anyhow::Error>,
}

impl FetchOutcome {
    pub fn caught_up(&self) -> bool {
        self.stop == StopReason::CaughtUp
    }
}

/// Page through `source` until a known item shows up, the source runs out,
/// or a request fails. Errors never propagate: partial progress is returned
/// with [`FetchOutcome::error`] set.
pub async fn fetch_new<S: PageSource + Sync>(
    source: &S,
    initial_params: Map<String, Value>,
    mut known_keys: HashSet<RecordKey>,
    settings: &FetchSettings,
) -> FetchOutcome {
    let mut params = initial_params;
    let mut items = Vec::new();
    let mut pages = 0_u32;

    tracing::info!(source = source.name(), known = known_keys.len(), "fetching new items");

    let (stop, error) = loop {
        if settings.max_pages.is_some_and(|max| pages >= max) {
            tracing::warn!(source = source.name(), pages, "page limit reached; stopping");
            break (StopReason::PageLimit, None);
        }

        let page = match source.fetch_page(&params).await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(
                    source = source.name(),
                    pages,
                    kept = items.len(),
                    error = %format!("{e:#}"),
                    "page fetch failed; keeping partial results"
                );
                break (StopReason::Error, Some(e));
            }
        };
        pages += 1;

        if page.items.is_empty() {
            break (StopReason::EmptyPage, None);
        }

        let mut caught_up = false;
        let mut page_new = 0_usize;
        for item in page.items {
            // Keep scanning after a hit: the page itself is not assumed key-sorted.
            if known_keys.insert(identify(&item)) {
                items.push(item);
                page_new += 1;
            } else {
                caught_up = true;
            }
        }
        tracing::debug!(source = source.name(), page = pages, new = page_new, "fetched page");

        if caught_up {
            tracing::info!(source = source.name(), "caught up to existing data");
            break (StopReason::CaughtUp, None);
        }

        match page.next_page_params {
            Some(next) if !next.is_empty() => {
                params.extend(next);
                tokio::time::sleep(settings.page_delay).await;
            }
            _ => break (StopReason::LastPage, None),
        }
    };

    metrics::counter!("tracker_items_fetched_total", "source" => source.name().to_string())
        .increment(items.len() as u64);
    tracing::info!(
        source = source.name(),
        new = items.len(),
        pages,
        stop = stop.as_str(),
        "fetch finished"
    );

    FetchOutcome {
        items,
        known_keys,
        pages,
        stop,
        error,
    }
}

/// Keys for every item of an existing collection.
pub fn keys_of(items: &[RawItem]) -> HashSet<RecordKey> {
    items.iter().map(identify).collect()
}
