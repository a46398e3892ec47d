//! Batched, rate-limited dispatch of surface mutations.
//!
//! Callers queue cell/range operations addressed by page *name*; the
//! dispatcher groups them so each page costs exactly one underlying
//! API call per invocation, resolves names through a TTL page-handle
//! cache, and gates every call through the rate limiter. A failure on
//! one page never aborts its siblings.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use crate::error::GridCalResult;
use crate::rate_limit::RateLimiter;
use crate::surface::{CellStyle, PageHandle, Surface};

/// How long a page-handle listing stays valid.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// One range write addressed by page name.
#[derive(Debug, Clone)]
pub struct CellWrite {
    pub page: String,
    pub range: String,
    pub values: Vec<Vec<String>>,
}

/// One range clear addressed by page name.
#[derive(Debug, Clone)]
pub struct RangeClear {
    pub page: String,
    pub range: String,
}

/// One range format addressed by page name.
#[derive(Debug, Clone)]
pub struct RangeFormat {
    pub page: String,
    pub range: String,
    pub style: CellStyle,
}

/// Per-page result of a batch operation.
#[derive(Debug, Clone, PartialEq)]
pub struct PageOutcome {
    pub page: String,
    pub ok: bool,
    pub error: Option<String>,
}

impl PageOutcome {
    fn success(page: &str) -> Self {
        PageOutcome {
            page: page.to_string(),
            ok: true,
            error: None,
        }
    }

    fn failure(page: &str, error: String) -> Self {
        PageOutcome {
            page: page.to_string(),
            ok: false,
            error: Some(error),
        }
    }
}

/// First failure message among a batch's outcomes, if any.
pub fn first_error(outcomes: &[PageOutcome]) -> Option<String> {
    outcomes.iter().find(|o| !o.ok).and_then(|o| o.error.clone())
}

#[derive(Default)]
struct PageCache {
    handles: HashMap<String, PageHandle>,
    fetched_at: Option<Instant>,
}

pub struct BatchDispatcher {
    surface: Arc<dyn Surface>,
    limiter: Arc<RateLimiter>,
    cache_ttl: Duration,
    cache: Mutex<PageCache>,
}

impl BatchDispatcher {
    pub fn new(surface: Arc<dyn Surface>, limiter: Arc<RateLimiter>) -> Self {
        BatchDispatcher {
            surface,
            limiter,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache: Mutex::new(PageCache::default()),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Resolve a page name to its handle, re-listing pages only when
    /// the cache has expired. A stale-but-valid entry within the TTL
    /// is acceptable.
    pub async fn page_handle(&self, name: &str) -> GridCalResult<Option<PageHandle>> {
        {
            let cache = self.lock_cache();
            if let Some(fetched_at) = cache.fetched_at {
                if fetched_at.elapsed() <= self.cache_ttl {
                    return Ok(cache.handles.get(name).cloned());
                }
            }
        }
        self.refresh().await?;
        Ok(self.lock_cache().handles.get(name).cloned())
    }

    /// Re-list pages and rebuild the cache.
    pub async fn refresh(&self) -> GridCalResult<Vec<PageHandle>> {
        self.limiter.wait_if_needed().await;
        let pages = self.surface.list_pages().await?;
        let mut cache = self.lock_cache();
        cache.handles = pages
            .iter()
            .map(|p| (p.name.clone(), p.clone()))
            .collect();
        cache.fetched_at = Some(Instant::now());
        Ok(pages)
    }

    /// Drop the cache; the next lookup re-lists pages.
    pub fn invalidate(&self) {
        let mut cache = self.lock_cache();
        cache.handles.clear();
        cache.fetched_at = None;
    }

    /// Write all queued values, one surface call per destination page.
    pub async fn batch_update(&self, writes: Vec<CellWrite>) -> Vec<PageOutcome> {
        let groups = group_by_page(writes, |w| &w.page);
        let mut outcomes = Vec::with_capacity(groups.len());
        for (page, group) in groups {
            let payload: Vec<_> = group
                .into_iter()
                .map(|w| (w.range, w.values))
                .collect();
            let result = match self.resolve(&page).await {
                Ok(handle) => {
                    self.limiter.wait_if_needed().await;
                    self.surface.write_ranges(&handle, &payload).await
                }
                Err(e) => Err(e),
            };
            outcomes.push(to_outcome(&page, "write", result));
        }
        outcomes
    }

    /// Clear all queued ranges, one surface call per destination page.
    pub async fn batch_clear(&self, clears: Vec<RangeClear>) -> Vec<PageOutcome> {
        let groups = group_by_page(clears, |c| &c.page);
        let mut outcomes = Vec::with_capacity(groups.len());
        for (page, group) in groups {
            let ranges: Vec<String> = group.into_iter().map(|c| c.range).collect();
            let result = match self.resolve(&page).await {
                Ok(handle) => {
                    self.limiter.wait_if_needed().await;
                    self.surface.clear_ranges(&handle, &ranges).await
                }
                Err(e) => Err(e),
            };
            outcomes.push(to_outcome(&page, "clear", result));
        }
        outcomes
    }

    /// Format all queued ranges, one surface call per destination page.
    pub async fn batch_format(&self, formats: Vec<RangeFormat>) -> Vec<PageOutcome> {
        let groups = group_by_page(formats, |f| &f.page);
        let mut outcomes = Vec::with_capacity(groups.len());
        for (page, group) in groups {
            let payload: Vec<_> = group
                .into_iter()
                .map(|f| (f.range, f.style))
                .collect();
            let result = match self.resolve(&page).await {
                Ok(handle) => {
                    self.limiter.wait_if_needed().await;
                    self.surface.format_ranges(&handle, &payload).await
                }
                Err(e) => Err(e),
            };
            outcomes.push(to_outcome(&page, "format", result));
        }
        outcomes
    }

    async fn resolve(&self, page: &str) -> GridCalResult<PageHandle> {
        self.page_handle(page).await?.ok_or_else(|| {
            crate::error::GridCalError::NotFound(format!("Page '{page}'"))
        })
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, PageCache> {
        self.cache.lock().expect("page cache lock poisoned")
    }
}

fn to_outcome(page: &str, op: &str, result: GridCalResult<()>) -> PageOutcome {
    match result {
        Ok(()) => PageOutcome::success(page),
        Err(e) => {
            warn!(page, op, error = %e, "batch operation failed for page, continuing");
            PageOutcome::failure(page, e.to_string())
        }
    }
}

/// Group items by page name, preserving first-seen page order.
fn group_by_page<T, F: Fn(&T) -> &str>(items: Vec<T>, page_of: F) -> Vec<(String, Vec<T>)> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<T>> = HashMap::new();
    for item in items {
        let page = page_of(&item).to_string();
        if !groups.contains_key(&page) {
            order.push(page.clone());
        }
        groups.entry(page).or_default().push(item);
    }
    order
        .into_iter()
        .map(|page| {
            let group = groups.remove(&page).unwrap_or_default();
            (page, group)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridLayout;
    use crate::memory::MemorySurface;

    async fn setup(pages: &[&str]) -> (Arc<MemorySurface>, BatchDispatcher) {
        let surface = Arc::new(MemorySurface::with_week_template(
            "Template",
            &GridLayout::default(),
        ));
        let limiter = Arc::new(RateLimiter::new(1000));
        let dispatcher = BatchDispatcher::new(surface.clone(), limiter);
        let template = dispatcher
            .page_handle("Template")
            .await
            .unwrap()
            .expect("template page");
        for name in pages {
            surface.duplicate_page(&template, name).await.unwrap();
        }
        dispatcher.invalidate();
        (surface, dispatcher)
    }

    fn write(page: &str, range: &str, value: &str) -> CellWrite {
        CellWrite {
            page: page.to_string(),
            range: range.to_string(),
            values: vec![vec![value.to_string()]],
        }
    }

    #[tokio::test]
    async fn test_one_call_per_page() {
        let (surface, dispatcher) = setup(&["wk1", "wk2"]).await;

        let outcomes = dispatcher
            .batch_update(vec![
                write("wk1", "B2", "a"),
                write("wk1", "B4", "b"),
                write("wk2", "C2", "c"),
            ])
            .await;

        assert!(outcomes.iter().all(|o| o.ok));
        assert_eq!(surface.call_count("write_ranges"), 2);
        assert_eq!(surface.cell("wk1", 4, 2).as_deref(), Some("b"));
        assert_eq!(surface.cell("wk2", 2, 3).as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn test_partial_failure_isolation() {
        let (surface, dispatcher) = setup(&["ok-page", "bad-page"]).await;
        surface.inject_failure("bad-page");

        let outcomes = dispatcher
            .batch_update(vec![
                write("bad-page", "B2", "x"),
                write("ok-page", "B2", "y"),
            ])
            .await;

        let bad = outcomes.iter().find(|o| o.page == "bad-page").unwrap();
        let ok = outcomes.iter().find(|o| o.page == "ok-page").unwrap();
        assert!(!bad.ok);
        assert!(bad.error.is_some());
        assert!(ok.ok);
        assert_eq!(surface.cell("ok-page", 2, 2).as_deref(), Some("y"));
        assert!(first_error(&outcomes).is_some());
    }

    #[tokio::test]
    async fn test_unknown_page_reported_not_fatal() {
        let (surface, dispatcher) = setup(&["wk1"]).await;

        let outcomes = dispatcher
            .batch_update(vec![write("missing", "B2", "x"), write("wk1", "B2", "y")])
            .await;

        assert!(!outcomes[0].ok);
        assert!(outcomes[1].ok);
        assert_eq!(surface.cell("wk1", 2, 2).as_deref(), Some("y"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_cache_ttl() {
        let (surface, dispatcher) = setup(&["wk1"]).await;
        let listings_before = surface.call_count("list_pages");

        dispatcher.page_handle("wk1").await.unwrap();
        dispatcher.page_handle("wk1").await.unwrap();
        assert_eq!(surface.call_count("list_pages"), listings_before + 1);

        tokio::time::advance(DEFAULT_CACHE_TTL + Duration::from_secs(1)).await;
        dispatcher.page_handle("wk1").await.unwrap();
        assert_eq!(surface.call_count("list_pages"), listings_before + 2);
    }

    #[tokio::test]
    async fn test_batch_clear_and_format_group_like_update() {
        let (surface, dispatcher) = setup(&["wk1", "wk2"]).await;

        dispatcher
            .batch_update(vec![write("wk1", "B2", "a"), write("wk2", "B2", "b")])
            .await;

        let outcomes = dispatcher
            .batch_clear(vec![
                RangeClear { page: "wk1".into(), range: "B2:B3".into() },
                RangeClear { page: "wk1".into(), range: "C2:C3".into() },
                RangeClear { page: "wk2".into(), range: "B2:B3".into() },
            ])
            .await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(surface.call_count("clear_ranges"), 2);
        assert_eq!(surface.cell("wk1", 2, 2), None);
        assert_eq!(surface.cell("wk2", 2, 2), None);
    }
}
