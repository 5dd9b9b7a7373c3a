// src/pagination.rs
//! Page bounds normalization and in-memory slicing of cached result sets.

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::content::SearchRequest;

pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

/// Collapse whitespace and trim the query text.
pub fn normalize_query(s: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));
    re_ws.replace_all(s.trim(), " ").into_owned()
}

/// Returns a copy of `req` with page >= 1 and 1 <= page_size <= max.
pub fn normalize(req: &SearchRequest, limits: PageLimits) -> SearchRequest {
    let mut out = req.clone();
    out.query = normalize_query(&req.query);
    if out.page == 0 {
        out.page = DEFAULT_PAGE;
    }
    if out.page_size == 0 {
        out.page_size = limits.default_page_size.max(1);
    }
    let max = limits.max_page_size.max(1);
    if out.page_size > max {
        out.page_size = max;
    }
    out
}

/// `ceil(total / page_size)`; zero when there is nothing to page.
pub fn total_pages(total: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size)
}

/// Slice one page out of a full result set. A start beyond the set yields an
/// empty page, an end beyond the set yields a truncated final page.
pub fn paginate<T: Clone>(all: &[T], page: usize, page_size: usize) -> Vec<T> {
    let start = page.saturating_sub(1).saturating_mul(page_size);
    if start >= all.len() {
        return Vec::new();
    }
    let end = start.saturating_add(page_size).min(all.len());
    all[start..end].to_vec()
}
