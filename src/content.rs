// src/content.rs
//! Content records aggregated from providers, plus the search request/response
//! value objects that travel between the API and the coordinator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SearchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Video,
    Text,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Video => "video",
            ContentKind::Text => "text",
        }
    }

    /// Parse an optional `type` filter. Empty and `all` mean "no filter".
    pub fn parse_filter(raw: Option<&str>) -> Result<Option<ContentKind>, SearchError> {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(None);
        };
        if raw.eq_ignore_ascii_case("all") {
            return Ok(None);
        }
        raw.parse().map(Some)
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "video" => Ok(ContentKind::Video),
            "text" => Ok(ContentKind::Text),
            other => Err(SearchError::invalid_input(
                "type",
                format!("unknown content type '{other}' (expected video, text or all)"),
            )),
        }
    }
}

/// A unit of aggregated content.
///
/// Identity across fetch cycles is the natural key `(provider_id, provider)`.
/// `id` is the surface identity and is only ever assigned by a [`crate::store::Store`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: Option<i64>,
    pub provider_id: String,
    pub provider: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub reading_time: u64,
    #[serde(default)]
    pub reactions: u64,
    #[serde(default)]
    pub score: f64,
    pub created_at: DateTime<Utc>,
}

impl ContentRecord {
    /// Fresh, unsaved record as produced by a provider adapter.
    pub fn new(
        provider: impl Into<String>,
        provider_id: impl Into<String>,
        title: impl Into<String>,
        kind: ContentKind,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            provider_id: provider_id.into(),
            provider: provider.into(),
            title: title.into(),
            kind,
            views: 0,
            likes: 0,
            reading_time: 0,
            reactions: 0,
            score: 0.0,
            created_at,
        }
    }

    pub fn natural_key(&self) -> (&str, &str) {
        (&self.provider_id, &self.provider)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Score,
    CreatedAt,
    Popularity,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Score => "score",
            SortKey::CreatedAt => "created_at",
            SortKey::Popularity => "popularity",
        }
    }

    pub fn parse_opt(raw: Option<&str>) -> Result<Self, SearchError> {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(SortKey::default()),
            Some(s) => match s.to_ascii_lowercase().as_str() {
                "score" => Ok(SortKey::Score),
                "created_at" => Ok(SortKey::CreatedAt),
                "popularity" => Ok(SortKey::Popularity),
                other => Err(SearchError::invalid_input(
                    "sort_by",
                    format!("unknown sort key '{other}' (expected score, created_at or popularity)"),
                )),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    pub fn parse_opt(raw: Option<&str>) -> Result<Self, SearchError> {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(SortOrder::default()),
            Some(s) if s.eq_ignore_ascii_case("asc") => Ok(SortOrder::Asc),
            Some(s) if s.eq_ignore_ascii_case("desc") => Ok(SortOrder::Desc),
            Some(other) => Err(SearchError::invalid_input(
                "sort_order",
                format!("unknown sort order '{other}' (expected asc or desc)"),
            )),
        }
    }
}

/// Search parameters. `page`/`page_size` of 0 mean "use the default".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub kind: Option<ContentKind>,
    pub page: usize,
    pub page_size: usize,
    pub sort_by: SortKey,
    pub sort_order: SortOrder,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: Option<ContentKind>) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_page(mut self, page: usize, page_size: usize) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    pub fn with_sort(mut self, sort_by: SortKey, sort_order: SortOrder) -> Self {
        self.sort_by = sort_by;
        self.sort_order = sort_order;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub items: Vec<ContentRecord>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

impl SearchResponse {
    pub fn new(items: Vec<ContentRecord>, total: usize, page: usize, page_size: usize) -> Self {
        Self {
            items,
            total,
            page,
            page_size,
            total_pages: crate::pagination::total_pages(total, page_size),
        }
    }
}
