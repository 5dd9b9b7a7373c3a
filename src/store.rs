// src/store.rs
//! Persistent side of the search path: identity assignment, idempotent
//! batch upserts and the authoritative filtered/sorted/paged read.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;

use crate::content::{ContentRecord, SearchRequest, SortKey, SortOrder};
use crate::pagination::paginate;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("content {id} not found")]
    NotFound { id: i64 },

    /// The batch was rejected before anything was written.
    #[error("invalid record at index {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// One page of matching records plus the total match count.
    async fn search(&self, req: &SearchRequest) -> Result<(Vec<ContentRecord>, usize), StoreError>;

    async fn get_by_id(&self, id: i64) -> Result<ContentRecord, StoreError>;

    /// Insert or update every record by natural key, all or nothing.
    /// Returns the surface id of each input record, in input order.
    async fn upsert_batch(&self, records: &[ContentRecord]) -> Result<Vec<i64>, StoreError>;

    async fn len(&self) -> Result<usize, StoreError>;

    async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }
}

#[derive(Debug, Default)]
struct Rows {
    last_id: i64,
    by_id: BTreeMap<i64, ContentRecord>,
    by_key: HashMap<(String, String), i64>,
}

/// In-process store. Ids start at 1 and are never reused.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<Rows>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn validate(records: &[ContentRecord]) -> Result<(), StoreError> {
    for (index, r) in records.iter().enumerate() {
        let reason = if r.provider.trim().is_empty() {
            "empty provider name"
        } else if r.provider_id.trim().is_empty() {
            "empty provider id"
        } else if !r.score.is_finite() {
            "score is not finite"
        } else {
            continue;
        };
        return Err(StoreError::InvalidRecord {
            index,
            reason: reason.to_string(),
        });
    }
    Ok(())
}

fn matches(record: &ContentRecord, terms: &[String], req: &SearchRequest) -> bool {
    if req.kind.is_some_and(|k| k != record.kind) {
        return false;
    }
    if terms.is_empty() {
        return true;
    }
    let title = record.title.to_lowercase();
    terms.iter().all(|t| title.contains(t.as_str()))
}

fn compare(a: &ContentRecord, b: &ContentRecord, key: SortKey) -> Ordering {
    match key {
        SortKey::Score => a.score.total_cmp(&b.score),
        SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
        SortKey::Popularity => a.views.cmp(&b.views).then(a.likes.cmp(&b.likes)),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn search(&self, req: &SearchRequest) -> Result<(Vec<ContentRecord>, usize), StoreError> {
        let terms: Vec<String> = req
            .query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();

        let mut hits: Vec<ContentRecord> = {
            let g = self.rows.read();
            g.by_id
                .values()
                .filter(|r| matches(r, &terms, req))
                .cloned()
                .collect()
        };

        hits.sort_by(|a, b| {
            let ord = compare(a, b, req.sort_by);
            let ord = match req.sort_order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            };
            ord.then(a.id.cmp(&b.id))
        });

        let total = hits.len();
        Ok((paginate(&hits, req.page, req.page_size), total))
    }

    async fn get_by_id(&self, id: i64) -> Result<ContentRecord, StoreError> {
        self.rows
            .read()
            .by_id
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { id })
    }

    async fn upsert_batch(&self, records: &[ContentRecord]) -> Result<Vec<i64>, StoreError> {
        validate(records)?;

        let mut g = self.rows.write();
        let mut ids = Vec::with_capacity(records.len());
        let (mut inserted, mut updated) = (0usize, 0usize);

        for r in records {
            let (provider_id, provider) = r.natural_key();
            let key = (provider_id.to_string(), provider.to_string());
            if let Some(&id) = g.by_key.get(&key) {
                if let Some(row) = g.by_id.get_mut(&id) {
                    row.title = r.title.clone();
                    row.kind = r.kind;
                    row.views = r.views;
                    row.likes = r.likes;
                    row.reading_time = r.reading_time;
                    row.reactions = r.reactions;
                    row.score = r.score;
                }
                updated += 1;
                ids.push(id);
            } else {
                g.last_id += 1;
                let id = g.last_id;
                let mut row = r.clone();
                row.id = Some(id);
                g.by_id.insert(id, row);
                g.by_key.insert(key, id);
                inserted += 1;
                ids.push(id);
            }
        }

        tracing::debug!(inserted, updated, "upserted content batch");
        Ok(ids)
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.rows.read().by_id.len())
    }
}
