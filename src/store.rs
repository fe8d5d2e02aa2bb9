//! Snippet storage.
//!
//! Handlers only see the [`SnippetStore`] trait. [`MemoryStore`] keeps
//! everything in process memory and is what the binary runs with.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No snippet with that id, or it has expired.
    #[error("no matching record found")]
    NotFound,

    #[error("snippet store: {0}")]
    Backend(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Snippet {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

/// Input for [`SnippetStore::insert`].
#[derive(Clone, Debug)]
pub struct NewSnippet {
    pub title: String,
    pub content: String,
    /// Days until the snippet disappears.
    pub expires_days: i64,
}

#[async_trait]
pub trait SnippetStore: Send + Sync + 'static {
    /// Saves a snippet and returns its id.
    async fn insert(&self, snippet: NewSnippet) -> Result<i64, StoreError>;

    /// Fetches a live snippet. Expired snippets are [`StoreError::NotFound`].
    async fn get(&self, id: i64) -> Result<Snippet, StoreError>;

    /// Up to `limit` live snippets, newest first.
    async fn latest(&self, limit: usize) -> Result<Vec<Snippet>, StoreError>;
}

/// In-memory [`SnippetStore`]. Ids start at 1 and are never reused.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Rows>,
}

#[derive(Debug, Default)]
struct Rows {
    last_id: i64,
    by_id: BTreeMap<i64, Snippet>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fully specified row, for seeding and tests.
    pub fn insert_at(&self, title: &str, content: &str, created: DateTime<Utc>, expires: DateTime<Utc>) -> i64 {
        let mut rows = self.inner.write();
        rows.last_id += 1;
        let id = rows.last_id;
        let snippet = Snippet { id, title: title.to_owned(), content: content.to_owned(), created, expires };
        rows.by_id.insert(id, snippet);
        id
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SnippetStore for MemoryStore {
    async fn insert(&self, snippet: NewSnippet) -> Result<i64, StoreError> {
        let now = Utc::now();
        let expires = Duration::try_days(snippet.expires_days)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| StoreError::Backend(format!("expiry of {} days is out of range", snippet.expires_days)))?;
        Ok(self.insert_at(&snippet.title, &snippet.content, now, expires))
    }

    async fn get(&self, id: i64) -> Result<Snippet, StoreError> {
        let now = Utc::now();
        self.inner
            .read()
            .by_id
            .get(&id)
            .filter(|s| s.expires > now)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn latest(&self, limit: usize) -> Result<Vec<Snippet>, StoreError> {
        let now = Utc::now();
        let rows = self.inner.read();
        let mut live: Vec<Snippet> = rows.by_id.values().filter(|s| s.expires > now).cloned().collect();
        live.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        live.truncate(limit);
        Ok(live)
    }
}
