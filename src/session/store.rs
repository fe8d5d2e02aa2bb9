//! In-process session store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use http::header::HeaderValue;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::cookie::CookieSpec;
use super::{Session, Status};

/// Session store settings.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Cookie carrying the session token.
    pub cookie_name: String,
    /// Absolute lifetime, counted from the session's first save.
    pub lifetime: Duration,
    /// Inactivity limit; `None` means only `lifetime` applies.
    pub idle_timeout: Option<Duration>,
    /// Mark the cookie `Secure` (HTTPS only).
    pub secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "session".to_owned(),
            lifetime: Duration::from_secs(12 * 60 * 60),
            idle_timeout: None,
            secure: false,
        }
    }
}

/// Server-side state of one session, shared by every request carrying its token.
#[derive(Debug)]
pub(crate) struct Record {
    pub values: HashMap<String, Value>,
    expires_at: Instant,
    last_seen: Instant,
}

impl Record {
    pub(crate) fn new(lifetime: Duration) -> Self {
        let now = Instant::now();
        Self { values: HashMap::new(), expires_at: now + lifetime, last_seen: now }
    }

    fn is_expired(&self, now: Instant, idle_timeout: Option<Duration>) -> bool {
        now >= self.expires_at
            || idle_timeout.is_some_and(|idle| now.duration_since(self.last_seen) >= idle)
    }
}

pub(crate) type SharedRecord = Arc<Mutex<Record>>;

/// Process-wide session store.
///
/// A sharded map from token to record: sessions never contend with each
/// other, and each record has its own lock so that reads-and-removes within
/// one session are atomic. Cloning the store clones a handle.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

struct Inner {
    records: DashMap<String, SharedRecord>,
    config: SessionConfig,
    cookie: CookieSpec,
}

impl SessionStore {
    pub fn new(config: SessionConfig) -> Self {
        let cookie = CookieSpec { name: config.cookie_name.clone(), secure: config.secure };
        Self { inner: Arc::new(Inner { records: DashMap::new(), config, cookie }) }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Number of stored sessions, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.inner.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.is_empty()
    }

    /// Drops every expired session and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let idle = self.inner.config.idle_timeout;
        let before = self.inner.records.len();
        self.inner.records.retain(|_, record| !record.lock().is_expired(now, idle));
        before - self.inner.records.len()
    }

    /// Resolves `token` to its live session, or starts a fresh one.
    ///
    /// A fresh session is not stored until something is written to it.
    pub fn load(&self, token: Option<&str>) -> Session {
        let lifetime = self.inner.config.lifetime;
        if let Some(token) = token {
            if let Some(record) = self.live(token) {
                return Session::existing(token.to_owned(), record, lifetime);
            }
        }
        Session::fresh(new_token(), lifetime)
    }

    fn live(&self, token: &str) -> Option<SharedRecord> {
        let record = self.inner.records.get(token)?.value().clone();
        let expired = record.lock().is_expired(Instant::now(), self.inner.config.idle_timeout);
        if expired {
            debug!("session expired");
            self.inner.records.remove(token);
            return None;
        }
        Some(record)
    }

    /// Persists the outcome of one request and returns the `Set-Cookie`
    /// value to send, if any.
    ///
    /// This is the only place a request's staged writes reach the shared
    /// record.
    pub(crate) fn commit(&self, session: &Session) -> Option<HeaderValue> {
        let outcome = session.take_outcome();
        if let Some(old) = &outcome.replaced_token {
            if let Some((_, retired)) = self.inner.records.remove(old) {
                if !Arc::ptr_eq(&retired, &outcome.record) {
                    retired.lock().values.clear();
                }
            }
        }
        match outcome.status {
            Status::Destroyed => {
                self.inner.records.remove(&outcome.token);
                outcome.replaced_token.and_then(|_| self.inner.cookie.expire())
            }
            Status::Modified => {
                let remaining = {
                    let mut record = outcome.record.lock();
                    for (key, value) in outcome.staged {
                        match value {
                            Some(value) => record.values.insert(key, value),
                            None => record.values.remove(&key),
                        };
                    }
                    let now = Instant::now();
                    record.last_seen = now;
                    record.expires_at.saturating_duration_since(now)
                };
                self.inner.records.insert(outcome.token.clone(), outcome.record);
                self.inner.cookie.set(&outcome.token, remaining)
            }
            Status::Unmodified => {
                if outcome.persisted {
                    outcome.record.lock().last_seen = Instant::now();
                }
                None
            }
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

pub(crate) fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FLASH_KEY;

    fn cookie_token(value: &HeaderValue) -> String {
        let s = value.to_str().unwrap();
        s.split(';').next().unwrap().split_once('=').unwrap().1.to_owned()
    }

    #[test]
    fn flash_pops_exactly_once() {
        let store = SessionStore::default();
        let session = store.load(None);
        session.put(FLASH_KEY, "X");
        assert_eq!(session.pop_string(FLASH_KEY), "X");
        assert_eq!(session.pop_string(FLASH_KEY), "");
    }

    #[test]
    fn put_overwrites_and_non_strings_pop_empty() {
        let store = SessionStore::default();
        let session = store.load(None);
        session.put("k", "first");
        session.put("k", "second");
        assert_eq!(session.get_string("k"), "second");
        session.put("n", 7);
        assert_eq!(session.pop_string("n"), "");
        assert!(!session.contains("n"));
        assert_eq!(session.keys(), ["k"]);
    }

    #[test]
    fn fresh_session_is_only_stored_after_a_write() {
        let store = SessionStore::default();
        let idle = store.load(None);
        assert!(store.commit(&idle).is_none());
        assert!(store.is_empty());

        let written = store.load(None);
        written.put(FLASH_KEY, "saved");
        let cookie = store.commit(&written).expect("cookie for new session");
        assert_eq!(store.len(), 1);

        let token = cookie_token(&cookie);
        assert_eq!(token, written.token());
        let again = store.load(Some(&token));
        assert_eq!(again.pop_string(FLASH_KEY), "saved");
    }

    #[test]
    fn unknown_token_starts_fresh_session() {
        let store = SessionStore::default();
        let session = store.load(Some("forged"));
        assert_ne!(session.token(), "forged");
        assert!(session.keys().is_empty());
    }

    #[test]
    fn expired_sessions_are_dropped() {
        let store = SessionStore::new(SessionConfig { lifetime: Duration::ZERO, ..Default::default() });
        let session = store.load(None);
        session.put("k", "v");
        store.commit(&session);
        assert_eq!(store.len(), 1);

        let reloaded = store.load(Some(&session.token()));
        assert_ne!(reloaded.token(), session.token());
        assert!(store.is_empty());

        let other = store.load(None);
        other.put("k", "v");
        store.commit(&other);
        assert_eq!(store.purge_expired(), 1);
    }

    #[test]
    fn destroy_removes_record_and_expires_cookie() {
        let store = SessionStore::default();
        let session = store.load(None);
        session.put("k", "v");
        store.commit(&session);
        let token = session.token();

        let same = store.load(Some(&token));
        same.destroy();
        let cookie = store.commit(&same).expect("expiring cookie");
        assert!(cookie.to_str().unwrap().contains("Max-Age=0"));
        assert!(store.is_empty());
        assert!(store.load(Some(&token)).get("k").is_none());
    }

    #[test]
    fn renew_token_keeps_data_under_new_token() {
        let store = SessionStore::default();
        let session = store.load(None);
        session.put("k", "v");
        store.commit(&session);
        let old = session.token();

        let same = store.load(Some(&old));
        same.renew_token();
        let cookie = store.commit(&same).unwrap();
        let new = cookie_token(&cookie);

        assert_ne!(old, new);
        assert_eq!(store.len(), 1);
        assert_eq!(store.load(Some(&new)).get_string("k"), "v");
    }

    #[test]
    fn staged_writes_are_invisible_until_commit() {
        let store = SessionStore::default();
        let session = store.load(None);
        session.put("k", "v");
        store.commit(&session);
        let token = session.token();

        let writer = store.load(Some(&token));
        writer.put("k", "changed");
        writer.put("extra", "1");
        assert_eq!(writer.get_string("k"), "changed");
        assert_eq!(writer.keys(), ["extra", "k"]);
        assert_eq!(store.load(Some(&token)).get_string("k"), "v");

        store.commit(&writer);
        let reader = store.load(Some(&token));
        assert_eq!(reader.get_string("k"), "changed");
        assert_eq!(reader.get_string("extra"), "1");
    }

    #[test]
    fn rollback_returns_claimed_values() {
        let store = SessionStore::default();
        let session = store.load(None);
        session.put(FLASH_KEY, "keep me");
        store.commit(&session);
        let token = session.token();

        let failing = store.load(Some(&token));
        assert_eq!(failing.pop_string(FLASH_KEY), "keep me");
        failing.put("half", "written");
        assert_eq!(store.load(Some(&token)).get_string(FLASH_KEY), "");
        failing.rollback();

        let after = store.load(Some(&token));
        assert_eq!(after.get_string(FLASH_KEY), "keep me");
        assert!(!after.contains("half"));
    }

    #[test]
    fn dropped_handle_returns_claimed_values() {
        let store = SessionStore::default();
        let session = store.load(None);
        session.put(FLASH_KEY, "keep me");
        store.commit(&session);
        let token = session.token();

        {
            let abandoned = store.load(Some(&token));
            assert_eq!(abandoned.pop_string(FLASH_KEY), "keep me");
        }
        assert_eq!(store.load(Some(&token)).get_string(FLASH_KEY), "keep me");
    }

    #[tokio::test]
    async fn concurrent_pops_hand_out_the_value_once() {
        let store = SessionStore::default();
        let session = store.load(None);
        session.put(FLASH_KEY, "only once");
        store.commit(&session);
        let token = session.token();

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let store = store.clone();
            let token = token.clone();
            tasks.spawn(async move {
                let session = store.load(Some(&token));
                let popped = session.pop_string(FLASH_KEY);
                store.commit(&session);
                popped
            });
        }
        let mut winners = 0;
        while let Some(popped) = tasks.join_next().await {
            if popped.unwrap() == "only once" {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
