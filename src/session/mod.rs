//! Server-side sessions and one-time flash messages.
//!
//! The browser holds an opaque token in a cookie; everything else lives in
//! the [`SessionStore`]. [`load_and_save`] is the middleware that attaches a
//! [`Session`] handle to each request and persists changes afterwards:
//!
//! ```text
//! request ──► load(token from cookie) ──► extensions.insert(session)
//!                                               │
//!                                           handler: put / pop_string
//!                                               │
//! response ◄── Set-Cookie ◄── commit(session) ◄─┘
//! ```
//!
//! A request's writes are staged on its own handle and reach the store only
//! at commit. A request that panics, is dropped, or answers with a `5xx`
//! leaves the stored session as it found it.
//!
//! A flash message is just the [`FLASH_KEY`] entry read with
//! [`Session::pop_string`]: the read removes it, so it shows exactly once.

mod cookie;
mod store;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use http::header::{CACHE_CONTROL, HeaderValue, SET_COOKIE, VARY};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::middleware::{Middleware, Next, from_fn};
use crate::request::Request;

pub use store::{SessionConfig, SessionStore};

use store::{Record, SharedRecord, new_token};

/// Reserved key for the one-time notice shown on the next rendered page.
pub const FLASH_KEY: &str = "flash";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Status {
    Unmodified,
    Modified,
    Destroyed,
}

/// Handle to one client's session for the duration of a request.
///
/// Obtained with [`Request::session`]. Clones share state.
///
/// Reads see the stored record overlaid with this request's staged writes.
/// [`put`](Session::put) and [`remove`](Session::remove) stay staged until
/// the store commits the request. [`pop`](Session::pop) of a stored value
/// claims it from the shared record under its lock, so two concurrent
/// requests can never both receive it; the claim is handed back if the
/// request ends without committing.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Mutex<Meta>>,
}

struct Meta {
    token: String,
    record: SharedRecord,
    lifetime: Duration,
    status: Status,
    persisted: bool,
    replaced_token: Option<String>,
    /// `Some` is a pending write, `None` a pending removal.
    staged: HashMap<String, Option<Value>>,
    /// Values taken out of a shared record by `pop`, returned on rollback.
    claimed: Vec<(SharedRecord, String, Value)>,
}

impl Meta {
    fn rollback(&mut self) {
        for (record, key, value) in self.claimed.drain(..) {
            record.lock().values.entry(key).or_insert(value);
        }
        self.staged.clear();
        self.status = Status::Unmodified;
    }
}

impl Drop for Meta {
    fn drop(&mut self) {
        if !self.claimed.is_empty() {
            debug!(claimed = self.claimed.len(), "session dropped without commit, restoring");
        }
        self.rollback();
    }
}

/// What one request did to its session, consumed by [`SessionStore::commit`].
pub(crate) struct Outcome {
    pub token: String,
    pub record: SharedRecord,
    pub status: Status,
    pub persisted: bool,
    pub replaced_token: Option<String>,
    pub staged: HashMap<String, Option<Value>>,
}

impl Session {
    fn new(token: String, record: SharedRecord, lifetime: Duration, persisted: bool) -> Self {
        let meta = Meta {
            token,
            record,
            lifetime,
            status: Status::Unmodified,
            persisted,
            replaced_token: None,
            staged: HashMap::new(),
            claimed: Vec::new(),
        };
        Self { inner: Arc::new(Mutex::new(meta)) }
    }

    pub(crate) fn existing(token: String, record: SharedRecord, lifetime: Duration) -> Self {
        Self::new(token, record, lifetime, true)
    }

    pub(crate) fn fresh(token: String, lifetime: Duration) -> Self {
        let record = Arc::new(Mutex::new(Record::new(lifetime)));
        Self::new(token, record, lifetime, false)
    }

    /// Current token. Changes after [`renew_token`](Session::renew_token)
    /// or [`destroy`](Session::destroy).
    pub fn token(&self) -> String {
        self.inner.lock().token.clone()
    }

    /// Stages `value` under `key`, silently replacing any previous value.
    ///
    /// A write after [`destroy`](Session::destroy) starts a new session
    /// that is saved under the new token.
    pub fn put(&self, key: impl Into<String>, value: impl Into<Value>) {
        let mut meta = self.inner.lock();
        meta.staged.insert(key.into(), Some(value.into()));
        meta.status = Status::Modified;
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let meta = self.inner.lock();
        if let Some(staged) = meta.staged.get(key) {
            return staged.clone();
        }
        let stored = meta.record.lock().values.get(key).cloned();
        stored
    }

    /// String value of `key`; empty when absent or not a string.
    pub fn get_string(&self, key: &str) -> String {
        self.get(key).and_then(into_string).unwrap_or_default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let meta = self.inner.lock();
        let mut keys: Vec<String> = meta
            .record
            .lock()
            .values
            .keys()
            .filter(|k| !meta.staged.contains_key(*k))
            .cloned()
            .collect();
        keys.extend(meta.staged.iter().filter(|(_, v)| v.is_some()).map(|(k, _)| k.clone()));
        keys.sort_unstable();
        keys
    }

    /// Removes `key` and returns what it held.
    ///
    /// A staged value is simply unstaged. A stored value is claimed from
    /// the shared record in one step under its lock.
    pub fn pop(&self, key: &str) -> Option<Value> {
        let mut guard = self.inner.lock();
        let meta = &mut *guard;
        let value = match meta.staged.get_mut(key) {
            Some(staged) => staged.take(),
            None => {
                let claimed = meta.record.lock().values.remove(key);
                if let Some(value) = &claimed {
                    let record = Arc::clone(&meta.record);
                    meta.claimed.push((record, key.to_owned(), value.clone()));
                }
                claimed
            }
        };
        if value.is_some() {
            meta.status = Status::Modified;
        }
        value
    }

    /// [`pop`](Session::pop) as a string; empty when absent or not a string.
    ///
    /// A second call returns the empty string.
    pub fn pop_string(&self, key: &str) -> String {
        self.pop(key).and_then(into_string).unwrap_or_default()
    }

    pub fn remove(&self, key: &str) {
        self.pop(key);
    }

    /// Drops all data and retires the token. When the request completes the
    /// stored session is deleted and the cookie expired, unless something
    /// is written afterwards, in which case a new session with a new token
    /// is saved instead.
    pub fn destroy(&self) {
        let mut meta = self.inner.lock();
        let old = std::mem::replace(&mut meta.token, new_token());
        if meta.persisted {
            meta.replaced_token = Some(old);
        }
        meta.record = Arc::new(Mutex::new(Record::new(meta.lifetime)));
        meta.staged.clear();
        meta.persisted = false;
        meta.status = Status::Destroyed;
    }

    /// Issues a new token for the same data, retiring the old one.
    pub fn renew_token(&self) {
        let mut meta = self.inner.lock();
        let old = std::mem::replace(&mut meta.token, new_token());
        if meta.persisted && meta.replaced_token.is_none() {
            meta.replaced_token = Some(old);
        }
        meta.status = Status::Modified;
    }

    /// Hands the request's changes to the store and resets the handle to
    /// "nothing pending".
    pub(crate) fn take_outcome(&self) -> Outcome {
        let mut meta = self.inner.lock();
        meta.claimed.clear();
        let outcome = Outcome {
            token: meta.token.clone(),
            record: Arc::clone(&meta.record),
            status: meta.status,
            persisted: meta.persisted,
            replaced_token: meta.replaced_token.take(),
            staged: std::mem::take(&mut meta.staged),
        };
        match meta.status {
            Status::Modified => meta.persisted = true,
            Status::Destroyed => meta.persisted = false,
            Status::Unmodified => {}
        }
        meta.status = Status::Unmodified;
        outcome
    }

    /// Abandons the request's changes: staged writes are dropped and
    /// claimed values go back to the stored record.
    pub(crate) fn rollback(&self) {
        self.inner.lock().rollback();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let meta = self.inner.lock();
        f.debug_struct("Session")
            .field("status", &meta.status)
            .field("persisted", &meta.persisted)
            .field("staged", &meta.staged.len())
            .finish_non_exhaustive()
    }
}

fn into_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        _ => None,
    }
}

/// Middleware attaching the request's session and saving it afterwards.
///
/// Before dispatch: reads the session cookie, loads the live session (or
/// starts a fresh one) and inserts the [`Session`] into request extensions.
/// After dispatch: commits changes and appends `Set-Cookie` when the token
/// must be sent or cleared. A `5xx` response rolls the session back
/// instead; a panic or a dropped request rolls it back when the handle is
/// dropped.
pub fn load_and_save(store: SessionStore) -> Middleware {
    from_fn(move |mut req: Request, next: Next| {
        let store = store.clone();
        async move {
            let token = cookie::find(req.headers(), &store.config().cookie_name);
            let session = store.load(token.as_deref());
            req.extensions_mut().insert(session.clone());

            let mut res = next.run(req).await;

            if res.status_code().is_server_error() {
                debug!(status = res.status_code().as_u16(), "request failed, session rolled back");
                session.rollback();
                return res;
            }
            if let Some(cookie) = store.commit(&session) {
                let headers = res.headers_mut();
                headers.append(SET_COOKIE, cookie);
                headers.append(VARY, HeaderValue::from_static("Cookie"));
                headers.insert(CACHE_CONTROL, HeaderValue::from_static(r#"no-cache="Set-Cookie""#));
            }
            res
        }
    })
}
