//! Server-side HTML templates.
//!
//! Pages are compiled once at startup into a [`TemplateCache`] and rendered
//! per request by [`render`]. Rendering is two-phase: the page is executed
//! into an in-memory buffer, and only a fully successful execution becomes
//! a response. A template that fails halfway produces an error, never a
//! truncated page.
//!
//! File naming in the template directory:
//!
//! | Suffix | Role |
//! |---|---|
//! | `*.page.html` | one cache entry each, looked up by file name |
//! | `*.layout.html` | shared skeletons pages `{% extends %}` |
//! | `*.partial.html` | shared fragments pages and layouts `{% include %}` |

mod cache;
mod functions;
mod render;

use std::collections::BTreeMap;
use std::path::PathBuf;

use minijinja::Value;
use serde::Serialize;

pub use cache::{TemplateCache, TemplateUnit};
pub use render::{CURRENT_YEAR_KEY, render, with_defaults, write_page};

/// Failures building or looking up the template cache.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("reading {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {name}")]
    Parse {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("template name `{0}` is defined more than once")]
    Collision(String),

    #[error("the template {0} does not exist")]
    NotFound(String),
}

/// Failures turning a cached page into bytes.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("executing {name}")]
    Execute {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("writing rendered page")]
    Flush(#[source] std::io::Error),
}

/// Per-request data handed to a page.
///
/// Handlers fill in the page payload (`snippet`, `snippets`, `form`);
/// [`with_defaults`] adds the reserved `current_year` and `flash` entries.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct RenderContext {
    values: BTreeMap<String, Value>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `value` under `key` and returns the context for chaining.
    pub fn with(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.insert(key, value);
        self
    }

    /// Adds or replaces `key`.
    ///
    /// Values that fail to serialize surface as a render error when the
    /// template touches them.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Serialize) {
        self.values.insert(key.into(), Value::from_serialize(&value));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}
