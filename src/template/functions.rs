//! Helpers every page may call.
//!
//! The registry is fixed at compile time and attached to each page's
//! environment when the cache is built. Each entry is registered both as a
//! filter (`{{ created | human_date }}`) and as a function
//! (`{{ human_date(created) }}`).

use chrono::{DateTime, Utc};
use minijinja::{Environment, Error, ErrorKind, Value};

type Helper = fn(Value) -> Result<String, Error>;

const HELPERS: &[(&str, Helper)] = &[
    ("human_date", human_date),
];

pub(crate) fn register(env: &mut Environment<'static>) {
    for &(name, helper) in HELPERS {
        env.add_filter(name, helper);
        env.add_function(name, helper);
    }
}

/// Formats an RFC 3339 timestamp as `02 Jan 2006 at 15:04`, in UTC.
///
/// Missing or empty values render as the empty string.
fn human_date(value: Value) -> Result<String, Error> {
    if value.is_undefined() || value.is_none() {
        return Ok(String::new());
    }
    let Some(raw) = value.as_str() else {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("human_date expects a timestamp string, got {}", value.kind()),
        ));
    };
    if raw.is_empty() {
        return Ok(String::new());
    }
    let parsed = DateTime::parse_from_rfc3339(raw).map_err(|e| {
        Error::new(ErrorKind::InvalidOperation, format!("human_date: `{raw}`: {e}"))
    })?;
    Ok(parsed.with_timezone(&Utc).format("%d %b %Y at %H:%M").to_string())
}
