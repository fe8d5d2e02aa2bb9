//! Security headers.

use http::header::{HeaderName, HeaderValue, X_FRAME_OPTIONS, X_XSS_PROTECTION};

use super::{Middleware, Next, from_fn};
use crate::request::Request;

const DEFAULTS: [(HeaderName, &str); 2] = [
    (X_XSS_PROTECTION, "1; mode=block"),
    (X_FRAME_OPTIONS, "deny"),
];

/// Adds `X-XSS-Protection` and `X-Frame-Options` to every response.
///
/// A handler that sets either header itself keeps its own value.
pub fn secure_headers() -> Middleware {
    from_fn(|req: Request, next: Next| async move {
        let mut res = next.run(req).await;
        for (name, value) in DEFAULTS {
            res.headers_mut()
                .entry(name)
                .or_insert(HeaderValue::from_static(value));
        }
        res
    })
}
