//! Middleware layer.
//!
//! A [`Middleware`] is a function from handler to handler: it receives the
//! downstream [`BoxedHandler`] and returns a new one that wraps it. A
//! [`Chain`] is an ordered list of them. Declaration order is execution
//! order: the first middleware sees the request first and the response last.
//!
//! ```text
//! Chain::new([a, b, c]).then(h)   ==   a(b(c(h)))
//!
//! a-pre → b-pre → c-pre → h → c-post → b-post → a-post
//! ```
//!
//! Built-in middleware:
//! - [`recover_panic`]: turns a panicking handler into a `500`
//! - [`log_request`]: access log line per request
//! - [`secure_headers`]: anti-XSS and anti-framing headers
//! - [`session::load_and_save`](crate::session::load_and_save): attaches the session

mod headers;
mod log;
mod recover;

use std::future::Future;
use std::sync::Arc;

use crate::handler::{self, BoxFuture, BoxedHandler, ErasedHandler, Handler};
use crate::request::Request;
use crate::response::Response;

pub use headers::secure_headers;
pub use log::log_request;
pub use recover::recover_panic;

/// A handler-to-handler transformation.
///
/// Cloning is cheap; the same middleware value can appear in any number of
/// chains.
#[derive(Clone)]
pub struct Middleware(Arc<dyn Fn(BoxedHandler) -> BoxedHandler + Send + Sync>);

impl Middleware {
    pub fn new<F>(wrap: F) -> Self
    where
        F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
    {
        Self(Arc::new(wrap))
    }

    /// Wraps `inner`, returning the composed handler.
    pub fn wrap(&self, inner: BoxedHandler) -> BoxedHandler {
        (self.0)(inner)
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Middleware")
    }
}

/// Handle to the rest of the chain.
///
/// [`Next::run`] consumes the handle, so a middleware calls downstream at
/// most once. Dropping it without running short-circuits the request.
pub struct Next(BoxedHandler);

impl Next {
    pub async fn run(self, req: Request) -> Response {
        self.0.call(req).await
    }
}

/// Builds a [`Middleware`] from an async function of the request and the
/// rest of the chain.
///
/// ```rust
/// use snippetbox::middleware::{self, Next};
/// use snippetbox::Request;
///
/// let timing = middleware::from_fn(|req: Request, next: Next| async move {
///     let started = std::time::Instant::now();
///     let res = next.run(req).await;
///     tracing::debug!(elapsed = ?started.elapsed(), "done");
///     res
/// });
/// ```
pub fn from_fn<F, Fut>(f: F) -> Middleware
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    let f = Arc::new(f);
    Middleware::new(move |inner| BoxedHandler::new(FnLayer { f: Arc::clone(&f), inner }))
}

struct FnLayer<F> {
    f: Arc<F>,
    inner: BoxedHandler,
}

impl<F, Fut> ErasedHandler for FnLayer<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        Box::pin((self.f)(req, Next(self.inner.clone())))
    }
}

/// An immutable, ordered list of middleware.
///
/// `append` and `extend` return new chains; the receiver is never modified,
/// so a base chain can be shared and specialised per route group.
#[derive(Clone, Debug, Default)]
pub struct Chain {
    middleware: Vec<Middleware>,
}

impl Chain {
    pub fn new(middleware: impl IntoIterator<Item = Middleware>) -> Self {
        Self { middleware: middleware.into_iter().collect() }
    }

    /// A new chain running `self`'s middleware, then `more`.
    pub fn append(&self, more: impl IntoIterator<Item = Middleware>) -> Self {
        let mut middleware = self.middleware.clone();
        middleware.extend(more);
        Self { middleware }
    }

    /// A new chain running `self`'s middleware, then `other`'s.
    pub fn extend(&self, other: &Chain) -> Self {
        self.append(other.middleware.iter().cloned())
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Wraps `handler` in every middleware of the chain.
    ///
    /// The fold runs from the last declared middleware inward, so the first
    /// declared one ends up outermost.
    pub fn then(&self, handler: impl Handler) -> BoxedHandler {
        self.middleware
            .iter()
            .rev()
            .fold(handler.into_boxed_handler(), |inner, mw| mw.wrap(inner))
    }

    /// Like [`then`](Chain::then), substituting the `404` handler when no
    /// terminal handler is given.
    pub fn then_or_default(&self, terminal: Option<BoxedHandler>) -> BoxedHandler {
        match terminal {
            Some(terminal) => self.then(terminal),
            None => self.then(handler::not_found),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;
    use parking_lot::Mutex;

    use super::*;

    type Trace = Arc<Mutex<Vec<String>>>;

    fn request() -> Request {
        http::Request::builder().uri("/").body(Bytes::new()).unwrap().into()
    }

    fn tracer(name: &'static str, trace: &Trace) -> Middleware {
        let trace = Arc::clone(trace);
        from_fn(move |req, next| {
            let trace = Arc::clone(&trace);
            async move {
                trace.lock().push(format!("{name}-pre"));
                let res = next.run(req).await;
                trace.lock().push(format!("{name}-post"));
                res
            }
        })
    }

    fn terminal(trace: &Trace) -> BoxedHandler {
        let trace = Arc::clone(trace);
        let h = move |_req: Request| {
            let trace = Arc::clone(&trace);
            async move {
                trace.lock().push("H".to_owned());
                "ok"
            }
        };
        h.into_boxed_handler()
    }

    #[tokio::test]
    async fn runs_in_declared_order_and_unwinds_in_reverse() {
        let trace = Trace::default();
        let chain = Chain::new([tracer("A", &trace), tracer("B", &trace), tracer("C", &trace)]);

        let res = chain.then(terminal(&trace)).call(request()).await;

        assert_eq!(res.body(), b"ok");
        assert_eq!(
            *trace.lock(),
            ["A-pre", "B-pre", "C-pre", "H", "C-post", "B-post", "A-post"],
        );
    }

    #[tokio::test]
    async fn append_and_extend_leave_original_untouched() {
        let trace = Trace::default();
        let base = Chain::new([tracer("A", &trace)]);
        let appended = base.append([tracer("B", &trace)]);
        let extended = base.extend(&Chain::new([tracer("C", &trace), tracer("D", &trace)]));

        assert_eq!(base.len(), 1);
        assert_eq!(appended.len(), 2);
        assert_eq!(extended.len(), 3);

        base.then(terminal(&trace)).call(request()).await;
        assert_eq!(*trace.lock(), ["A-pre", "H", "A-post"]);

        trace.lock().clear();
        extended.then(terminal(&trace)).call(request()).await;
        assert_eq!(
            *trace.lock(),
            ["A-pre", "C-pre", "D-pre", "H", "D-post", "C-post", "A-post"],
        );
    }

    #[tokio::test]
    async fn short_circuit_skips_downstream() {
        let trace = Trace::default();
        let deny = from_fn(|_req, _next| async { Response::error(StatusCode::FORBIDDEN) });
        let chain = Chain::new([tracer("A", &trace), deny, tracer("B", &trace)]);

        let res = chain.then(terminal(&trace)).call(request()).await;

        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(*trace.lock(), ["A-pre", "A-post"]);
    }

    #[tokio::test]
    async fn missing_terminal_handler_is_not_found() {
        let res = Chain::default().then_or_default(None).call(request()).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    }
}
