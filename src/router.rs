//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. The router is the
//! terminal handler that the outer middleware chain wraps: it picks the
//! route's handler (itself usually a chain-wrapped [`BoxedHandler`]) and
//! forwards the request.

use std::collections::HashMap;

use http::header::{self, HeaderValue};
use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler};
use crate::request::Request;
use crate::response::Response;

/// The application router.
///
/// Build it once at startup, then turn it into a handler with
/// [`Router::into_handler`]. Each registration returns `self` so calls chain.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax and are read with `req.param("name")`.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered for `method`. Routes are fixed at startup, so this is a
    /// programming error rather than a runtime condition.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub(crate) fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((matched.value.clone(), params))
    }

    /// Methods with a route matching `path`, sorted for a stable `Allow` header.
    fn allowed(&self, path: &str) -> Vec<String> {
        let mut methods: Vec<String> = self.routes.iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(method, _)| method.as_str().to_owned())
            .collect();
        methods.sort_unstable();
        methods
    }

    /// Freezes the routing table into a terminal handler.
    ///
    /// Unmatched paths get `404 Not Found`; a path registered only for other
    /// methods gets `405 Method Not Allowed` with an `Allow` header.
    pub fn into_handler(self) -> BoxedHandler {
        BoxedHandler::new(Dispatch(self))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

struct Dispatch(Router);

impl ErasedHandler for Dispatch {
    fn call(&self, mut req: Request) -> BoxFuture {
        match self.0.lookup(req.method(), req.path()) {
            Some((handler, params)) => {
                req.set_params(params);
                handler.call(req)
            }
            None => {
                let allowed = self.0.allowed(req.path());
                Box::pin(async move {
                    if allowed.is_empty() {
                        return Response::not_found();
                    }
                    let mut res = Response::error(StatusCode::METHOD_NOT_ALLOWED);
                    if let Ok(value) = HeaderValue::try_from(allowed.join(", ")) {
                        res.headers_mut().insert(header::ALLOW, value);
                    }
                    res
                })
            }
        }
    }
}
