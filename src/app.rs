//! Composition root: routes, middleware chains and page handlers.
//!
//! ```text
//! recover_panic → log_request → secure_headers → router
//!                                                  ├─ GET  /                  ┐
//!                                                  ├─ GET  /snippet/create    │ load_and_save
//!                                                  ├─ POST /snippet/create    │ → handler
//!                                                  ├─ GET  /snippet/{id}      ┘
//!                                                  ├─ GET  /api/v1/home
//!                                                  └─ GET  /api/v1/snippet?id=N
//! ```

use std::future::Future;
use std::sync::Arc;

use http::StatusCode;
use tracing::{debug, error};

use crate::forms::Form;
use crate::handler::{BoxedHandler, Handler};
use crate::middleware::{Chain, log_request, recover_panic, secure_headers};
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;
use crate::session::{self, FLASH_KEY, SessionStore};
use crate::store::{NewSnippet, SnippetStore, StoreError};
use crate::template::{RenderContext, TemplateCache, render};

/// How many snippets the home page lists.
pub const LATEST_LIMIT: usize = 3;

const EXPIRY_CHOICES: [&str; 3] = ["365", "7", "1"];
const ITEM_CHOICES: [&str; 3] = ["foo", "bar", "baz"];
const TITLE_MAX: usize = 100;

/// Shared application state. Every field is read-only or internally
/// synchronised, so handlers share one `Arc<App>`.
pub struct App {
    pub templates: Arc<TemplateCache>,
    pub snippets: Arc<dyn SnippetStore>,
    pub sessions: SessionStore,
}

impl App {
    pub fn new(templates: TemplateCache, snippets: impl SnippetStore, sessions: SessionStore) -> Self {
        Self { templates: Arc::new(templates), snippets: Arc::new(snippets), sessions }
    }

    /// Builds the full request pipeline.
    pub fn routes(self) -> BoxedHandler {
        let app = Arc::new(self);
        let standard = Chain::new([recover_panic(), log_request(), secure_headers()]);
        let dynamic = Chain::new([session::load_and_save(app.sessions.clone())]);

        let router = Router::new()
            .get("/", dynamic.then(bind(&app, Self::home)))
            .get("/snippet/create", dynamic.then(bind(&app, Self::create_snippet_form)))
            .post("/snippet/create", dynamic.then(bind(&app, Self::create_snippet)))
            .get("/snippet/{id}", dynamic.then(bind(&app, Self::show_snippet)))
            .get("/api/v1/home", bind(&app, Self::api_home))
            .get("/api/v1/snippet", bind(&app, Self::api_show_snippet));

        standard.then(router.into_handler())
    }

    async fn home(self: Arc<Self>, req: Request) -> Response {
        match self.snippets.latest(LATEST_LIMIT).await {
            Ok(snippets) => self.render(&req, "home.page.html", RenderContext::new().with("snippets", snippets)),
            Err(e) => self.server_error(&req, &e),
        }
    }

    async fn show_snippet(self: Arc<Self>, req: Request) -> Response {
        let Some(id) = parse_id(req.param("id")) else {
            return self.not_found(&req);
        };
        match self.snippets.get(id).await {
            Ok(snippet) => self.render(&req, "show.page.html", RenderContext::new().with("snippet", snippet)),
            Err(StoreError::NotFound) => self.not_found(&req),
            Err(e) => self.server_error(&req, &e),
        }
    }

    async fn create_snippet_form(self: Arc<Self>, req: Request) -> Response {
        self.render(&req, "create.page.html", RenderContext::new().with("form", Form::default()))
    }

    async fn create_snippet(self: Arc<Self>, req: Request) -> Response {
        let pairs = match req.form_pairs() {
            Ok(pairs) => pairs,
            Err(e) => {
                debug!(error = %e, "malformed form body");
                return Response::error(StatusCode::BAD_REQUEST);
            }
        };

        let mut form = Form::new(pairs);
        form.required(&["title", "content", "expires"]);
        form.max_length("title", TITLE_MAX);
        form.permitted_values("expires", &EXPIRY_CHOICES);
        form.permitted_values("items", &ITEM_CHOICES);

        if !form.is_valid() {
            return self.render(&req, "create.page.html", RenderContext::new().with("form", form));
        }

        let snippet = NewSnippet {
            title: form.get("title").to_owned(),
            content: form.get("content").to_owned(),
            expires_days: form.get("expires").parse().unwrap_or(1),
        };
        let id = match self.snippets.insert(snippet).await {
            Ok(id) => id,
            Err(e) => return self.server_error(&req, &e),
        };

        if let Some(session) = req.session() {
            session.put(FLASH_KEY, "Snippet successfully created!");
        }
        Response::redirect(&format!("/snippet/{id}"))
    }

    async fn api_home(self: Arc<Self>, req: Request) -> Response {
        match self.snippets.latest(LATEST_LIMIT).await {
            Ok(snippets) => self.json(&req, &snippets),
            Err(e) => self.server_error(&req, &e),
        }
    }

    async fn api_show_snippet(self: Arc<Self>, req: Request) -> Response {
        let Some(id) = parse_id(req.query("id").as_deref()) else {
            return self.not_found(&req);
        };
        match self.snippets.get(id).await {
            Ok(snippet) => self.json(&req, &snippet),
            Err(StoreError::NotFound) => self.not_found(&req),
            Err(e) => self.server_error(&req, &e),
        }
    }

    /// Renders a page; any failure becomes the generic `500` page.
    pub fn render(&self, req: &Request, name: &str, ctx: RenderContext) -> Response {
        match render(&self.templates, req, name, ctx) {
            Ok(res) => res,
            Err(e) => self.server_error(req, &e),
        }
    }

    fn json(&self, req: &Request, value: &impl serde::Serialize) -> Response {
        match serde_json::to_vec_pretty(value) {
            Ok(body) => Response::json(body),
            Err(e) => self.server_error(req, &e),
        }
    }

    fn server_error(&self, req: &Request, err: &dyn std::error::Error) -> Response {
        error!(method = %req.method(), uri = %req.uri(), error = %ErrorChain(err), "request failed");
        Response::internal_error()
    }

    fn not_found(&self, req: &Request) -> Response {
        debug!(uri = %req.uri(), "not found");
        Response::not_found()
    }
}

/// Adapts a method taking `Arc<App>` into a route handler.
fn bind<F, Fut>(app: &Arc<App>, f: F) -> impl Handler
where
    F: Fn(Arc<App>, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    let app = Arc::clone(app);
    move |req: Request| f(Arc::clone(&app), req)
}

/// Ids are positive integers; anything else cannot name a snippet.
fn parse_id(raw: Option<&str>) -> Option<i64> {
    raw?.parse().ok().filter(|id| *id >= 1)
}

/// Displays an error followed by each of its sources.
struct ErrorChain<'a>(&'a dyn std::error::Error);

impl std::fmt::Display for ErrorChain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(err) = source {
            write!(f, ": {err}")?;
            source = err.source();
        }
        Ok(())
    }
}
