//! # snippetbox
//!
//! A small web application for publishing short-lived text snippets, built
//! around one request pipeline:
//!
//! ```text
//! request ─► recover_panic ─► log_request ─► secure_headers ─► router
//!                                                                │
//!                     session::load_and_save ◄───────────────────┘
//!                                │
//!                     handler ─► template::render (buffer, then respond)
//! ```
//!
//! - Middleware are plain handler-to-handler functions composed by a
//!   [`Chain`](middleware::Chain); declaration order is execution order.
//! - Templates are compiled once at startup into a [`TemplateCache`] and
//!   rendered into a buffer, so a failing template yields a `500`, never a
//!   half-written page.
//! - A [`Session`] travels in request extensions; a flash message put there
//!   is shown on exactly one subsequent page.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use snippetbox::{App, MemoryStore, Server, SessionStore, TemplateCache};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), snippetbox::Error> {
//!     let templates = TemplateCache::build("./ui/html")?;
//!     let app = App::new(templates, MemoryStore::new(), SessionStore::default());
//!     Server::bind(([127, 0, 0, 1], 4000).into()).serve(app.routes()).await
//! }
//! ```

mod app;
mod config;
mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;
#[cfg(test)]
mod test_support;

pub mod forms;
pub mod middleware;
pub mod session;
pub mod store;
pub mod template;

pub use app::{App, LATEST_LIMIT};
pub use config::Config;
pub use error::Error;
pub use handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler, not_found};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
pub use session::{Session, SessionConfig, SessionStore};
pub use store::{MemoryStore, NewSnippet, Snippet, SnippetStore, StoreError};
pub use template::{RenderContext, RenderError, TemplateCache, TemplateError};
