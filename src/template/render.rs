use std::io::Write;

use chrono::{Datelike, Utc};
use tracing::debug;

use super::{RenderContext, RenderError, TemplateCache};
use crate::request::Request;
use crate::response::Response;
use crate::session::FLASH_KEY;

/// Key under which every page finds the current calendar year.
pub const CURRENT_YEAR_KEY: &str = "current_year";

/// Adds the data every page can rely on to a handler's context.
///
/// `current_year` is always set. `flash` is popped from the request's
/// session, so it is consumed here and shows on this page only; without a
/// session, or without a pending flash, it is the empty string. Keys the
/// handler already set are overwritten.
pub fn with_defaults(mut ctx: RenderContext, req: &Request) -> RenderContext {
    ctx.insert(CURRENT_YEAR_KEY, Utc::now().year());
    let flash = req.session().map(|s| s.pop_string(FLASH_KEY)).unwrap_or_default();
    ctx.insert(FLASH_KEY, flash);
    ctx
}

/// Renders `name` into a buffer and copies it to `out` only on success.
///
/// On any error `out` has received zero bytes.
pub fn write_page<W: Write>(
    cache: &TemplateCache,
    name: &str,
    ctx: &RenderContext,
    out: &mut W,
) -> Result<(), RenderError> {
    let buf = cache.get(name)?.render_to_buffer(ctx)?;
    out.write_all(&buf).map_err(RenderError::Flush)
}

/// Renders page `name` for `req` into a `200 OK` HTML response.
///
/// The page is looked up before the flash is consumed, so asking for a page
/// that does not exist leaves a pending flash in place for the next one.
pub fn render(
    cache: &TemplateCache,
    req: &Request,
    name: &str,
    ctx: RenderContext,
) -> Result<Response, RenderError> {
    let unit = cache.get(name)?;
    let ctx = with_defaults(ctx, req);
    let buf = unit.render_to_buffer(&ctx)?;
    debug!(page = %name, bytes = buf.len(), "rendered page");
    Ok(Response::html(buf))
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::session::SessionStore;
    use crate::template::TemplateError;

    fn cache() -> TemplateCache {
        TemplateCache::from_sources(
            [
                (
                    "home.page.html".to_owned(),
                    "{% if flash %}<p>{{ flash }}</p>{% endif %}{{ current_year }}".to_owned(),
                ),
                ("show.page.html".to_owned(), "<h1>{{ snippet.title }}</h1>".to_owned()),
            ],
            [],
        )
        .unwrap()
    }

    fn request_with_flash(store: &SessionStore, flash: &str) -> Request {
        let session = store.load(None);
        session.put(FLASH_KEY, flash);
        let mut req: Request = http::Request::new(Bytes::new()).into();
        req.extensions_mut().insert(session);
        req
    }

    #[test]
    fn defaults_fill_year_and_empty_flash() {
        let req: Request = http::Request::new(Bytes::new()).into();
        let ctx = with_defaults(RenderContext::new(), &req);
        assert_eq!(ctx.get(CURRENT_YEAR_KEY).and_then(|v| i64::try_from(v.clone()).ok()), Some(i64::from(Utc::now().year())));
        assert_eq!(ctx.get(FLASH_KEY).and_then(|v| v.as_str().map(str::to_owned)), Some(String::new()));
    }

    #[test]
    fn flash_is_shown_once() {
        let store = SessionStore::default();
        let req = request_with_flash(&store, "Saved!");
        let cache = cache();

        let first = render(&cache, &req, "home.page.html", RenderContext::new()).unwrap();
        let body = std::str::from_utf8(first.body()).unwrap();
        assert!(body.starts_with("<p>Saved!</p>"));

        let second = render(&cache, &req, "home.page.html", RenderContext::new()).unwrap();
        assert!(!std::str::from_utf8(second.body()).unwrap().contains("Saved!"));
    }

    #[test]
    fn unknown_page_keeps_the_flash() {
        let store = SessionStore::default();
        let req = request_with_flash(&store, "pending");
        let err = render(&cache(), &req, "missing.page.html", RenderContext::new()).unwrap_err();
        assert!(matches!(err, RenderError::Template(TemplateError::NotFound(_))));
        assert_eq!(req.session().unwrap().get_string(FLASH_KEY), "pending");
    }

    #[test]
    fn failed_render_writes_nothing() {
        let mut out = Vec::new();
        let err = write_page(&cache(), "show.page.html", &RenderContext::new(), &mut out);
        assert!(matches!(err, Err(RenderError::Execute { .. })));
        assert!(out.is_empty());
    }

    #[test]
    fn successful_render_writes_whole_page() {
        let mut out = Vec::new();
        let ctx = RenderContext::new().with("snippet", serde_json::json!({ "title": "An old silent pond" }));
        write_page(&cache(), "show.page.html", &ctx, &mut out).unwrap();
        assert_eq!(out, b"<h1>An old silent pond</h1>");
    }
}
