//! Panic recovery.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::{Future, poll_fn};
use std::panic::{self, AssertUnwindSafe, PanicHookInfo};
use std::pin::pin;
use std::sync::Once;

use futures_util::FutureExt;
use http::header::{CONNECTION, HeaderValue};
use tracing::error;

use super::{Middleware, Next, from_fn};
use crate::request::Request;
use crate::response::Response;

thread_local! {
    /// Depth of `recover_panic` polls on this thread.
    static RECOVERING: Cell<usize> = const { Cell::new(0) };
    /// Backtrace taken on the panicking stack, picked up after the unwind.
    static CAUGHT: RefCell<Option<Caught>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

struct Caught {
    location: Option<String>,
    backtrace: Backtrace,
}

/// Chains onto the process panic hook. Panics raised while a
/// `recover_panic` poll is on the stack have their backtrace stashed for
/// the middleware; every other panic goes to the previous hook.
fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
            if RECOVERING.with(Cell::get) == 0 {
                return previous(info);
            }
            let caught = Caught {
                location: info.location().map(ToString::to_string),
                backtrace: Backtrace::force_capture(),
            };
            CAUGHT.with(|slot| slot.replace(Some(caught)));
        }));
    });
}

/// Marks the current thread as inside a recovering poll.
struct Scope;

impl Scope {
    fn enter() -> Self {
        RECOVERING.with(|depth| depth.set(depth.get() + 1));
        Scope
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        RECOVERING.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Polls `fut`, catching a panic from any poll along with the backtrace of
/// the frame that raised it.
async fn catch<F: Future>(fut: F) -> Result<F::Output, (Box<dyn Any + Send>, Option<Caught>)> {
    let mut fut = pin!(AssertUnwindSafe(fut).catch_unwind());
    let result = poll_fn(|cx| {
        let _scope = Scope::enter();
        fut.as_mut().poll(cx)
    })
    .await;
    result.map_err(|payload| (payload, CAUGHT.with(RefCell::take)))
}

/// Catches a panic anywhere downstream and answers `500 Internal Server Error`.
///
/// The panic message, its location and the backtrace of the panicking stack
/// go to the error log; the client only sees the generic error page.
/// `Connection: close` tells HTTP/1.1 clients not to reuse a connection
/// whose handler blew up.
pub fn recover_panic() -> Middleware {
    install_hook();
    from_fn(|req: Request, next: Next| async move {
        match catch(next.run(req)).await {
            Ok(res) => res,
            Err((payload, caught)) => {
                let (location, backtrace) = match caught {
                    Some(c) => (c.location, c.backtrace.to_string()),
                    None => (None, "<not captured>".to_owned()),
                };
                error!(
                    panic = %panic_message(payload.as_ref()),
                    location = location.as_deref().unwrap_or("<unknown>"),
                    %backtrace,
                    "recovered from handler panic",
                );
                let mut res = Response::internal_error();
                res.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
                res
            }
        }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;

    use super::*;
    use crate::middleware::Chain;
    use crate::test_support::LogCapture;

    fn request() -> Request {
        http::Request::builder().uri("/boom").body(Bytes::new()).unwrap().into()
    }

    async fn boom(_req: Request) -> Response {
        panic!("database handle poisoned at 0xdeadbeef");
    }

    #[inline(never)]
    fn snippet_lookup_blew_up() {
        panic!("lookup failed");
    }

    async fn nested(_req: Request) -> Response {
        snippet_lookup_blew_up();
        Response::text("unreachable")
    }

    #[tokio::test]
    async fn panic_becomes_generic_500() {
        let res = Chain::new([recover_panic()]).then(boom).call(request()).await;

        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.header("connection"), Some("close"));
        let body = String::from_utf8_lossy(res.body());
        assert!(!body.contains("deadbeef"));
    }

    #[tokio::test]
    async fn backtrace_names_the_panicking_function() {
        let logs = LogCapture::default();
        let _guard = logs.install();

        let res = Chain::new([recover_panic()]).then(nested).call(request()).await;

        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let out = logs.contents();
        assert!(out.contains("recovered from handler panic"), "{out}");
        assert!(out.contains("lookup failed"), "{out}");
        assert!(out.contains("snippet_lookup_blew_up"), "{out}");
        assert!(out.contains("recover.rs"), "{out}");
    }

    #[tokio::test]
    async fn healthy_responses_pass_through() {
        let res = Chain::new([recover_panic()])
            .then(|_req: Request| async { "fine" })
            .call(request())
            .await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert!(res.header("connection").is_none());
    }
}
