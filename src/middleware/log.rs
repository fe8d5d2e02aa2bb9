//! Access logging.

use std::time::Instant;

use tracing::info;

use super::{Middleware, Next, from_fn};
use crate::request::Request;

/// Logs each request as it arrives (peer, protocol, method, URI), then its
/// status and latency once a response exists.
///
/// The arrival line is written before any downstream code runs, so a
/// request that panics further in still shows up in the access log.
pub fn log_request() -> Middleware {
    from_fn(|req: Request, next: Next| async move {
        let started = Instant::now();
        let peer = req.remote_addr().map_or_else(|| "-".to_owned(), |addr| addr.to_string());
        let method = req.method().clone();
        let uri = req.uri().clone();
        info!(%peer, proto = ?req.version(), %method, %uri, "request");

        let res = next.run(req).await;

        info!(
            %peer,
            %method,
            %uri,
            status = res.status_code().as_u16(),
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "response",
        );
        res
    })
}
