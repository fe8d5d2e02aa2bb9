//! Unified error type.

use crate::template::TemplateError;

/// The error type returned by snippetbox's startup and serving operations.
///
/// Request-level failures (404, validation, 500) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// what stops the process: binding to a port, accepting connections, or a
/// template set that fails to compile at boot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("i/o failure")]
    Io(#[from] std::io::Error),

    #[error("building templates")]
    Template(#[from] TemplateError),
}
