//! Command-line and environment configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::session::SessionConfig;

/// Snippetbox - publish and view short-lived text snippets
#[derive(Clone, Debug, Parser)]
#[command(name = "snippetbox")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "SNIPPETBOX_ADDR", default_value = "127.0.0.1:4000")]
    pub addr: SocketAddr,

    /// Directory holding *.page.html, *.layout.html and *.partial.html
    #[arg(long, env = "SNIPPETBOX_TEMPLATES", default_value = "./ui/html")]
    pub templates: PathBuf,

    /// Absolute session lifetime, in hours
    #[arg(long, env = "SNIPPETBOX_SESSION_LIFETIME", default_value_t = 12)]
    pub session_lifetime: u64,

    /// Expire sessions idle for this many minutes
    #[arg(long, env = "SNIPPETBOX_SESSION_IDLE")]
    pub session_idle: Option<u64>,

    /// Only send the session cookie over HTTPS
    #[arg(long, env = "SNIPPETBOX_SECURE_COOKIES")]
    pub secure_cookies: bool,

    /// Log filter, e.g. `info` or `snippetbox=debug` (RUST_LOG wins when set)
    #[arg(long, env = "SNIPPETBOX_LOG", default_value = "info")]
    pub log: String,
}

impl Config {
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            lifetime: Duration::from_secs(self.session_lifetime * 60 * 60),
            idle_timeout: self.session_idle.map(|m| Duration::from_secs(m * 60)),
            secure: self.secure_cookies,
            ..SessionConfig::default()
        }
    }
}
