//! Run with:
//!   cargo run -- --addr 127.0.0.1:4000 --templates ./ui/html
//!
//! Try:
//!   curl -i http://localhost:4000/
//!   curl -i -d 'title=Hi&content=there&expires=7' http://localhost:4000/snippet/create
//!   curl -i 'http://localhost:4000/api/v1/snippet?id=1'

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use snippetbox::{App, Config, Error, MemoryStore, Server, SessionStore, TemplateCache};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log)),
        )
        .init();

    let templates = TemplateCache::build(&config.templates)?;
    info!(pages = ?templates.names(), "templates ready");

    let app = App::new(templates, MemoryStore::new(), SessionStore::new(config.session()));

    Server::bind(config.addr).serve(app.routes()).await
}
