use anyhow::Context;
use clap::Parser;
use itip::{DavStoreProvider, ItipFilter, NotificationSink};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

mod auth;
mod http;
mod notify;

/// iTip mail filter daemon.
///
/// Receives inbound messages from the MTA content-filter bridge,
/// synchronizes scheduling payloads (REQUEST/REPLY/CANCEL) with the
/// recipient's calendar store and tells the bridge what to do with each
/// message.
#[derive(Debug, Parser)]
#[command(about, version)]
struct Opt {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8765")]
    listen: String,

    /// Base URL of the CalDAV server.
    #[arg(long)]
    dav_url: Url,

    /// Shared secret used to mint short-lived per-recipient DAV tokens.
    ///
    /// Read from the ITIPD_TOKEN_KEY environment variable when not
    /// given.
    #[arg(long)]
    token_key: Option<String>,

    /// Lifetime of minted DAV tokens, in seconds.
    #[arg(long, default_value_t = 10)]
    token_ttl: u64,

    /// URL notified (HTTP POST, JSON body) about actioned cancellations
    /// and replies. When omitted, notifications are only logged.
    #[arg(long)]
    notify_url: Option<Url>,
}

fn main() -> anyhow::Result<()> {
    let opts = Opt::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("ITIPD_LOG").unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("itipd=info,itip=info,caldav=info")
            }),
        )
        .init();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?
        .block_on(run(opts))
}

async fn run(opts: Opt) -> anyhow::Result<()> {
    let token_key = match opts.token_key.clone() {
        Some(key) => key,
        None => std::env::var("ITIPD_TOKEN_KEY")
            .context("either --token-key or ITIPD_TOKEN_KEY is required")?,
    };
    let token_ttl = Duration::from_secs(opts.token_ttl);

    let minter = Arc::new(auth::KmacTokenMinter::new(token_key.as_bytes(), token_ttl));
    let provider = Arc::new(DavStoreProvider::new(
        opts.dav_url.clone(),
        minter,
        token_ttl,
    ));
    let sink: Arc<dyn NotificationSink> = match &opts.notify_url {
        Some(url) => Arc::new(notify::WebhookSink::new(url.clone())?),
        None => Arc::new(notify::LogSink),
    };
    let filter = Arc::new(ItipFilter::new(provider, sink));

    let listener = tokio::net::TcpListener::bind(&opts.listen)
        .await
        .with_context(|| format!("failed to bind {}", opts.listen))?;
    tracing::info!(listen = %opts.listen, dav_url = %opts.dav_url, "itipd listening");

    axum::serve(listener, http::make_router(filter))
        .await
        .context("http server terminated")
}
