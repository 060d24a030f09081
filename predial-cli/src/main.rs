//! entrypoint for predial-cli

#![cfg_attr(not(test), warn(clippy::print_stdout, clippy::dbg_macro))]

use std::{net::SocketAddr, time::Duration};

use clap::Parser;
use predial::{
    dial::{DialCache, DialCacheConfig, TransportDialer},
    error::{BoxError, ErrorContext as _},
    proxy::{ProxyConfig, ProxyServer},
};
use tracing::level_filters::LevelFilter;

mod trace;

#[derive(Debug, Parser)]
#[command(name = "predial")]
#[command(bin_name = "predial")]
#[command(version, about, long_about = None)]
/// forward http proxy which dials upstream connections ahead of demand
struct Cli {
    /// the address to listen on for proxy requests
    #[arg(long, default_value = "0.0.0.0:3129")]
    bind: SocketAddr,

    /// discard pre-dialed connections older than this many seconds (0 = never)
    #[arg(long, default_value_t = 0)]
    timeout: u64,

    /// only dial ipv4 addresses
    #[arg(short = '4', long)]
    force_ipv4: bool,

    /// stop dialing a destination after this many seconds without use (0 = never)
    #[arg(long, default_value_t = 0)]
    idle: u64,

    /// timeout in seconds of a single connect attempt (0 = os default)
    #[arg(long, default_value_t = 0)]
    connect_timeout: u64,

    /// maximum number of idle pooled connections per upstream host
    #[arg(long, default_value_t = 64)]
    pool_max_idle_per_host: usize,

    /// close pooled upstream connections idle for this many seconds (0 = never)
    #[arg(long, default_value_t = 300)]
    pool_idle_timeout: u64,

    /// log json lines to stderr instead of human readable output
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    #[expect(clippy::exit)]
    if let Err(err) = run(cli).await {
        eprintln!("🚩 exit with error: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), BoxError> {
    trace::init_tracing(LevelFilter::INFO, cli.json_logs)?;

    let mut dialer = TransportDialer::new();
    if cli.connect_timeout > 0 {
        dialer = dialer.with_connect_timeout(Duration::from_secs(cli.connect_timeout));
    }
    let cache = DialCache::with_dialer(
        dialer,
        DialCacheConfig::default()
            .with_stale_timeout(Duration::from_secs(cli.timeout))
            .with_force_ipv4(cli.force_ipv4)
            .with_idle_timeout(Duration::from_secs(cli.idle)),
    );
    let config = ProxyConfig::default()
        .with_pool_max_idle_per_host(cli.pool_max_idle_per_host)
        .with_pool_idle_timeout(Duration::from_secs(cli.pool_idle_timeout));

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .context("bind proxy listener")?;
    let bind_address = listener
        .local_addr()
        .context("get local addr of tcp listener")?;

    tracing::info!(
        bind = %cli.bind,
        %bind_address,
        stale_timeout = ?cache.config().stale_timeout(),
        force_ipv4 = cache.config().force_ipv4(),
        idle_timeout = ?cache.config().idle_timeout(),
        "proxy ready",
    );

    let graceful = tokio_graceful::Shutdown::default();
    graceful.spawn_task_fn(move |guard| async move {
        ProxyServer::new(cache, &config)
            .serve_graceful(guard, listener)
            .await;
    });

    graceful
        .shutdown_with_limit(Duration::from_secs(30))
        .await
        .context("graceful shutdown")?;

    Ok(())
}
