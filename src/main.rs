//! coredns-debuginfo - a Corefile-driven DNS server that reports how each query was observed

pub mod config;
pub mod debuginfo;
pub mod dns_server;
pub mod ecs;
pub mod plugin;
pub mod types;
pub mod wire;

use anyhow::{Context, Result};
use clap::Parser;
use std::net::IpAddr;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use chrono::Local;
use rolling_file::{RollingConditionBasic, RollingFileAppender};

/// Log timestamps in local time instead of UTC.
struct LocalTimer;
impl fmt::time::FormatTime for LocalTimer {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

#[derive(Parser, Debug)]
#[command(name = "coredns-debuginfo")]
#[command(about = "A DNS server that answers with per-request debug info", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "Corefile")]
    config: String,

    /// IP every server block binds to; ports come from the zone keys
    #[arg(long, default_value = "::")]
    address: IpAddr,

    #[arg(long, default_value = "logs")]
    log_dir: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cores)
        .thread_name("coredns-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args, cores))
}

async fn async_main(args: Args, cores: usize) -> Result<()> {
    std::fs::create_dir_all(&args.log_dir)
        .with_context(|| format!("Failed to create log directory '{}'", args.log_dir))?;

    let file_appender = RollingFileAppender::new(
        format!("{}/coredns.log", args.log_dir),
        RollingConditionBasic::new().daily(),
        30,
    )?;
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false).with_timer(LocalTimer))
        .with(fmt::layer().with_writer(std::io::stdout).with_timer(LocalTimer))
        .init();

    info!("Starting coredns-debuginfo version {}", env!("CARGO_PKG_VERSION"));
    info!(">>> Utilizing {} worker threads", cores);

    let cfg = config::Config::load(&args.config)?;
    for zone_config in &cfg.zones {
        info!("Zone: {} loaded with {} plugins", zone_config.name, zone_config.plugins.len());
    }

    dns_server::DnsServer::new(cfg).run(args.address).await
}
