mod collect;
mod config;
mod document;
mod identity;
mod metrics;
mod serve;
mod signals;
mod walker;

use clap::Parser;
use collect::CollectorConfig;
use config::{ConfigError, ExporterConfig, LogConfig, LogFormat};
use identity::HttpResolver;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// Prometheus exporter for Cobblemon player statistics: scans the server's
/// per-player data files on every scrape, resolves player names, and exposes
/// the configured stats as labeled counters.
#[derive(Parser, Debug)]
#[command(name = "cobblemon-exporter", version, about)]
pub struct Cli {
    /// Config file path (missing file means defaults)
    #[arg(short, long, default_value = "exporter.toml")]
    config: PathBuf,

    /// Address to listen on, e.g. ":9155" or "127.0.0.1:9155" (overrides config)
    #[arg(short, long)]
    listen_address: Option<String>,

    /// Root of the per-player data directory (overrides config)
    #[arg(long)]
    stats_dir: Option<PathBuf>,

    /// YAML file listing the stats to export (overrides config)
    #[arg(short, long)]
    stats_file: Option<PathBuf>,

    /// Metric namespace (overrides config)
    #[arg(short, long)]
    namespace: Option<String>,

    /// Identity lookup URL with an {id} placeholder (overrides config)
    #[arg(long)]
    identity_url: Option<String>,

    /// Log level: trace, debug, info, warn, error (overrides config; RUST_LOG wins)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format (overrides config)
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Validate config and print resolved settings, don't serve
    #[arg(long)]
    dry_run: bool,

    /// Run a single collection, print the exposition to stdout, and exit
    #[arg(long)]
    once: bool,
}

/// Load the config file and layer CLI overrides on top.
fn resolve_config(cli: &Cli) -> Result<ExporterConfig, ConfigError> {
    let mut cfg = config::load(&cli.config)?;

    if let Some(addr) = &cli.listen_address {
        cfg.web.set_listen_address(addr)?;
    }
    if let Some(dir) = &cli.stats_dir {
        cfg.exporter.stats_dir = dir.clone();
    }
    if let Some(file) = &cli.stats_file {
        cfg.exporter.stats_file = file.clone();
    }
    if let Some(ns) = &cli.namespace {
        cfg.exporter.namespace = ns.clone();
    }
    if let Some(url) = &cli.identity_url {
        cfg.identity.url = url.clone();
    }
    if let Some(level) = &cli.log_level {
        cfg.log.level = level.clone();
    }
    if let Some(format) = cli.log_format {
        cfg.log.format = format;
    }

    cfg.validate()?;
    Ok(cfg)
}

fn init_tracing(log: &LogConfig) {
    let level = &log.level;
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!(
                    "cobblemon_exporter={level},tower_http={level}"
                ))
            }),
        )
        .with_target(false);
    match log.format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let cfg = match resolve_config(&cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&cfg.log);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "cobblemon-exporter starting");
    tracing::debug!(?cli, "parsed CLI arguments");

    let stats = match config::load_stats(&cfg.exporter.stats_file) {
        Ok(stats) => stats,
        Err(e) => {
            tracing::error!(error = %e, "failed to load stats file");
            return ExitCode::FAILURE;
        }
    };

    if cli.dry_run {
        println!("cobblemon-exporter v{}", env!("CARGO_PKG_VERSION"));
        println!("Config file: {}", cli.config.display());
        println!("Namespace: {}", cfg.exporter.namespace);
        println!("Stats dir: {}", cfg.exporter.stats_dir.display());
        println!("Identity URL: {}", cfg.identity.url);
        println!(
            "Listen: {}{}",
            cfg.web.listen_address(),
            cfg.web.metrics_path
        );
        println!("Stats ({}):", stats.len());
        for stat in &stats {
            println!("  {} <- {}", stat.name, stat.path);
        }
        return ExitCode::SUCCESS;
    }

    let collector = Arc::new(CollectorConfig {
        stats_dir: cfg.exporter.stats_dir.clone(),
        namespace: cfg.exporter.namespace.clone(),
        stats,
    });

    let resolver = match HttpResolver::new(
        &cfg.identity.url,
        Duration::from_secs(cfg.identity.timeout_secs),
    ) {
        Ok(r) => Arc::new(r),
        Err(e) => {
            tracing::error!(error = %e, "failed to create identity resolver");
            return ExitCode::FAILURE;
        }
    };

    if cli.once {
        return match collect::collect(&collector, resolver.as_ref()).await {
            Ok(samples) => match metrics::render(&collector.namespace, Some(samples)) {
                Ok(body) => {
                    print!("{}", String::from_utf8_lossy(&body));
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode metrics");
                    ExitCode::FAILURE
                }
            },
            Err(e) => {
                tracing::error!(error = %e, "collection cycle failed");
                ExitCode::FAILURE
            }
        };
    }

    tracing::info!(
        stats = collector.stats.len(),
        stats_dir = %collector.stats_dir.display(),
        "exporting player stats"
    );
    let app = serve::router(collector, resolver, &cfg.web.metrics_path);
    if let Err(e) = serve::run(app, &cfg.web.listen_address()).await {
        tracing::error!(error = %e, "server failed");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
