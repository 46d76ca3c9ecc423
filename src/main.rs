use anyhow::Result;
use clap::{Parser, ValueEnum};
use proxy_scout::{
    config::EngineConfig,
    engine::ProxyEngine,
    proxy::ProxyType,
    source::{CandidateSource, FileSource, ListingConfig, ListingSource, SourceSpec},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Validate candidate proxies and pick the best one
#[derive(Parser)]
#[command(name = "proxy-scout")]
#[command(about = "Validate candidate proxies and pick the best one")]
struct Cli {
    /// JSON configuration file; flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// File with candidates (IP:PORT or scheme://IP:PORT per line), can repeat
    #[arg(short, long)]
    input: Vec<PathBuf>,

    /// Also fetch from the built-in listing pages
    #[arg(long)]
    listings: bool,

    /// Proxy type assumed for untyped lines (http, https, socks4, socks5)
    #[arg(short = 't', long, default_value = "http")]
    proxy_type: String,

    /// Number of endpoints validated at once
    #[arg(short = 'n', long)]
    threads: Option<usize>,

    /// Per-probe timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Target URL to probe through each candidate, can repeat
    #[arg(long = "target")]
    targets: Vec<String>,

    /// Derive the active threshold as "more than half" of the targets
    #[arg(long)]
    majority: bool,

    /// Directory receiving the JSON snapshot
    #[arg(short, long, default_value = "proxy_results")]
    output_dir: PathBuf,

    /// Additional flat export of the results
    #[arg(short, long, value_enum)]
    export: Option<ExportFormat>,

    #[arg(long, default_value = "info")]
    log_level: Level,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Txt,
    Csv,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(threads) = cli.threads {
        config = config.with_concurrency(threads);
    }
    if let Some(timeout) = cli.timeout {
        config = config.with_timeout(Duration::from_secs(timeout));
    }
    if !cli.targets.is_empty() {
        config = config.with_target_urls(cli.targets.clone());
    }
    if cli.majority {
        config = config.with_majority_threshold();
    }

    let proxy_type: ProxyType = cli.proxy_type.parse().map_err(anyhow::Error::msg)?;

    let mut sources: Vec<Arc<dyn CandidateSource>> = cli
        .input
        .iter()
        .map(|path| Arc::new(FileSource::new(path, proxy_type)) as Arc<dyn CandidateSource>)
        .collect();
    if cli.listings {
        let listing_config = ListingConfig::from_engine(&config);
        for spec in SourceSpec::defaults() {
            sources.push(Arc::new(ListingSource::new(spec, &listing_config)?));
        }
    }
    if sources.is_empty() {
        warn!("no sources given; use --input or --listings");
    }

    let engine = ProxyEngine::new(config).with_sources(sources);
    let report = engine.run_full_cycle().await;

    std::fs::create_dir_all(&cli.output_dir)?;
    let stem = format!(
        "proxy_test_{}",
        report.metadata.finished_at.format("%Y%m%d_%H%M%S")
    );
    let json_path = cli.output_dir.join(format!("{}.json", stem));
    report.save_json(&json_path)?;
    info!("Results saved to {}", json_path.display());

    match cli.export {
        Some(ExportFormat::Txt) => {
            let path = cli.output_dir.join(format!("{}.txt", stem));
            report.save_active_list(&path)?;
            info!("Active proxies saved to {}", path.display());
        }
        Some(ExportFormat::Csv) => {
            let path = cli.output_dir.join(format!("{}.csv", stem));
            report.save_csv(&path)?;
            info!("Full results saved to {}", path.display());
        }
        None => {}
    }

    match report.require_selected() {
        Ok(best) => {
            println!("{}", best.endpoint.address());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
