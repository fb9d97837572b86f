mod cli;

use clap::Parser;
use cli::{Cli, Commands, DownloadArgs};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use torrentbox::config::{ByteSize, Config};
use torrentbox::engine::EngineProcess;
use torrentbox::observability::Metrics;
use torrentbox::pipeline::{self, Pipeline};
use torrentbox::rpc::{RpcClient, RpcSettings};
use torrentbox::session::LogObserver;
use tracing::info;
use tracing_subscriber::EnvFilter;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    let cli = Cli::parse();
    let config = Config::load(cli.config)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.telemetry.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Download(args) => download(&config, args).await?,
        Commands::Inspect(args) => inspect(&config, args.torrent).await?,
        Commands::List => list(&config).await?,
        Commands::Config => print!("{}", config.to_toml()?),
    }

    Ok(())
}

/// Create working directories, connect to the engine and start it when managed
async fn connect(config: &Config) -> Result<(Arc<RpcClient>, Option<EngineProcess>), AnyError> {
    tokio::fs::create_dir_all(&config.paths.download_dir).await?;
    tokio::fs::create_dir_all(&config.paths.output_dir).await?;

    let url = config.rpc_url();
    let channel = Arc::new(RpcClient::new(url.clone(), RpcSettings::from(&config.rpc))?);
    info!(endpoint = channel.endpoint(), "Using engine control channel");

    let engine = if config.engine.manage {
        // Single-shot calls; the readiness loop does its own pacing
        let readiness = RpcClient::new(
            url,
            RpcSettings {
                max_attempts: 1,
                retry_backoff: Duration::ZERO,
                request_timeout: Duration::from_secs(2),
            },
        )?;
        Some(EngineProcess::start(config, &readiness).await?)
    } else {
        None
    };

    Ok((channel, engine))
}

async fn download(config: &Config, args: DownloadArgs) -> Result<(), AnyError> {
    let (channel, engine) = connect(config).await?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    let metrics = Arc::new(Metrics::new());
    let pipeline = Pipeline::from_config(
        config,
        channel,
        Arc::new(LogObserver),
        metrics.clone(),
        !args.no_postprocess,
    );
    let selection = args.select.unwrap_or_default();

    let total = args.items.len();
    let mut reports = Vec::with_capacity(total);
    for (position, item) in args.items.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        info!(item = position + 1, total, "Starting item");
        reports.push(pipeline.run_item(item, &selection, &cancel).await);
    }

    for report in &reports {
        println!("{}: {}", report.name, report.status);
    }
    let succeeded = reports.iter().filter(|r| r.is_success()).count();
    println!("{succeeded}/{total} item(s) completed");
    info!(metrics = %metrics.snapshot(), "Run finished");

    if let Some(engine) = engine {
        engine.shutdown().await;
    }
    Ok(())
}

async fn inspect(config: &Config, torrent: std::path::PathBuf) -> Result<(), AnyError> {
    let (channel, engine) = connect(config).await?;
    let pipeline = Pipeline::from_config(
        config,
        channel,
        Arc::new(LogObserver),
        Arc::new(Metrics::new()),
        false,
    );

    let result = pipeline.inspect(&torrent).await;
    if let Some(engine) = engine {
        engine.shutdown().await;
    }

    let files = result?;
    if files.is_empty() {
        println!("No file list available for {}", torrent.display());
        return Ok(());
    }
    for file in &files {
        println!("{:>4}  {:>10}  {}", file.index, ByteSize(file.size_bytes), file.path.display());
    }
    println!("{} file(s); pick indices with `download --select`", files.len());
    Ok(())
}

async fn list(config: &Config) -> Result<(), AnyError> {
    let entries = pipeline::list_output(&config.paths.output_dir).await?;
    if entries.is_empty() {
        println!("{} is empty", config.paths.output_dir.display());
        return Ok(());
    }
    for (path, size) in entries {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        println!("{:>10}  {name}", ByteSize(size));
    }
    Ok(())
}
