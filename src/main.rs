use clap::Parser;
use defectboard::analytics::{Analyzer, SystemClock};
use defectboard::config::AppConfig;
use defectboard::query::cache::ReportCache;
use defectboard::query::{router, AppState};
use defectboard::snapshot::{self, SnapshotStore};
use defectboard::source;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;

#[derive(Parser)]
#[command(
    name = "defectboard",
    about = "Defect and test-failure analytics over tracker work items"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Load once, print the full report as JSON and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so `--once` output stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "defectboard=info,tower_http=info".into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(Some(&cli.config))?;

    if let Err(msg) = config.validate() {
        eprintln!("Configuration error: {msg}");
        return Err(msg.into());
    }

    let chain = Arc::new(source::build_chain(&config.source)?);
    let analyzer = Analyzer::new(
        config.analytics.clone(),
        config.item_url_base(),
        Arc::new(SystemClock),
    );
    let store = Arc::new(SnapshotStore::new());

    tracing::info!(sources = ?chain.names(), "loading records");
    let initial = store.refresh(&chain).await?;

    if cli.once {
        let report = analyzer.report(&initial.records);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if config.server.refresh_interval_secs > 0 {
        let loop_store = store.clone();
        let loop_chain = chain.clone();
        let interval = config.server.refresh_interval_secs;
        tokio::spawn(async move {
            snapshot::refresh_loop(loop_store, loop_chain, interval).await;
        });
    }

    let state = Arc::new(AppState {
        store,
        analyzer,
        chain,
        cache: ReportCache::new(config.server.cache_ttl_secs),
        export_dir: config.server.export_dir.clone(),
    });
    let app = router(state).layer(tower_http::trace::TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(
        addr = %addr,
        records = initial.len(),
        source = %initial.source,
        "listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }

    tracing::info!("shutting down...");
}
