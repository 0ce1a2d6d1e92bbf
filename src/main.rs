use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cancel;
mod config;
mod dispatch;
mod error;
mod executor;
mod handlers;
mod metrics;
mod middleware;
mod report;
mod server;

use cancel::CancelSignal;
use config::{Args, ExecutorMode};
use dispatch::{DispatchConfig, Dispatcher, RunHandle};
use error::Result;
use executor::{BrowserExecutor, HttpExecutor, RequestExecutor, RequestOptions};
use metrics::MetricsSummary;

/// Shared state for the metrics api handlers via `State<Arc<AppState>>`.
pub struct AppState {
    /// Outcome aggregator of the current run.
    pub metrics: Arc<metrics::MetricsCollector>,

    /// Dispatcher state, in-flight count and the cancel switch.
    pub run: RunHandle,
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env first so clap's env fallbacks can see it
    let dotenv = dotenvy::dotenv();
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "loaded .env");
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "loadbot failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(args: Args) -> Result<()> {
    let config = args.dispatch_config()?;
    let options = args.request_options()?;

    let cancel = CancelSignal::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    tracing::info!(
        target_url = %config.target,
        total = config.total,
        concurrency = config.concurrency,
        rate = config.rate,
        mode = ?args.mode,
        proxy = options.proxy.is_some(),
        "starting load run"
    );

    let summary = match args.mode {
        ExecutorMode::Http => {
            let executor = HttpExecutor::new(args.http_settings())?;
            execute(executor, config, options, cancel, args.metrics_addr).await?
        }
        ExecutorMode::Browser => {
            let executor = BrowserExecutor::new(args.browser_settings());
            execute(executor, config, options, cancel, args.metrics_addr).await?
        }
    };

    if args.json {
        println!("{}", report::to_json(&summary)?);
    } else {
        report::log_summary(&summary);
    }
    Ok(())
}

async fn execute<E: RequestExecutor>(
    executor: E,
    config: DispatchConfig,
    options: RequestOptions,
    cancel: CancelSignal,
    metrics_addr: Option<SocketAddr>,
) -> Result<MetricsSummary> {
    let dispatcher = Dispatcher::new(config, executor, options, cancel)?;

    if let Some(addr) = metrics_addr {
        let state = Arc::new(AppState {
            metrics: dispatcher.metrics(),
            run: dispatcher.handle(),
        });
        server::spawn(addr, state).await?;
    }

    Ok(dispatcher.run().await)
}

/// Cancels the run on Ctrl+C or SIGTERM.
async fn shutdown_signal(cancel: CancelSignal) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(%err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::warn!(%err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = cancel.cancelled() => return,
    }
    tracing::warn!("signal received, cancelling run");
    cancel.cancel();
}
