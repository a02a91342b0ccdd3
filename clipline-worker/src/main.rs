mod health;

use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use clipline::config::default_config_path;
use clipline::logging::{init_logging, LogFormat};
use clipline::queue::SqliteConnector;
use clipline::worker::WorkerSettings;
use clipline::{load_config, Config, Executor, Pipeline, StatusStore, Worker};

fn main() -> ExitCode {
    // A missing .env is the normal case in production.
    dotenvy::dotenv().ok();

    if let Err(e) = init_logging(LogFormat::from_env()) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting clipline worker v{}", env!("CARGO_PKG_VERSION"));

    let Some(config_path) = default_config_path() else {
        error!("Could not determine config path; set CLIPLINE_CONFIG");
        return ExitCode::FAILURE;
    };
    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config from {:?}: {}", config_path, e);
            return ExitCode::FAILURE;
        }
    };
    info!("Loaded config from {:?}", config_path);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Shutdown requested, finishing current job");
        on_signal.cancel();
    }) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(config, cancel))
}

async fn run(config: Config, cancel: CancellationToken) -> ExitCode {
    let port_env = std::env::var(health::PORT_ENV).ok();
    if let Some(port) = health::resolve_port(config.worker.health_port, port_env.as_deref()) {
        health::spawn(port, cancel.clone()).await;
    }

    let pipeline = match Pipeline::from_config(&config) {
        Ok(pipeline) => Arc::new(pipeline),
        Err(e) => {
            error!("Failed to build pipeline: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let reconnect_delay = config.queue.reconnect_delay();
    let Some(store) =
        StatusStore::open_with_retry(&config.database_path(), reconnect_delay, &cancel).await
    else {
        info!("Shut down before the status store was reachable");
        return ExitCode::SUCCESS;
    };
    info!("Status store open at {:?}", config.database_path());

    let connector = Arc::new(SqliteConnector::new(
        config.queue_path(),
        config.queue.name.clone(),
    ));
    let executor = Executor::new(store, pipeline, reconnect_delay);
    let worker = Worker::new(WorkerSettings::from_config(&config), connector, executor);

    let stats = worker.run(&cancel).await;
    info!(
        "Worker exited: {} completed, {} failed, {} skipped",
        stats.completed, stats.failed, stats.skipped
    );
    ExitCode::SUCCESS
}
