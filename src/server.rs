//! Server initialization and startup logic for cronwarden.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use cronwarden_api::{ApiConfig, ApiServer, AppState};
use cronwarden_config::{Config, LoggingConfig, SchedulerConfig, TimezoneSetting, ValidationWarning};
use cronwarden_scheduler::{
    EngineConfig, ExecutionRecorder, JobManager, ScheduleTimezone, SchedulerEngine, ShellExecutor,
};
use cronwarden_store::SqliteJobStore;

/// Initialize tracing with console and file output.
///
/// `RUST_LOG` takes precedence over the configured level.
pub(crate) fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = logging.resolved_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(&logging.file_prefix)
        .filename_suffix("log")
        .max_log_files(logging.max_files)
        .build(&log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Dropping the guard stops the background writer.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_ansi(true))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(())
}

pub(crate) fn engine_config(scheduler: &SchedulerConfig) -> EngineConfig {
    EngineConfig {
        max_workers: scheduler.max_workers,
        timezone: match scheduler.timezone {
            TimezoneSetting::Local => ScheduleTimezone::Local,
            TimezoneSetting::Utc => ScheduleTimezone::Utc,
        },
    }
}

pub(crate) fn shell_executor(scheduler: &SchedulerConfig) -> ShellExecutor {
    let mut executor = ShellExecutor::new().with_shell(&scheduler.shell, &scheduler.shell_flag);
    if let Some(dir) = scheduler.resolved_working_dir() {
        executor = executor.with_working_dir(dir);
    }
    if let Some(secs) = scheduler.command_timeout_secs {
        executor = executor.with_timeout(Duration::from_secs(secs));
    }
    executor
}

/// Run the scheduler and API in foreground until Ctrl-C or SIGTERM.
pub(crate) async fn run_server(
    config: Config,
    warnings: Vec<ValidationWarning>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(&config.logging)?;
    info!("Starting cronwarden v{}", env!("CARGO_PKG_VERSION"));
    for warning in &warnings {
        warn!("Config {}: {}", warning.path, warning.message);
    }

    let db_path = config.database.resolved_path();
    let store = Arc::new(SqliteJobStore::open(&db_path).await?);
    info!("Job database: {}", db_path.display());

    let engine = Arc::new(SchedulerEngine::new(
        engine_config(&config.scheduler),
        Arc::new(shell_executor(&config.scheduler)),
        ExecutionRecorder::new(store.clone()),
    ));
    let manager = Arc::new(JobManager::new(store, engine.clone()));

    let report = manager.reload().await?;
    for (job_id, reason) in &report.skipped {
        warn!(job_id, "Job not armed: {}", reason);
    }
    engine.start();

    #[cfg(unix)]
    let reconciler = tokio::spawn(reconcile_on_hangup(manager.clone()));

    let api_config = ApiConfig::new(
        host.unwrap_or_else(|| config.server.host.clone()),
        port.unwrap_or(config.server.port),
    );
    let server = ApiServer::new(api_config, Arc::new(AppState::new(manager)));
    let served = server
        .run(stop_engine_on(shutdown_signal(), engine.clone()))
        .await;

    #[cfg(unix)]
    reconciler.abort();
    engine.shutdown().await;

    if let Err(e) = &served {
        error!("API server failed: {}", e);
    }
    info!("cronwarden stopped");
    served.map_err(Into::into)
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received");
}

/// Resolves with `signal`, after the engine has stopped firing.
///
/// Handed to the API server, so no new fire starts while in-flight
/// requests drain.
async fn stop_engine_on<F>(signal: F, engine: Arc<SchedulerEngine>)
where
    F: Future<Output = ()>,
{
    signal.await;
    engine.stop_firing();
}

/// Re-check the armed set against the store on every SIGHUP.
#[cfg(unix)]
async fn reconcile_on_hangup(manager: Arc<JobManager>) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            warn!("SIGHUP reconcile disabled: {}", e);
            return;
        }
    };
    while hangup.recv().await.is_some() {
        match manager.reconcile().await {
            Ok(repaired) if !repaired.is_empty() => {
                warn!("Reconcile repaired jobs {:?}", repaired)
            }
            Ok(_) => {}
            Err(e) => error!("Reconcile failed: {}", e),
        }
    }
}
