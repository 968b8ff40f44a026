// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `cadence serve` command implementation.
//!
//! Opens the SQLite store, connects the Twilio gateway, wires the engine and
//! runs the sweeper, the timer trigger (in `timer` mode) and the inbound
//! webhook until SIGINT or SIGTERM. SIGHUP re-reads the configuration and
//! swaps in the new compliance window.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cadence_config::model::{CadenceConfig, TriggerMode};
use cadence_core::{CadenceError, DeliveryQueue, HealthStatus, NoopQueue, PluginAdapter, Store};
use cadence_engine::shutdown::install_signal_handler;
use cadence_engine::{
    ComplianceHandle, ComplianceWindow, Engine, TimerQueue, run_sweeper, run_timer_trigger,
    seed_default_templates,
};
use cadence_sms::TwilioGateway;
use cadence_storage::SqliteStore;
use chrono::Utc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::webhook;

/// Initializes the tracing subscriber with the given log level.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cadence={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

/// Open and migrate the configured SQLite database.
///
/// A database without templates gets the built-in set.
pub async fn open_store(config: &CadenceConfig) -> Result<Arc<SqliteStore>, CadenceError> {
    let store = SqliteStore::new(config.storage.clone());
    store.initialize().await?;
    seed_if_empty(&store).await?;
    Ok(Arc::new(store))
}

async fn seed_if_empty(store: &dyn Store) -> Result<usize, CadenceError> {
    if !store.list_templates().await?.is_empty() {
        return Ok(0);
    }
    let written = seed_default_templates(store, false).await?;
    info!(templates = written, "empty template table seeded with defaults");
    Ok(written)
}

/// Re-read configuration and swap in its compliance window.
///
/// The running window is kept when the new configuration does not validate.
pub fn reload_compliance(
    path: Option<&Path>,
    compliance: &ComplianceHandle,
) -> Result<(), CadenceError> {
    let loaded = match path {
        Some(path) => cadence_config::load_and_validate_path(path),
        None => cadence_config::load_and_validate(),
    };
    let config = loaded.map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        CadenceError::Config(messages.join("; "))
    })?;
    compliance.replace(ComplianceWindow::from_config(&config.compliance)?);
    Ok(())
}

#[cfg(unix)]
async fn reload_on_hangup(
    path: Option<PathBuf>,
    compliance: ComplianceHandle,
    cancel: CancellationToken,
) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            error!(error = %e, "failed to install SIGHUP handler, config reload disabled");
            return;
        }
    };
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = hangup.recv() => {
                if received.is_none() {
                    break;
                }
                info!("received SIGHUP, reloading compliance window");
                if let Err(e) = reload_compliance(path.as_deref(), &compliance) {
                    warn!(error = %e, "config reload rejected, keeping current window");
                }
            }
        }
    }
}

/// Runs the service until a shutdown signal arrives.
///
/// `config_path` is the file `config` was loaded from, if any; SIGHUP reloads
/// from the same place.
pub async fn run_serve(
    config: CadenceConfig,
    config_path: Option<PathBuf>,
) -> Result<(), CadenceError> {
    init_tracing(&config.service.log_level);
    info!(name = %config.service.name, trigger = ?config.delivery.trigger, "cadence starting");

    let store = open_store(&config).await?;
    let gateway = Arc::new(TwilioGateway::new(&config.twilio)?);
    match gateway.health_check().await? {
        HealthStatus::Healthy => info!("twilio gateway healthy"),
        HealthStatus::Degraded(reason) => warn!(%reason, "twilio gateway degraded"),
        HealthStatus::Unhealthy(reason) => warn!(%reason, "twilio gateway unhealthy, sends will fail"),
    }

    let (queue, timer_jobs) = match config.delivery.trigger {
        TriggerMode::Timer => {
            let (queue, jobs) = TimerQueue::new();
            (Arc::new(queue) as Arc<dyn DeliveryQueue>, Some(jobs))
        }
        TriggerMode::Sweep => (Arc::new(NoopQueue) as Arc<dyn DeliveryQueue>, None),
    };

    let engine = Engine::from_config(
        &config,
        Arc::clone(&store) as Arc<dyn Store>,
        gateway,
        queue,
    )
    .await?;

    let cancel = install_signal_handler();
    let mut tasks = JoinSet::new();

    // Rows that came due while the service was down.
    let startup = engine.delivery.sweep(Utc::now()).await;
    if startup.processed() > 0 || startup.errors > 0 {
        info!(?startup, "startup sweep complete");
    }

    #[cfg(unix)]
    tasks.spawn(reload_on_hangup(
        config_path,
        engine.compliance.clone(),
        cancel.clone(),
    ));
    #[cfg(not(unix))]
    let _ = config_path;

    tasks.spawn(run_sweeper(
        Arc::clone(&engine.delivery),
        Duration::from_secs(config.delivery.sweep_interval_secs),
        cancel.clone(),
    ));

    if let Some(jobs) = timer_jobs {
        tasks.spawn(run_timer_trigger(
            jobs,
            Arc::clone(&engine.delivery),
            config.delivery.workers,
            cancel.clone(),
        ));
    }

    if config.webhook.enabled {
        let router = webhook::router(webhook::WebhookState::from_config(&config, &engine));
        let addr = format!("{}:{}", config.webhook.bind_address, config.webhook.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| CadenceError::Internal(format!("failed to bind webhook to {addr}: {e}")))?;
        info!("webhook listening on {addr}");

        let shutdown = cancel.clone();
        tasks.spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "webhook server error");
            }
        });
    }

    info!("cadence ready");
    cancel.cancelled().await;
    info!("shutdown initiated, waiting for in-flight work");

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "background task panicked");
        }
    }

    if let Err(e) = store.close().await {
        error!(error = %e, "failed to checkpoint database");
    }
    info!("cadence stopped");
    Ok(())
}
