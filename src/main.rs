use std::sync::Arc;

use kv_mirror::health;
use kv_mirror::EtcdStore;
use kv_mirror::EventBroker;
use kv_mirror::LeaseSweeper;
use kv_mirror::Mirror;
use kv_mirror::MirrorConfig;
use kv_mirror::Result;
use kv_mirror::SyncEngine;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let settings = MirrorConfig::new()?.validate()?;

    // Initializing Logs
    let _guard = init_observability();

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());

    let store = Arc::new(EtcdStore::connect(&settings.remote)?);
    let mirror = Arc::new(Mirror::new());
    let broker = EventBroker::new(&settings.broker);
    broker.start();

    let engine = SyncEngine::new(
        store.clone(),
        mirror.clone(),
        broker.clone(),
        settings.remote.prefix.clone(),
        settings.retry.clone(),
    );

    let mut handles = Vec::new();
    let sweeper = LeaseSweeper::new(store, mirror, broker.clone(), settings.sweeper.clone());
    let sweeper_rx = graceful_rx.clone();
    kv_mirror::async_task::spawn_task("lease sweeper", move || sweeper.run(sweeper_rx), &mut handles);

    if settings.health.enabled {
        let addr = settings.health.socket_addr()?;
        let state = engine.state();
        let health_rx = graceful_rx.clone();
        kv_mirror::async_task::spawn_task(
            "health endpoint",
            move || health::start_server(addr, state, health_rx),
            &mut handles,
        );
    }

    info!(
        endpoints = ?settings.remote.endpoints,
        prefix = %settings.remote.prefix,
        "Mirror started. Waiting for CTRL+C signal..."
    );

    // Run the engine until a shutdown signal or a fatal failure
    let engine_task = engine.run(graceful_rx);
    tokio::pin!(engine_task);
    let result = tokio::select! {
        result = &mut engine_task => result,
        signal = wait_for_shutdown_signal() => {
            match signal {
                Ok(()) => {
                    let _ = graceful_tx.send(());
                }
                Err(e) => error!("Failed to listen for shutdown signals: {:?}", e),
            }
            engine_task.await
        }
    };

    // stop whatever is still running (the engine may have ended on its own)
    let _ = graceful_tx.send(());
    broker.stop().await;
    for handle in handles {
        if let Err(e) = handle.await {
            warn!("Background task ended abnormally: {:?}", e);
        }
    }

    if let Err(e) = result {
        error!("sync engine stops: {:?}", e);
        return Err(e);
    }

    info!("Exiting program.");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }
    Ok(())
}

fn init_observability() -> WorkerGuard {
    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    guard
}
