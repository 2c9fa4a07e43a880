//! Liveness endpoint: `GET /debug/health` answers `OK` until the sync engine
//! turns fatal.

use std::convert::Infallible;
use std::net::SocketAddr;

use tokio::sync::watch;
use tracing::info;
use warp::http::StatusCode;
use warp::Filter;
use warp::Reply;

use crate::constants::HEALTH_PATH_SEGMENTS;
use crate::EngineState;
use crate::Error;
use crate::Result;

pub fn health_route(
    state: watch::Receiver<EngineState>,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    warp::get()
        .and(warp::path(HEALTH_PATH_SEGMENTS.0))
        .and(warp::path(HEALTH_PATH_SEGMENTS.1))
        .and(warp::path::end())
        .and(warp::any().map(move || state.clone()))
        .and_then(health_handler)
}

async fn health_handler(state: watch::Receiver<EngineState>) -> std::result::Result<impl Reply, Infallible> {
    let current = *state.borrow();
    let reply = match current {
        EngineState::Fatal => warp::reply::with_status("FATAL", StatusCode::SERVICE_UNAVAILABLE),
        _ => warp::reply::with_status("OK", StatusCode::OK),
    };
    Ok(reply)
}

pub async fn start_server(
    addr: SocketAddr,
    state: watch::Receiver<EngineState>,
    mut shutdown_signal: watch::Receiver<()>,
) -> Result<()> {
    let (bound, server) = warp::serve(health_route(state))
        .try_bind_with_graceful_shutdown(addr, async move {
            let _ = shutdown_signal.changed().await;
        })
        .map_err(|e| Error::Fatal(format!("health endpoint cannot bind {addr}: {e}")))?;

    info!(%bound, "Health endpoint listening");
    server.await;
    Ok(())
}
