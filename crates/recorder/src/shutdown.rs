use std::io;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::liveness::Liveness;

/// Install the termination signal handlers and spawn the task that turns a
/// signal into a stop request.
///
/// Signal listening replaces the default "terminate now" action, so the
/// process only exits once `main` has unwound through the sink and socket
/// releases.
#[cfg(unix)]
pub fn spawn(liveness: Liveness) -> io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(()) = sigterm.recv() => info!("SIGTERM received"),
                Some(()) = sigint.recv() => info!("SIGINT received"),
                else => return,
            }
            request_stop(&liveness);
        }
    }))
}

#[cfg(not(unix))]
pub fn spawn(liveness: Liveness) -> io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for ctrl-c");
                return;
            }
            info!("ctrl-c received");
            request_stop(&liveness);
        }
    }))
}

fn request_stop(liveness: &Liveness) {
    if liveness.stop() {
        info!("Shutdown requested, finishing current iteration");
    } else {
        warn!("Shutdown already in progress");
    }
}
