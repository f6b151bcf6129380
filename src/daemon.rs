//! Daemon runtime: wire the pipeline and run the listener until shutdown.

use crate::analysis::HttpAnalyzer;
use crate::config::Config;
use crate::error::{CallguardError, Result};
use crate::push::HttpNotifier;
use crate::server::Server;
use crate::session::SessionContext;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Run the daemon: bind the listener, serve until SIGINT/SIGTERM, then stop
/// accepting and let in-flight sessions drain.
pub async fn run_daemon(config: Config) -> Result<()> {
    // One outbound HTTP client shared by the analysis and push clients; each
    // session only issues strictly sequential calls, so no extra locking.
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.analysis.timeout_secs))
        .build()
        .map_err(|e| CallguardError::Other(format!("Failed to build HTTP client: {e}")))?;

    let ctx = Arc::new(SessionContext {
        analyzer: Arc::new(HttpAnalyzer::new(
            client.clone(),
            config.analysis.endpoint.clone(),
        )),
        notifier: Arc::new(HttpNotifier::new(client, config.push.endpoint.clone())),
        push_title: config.push.title.clone(),
    });

    let server = Arc::new(
        Server::bind(
            &config.server.host,
            config.server.port,
            config.server.max_connections,
        )
        .await?,
    );

    let accept = Arc::clone(&server);
    let mut server_handle = tokio::spawn(async move { accept.start(ctx).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, shutting down");
        }
        res = wait_for_sigterm() => {
            if let Err(e) = res {
                error!("error setting up signal handler: {e}");
            }
            info!("received SIGTERM, shutting down");
        }
        res = &mut server_handle => {
            // Accept loop ended on its own. The error terminates only the
            // listener; sessions already running keep their sockets, so log
            // it and fall through to the drain below.
            match res {
                Ok(Ok(())) => info!("listener exited"),
                Ok(Err(e)) => error!("listener error, no longer accepting: {e}"),
                Err(e) => error!("listener task failed: {e}"),
            }
            server.drain().await;
            info!("daemon stopped");
            return Ok(());
        }
    }

    server.stop().await;

    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("listener error during shutdown: {e}"),
        Err(e) => error!("listener task failed: {e}"),
    }

    // In-flight sessions run to natural completion before the process exits.
    server.drain().await;

    info!("daemon stopped");
    Ok(())
}

/// Wait for SIGTERM signal (used by systemd).
#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| CallguardError::Other(format!("Failed to register SIGTERM handler: {e}")))?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    // On non-Unix, just wait forever (Ctrl+C will still work)
    std::future::pending::<()>().await
}
