//! caskd: the Cask secret-synchronization daemon.
//!
//! Single OS process running a Tokio async runtime. Clients talk
//! line-delimited JSON RPC over TCP; state lives in SQLite and the blob
//! store.

use std::sync::Arc;

use tracing::{error, info, warn};

use cask_daemon::config::DaemonConfig;
use cask_daemon::rpc::RpcServer;
use cask_daemon::{sweep, DaemonState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config; it decides the log level.
    let config = DaemonConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(config.log_directive().parse()?),
        )
        .init();

    info!("Cask daemon starting");

    if config.rpc.enable_tls {
        warn!("rpc.enable_tls is set; TLS must be terminated by the fronting proxy, caskd serves plaintext");
    }

    // 2. Ensure the data directory exists.
    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // 3. Open database and blob store.
    let conn = cask_db::open(&config.db_path())?;
    let blob = Arc::new(cask_blob::FsBlobStore::open(config.blob_root()).await?);

    // 4. Build daemon state.
    let addr = format!("0.0.0.0:{}", config.rpc.port);
    let state = DaemonState::new(config, conn, blob);

    // 5. Start the pending-session sweep.
    let sweep_handle = tokio::spawn(sweep::run(
        state.db.clone(),
        state.shutdown_tx.subscribe(),
    ));

    // 6. Run the RPC server until shutdown.
    let server = RpcServer::bind(state.clone(), &addr).await?;
    let shutdown_tx = state.shutdown_tx.clone();
    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("RPC server error: {e}");
            }
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    // Graceful shutdown: stop the sweep, then exit.
    let _ = shutdown_tx.send(());
    let _ = sweep_handle.await;

    info!("Daemon stopped");
    Ok(())
}
