//! # cask-daemon
//!
//! The Cask server: a single OS process running a Tokio runtime, exposing
//! the line-delimited JSON RPC surface over TCP and persisting to SQLite and
//! a blob store. Clients hold all key material; this process only ever sees
//! verifiers, bearer tokens, and ciphertext.

pub mod commands;
pub mod config;
pub mod context;
pub mod rpc;
pub mod service;
pub mod sweep;

use std::sync::Arc;

use tokio::sync::broadcast;

use cask_blob::BlobStore;
use cask_token::TokenManager;
use cask_types::user::KdfParams;

use crate::config::DaemonConfig;
use crate::service::{AuthService, RecordService, TokenService};

/// Shared database handle: one SQLite connection behind an async mutex.
pub type Db = Arc<tokio::sync::Mutex<rusqlite::Connection>>;

/// Daemon-wide shared state.
pub struct DaemonState {
    /// Database connection.
    pub db: Db,
    /// Configuration.
    pub config: DaemonConfig,
    /// Authentication exchange service.
    pub auth: AuthService,
    /// Token lifecycle service.
    pub tokens: Arc<TokenService>,
    /// Record ingestion and sync service.
    pub records: RecordService,
    /// Shutdown signal sender.
    pub shutdown_tx: broadcast::Sender<()>,
}

impl DaemonState {
    /// Wire up services over the shared pools.
    pub fn new(
        config: DaemonConfig,
        conn: rusqlite::Connection,
        blob: Arc<dyn BlobStore>,
    ) -> Arc<Self> {
        let db: Db = Arc::new(tokio::sync::Mutex::new(conn));
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);

        let manager = TokenManager::new(config.token.secret.as_bytes().to_vec());
        let tokens = Arc::new(TokenService::new(db.clone(), manager));
        let kdf = KdfParams {
            time: config.kdf.time,
            mem_kib: config.kdf.mem_kib,
            parallelism: config.kdf.parallelism,
        };
        let auth = AuthService::new(db.clone(), tokens.clone(), kdf);
        let records = RecordService::new(db.clone(), blob);

        Arc::new(Self {
            db,
            config,
            auth,
            tokens,
            records,
            shutdown_tx,
        })
    }
}
