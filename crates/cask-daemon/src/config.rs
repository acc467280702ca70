//! Configuration file management.
//!
//! TOML file loaded from `$CASK_CONFIG` (or `$CASK_DATA_DIR/config.toml`),
//! falling back to defaults; a few secrets and deployment knobs can be
//! overridden from the environment.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Log verbosity as a signed level: -4 debug, 0 info, 4 warn, 8 error.
    #[serde(default)]
    pub log_level: i32,
    /// RPC listener settings.
    #[serde(default)]
    pub rpc: RpcConfig,
    /// Database settings.
    #[serde(default)]
    pub db: DbConfig,
    /// Token signing settings.
    #[serde(default)]
    pub token: TokenConfig,
    /// Blob storage settings.
    #[serde(default)]
    pub blob: BlobConfig,
    /// KDF cost parameters issued to registering clients.
    #[serde(default)]
    pub kdf: KdfConfig,
}

/// RPC listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// TCP port to listen on.
    #[serde(default = "default_rpc_port")]
    pub port: u16,
    /// TLS is terminated by the fronting proxy; setting this only logs a
    /// reminder that the daemon itself serves plaintext.
    #[serde(default)]
    pub enable_tls: bool,
    #[serde(default)]
    pub cert_path: String,
    #[serde(default)]
    pub key_path: String,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Path of the SQLite database file. Empty = `$data_dir/cask.db`.
    #[serde(default)]
    pub path: String,
}

/// Token signing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Symmetric MAC secret for both token classes.
    #[serde(default = "default_token_secret")]
    pub secret: String,
}

/// Blob storage configuration.
///
/// The filesystem backend uses `root`; the remaining keys describe an
/// external object store for deployments fronting one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    /// Root directory for the filesystem backend. Empty = `$data_dir/blobs`.
    #[serde(default)]
    pub root: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default)]
    pub use_tls: bool,
}

/// Client-side KDF cost parameters the daemon stores and echoes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KdfConfig {
    #[serde(default = "default_kdf_time")]
    pub time: u32,
    #[serde(default = "default_kdf_mem_kib")]
    pub mem_kib: u32,
    #[serde(default = "default_kdf_parallelism")]
    pub parallelism: u8,
}

// Default value functions

fn default_rpc_port() -> u16 {
    50051
}

fn default_token_secret() -> String {
    "devsecret".to_string()
}

fn default_bucket() -> String {
    "cask-files".to_string()
}

fn default_kdf_time() -> u32 {
    3
}

fn default_kdf_mem_kib() -> u32 {
    65536
}

fn default_kdf_parallelism() -> u8 {
    4
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            port: default_rpc_port(),
            enable_tls: false,
            cert_path: String::new(),
            key_path: String::new(),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: default_token_secret(),
        }
    }
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            root: String::new(),
            endpoint: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            bucket: default_bucket(),
            use_tls: false,
        }
    }
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            time: default_kdf_time(),
            mem_kib: default_kdf_mem_kib(),
            parallelism: default_kdf_parallelism(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if the file does not exist, then applies
    /// environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply environment overrides for secrets and deployment knobs.
    fn apply_env(&mut self) {
        if let Ok(secret) = std::env::var("CASK_TOKEN_SECRET") {
            self.token.secret = secret;
        }
        if let Ok(path) = std::env::var("CASK_DB_PATH") {
            self.db.path = path;
        }
        if let Ok(port) = std::env::var("CASK_RPC_PORT") {
            if let Ok(port) = port.parse() {
                self.rpc.port = port;
            }
        }
        if let Ok(root) = std::env::var("CASK_BLOB_ROOT") {
            self.blob.root = root;
        }
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if let Ok(dir) = std::env::var("CASK_DATA_DIR") {
            return PathBuf::from(dir);
        }
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".cask"))
            .unwrap_or_else(|_| PathBuf::from("/tmp/cask"))
    }

    /// Path of the SQLite database file.
    pub fn db_path(&self) -> PathBuf {
        if self.db.path.is_empty() {
            self.data_dir().join("cask.db")
        } else {
            PathBuf::from(&self.db.path)
        }
    }

    /// Root directory of the filesystem blob backend.
    pub fn blob_root(&self) -> PathBuf {
        if self.blob.root.is_empty() {
            self.data_dir().join("blobs")
        } else {
            PathBuf::from(&self.blob.root)
        }
    }

    /// Translate the numeric log level to a tracing directive.
    pub fn log_directive(&self) -> &'static str {
        match self.log_level {
            l if l <= -4 => "cask=debug",
            l if l >= 8 => "cask=error",
            l if l >= 4 => "cask=warn",
            _ => "cask=info",
        }
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("CASK_CONFIG") {
            return PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("CASK_DATA_DIR") {
            return PathBuf::from(dir).join("config.toml");
        }
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".cask").join("config.toml"))
            .unwrap_or_else(|_| PathBuf::from("/tmp/cask/config.toml"))
    }
}
