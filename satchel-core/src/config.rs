use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::archive::ArchiveOptions;
use crate::error::{Result, SatchelError};

pub const DEFAULT_TRANSFER_PORT: u16 = 8988;
pub const DEFAULT_DISCOVERY_PORT: u16 = 8989;

/// Tunables for one `Transfers` instance. Durations are milliseconds so the
/// JSON form stays flat.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub transfer_port: u16,
    pub discovery_port: u16,
    pub max_discovery_attempts: u32,
    pub ack_timeout_ms: u64,
    pub ack_repeats: u32,
    pub ack_interval_ms: u64,
    pub advertise_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub accept_timeout_ms: u64,
    pub chunk_size: usize,
    /// Replaces interface enumeration when set; discovery goes only here.
    pub broadcast_targets: Option<Vec<IpAddr>>,
    /// Where archives are staged while built or received. System temp dir
    /// when unset.
    pub temp_dir: Option<PathBuf>,
    pub archive: ArchiveOptions,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            transfer_port: DEFAULT_TRANSFER_PORT,
            discovery_port: DEFAULT_DISCOVERY_PORT,
            max_discovery_attempts: 5,
            ack_timeout_ms: 3_000,
            ack_repeats: 3,
            ack_interval_ms: 100,
            advertise_timeout_ms: 300_000,
            connect_timeout_ms: 10_000,
            accept_timeout_ms: 30_000,
            chunk_size: 64 * 1024,
            broadcast_targets: None,
            temp_dir: None,
            archive: ArchiveOptions::default(),
        }
    }
}

impl TransferConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)?;
        let cfg: Self = serde_json::from_slice(&raw)
            .map_err(|e| SatchelError::Config(format!("{}: {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.transfer_port != 0 && self.transfer_port == self.discovery_port {
            return Err(SatchelError::Config(
                "transfer and discovery ports must differ".into(),
            ));
        }
        if self.max_discovery_attempts == 0 {
            return Err(SatchelError::Config(
                "max_discovery_attempts must be at least 1".into(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(SatchelError::Config("chunk_size must be non-zero".into()));
        }
        Ok(())
    }

    /// Staging file for one archive, removed when dropped.
    pub fn temp_file(&self) -> Result<tempfile::NamedTempFile> {
        let f = match &self.temp_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                tempfile::NamedTempFile::new_in(dir)?
            }
            None => tempfile::NamedTempFile::new()?,
        };
        Ok(f)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn ack_interval(&self) -> Duration {
        Duration::from_millis(self.ack_interval_ms)
    }

    pub fn advertise_timeout(&self) -> Duration {
        Duration::from_millis(self.advertise_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms)
    }
}
