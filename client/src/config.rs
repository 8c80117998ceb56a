use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use swapcrow_core::interface::load_escrow_data;

use crate::error::Result;

pub const DEFAULT_LEDGER_PATH: &str = "./ledger.json";
pub const DEFAULT_KEYPAIR_DIR: &str = "./keys";

/// Where the client keeps its state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// JSON snapshot of the ledger.
    pub ledger_path: PathBuf,
    /// Directory of `<name>.json` keypair files.
    pub keypair_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
            keypair_dir: PathBuf::from(DEFAULT_KEYPAIR_DIR),
        }
    }
}

impl ClientConfig {
    /// Reads the config at `path`, or the defaults if there is no such file.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(?path, "no config file, using defaults");
            return Ok(Self::default());
        }
        Ok(load_escrow_data(path)?)
    }

    pub fn keypair_path(&self, name: &str) -> PathBuf {
        self.keypair_dir.join(format!("{name}.json"))
    }
}
