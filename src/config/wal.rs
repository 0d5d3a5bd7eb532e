use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WalConfig {
    /// Directory holding `<generation>.wal` files
    #[serde(default = "default_wal_dir")]
    pub dir: PathBuf,

    /// Re-apply existing log files to the keyspace before serving
    #[serde(default = "default_replay_on_start")]
    pub replay_on_start: bool,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            dir: default_wal_dir(),
            replay_on_start: default_replay_on_start(),
        }
    }
}

impl WalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("wal.dir path cannot be empty".into()));
        }
        Ok(())
    }
}

fn default_wal_dir() -> PathBuf {
    PathBuf::from("/var/lib/meshkv/wals")
}
fn default_replay_on_start() -> bool {
    true
}
