//! Structured run output.
//!
//! One JSON record set per run, keyed by run id, consumed by the external
//! reporting/comparison tooling. Failed runs keep whatever metrics were
//! collected before the failure.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use provbank_config::Mode;
use provbank_core::metrics::{RunStatistics, ThroughputWindow};

use crate::RunState;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub scenario_id: String,
    pub protocol_id: String,
    pub mode: Mode,
    #[serde(flatten)]
    pub state: RunState,
    pub started_at_us: u64,
    pub duration_secs: f64,
    pub statistics: RunStatistics,
    pub throughput_windows: Vec<ThroughputWindow>,
}

impl RunReport {
    pub fn is_failed(&self) -> bool {
        matches!(self.state, RunState::Failed { .. })
    }

    /// Writes `<dir>/<run_id>.json`, creating the directory if needed.
    pub fn write_json(&self, dir: &Path) -> io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", self.run_id));
        let body = serde_json::to_vec_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(&path, body)?;
        Ok(path)
    }
}
