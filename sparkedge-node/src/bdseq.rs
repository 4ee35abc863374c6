use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{error, warn};
use serde::{Deserialize, Serialize};

/// Durable storage for the node's birth/death sequence counter.
///
/// `bdSeq` identifies a connection generation and must survive process
/// restarts so a host can discard a death notice belonging to a superseded
/// generation. Failures on this path degrade fidelity but never halt
/// telemetry, so neither operation returns an error to the caller.
pub trait BdSeqStore: Send {
    /// Read the last persisted counter. Absent or unreadable state yields 0;
    /// corruption is treated as a fresh start.
    fn load(&mut self) -> u64;

    /// Persist `current + 1` and return it. The write must complete (or
    /// fail and be logged) before the birth message referencing the value is
    /// published; on failure the in-memory counter still advances.
    fn increment_and_save(&mut self, current: u64) -> u64;
}

#[derive(Serialize, Deserialize)]
struct BdSeqRecord {
    #[serde(rename = "bdSeq")]
    bd_seq: u64,
}

/// File-backed [BdSeqStore], one JSON record per node identity.
///
/// Writes go to a sibling temp file which is synced and renamed over the
/// record, so a crash mid-write leaves the previous value intact.
pub struct FileBdSeqStore {
    path: PathBuf,
}

impl FileBdSeqStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    fn read_record(path: &Path) -> Result<u64, String> {
        let bytes = fs::read(path).map_err(|e| e.to_string())?;
        let record: BdSeqRecord =
            serde_json::from_slice(&bytes).map_err(|e| e.to_string())?;
        Ok(record.bd_seq)
    }

    fn write_record(path: &Path, value: u64) -> Result<(), String> {
        let bytes =
            serde_json::to_vec(&BdSeqRecord { bd_seq: value }).map_err(|e| e.to_string())?;
        let tmp = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp).map_err(|e| e.to_string())?;
        file.write_all(&bytes).map_err(|e| e.to_string())?;
        file.sync_all().map_err(|e| e.to_string())?;
        fs::rename(&tmp, path).map_err(|e| e.to_string())
    }
}

impl BdSeqStore for FileBdSeqStore {
    fn load(&mut self) -> u64 {
        if !self.path.exists() {
            return 0;
        }
        match Self::read_record(&self.path) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    "bdSeq record {} unreadable, starting from 0: {e}",
                    self.path.display()
                );
                0
            }
        }
    }

    fn increment_and_save(&mut self, current: u64) -> u64 {
        let next = current.wrapping_add(1);
        if let Err(e) = Self::write_record(&self.path, next) {
            error!(
                "failed to persist bdSeq {next} to {}: {e}",
                self.path.display()
            );
        }
        next
    }
}

/// In-memory [BdSeqStore] for tests and deployments that accept losing the
/// generation counter across restarts.
#[derive(Debug, Default)]
pub struct MemoryBdSeqStore {
    value: u64,
}

impl MemoryBdSeqStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BdSeqStore for MemoryBdSeqStore {
    fn load(&mut self) -> u64 {
        self.value
    }

    fn increment_and_save(&mut self, current: u64) -> u64 {
        self.value = current.wrapping_add(1);
        self.value
    }
}
