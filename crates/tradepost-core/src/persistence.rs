//! Save and load of the whole market.
//!
//! A [`MarketSnapshot`] holds everything needed to resume a run: the tick,
//! the towns, their ledgers, every contract with its escrow, and each town's
//! scheduled bids. Stores serialize it as JSON.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use tradepost_ledger::TownLedger;
use tradepost_market::BoardState;
use tradepost_types::{AgentId, ContractId};

use crate::world::Town;

/// Errors that can occur while saving or loading.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Reading or writing the save file failed.
    #[error("save file I/O error at {path}: {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Everything needed to resume a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Tick the snapshot was taken after.
    pub tick: u64,
    /// Every town.
    pub towns: Vec<Town>,
    /// Town stock outside escrow.
    pub ledger: TownLedger,
    /// Contracts, escrow, and the dirty flag.
    pub board: BoardState,
    /// Scheduled bids per town: contract id to due tick.
    pub pending_bids: BTreeMap<AgentId, BTreeMap<ContractId, u64>>,
}

/// Somewhere a snapshot can be kept.
pub trait PersistenceStore {
    /// Replace the stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the snapshot cannot be written.
    fn save(&mut self, snapshot: &MarketSnapshot) -> Result<(), PersistenceError>;

    /// The stored snapshot, or `None` if nothing was saved yet.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if stored data exists but cannot be read.
    fn load(&self) -> Result<Option<MarketSnapshot>, PersistenceError>;
}

// ---------------------------------------------------------------------------
// JSON file
// ---------------------------------------------------------------------------

/// Pretty-printed JSON in a single file.
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// crash mid-save leaves the previous save intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Store at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The save file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl PersistenceStore for JsonFileStore {
    fn save(&mut self, snapshot: &MarketSnapshot) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(snapshot)?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
        }
        let temp = self.temp_path();
        std::fs::write(&temp, json).map_err(|e| self.io_error(e))?;
        std::fs::rename(&temp, &self.path).map_err(|e| self.io_error(e))?;
        debug!(
            path = %self.path.display(),
            tick = snapshot.tick,
            contracts = snapshot.board.contracts.len(),
            "Snapshot saved"
        );
        Ok(())
    }

    fn load(&self) -> Result<Option<MarketSnapshot>, PersistenceError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        let snapshot: MarketSnapshot = serde_json::from_str(&contents)?;
        info!(
            path = %self.path.display(),
            tick = snapshot.tick,
            towns = snapshot.towns.len(),
            contracts = snapshot.board.contracts.len(),
            "Snapshot loaded"
        );
        Ok(Some(snapshot))
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// Keeps the last snapshot as a JSON string in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    json: Option<String>,
    saves: u64,
}

impl MemoryStore {
    /// Create an empty store.
    pub const fn new() -> Self {
        Self {
            json: None,
            saves: 0,
        }
    }

    /// Number of successful saves.
    pub const fn saves(&self) -> u64 {
        self.saves
    }
}

impl PersistenceStore for MemoryStore {
    fn save(&mut self, snapshot: &MarketSnapshot) -> Result<(), PersistenceError> {
        self.json = Some(serde_json::to_string(snapshot)?);
        self.saves = self.saves.saturating_add(1);
        Ok(())
    }

    fn load(&self) -> Result<Option<MarketSnapshot>, PersistenceError> {
        self.json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(PersistenceError::from)
    }
}
