//! Event number counters.
//!
//! One counter numbers every event of the log, whatever its priority.
//! Counters only move forward; the persisted variant reserves a window of
//! numbers on disk so numbers are never reused across restarts.
//!
//! A missing counter file is a first run. A file that cannot be read or
//! parsed is an error: starting over from zero would hand out numbers that
//! earlier runs already used.

use crate::error::Result;
use crate::matter::types::EventNumber;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Source of event numbers for the event log.
pub trait EventNumberCounter: Send {
    /// Number the next event will get.
    fn value(&self) -> EventNumber;

    /// Move past the current value.
    fn advance(&mut self) -> Result<()>;
}

/// In-memory counter starting at a fixed value.
#[derive(Debug, Clone)]
pub struct MonotonicCounter {
    value: EventNumber,
}

impl MonotonicCounter {
    pub fn new(start: EventNumber) -> Self {
        Self { value: start }
    }
}

impl Default for MonotonicCounter {
    fn default() -> Self {
        Self::new(0)
    }
}

impl EventNumberCounter for MonotonicCounter {
    fn value(&self) -> EventNumber {
        self.value
    }

    fn advance(&mut self) -> Result<()> {
        self.value = self.value.wrapping_add(1);
        Ok(())
    }
}

/// On-disk state of a persisted counter.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct PersistedCounterState {
    /// First number not yet handed out by any previous run
    next_reserved: EventNumber,
}

impl PersistedCounterState {
    fn load(path: &Path) -> Result<Self> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No persisted event counter at {:?} (first run)", path);
                return Ok(Self::default());
            }
            Err(e) => {
                error!("Failed to read event counter file {:?}: {}", path, e);
                return Err(e.into());
            }
        };
        let state = serde_json::from_slice::<PersistedCounterState>(&bytes).map_err(|e| {
            error!("Failed to parse event counter file {:?}: {}", path, e);
            e
        })?;
        info!(
            "Loaded event counter from {:?}, resuming at {}",
            path, state.next_reserved
        );
        Ok(state)
    }

    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }
}

/// Counter whose value survives restarts.
///
/// Only every `epoch`-th value is written to disk: the file always holds a
/// number strictly above anything handed out, and a restarted counter
/// resumes from it.
#[derive(Debug)]
pub struct PersistedEventCounter {
    path: PathBuf,
    epoch: u64,
    value: EventNumber,
    reserved_until: EventNumber,
}

impl PersistedEventCounter {
    /// Open the counter stored at `path`, creating it when missing.
    ///
    /// Fails when the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>, epoch: u64) -> Result<Self> {
        let path = path.into();
        let epoch = epoch.max(1);
        let value = PersistedCounterState::load(&path)?.next_reserved;
        let mut counter = Self {
            path,
            epoch,
            value,
            reserved_until: value,
        };
        counter.reserve()?;
        Ok(counter)
    }

    fn reserve(&mut self) -> Result<()> {
        let next_reserved = self.value.saturating_add(self.epoch);
        PersistedCounterState { next_reserved }.save(&self.path)?;
        self.reserved_until = next_reserved;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventNumberCounter for PersistedEventCounter {
    fn value(&self) -> EventNumber {
        self.value
    }

    fn advance(&mut self) -> Result<()> {
        let next = self.value.saturating_add(1);
        if next >= self.reserved_until {
            // persist before handing the number out
            self.value = next;
            if let Err(e) = self.reserve() {
                self.value -= 1;
                return Err(e);
            }
            return Ok(());
        }
        self.value = next;
        Ok(())
    }
}
