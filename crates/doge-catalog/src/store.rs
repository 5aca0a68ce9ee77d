//! Durable snapshots of the catalog.

use crate::{CatalogResult, PeerRecord};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default snapshot file name.
pub const SNAPSHOT_FILE: &str = "peers.json";

/// Storage for whole-catalog snapshots.
///
/// The catalog rewrites the snapshot after every mutation and reads it once at
/// startup. Implementations must be cheap enough to call with the catalog lock held.
pub trait SnapshotStore: Send + Sync {
    /// Read the last snapshot, `None` if there is none yet.
    fn load(&self) -> CatalogResult<Option<HashMap<String, PeerRecord>>>;

    /// Replace the snapshot.
    fn save(&self, peers: &HashMap<String, PeerRecord>) -> CatalogResult<()>;
}

/// JSON file snapshot, written atomically through a temp file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `peers.json` inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(SNAPSHOT_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl SnapshotStore for JsonFileStore {
    fn load(&self) -> CatalogResult<Option<HashMap<String, PeerRecord>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let peers: HashMap<String, PeerRecord> = serde_json::from_str(&content)?;
        debug!(path = %self.path.display(), count = peers.len(), "Loaded peer snapshot");
        Ok(Some(peers))
    }

    fn save(&self, peers: &HashMap<String, PeerRecord>) -> CatalogResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        // Sorted keys keep the file diffable
        let ordered: BTreeMap<&String, &PeerRecord> = peers.iter().collect();
        let content = serde_json::to_string_pretty(&ordered)?;

        let temp = self.temp_path();
        std::fs::write(&temp, content)?;
        std::fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

/// In-memory snapshot, for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<HashMap<String, PeerRecord>>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot.
    pub fn with_snapshot(peers: HashMap<String, PeerRecord>) -> Self {
        Self {
            snapshot: Mutex::new(Some(peers)),
            saves: Mutex::new(0),
        }
    }

    /// The last saved snapshot.
    pub fn snapshot(&self) -> Option<HashMap<String, PeerRecord>> {
        self.snapshot.lock().clone()
    }

    /// Number of saves so far.
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self) -> CatalogResult<Option<HashMap<String, PeerRecord>>> {
        Ok(self.snapshot.lock().clone())
    }

    fn save(&self, peers: &HashMap<String, PeerRecord>) -> CatalogResult<()> {
        *self.snapshot.lock() = Some(peers.clone());
        *self.saves.lock() += 1;
        Ok(())
    }
}

impl<S: SnapshotStore + ?Sized> SnapshotStore for std::sync::Arc<S> {
    fn load(&self) -> CatalogResult<Option<HashMap<String, PeerRecord>>> {
        (**self).load()
    }

    fn save(&self, peers: &HashMap<String, PeerRecord>) -> CatalogResult<()> {
        (**self).save(peers)
    }
}
