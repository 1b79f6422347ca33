use crate::error::{Result, VolumeError};
use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
  time::SystemTime,
};
use tracing::{debug, info};

/// Point-in-time copy of a volume, exported as an archive at `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
  id: String,
  name: String,
  volume_id: String,
  path: PathBuf,
  creation_time: SystemTime,
  size_bytes: u64,
  ready_to_use: bool,
}

impl Snapshot {
  pub fn new(
    id: impl Into<String>,
    name: impl Into<String>,
    volume_id: impl Into<String>,
    path: impl Into<PathBuf>,
  ) -> Self {
    Snapshot {
      id: id.into(),
      name: name.into(),
      volume_id: volume_id.into(),
      path: path.into(),
      creation_time: SystemTime::now(),
      size_bytes: 0,
      ready_to_use: false,
    }
  }

  pub fn with_size_bytes(mut self, size_bytes: u64) -> Self {
    self.size_bytes = size_bytes;
    self
  }

  pub fn with_creation_time(mut self, creation_time: SystemTime) -> Self {
    self.creation_time = creation_time;
    self
  }

  pub fn with_ready_to_use(mut self, ready_to_use: bool) -> Self {
    self.ready_to_use = ready_to_use;
    self
  }

  #[inline]
  pub fn id(&self) -> &str {
    &self.id
  }

  #[inline]
  pub fn name(&self) -> &str {
    &self.name
  }

  /// ID of the volume the snapshot was taken from.
  #[inline]
  pub fn volume_id(&self) -> &str {
    &self.volume_id
  }

  #[inline]
  pub fn path(&self) -> &Path {
    &self.path
  }

  #[inline]
  pub fn creation_time(&self) -> SystemTime {
    self.creation_time
  }

  #[inline]
  pub fn size_bytes(&self) -> u64 {
    self.size_bytes
  }

  /// A snapshot must not be restored from until its export is complete.
  #[inline]
  pub fn ready_to_use(&self) -> bool {
    self.ready_to_use
  }
}

/// Catalog of known snapshots, keyed by snapshot ID.
///
/// Entries are held in memory only. After a restart the catalog is empty
/// while exported archives may still exist on disk.
#[derive(Debug, Default)]
pub struct SnapshotCatalog {
  snapshots: RwLock<HashMap<String, Snapshot>>,
}

impl SnapshotCatalog {
  pub fn new() -> Self {
    Self::default()
  }

  fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Snapshot>> {
    self.snapshots.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Snapshot>> {
    self.snapshots.write().unwrap_or_else(PoisonError::into_inner)
  }

  /// Add or replace a snapshot, returning the previous entry with that ID.
  pub fn insert(&self, snapshot: Snapshot) -> Option<Snapshot> {
    info!(id = snapshot.id(), volume_id = snapshot.volume_id(), "registering snapshot");
    self.write().insert(snapshot.id.clone(), snapshot)
  }

  pub fn get(&self, id: &str) -> Result<Snapshot> {
    self
      .read()
      .get(id)
      .cloned()
      .ok_or_else(|| VolumeError::SnapshotNotFound(id.to_owned()))
  }

  pub fn find_by_name(&self, name: &str) -> Result<Snapshot> {
    self
      .read()
      .values()
      .find(|s| s.name == name)
      .cloned()
      .ok_or_else(|| VolumeError::SnapshotNotFound(name.to_owned()))
  }

  /// Flip the readiness gate once the snapshot's export has completed.
  pub fn mark_ready(&self, id: &str) -> Result<()> {
    match self.write().get_mut(id) {
      Some(snapshot) => {
        snapshot.ready_to_use = true;
        debug!(id, "snapshot ready to use");
        Ok(())
      }
      None => Err(VolumeError::SnapshotNotFound(id.to_owned())),
    }
  }

  pub fn remove(&self, id: &str) -> Option<Snapshot> {
    self.write().remove(id)
  }

  /// All snapshots, oldest first.
  pub fn list(&self) -> Vec<Snapshot> {
    let mut snapshots = self.read().values().cloned().collect::<Vec<_>>();
    snapshots.sort_by(|a, b| {
      a.creation_time
        .cmp(&b.creation_time)
        .then_with(|| a.id.cmp(&b.id))
    });
    snapshots
  }
}
