use super::{StoreError, VolumeStore};
use crate::volume::Volume;
use async_trait::async_trait;
use std::{
  collections::{BTreeMap, HashMap},
  sync::{Mutex, MutexGuard, PoisonError},
};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
  Create,
  Update,
  Delete,
  Get,
  List,
}

#[derive(Default)]
struct MemoryStoreInner {
  records: BTreeMap<String, Volume>,
  last_version: u64,
  failures: HashMap<StoreOperation, StoreError>,
}

/// Process-local [VolumeStore]. Records do not survive a restart, so this
/// is meant for tests and single-node development setups.
#[derive(Default)]
pub struct MemoryStore(Mutex<MemoryStoreInner>);

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn inner(&self) -> MutexGuard<'_, MemoryStoreInner> {
    self.0.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Make every subsequent `operation` fail with `error`.
  pub fn fail(&self, operation: StoreOperation, error: StoreError) {
    self.inner().failures.insert(operation, error);
  }

  pub fn recover(&self, operation: StoreOperation) {
    self.inner().failures.remove(&operation);
  }

  pub fn contains(&self, name: &str) -> bool {
    self.inner().records.contains_key(name)
  }

  pub fn len(&self) -> usize {
    self.inner().records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl MemoryStoreInner {
  fn check(&self, operation: StoreOperation) -> Result<(), StoreError> {
    match self.failures.get(&operation) {
      Some(e) => Err(e.clone()),
      None => Ok(()),
    }
  }

  fn stamp(&mut self, volume: &Volume) -> Volume {
    self.last_version += 1;
    volume.clone().with_resource_version(Some(self.last_version))
  }
}

#[async_trait]
impl VolumeStore for MemoryStore {
  async fn create(&self, volume: &Volume) -> Result<Volume, StoreError> {
    let mut inner = self.inner();
    inner.check(StoreOperation::Create)?;

    if inner.records.contains_key(volume.name()) {
      return Err(StoreError::AlreadyExists(volume.name().to_owned()));
    }

    let stored = inner.stamp(volume);
    debug!(name = volume.name(), version = ?stored.resource_version(), "created volume record");
    inner.records.insert(volume.name().to_owned(), stored.clone());
    Ok(stored)
  }

  async fn update(&self, volume: &Volume) -> Result<Volume, StoreError> {
    let mut inner = self.inner();
    inner.check(StoreOperation::Update)?;

    let actual = match inner.records.get(volume.name()) {
      None => return Err(StoreError::NotFound(volume.name().to_owned())),
      Some(existing) => existing.resource_version().unwrap_or_default(),
    };

    if let Some(expected) = volume.resource_version() {
      if expected != actual {
        return Err(StoreError::Conflict {
          name: volume.name().to_owned(),
          expected,
          actual,
        });
      }
    }

    let stored = inner.stamp(volume);
    inner.records.insert(volume.name().to_owned(), stored.clone());
    Ok(stored)
  }

  async fn delete(&self, name: &str) -> Result<(), StoreError> {
    let mut inner = self.inner();
    inner.check(StoreOperation::Delete)?;

    match inner.records.remove(name) {
      Some(_) => Ok(()),
      None => Err(StoreError::NotFound(name.to_owned())),
    }
  }

  async fn get(&self, name: &str) -> Result<Volume, StoreError> {
    let inner = self.inner();
    inner.check(StoreOperation::Get)?;

    inner
      .records
      .get(name)
      .cloned()
      .ok_or_else(|| StoreError::NotFound(name.to_owned()))
  }

  async fn list(&self) -> Result<Vec<Volume>, StoreError> {
    let inner = self.inner();
    inner.check(StoreOperation::List)?;

    Ok(inner.records.values().cloned().collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use futures::executor::block_on;

  fn volume() -> Volume {
    Volume::new("v1", "data1", "tank", 1024)
  }

  #[test]
  fn create_assigns_resource_version() {
    let store = MemoryStore::new();
    let stored = block_on(store.create(&volume())).unwrap();

    assert_eq!(stored.resource_version(), Some(1));
    assert_eq!(block_on(store.get("data1")).unwrap(), stored);
  }

  #[test]
  fn create_rejects_duplicate_name() {
    let store = MemoryStore::new();
    block_on(store.create(&volume())).unwrap();

    let err = block_on(store.create(&volume())).unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(name) if name == "data1"));
  }

  #[test]
  fn stale_update_is_rejected() {
    let store = MemoryStore::new();
    let first = block_on(store.create(&volume())).unwrap();
    block_on(store.update(&first.clone().with_size(2048))).unwrap();

    let err = block_on(store.update(&first.with_size(4096))).unwrap_err();
    assert!(matches!(
      err,
      StoreError::Conflict {
        expected: 1,
        actual: 2,
        ..
      }
    ));
    assert_eq!(block_on(store.get("data1")).unwrap().size(), 2048);
  }

  #[test]
  fn scripted_failures_apply_until_recovered() {
    let store = MemoryStore::new();
    store.fail(StoreOperation::List, StoreError::Unavailable("etcd down".into()));
    assert!(block_on(store.list()).is_err());

    store.recover(StoreOperation::List);
    assert!(block_on(store.list()).unwrap().is_empty());
  }

  #[test]
  fn delete_missing_is_not_found() {
    let store = MemoryStore::new();
    assert!(block_on(store.delete("nope")).unwrap_err().is_not_found());
  }
}
