use crate::{
  error::{Result, VolumeError},
  store::VolumeStore,
  volume::Volume,
};
use std::path::PathBuf;
use tracing::debug;

// The store is keyed by name, so finding a volume by ID walks every record.
// TODO: keep an ID-to-name index once clusters carry more than a few hundred volumes.
pub async fn find_by_id<S: VolumeStore + ?Sized>(store: &S, id: &str) -> Result<Volume> {
  let volumes = store
    .list()
    .await
    .map_err(|e| VolumeError::store(format!("Error while retrieving volumes: {}", id), e))?;

  debug!(id, scanned = volumes.len(), "looking up volume by id");
  volumes
    .into_iter()
    .find(|v| v.id() == id)
    .ok_or_else(|| VolumeError::VolumeNotFound(id.to_owned()))
}

pub async fn find_by_name<S: VolumeStore + ?Sized>(store: &S, name: &str) -> Result<Volume> {
  match store.get(name).await {
    Ok(v) => Ok(v),
    Err(e) if e.is_not_found() => Err(VolumeError::VolumeNotFound(name.to_owned())),
    Err(e) => Err(VolumeError::store(
      format!("Error while retrieving volume: {}", name),
      e,
    )),
  }
}

/// Canonical path of the volume with the given ID.
pub async fn resolve_path<S: VolumeStore + ?Sized>(store: &S, id: &str) -> Result<PathBuf> {
  find_by_id(store, id).await.map(|v| v.path().to_owned())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    error::ErrorKind,
    store::{MemoryStore, StoreError, StoreOperation},
  };
  use futures::executor::block_on;
  use std::path::Path;

  fn store() -> MemoryStore {
    let store = MemoryStore::new();
    block_on(store.create(&Volume::new("v1", "data1", "tank", 1))).unwrap();
    block_on(store.create(&Volume::new("v2", "data2", "tank", 1))).unwrap();
    store
  }

  #[test]
  fn finds_by_id() {
    let store = store();
    assert_eq!(block_on(find_by_id(&store, "v2")).unwrap().name(), "data2");
  }

  #[test]
  fn unknown_id_is_not_found() {
    let err = block_on(find_by_id(&store(), "v3")).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("v3"));
  }

  #[test]
  fn list_failure_is_internal() {
    let store = store();
    store.fail(StoreOperation::List, StoreError::Unavailable("timeout".into()));

    let err = block_on(find_by_id(&store, "v1")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
  }

  #[test]
  fn finds_by_name() {
    let store = store();

    assert_eq!(block_on(find_by_name(&store, "data1")).unwrap().id(), "v1");
    assert!(block_on(find_by_name(&store, "data9")).unwrap_err().is_not_found());
  }

  #[test]
  fn resolve_path_is_recoverable() {
    let store = store();

    assert_eq!(
      block_on(resolve_path(&store, "v1")).unwrap(),
      Path::new("/tank/data1")
    );
    assert!(block_on(resolve_path(&store, "missing")).unwrap_err().is_not_found());
  }
}
