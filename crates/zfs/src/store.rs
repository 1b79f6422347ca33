mod memory;

use crate::volume::Volume;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use memory::{MemoryStore, StoreOperation};

#[non_exhaustive]
#[derive(Debug, Clone, Error)]
pub enum StoreError {
  #[error("volume record {0} not found")]
  NotFound(String),

  #[error("volume record {0} already exists")]
  AlreadyExists(String),

  /// The record was written by someone else since it was read.
  #[error("volume record {name} has resource version {actual}, expected {expected}")]
  Conflict {
    name: String,
    expected: u64,
    actual: u64,
  },

  #[error("metadata store unavailable: {0}")]
  Unavailable(String),
}

impl StoreError {
  #[inline]
  pub fn is_not_found(&self) -> bool {
    matches!(self, StoreError::NotFound(_))
  }
}

/// Remote store holding one metadata record per volume, keyed by volume
/// name. Implementations must offer read-after-write consistency.
#[async_trait]
pub trait VolumeStore: Send + Sync + 'static {
  /// Persist a new record. The returned record carries the assigned
  /// resource version.
  async fn create(&self, volume: &Volume) -> Result<Volume, StoreError>;

  /// Replace an existing record. When `volume` carries a resource version
  /// that no longer matches the stored one, fails with
  /// [StoreError::Conflict].
  async fn update(&self, volume: &Volume) -> Result<Volume, StoreError>;

  async fn delete(&self, name: &str) -> Result<(), StoreError>;

  async fn get(&self, name: &str) -> Result<Volume, StoreError>;

  async fn list(&self) -> Result<Vec<Volume>, StoreError>;
}

#[async_trait]
impl<T: VolumeStore> VolumeStore for Arc<T> {
  async fn create(&self, volume: &Volume) -> Result<Volume, StoreError> {
    (**self).create(volume).await
  }

  async fn update(&self, volume: &Volume) -> Result<Volume, StoreError> {
    (**self).update(volume).await
  }

  async fn delete(&self, name: &str) -> Result<(), StoreError> {
    (**self).delete(name).await
  }

  async fn get(&self, name: &str) -> Result<Volume, StoreError> {
    (**self).get(name).await
  }

  async fn list(&self) -> Result<Vec<Volume>, StoreError> {
    (**self).list().await
  }
}
