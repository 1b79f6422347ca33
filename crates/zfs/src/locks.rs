use futures::lock::{Mutex as AsyncMutex, OwnedMutexGuard};
use std::{
  collections::HashMap,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// Serializes lifecycle operations per volume ID. Entries only live while
/// some operation holds or waits for them.
#[derive(Default)]
pub struct VolumeLocks {
  table: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

pub struct VolumeLockGuard<'a> {
  locks: &'a VolumeLocks,
  id: String,
  guard: Option<OwnedMutexGuard<()>>,
}

impl VolumeLocks {
  pub fn new() -> Self {
    Self::default()
  }

  fn table(&self) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
    self.table.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub async fn lock(&self, id: &str) -> VolumeLockGuard<'_> {
    let entry = {
      let mut table = self.table();
      table
        .entry(id.to_owned())
        .or_insert_with(|| Arc::new(AsyncMutex::new(())))
        .clone()
    };

    let guard = entry.lock_owned().await;
    VolumeLockGuard {
      locks: self,
      id: id.to_owned(),
      guard: Some(guard),
    }
  }

  /// Number of IDs currently locked or waited on.
  pub fn len(&self) -> usize {
    self.table().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl VolumeLockGuard<'_> {
  #[inline]
  pub fn id(&self) -> &str {
    &self.id
  }
}

impl Drop for VolumeLockGuard<'_> {
  fn drop(&mut self) {
    drop(self.guard.take());

    let mut table = self.locks.table();
    let unused = table
      .get(&self.id)
      .map_or(false, |entry| Arc::strong_count(entry) == 1);
    if unused {
      table.remove(&self.id);
    }
  }
}
