use crate::{
  config::{Commands, Config},
  dataset::{build_create_args, build_destroy_args},
  error::{Result, VolumeError},
  locks::{VolumeLockGuard, VolumeLocks},
  lookup, populate,
  snapshot::{Snapshot, SnapshotCatalog},
  store::VolumeStore,
  volume::{CreateVolumeRequest, Volume, VolumeContentSource},
};
use csi_command_utils::{Args, Command, ExecError, Executor, Interrupt, Output};
use std::{
  path::{Path, PathBuf},
  sync::Arc,
};
use tracing::{debug, error, info, instrument, warn};

/// Lifecycle engine keeping the metadata store and the backend datasets
/// in agreement.
///
/// Operations on the same volume ID, or on the same volume name, never
/// interleave. Every operation that runs commands takes an [Interrupt];
/// firing it kills the in-flight command.
pub struct VolumeEngine<S, E> {
  store: Arc<S>,
  executor: Arc<E>,
  snapshots: Arc<SnapshotCatalog>,
  commands: Commands,
  ids: VolumeLocks,
  names: VolumeLocks,
}

struct Held<'a> {
  _id: VolumeLockGuard<'a>,
  _name: Option<VolumeLockGuard<'a>>,
}

impl<S: VolumeStore, E: Executor> VolumeEngine<S, E> {
  pub fn new(
    store: Arc<S>,
    executor: Arc<E>,
    snapshots: Arc<SnapshotCatalog>,
    config: &Config,
  ) -> Self {
    VolumeEngine {
      store,
      executor,
      snapshots,
      commands: config.commands().clone(),
      ids: VolumeLocks::new(),
      names: VolumeLocks::new(),
    }
  }

  #[inline]
  pub fn store(&self) -> &Arc<S> {
    &self.store
  }

  #[inline]
  pub fn snapshots(&self) -> &Arc<SnapshotCatalog> {
    &self.snapshots
  }

  // Name locks are always taken after the ID lock, so waiting never cycles.
  async fn hold(&self, id: &str, name: Option<&str>) -> Held<'_> {
    let id = self.ids.lock(id).await;
    let name = match name {
      Some(name) => Some(self.names.lock(name).await),
      None => None,
    };

    Held {
      _id: id,
      _name: name,
    }
  }

  async fn zfs(&self, args: Args, interrupt: &Interrupt) -> std::result::Result<Output, ExecError> {
    let command = Command::new(&*self.commands.zfs, args);
    debug!("zfs command: {}", command);
    self.executor.execute(command, interrupt.clone()).await
  }

  /// Provision the dataset for `request` and register its record. When
  /// the request names a content source, the new volume is populated from
  /// it before returning.
  #[instrument(
    name = "engine.create_volume",
    skip(self, request, interrupt),
    fields(volume_id = request.id(), name = request.name())
  )]
  pub async fn create_volume(
    &self,
    request: CreateVolumeRequest,
    interrupt: &Interrupt,
  ) -> Result<Volume> {
    let _held = self.hold(request.id(), Some(request.name())).await;
    let volume = request.to_volume();
    debug!(ephemeral = request.ephemeral(), "creating volume {:?}", volume);

    if let Some(existing) = self.existing(&volume).await? {
      info!("volume {} already registered", volume.id());
      return Ok(existing);
    }

    let submitted = !interrupt.is_interrupted();
    if let Err(e) = self.zfs(build_create_args(&volume), interrupt).await {
      // A create killed mid-run may have got as far as making the dataset.
      if submitted && (e.is_cancelled() || e.is_timed_out()) {
        warn!(
          "create of volume {} interrupted, destroying dataset {}",
          volume.id(),
          volume.dataset()
        );
        self.destroy_orphan(&volume).await;
      }
      return Err(VolumeError::command(
        format!("failed to allocate volume {}", volume.id()),
        e,
      ));
    }

    let stored = match self.store.create(&volume).await {
      Ok(v) => v,
      Err(e) => {
        warn!(
          "failed to register volume {}, destroying dataset {}: {}",
          volume.id(),
          volume.dataset(),
          e
        );
        self.destroy_orphan(&volume).await;
        return Err(VolumeError::store(
          format!("failed to register volume {}", volume.id()),
          e,
        ));
      }
    };
    info!("created volume {} at {}", stored.id(), stored.path().display());

    if let Some(source) = request.content_source() {
      if let Err(e) = self.populate(source, stored.path(), interrupt).await {
        warn!("failed to populate volume {}, removing it: {}", stored.id(), e);
        if let Err(cleanup) = self.remove(&stored, &Interrupt::none()).await {
          error!("failed to remove unpopulated volume {}: {}", stored.id(), cleanup);
        }
        return Err(e);
      }
    }

    Ok(stored)
  }

  // An existing record is only reused when it describes the same dataset
  // under the same ID; anything else is someone else's volume.
  async fn existing(&self, volume: &Volume) -> Result<Option<Volume>> {
    match lookup::find_by_id(&*self.store, volume.id()).await {
      Ok(existing) if same_dataset(&existing, volume) => return Ok(Some(existing)),
      Ok(existing) => {
        return Err(VolumeError::AlreadyExists {
          name: existing.name().to_owned(),
        })
      }
      Err(e) if e.is_not_found() => (),
      Err(e) => return Err(e),
    }

    match self.store.get(volume.name()).await {
      Ok(_) => Err(VolumeError::AlreadyExists {
        name: volume.name().to_owned(),
      }),
      Err(e) if e.is_not_found() => Ok(None),
      Err(e) => Err(VolumeError::store(
        format!("failed to check for existing volume {}", volume.name()),
        e,
      )),
    }
  }

  // Cleanup runs without the caller's interrupt: the request may already be
  // cancelled, but the dataset must not outlive its missing record.
  async fn destroy_orphan(&self, volume: &Volume) {
    if let Err(e) = self
      .zfs(build_destroy_args(volume), &Interrupt::none())
      .await
    {
      error!(
        "dataset {} may exist without a volume record and needs manual cleanup: {}",
        volume.dataset(),
        e
      );
    }
  }

  async fn populate(
    &self,
    source: &VolumeContentSource,
    dest: &Path,
    interrupt: &Interrupt,
  ) -> Result<()> {
    match source {
      VolumeContentSource::Snapshot(snapshot_id) => {
        populate::restore_from_snapshot(
          &*self.executor,
          &self.commands.tar,
          &self.snapshots,
          snapshot_id,
          dest,
          interrupt,
        )
        .await
      }
      VolumeContentSource::Volume(volume_id) => {
        populate::clone_from_volume(
          &*self.store,
          &*self.executor,
          &self.commands.cp,
          volume_id,
          dest,
          interrupt,
        )
        .await
      }
    }
  }

  /// Replace the recorded metadata of volume `id`. The backend dataset is
  /// not touched; this neither resizes nor retags it.
  #[instrument(name = "engine.update_volume", skip(self, volume), fields(volume_id = id))]
  pub async fn update_volume(&self, id: &str, volume: Volume) -> Result<Volume> {
    if volume.id() != id {
      return Err(VolumeError::InvalidArgument(format!(
        "volume record id {} does not match requested id {}",
        volume.id(),
        id
      )));
    }

    let _held = self.hold(id, Some(volume.name())).await;
    let current = lookup::find_by_id(&*self.store, id).await?;
    if current.name() != volume.name() {
      return Err(VolumeError::InvalidArgument(format!(
        "volume {} cannot be renamed from {} to {}",
        id,
        current.name(),
        volume.name()
      )));
    }

    if current.pool() != volume.pool() {
      return Err(VolumeError::InvalidArgument(format!(
        "volume {} cannot be moved from pool {} to {}",
        id,
        current.pool(),
        volume.pool()
      )));
    }

    let volume = match volume.resource_version() {
      Some(_) => volume,
      None => volume.with_resource_version(current.resource_version()),
    };

    debug!("updating volume {}", id);
    self
      .store
      .update(&volume)
      .await
      .map_err(|e| VolumeError::store(format!("failed to update volume {}", id), e))
  }

  /// Destroy the dataset of volume `id` and everything below it, then drop
  /// the record. Deleting an unknown volume succeeds without side effects.
  ///
  /// Only a volume the store reports as missing counts as deleted. Any other
  /// lookup failure is returned and the dataset is left untouched.
  #[instrument(name = "engine.delete_volume", skip(self, interrupt), fields(volume_id = id))]
  pub async fn delete_volume(&self, id: &str, interrupt: &Interrupt) -> Result<()> {
    let _id_held = self.ids.lock(id).await;
    let volume = match lookup::find_by_id(&*self.store, id).await {
      Ok(v) => v,
      Err(e) if e.is_not_found() => {
        debug!("volume {} not found, nothing to delete", id);
        return Ok(());
      }
      Err(e) => return Err(e),
    };

    let _name_held = self.names.lock(volume.name()).await;
    self.remove(&volume, interrupt).await
  }

  async fn remove(&self, volume: &Volume, interrupt: &Interrupt) -> Result<()> {
    // On failure the record stays behind so the delete can be retried.
    self
      .zfs(build_destroy_args(volume), interrupt)
      .await
      .map_err(|e| VolumeError::command(format!("failed to delete volume {}", volume.id()), e))?;

    if let Err(e) = self.store.delete(volume.name()).await {
      error!(
        "dataset {} destroyed but record {} remains: {}",
        volume.dataset(),
        volume.name(),
        e
      );
      return Err(VolumeError::store(
        format!("failed to remove record of volume {}", volume.id()),
        e,
      ));
    }

    info!("deleted volume {}", volume.id());
    Ok(())
  }

  #[instrument(name = "engine.get_volume_by_id", skip(self))]
  pub async fn get_volume_by_id(&self, id: &str) -> Result<Volume> {
    lookup::find_by_id(&*self.store, id).await
  }

  #[instrument(name = "engine.get_volume_by_name", skip(self))]
  pub async fn get_volume_by_name(&self, name: &str) -> Result<Volume> {
    lookup::find_by_name(&*self.store, name).await
  }

  pub async fn list_volumes(&self) -> Result<Vec<Volume>> {
    self
      .store
      .list()
      .await
      .map_err(|e| VolumeError::store("failed to list volumes", e))
  }

  pub async fn resolve_path(&self, id: &str) -> Result<PathBuf> {
    lookup::resolve_path(&*self.store, id).await
  }

  pub fn lookup_snapshot(&self, name: &str) -> Result<Snapshot> {
    self.snapshots.find_by_name(name)
  }

  #[instrument(name = "engine.restore_from_snapshot", skip(self, dest, interrupt))]
  pub async fn restore_from_snapshot(
    &self,
    snapshot_id: &str,
    dest: &Path,
    interrupt: &Interrupt,
  ) -> Result<()> {
    populate::restore_from_snapshot(
      &*self.executor,
      &self.commands.tar,
      &self.snapshots,
      snapshot_id,
      dest,
      interrupt,
    )
    .await
  }

  #[instrument(name = "engine.clone_from_volume", skip(self, dest, interrupt))]
  pub async fn clone_from_volume(
    &self,
    source_volume_id: &str,
    dest: &Path,
    interrupt: &Interrupt,
  ) -> Result<()> {
    populate::clone_from_volume(
      &*self.store,
      &*self.executor,
      &self.commands.cp,
      source_volume_id,
      dest,
      interrupt,
    )
    .await
  }
}

fn same_dataset(a: &Volume, b: &Volume) -> bool {
  a.id() == b.id() && a.name() == b.name() && a.pool() == b.pool() && a.size() == b.size()
}
