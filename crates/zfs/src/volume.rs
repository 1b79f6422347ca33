use std::{
  fmt,
  path::{Path, PathBuf},
};

/// Where the initial content of a new volume comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeContentSource {
  Snapshot(String),
  Volume(String),
}

/// Metadata record of a logical volume. The record is keyed by `name`,
/// which is also the leaf name of the backing dataset.
#[derive(Clone, PartialEq, Eq)]
pub struct Volume {
  name: String,
  id: String,
  size: u64,
  path: PathBuf,
  pool: String,
  compression: String,
  dedup: String,
  resource_version: Option<u64>,
}

fn volume_path(pool: &str, name: &str) -> PathBuf {
  let mut path = PathBuf::from("/");
  path.push(pool.trim_matches('/'));
  path.push(name);
  path
}

impl Volume {
  pub fn new(
    id: impl Into<String>,
    name: impl Into<String>,
    pool: impl Into<String>,
    size: u64,
  ) -> Self {
    let name = name.into();
    let pool = pool.into();
    let path = volume_path(&pool, &name);

    Volume {
      name,
      id: id.into(),
      size,
      path,
      pool,
      compression: String::new(),
      dedup: String::new(),
      resource_version: None,
    }
  }

  /// Compression property of the dataset. Empty leaves the property unset.
  pub fn with_compression(mut self, compression: impl Into<String>) -> Self {
    self.compression = compression.into();
    self
  }

  /// Dedup property of the dataset. Empty leaves the property unset.
  pub fn with_dedup(mut self, dedup: impl Into<String>) -> Self {
    self.dedup = dedup.into();
    self
  }

  pub fn with_size(mut self, size: u64) -> Self {
    self.size = size;
    self
  }

  pub fn with_pool(mut self, pool: impl Into<String>) -> Self {
    self.pool = pool.into();
    self.path = volume_path(&self.pool, &self.name);
    self
  }

  pub fn with_resource_version(mut self, resource_version: Option<u64>) -> Self {
    self.resource_version = resource_version;
    self
  }

  #[inline]
  pub fn name(&self) -> &str {
    &self.name
  }

  #[inline]
  pub fn id(&self) -> &str {
    &self.id
  }

  /// Capacity in bytes, enforced as the dataset quota.
  #[inline]
  pub fn size(&self) -> u64 {
    self.size
  }

  /// Always `/<pool>/<name>`.
  #[inline]
  pub fn path(&self) -> &Path {
    &self.path
  }

  #[inline]
  pub fn pool(&self) -> &str {
    &self.pool
  }

  #[inline]
  pub fn compression(&self) -> &str {
    &self.compression
  }

  #[inline]
  pub fn dedup(&self) -> &str {
    &self.dedup
  }

  /// Concurrency token assigned by the metadata store on every write.
  #[inline]
  pub fn resource_version(&self) -> Option<u64> {
    self.resource_version
  }

  /// Backend dataset identifier, `<pool>/<name>`.
  pub fn dataset(&self) -> String {
    format!("{}/{}", self.pool.trim_matches('/'), self.name)
  }
}

impl fmt::Debug for Volume {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Volume")
      .field("name", &self.name)
      .field("id", &self.id)
      .field("size", &self.size)
      .field("path", &self.path)
      .field("pool", &self.pool)
      .field("compression", &self.compression)
      .field("dedup", &self.dedup)
      .field("resource_version", &self.resource_version)
      .finish()
  }
}

/// Parameters of a provisioning request.
#[derive(Debug, Clone)]
pub struct CreateVolumeRequest {
  id: String,
  name: String,
  size: u64,
  pool: String,
  compression: String,
  dedup: String,
  ephemeral: bool,
  content_source: Option<VolumeContentSource>,
}

impl CreateVolumeRequest {
  pub fn new(
    id: impl Into<String>,
    name: impl Into<String>,
    pool: impl Into<String>,
    size: u64,
  ) -> Self {
    CreateVolumeRequest {
      id: id.into(),
      name: name.into(),
      size,
      pool: pool.into(),
      compression: String::new(),
      dedup: String::new(),
      ephemeral: false,
      content_source: None,
    }
  }

  pub fn with_compression(mut self, compression: impl Into<String>) -> Self {
    self.compression = compression.into();
    self
  }

  pub fn with_dedup(mut self, dedup: impl Into<String>) -> Self {
    self.dedup = dedup.into();
    self
  }

  /// Marks the volume as tied to the lifetime of its consuming workload.
  /// Informational only; the engine does not act on it.
  pub fn with_ephemeral(mut self, ephemeral: bool) -> Self {
    self.ephemeral = ephemeral;
    self
  }

  pub fn with_content_source(mut self, source: VolumeContentSource) -> Self {
    self.content_source = Some(source);
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

  #[inline]
  pub fn ephemeral(&self) -> bool {
    self.ephemeral
  }

  #[inline]
  pub fn content_source(&self) -> Option<&VolumeContentSource> {
    self.content_source.as_ref()
  }

  /// The record this request will register.
  pub fn to_volume(&self) -> Volume {
    Volume::new(&*self.id, &*self.name, &*self.pool, self.size)
      .with_compression(&*self.compression)
      .with_dedup(&*self.dedup)
  }
}
