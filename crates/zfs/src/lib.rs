//! Volume and snapshot lifecycle for a ZFS backed CSI plugin.
//!
//! Each logical volume is described twice: by a record in the metadata
//! store ([VolumeStore]) and by a dataset `<pool>/<name>` on the host.
//! [VolumeEngine] drives `zfs` and the metadata store together so the two
//! stay in agreement, compensating when one side fails half way.

pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod locks;
pub mod lookup;
pub mod populate;
pub mod snapshot;
pub mod store;
pub mod volume;

pub use config::{Commands, Config, ConfigError, DriverConfig};
pub use engine::VolumeEngine;
pub use error::{ErrorKind, Result, VolumeError};
pub use snapshot::{Snapshot, SnapshotCatalog};
pub use store::{MemoryStore, StoreError, VolumeStore};
pub use volume::{CreateVolumeRequest, Volume, VolumeContentSource};

pub use csi_command_utils::{Canceller, Executor, FakeExecutor, Interrupt, OsExecutor};
