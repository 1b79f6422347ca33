//! Pre-populating a new volume from a snapshot archive or from another
//! volume's directory tree.
//!
//! Restoring from an archive stands in for native dataset snapshots until
//! `zfs snapshot`/`zfs clone` backed snapshots are wired up; the archive
//! path stays as the fallback for snapshots exported elsewhere.

use crate::{
  error::{Result, VolumeError},
  lookup,
  snapshot::SnapshotCatalog,
  store::VolumeStore,
};
use csi_command_utils::{blocking, Args, Command, Executor, Interrupt};
use smallvec::smallvec;
use std::{
  fs, io,
  path::{Path, PathBuf},
};
use tracing::{debug, info};

// Non UTF-8 paths are refused, never rewritten.
fn path_arg(path: &Path) -> Result<&str> {
  path.to_str().ok_or_else(|| {
    VolumeError::InvalidArgument(format!("path {} is not valid UTF-8", path.display()))
  })
}

/// `zxvf <archive> -C <dest>`
pub fn extract_args(archive: &Path, dest: &Path) -> Result<Args> {
  Ok(smallvec![
    "zxvf".to_owned(),
    path_arg(archive)?.to_owned(),
    "-C".to_owned(),
    path_arg(dest)?.to_owned()
  ])
}

/// `-a <source>/. <dest>/`, copying the contents of `source` with all
/// attributes preserved.
pub fn copy_args(source: &Path, dest: &Path) -> Result<Args> {
  Ok(smallvec![
    "-a".to_owned(),
    format!("{}/.", path_arg(source)?),
    format!("{}/", path_arg(dest)?)
  ])
}

/// Whether `path` has no directory entries. Only the first entry is read.
pub async fn is_empty(path: PathBuf) -> Result<bool> {
  let checked = blocking(move || Ok(dir_is_empty(&path)))
    .await
    .map_err(|e| VolumeError::Internal(format!("failed to check directory: {}", e)))?;

  checked.map_err(|e| VolumeError::Internal(format!("unable to open volume directory: {}", e)))
}

fn dir_is_empty(path: &Path) -> io::Result<bool> {
  let mut entries = fs::read_dir(path)?;
  match entries.next() {
    None => Ok(true),
    Some(Ok(_)) => Ok(false),
    Some(Err(e)) => Err(e),
  }
}

pub async fn restore_from_snapshot<E: Executor + ?Sized>(
  executor: &E,
  tar: &str,
  catalog: &SnapshotCatalog,
  snapshot_id: &str,
  dest: &Path,
  interrupt: &Interrupt,
) -> Result<()> {
  let snapshot = catalog.get(snapshot_id)?;
  if !snapshot.ready_to_use() {
    return Err(VolumeError::SnapshotUnready(snapshot_id.to_owned()));
  }

  info!(
    "restoring snapshot {} from {} into {}",
    snapshot_id,
    snapshot.path().display(),
    dest.display()
  );
  let command = Command::new(tar, extract_args(snapshot.path(), dest)?);
  executor
    .execute(command, interrupt.clone())
    .await
    .map_err(|e| {
      VolumeError::command(
        format!("failed pre-populate data from snapshot {}", snapshot_id),
        e,
      )
    })?;

  Ok(())
}

pub async fn clone_from_volume<S, E>(
  store: &S,
  executor: &E,
  cp: &str,
  source_volume_id: &str,
  dest: &Path,
  interrupt: &Interrupt,
) -> Result<()>
where
  S: VolumeStore + ?Sized,
  E: Executor + ?Sized,
{
  let source = match lookup::find_by_id(store, source_volume_id).await {
    Ok(v) => v,
    Err(e) if e.is_not_found() => {
      return Err(VolumeError::SourceNotFound(source_volume_id.to_owned()))
    }
    Err(e) => return Err(e),
  };

  let source_path = source.path().to_owned();
  let empty = is_empty(source_path.clone()).await.map_err(|e| {
    VolumeError::Internal(format!(
      "failed verification check of source volume {}: {}",
      source_volume_id, e
    ))
  })?;

  // Copying from an empty tree makes cp fail on the missing `/.` entry.
  if empty {
    debug!("source volume {} is empty, nothing to copy", source_volume_id);
    return Ok(());
  }

  info!(
    "cloning volume {} from {} into {}",
    source_volume_id,
    source_path.display(),
    dest.display()
  );
  let command = Command::new(cp, copy_args(&source_path, dest)?);
  executor
    .execute(command, interrupt.clone())
    .await
    .map_err(|e| {
      VolumeError::command(
        format!("failed pre-populate data from volume {}", source_volume_id),
        e,
      )
    })?;

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    error::ErrorKind,
    snapshot::Snapshot,
    store::MemoryStore,
    volume::Volume,
  };
  use csi_command_utils::{FakeExecutor, FakeInvocation};
  use futures::executor::block_on;

  fn catalog() -> SnapshotCatalog {
    let catalog = SnapshotCatalog::new();
    catalog.insert(Snapshot::new("s1", "nightly", "v1", "/csi-data-dir/s1.tgz").with_ready_to_use(true));
    catalog.insert(Snapshot::new("s2", "pending", "v1", "/csi-data-dir/s2.tgz"));
    catalog
  }

  #[test]
  fn restore_extracts_archive() {
    let executor = FakeExecutor::new();
    block_on(restore_from_snapshot(
      &executor,
      "tar",
      &catalog(),
      "s1",
      Path::new("/tank/data2"),
      &Interrupt::none(),
    ))
    .unwrap();

    assert_eq!(
      executor.get_log(),
      vec![FakeInvocation {
        program: "tar".into(),
        args: vec![
          "zxvf".into(),
          "/csi-data-dir/s1.tgz".into(),
          "-C".into(),
          "/tank/data2".into()
        ],
      }]
    );
  }

  #[test]
  fn restore_unknown_snapshot_is_not_found() {
    let executor = FakeExecutor::new();
    let err = block_on(restore_from_snapshot(
      &executor,
      "tar",
      &catalog(),
      "s9",
      Path::new("/tank/data2"),
      &Interrupt::none(),
    ))
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(executor.get_log().is_empty());
  }

  #[test]
  fn restore_unready_snapshot_runs_nothing() {
    let executor = FakeExecutor::new();
    let err = block_on(restore_from_snapshot(
      &executor,
      "tar",
      &catalog(),
      "s2",
      Path::new("/tank/data2"),
      &Interrupt::none(),
    ))
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Unready);
    assert!(err.to_string().contains("not yet ready to use"));
    assert!(executor.get_log().is_empty());
  }

  #[test]
  fn restore_refuses_non_utf8_archive_path() {
    use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

    let catalog = SnapshotCatalog::new();
    let archive = Path::new(OsStr::from_bytes(b"/csi-data-dir/s\xff.tgz"));
    catalog.insert(Snapshot::new("s3", "latin1", "v1", archive).with_ready_to_use(true));
    let executor = FakeExecutor::new();

    let err = block_on(restore_from_snapshot(
      &executor,
      "tar",
      &catalog,
      "s3",
      Path::new("/tank/data2"),
      &Interrupt::none(),
    ))
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(executor.get_log().is_empty());
  }

  #[test]
  fn restore_failure_embeds_output() {
    let executor = FakeExecutor::new();
    executor.fail("tar", None, "gzip: stdin: not in gzip format");

    let err = block_on(restore_from_snapshot(
      &executor,
      "tar",
      &catalog(),
      "s1",
      Path::new("/tank/data2"),
      &Interrupt::none(),
    ))
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(err.command_output(), Some("gzip: stdin: not in gzip format"));
  }

  fn store_with_source(pool: &Path) -> MemoryStore {
    let store = MemoryStore::new();
    let volume = Volume::new("src", "source", pool.to_string_lossy(), 1);
    block_on(store.create(&volume)).unwrap();
    store
  }

  #[test]
  fn clone_from_empty_source_is_noop() {
    let pool = tempfile::tempdir().unwrap();
    std::fs::create_dir(pool.path().join("source")).unwrap();
    let store = store_with_source(pool.path());
    let executor = FakeExecutor::new();

    block_on(clone_from_volume(
      &store,
      &executor,
      "cp",
      "src",
      Path::new("/tank/dest"),
      &Interrupt::none(),
    ))
    .unwrap();

    assert!(executor.get_log().is_empty());
  }

  #[test]
  fn clone_copies_non_empty_source() {
    let pool = tempfile::tempdir().unwrap();
    let source = pool.path().join("source");
    std::fs::create_dir(&source).unwrap();
    std::fs::write(source.join("data.bin"), b"payload").unwrap();
    let store = store_with_source(pool.path());
    let executor = FakeExecutor::new();

    block_on(clone_from_volume(
      &store,
      &executor,
      "cp",
      "src",
      Path::new("/tank/dest"),
      &Interrupt::none(),
    ))
    .unwrap();

    let log = executor.invocations_of("cp");
    assert_eq!(log.len(), 1);
    assert_eq!(
      log[0].args,
      vec![
        "-a".to_owned(),
        format!("{}/.", source.display()),
        "/tank/dest/".to_owned()
      ]
    );
  }

  #[test]
  fn clone_unknown_source_hints_storage_class() {
    let store = MemoryStore::new();
    let executor = FakeExecutor::new();

    let err = block_on(clone_from_volume(
      &store,
      &executor,
      "cp",
      "missing",
      Path::new("/tank/dest"),
      &Interrupt::none(),
    ))
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("same storage class"));
  }

  #[test]
  fn clone_unreadable_source_is_internal() {
    let pool = tempfile::tempdir().unwrap();
    let store = store_with_source(pool.path());
    let executor = FakeExecutor::new();

    let err = block_on(clone_from_volume(
      &store,
      &executor,
      "cp",
      "src",
      Path::new("/tank/dest"),
      &Interrupt::none(),
    ))
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(executor.get_log().is_empty());
  }
}
