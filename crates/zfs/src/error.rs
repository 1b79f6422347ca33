use crate::store::StoreError;
use csi_command_utils::ExecError;
use std::result;
use thiserror::Error;
use tonic::{Code, Status};

pub type Result<T> = result::Result<T, VolumeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  NotFound,
  Unready,
  Internal,
  AlreadyExists,
  Conflict,
  InvalidArgument,
  Cancelled,
  DeadlineExceeded,
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum VolumeError {
  #[error("Could not find volume: {0}")]
  VolumeNotFound(String),

  #[error("cannot find snapshot {0}")]
  SnapshotNotFound(String),

  /// The clone source is not registered. Usually the source and the
  /// destination belong to different storage classes.
  #[error("source volume {0} does not exist, are source/destination in the same storage class?")]
  SourceNotFound(String),

  #[error("snapshot {0} is not yet ready to use")]
  SnapshotUnready(String),

  #[error("volume {name} already exists with different parameters")]
  AlreadyExists { name: String },

  #[error("volume {name} was modified concurrently")]
  Conflict { name: String },

  #[error("{0}")]
  InvalidArgument(String),

  /// A backend, archive or copy command failed. `output` is the verbatim
  /// combined output of the process, when it ran at all.
  #[error("{context}: {source}")]
  Command {
    context: String,
    #[source]
    source: ExecError,
  },

  #[error("{context}: {source}")]
  Store {
    context: String,
    #[source]
    source: StoreError,
  },

  #[error("{0}")]
  Internal(String),
}

impl VolumeError {
  pub(crate) fn command(context: impl Into<String>, source: ExecError) -> Self {
    VolumeError::Command {
      context: context.into(),
      source,
    }
  }

  pub(crate) fn store(context: impl Into<String>, source: StoreError) -> Self {
    VolumeError::Store {
      context: context.into(),
      source,
    }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      VolumeError::VolumeNotFound(_)
      | VolumeError::SnapshotNotFound(_)
      | VolumeError::SourceNotFound(_) => ErrorKind::NotFound,
      VolumeError::SnapshotUnready(_) => ErrorKind::Unready,
      VolumeError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
      VolumeError::Conflict { .. } => ErrorKind::Conflict,
      VolumeError::InvalidArgument(_) => ErrorKind::InvalidArgument,
      VolumeError::Command { source, .. } => match source {
        ExecError::Cancelled { .. } => ErrorKind::Cancelled,
        ExecError::TimedOut { .. } => ErrorKind::DeadlineExceeded,
        _ => ErrorKind::Internal,
      },
      VolumeError::Store { source, .. } => match source {
        StoreError::NotFound(_) => ErrorKind::NotFound,
        StoreError::AlreadyExists(_) => ErrorKind::AlreadyExists,
        StoreError::Conflict { .. } => ErrorKind::Conflict,
        _ => ErrorKind::Internal,
      },
      VolumeError::Internal(_) => ErrorKind::Internal,
    }
  }

  /// Raw diagnostic output of the failed command, if any.
  pub fn command_output(&self) -> Option<&str> {
    match self {
      VolumeError::Command { source, .. } => source.output(),
      _ => None,
    }
  }

  #[inline]
  pub fn is_not_found(&self) -> bool {
    self.kind() == ErrorKind::NotFound
  }
}

impl From<VolumeError> for Status {
  fn from(value: VolumeError) -> Self {
    let code = match value.kind() {
      ErrorKind::NotFound => Code::NotFound,
      // Reported as internal to callers, like a failed command.
      ErrorKind::Unready => Code::Internal,
      ErrorKind::Internal => Code::Internal,
      ErrorKind::AlreadyExists => Code::AlreadyExists,
      ErrorKind::Conflict => Code::Aborted,
      ErrorKind::InvalidArgument => Code::InvalidArgument,
      ErrorKind::Cancelled => Code::Cancelled,
      ErrorKind::DeadlineExceeded => Code::DeadlineExceeded,
    };

    Status::new(code, value.to_string())
  }
}
