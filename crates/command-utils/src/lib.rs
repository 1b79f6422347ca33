cfg_if::cfg_if! {
  if #[cfg(unix)] {
    mod unix;
    pub use unix::OsExecutor;
  } else {
    compile_error!("Only cfg(unix) is supported at this time")
  }
}

mod fake;
mod interrupt;
mod runner;

pub use fake::{FakeExecutor, FakeInvocation};
pub use interrupt::{Canceller, Interrupt};

use futures::future::BoxFuture;
use smallvec::SmallVec;
use static_assertions::assert_impl_all;
use std::{fmt, io, result, sync::Arc, time::Duration};
use thiserror::Error;

pub type Result<T> = result::Result<T, ExecError>;
pub type FutureResult<T> = BoxFuture<'static, Result<T>>;

/// Argument vector of a single command invocation.
pub type Args = SmallVec<[String; 8]>;

/// A program together with the arguments it is invoked with.
#[derive(Clone, PartialEq, Eq)]
pub struct Command {
  program: String,
  args: Args,
}

impl Command {
  pub fn new<I>(program: impl Into<String>, args: I) -> Self
  where
    I: IntoIterator,
    <I as IntoIterator>::Item: Into<String>,
  {
    Command {
      program: program.into(),
      args: args.into_iter().map(Into::into).collect(),
    }
  }

  #[inline]
  pub fn program(&self) -> &str {
    &self.program
  }

  #[inline]
  pub fn args(&self) -> &[String] {
    &self.args
  }
}

impl fmt::Display for Command {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.program)?;
    for arg in &self.args {
      write!(f, " {}", arg)?;
    }

    Ok(())
  }
}

impl fmt::Debug for Command {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Command")
      .field("program", &self.program)
      .field("args", &format!("length={}", self.args.len()))
      .finish()
  }
}

/// Result of a command which ran to completion with a zero exit status.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Output {
  combined: Vec<u8>,
}

impl Output {
  pub fn new(combined: impl Into<Vec<u8>>) -> Self {
    Output {
      combined: combined.into(),
    }
  }

  /// Standard output and standard error, interleaved as the process wrote them.
  #[inline]
  pub fn combined(&self) -> &[u8] {
    &self.combined
  }

  pub fn to_string_lossy(&self) -> String {
    String::from_utf8_lossy(&self.combined).into_owned()
  }
}

#[derive(Debug, Error)]
pub enum ExecError {
  #[error("{command} failed with {status}: {output}")]
  Failed {
    command: String,
    status: String,
    output: String,
  },
  #[error("{command} was cancelled")]
  Cancelled { command: String },
  #[error("{command} did not finish within {timeout:?}")]
  TimedOut { command: String, timeout: Duration },
  #[error("Failed to run command: {0}")]
  Spawn(
    #[from]
    #[source]
    io::Error,
  ),
}

impl ExecError {
  /// The captured combined output of a command that exited unsuccessfully.
  pub fn output(&self) -> Option<&str> {
    match self {
      ExecError::Failed { output, .. } => Some(output),
      _ => None,
    }
  }

  #[inline]
  pub fn is_cancelled(&self) -> bool {
    matches!(self, ExecError::Cancelled { .. })
  }

  #[inline]
  pub fn is_timed_out(&self) -> bool {
    matches!(self, ExecError::TimedOut { .. })
  }
}

/// Runs external commands on behalf of the volume engine.
pub trait Executor: Send + Sync + 'static {
  /// Run `command` to completion, capturing standard output and standard
  /// error into a single buffer. A non-zero exit is reported as
  /// [ExecError::Failed] with the captured output. The child is killed if
  /// `interrupt` fires before it exits.
  fn execute(&self, command: Command, interrupt: Interrupt) -> FutureResult<Output>;
}

impl<T: Executor> Executor for Arc<T> {
  #[inline]
  fn execute(&self, command: Command, interrupt: Interrupt) -> FutureResult<Output> {
    (**self).execute(command, interrupt)
  }
}

assert_impl_all!(OsExecutor: Executor);
assert_impl_all!(FakeExecutor: Executor);
assert_impl_all!(Interrupt: Send, Sync, Clone);

/// Run a blocking closure on a helper thread, keeping the current span.
pub fn blocking<R, F>(f: F) -> FutureResult<R>
where
  F: FnOnce() -> Result<R> + Send + 'static,
  R: Send + 'static,
{
  Box::pin(runner::run(f))
}
