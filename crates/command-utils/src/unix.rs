use crate::{
  interrupt::Waited, runner, Command, ExecError, Executor, FutureResult, Interrupt, Output,
  Result,
};
use crossbeam::scope;
use duct::cmd;
use std::{io, process::ExitStatus};
use tracing::{debug, error, warn};

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsExecutor;

impl OsExecutor {
  #[inline]
  pub fn new() -> Self {
    OsExecutor
  }
}

impl Executor for OsExecutor {
  fn execute(&self, command: Command, interrupt: Interrupt) -> FutureResult<Output> {
    Box::pin(runner::run(move || run_command(&command, &interrupt)))
  }
}

fn run_command(command: &Command, interrupt: &Interrupt) -> Result<Output> {
  let shown = command.to_string();

  if interrupt.is_cancelled() {
    return Err(ExecError::Cancelled { command: shown });
  }

  if interrupt.is_expired() {
    return Err(ExecError::TimedOut {
      command: shown,
      timeout: interrupt.timeout_duration().unwrap_or_default(),
    });
  }

  debug!("Running cmd {}", shown);
  let handle = cmd(command.program(), command.args().to_vec())
    .stderr_to_stdout()
    .stdout_capture()
    .unchecked()
    .start()?;
  let handle = &handle;

  let waited = scope::<'_, _, Waited<io::Result<ExitStatus>>>(|s| {
    let (sender, receiver) = crossbeam::channel::bounded(1);

    s.spawn(move |_| {
      let result = handle.wait().map(|output| output.status);
      let _ = sender.send(result);
    });

    let waited = interrupt.wait_for(&receiver);
    if !matches!(waited, Waited::Completed(_)) {
      if let Err(e) = handle.kill() {
        warn!("Failed to kill interrupted cmd {}: {:?}", shown, e);
      }
    }

    waited
  })
  .map_err(|e| {
    ExecError::Spawn(io::Error::new(
      io::ErrorKind::Other,
      format!("Failed to spawn threads: {:?}", e),
    ))
  })?;

  match waited {
    Waited::Completed(Some(Ok(_))) => (),
    Waited::Completed(Some(Err(e))) => return Err(e.into()),
    Waited::Completed(None) => {
      return Err(ExecError::Spawn(io::Error::new(
        io::ErrorKind::Other,
        "wait thread exited without a result",
      )))
    }
    Waited::Cancelled => {
      warn!("Cmd {} cancelled by caller", shown);
      return Err(ExecError::Cancelled { command: shown });
    }
    Waited::TimedOut(timeout) => {
      warn!("Cmd {} exceeded deadline of {:?}", shown, timeout);
      return Err(ExecError::TimedOut {
        command: shown,
        timeout,
      });
    }
  }

  let output = handle.wait()?;
  if output.status.success() {
    Ok(Output::new(output.stdout.clone()))
  } else {
    let combined = String::from_utf8_lossy(&output.stdout).into_owned();
    error!("Cmd {} failed with {}: {}", shown, output.status, combined);
    Err(ExecError::Failed {
      command: shown,
      status: output.status.to_string(),
      output: combined,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use futures::executor::block_on;
  use std::time::Duration;

  fn sh(script: &str) -> Command {
    Command::new("sh", vec!["-c", script])
  }

  #[test]
  fn captures_combined_output() {
    let output = block_on(OsExecutor.execute(sh("echo out; echo err >&2"), Interrupt::none()))
      .unwrap();
    let text = output.to_string_lossy();

    assert!(text.contains("out"));
    assert!(text.contains("err"));
  }

  #[test]
  fn non_zero_exit_embeds_output() {
    let err = block_on(OsExecutor.execute(
      sh("echo dataset already exists >&2; exit 3"),
      Interrupt::none(),
    ))
    .unwrap_err();

    match &err {
      ExecError::Failed { output, .. } => assert!(output.contains("dataset already exists")),
      other => panic!("unexpected error: {:?}", other),
    }
  }

  #[test]
  fn missing_program_is_spawn_error() {
    let err = block_on(OsExecutor.execute(
      Command::new("csi-command-utils-does-not-exist", Vec::<String>::new()),
      Interrupt::none(),
    ))
    .unwrap_err();

    assert!(matches!(err, ExecError::Spawn(_)));
  }

  #[test]
  fn deadline_kills_child() {
    let err = block_on(OsExecutor.execute(
      Command::new("sleep", vec!["30"]),
      Interrupt::timeout(Duration::from_millis(100)),
    ))
    .unwrap_err();

    assert!(err.is_timed_out());
  }

  #[test]
  fn cancelled_before_start_does_not_spawn() {
    let (canceller, interrupt) = Interrupt::cancellable();
    canceller.cancel();

    let err = block_on(OsExecutor.execute(Command::new("sleep", vec!["30"]), interrupt)).unwrap_err();
    assert!(err.is_cancelled());
  }

  #[test]
  fn cancel_kills_running_child() {
    let (canceller, interrupt) = Interrupt::cancellable();
    let pending = OsExecutor.execute(Command::new("sleep", vec!["30"]), interrupt);

    std::thread::spawn(move || {
      std::thread::sleep(Duration::from_millis(100));
      canceller.cancel();
    });

    let err = block_on(pending).unwrap_err();
    assert!(err.is_cancelled());
  }
}
