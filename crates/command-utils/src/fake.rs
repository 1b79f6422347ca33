use crate::{Command, ExecError, Executor, FutureResult, Interrupt, Output, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;

/// A command seen by a [FakeExecutor].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeInvocation {
  pub program: String,
  pub args: Vec<String>,
}

enum FakeOutcome {
  Succeed(Vec<u8>),
  Fail { status: String, output: Vec<u8> },
  Interrupted,
}

struct FakeResponse {
  program: String,
  verb: Option<String>,
  outcome: FakeOutcome,
}

#[derive(Default)]
struct FakeExecutorInner {
  log: Vec<FakeInvocation>,
  responses: Vec<FakeResponse>,
}

/// Executor which records invocations instead of running them. Every
/// command succeeds with empty output unless a scripted response matches.
///
/// An interrupt that already fired when a command is submitted is honoured
/// the way [OsExecutor](crate::OsExecutor) does it: nothing is recorded and
/// the call fails with [ExecError::Cancelled] or [ExecError::TimedOut].
#[derive(Clone, Default)]
pub struct FakeExecutor(Arc<Mutex<FakeExecutorInner>>);

impl FakeExecutor {
  pub fn new() -> Self {
    Self::default()
  }

  fn inner(&self) -> MutexGuard<'_, FakeExecutorInner> {
    self.0.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn script(&self, program: &str, verb: Option<&str>, outcome: FakeOutcome) {
    self.inner().responses.push(FakeResponse {
      program: program.to_owned(),
      verb: verb.map(ToOwned::to_owned),
      outcome,
    });
  }

  /// Make every invocation of `program` whose first argument is `verb`
  /// (or any invocation, when `verb` is `None`) exit non-zero with `output`.
  pub fn fail(&self, program: &str, verb: Option<&str>, output: impl Into<Vec<u8>>) {
    self.script(
      program,
      verb,
      FakeOutcome::Fail {
        status: "exit status: 1".to_owned(),
        output: output.into(),
      },
    );
  }

  /// Make matching invocations succeed with `output`.
  pub fn succeed(&self, program: &str, verb: Option<&str>, output: impl Into<Vec<u8>>) {
    self.script(program, verb, FakeOutcome::Succeed(output.into()));
  }

  /// Make matching invocations get killed by their caller after they
  /// started. The invocation is recorded, then reported as cancelled.
  pub fn interrupt(&self, program: &str, verb: Option<&str>) {
    self.script(program, verb, FakeOutcome::Interrupted);
  }

  pub fn reset_log(&self) {
    self.inner().log.clear();
  }

  pub fn get_log(&self) -> Vec<FakeInvocation> {
    self.inner().log.clone()
  }

  /// Invocations of `program` only.
  pub fn invocations_of(&self, program: &str) -> Vec<FakeInvocation> {
    self
      .inner()
      .log
      .iter()
      .filter(|i| i.program == program)
      .cloned()
      .collect()
  }

  fn respond(&self, command: &Command, interrupt: &Interrupt) -> Result<Output> {
    if interrupt.is_cancelled() {
      return Err(ExecError::Cancelled {
        command: command.to_string(),
      });
    }

    if interrupt.is_expired() {
      return Err(ExecError::TimedOut {
        command: command.to_string(),
        timeout: interrupt.timeout_duration().unwrap_or_default(),
      });
    }

    let mut inner = self.inner();
    inner.log.push(FakeInvocation {
      program: command.program().to_owned(),
      args: command.args().to_vec(),
    });
    info!("Fake executor: ran {}", command);

    // Later scripts take precedence.
    let response = inner.responses.iter().rev().find(|r| {
      r.program == command.program()
        && r
          .verb
          .as_deref()
          .map_or(true, |verb| command.args().first().map(String::as_str) == Some(verb))
    });

    match response.map(|r| &r.outcome) {
      None => Ok(Output::default()),
      Some(FakeOutcome::Succeed(out)) => Ok(Output::new(out.clone())),
      Some(FakeOutcome::Fail { status, output }) => Err(ExecError::Failed {
        command: command.to_string(),
        status: status.clone(),
        output: String::from_utf8_lossy(output).into_owned(),
      }),
      Some(FakeOutcome::Interrupted) => Err(ExecError::Cancelled {
        command: command.to_string(),
      }),
    }
  }
}

impl Executor for FakeExecutor {
  fn execute(&self, command: Command, interrupt: Interrupt) -> FutureResult<Output> {
    let result = self.respond(&command, &interrupt);
    Box::pin(futures::future::ready(result))
  }
}
