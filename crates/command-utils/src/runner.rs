use crate::{ExecError, Result};
use futures::channel::oneshot::{channel as oneshot, Receiver};
use std::{
  future::Future,
  io,
  panic::{catch_unwind, AssertUnwindSafe},
};
use tracing::{error, Span};

// Note: every call gets its own helper thread. Backend commands and tree
// copies can take minutes, so they must not block async processing nor
// queue behind each other.
pub(crate) fn run<R, F>(f: F) -> impl Future<Output = Result<R>>
where
  F: FnOnce() -> Result<R> + Send + 'static,
  R: Send + 'static,
{
  let span = Span::current();
  let (sender, receiver) = oneshot();

  let spawned = std::thread::Builder::new()
    .name("command-utils:exec".into())
    .spawn(move || {
      let result = catch_unwind(AssertUnwindSafe(|| {
        let _enter = span.enter();
        f()
      }));

      let result = match result {
        Ok(r) => r,
        Err(e) => {
          error!("Failed to run command function on helper thread: {:?}", e);
          Err(ExecError::Spawn(io::Error::new(
            io::ErrorKind::Other,
            "command function panicked",
          )))
        }
      };

      let _ = sender.send(result);
    });

  let early = spawned.err().map(ExecError::Spawn);
  read(receiver, early)
}

async fn read<R>(receiver: Receiver<Result<R>>, early: Option<ExecError>) -> Result<R> {
  if let Some(e) = early {
    return Err(e);
  }

  match receiver.await {
    Ok(r) => r,
    Err(_) => Err(ExecError::Spawn(io::Error::new(
      io::ErrorKind::Other,
      "request was cancelled (thread paniced?)",
    ))),
  }
}
