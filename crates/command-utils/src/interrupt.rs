use crossbeam::{
  channel::{self, Receiver, Sender, TryRecvError},
  select,
};
use std::{
  fmt,
  time::{Duration, Instant},
};

/// Signals that an in-flight request was abandoned by its caller, either
/// explicitly or because its deadline passed.
///
/// Cancellation is carried by a channel that is never written to: dropping
/// the [Canceller] disconnects it, which wakes every clone of the interrupt
/// at once.
#[derive(Clone, Default)]
pub struct Interrupt {
  deadline: Option<(Instant, Duration)>,
  cancelled: Option<Receiver<()>>,
}

/// Handle that cancels its paired [Interrupt]. Dropping it also cancels.
pub struct Canceller(Sender<()>);

impl Canceller {
  #[inline]
  pub fn cancel(self) {
    drop(self)
  }
}

impl fmt::Debug for Canceller {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Canceller")
  }
}

pub(crate) enum Waited<T> {
  Completed(Option<T>),
  Cancelled,
  TimedOut(Duration),
}

impl Interrupt {
  /// An interrupt that never fires.
  #[inline]
  pub fn none() -> Self {
    Interrupt::default()
  }

  pub fn timeout(timeout: Duration) -> Self {
    Interrupt::none().with_timeout(timeout)
  }

  pub fn cancellable() -> (Canceller, Self) {
    let (sender, receiver) = channel::bounded(0);
    let interrupt = Interrupt {
      deadline: None,
      cancelled: Some(receiver),
    };

    (Canceller(sender), interrupt)
  }

  /// Adds a deadline `timeout` from now. An earlier existing deadline wins.
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    let at = Instant::now() + timeout;
    self.deadline = match self.deadline {
      Some((existing, d)) if existing <= at => Some((existing, d)),
      _ => Some((at, timeout)),
    };
    self
  }

  #[inline]
  pub fn timeout_duration(&self) -> Option<Duration> {
    self.deadline.map(|(_, d)| d)
  }

  pub fn is_cancelled(&self) -> bool {
    match &self.cancelled {
      None => false,
      Some(receiver) => matches!(receiver.try_recv(), Err(TryRecvError::Disconnected)),
    }
  }

  pub fn is_expired(&self) -> bool {
    match self.deadline {
      None => false,
      Some((at, _)) => Instant::now() >= at,
    }
  }

  #[inline]
  pub fn is_interrupted(&self) -> bool {
    self.is_cancelled() || self.is_expired()
  }

  /// Block until `receiver` yields a value or this interrupt fires.
  pub(crate) fn wait_for<T>(&self, receiver: &Receiver<T>) -> Waited<T> {
    let never_cancelled = channel::never::<()>();
    let cancelled = self.cancelled.as_ref().unwrap_or(&never_cancelled);
    let (timer, timeout) = match self.deadline {
      Some((at, d)) => (channel::at(at), d),
      None => (channel::never(), Duration::default()),
    };

    select! {
      recv(receiver) -> msg => Waited::Completed(msg.ok()),
      recv(cancelled) -> _ => Waited::Cancelled,
      recv(timer) -> _ => Waited::TimedOut(timeout),
    }
  }
}

impl fmt::Debug for Interrupt {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Interrupt")
      .field("timeout", &self.timeout_duration())
      .field("cancellable", &self.cancelled.is_some())
      .finish()
  }
}
