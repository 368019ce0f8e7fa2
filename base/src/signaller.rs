// base/src/signaller.rs

//! The signal-processing engine.
//!
//! A [`Signaller`] owns a target value and a fixed table of handlers, one per
//! signal kind. [`Signaller::signal`] enqueues a signal and tries to start the
//! run loop on the configured [`Runner`]; the loop pops at most
//! `signals_per_run` signals, hands each to its handler together with
//! `&mut target`, and then gives the runner back.
//!
//! Only one run is ever active. The `running` flag is taken with a CAS before
//! a run is submitted and cleared when it ends, so everything a handler does
//! to the target happens-before the next run observes it, whichever thread
//! that run lands on. After clearing the flag the loop re-checks the queue:
//! a signal pushed after the last pop but before the clear would otherwise
//! find the flag still held and never get a run of its own.
//!
//! Failures never travel back to the code that called `signal`. A handler
//! that returns an error or panics, and a runner that refuses work, cancel the
//! signaller and are reported to its [`ErrorSink`].

use core::fmt;
use std::any::type_name;
use std::cell::UnsafeCell;
use std::collections::HashMap;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{panic_message, BoxError, BuildError, Error};
use crate::flag::AtomicFlag;
use crate::queue::SignalQueue;
use crate::runner::{Runner, ThreadRunner};
use crate::sink::{ErrorSink, TracingSink};
use crate::stats::{SignallerStats, Stats};

/// How many signals one run processes before handing the runner back.
pub const DEFAULT_SIGNALS_PER_RUN: usize = 2;

/// A queued unit of work: a kind drawn from a closed set, plus its arguments.
///
/// Implemented by an enum whose variants carry their arguments, with a
/// field-less `Kind` enum mirroring the variants.
pub trait Signal: Send + 'static {
  type Kind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

  /// Every kind a value of this type can report. Each needs a handler.
  const KINDS: &'static [Self::Kind];

  fn kind(&self) -> Self::Kind;
}

type Handler<T, S> =
  Box<dyn Fn(&mut T, S, &Signaller<T, S>) -> Result<(), BoxError> + Send + Sync + 'static>;

struct Shared<T, S: Signal> {
  name: String,
  target: UnsafeCell<T>,
  handlers: HashMap<S::Kind, Handler<T, S>>,
  running: AtomicFlag,
  cancelled: AtomicFlag,
  pending: SignalQueue<S>,
  signals_per_run: usize,
  runner: Arc<dyn Runner>,
  sink: Arc<dyn ErrorSink>,
  stats: Stats,
}

// SAFETY: `target` is only dereferenced inside `run`, and `running` admits a
// single run at a time with a happens-before edge from one run to the next.
unsafe impl<T: Send, S: Signal> Sync for Shared<T, S> {}

/// Handle to a signal-processing engine. Clones share the same engine.
pub struct Signaller<T, S: Signal> {
  shared: Arc<Shared<T, S>>,
}

impl<T, S: Signal> Clone for Signaller<T, S> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<T, S: Signal> fmt::Debug for Signaller<T, S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Signaller")
      .field("name", &self.shared.name)
      .field("running", &self.shared.running.is_set())
      .field("cancelled", &self.shared.cancelled.is_set())
      .field("pending", &self.shared.pending.len())
      .field("signals_per_run", &self.shared.signals_per_run)
      .finish_non_exhaustive()
  }
}

impl<T: Send + 'static, S: Signal> Signaller<T, S> {
  /// Starts configuring a signaller that owns `target`.
  pub fn builder(target: T) -> SignallerBuilder<T, S> {
    SignallerBuilder::new(target)
  }

  /// Enqueues `signal` and makes sure a run will pick it up.
  ///
  /// Never blocks beyond the enqueue and never fails; a signal sent after
  /// [`cancel`](Self::cancel) is dequeued and dropped without a handler.
  pub fn signal(&self, signal: S) {
    self.shared.pending.push(signal);
    self.try_schedule();
  }

  /// Stops handler invocation for good. Idempotent.
  ///
  /// Signals still queued keep draining but are discarded. A handler that is
  /// already executing is not interrupted.
  pub fn cancel(&self) {
    if self.shared.cancelled.make_true() {
      tracing::debug!(signaller = %self.shared.name, "signaller cancelled");
    }
  }

  pub fn is_cancelled(&self) -> bool {
    self.shared.cancelled.is_set()
  }

  /// Whether a run is scheduled or executing right now.
  pub fn is_running(&self) -> bool {
    self.shared.running.is_set()
  }

  /// Number of queued signals not yet taken by a run.
  pub fn pending(&self) -> usize {
    self.shared.pending.len()
  }

  pub fn name(&self) -> &str {
    &self.shared.name
  }

  pub fn stats(&self) -> SignallerStats {
    self.shared.stats.snapshot()
  }

  fn try_schedule(&self) {
    if !self.shared.running.make_true() {
      return;
    }

    let this = self.clone();
    if let Err(source) = self.shared.runner.submit(Box::new(move || this.run())) {
      // `running` stays set: a cancelled signaller has nothing left to run.
      tracing::debug!(signaller = %self.shared.name, "runner refused a run");
      self.terminate(Error::Schedule {
        signaller: self.shared.name.clone(),
        source,
      });
    }
  }

  fn run(&self) {
    let shared = &*self.shared;
    Stats::bump(&shared.stats.runs);
    tracing::trace!(signaller = %shared.name, pending = shared.pending.len(), "run started");

    for _ in 0..shared.signals_per_run {
      // SAFETY: this run holds `running`, so it is the only consumer.
      let Some(signal) = (unsafe { shared.pending.try_pop() }) else {
        break;
      };

      if shared.cancelled.is_set() {
        Stats::bump(&shared.stats.discarded);
        tracing::trace!(signaller = %shared.name, kind = ?signal.kind(), "discarding signal");
        continue;
      }

      Stats::bump(&shared.stats.processed);
      if let Err(error) = self.dispatch(signal) {
        self.terminate(error);
        break;
      }
    }

    shared.running.clear();
    if !shared.pending.is_empty() {
      self.try_schedule();
    }
  }

  fn dispatch(&self, signal: S) -> Result<(), Error> {
    let kind = signal.kind();
    let Some(handler) = self.shared.handlers.get(&kind) else {
      return Err(Error::UnrecognizedSignal {
        signaller: self.shared.name.clone(),
        kind: format!("{:?}", kind),
      });
    };

    // SAFETY: see `Shared`; nothing outside `run` reaches the target.
    let target = unsafe { &mut *self.shared.target.get() };
    match panic::catch_unwind(AssertUnwindSafe(|| handler(target, signal, self))) {
      Ok(Ok(())) => Ok(()),
      Ok(Err(source)) => Err(Error::Callback {
        kind: format!("{:?}", kind),
        source,
      }),
      Err(payload) => Err(Error::CallbackPanicked {
        kind: format!("{:?}", kind),
        message: panic_message(payload.as_ref()),
      }),
    }
  }

  fn terminate(&self, error: Error) {
    self.cancel();
    self.shared.sink.report(&error);
  }
}

/// Configures and validates a [`Signaller`].
pub struct SignallerBuilder<T, S: Signal> {
  target: T,
  handlers: HashMap<S::Kind, Handler<T, S>>,
  duplicate: Option<S::Kind>,
  signals_per_run: usize,
  runner: Option<Arc<dyn Runner>>,
  sink: Option<Arc<dyn ErrorSink>>,
  name: Option<String>,
}

impl<T, S: Signal> fmt::Debug for SignallerBuilder<T, S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SignallerBuilder")
      .field("name", &self.name)
      .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
      .field("signals_per_run", &self.signals_per_run)
      .field("has_runner", &self.runner.is_some())
      .field("has_sink", &self.sink.is_some())
      .finish_non_exhaustive()
  }
}

impl<T: Send + 'static, S: Signal> SignallerBuilder<T, S> {
  fn new(target: T) -> Self {
    Self {
      target,
      handlers: HashMap::new(),
      duplicate: None,
      signals_per_run: DEFAULT_SIGNALS_PER_RUN,
      runner: None,
      sink: None,
      name: None,
    }
  }

  /// Registers the handler for one signal kind.
  pub fn on<F>(mut self, kind: S::Kind, handler: F) -> Self
  where
    F: Fn(&mut T, S, &Signaller<T, S>) -> Result<(), BoxError> + Send + Sync + 'static,
  {
    if self.handlers.insert(kind, Box::new(handler)).is_some() && self.duplicate.is_none() {
      self.duplicate = Some(kind);
    }
    self
  }

  /// Caps how many signals a single run processes. Defaults to
  /// [`DEFAULT_SIGNALS_PER_RUN`].
  pub fn signals_per_run(mut self, n: usize) -> Self {
    self.signals_per_run = n;
    self
  }

  /// Sets the runner. Defaults to [`ThreadRunner`].
  pub fn runner<R: Runner>(self, runner: R) -> Self {
    self.shared_runner(Arc::new(runner))
  }

  pub fn shared_runner(mut self, runner: Arc<dyn Runner>) -> Self {
    self.runner = Some(runner);
    self
  }

  /// Sets where failures are reported. Defaults to [`TracingSink`].
  pub fn error_sink<E: ErrorSink>(self, sink: E) -> Self {
    self.shared_error_sink(Arc::new(sink))
  }

  pub fn shared_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
    self.sink = Some(sink);
    self
  }

  /// Names the signaller in logs and error reports.
  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn build(self) -> Result<Signaller<T, S>, BuildError> {
    if self.signals_per_run == 0 {
      return Err(BuildError::ZeroSignalsPerRun);
    }
    if let Some(kind) = self.duplicate {
      return Err(BuildError::DuplicateHandler(format!("{:?}", kind)));
    }
    if let Some(kind) = S::KINDS.iter().find(|kind| !self.handlers.contains_key(*kind)) {
      return Err(BuildError::MissingHandler(format!("{:?}", kind)));
    }

    let shared = Shared {
      name: self.name.unwrap_or_else(|| type_name::<S>().to_string()),
      target: UnsafeCell::new(self.target),
      handlers: self.handlers,
      running: AtomicFlag::new(),
      cancelled: AtomicFlag::new(),
      pending: SignalQueue::new(),
      signals_per_run: self.signals_per_run,
      runner: self.runner.unwrap_or_else(|| Arc::new(ThreadRunner::new())),
      sink: self.sink.unwrap_or_else(|| Arc::new(TracingSink::new())),
      stats: Stats::default(),
    };

    Ok(Signaller {
      shared: Arc::new(shared),
    })
  }
}
