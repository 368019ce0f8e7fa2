// streams/src/subscription.rs

//! The demand-driven delivery state machine.
//!
//! A [`PumpingSubscription`] is a thin handle over a [`Signaller`] whose target
//! is the subscription state: the subscriber, the element source and the
//! outstanding demand. `request` and `cancel` only enqueue signals, so every
//! state transition and every subscriber callback happens inside the
//! signaller's run loop, one at a time.
//!
//! Sending pulls at most `batch_size` elements per `Send` signal. When demand
//! is left after a full batch the subscription signals itself again, which
//! hands the runner back between batches. When demand runs out instead, one
//! element is pulled ahead and held, so an exhausted or failed source is
//! signalled without waiting for another request.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use flow_base::{panic_message, BoxError, ErrorSink, Runner, Signal, Signaller};

use crate::demand::Demand;
use crate::error::{StreamError, Violation};
use crate::protocol::{Subscriber, Subscription};
use crate::source::ElementSource;

#[derive(Debug)]
pub(crate) enum PumpSignal {
  Start,
  Request(i64),
  Send,
  Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum PumpKind {
  Start,
  Request,
  Send,
  Cancel,
}

impl Signal for PumpSignal {
  type Kind = PumpKind;
  const KINDS: &'static [PumpKind] = &[
    PumpKind::Start,
    PumpKind::Request,
    PumpKind::Send,
    PumpKind::Cancel,
  ];

  fn kind(&self) -> PumpKind {
    match self {
      PumpSignal::Start => PumpKind::Start,
      PumpSignal::Request(_) => PumpKind::Request,
      PumpSignal::Send => PumpKind::Send,
      PumpSignal::Cancel => PumpKind::Cancel,
    }
  }
}

type PumpSignaller<T> = Signaller<PumpState<T>, PumpSignal>;

/// Runs a subscriber callback, turning a panic into its message.
pub(crate) fn contain(f: impl FnOnce()) -> Result<(), String> {
  panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

/// Everything needed to start one subscription.
pub(crate) struct SubscriptionConfig<T> {
  pub(crate) publisher: String,
  pub(crate) id: u64,
  pub(crate) subscriber: Arc<dyn Subscriber<T>>,
  pub(crate) source: Box<dyn ElementSource<T>>,
  pub(crate) batch_size: usize,
  pub(crate) signals_per_run: usize,
  pub(crate) runner: Arc<dyn Runner>,
  pub(crate) sink: Arc<dyn ErrorSink>,
}

/// What one pull from the source produced.
enum Pulled<T> {
  Element(T),
  Exhausted,
  Failed(StreamError),
}

/// State owned by the run loop. Never touched from outside a handler.
struct PumpState<T> {
  publisher: String,
  subscriber: Option<Arc<dyn Subscriber<T>>>,
  source: Option<Box<dyn ElementSource<T>>>,
  lookahead: Option<T>,
  demand: Demand,
  batch_size: usize,
  started: bool,
  cancel_requested: Arc<AtomicBool>,
  sink: Arc<dyn ErrorSink>,
}

impl<T: Send + 'static> PumpState<T> {
  /// Moves to the terminal state and hands back the subscriber, if it was
  /// still attached, for one last callback.
  ///
  /// Dropping the subscriber here breaks the subscriber -> subscription ->
  /// state -> subscriber cycle.
  fn release(&mut self, signaller: &PumpSignaller<T>) -> Option<Arc<dyn Subscriber<T>>> {
    self.cancel_requested.store(true, Ordering::Release);
    signaller.cancel();
    self.source = None;
    self.lookahead = None;
    self.demand.clear();
    self.subscriber.take()
  }

  /// Takes the held element if there is one, otherwise pulls from the source.
  /// `None` once the source is gone.
  fn pull(&mut self) -> Option<Pulled<T>> {
    if let Some(element) = self.lookahead.take() {
      return Some(Pulled::Element(element));
    }
    let source = self.source.as_mut()?;
    let pulled = match panic::catch_unwind(AssertUnwindSafe(|| source.next_element())) {
      Ok(Ok(Some(element))) => Pulled::Element(element),
      Ok(Ok(None)) => Pulled::Exhausted,
      Ok(Err(error)) => Pulled::Failed(StreamError::Source(error)),
      Err(payload) => Pulled::Failed(StreamError::SourcePanicked(panic_message(payload.as_ref()))),
    };
    Some(pulled)
  }

  /// Ends the stream with `on_complete`, or with `on_error` when given one.
  fn end(
    &mut self,
    subscriber: &Arc<dyn Subscriber<T>>,
    signaller: &PumpSignaller<T>,
    error: Option<StreamError>,
  ) {
    self.release(signaller);
    match error {
      Some(error) => self.deliver_error(subscriber, error),
      None => self.deliver_complete(subscriber),
    }
  }

  fn report(&self, callback: &'static str, message: String) {
    let violation = Violation::new(&self.publisher, callback, message);
    self.sink.report(&violation);
  }

  fn deliver_error(&self, subscriber: &Arc<dyn Subscriber<T>>, error: StreamError) {
    tracing::debug!(publisher = %self.publisher, %error, "subscription failed");
    if let Err(message) = contain(|| subscriber.on_error(error)) {
      self.report("on_error", message);
    }
  }

  fn deliver_complete(&self, subscriber: &Arc<dyn Subscriber<T>>) {
    tracing::debug!(publisher = %self.publisher, "subscription completed");
    if let Err(message) = contain(|| subscriber.on_complete()) {
      self.report("on_complete", message);
    }
  }

  fn cancel_requested(&self) -> bool {
    self.cancel_requested.load(Ordering::Acquire)
  }
}

fn on_start<T: Send + 'static>(
  state: &mut PumpState<T>,
  _signal: PumpSignal,
  signaller: &PumpSignaller<T>,
) -> Result<(), BoxError> {
  if state.started {
    return Ok(());
  }
  state.started = true;

  if state.cancel_requested() {
    state.release(signaller);
    return Ok(());
  }
  let Some(subscriber) = state.subscriber.clone() else {
    return Ok(());
  };

  tracing::debug!(publisher = %state.publisher, signaller = signaller.name(), "subscription started");
  let subscription: Arc<dyn Subscription> = Arc::new(PumpingSubscription {
    signaller: signaller.clone(),
    cancel_requested: state.cancel_requested.clone(),
  });
  if let Err(message) = contain(|| subscriber.on_subscribe(subscription)) {
    state.release(signaller);
    state.report("on_subscribe", message.clone());
    state.deliver_error(&subscriber, StreamError::SubscriberPanicked { message });
  }
  Ok(())
}

fn on_request<T: Send + 'static>(
  state: &mut PumpState<T>,
  signal: PumpSignal,
  signaller: &PumpSignaller<T>,
) -> Result<(), BoxError> {
  let PumpSignal::Request(n) = signal else {
    return Ok(());
  };
  if state.cancel_requested() {
    state.release(signaller);
    return Ok(());
  }

  if n < 1 {
    if let Some(subscriber) = state.release(signaller) {
      state.deliver_error(&subscriber, StreamError::NonPositiveRequest { requested: n });
    }
    return Ok(());
  }

  let was_idle = state.demand.is_zero();
  state.demand.add(n as u64);
  tracing::trace!(publisher = %state.publisher, requested = n, demand = state.demand.get(), "demand added");

  // A non-zero demand already has a `Send` queued behind it.
  if was_idle {
    signaller.signal(PumpSignal::Send);
  }
  Ok(())
}

fn on_send<T: Send + 'static>(
  state: &mut PumpState<T>,
  _signal: PumpSignal,
  signaller: &PumpSignaller<T>,
) -> Result<(), BoxError> {
  let Some(subscriber) = state.subscriber.clone() else {
    return Ok(());
  };

  let mut sent = 0;
  while sent < state.batch_size && !state.demand.is_zero() {
    if state.cancel_requested() {
      state.release(signaller);
      return Ok(());
    }

    match state.pull() {
      None => return Ok(()),
      Some(Pulled::Element(element)) => {
        state.demand.take_one();
        sent += 1;
        if let Err(message) = contain(|| subscriber.on_next(element)) {
          state.release(signaller);
          state.report("on_next", message);
          return Ok(());
        }
      }
      Some(Pulled::Exhausted) => {
        state.end(&subscriber, signaller, None);
        return Ok(());
      }
      Some(Pulled::Failed(error)) => {
        state.end(&subscriber, signaller, Some(error));
        return Ok(());
      }
    }
  }

  tracing::trace!(publisher = %state.publisher, sent, demand = state.demand.get(), "batch sent");
  if state.cancel_requested() {
    state.release(signaller);
  } else if !state.demand.is_zero() {
    signaller.signal(PumpSignal::Send);
  } else {
    // Out of demand: hold the next element so a finished source ends the
    // stream now rather than on the next request.
    match state.pull() {
      None => {}
      Some(Pulled::Element(element)) => state.lookahead = Some(element),
      Some(Pulled::Exhausted) => state.end(&subscriber, signaller, None),
      Some(Pulled::Failed(error)) => state.end(&subscriber, signaller, Some(error)),
    }
  }
  Ok(())
}

fn on_cancel<T: Send + 'static>(
  state: &mut PumpState<T>,
  _signal: PumpSignal,
  signaller: &PumpSignaller<T>,
) -> Result<(), BoxError> {
  if state.release(signaller).is_some() {
    tracing::debug!(publisher = %state.publisher, signaller = signaller.name(), "subscription cancelled");
  }
  Ok(())
}

/// Handle to one subscription of a [`PumpingPublisher`](crate::PumpingPublisher).
///
/// Cheap to clone; every clone drives the same subscription.
pub struct PumpingSubscription<T> {
  signaller: PumpSignaller<T>,
  cancel_requested: Arc<AtomicBool>,
}

impl<T> Clone for PumpingSubscription<T> {
  fn clone(&self) -> Self {
    Self {
      signaller: self.signaller.clone(),
      cancel_requested: self.cancel_requested.clone(),
    }
  }
}

impl<T: Send + 'static> PumpingSubscription<T> {
  pub(crate) fn new(config: SubscriptionConfig<T>) -> Result<Self, flow_base::BuildError> {
    let cancel_requested = Arc::new(AtomicBool::new(false));
    let state = PumpState {
      publisher: config.publisher.clone(),
      subscriber: Some(config.subscriber),
      source: Some(config.source),
      lookahead: None,
      demand: Demand::new(),
      batch_size: config.batch_size,
      started: false,
      cancel_requested: cancel_requested.clone(),
      sink: config.sink.clone(),
    };

    let signaller = PumpSignaller::<T>::builder(state)
      .name(format!("{}/subscription-{}", config.publisher, config.id))
      .signals_per_run(config.signals_per_run)
      .shared_runner(config.runner)
      .shared_error_sink(config.sink)
      .on(PumpKind::Start, on_start::<T>)
      .on(PumpKind::Request, on_request::<T>)
      .on(PumpKind::Send, on_send::<T>)
      .on(PumpKind::Cancel, on_cancel::<T>)
      .build()?;

    Ok(Self {
      signaller,
      cancel_requested,
    })
  }

  /// Delivers `on_subscribe`. Called once the subscription is registered.
  pub(crate) fn start(&self) {
    self.signaller.signal(PumpSignal::Start);
  }

  /// Whether the subscription has ended, by cancellation or a terminal signal.
  pub fn is_cancelled(&self) -> bool {
    self.cancel_requested.load(Ordering::Acquire) || self.signaller.is_cancelled()
  }

  /// The name of the signaller driving this subscription.
  pub fn name(&self) -> &str {
    self.signaller.name()
  }
}

impl<T: Send + 'static> Subscription for PumpingSubscription<T> {
  fn request(&self, n: i64) {
    self.signaller.signal(PumpSignal::Request(n));
  }

  fn cancel(&self) {
    self.cancel_requested.store(true, Ordering::Release);
    self.signaller.signal(PumpSignal::Cancel);
  }
}

impl<T: Send + 'static> fmt::Debug for PumpingSubscription<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PumpingSubscription")
      .field("signaller", &self.signaller.name())
      .field("cancel_requested", &self.cancel_requested.load(Ordering::Relaxed))
      .finish()
  }
}
