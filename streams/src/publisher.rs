// streams/src/publisher.rs

use core::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use flow_base::{panic_message, ErrorSink, Runner, ThreadRunner, TracingSink, DEFAULT_SIGNALS_PER_RUN};
use parking_lot::Mutex;

use crate::error::{BuildError, StreamError, Violation};
use crate::protocol::{Publisher, Subscriber, Subscription};
use crate::source::ElementSource;
use crate::subscriber::NilSubscription;
use crate::subscription::{contain, PumpingSubscription, SubscriptionConfig};

/// How many elements one `Send` signal pulls before yielding the runner.
pub const DEFAULT_BATCH_SIZE: usize = 1024;

type SourceFactory<T> = Box<dyn Fn() -> Box<dyn ElementSource<T>> + Send + Sync + 'static>;

struct Registration<T> {
  subscriber: Weak<dyn Subscriber<T>>,
  subscription: PumpingSubscription<T>,
}

/// A publisher that pumps elements from a fresh [`ElementSource`] into each
/// subscriber, as fast as that subscriber's demand allows.
///
/// Dropping the publisher cancels every subscription it still has, which
/// releases their sources and subscribers.
pub struct PumpingPublisher<T: Send + 'static> {
  name: String,
  make_source: SourceFactory<T>,
  batch_size: usize,
  single_subscriber: bool,
  signals_per_run: usize,
  runner: Arc<dyn Runner>,
  sink: Arc<dyn ErrorSink>,
  registry: Mutex<Vec<Registration<T>>>,
  next_id: AtomicU64,
}

impl<T: Send + 'static> fmt::Debug for PumpingPublisher<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PumpingPublisher")
      .field("name", &self.name)
      .field("batch_size", &self.batch_size)
      .field("single_subscriber", &self.single_subscriber)
      .field("signals_per_run", &self.signals_per_run)
      .field("registered", &self.registry.lock().len())
      .finish_non_exhaustive()
  }
}

impl<T: Send + 'static> PumpingPublisher<T> {
  /// Starts configuring a publisher. `make_source` is called once per
  /// accepted subscriber; each subscription owns the source it gets.
  pub fn builder<F, S>(make_source: F) -> PumpingPublisherBuilder<T>
  where
    F: Fn() -> S + Send + Sync + 'static,
    S: ElementSource<T>,
  {
    PumpingPublisherBuilder::new(Box::new(move || Box::new(make_source()) as Box<dyn ElementSource<T>>))
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Number of registered subscriptions that have not ended yet.
  pub fn subscription_count(&self) -> usize {
    self
      .registry
      .lock()
      .iter()
      .filter(|registration| !registration.subscription.is_cancelled())
      .count()
  }

  /// Cancels every registered subscription. Subscribers get no further signals
  /// once their subscription observes the cancellation.
  pub fn cancel_all(&self) {
    let subscriptions: Vec<_> = self
      .registry
      .lock()
      .iter()
      .map(|registration| registration.subscription.clone())
      .collect();
    tracing::debug!(publisher = %self.name, count = subscriptions.len(), "cancelling all subscriptions");
    for subscription in subscriptions {
      subscription.cancel();
    }
  }

  fn new_source(&self) -> Result<Box<dyn ElementSource<T>>, StreamError> {
    panic::catch_unwind(AssertUnwindSafe(|| (self.make_source)()))
      .map_err(|payload| StreamError::SourcePanicked(panic_message(payload.as_ref())))
  }

  /// Delivers a rejection: a no-op subscription, then the error.
  fn reject(&self, subscriber: &Arc<dyn Subscriber<T>>, error: StreamError) {
    tracing::debug!(publisher = %self.name, %error, "subscription rejected");
    if let Err(message) = contain(|| subscriber.on_subscribe(Arc::new(NilSubscription))) {
      self.sink.report(&Violation::new(&self.name, "on_subscribe", message));
      return;
    }
    if let Err(message) = contain(|| subscriber.on_error(error)) {
      self.sink.report(&Violation::new(&self.name, "on_error", message));
    }
  }

  fn rejection(
    &self,
    registry: &[Registration<T>],
    subscriber: &Arc<dyn Subscriber<T>>,
  ) -> Option<StreamError> {
    let identity = Arc::as_ptr(subscriber) as *const ();
    if registry
      .iter()
      .any(|registration| registration.subscriber.as_ptr() as *const () == identity)
    {
      return Some(StreamError::DuplicateSubscriber);
    }
    if self.single_subscriber
      && registry
        .iter()
        .any(|registration| !registration.subscription.is_cancelled())
    {
      return Some(StreamError::SubscriberLimit);
    }
    None
  }
}

impl<T: Send + 'static> Publisher<T> for PumpingPublisher<T> {
  fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
    let mut registry = self.registry.lock();
    registry.retain(|registration| registration.subscriber.strong_count() > 0);
    if let Some(error) = self.rejection(&registry, &subscriber) {
      drop(registry);
      return self.reject(&subscriber, error);
    }

    // Opened under the lock so a concurrent subscriber cannot slip past the
    // single-subscriber check in the meantime.
    let source = match self.new_source() {
      Ok(source) => source,
      Err(error) => {
        drop(registry);
        return self.reject(&subscriber, error);
      }
    };

    let config = SubscriptionConfig {
      publisher: self.name.clone(),
      id: self.next_id.fetch_add(1, Ordering::Relaxed),
      subscriber: subscriber.clone(),
      source,
      batch_size: self.batch_size,
      signals_per_run: self.signals_per_run,
      runner: self.runner.clone(),
      sink: self.sink.clone(),
    };
    let subscription = match PumpingSubscription::new(config) {
      Ok(subscription) => subscription,
      Err(error) => {
        drop(registry);
        return self.reject(&subscriber, StreamError::Engine(error));
      }
    };

    registry.push(Registration {
      subscriber: Arc::downgrade(&subscriber),
      subscription: subscription.clone(),
    });
    drop(registry);

    tracing::debug!(publisher = %self.name, subscription = subscription.name(), "subscriber accepted");
    subscription.start();
  }
}

impl<T: Send + 'static> Drop for PumpingPublisher<T> {
  fn drop(&mut self) {
    if !self.registry.get_mut().is_empty() {
      self.cancel_all();
    }
  }
}

/// Configures and validates a [`PumpingPublisher`].
pub struct PumpingPublisherBuilder<T> {
  make_source: SourceFactory<T>,
  batch_size: usize,
  single_subscriber: bool,
  signals_per_run: usize,
  runner: Option<Arc<dyn Runner>>,
  sink: Option<Arc<dyn ErrorSink>>,
  name: Option<String>,
}

impl<T> fmt::Debug for PumpingPublisherBuilder<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PumpingPublisherBuilder")
      .field("name", &self.name)
      .field("batch_size", &self.batch_size)
      .field("single_subscriber", &self.single_subscriber)
      .field("signals_per_run", &self.signals_per_run)
      .field("has_runner", &self.runner.is_some())
      .field("has_sink", &self.sink.is_some())
      .finish_non_exhaustive()
  }
}

impl<T: Send + 'static> PumpingPublisherBuilder<T> {
  fn new(make_source: SourceFactory<T>) -> Self {
    Self {
      make_source,
      batch_size: DEFAULT_BATCH_SIZE,
      single_subscriber: true,
      signals_per_run: DEFAULT_SIGNALS_PER_RUN,
      runner: None,
      sink: None,
      name: None,
    }
  }

  /// Caps the elements pulled per `Send` signal. Defaults to
  /// [`DEFAULT_BATCH_SIZE`].
  pub fn batch_size(mut self, batch_size: usize) -> Self {
    self.batch_size = batch_size;
    self
  }

  /// When set (the default), a second subscriber is rejected while a
  /// subscription is still active.
  pub fn single_subscriber(mut self, single: bool) -> Self {
    self.single_subscriber = single;
    self
  }

  pub fn signals_per_run(mut self, n: usize) -> Self {
    self.signals_per_run = n;
    self
  }

  /// Sets the runner every subscription executes on. Defaults to
  /// [`ThreadRunner`].
  pub fn runner<R: Runner>(self, runner: R) -> Self {
    self.shared_runner(Arc::new(runner))
  }

  pub fn shared_runner(mut self, runner: Arc<dyn Runner>) -> Self {
    self.runner = Some(runner);
    self
  }

  /// Sets where violations and engine failures go. Defaults to [`TracingSink`].
  pub fn error_sink<E: ErrorSink>(self, sink: E) -> Self {
    self.shared_error_sink(Arc::new(sink))
  }

  pub fn shared_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
    self.sink = Some(sink);
    self
  }

  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn build(self) -> Result<PumpingPublisher<T>, BuildError> {
    if self.batch_size == 0 {
      return Err(BuildError::ZeroBatchSize);
    }
    if self.signals_per_run == 0 {
      return Err(BuildError::ZeroSignalsPerRun);
    }

    Ok(PumpingPublisher {
      name: self.name.unwrap_or_else(|| "pumping_publisher".to_string()),
      make_source: self.make_source,
      batch_size: self.batch_size,
      single_subscriber: self.single_subscriber,
      signals_per_run: self.signals_per_run,
      runner: self.runner.unwrap_or_else(|| Arc::new(ThreadRunner::new())),
      sink: self
        .sink
        .unwrap_or_else(|| Arc::new(TracingSink::with_label("flow_streams"))),
      registry: Mutex::new(Vec::new()),
      next_id: AtomicU64::new(0),
    })
  }
}
