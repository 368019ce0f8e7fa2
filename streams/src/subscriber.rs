// streams/src/subscriber.rs

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::error::StreamError;
use crate::protocol::{Subscriber, Subscription};

/// A subscription that ignores every call.
///
/// Rejected subscribers receive one in `on_subscribe` before their `on_error`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NilSubscription;

impl Subscription for NilSubscription {
  fn request(&self, _n: i64) {}
  fn cancel(&self) {}
}

/// A subscriber that never requests anything and ignores every signal.
pub struct NilSubscriber<T> {
  _marker: PhantomData<fn(T)>,
}

impl<T> NilSubscriber<T> {
  pub fn new() -> Self {
    Self {
      _marker: PhantomData,
    }
  }
}

impl<T> Default for NilSubscriber<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> fmt::Debug for NilSubscriber<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("NilSubscriber")
  }
}

impl<T> Subscriber<T> for NilSubscriber<T> {
  fn on_subscribe(&self, _subscription: Arc<dyn Subscription>) {}
  fn on_next(&self, _element: T) {}
  fn on_error(&self, _error: StreamError) {}
  fn on_complete(&self) {}
}

#[derive(Default)]
struct LoggingState {
  subscription: Option<Arc<dyn Subscription>>,
  started: Option<Instant>,
}

/// Logs every signal it receives at `INFO` and keeps the stream flowing.
///
/// Requests `first_request_size` elements on subscribe and
/// `later_requests_size` more after every element. On a terminal signal it
/// logs how long the subscription lasted.
pub struct LoggingSubscriber {
  name: String,
  log_on_next: bool,
  first_request_size: i64,
  later_requests_size: i64,
  state: Mutex<LoggingState>,
}

impl LoggingSubscriber {
  pub fn new() -> Self {
    Self {
      name: "logging_subscriber".to_string(),
      log_on_next: true,
      first_request_size: 2,
      later_requests_size: 1024,
      state: Mutex::new(LoggingState::default()),
    }
  }

  pub fn named(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  /// Whether each element is logged. On by default.
  pub fn log_on_next(mut self, enabled: bool) -> Self {
    self.log_on_next = enabled;
    self
  }

  pub fn first_request_size(mut self, n: i64) -> Self {
    self.first_request_size = n;
    self
  }

  pub fn later_requests_size(mut self, n: i64) -> Self {
    self.later_requests_size = n;
    self
  }

  fn subscription(&self) -> Option<Arc<dyn Subscription>> {
    self.state.lock().subscription.clone()
  }

  fn log_time_taken(&self) {
    let started = self.state.lock().started;
    if let Some(started) = started {
      tracing::info!(subscriber = %self.name, duration = ?started.elapsed(), "total duration");
    }
  }
}

impl Default for LoggingSubscriber {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for LoggingSubscriber {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("LoggingSubscriber")
      .field("name", &self.name)
      .field("log_on_next", &self.log_on_next)
      .field("first_request_size", &self.first_request_size)
      .field("later_requests_size", &self.later_requests_size)
      .finish_non_exhaustive()
  }
}

impl<T: fmt::Debug> Subscriber<T> for LoggingSubscriber {
  fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
    tracing::info!(subscriber = %self.name, "on_subscribe");
    {
      let mut state = self.state.lock();
      state.subscription = Some(subscription.clone());
      state.started = Some(Instant::now());
    }
    subscription.request(self.first_request_size);
  }

  fn on_next(&self, element: T) {
    if self.log_on_next {
      tracing::info!(subscriber = %self.name, ?element, "on_next");
    }
    if let Some(subscription) = self.subscription() {
      subscription.request(self.later_requests_size);
    }
  }

  fn on_error(&self, error: StreamError) {
    tracing::info!(subscriber = %self.name, %error, "on_error");
    tracing::error!(subscriber = %self.name, "{}", error);
    self.log_time_taken();
  }

  fn on_complete(&self) {
    tracing::info!(subscriber = %self.name, "on_complete");
    self.log_time_taken();
  }
}
