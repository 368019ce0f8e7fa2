#![allow(dead_code)]

use std::error::Error as StdError;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use flow_streams::{ErrorSink, StreamError, Subscriber, Subscription};
use parking_lot::Mutex;

pub const SHORT_TIMEOUT: Duration = Duration::from_millis(300);
pub const LONG_TIMEOUT: Duration = Duration::from_secs(5);
pub const ITEMS_LOW: usize = 50;
pub const ITEMS_HIGH: usize = 5000;

/// Routes library logs to the test output. Filter with `RUST_LOG`.
pub fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
  let deadline = Instant::now() + timeout;
  loop {
    if condition() {
      return true;
    }
    if Instant::now() >= deadline {
      return false;
    }
    thread::sleep(Duration::from_millis(5));
  }
}

/// Keeps every reported error as its display string.
#[derive(Default)]
pub struct CollectingSink {
  reports: Mutex<Vec<String>>,
}

impl CollectingSink {
  pub fn reports(&self) -> Vec<String> {
    self.reports.lock().clone()
  }
}

impl ErrorSink for CollectingSink {
  fn report(&self, error: &(dyn StdError + 'static)) {
    self.reports.lock().push(error.to_string());
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<T> {
  Subscribe,
  Next(T),
  Error(String),
  Complete,
}

/// A subscriber that records what it receives and follows a small script.
pub struct Recorder<T> {
  events: Mutex<Vec<Event<T>>>,
  subscription: Mutex<Option<Arc<dyn Subscription>>>,
  on_subscribe_requests: Vec<i64>,
  request_per_next: Option<i64>,
  cancel_after: Option<usize>,
  panic_on_next: Option<usize>,
  panic_on_subscribe: bool,
  panic_on_complete: bool,
  panic_on_error: bool,
}

impl<T: Clone + Send + 'static> Recorder<T> {
  pub fn new() -> Self {
    Self {
      events: Mutex::new(Vec::new()),
      subscription: Mutex::new(None),
      on_subscribe_requests: Vec::new(),
      request_per_next: None,
      cancel_after: None,
      panic_on_next: None,
      panic_on_subscribe: false,
      panic_on_complete: false,
      panic_on_error: false,
    }
  }

  /// Requests each of `ns`, in order, from inside `on_subscribe`.
  pub fn requesting(mut self, ns: &[i64]) -> Self {
    self.on_subscribe_requests = ns.to_vec();
    self
  }

  /// Requests `n` more after every element.
  pub fn requesting_per_next(mut self, n: i64) -> Self {
    self.request_per_next = Some(n);
    self
  }

  /// Cancels (twice) from inside `on_next` once `count` elements arrived.
  pub fn cancelling_after(mut self, count: usize) -> Self {
    self.cancel_after = Some(count);
    self
  }

  /// Panics instead of recording the `nth` element (1-based).
  pub fn panicking_on_next(mut self, nth: usize) -> Self {
    self.panic_on_next = Some(nth);
    self
  }

  pub fn panicking_on_subscribe(mut self) -> Self {
    self.panic_on_subscribe = true;
    self
  }

  pub fn panicking_on_complete(mut self) -> Self {
    self.panic_on_complete = true;
    self
  }

  pub fn panicking_on_error(mut self) -> Self {
    self.panic_on_error = true;
    self
  }

  pub fn build(self) -> Arc<Self> {
    Arc::new(self)
  }

  pub fn events(&self) -> Vec<Event<T>> {
    self.events.lock().clone()
  }

  pub fn elements(&self) -> Vec<T> {
    self
      .events
      .lock()
      .iter()
      .filter_map(|event| match event {
        Event::Next(element) => Some(element.clone()),
        _ => None,
      })
      .collect()
  }

  pub fn next_count(&self) -> usize {
    self.events.lock().iter().filter(|e| matches!(e, Event::Next(_))).count()
  }

  pub fn terminal_count(&self) -> usize {
    self
      .events
      .lock()
      .iter()
      .filter(|e| matches!(e, Event::Error(_) | Event::Complete))
      .count()
  }

  pub fn is_terminated(&self) -> bool {
    self.terminal_count() > 0
  }

  /// The first subscription this recorder was handed.
  pub fn subscription(&self) -> Arc<dyn Subscription> {
    self
      .subscription
      .lock()
      .clone()
      .expect("recorder was never subscribed")
  }

  pub fn request(&self, n: i64) {
    self.subscription().request(n);
  }

  pub fn cancel(&self) {
    self.subscription().cancel();
  }

  fn push(&self, event: Event<T>) {
    self.events.lock().push(event);
  }
}

impl<T: Clone + Send + 'static> Subscriber<T> for Recorder<T> {
  fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
    self.push(Event::Subscribe);
    if self.panic_on_subscribe {
      panic!("recorder refuses to subscribe");
    }
    self
      .subscription
      .lock()
      .get_or_insert_with(|| subscription.clone());
    for &n in &self.on_subscribe_requests {
      subscription.request(n);
    }
  }

  fn on_next(&self, element: T) {
    let nth = self.next_count() + 1;
    if self.panic_on_next == Some(nth) {
      panic!("recorder choked on element {}", nth);
    }
    self.push(Event::Next(element));

    let subscription = self.subscription.lock().clone();
    let Some(subscription) = subscription else {
      return;
    };
    if self.cancel_after == Some(nth) {
      subscription.cancel();
      subscription.cancel();
    } else if let Some(n) = self.request_per_next {
      subscription.request(n);
    }
  }

  fn on_error(&self, error: StreamError) {
    self.push(Event::Error(error.to_string()));
    if self.panic_on_error {
      panic!("recorder cannot handle errors");
    }
  }

  fn on_complete(&self) {
    self.push(Event::Complete);
    if self.panic_on_complete {
      panic!("recorder cannot handle completion");
    }
  }
}
