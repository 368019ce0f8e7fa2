#![allow(dead_code)]

use std::error::Error as StdError;
use std::thread;
use std::time::{Duration, Instant};

use flow_base::{BoxError, ErrorSink, RunHandle, Runner, RunnerError, Signal, Work};
use parking_lot::Mutex;

pub const SHORT_TIMEOUT: Duration = Duration::from_millis(300);
pub const LONG_TIMEOUT: Duration = Duration::from_secs(5);
pub const ITEMS_LOW: usize = 50;
pub const ITEMS_HIGH: usize = 1000;

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

/// A runner that refuses every submission.
pub struct RejectingRunner;

impl Runner for RejectingRunner {
  fn submit(&self, _work: Work) -> Result<RunHandle, RunnerError> {
    Err(RunnerError::Rejected("test runner is closed".into()))
  }
}

/// The two-signal vocabulary used by most engine tests.
#[derive(Debug)]
pub enum TestSignal {
  Foo,
  Bar(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestKind {
  Foo,
  Bar,
}

impl Signal for TestSignal {
  type Kind = TestKind;
  const KINDS: &'static [TestKind] = &[TestKind::Foo, TestKind::Bar];

  fn kind(&self) -> TestKind {
    match self {
      TestSignal::Foo => TestKind::Foo,
      TestSignal::Bar(_) => TestKind::Bar,
    }
  }
}

pub fn boom(message: &str) -> BoxError {
  message.to_string().into()
}
