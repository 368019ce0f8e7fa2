// base/src/runner.rs

//! Executors that run a signaller's loop.
//!
//! A [`Runner`] only has to accept a unit of work and run it at some point,
//! on some thread. The signaller never blocks waiting for it.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::RunnerError;

/// A unit of work submitted to a [`Runner`].
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// Executes submitted work, usually asynchronously.
pub trait Runner: Send + Sync + 'static {
  /// Accepts `work` for execution.
  ///
  /// Returning an error means the work was dropped without running.
  fn submit(&self, work: Work) -> Result<RunHandle, RunnerError>;
}

impl<R: Runner + ?Sized> Runner for Arc<R> {
  fn submit(&self, work: Work) -> Result<RunHandle, RunnerError> {
    (**self).submit(work)
  }
}

/// Handle to submitted work. Dropping it detaches the work.
pub enum RunHandle {
  Thread(JoinHandle<()>),
  #[cfg(feature = "tokio")]
  Task(tokio::task::JoinHandle<()>),
  /// The work already ran (or was queued behind the current inline run).
  Completed,
}

impl RunHandle {
  pub fn is_finished(&self) -> bool {
    match self {
      RunHandle::Thread(handle) => handle.is_finished(),
      #[cfg(feature = "tokio")]
      RunHandle::Task(handle) => handle.is_finished(),
      RunHandle::Completed => true,
    }
  }
}

impl fmt::Debug for RunHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RunHandle::Thread(_) => write!(f, "RunHandle::Thread(..)"),
      #[cfg(feature = "tokio")]
      RunHandle::Task(_) => write!(f, "RunHandle::Task(..)"),
      RunHandle::Completed => write!(f, "RunHandle::Completed"),
    }
  }
}

/// Runs every submission on a freshly spawned OS thread.
#[derive(Debug, Clone, Default)]
pub struct ThreadRunner {
  name: Option<String>,
}

impl ThreadRunner {
  pub fn new() -> Self {
    Self::default()
  }

  /// Names the spawned threads, which shows up in panics and debuggers.
  pub fn named(name: impl Into<String>) -> Self {
    Self {
      name: Some(name.into()),
    }
  }
}

impl Runner for ThreadRunner {
  fn submit(&self, work: Work) -> Result<RunHandle, RunnerError> {
    let mut builder = thread::Builder::new();
    if let Some(name) = &self.name {
      builder = builder.name(name.clone());
    }
    let handle = builder.spawn(work)?;
    Ok(RunHandle::Thread(handle))
  }
}

thread_local! {
  // `Some` while an inline run is executing on this thread.
  static INLINE_BACKLOG: RefCell<Option<VecDeque<Work>>> = const { RefCell::new(None) };
}

/// Clears the backlog marker even if a unit of work unwinds.
struct BacklogGuard;

impl Drop for BacklogGuard {
  fn drop(&mut self) {
    INLINE_BACKLOG.with(|backlog| backlog.borrow_mut().take());
  }
}

/// Runs work synchronously on the submitting thread.
///
/// Work submitted while an inline run is already executing on the same thread
/// is queued and run after the current unit returns, in submission order, so
/// a signaller that keeps rescheduling itself loops instead of recursing.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineRunner;

impl InlineRunner {
  pub fn new() -> Self {
    InlineRunner
  }
}

impl Runner for InlineRunner {
  fn submit(&self, work: Work) -> Result<RunHandle, RunnerError> {
    let deferred = INLINE_BACKLOG.with(|backlog| {
      let mut backlog = backlog.borrow_mut();
      match backlog.as_mut() {
        Some(queue) => {
          queue.push_back(work);
          None
        }
        None => {
          *backlog = Some(VecDeque::new());
          Some(work)
        }
      }
    });

    let Some(first) = deferred else {
      return Ok(RunHandle::Completed);
    };

    let _guard = BacklogGuard;
    first();
    while let Some(next) =
      INLINE_BACKLOG.with(|backlog| backlog.borrow_mut().as_mut().and_then(VecDeque::pop_front))
    {
      next();
    }
    Ok(RunHandle::Completed)
  }
}

/// Runs work on a Tokio runtime.
#[cfg(feature = "tokio")]
#[derive(Debug, Clone)]
pub struct TokioRunner {
  handle: tokio::runtime::Handle,
  blocking: bool,
}

#[cfg(feature = "tokio")]
impl TokioRunner {
  /// Uses the runtime of the calling context.
  pub fn current() -> Result<Self, RunnerError> {
    let handle = tokio::runtime::Handle::try_current().map_err(|_| RunnerError::NoRuntime)?;
    Ok(Self::from_handle(handle))
  }

  pub fn from_handle(handle: tokio::runtime::Handle) -> Self {
    Self {
      handle,
      blocking: false,
    }
  }

  /// Submits through `spawn_blocking` instead of `spawn`.
  ///
  /// Use this when signal handlers may block, e.g. element sources reading
  /// files or pipes.
  pub fn blocking(mut self) -> Self {
    self.blocking = true;
    self
  }
}

#[cfg(feature = "tokio")]
impl Runner for TokioRunner {
  fn submit(&self, work: Work) -> Result<RunHandle, RunnerError> {
    let handle = if self.blocking {
      self.handle.spawn_blocking(work)
    } else {
      self.handle.spawn(async move { work() })
    };
    Ok(RunHandle::Task(handle))
  }
}
