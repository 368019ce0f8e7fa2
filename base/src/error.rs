// base/src/error.rs

use std::any::Any;
use std::io;

use thiserror::Error;

/// Type-erased error produced by signal handlers and other user code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures raised inside a signaller's run loop.
///
/// These never reach the caller of [`Signaller::signal`](crate::Signaller::signal);
/// they cancel the signaller and are handed to its [`ErrorSink`](crate::ErrorSink).
#[derive(Debug, Error)]
pub enum Error {
  #[error("signaller '{signaller}' received an unrecognized signal: {kind}")]
  UnrecognizedSignal { signaller: String, kind: String },

  #[error("signal callback for {kind} failed: {source}")]
  Callback {
    kind: String,
    #[source]
    source: BoxError,
  },

  #[error("signal callback for {kind} panicked: {message}")]
  CallbackPanicked { kind: String, message: String },

  #[error("failed to schedule a run of signaller '{signaller}': {source}")]
  Schedule {
    signaller: String,
    #[source]
    source: RunnerError,
  },
}

/// Errors returned by a [`Runner`](crate::Runner) that could not accept work.
#[derive(Debug, Error)]
pub enum RunnerError {
  #[error("failed to spawn worker thread: {0}")]
  Spawn(#[from] io::Error),

  #[error("no async runtime is available to run on")]
  NoRuntime,

  #[error("runner rejected work: {0}")]
  Rejected(String),
}

/// Errors that can occur when building a signaller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
  /// A run must be allowed to process at least one signal.
  #[error("signals per run cannot be zero")]
  ZeroSignalsPerRun,
  /// A signal kind declared by the signal type has no handler.
  #[error("no handler registered for signal kind {0}")]
  MissingHandler(String),
  /// A handler was registered twice for the same signal kind.
  #[error("more than one handler registered for signal kind {0}")]
  DuplicateHandler(String),
}

/// Renders a panic payload caught by `catch_unwind` as a message.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    (*s).to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "non-string panic payload".to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::panic;

  #[test]
  fn panic_message_renders_str_and_string_payloads() {
    let payload = panic::catch_unwind(|| panic!("static message")).unwrap_err();
    assert_eq!(panic_message(payload.as_ref()), "static message");

    let n = 7;
    let payload = panic::catch_unwind(move || panic!("formatted {}", n)).unwrap_err();
    assert_eq!(panic_message(payload.as_ref()), "formatted 7");

    let payload = panic::catch_unwind(|| panic::panic_any(42_u8)).unwrap_err();
    assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
  }

  #[test]
  fn schedule_error_keeps_runner_error_as_source() {
    let err = Error::Schedule {
      signaller: "pump".into(),
      source: RunnerError::Rejected("pool closed".into()),
    };
    assert_eq!(
      err.to_string(),
      "failed to schedule a run of signaller 'pump': runner rejected work: pool closed"
    );
    let source = std::error::Error::source(&err).map(|s| s.to_string());
    assert_eq!(source.as_deref(), Some("runner rejected work: pool closed"));
  }
}
