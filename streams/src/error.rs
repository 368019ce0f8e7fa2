// streams/src/error.rs

use flow_base::BoxError;
use thiserror::Error;

/// The error a subscriber receives in `on_error`.
#[derive(Debug, Error)]
pub enum StreamError {
  #[error("rule 3.9 violated: request({requested}) must be positive")]
  NonPositiveRequest { requested: i64 },

  #[error("rule 2.12 violated: subscriber is already subscribed to this publisher")]
  DuplicateSubscriber,

  #[error("publisher accepts a single subscriber and already has one")]
  SubscriberLimit,

  #[error("element source failed: {0}")]
  Source(#[source] BoxError),

  #[error("element source panicked: {0}")]
  SourcePanicked(String),

  #[error("rule 2.13 violated: on_subscribe panicked: {message}")]
  SubscriberPanicked { message: String },

  #[error("failed to set up the subscription engine: {0}")]
  Engine(#[from] flow_base::BuildError),
}

/// A subscriber broke the protocol in a way that cannot be reported back to it.
///
/// Handed to the publisher's [`ErrorSink`](flow_base::ErrorSink).
#[derive(Debug, Error)]
#[error("rule 2.13 violated by a subscriber of '{publisher}': {callback} panicked: {message}")]
pub struct Violation {
  pub publisher: String,
  pub callback: &'static str,
  pub message: String,
}

impl Violation {
  pub(crate) fn new(publisher: &str, callback: &'static str, message: String) -> Self {
    Self {
      publisher: publisher.to_string(),
      callback,
      message,
    }
  }
}

/// Errors that can occur when building a publisher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
  #[error("batch size cannot be zero")]
  ZeroBatchSize,
  #[error("signals per run cannot be zero")]
  ZeroSignalsPerRun,
}
