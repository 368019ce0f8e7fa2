// base/src/sink.rs

use std::error::Error as StdError;
use std::fmt::Write as _;

/// Receives failures that cannot be returned to any caller.
///
/// Signallers report their internal failures here, and the stream layer
/// reports subscriber rule violations. Implementations must not panic.
pub trait ErrorSink: Send + Sync + 'static {
  fn report(&self, error: &(dyn StdError + 'static));
}

/// The default sink: logs every report at `ERROR` level through `tracing`.
#[derive(Debug, Clone)]
pub struct TracingSink {
  label: &'static str,
}

impl TracingSink {
  pub fn new() -> Self {
    Self { label: "flow" }
  }

  /// Tags every record with `label`, e.g. the name of the owning component.
  pub fn with_label(label: &'static str) -> Self {
    Self { label }
  }
}

impl Default for TracingSink {
  fn default() -> Self {
    Self::new()
  }
}

impl ErrorSink for TracingSink {
  fn report(&self, error: &(dyn StdError + 'static)) {
    let mut causes = String::new();
    let mut source = error.source();
    while let Some(cause) = source {
      if !causes.is_empty() {
        causes.push_str(": ");
      }
      let _ = write!(causes, "{}", cause);
      source = cause.source();
    }
    tracing::error!(label = self.label, causes = %causes, "{}", error);
  }
}
