use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

/// Counters updated by the run loop. Relaxed: they order nothing.
#[derive(Debug, Default)]
pub(crate) struct Stats {
  pub(crate) runs: CachePadded<AtomicU64>,
  pub(crate) processed: CachePadded<AtomicU64>,
  pub(crate) discarded: CachePadded<AtomicU64>,
}

impl Stats {
  #[inline]
  pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn snapshot(&self) -> SignallerStats {
    SignallerStats {
      runs: self.runs.load(Ordering::Relaxed),
      processed: self.processed.load(Ordering::Relaxed),
      discarded: self.discarded.load(Ordering::Relaxed),
    }
  }
}

/// A point-in-time view of a signaller's activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignallerStats {
  /// Runs of the loop that were executed, including ones that found nothing.
  pub runs: u64,
  /// Signals whose handler was invoked.
  pub processed: u64,
  /// Signals dequeued after cancellation and dropped without a handler.
  pub discarded: u64,
}
