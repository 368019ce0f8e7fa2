// base/src/flag.rs

use core::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_utils::CachePadded;

/// A thread-safe boolean with a compare-and-set transition.
///
/// Every operation is `SeqCst`. The signaller relies on that: a producer
/// pushes then tries `make_true`, while the run loop `clear`s then re-reads
/// the queue length, and only a single total order over both pairs rules out
/// a wakeup being lost between them.
pub struct AtomicFlag {
  value: CachePadded<AtomicBool>,
}

impl AtomicFlag {
  pub fn new() -> Self {
    Self {
      value: CachePadded::new(AtomicBool::new(false)),
    }
  }

  #[inline]
  pub fn is_set(&self) -> bool {
    self.value.load(Ordering::SeqCst)
  }

  #[inline]
  pub fn set(&self) {
    self.value.store(true, Ordering::SeqCst);
  }

  #[inline]
  pub fn clear(&self) {
    self.value.store(false, Ordering::SeqCst);
  }

  /// Flips the flag from `false` to `true`.
  ///
  /// Returns `true` only for the caller that performed the transition.
  #[inline]
  pub fn make_true(&self) -> bool {
    self
      .value
      .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
      .is_ok()
  }
}

impl Default for AtomicFlag {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for AtomicFlag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("AtomicFlag").field(&self.is_set()).finish()
  }
}
