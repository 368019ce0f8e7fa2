use crate::protocol::MAX_DEMAND;

/// Outstanding demand of one subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Demand(u64);

impl Demand {
  pub const fn new() -> Self {
    Demand(0)
  }

  /// Adds `n`, saturating at [`MAX_DEMAND`].
  #[inline]
  pub fn add(&mut self, n: u64) {
    self.0 = self.0.saturating_add(n).min(MAX_DEMAND);
  }

  /// Consumes one unit. Returns `false` if there was nothing to consume.
  #[inline]
  pub fn take_one(&mut self) -> bool {
    if self.0 == 0 {
      return false;
    }
    self.0 -= 1;
    true
  }

  #[inline]
  pub fn get(&self) -> u64 {
    self.0
  }

  #[inline]
  pub fn is_zero(&self) -> bool {
    self.0 == 0
  }

  pub(crate) fn clear(&mut self) {
    self.0 = 0;
  }
}
