// base/src/queue.rs

//! Unbounded, lock-free FIFO of pending signals.
//!
//! Producers link new nodes at the head with a single atomic swap; the one
//! consumer walks from the tail. There is no consumer-side synchronization,
//! so the queue itself cannot tell two consumers apart: `try_pop` is `unsafe`
//! and the caller promises exclusivity (the signaller's `running` flag).

use core::fmt;
use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

struct Node<T> {
  next: AtomicPtr<Node<T>>,
  value: UnsafeCell<Option<T>>,
}

impl<T> Node<T> {
  fn boxed(value: Option<T>) -> *mut Node<T> {
    Box::into_raw(Box::new(Node {
      next: AtomicPtr::new(ptr::null_mut()),
      value: UnsafeCell::new(value),
    }))
  }
}

/// A multi-producer, single-consumer queue with insertion-order delivery.
pub struct SignalQueue<T> {
  /// Most recently pushed node. Producers swap themselves in here.
  head: CachePadded<AtomicPtr<Node<T>>>,
  /// Stub node preceding the oldest pending value. Consumer-owned.
  tail: CachePadded<UnsafeCell<*mut Node<T>>>,
  /// Incremented before a node is linked and decremented after it is taken,
  /// so it never reads lower than the number of completed pushes.
  len: CachePadded<AtomicUsize>,
}

// Values move between threads through the queue; nothing is shared by reference.
unsafe impl<T: Send> Send for SignalQueue<T> {}
unsafe impl<T: Send> Sync for SignalQueue<T> {}

impl<T> SignalQueue<T> {
  pub fn new() -> Self {
    let stub = Node::boxed(None);
    Self {
      head: CachePadded::new(AtomicPtr::new(stub)),
      tail: CachePadded::new(UnsafeCell::new(stub)),
      len: CachePadded::new(AtomicUsize::new(0)),
    }
  }

  /// Appends a value. Never blocks, callable from any thread.
  pub fn push(&self, value: T) {
    let node = Node::boxed(Some(value));
    self.len.fetch_add(1, Ordering::SeqCst);

    let prev = self.head.swap(node, Ordering::AcqRel);
    // SAFETY: `prev` was the head, so the consumer cannot have freed it yet:
    // it only frees a node once that node's `next` has been observed non-null.
    unsafe {
      (*prev).next.store(node, Ordering::Release);
    }
  }

  /// Removes the oldest value, or returns `None` if nothing is linked yet.
  ///
  /// A push that has swapped the head but not yet linked its node is not
  /// visible; `len()` already counts it, so callers that re-check `is_empty`
  /// after a `None` will come back for it.
  ///
  /// # Safety
  ///
  /// At most one thread may be inside `try_pop` at any time, and successive
  /// callers must be ordered by a happens-before edge.
  pub unsafe fn try_pop(&self) -> Option<T> {
    let tail = *self.tail.get();
    let next = (*tail).next.load(Ordering::Acquire);
    if next.is_null() {
      return None;
    }

    let value = (*(*next).value.get()).take();
    *self.tail.get() = next;
    drop(Box::from_raw(tail));
    self.len.fetch_sub(1, Ordering::SeqCst);
    value
  }

  /// Number of values pushed and not yet popped, including in-flight pushes.
  pub fn len(&self) -> usize {
    self.len.load(Ordering::SeqCst)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl<T> Default for SignalQueue<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> fmt::Debug for SignalQueue<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SignalQueue")
      .field("len", &self.len())
      .finish_non_exhaustive()
  }
}

impl<T> Drop for SignalQueue<T> {
  fn drop(&mut self) {
    let tail = *self.tail.get_mut();
    // SAFETY: `&mut self` means no producer or consumer is active, and every
    // node reachable from the tail was allocated by `Node::boxed`.
    let mut current = unsafe { (*tail).next.load(Ordering::Relaxed) };
    while !current.is_null() {
      let node = unsafe { Box::from_raw(current) };
      current = node.next.load(Ordering::Relaxed);
    }
    unsafe {
      drop(Box::from_raw(tail));
    }
  }
}
