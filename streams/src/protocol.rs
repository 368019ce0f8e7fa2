// streams/src/protocol.rs

use std::sync::Arc;

use crate::error::StreamError;

/// The largest demand a subscription tracks. Requests accumulate up to this
/// value and stay there; a subscription at `MAX_DEMAND` is effectively
/// unbounded (Reactive Streams rule 3.17).
pub const MAX_DEMAND: u64 = i64::MAX as u64;

/// The link between one publisher and one subscriber.
///
/// Both methods only record intent and return immediately. Neither ever
/// fails at the call site: a bad request is reported to the subscriber
/// through `on_error`.
pub trait Subscription: Send + Sync {
  /// Asks for `n` more elements. `n < 1` terminates the subscription with
  /// [`StreamError::NonPositiveRequest`].
  fn request(&self, n: i64);

  /// Stops delivery. Idempotent. An element already being delivered is not
  /// recalled.
  fn cancel(&self);
}

/// Receives the signals of a subscription.
///
/// `on_subscribe` comes first and at most once; `on_next` is called no more
/// often than requested; at most one of `on_error` / `on_complete` ends the
/// sequence. Calls for one subscription never overlap.
pub trait Subscriber<T>: Send + Sync {
  fn on_subscribe(&self, subscription: Arc<dyn Subscription>);
  fn on_next(&self, element: T);
  fn on_error(&self, error: StreamError);
  fn on_complete(&self);
}

/// A source of elements for any number of subscribers.
pub trait Publisher<T> {
  /// Starts a subscription for `subscriber`. Rejections are delivered to the
  /// subscriber, never returned.
  fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>);
}

impl<T, P: Publisher<T> + ?Sized> Publisher<T> for Arc<P> {
  fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
    (**self).subscribe(subscriber)
  }
}
