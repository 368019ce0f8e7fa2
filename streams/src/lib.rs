//! Demand-driven publish/subscribe streams.
//!
//! A [`Publisher`] hands each [`Subscriber`] a [`Subscription`] through which
//! the subscriber asks for elements. Nothing is delivered beyond what was
//! requested. [`PumpingPublisher`] pulls elements from an [`ElementSource`] and
//! pushes them downstream; every subscription it creates is driven by its own
//! [`flow_base::Signaller`], so callbacks on one subscriber never overlap and
//! never run on the thread that called `request` or `cancel`, unless the
//! configured runner is inline.

pub mod demand;
pub mod error;
pub mod protocol;
pub mod publisher;
pub mod source;
pub mod subscriber;
pub mod subscription;

pub use demand::Demand;
pub use error::{BuildError, StreamError, Violation};
pub use protocol::{Publisher, Subscriber, Subscription, MAX_DEMAND};
pub use publisher::{PumpingPublisher, PumpingPublisherBuilder, DEFAULT_BATCH_SIZE};
pub use source::ElementSource;
pub use subscriber::{LoggingSubscriber, NilSubscriber, NilSubscription};
pub use subscription::PumpingSubscription;

pub use flow_base::{BoxError, ErrorSink, InlineRunner, Runner, ThreadRunner, TracingSink};
#[cfg(feature = "tokio")]
pub use flow_base::TokioRunner;
