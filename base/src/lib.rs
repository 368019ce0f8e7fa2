//! A small asynchronous signal-processing engine.
//!
//! A [`Signaller`] funnels signals from any number of threads into a single
//! logical consumer. Signals are queued in a lock-free FIFO and processed in
//! submission order by a run loop that a pluggable [`Runner`] executes; at most
//! one run is ever active for a given signaller, so state touched only from
//! signal handlers needs no locking.

pub mod error;
pub mod flag;
pub mod queue;
pub mod runner;
pub mod signaller;
pub mod sink;

mod stats;

pub use error::{panic_message, BoxError, BuildError, Error, RunnerError};
pub use flag::AtomicFlag;
pub use queue::SignalQueue;
pub use runner::{InlineRunner, RunHandle, Runner, ThreadRunner, Work};
#[cfg(feature = "tokio")]
pub use runner::TokioRunner;
pub use signaller::{Signal, Signaller, SignallerBuilder, DEFAULT_SIGNALS_PER_RUN};
pub use sink::{ErrorSink, TracingSink};
pub use stats::SignallerStats;
