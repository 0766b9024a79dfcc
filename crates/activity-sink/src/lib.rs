//! Activity Sink - the notification channel bots report through.
//!
//! Sinks are fire-and-forget: a failing or absent consumer must never abort
//! the operation that emitted the message. Implementations log delivery
//! problems and move on.

pub mod manager;
pub mod message;
pub mod sink;

pub use manager::{ActivityManager, ThreadType};
pub use message::{ActivityKind, SinkMessage};
pub use sink::{to_mpsc, ActivitySink, BroadcastSink, BufferedSink, NullSink};
