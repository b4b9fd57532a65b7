//! Primitives shared by single agents and pool workers.

pub mod control;
pub mod findings;
pub mod log_stream;
pub mod rate_limiter;

pub use control::{Checkpoint, ControlSignal, RunControl};
pub use findings::FindingLedger;
pub use log_stream::{LogSink, LogStream};
pub use rate_limiter::RateLimiter;
