//! Invocation admission pipeline
//!
//! Bounds concurrent calls to the model backend:
//! - [`ConcurrencyLimiter`] caps how many calls run at once
//! - [`DeadlineGuard`] turns an overrun into a sentinel response
//! - [`InvocationQueue`] orders submissions and dispatches them

mod deadline;
mod limiter;
mod queue;

pub use deadline::DeadlineGuard;
pub use limiter::ConcurrencyLimiter;
pub use queue::{InvocationQueue, InvokeHandle, InvokeResult, QueueStats, generate_seed};
