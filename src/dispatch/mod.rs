//! Batch dispatch: the engine, its rate limiter, event log, and run coordinator.

pub mod coordinator;
pub mod engine;
pub mod events;
pub mod limiter;

pub use coordinator::{DispatchStatus, Dispatcher};
pub use engine::{BatchWindow, DispatchEngine, RunOutcome, RunSummary};
pub use events::{DispatchEvent, EventLevel, EventLog};
pub use limiter::{FixedInterval, RateLimiter};
