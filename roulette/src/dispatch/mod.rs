//! Delayed job dispatcher.
//!
//! [`Dispatcher::dispatch`] hands a [`Job`] to a timer task and returns at
//! once. After the delay the job enters a bounded queue drained by a fixed
//! pool of workers. Delivery is best effort: no retries, no ordering between
//! jobs, and failures are only logged and counted.

pub mod dispatcher;
pub mod job;

pub use dispatcher::{DispatchError, Dispatcher, DispatcherConfig, DispatcherStats};
pub use job::Job;
