//! Per-rule scheduling on the one-second tick.
//!
//! The [`Scheduler`] owns one [`Job`] per rule id. On every tick it decides
//! which jobs are due and hands them to the execution queue without ever
//! blocking; a job that is queued or running is skipped until the dispatcher
//! releases it.

mod core;
mod job;

#[cfg(test)]
mod tests;

pub use self::core::Scheduler;
pub use self::job::Job;
