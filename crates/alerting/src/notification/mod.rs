//! Notification channels and the per-notifier send decision.
//!
//! - [`Notifier`] trait for pluggable notification channels
//! - [`policy`] with the ordered notify decision table
//! - [`NotifierRegistry`] building notifiers from stored models
//! - [`NotificationService`] resolving a rule's notifiers and sending

pub mod policy;
mod registry;
mod service;
mod traits;

pub use policy::{should_notify, Transition};
pub use registry::{LogNotifier, NotifierFactory, NotifierRegistry};
pub use service::NotificationService;
pub use traits::{NotificationParams, Notifier, NotifierSettings, NotifyError};
