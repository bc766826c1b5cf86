//! Policy types controlling how requests filter and receive samples.
//!
//! - [`Accuracy`]: precision bound a position fix must satisfy, or the
//!   IP-lookup strategy variant
//! - [`Frequency`]: update cadence (one-shot, continuous, significant
//!   change, deferred)
//! - [`ActivityType`]: hint describing the kind of motion being tracked
//! - [`Authorization`]: platform permission level a request needs
//!
//! Policies are declared at request construction and, together, determine
//! the coarsest hardware profile the session manager must configure.

mod accuracy;
mod activity;
mod authorization;
mod frequency;

pub use accuracy::{Accuracy, AccuracyLevel};
pub use activity::ActivityType;
pub use authorization::Authorization;
pub use frequency::Frequency;
