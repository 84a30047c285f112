//! Scheduled refresh of one monitor target.
//!
//! A [`Coordinator`] owns the polling loop for a stop or a route: it fetches
//! raw data through an [`ArrivalSource`], normalizes it into a
//! [`Snapshot`](crate::domain::Snapshot), publishes that snapshot for
//! readers and lets the adaptive scheduler pick the next period.

mod error;
mod refresh;
mod source;


pub use error::CoordinatorError;
pub use refresh::{Coordinator, CycleOutcome, CycleState, FailureRecord};
pub use source::{ArrivalSource, Clock, SystemClock};
