//! Adaptive refresh cadence.
//!
//! Polling is fast while a vehicle is a few minutes out, relaxes when the
//! next arrival is far away (more so at night) and drops to an idle cadence
//! when nothing is scheduled at all.

mod adaptive;
mod config;

pub use adaptive::AdaptiveScheduler;
pub use config::ScheduleConfig;
