//! HTTP adapter for the arrival monitors.
//!
//! Exposes the running entries, their rendered sensors, the refresh and
//! line-update service calls, and cached station search.

mod dto;
mod error;
mod routes;
mod state;

pub use dto::*;
pub use error::AppError;
pub use routes::create_router;
pub use state::{AppState, LiveRegistry};
