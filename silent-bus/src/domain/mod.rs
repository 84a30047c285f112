//! Domain types for the arrival monitor.
//!
//! These types are what the rest of the crate works with once upstream
//! data has been validated and normalized. Invariants (unique line filters,
//! sorted snapshot groups, non-negative minute counts) hold by construction.

mod arrival;
mod stop_id;
mod target;
mod transport;

pub use arrival::{ArrivalRecord, ROUTE_KEY, Snapshot, minutes_until};
pub use stop_id::{InvalidStopId, StopId};
pub use target::{EmptyLineSet, LineSet, MonitorTarget, RouteTarget, StopTarget};
pub use transport::Transport;
