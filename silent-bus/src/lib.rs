//! Silent Bus: adaptive polling of BusNearby arrivals.
//!
//! Each configured stop or train route gets a coordinator that fetches
//! upcoming arrivals, publishes them as an immutable snapshot and picks its
//! next polling period from how soon the next vehicle is due.

pub mod busnearby;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod registry;
pub mod schedule;
pub mod sensor;
pub mod setup;
pub mod web;
