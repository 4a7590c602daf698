//! Core domain types: identifiers, entities, wall-clock time and schedules.

pub mod clock;
pub mod local_time;
pub mod models;
pub mod schedule;
pub mod types;
