//! Persistence: trajectory import and export.

pub mod trajectory_log;
