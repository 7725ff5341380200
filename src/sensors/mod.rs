//! Sensor-side processing: laser calibration and sweep conversion.

pub mod calibration;
pub mod sweep;

pub use calibration::LaserCalibration;
pub use sweep::{split_scan_lines, RawPoint, SweepFrame};
