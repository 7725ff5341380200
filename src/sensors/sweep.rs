//! Sweep frame input and scan line splitting.
//!
//! A frame arrives as a flat list of raw returns with per-point laser id and
//! acquisition time (absolute seconds or an intra-sweep fraction, both are
//! accepted). Splitting buckets the points into one cloud per scan line,
//! preserving the sensor's azimuthal ordering within each line, and
//! normalizes acquisition times to a fraction of the sweep.

use crate::core::types::{PointCloud, SweepPoint};
use crate::error::{Result, SlamError};
use crate::sensors::calibration::LaserCalibration;

/// One raw LiDAR return as delivered by the driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub intensity: f64,
    /// Hardware laser id.
    pub laser_id: u32,
    /// Acquisition time: absolute seconds or an intra-sweep fraction.
    pub time: f64,
}

/// One full sensor revolution.
#[derive(Debug, Clone, Default)]
pub struct SweepFrame {
    /// Acquisition time of the sweep, seconds.
    pub timestamp: f64,
    /// Raw returns in acquisition order.
    pub points: Vec<RawPoint>,
}

impl SweepFrame {
    /// Create a frame from raw returns.
    pub fn new(timestamp: f64, points: Vec<RawPoint>) -> Self {
        Self { timestamp, points }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Split a frame into per-scan-line clouds with normalized time fractions.
///
/// Points carrying non-finite coordinates are dropped; a laser id outside
/// the calibration rejects the whole frame (the scan-line structure is not
/// recognisable).
pub fn split_scan_lines(
    frame: &SweepFrame,
    calibration: &LaserCalibration,
) -> Result<Vec<PointCloud>> {
    if frame.is_empty() {
        return Err(SlamError::FrameRejected("empty frame".into()));
    }

    let (mut t_min, mut t_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for p in &frame.points {
        if p.time.is_finite() {
            t_min = t_min.min(p.time);
            t_max = t_max.max(p.time);
        }
    }
    let span = t_max - t_min;

    let mut lines = vec![PointCloud::new(); calibration.n_lasers()];
    for p in &frame.points {
        if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
            continue;
        }
        let scan_line = calibration.scan_line(p.laser_id).ok_or_else(|| {
            SlamError::FrameRejected(format!("unknown laser id {}", p.laser_id))
        })?;
        let time_fraction = if span > 0.0 && p.time.is_finite() {
            ((p.time - t_min) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
        lines[scan_line].push(SweepPoint {
            x: p.x,
            y: p.y,
            z: p.z,
            intensity: p.intensity,
            scan_line,
            time_fraction,
        });
    }

    if lines.iter().all(|line| line.is_empty()) {
        return Err(SlamError::FrameRejected(
            "frame contains no finite points".into(),
        ));
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn calibration() -> LaserCalibration {
        LaserCalibration::from_mapping(vec![0, 1]).unwrap()
    }

    fn raw(x: f64, laser_id: u32, time: f64) -> RawPoint {
        RawPoint {
            x,
            y: 1.0,
            z: 0.0,
            intensity: 1.0,
            laser_id,
            time,
        }
    }

    #[test]
    fn test_split_by_laser_and_normalize_time() {
        let frame = SweepFrame::new(
            10.0,
            vec![raw(1.0, 0, 100.0), raw(2.0, 1, 100.05), raw(3.0, 0, 100.1)],
        );
        let lines = split_scan_lines(&frame, &calibration()).unwrap();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 2);
        assert_eq!(lines[1].len(), 1);
        assert_relative_eq!(lines[0][0].time_fraction, 0.0);
        assert_relative_eq!(lines[1][0].time_fraction, 0.5);
        assert_relative_eq!(lines[0][1].time_fraction, 1.0);
    }

    #[test]
    fn test_split_rejects_empty_frame() {
        let frame = SweepFrame::new(0.0, vec![]);
        assert!(matches!(
            split_scan_lines(&frame, &calibration()),
            Err(SlamError::FrameRejected(_))
        ));
    }

    #[test]
    fn test_split_rejects_unknown_laser() {
        let frame = SweepFrame::new(0.0, vec![raw(1.0, 7, 0.0)]);
        assert!(split_scan_lines(&frame, &calibration()).is_err());
    }

    #[test]
    fn test_split_drops_non_finite_points() {
        let mut bad = raw(1.0, 0, 0.0);
        bad.z = f64::NAN;
        let frame = SweepFrame::new(0.0, vec![bad, raw(2.0, 1, 1.0)]);
        let lines = split_scan_lines(&frame, &calibration()).unwrap();
        assert_eq!(lines[0].len(), 0);
        assert_eq!(lines[1].len(), 1);
    }

    #[test]
    fn test_constant_time_yields_zero_fraction() {
        let frame = SweepFrame::new(0.0, vec![raw(1.0, 0, 5.0), raw(2.0, 0, 5.0)]);
        let lines = split_scan_lines(&frame, &calibration()).unwrap();
        assert_relative_eq!(lines[0][0].time_fraction, 0.0);
        assert_relative_eq!(lines[0][1].time_fraction, 0.0);
    }
}
