//! Laser calibration: a stable mapping from laser id to scan line index.
//!
//! Keypoint extraction treats each laser beam as one scan line and relies on
//! the index being ordered by vertical beam angle, so that scan line `k` of
//! one sweep is the same physical beam as scan line `k` of the next. The
//! mapping is either provided up front or inferred from the vertical angles
//! observed in the first frame.

use crate::error::{Result, SlamError};
use crate::sensors::sweep::SweepFrame;

/// Mapping from laser id to vertical-angle-ordered scan line index.
#[derive(Debug, Clone)]
pub struct LaserCalibration {
    /// `scan_line_of[laser_id]` is the scan line index of that beam.
    scan_line_of: Vec<usize>,
}

impl LaserCalibration {
    /// Build a calibration from an explicit mapping.
    ///
    /// `mapping[laser_id]` must be a permutation of `0..mapping.len()`.
    pub fn from_mapping(mapping: Vec<usize>) -> Result<Self> {
        if mapping.is_empty() {
            return Err(SlamError::ConfigInvalid(
                "laser mapping must not be empty".into(),
            ));
        }
        let mut seen = vec![false; mapping.len()];
        for &line in &mapping {
            if line >= mapping.len() || seen[line] {
                return Err(SlamError::ConfigInvalid(format!(
                    "laser mapping is not a permutation of 0..{}",
                    mapping.len()
                )));
            }
            seen[line] = true;
        }
        Ok(Self {
            scan_line_of: mapping,
        })
    }

    /// Infer the calibration from the vertical angles observed in a frame.
    ///
    /// Laser ids must be dense in `0..n`; when `expected_lasers` is given,
    /// `n` must match it. Beams are ranked by their mean vertical angle.
    pub fn infer_from_frame(frame: &SweepFrame, expected_lasers: Option<usize>) -> Result<Self> {
        if frame.points.is_empty() {
            return Err(SlamError::FrameRejected(
                "cannot infer laser calibration from an empty frame".into(),
            ));
        }

        let max_id = frame
            .points
            .iter()
            .map(|p| p.laser_id as usize)
            .max()
            .unwrap_or(0);
        let n = max_id + 1;
        if let Some(expected) = expected_lasers {
            if n != expected {
                return Err(SlamError::ConfigInvalid(format!(
                    "frame contains {n} laser ids but n_lasers is {expected}"
                )));
            }
        }

        let mut angle_sum = vec![0.0f64; n];
        let mut count = vec![0usize; n];
        for p in &frame.points {
            let horizontal = (p.x * p.x + p.y * p.y).sqrt();
            angle_sum[p.laser_id as usize] += p.z.atan2(horizontal);
            count[p.laser_id as usize] += 1;
        }
        if count.iter().any(|&c| c == 0) {
            return Err(SlamError::FrameRejected(
                "laser ids are not dense; cannot infer calibration".into(),
            ));
        }

        // Rank beams by mean vertical angle, ascending.
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            let ma = angle_sum[a] / count[a] as f64;
            let mb = angle_sum[b] / count[b] as f64;
            ma.partial_cmp(&mb).unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut scan_line_of = vec![0usize; n];
        for (line, &laser_id) in order.iter().enumerate() {
            scan_line_of[laser_id] = line;
        }
        Ok(Self { scan_line_of })
    }

    /// Number of laser beams.
    #[inline]
    pub fn n_lasers(&self) -> usize {
        self.scan_line_of.len()
    }

    /// Scan line index of a laser id, or `None` for an unknown id.
    #[inline]
    pub fn scan_line(&self, laser_id: u32) -> Option<usize> {
        self.scan_line_of.get(laser_id as usize).copied()
    }
}
