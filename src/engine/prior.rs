//! External pose prior.
//!
//! An auxiliary sensor (GPS, IMU, another SLAM) can supply pose estimates
//! over time. The orchestrator samples the prior at each sweep timestamp:
//! before the first frame the sampled pose initialises the world transform,
//! afterwards the inter-sweep delta seeds the ego-motion optimization.

use crate::core::types::Pose6D;

/// Source of externally measured poses, sampled by timestamp.
pub trait PosePrior {
    /// Pose at a timestamp, or `None` when the source cannot interpolate
    /// there.
    fn sample_at(&self, timestamp: f64) -> Option<Pose6D>;
}

/// A pose prior backed by a sorted list of timestamped samples, linearly
/// interpolated.
#[derive(Debug, Clone, Default)]
pub struct InterpolatedPosePrior {
    samples: Vec<(f64, Pose6D)>,
}

impl InterpolatedPosePrior {
    /// Build from samples; they are sorted by timestamp internally.
    pub fn new(mut samples: Vec<(f64, Pose6D)>) -> Self {
        samples.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        Self { samples }
    }

    /// Append a sample (must not predate the last one to stay sorted).
    pub fn push(&mut self, timestamp: f64, pose: Pose6D) {
        self.samples.push((timestamp, pose));
    }
}

impl PosePrior for InterpolatedPosePrior {
    fn sample_at(&self, timestamp: f64) -> Option<Pose6D> {
        let first = self.samples.first()?;
        let last = self.samples.last()?;
        if timestamp < first.0 || timestamp > last.0 {
            return None;
        }
        let after = self
            .samples
            .partition_point(|(t, _)| *t < timestamp)
            .min(self.samples.len() - 1);
        if after == 0 || self.samples[after].0 == timestamp {
            return Some(self.samples[after].1);
        }
        let (t0, p0) = self.samples[after - 1];
        let (t1, p1) = self.samples[after];
        if t1 <= t0 {
            return Some(p1);
        }
        let alpha = (timestamp - t0) / (t1 - t0);
        let v = p0.as_vector() + alpha * (p1.as_vector() - p0.as_vector());
        Some(Pose6D::from_vector(&v))
    }
}
