//! Sensor trajectory: the append-only history of world poses.

use serde::{Deserialize, Serialize};

use super::Pose6D;

/// One trajectory sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryEntry {
    /// Acquisition time of the sweep, seconds.
    pub timestamp: f64,
    /// World pose of the sweep-end frame.
    pub pose: Pose6D,
}

/// Ordered sequence of `(timestamp, pose)` entries.
///
/// Entries are appended in sweep order and never rewritten.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trajectory {
    entries: Vec<TrajectoryEntry>,
}

impl Trajectory {
    /// Create an empty trajectory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn push(&mut self, timestamp: f64, pose: Pose6D) {
        self.entries.push(TrajectoryEntry { timestamp, pose });
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent entry, if any.
    #[inline]
    pub fn last(&self) -> Option<&TrajectoryEntry> {
        self.entries.last()
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, TrajectoryEntry> {
        self.entries.iter()
    }

    #[inline]
    pub fn entries(&self) -> &[TrajectoryEntry] {
        &self.entries
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
