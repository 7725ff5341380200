//! Rolling grid parameters.

use serde::{Deserialize, Serialize};

/// Configuration for the voxelised rolling keypoint map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RollingGridConfig {
    /// Edge length of one grid voxel, meters.
    pub voxel_size: f64,

    /// Grid extent in voxels per axis. The sensor is kept inside the central
    /// third of each axis by rolling.
    pub grid_dims: [usize; 3],

    /// Subdivision of a single voxel used to downsample its stored cloud
    /// after insertion; bounds the per-voxel point count by the product of
    /// these dimensions.
    pub intra_voxel_dims: [usize; 3],

    /// Leaf size (meters) of the voxel filter applied to submaps extracted
    /// with [`crate::algorithms::mapping::RollingGrid::get`].
    pub leaf_filter_size: f64,
}

impl Default for RollingGridConfig {
    fn default() -> Self {
        Self {
            voxel_size: 1.0,
            grid_dims: [48, 48, 48],
            intra_voxel_dims: [10, 10, 10],
            leaf_filter_size: 0.2,
        }
    }
}
