//! Rolling keypoint map.
//!
//! World-frame keypoints are cached in a dense voxel grid that follows the
//! sensor: when the sensor voxel leaves the central third of the grid, the
//! origin shifts in whole-voxel steps and the voxels falling off the
//! trailing edge are discarded.

mod rolling_grid;
mod voxel_filter;

pub use rolling_grid::RollingGrid;
pub use voxel_filter::voxel_downsample;
