//! Voxelised rolling cache of world-frame keypoints.

use nalgebra::Vector3;

use crate::config::RollingGridConfig;
use crate::core::types::PointCloud;

use super::voxel_filter::voxel_downsample;

/// A dense 3D voxel grid of point clouds that follows the sensor.
///
/// Coordinates are kept in the world frame. The grid origin is the world
/// voxel coordinate of cell `(0, 0, 0)`; [`RollingGrid::roll`] shifts the
/// origin in whole-voxel steps to keep the sensor inside the central third
/// of each axis, discarding voxels that fall off the trailing edge.
pub struct RollingGrid {
    config: RollingGridConfig,
    cells: Vec<PointCloud>,
    /// World voxel coordinate of cell (0, 0, 0).
    origin: [i64; 3],
}

impl RollingGrid {
    /// Create an empty grid centred on the world origin.
    pub fn new(config: RollingGridConfig) -> Self {
        let [dx, dy, dz] = config.grid_dims;
        let origin = [
            -(dx as i64 / 2),
            -(dy as i64 / 2),
            -(dz as i64 / 2),
        ];
        Self {
            cells: vec![PointCloud::new(); dx * dy * dz],
            config,
            origin,
        }
    }

    #[inline]
    fn flat_index(&self, cell: [usize; 3]) -> usize {
        let [dx, dy, _] = self.config.grid_dims;
        (cell[2] * dy + cell[1]) * dx + cell[0]
    }

    /// World voxel coordinate containing a position.
    #[inline]
    fn world_voxel(&self, p: &Vector3<f64>) -> [i64; 3] {
        [
            (p.x / self.config.voxel_size).floor() as i64,
            (p.y / self.config.voxel_size).floor() as i64,
            (p.z / self.config.voxel_size).floor() as i64,
        ]
    }

    /// Grid cell of a world voxel, or `None` when outside the grid.
    fn cell_of(&self, world_voxel: [i64; 3]) -> Option<[usize; 3]> {
        let mut cell = [0usize; 3];
        for axis in 0..3 {
            let c = world_voxel[axis] - self.origin[axis];
            if c < 0 || c >= self.config.grid_dims[axis] as i64 {
                return None;
            }
            cell[axis] = c as usize;
        }
        Some(cell)
    }

    /// Insert world-frame points, bucketing them by voxel.
    ///
    /// Points outside the grid are silently dropped. Each touched voxel is
    /// re-downsampled on its intra-voxel grid afterwards, which bounds the
    /// per-voxel point count by the product of `intra_voxel_dims`.
    pub fn add(&mut self, points: &PointCloud) {
        let mut touched: Vec<usize> = Vec::new();
        for p in points.iter() {
            let Some(cell) = self.cell_of(self.world_voxel(&p.position())) else {
                continue;
            };
            let idx = self.flat_index(cell);
            self.cells[idx].push(*p);
            touched.push(idx);
        }
        touched.sort_unstable();
        touched.dedup();

        let leaf = [
            self.config.voxel_size / self.config.intra_voxel_dims[0] as f64,
            self.config.voxel_size / self.config.intra_voxel_dims[1] as f64,
            self.config.voxel_size / self.config.intra_voxel_dims[2] as f64,
        ];
        let capacity: usize = self.config.intra_voxel_dims.iter().product();
        for idx in touched {
            if self.cells[idx].len() > capacity {
                self.cells[idx] = voxel_downsample(&self.cells[idx], leaf);
            }
        }
    }

    /// Concatenate the clouds of the voxel window around `centre`
    /// (half-extent in voxels per axis), downsampled by the leaf filter.
    pub fn get(&self, centre: &Vector3<f64>, half_extent_voxels: usize) -> PointCloud {
        let centre_voxel = self.world_voxel(centre);
        let h = half_extent_voxels as i64;

        let mut out = PointCloud::new();
        for z in -h..=h {
            for y in -h..=h {
                for x in -h..=h {
                    let voxel = [
                        centre_voxel[0] + x,
                        centre_voxel[1] + y,
                        centre_voxel[2] + z,
                    ];
                    if let Some(cell) = self.cell_of(voxel) {
                        out.extend_from(&self.cells[self.flat_index(cell)]);
                    }
                }
            }
        }
        voxel_downsample(&out, [self.config.leaf_filter_size; 3])
    }

    /// Shift the grid so the sensor voxel lies inside the central third of
    /// each axis. Voxels shifted off the trailing edge are discarded.
    pub fn roll(&mut self, new_centre: &Vector3<f64>) {
        let sensor = self.world_voxel(new_centre);
        let mut shift = [0i64; 3];
        for axis in 0..3 {
            let dims = self.config.grid_dims[axis] as i64;
            let lo = dims / 3;
            let hi = dims - dims / 3;
            let c = sensor[axis] - self.origin[axis];
            if c < lo {
                shift[axis] = c - lo;
            } else if c >= hi {
                shift[axis] = c - hi + 1;
            }
        }
        if shift == [0, 0, 0] {
            return;
        }

        let [dx, dy, dz] = self.config.grid_dims;
        let mut shifted = vec![PointCloud::new(); dx * dy * dz];
        for z in 0..dz {
            for y in 0..dy {
                for x in 0..dx {
                    let src = [
                        x as i64 + shift[0],
                        y as i64 + shift[1],
                        z as i64 + shift[2],
                    ];
                    if src[0] < 0
                        || src[0] >= dx as i64
                        || src[1] < 0
                        || src[1] >= dy as i64
                        || src[2] < 0
                        || src[2] >= dz as i64
                    {
                        continue;
                    }
                    let src_idx =
                        self.flat_index([src[0] as usize, src[1] as usize, src[2] as usize]);
                    let dst_idx = self.flat_index([x, y, z]);
                    shifted[dst_idx] = std::mem::take(&mut self.cells[src_idx]);
                }
            }
        }
        self.cells = shifted;
        for axis in 0..3 {
            self.origin[axis] += shift[axis];
        }
    }

    /// Total number of stored points.
    pub fn num_points(&self) -> usize {
        self.cells.iter().map(PointCloud::len).sum()
    }

    /// Whether a position's voxel lies inside the central third per axis.
    pub fn is_in_central_block(&self, position: &Vector3<f64>) -> bool {
        let voxel = self.world_voxel(position);
        (0..3).all(|axis| {
            let dims = self.config.grid_dims[axis] as i64;
            let c = voxel[axis] - self.origin[axis];
            c >= dims / 3 && c < dims - dims / 3
        })
    }

    /// Drop all stored points, keeping the window position.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SweepPoint;

    fn test_config() -> RollingGridConfig {
        RollingGridConfig {
            voxel_size: 1.0,
            grid_dims: [9, 9, 9],
            intra_voxel_dims: [4, 4, 4],
            leaf_filter_size: 0.1,
        }
    }

    fn cloud_of(positions: &[(f64, f64, f64)]) -> PointCloud {
        positions
            .iter()
            .map(|&(x, y, z)| SweepPoint::from_position(Vector3::new(x, y, z)))
            .collect()
    }

    #[test]
    fn test_add_and_get_window() {
        let mut grid = RollingGrid::new(test_config());
        grid.add(&cloud_of(&[(0.5, 0.5, 0.5), (2.5, 0.5, 0.5), (-3.5, 0.5, 0.5)]));

        assert_eq!(grid.num_points(), 3);
        // Window of 1 voxel around the origin sees only the first point.
        let near = grid.get(&Vector3::new(0.5, 0.5, 0.5), 1);
        assert_eq!(near.len(), 1);
        // A wide window sees everything.
        let all = grid.get(&Vector3::new(0.5, 0.5, 0.5), 4);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_out_of_range_points_dropped() {
        let mut grid = RollingGrid::new(test_config());
        // Grid spans [-4, 5) voxels; 100 m is far outside.
        grid.add(&cloud_of(&[(100.0, 0.0, 0.0), (0.0, 0.0, 0.0)]));
        assert_eq!(grid.num_points(), 1);
    }

    #[test]
    fn test_per_voxel_capacity_bounded() {
        let mut grid = RollingGrid::new(test_config());
        // 1000 points inside one voxel; capacity is 4^3 = 64.
        let mut cloud = PointCloud::new();
        for i in 0..10 {
            for j in 0..10 {
                for k in 0..10 {
                    cloud.push(SweepPoint::from_position(Vector3::new(
                        0.05 * i as f64,
                        0.05 * j as f64,
                        0.05 * k as f64,
                    )));
                }
            }
        }
        grid.add(&cloud);
        assert!(grid.num_points() <= 64);
        assert!(grid.num_points() > 0);
    }

    #[test]
    fn test_get_applies_leaf_filter() {
        let mut grid = RollingGrid::new(test_config());
        grid.add(&cloud_of(&[(0.50, 0.5, 0.5), (0.52, 0.5, 0.5)]));
        // Both points stored (under capacity), but the extraction filter
        // merges them into one leaf.
        assert_eq!(grid.num_points(), 2);
        let got = grid.get(&Vector3::new(0.5, 0.5, 0.5), 1);
        assert_eq!(got.len(), 1);
    }

    #[test]
    fn test_roll_keeps_sensor_central_and_discards_trailing() {
        let mut grid = RollingGrid::new(test_config());
        grid.add(&cloud_of(&[(-3.5, 0.5, 0.5), (0.5, 0.5, 0.5)]));
        assert!(grid.is_in_central_block(&Vector3::new(0.5, 0.5, 0.5)));

        // Move the sensor along +x: the grid shifts, the trailing voxel
        // at x = -3.5 falls off while the one at x = 0.5 survives.
        let new_centre = Vector3::new(4.5, 0.5, 0.5);
        assert!(!grid.is_in_central_block(&new_centre));
        grid.roll(&new_centre);

        assert!(grid.is_in_central_block(&new_centre));
        assert_eq!(grid.num_points(), 1);
        // The surviving point is still retrievable at its world position.
        let got = grid.get(&Vector3::new(0.5, 0.5, 0.5), 1);
        assert_eq!(got.len(), 1);
        assert!((got[0].x - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_roll_noop_when_central() {
        let mut grid = RollingGrid::new(test_config());
        grid.add(&cloud_of(&[(0.5, 0.5, 0.5)]));
        grid.roll(&Vector3::new(0.9, 0.2, -0.4));
        assert_eq!(grid.num_points(), 1);
        assert!(grid.is_in_central_block(&Vector3::new(0.9, 0.2, -0.4)));
    }

    #[test]
    fn test_clear() {
        let mut grid = RollingGrid::new(test_config());
        grid.add(&cloud_of(&[(0.5, 0.5, 0.5)]));
        grid.clear();
        assert_eq!(grid.num_points(), 0);
        assert!(grid.get(&Vector3::zeros(), 3).is_empty());
    }

    #[test]
    fn test_get_empty_region_returns_empty() {
        let grid = RollingGrid::new(test_config());
        assert!(grid.get(&Vector3::new(2.0, 2.0, 2.0), 2).is_empty());
    }
}
