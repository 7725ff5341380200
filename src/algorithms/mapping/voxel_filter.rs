//! Leaf voxel downsampling.

use std::collections::HashMap;

use crate::core::types::{PointCloud, SweepPoint};

/// Downsample a cloud on a leaf grid: one point per occupied leaf cell, at
/// the centroid of the cell's points, averaging intensity and keeping the
/// scan line and time of the first point seen in the cell.
///
/// Output order follows first occupancy, so the result is deterministic for
/// a given input order.
pub fn voxel_downsample(cloud: &PointCloud, leaf: [f64; 3]) -> PointCloud {
    if cloud.is_empty() {
        return PointCloud::new();
    }

    struct Accum {
        x: f64,
        y: f64,
        z: f64,
        intensity: f64,
        count: usize,
        first: SweepPoint,
    }

    let mut index: HashMap<[i64; 3], usize> = HashMap::new();
    let mut cells: Vec<Accum> = Vec::new();

    for p in cloud.iter() {
        let key = [
            (p.x / leaf[0]).floor() as i64,
            (p.y / leaf[1]).floor() as i64,
            (p.z / leaf[2]).floor() as i64,
        ];
        let slot = *index.entry(key).or_insert_with(|| {
            cells.push(Accum {
                x: 0.0,
                y: 0.0,
                z: 0.0,
                intensity: 0.0,
                count: 0,
                first: *p,
            });
            cells.len() - 1
        });
        let acc = &mut cells[slot];
        acc.x += p.x;
        acc.y += p.y;
        acc.z += p.z;
        acc.intensity += p.intensity;
        acc.count += 1;
    }

    cells
        .into_iter()
        .map(|acc| {
            let n = acc.count as f64;
            SweepPoint {
                x: acc.x / n,
                y: acc.y / n,
                z: acc.z / n,
                intensity: acc.intensity / n,
                scan_line: acc.first.scan_line,
                time_fraction: acc.first.time_fraction,
            }
        })
        .collect()
}
