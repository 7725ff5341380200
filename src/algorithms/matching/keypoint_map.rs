//! Neighbor source for the match-and-solve kernel.
//!
//! Wraps the reference-side keypoint clouds (previous sweep or rolling-map
//! submap) behind k-d trees. Queries are read-only and safe to issue from
//! parallel match workers.

use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Vector3;

use crate::core::types::PointCloud;

/// One nearest-neighbor query result.
#[derive(Debug, Clone, Copy)]
pub struct Neighbor {
    /// Index into the queried cloud.
    pub index: usize,
    /// Squared Euclidean distance to the query point.
    pub distance_sq: f64,
}

/// Reference keypoint clouds with k-d trees over edges, planars and blobs.
pub struct KeypointMap {
    edges: PointCloud,
    planars: PointCloud,
    blobs: PointCloud,
    edges_tree: Option<KdTree<f64, 3>>,
    planars_tree: Option<KdTree<f64, 3>>,
    blobs_tree: Option<KdTree<f64, 3>>,
}

impl KeypointMap {
    /// Build trees over the given clouds. Empty clouds get no tree.
    pub fn build(edges: PointCloud, planars: PointCloud, blobs: PointCloud) -> Self {
        let edges_tree = Self::build_tree(&edges);
        let planars_tree = Self::build_tree(&planars);
        let blobs_tree = Self::build_tree(&blobs);
        Self {
            edges,
            planars,
            blobs,
            edges_tree,
            planars_tree,
            blobs_tree,
        }
    }

    fn build_tree(cloud: &PointCloud) -> Option<KdTree<f64, 3>> {
        if cloud.is_empty() {
            return None;
        }
        let mut tree: KdTree<f64, 3> = KdTree::new();
        for (i, p) in cloud.iter().enumerate() {
            tree.add(&[p.x, p.y, p.z], i as u64);
        }
        Some(tree)
    }

    #[inline]
    pub fn edges(&self) -> &PointCloud {
        &self.edges
    }

    #[inline]
    pub fn planars(&self) -> &PointCloud {
        &self.planars
    }

    #[inline]
    pub fn blobs(&self) -> &PointCloud {
        &self.blobs
    }

    /// K nearest edge keypoints to a query position.
    pub fn nearest_edges(&self, query: &Vector3<f64>, k: usize) -> Vec<Neighbor> {
        Self::nearest(&self.edges_tree, query, k)
    }

    /// K nearest planar keypoints to a query position.
    pub fn nearest_planars(&self, query: &Vector3<f64>, k: usize) -> Vec<Neighbor> {
        Self::nearest(&self.planars_tree, query, k)
    }

    /// K nearest blob keypoints to a query position.
    pub fn nearest_blobs(&self, query: &Vector3<f64>, k: usize) -> Vec<Neighbor> {
        Self::nearest(&self.blobs_tree, query, k)
    }

    fn nearest(tree: &Option<KdTree<f64, 3>>, query: &Vector3<f64>, k: usize) -> Vec<Neighbor> {
        let Some(tree) = tree else {
            return Vec::new();
        };
        tree.nearest_n::<SquaredEuclidean>(&[query.x, query.y, query.z], k)
            .into_iter()
            .map(|n| Neighbor {
                index: n.item as usize,
                distance_sq: n.distance,
            })
            .collect()
    }
}
