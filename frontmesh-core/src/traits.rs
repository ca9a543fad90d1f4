//! Core traits for frontmesh

use crate::point::*;

/// Trait for nearest neighbor search functionality
pub trait NearestNeighborSearch {
    /// Find the k nearest neighbors to a query point, closest first
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)>;

    /// Find all neighbors within a given radius
    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)>;

    /// Number of indexed points
    fn len(&self) -> usize;

    /// Whether the index holds no points
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
