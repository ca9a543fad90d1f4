//! Spatial indices over guidance samples and mesh vertices
//!
//! Both indices are R*-trees of positions tagged with their index in the
//! owning collection. Radius queries come back sorted by distance, which the
//! max-step search and the proximity checks depend on.

use frontmesh_core::{NearestNeighborSearch, Point3f, Vector3f};
use rstar::primitives::GeomWithData;
use rstar::{RTree, SelectionFunction, AABB};

type IndexedPoint = GeomWithData<[f32; 3], usize>;

fn to_array(p: &Point3f) -> [f32; 3] {
    [p.x, p.y, p.z]
}

fn k_nearest(tree: &RTree<IndexedPoint>, query: &Point3f, k: usize) -> Vec<(usize, f32)> {
    tree.nearest_neighbor_iter_with_distance_2(&to_array(query))
        .take(k)
        .map(|(p, d2)| (p.data, d2.sqrt()))
        .collect()
}

fn within_radius(tree: &RTree<IndexedPoint>, query: &Point3f, radius: f32) -> Vec<(usize, f32)> {
    let r2 = radius * radius;
    tree.nearest_neighbor_iter_with_distance_2(&to_array(query))
        .take_while(|(_, d2)| *d2 <= r2)
        .map(|(p, d2)| (p.data, d2.sqrt()))
        .collect()
}

/// Bulk-loaded index over a fixed set of points
#[derive(Clone)]
pub struct StaticPointIndex {
    tree: RTree<IndexedPoint>,
}

impl StaticPointIndex {
    /// Build the index; point `i` is reported as index `i`
    pub fn build(points: &[Point3f]) -> Self {
        let items = points
            .iter()
            .enumerate()
            .map(|(i, p)| IndexedPoint::new(to_array(p), i))
            .collect();
        Self {
            tree: RTree::bulk_load(items),
        }
    }

    /// Closest point and its distance
    pub fn nearest(&self, query: &Point3f) -> Option<(usize, f32)> {
        k_nearest(&self.tree, query, 1).into_iter().next()
    }

    /// All points within `radius`, closest first
    pub fn radius_search(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)> {
        within_radius(&self.tree, query, radius)
    }

    /// Points within `tolerance` of the half-line from `origin` along `direction`,
    /// ordered by distance along the ray
    pub fn along_ray(&self, origin: &Point3f, direction: &Vector3f, tolerance: f32) -> Vec<(usize, f32)> {
        ray_query(&self.tree, origin, direction, tolerance)
    }
}

impl NearestNeighborSearch for StaticPointIndex {
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)> {
        k_nearest(&self.tree, query, k)
    }

    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)> {
        self.radius_search(query, radius)
    }

    fn len(&self) -> usize {
        self.tree.size()
    }
}

/// Append-only index over mesh vertices
#[derive(Clone)]
pub struct IncrementalPointIndex {
    tree: RTree<IndexedPoint>,
}

impl IncrementalPointIndex {
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    /// Add a point tagged with `id`
    pub fn insert(&mut self, point: &Point3f, id: usize) {
        self.tree.insert(IndexedPoint::new(to_array(point), id));
    }

    /// All points within `radius`, closest first
    pub fn radius_search(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)> {
        within_radius(&self.tree, query, radius)
    }

    /// Points within `tolerance` of the half-line from `origin` along `direction`,
    /// ordered by distance along the ray
    pub fn along_ray(&self, origin: &Point3f, direction: &Vector3f, tolerance: f32) -> Vec<(usize, f32)> {
        ray_query(&self.tree, origin, direction, tolerance)
    }
}

impl Default for IncrementalPointIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl NearestNeighborSearch for IncrementalPointIndex {
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)> {
        k_nearest(&self.tree, query, k)
    }

    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)> {
        self.radius_search(query, radius)
    }

    fn len(&self) -> usize {
        self.tree.size()
    }
}

/// Selects tree nodes whose bounds, grown by the tolerance, meet a half-line
#[derive(Clone)]
struct RaySelection {
    origin: [f32; 3],
    direction: [f32; 3],
    tolerance: f32,
}

impl RaySelection {
    fn hits_box(&self, lower: [f32; 3], upper: [f32; 3]) -> bool {
        let mut t_min = 0.0f32;
        let mut t_max = f32::INFINITY;
        for axis in 0..3 {
            let lo = lower[axis] - self.tolerance;
            let hi = upper[axis] + self.tolerance;
            let o = self.origin[axis];
            let d = self.direction[axis];
            if d.abs() < 1e-12 {
                if o < lo || o > hi {
                    return false;
                }
                continue;
            }
            let mut t0 = (lo - o) / d;
            let mut t1 = (hi - o) / d;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return false;
            }
        }
        true
    }

    /// Parameter along the ray and distance from it
    fn ray_coordinates(&self, p: &[f32; 3]) -> (f32, f32) {
        let delta = [
            p[0] - self.origin[0],
            p[1] - self.origin[1],
            p[2] - self.origin[2],
        ];
        let t = delta[0] * self.direction[0] + delta[1] * self.direction[1] + delta[2] * self.direction[2];
        let t_clamped = t.max(0.0);
        let off = [
            delta[0] - t_clamped * self.direction[0],
            delta[1] - t_clamped * self.direction[1],
            delta[2] - t_clamped * self.direction[2],
        ];
        (t, (off[0] * off[0] + off[1] * off[1] + off[2] * off[2]).sqrt())
    }
}

impl SelectionFunction<IndexedPoint> for RaySelection {
    fn should_unpack_parent(&self, envelope: &AABB<[f32; 3]>) -> bool {
        self.hits_box(envelope.lower(), envelope.upper())
    }

    fn should_unpack_leaf(&self, leaf: &IndexedPoint) -> bool {
        self.ray_coordinates(leaf.geom()).1 <= self.tolerance
    }
}

fn ray_query(
    tree: &RTree<IndexedPoint>,
    origin: &Point3f,
    direction: &Vector3f,
    tolerance: f32,
) -> Vec<(usize, f32)> {
    let Some(dir) = direction.try_normalize(f32::EPSILON) else {
        return Vec::new();
    };
    let selection = RaySelection {
        origin: to_array(origin),
        direction: [dir.x, dir.y, dir.z],
        tolerance,
    };
    let mut hits: Vec<(usize, f32)> = tree
        .locate_with_selection_function(selection.clone())
        .map(|p| (p.data, selection.ray_coordinates(p.geom()).0))
        .collect();
    hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    hits
}
