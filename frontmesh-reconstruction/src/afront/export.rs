//! Mesh output, viewpoint orientation and inset export

use super::AfrontMesher;
use crate::halfedge::VertexId;
use frontmesh_core::{
    Error, NearestNeighborSearch, NormalPoint3f, NormalPointCloud3f, Point3f, Result, TriangleMesh, Vector3f,
};
use log::{debug, info};
use std::collections::HashSet;

/// Mesh vertices consulted when the view ray only meets the input cloud
const VIEW_FALLBACK_NEIGHBORS: usize = 5;

/// Mesh oriented for a viewer
#[derive(Debug, Clone)]
pub struct ViewOrientation {
    /// Whether normals and winding were reversed
    pub flipped: bool,
    pub mesh: TriangleMesh,
}

impl AfrontMesher {
    /// Current mesh with per-vertex normals
    pub fn mesh(&self) -> TriangleMesh {
        let vertices = self.mesh.vertices().map(|(_, v)| v.position).collect();
        let faces = self
            .mesh
            .face_ids()
            .map(|f| self.mesh.face_vertices(f).map(VertexId::index))
            .collect();

        let mut mesh = TriangleMesh::from_vertices_and_faces(vertices, faces);
        mesh.set_normals(self.mesh.vertices().map(|(_, v)| v.normal).collect());
        mesh
    }

    /// Mesh vertices with their normals
    pub fn vertex_normals(&self) -> NormalPointCloud3f {
        self.mesh
            .vertices()
            .map(|(_, v)| NormalPoint3f::new(v.position, v.normal))
            .collect()
    }

    /// Orient the finished mesh so its normals face a viewer
    ///
    /// The mesh vertex nearest the eye along the view ray decides: when the
    /// view direction and its normal point the same way, every normal is
    /// negated and every face rewound.
    pub fn orient_from_viewpoint(&self, eye: &Point3f, direction: &Vector3f) -> Result<ViewOrientation> {
        if !self.initialized {
            return Err(Error::NotInitialized);
        }
        if !self.finished {
            return Err(Error::Algorithm("reconstruction has not finished".to_string()));
        }
        let direction = direction
            .try_normalize(f32::EPSILON)
            .ok_or_else(|| Error::InvalidData("view direction is zero".to_string()))?;

        let vertex = self
            .vertex_from_viewpoint(eye, &direction)
            .ok_or_else(|| Error::Algorithm("view ray meets neither the mesh nor the input cloud".to_string()))?;
        let data = self.mesh.vertex(vertex);
        let alignment = direction.dot(&data.normal.try_normalize(f32::EPSILON).unwrap_or_else(Vector3f::zeros));
        debug!(
            "Orienting from vertex {:?} at ({}, {}, {}), alignment {}",
            vertex, data.position.x, data.position.y, data.position.z, alignment
        );

        let mesh = self.mesh();
        if alignment < 0.0 {
            info!("View direction opposes the mesh normal; keeping orientation");
            Ok(ViewOrientation { flipped: false, mesh })
        } else {
            info!("View direction agrees with the mesh normal; reorienting");
            Ok(ViewOrientation {
                flipped: true,
                mesh: mesh.flipped(),
            })
        }
    }

    fn vertex_from_viewpoint(&self, eye: &Point3f, direction: &Vector3f) -> Option<VertexId> {
        let radius = self.config.search_radius;
        let mut candidates: Vec<usize> = self
            .vertex_index
            .along_ray(eye, direction, radius)
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        if candidates.is_empty() {
            let (hit, _) = self.guidance.input_index().along_ray(eye, direction, 2.0 * radius).into_iter().next()?;
            debug!("View ray missed the mesh; using input point {}", hit);
            candidates = self
                .vertex_index
                .find_k_nearest(&self.input[hit], VIEW_FALLBACK_NEIGHBORS)
                .into_iter()
                .map(|(id, _)| id)
                .collect();
        }

        candidates
            .into_iter()
            .min_by(|&a, &b| {
                let da = (self.mesh.vertex(VertexId(a)).position - eye).norm_squared();
                let db = (self.mesh.vertex(VertexId(b)).position - eye).norm_squared();
                da.total_cmp(&db).then(a.cmp(&b))
            })
            .map(VertexId)
    }

    /// Mesh without the given vertices
    ///
    /// Faces touching a removed vertex go too, as do vertices left without
    /// any face. Remaining vertices keep their relative order.
    pub fn inset_mesh(&self, removed: &[VertexId], flip: bool) -> TriangleMesh {
        let removed: HashSet<VertexId> = removed.iter().copied().collect();

        let mut used = vec![false; self.mesh.vertex_count()];
        let kept: Vec<[VertexId; 3]> = self
            .mesh
            .face_ids()
            .map(|f| self.mesh.face_vertices(f))
            .filter(|corners| corners.iter().all(|v| !removed.contains(v)))
            .inspect(|corners| corners.iter().for_each(|v| used[v.index()] = true))
            .collect();

        let mut remap = vec![usize::MAX; self.mesh.vertex_count()];
        let mut vertices = Vec::new();
        let mut normals = Vec::new();
        for (vi, data) in self.mesh.vertices() {
            if used[vi.index()] {
                remap[vi.index()] = vertices.len();
                vertices.push(data.position);
                normals.push(data.normal);
            }
        }

        let faces = kept.iter().map(|corners| corners.map(|v| remap[v.index()])).collect();
        let mut mesh = TriangleMesh::from_vertices_and_faces(vertices, faces);
        mesh.set_normals(normals);

        if flip {
            mesh.flipped()
        } else {
            mesh
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AfrontConfig, SeedSelection};
    use frontmesh_core::PointCloud3f;

    fn reconstructed_plane() -> AfrontMesher {
        let cloud: PointCloud3f = (0..12)
            .flat_map(|i| (0..12).map(move |j| Point3f::new(i as f32 * 0.1, j as f32 * 0.1, 0.0)))
            .collect();
        let config = AfrontConfig::new(0.25).with_seed(SeedSelection::Nearest(Point3f::new(0.55, 0.55, 0.0)));
        let mut mesher = AfrontMesher::new(&cloud, config);
        mesher.reconstruct().unwrap();
        mesher
    }

    #[test]
    fn test_mesh_carries_vertex_normals() {
        let mesher = reconstructed_plane();
        let mesh = mesher.mesh();

        assert_eq!(mesh.vertex_count(), mesher.half_edge_mesh().vertex_count());
        assert_eq!(mesh.face_count(), mesher.half_edge_mesh().face_count());
        assert_eq!(mesh.normals.as_ref().map(Vec::len), Some(mesh.vertex_count()));
        assert_eq!(mesher.vertex_normals().len(), mesh.vertex_count());
    }

    #[test]
    fn test_orientation_faces_the_viewer() {
        let mesher = reconstructed_plane();
        let oriented = mesher
            .orient_from_viewpoint(&Point3f::new(0.55, 0.55, 5.0), &Vector3f::new(0.0, 0.0, -1.0))
            .unwrap();

        let normals = oriented.mesh.normals.as_ref().unwrap();
        assert!(normals.iter().all(|n| n.z > 0.0));
        assert!(oriented.mesh.calculate_face_normals().iter().all(|n| n.z > 0.0));

        // looking from the other side gives the opposite answer
        let reverse = mesher
            .orient_from_viewpoint(&Point3f::new(0.55, 0.55, -5.0), &Vector3f::new(0.0, 0.0, 1.0))
            .unwrap();
        assert_ne!(reverse.flipped, oriented.flipped);
    }

    #[test]
    fn test_orientation_needs_finished_mesh() {
        let cloud: PointCloud3f = (0..8)
            .flat_map(|i| (0..8).map(move |j| Point3f::new(i as f32 * 0.1, j as f32 * 0.1, 0.0)))
            .collect();
        let mesher = AfrontMesher::new(&cloud, AfrontConfig::new(0.25));
        let result = mesher.orient_from_viewpoint(&Point3f::new(0.0, 0.0, 1.0), &Vector3f::new(0.0, 0.0, -1.0));
        assert!(matches!(result, Err(Error::NotInitialized)));
    }

    #[test]
    fn test_inset_drops_faces_and_compacts() {
        let mesher = reconstructed_plane();
        let full = mesher.mesh();
        let target = VertexId(0);
        let touching = full.faces.iter().filter(|f| f.contains(&target.index())).count();
        assert!(touching > 0);

        let inset = mesher.inset_mesh(&[target], false);
        assert_eq!(inset.face_count(), full.face_count() - touching);
        assert!(inset.vertex_count() < full.vertex_count());
        assert!(inset.faces.iter().flatten().all(|&i| i < inset.vertex_count()));

        let flipped = mesher.inset_mesh(&[target], true);
        assert_eq!(flipped.faces[0], [inset.faces[0][0], inset.faces[0][2], inset.faces[0][1]]);
    }
}
