//! Mesh data structures and functionality

use crate::point::*;
use serde::{Deserialize, Serialize};

/// A triangle mesh with vertices and faces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3f>,
    pub faces: Vec<[usize; 3]>,
    pub normals: Option<Vec<Vector3f>>,
}

impl TriangleMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
            normals: None,
        }
    }

    /// Create a mesh from vertices and faces
    pub fn from_vertices_and_faces(vertices: Vec<Point3f>, faces: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            faces,
            normals: None,
        }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Calculate face normals from the winding order
    pub fn calculate_face_normals(&self) -> Vec<Vector3f> {
        self.faces
            .iter()
            .map(|face| {
                let v0 = self.vertices[face[0]];
                let v1 = self.vertices[face[1]];
                let v2 = self.vertices[face[2]];

                let edge1 = v1 - v0;
                let edge2 = v2 - v0;

                edge1.cross(&edge2).normalize()
            })
            .collect()
    }

    /// Set vertex normals
    pub fn set_normals(&mut self, normals: Vec<Vector3f>) {
        if normals.len() == self.vertices.len() {
            self.normals = Some(normals);
        }
    }

    /// Lengths of every face edge, three per face
    pub fn edge_lengths(&self) -> Vec<f32> {
        self.faces
            .iter()
            .flat_map(|face| {
                (0..3).map(move |i| (self.vertices[face[(i + 1) % 3]] - self.vertices[face[i]]).norm())
            })
            .collect()
    }

    /// Copy of the mesh with the winding of every face reversed and the
    /// vertex normals negated
    pub fn flipped(&self) -> Self {
        Self {
            vertices: self.vertices.clone(),
            faces: self.faces.iter().map(|f| [f[0], f[2], f[1]]).collect(),
            normals: self
                .normals
                .as_ref()
                .map(|normals| normals.iter().map(|n| -n).collect()),
        }
    }
}

impl Default for TriangleMesh {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_triangle() -> TriangleMesh {
        let mut mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2]],
        );
        mesh.set_normals(vec![Vector3f::z(); 3]);
        mesh
    }

    #[test]
    fn test_face_normal_follows_winding() {
        let mesh = unit_triangle();
        let normals = mesh.calculate_face_normals();
        assert_relative_eq!(normals[0].z, 1.0);
    }

    #[test]
    fn test_flipped_reverses_winding_and_normals() {
        let mesh = unit_triangle().flipped();
        assert_eq!(mesh.faces[0], [0, 2, 1]);
        assert_relative_eq!(mesh.calculate_face_normals()[0].z, -1.0);
        assert!(mesh.normals.unwrap().iter().all(|n| n.z < 0.0));
    }

    #[test]
    fn test_edge_lengths() {
        let lengths = unit_triangle().edge_lengths();
        assert_eq!(lengths.len(), 3);
        assert_relative_eq!(lengths[0], 1.0);
        assert_relative_eq!(lengths[1], 2.0f32.sqrt());
        assert_relative_eq!(lengths[2], 1.0);
    }

    #[test]
    fn test_normals_rejected_on_length_mismatch() {
        let mut mesh = unit_triangle();
        mesh.normals = None;
        mesh.set_normals(vec![Vector3f::z(); 2]);
        assert!(mesh.normals.is_none());
    }
}
