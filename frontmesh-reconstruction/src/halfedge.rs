//! Half-edge mesh topology store
//!
//! Vertices, half-edges and faces live in growable arenas addressed by typed
//! indices. Half-edges are allocated in pairs, so the opposite of half-edge `i`
//! is always `i ^ 1`. A half-edge without a face is a boundary half-edge.
//!
//! Every vertex keeps the full list of its outgoing half-edges rather than a
//! single representative, which lets the mesh carry non-manifold vertices
//! (two fans touching at one point) while still rejecting non-manifold edges.

use std::collections::HashMap;
use thiserror::Error;

/// Index of a vertex in the mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(pub usize);

/// Index of a half-edge in the mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HalfEdgeId(pub usize);

/// Index of a face in the mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FaceId(pub usize);

impl VertexId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

impl HalfEdgeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

impl FaceId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Reasons a face cannot be added
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyError {
    #[error("vertex {0:?} does not exist")]
    InvalidVertex(VertexId),

    #[error("face repeats vertex {0:?}")]
    DegenerateFace(VertexId),

    #[error("edge {0:?} -> {1:?} already has a face on this side")]
    NonManifoldEdge(VertexId, VertexId),
}

#[derive(Debug, Clone, Copy)]
struct HalfEdgeRecord {
    origin: VertexId,
    face: Option<FaceId>,
    next: Option<HalfEdgeId>,
    prev: Option<HalfEdgeId>,
}

#[derive(Debug, Clone)]
struct FaceRecord<F> {
    data: F,
    halfedge: HalfEdgeId,
}

/// Triangle mesh with half-edge adjacency and per-element payloads
#[derive(Debug, Clone)]
pub struct HalfEdgeMesh<V, F> {
    vertices: Vec<V>,
    outgoing: Vec<Vec<HalfEdgeId>>,
    halfedges: Vec<HalfEdgeRecord>,
    faces: Vec<FaceRecord<F>>,
    edge_lookup: HashMap<(VertexId, VertexId), HalfEdgeId>,
}

impl<V, F> Default for HalfEdgeMesh<V, F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, F> HalfEdgeMesh<V, F> {
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            outgoing: Vec::new(),
            halfedges: Vec::new(),
            faces: Vec::new(),
            edge_lookup: HashMap::new(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn half_edge_count(&self) -> usize {
        self.halfedges.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn add_vertex(&mut self, data: V) -> VertexId {
        self.vertices.push(data);
        self.outgoing.push(Vec::new());
        VertexId(self.vertices.len() - 1)
    }

    pub fn vertex(&self, v: VertexId) -> &V {
        &self.vertices[v.0]
    }

    pub fn vertex_mut(&mut self, v: VertexId) -> &mut V {
        &mut self.vertices[v.0]
    }

    pub fn vertices(&self) -> impl Iterator<Item = (VertexId, &V)> + '_ {
        self.vertices.iter().enumerate().map(|(i, v)| (VertexId(i), v))
    }

    pub fn face_data(&self, f: FaceId) -> &F {
        &self.faces[f.0].data
    }

    pub fn face_ids(&self) -> impl Iterator<Item = FaceId> + '_ {
        (0..self.faces.len()).map(FaceId)
    }

    pub fn half_edge_ids(&self) -> impl Iterator<Item = HalfEdgeId> + '_ {
        (0..self.halfedges.len()).map(HalfEdgeId)
    }

    /// Check that `(v0, v1, v2)` could be added as a face without mutating anything
    pub fn check_face(&self, v0: VertexId, v1: VertexId, v2: VertexId) -> Result<(), TopologyError> {
        let corners = [v0, v1, v2];
        for v in corners {
            if v.0 >= self.vertices.len() {
                return Err(TopologyError::InvalidVertex(v));
            }
        }
        if v0 == v1 || v0 == v2 {
            return Err(TopologyError::DegenerateFace(v0));
        }
        if v1 == v2 {
            return Err(TopologyError::DegenerateFace(v1));
        }
        for i in 0..3 {
            let (a, b) = (corners[i], corners[(i + 1) % 3]);
            if let Some(he) = self.find_half_edge(a, b) {
                if self.halfedges[he.0].face.is_some() {
                    return Err(TopologyError::NonManifoldEdge(a, b));
                }
            }
        }
        Ok(())
    }

    /// Add a face wound `v0 -> v1 -> v2`
    ///
    /// A rejected face leaves the mesh unchanged.
    pub fn add_face(&mut self, v0: VertexId, v1: VertexId, v2: VertexId, data: F) -> Result<FaceId, TopologyError> {
        self.check_face(v0, v1, v2)?;

        let face = FaceId(self.faces.len());
        let corners = [v0, v1, v2];
        let ring: [HalfEdgeId; 3] = [
            self.half_edge_or_insert(corners[0], corners[1]),
            self.half_edge_or_insert(corners[1], corners[2]),
            self.half_edge_or_insert(corners[2], corners[0]),
        ];

        for i in 0..3 {
            let record = &mut self.halfedges[ring[i].0];
            record.face = Some(face);
            record.next = Some(ring[(i + 1) % 3]);
            record.prev = Some(ring[(i + 2) % 3]);
        }

        self.faces.push(FaceRecord {
            data,
            halfedge: ring[0],
        });
        Ok(face)
    }

    /// Add a vertex and a face `v0 -> v1 -> new` in one go
    ///
    /// The face is validated before the vertex is created, so a rejected face
    /// leaves no isolated vertex behind.
    pub fn add_face_with_new_vertex(
        &mut self,
        v0: VertexId,
        v1: VertexId,
        vertex: V,
        data: F,
    ) -> Result<(VertexId, FaceId), TopologyError> {
        for v in [v0, v1] {
            if v.0 >= self.vertices.len() {
                return Err(TopologyError::InvalidVertex(v));
            }
        }
        if v0 == v1 {
            return Err(TopologyError::DegenerateFace(v0));
        }
        if let Some(he) = self.find_half_edge(v0, v1) {
            if self.halfedges[he.0].face.is_some() {
                return Err(TopologyError::NonManifoldEdge(v0, v1));
            }
        }

        let vi = self.add_vertex(vertex);
        let face = self.add_face(v0, v1, vi, data)?;
        Ok((vi, face))
    }

    fn half_edge_or_insert(&mut self, a: VertexId, b: VertexId) -> HalfEdgeId {
        if let Some(he) = self.find_half_edge(a, b) {
            return he;
        }
        let forward = HalfEdgeId(self.halfedges.len());
        let backward = HalfEdgeId(forward.0 + 1);
        for origin in [a, b] {
            self.halfedges.push(HalfEdgeRecord {
                origin,
                face: None,
                next: None,
                prev: None,
            });
        }
        self.edge_lookup.insert((a, b), forward);
        self.edge_lookup.insert((b, a), backward);
        self.outgoing[a.0].push(forward);
        self.outgoing[b.0].push(backward);
        forward
    }

    /// Directed half-edge from `a` to `b`, if the edge exists
    pub fn find_half_edge(&self, a: VertexId, b: VertexId) -> Option<HalfEdgeId> {
        self.edge_lookup.get(&(a, b)).copied()
    }

    #[inline]
    pub fn opposite(&self, he: HalfEdgeId) -> HalfEdgeId {
        HalfEdgeId(he.0 ^ 1)
    }

    /// Next half-edge around the owning face; `None` on the boundary
    pub fn next(&self, he: HalfEdgeId) -> Option<HalfEdgeId> {
        self.halfedges[he.0].next
    }

    /// Previous half-edge around the owning face; `None` on the boundary
    pub fn prev(&self, he: HalfEdgeId) -> Option<HalfEdgeId> {
        self.halfedges[he.0].prev
    }

    pub fn origin_vertex(&self, he: HalfEdgeId) -> VertexId {
        self.halfedges[he.0].origin
    }

    pub fn terminating_vertex(&self, he: HalfEdgeId) -> VertexId {
        self.halfedges[self.opposite(he).0].origin
    }

    pub fn face(&self, he: HalfEdgeId) -> Option<FaceId> {
        self.halfedges[he.0].face
    }

    /// Face on the other side of the edge
    pub fn opposite_face(&self, he: HalfEdgeId) -> Option<FaceId> {
        self.face(self.opposite(he))
    }

    pub fn is_boundary(&self, he: HalfEdgeId) -> bool {
        self.halfedges[he.0].face.is_none()
    }

    /// The faceless side of the edge containing `he`, if it has one
    pub fn boundary_side(&self, he: HalfEdgeId) -> Option<HalfEdgeId> {
        if self.is_boundary(he) {
            Some(he)
        } else if self.is_boundary(self.opposite(he)) {
            Some(self.opposite(he))
        } else {
            None
        }
    }

    /// Whether any edge at `v` lacks a face on one side
    pub fn is_boundary_vertex(&self, v: VertexId) -> bool {
        self.outgoing[v.0]
            .iter()
            .any(|&he| self.is_boundary(he) || self.is_boundary(self.opposite(he)))
    }

    /// Outgoing half-edges of `v` in creation order
    pub fn outgoing_half_edges(&self, v: VertexId) -> &[HalfEdgeId] {
        &self.outgoing[v.0]
    }

    /// The three half-edges of a face, starting from its first edge
    pub fn face_half_edges(&self, f: FaceId) -> [HalfEdgeId; 3] {
        let first = self.faces[f.0].halfedge;
        let mut ring = [first; 3];
        let mut he = first;
        for slot in ring.iter_mut().skip(1) {
            // faced half-edges always have a successor
            he = self.halfedges[he.0].next.unwrap_or(first);
            *slot = he;
        }
        ring
    }

    pub fn face_vertices(&self, f: FaceId) -> [VertexId; 3] {
        self.face_half_edges(f).map(|he| self.origin_vertex(he))
    }
}
