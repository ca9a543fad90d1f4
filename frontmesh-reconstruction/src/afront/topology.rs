//! Mesh mutations and front bookkeeping

use super::predict::PredictedVertex;
use super::{AdvancingFront, AfrontMesher, CutEarData, DeferReason, MeshFace, MeshVertex, StepOutcome};
use crate::geometry::{align_normal, mid_point, TriangleCandidate};
use crate::halfedge::{FaceId, VertexId};
use frontmesh_core::{Error, NearestNeighborSearch, Point3f, Result};
use log::debug;

/// Samples tried when looking for the seed edge direction
const SEED_NEIGHBORS: usize = 16;

/// Smallest tangential offset to a seed neighbour, relative to the search radius
const SEED_TANGENT_FRACTION: f32 = 0.05;

impl AfrontMesher {
    /// Place the seed triangle around guidance sample `seed`
    ///
    /// The first edge runs from the seed towards its nearest sample, projected
    /// into the seed's tangent plane and sized by the seed's max step. Samples
    /// lying along the normal are passed over. The apex sits over the edge
    /// midpoint, perpendicular to the edge within the tangent plane.
    pub(super) fn create_first_triangle(&mut self, seed: usize) -> Result<()> {
        let guidance = &self.guidance;
        let s1 = guidance.sample_point(&guidance.samples()[seed].position);
        let p1 = s1.point;
        let mut r1 = self.config.search_radius;
        let ms1 = guidance.max_step(&p1, &mut r1);
        if ms1 >= f32::MAX {
            return Err(Error::Algorithm("no max step could be resolved at the seed".to_string()));
        }

        // first nearby sample with a usable offset in the seed's tangent plane
        let n1 = s1.normal;
        let min_offset = SEED_TANGENT_FRACTION * self.config.search_radius;
        let v1 = guidance
            .find_k_nearest(&p1, SEED_NEIGHBORS)
            .into_iter()
            .find_map(|(k, _)| {
                let d = guidance.samples()[k].position - p1;
                let tangent = d - n1 * n1.dot(&d);
                (tangent.norm() > min_offset).then(|| tangent.normalize())
            })
            .ok_or_else(|| Error::Algorithm("no sample near the seed spans its tangent plane".to_string()))?;

        let s2 = guidance.sample_point(&(p1 + v1 * ms1));
        let p2 = s2.point;
        let mut r2 = r1 + ms1;
        let ms2 = guidance.max_step(&p2, &mut r2);

        let d = (p2 - p1).norm();
        let v2 = n1.cross(&v1).normalize();
        let ms = ms1.min(ms2);
        let mut height = (ms * ms - 0.25 * d * d).sqrt();
        if !height.is_finite() {
            height = 0.5 * 3.0f32.sqrt() * d;
        }

        let s3 = guidance.sample_point(&(mid_point(&p1, &p2) + v2 * height));
        let p3 = s3.point;
        let mut r3 = r1.max(r2) + ms;
        let ms3 = guidance.max_step(&p3, &mut r3);

        let n2 = align_normal(&s2.normal, &n1);
        let n3 = align_normal(&s3.normal, &n1);
        let cross = (p2 - p1).cross(&(p3 - p1));
        let normal = cross
            .try_normalize(f32::EPSILON)
            .ok_or_else(|| Error::Algorithm("seed triangle is degenerate".to_string()))?;
        let face = MeshFace {
            center: Point3f::from((p1.coords + p2.coords + p3.coords) / 3.0),
            normal: align_normal(&normal, &n1),
        };

        let a = self.mesh.add_vertex(MeshVertex {
            position: p1,
            normal: n1,
            max_step: ms1,
            max_step_search_radius: r1,
        });
        let b = self.mesh.add_vertex(MeshVertex {
            position: p2,
            normal: n2,
            max_step: ms2,
            max_step_search_radius: r2,
        });
        let c = self.mesh.add_vertex(MeshVertex {
            position: p3,
            normal: n3,
            max_step: ms3,
            max_step_search_radius: r3,
        });

        // wind the seed so its geometric normal agrees with the surface normal
        let corners = if normal.dot(&n1) >= 0.0 { [a, b, c] } else { [a, c, b] };
        let fi = self
            .mesh
            .add_face(corners[0], corners[1], corners[2], face)
            .map_err(|e| Error::Algorithm(format!("failed to add seed triangle: {}", e)))?;

        for v in [a, b, c] {
            let position = self.mesh.vertex(v).position;
            self.vertex_index.insert(&position, v.index());
        }
        self.max_edge_length = d.max((p3 - p1).norm()).max((p3 - p2).norm());
        self.reconcile(fi);

        debug!("Seed triangle {:?} with max steps {}, {}, {}", fi, ms1, ms2, ms3);
        Ok(())
    }

    /// Add a new vertex at the predicted position and a face to it
    pub(super) fn grow(&mut self, afront: &AdvancingFront, predicted: &PredictedVertex) -> StepOutcome {
        let front = &afront.front;
        let mut radius = front.max_step_search_radius;
        let max_step = self.guidance.max_step(&predicted.tri.apex(), &mut radius);
        let vertex = MeshVertex {
            position: predicted.sample.point,
            normal: predicted.sample.normal,
            max_step,
            max_step_search_radius: radius,
        };

        match self
            .mesh
            .add_face_with_new_vertex(front.vi[0], front.vi[1], vertex, MeshFace::from_candidate(&predicted.tri))
        {
            Ok((vi, face)) => {
                self.vertex_index.insert(&vertex.position, vi.index());
                self.track_edges(&predicted.tri);
                self.reconcile(face);
                StepOutcome::Grew { vertex: vi, face }
            }
            Err(err) => self.defer(front.he, DeferReason::Topology(err)),
        }
    }

    /// Connect the front to an existing vertex
    ///
    /// An apex of one of the adjacent ears turns the merge into a cut-ear.
    pub(super) fn merge(&mut self, afront: &AdvancingFront, closest: VertexId, tri: &TriangleCandidate) -> StepOutcome {
        let front = &afront.front;
        debug_assert!(closest != front.vi[0] && closest != front.vi[1]);
        if closest == afront.prev.apex() {
            return self.cut_ear(&afront.prev);
        }
        if closest == afront.next.apex() {
            return self.cut_ear(&afront.next);
        }

        match self
            .mesh
            .add_face(front.vi[0], front.vi[1], closest, MeshFace::from_candidate(tri))
        {
            Ok(face) => {
                self.track_edges(tri);
                self.reconcile(face);
                StepOutcome::Merged { vertex: closest, face }
            }
            Err(err) => self.defer(front.he, DeferReason::Topology(err)),
        }
    }

    fn cut_ear(&mut self, ear: &CutEarData) -> StepOutcome {
        debug_assert!(ear.tri.point_valid);
        match self
            .mesh
            .add_face(ear.vi[0], ear.vi[1], ear.vi[2], MeshFace::from_candidate(&ear.tri))
        {
            Ok(face) => {
                self.track_edges(&ear.tri);
                self.reconcile(face);
                StepOutcome::CutEar { face }
            }
            Err(err) => self.defer(ear.primary, DeferReason::Topology(err)),
        }
    }

    /// Whether both ears close onto the same vertex from different faces
    pub(super) fn is_closed_area(&self, afront: &AdvancingFront) -> bool {
        self.mesh.opposite_face(afront.next.secondary) != self.mesh.opposite_face(afront.prev.secondary)
            && afront.next.apex() == afront.prev.apex()
    }

    /// Fill a three-edge hole
    pub(super) fn close_area(&mut self, afront: &AdvancingFront) -> StepOutcome {
        let prev = &afront.prev;
        match self
            .mesh
            .add_face(prev.vi[0], prev.vi[1], prev.vi[2], MeshFace::from_candidate(&afront.next.tri))
        {
            Ok(face) => {
                self.reconcile(face);
                StepOutcome::ClosedArea { face }
            }
            Err(err) => self.defer(afront.front.he, DeferReason::Topology(err)),
        }
    }

    fn track_edges(&mut self, tri: &TriangleCandidate) {
        self.max_edge_length = self.max_edge_length.max(tri.side_b).max(tri.side_c);
    }

    /// Bring the queue and boundary set in line with a new face
    ///
    /// Half-edges the face consumed leave both collections; faceless
    /// opposites it exposed join the queue.
    fn reconcile(&mut self, face: FaceId) {
        for he in self.mesh.face_half_edges(face) {
            self.front.remove_from_queue(he);
            self.front.remove_from_boundary(he);

            let outer = self.mesh.opposite(he);
            if self.mesh.is_boundary(outer) && !self.front.is_queued(outer) && !self.front.is_on_boundary(outer) {
                self.front.enqueue(outer);
            }
        }
    }
}
