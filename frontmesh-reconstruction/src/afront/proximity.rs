//! Proximity and fence checks for a predicted vertex
//!
//! A fence is the strip standing on a boundary edge along the normal of the
//! face behind it. A new triangle whose side crosses a fence would fold over
//! existing mesh, so the step is redirected to one of the fence endpoints.

use super::predict::PredictedVertex;
use super::{AdvancingFront, AfrontMesher, CutEarData, FrontData};
use crate::config::{ASPECT_RATIO_TOLERANCE, CLOSE_PROXIMITY_FACTOR, FENCE_HEIGHT_FACTOR};
use crate::geometry::{intersect_line_plane, point_segment_distance, LinePlaneIntersection, TriangleCandidate};
use crate::halfedge::{HalfEdgeId, VertexId};
use frontmesh_core::Point3f;
use log::trace;

/// Existing vertex the front should connect to instead of growing
#[derive(Debug, Clone, Copy)]
pub(crate) struct CloseVertex {
    pub closest: VertexId,
    pub tri: TriangleCandidate,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    vertex: VertexId,
    dist: f32,
    tri: TriangleCandidate,
}

#[derive(Debug, Clone, Copy)]
struct FenceHit {
    he: HalfEdgeId,
    dist: f32,
}

impl Candidate {
    fn from_ear(ear: &CutEarData, dist: f32) -> Self {
        Self {
            vertex: ear.apex(),
            dist,
            tri: ear.tri,
        }
    }
}

impl AfrontMesher {
    fn position(&self, v: VertexId) -> Point3f {
        self.mesh.vertex(v).position
    }

    /// Of two fence endpoints, the one to connect to
    ///
    /// Only endpoints on the growing side qualify; when both do, `closer`
    /// decides.
    fn pick_endpoint(front: &FrontData, points: &[Point3f; 2], closer: impl Fn(&Point3f) -> f32) -> usize {
        let valid = [front.geom.is_ahead(&points[0]), front.geom.is_ahead(&points[1])];
        if valid[0] && valid[1] {
            if closer(&points[0]) < closer(&points[1]) {
                0
            } else {
                1
            }
        } else if valid[0] {
            0
        } else {
            1
        }
    }

    /// Nearby boundary vertices and the fences around them
    fn close_proximity(&self, afront: &AdvancingFront, predicted: &PredictedVertex) -> (Option<Candidate>, Vec<HalfEdgeId>) {
        let front = &afront.front;
        let apex = predicted.tri.apex();
        let limit = CLOSE_PROXIMITY_FACTOR * front.max_step;

        let mut neighbors = self.vertex_index.radius_search(&apex, front.max_step);
        neighbors.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        let mut fences: Vec<HalfEdgeId> = Vec::new();
        let mut found: Option<Candidate> = None;
        for (id, _) in neighbors {
            let vi = VertexId(id);
            if vi == front.vi[0] || vi == front.vi[1] || !self.mesh.is_boundary_vertex(vi) {
                continue;
            }

            let check = self.position(vi);
            let check_valid = front.geom.is_ahead(&check);
            for &h in self.mesh.outgoing_half_edges(vi) {
                let Some(fence) = self.mesh.boundary_side(h) else {
                    continue;
                };
                let end = self.mesh.terminating_vertex(h);
                if end == front.vi[0] || end == front.vi[1] {
                    continue;
                }
                let end_valid = front.geom.is_ahead(&self.position(end));
                if (check_valid || end_valid) && !fences.contains(&fence) {
                    fences.push(fence);
                }
            }

            if !check_valid {
                continue;
            }

            let dist = (apex - check).norm();
            if dist < limit {
                let tri = self.triangle_to(front, vi);
                let replace = match &found {
                    None => true,
                    Some(current) => {
                        let (old_valid, new_valid) = (current.tri.is_valid(), tri.is_valid());
                        (old_valid && new_valid && dist < current.dist)
                            || (!old_valid && !new_valid && dist < current.dist)
                            || (!old_valid && new_valid)
                    }
                };
                if replace {
                    found = Some(Candidate { vertex: vi, dist, tri });
                }
            }
        }

        // the adjacent ears take precedence over any plain close vertex
        let (prev, next) = (&afront.prev, &afront.next);
        let prev_dist = point_segment_distance(&prev.tri.points[0], &prev.tri.points[2], &apex);
        let next_dist = point_segment_distance(&next.tri.points[1], &next.tri.points[2], &apex);
        if prev.tri.point_valid && next.tri.point_valid {
            if prev.tri.aspect_ratio >= ASPECT_RATIO_TOLERANCE || next.tri.aspect_ratio >= ASPECT_RATIO_TOLERANCE {
                found = Some(if prev.tri.aspect_ratio > next.tri.aspect_ratio {
                    Candidate::from_ear(prev, prev_dist)
                } else {
                    Candidate::from_ear(next, next_dist)
                });
            } else if prev_dist < next_dist {
                if prev_dist < limit {
                    found = Some(Candidate::from_ear(prev, prev_dist));
                }
            } else if next_dist < limit {
                found = Some(Candidate::from_ear(next, next_dist));
            }
        } else if prev.tri.point_valid && (prev_dist < limit || prev.tri.aspect_ratio >= ASPECT_RATIO_TOLERANCE) {
            found = Some(Candidate::from_ear(prev, prev_dist));
        } else if next.tri.point_valid && (next_dist < limit || next.tri.aspect_ratio >= ASPECT_RATIO_TOLERANCE) {
            found = Some(Candidate::from_ear(next, next_dist));
        }

        if found.is_none() {
            for &fence in &fences {
                let fv = [self.mesh.origin_vertex(fence), self.mesh.terminating_vertex(fence)];
                // vertex ids, not half-edges: non-manifold vertices can repeat
                if fv.iter().any(|&v| v == front.vi[0] || v == front.vi[1]) {
                    continue;
                }
                let fp = [self.position(fv[0]), self.position(fv[1])];
                let dist = point_segment_distance(&fp[0], &fp[1], &apex);
                if dist < limit {
                    let index = Self::pick_endpoint(front, &fp, |p| (p - apex).norm());
                    found = Some(Candidate {
                        vertex: fv[index],
                        dist,
                        tri: self.triangle_to(front, fv[index]),
                    });
                }
            }
        }

        (found, fences)
    }

    /// Redirect a triangle that conflicts with one of the adjacent ears
    fn check_prev_next<'a>(
        &self,
        afront: &'a AdvancingFront,
        tri: &TriangleCandidate,
        closest: Option<VertexId>,
    ) -> Option<&'a CutEarData> {
        let (next, prev) = (&afront.next, &afront.prev);
        let next_overlaps = next.tri.point_valid && tri.c >= next.tri.c;
        let prev_overlaps = prev.tri.point_valid && tri.b >= prev.tri.b;

        if closest == Some(prev.apex()) && next_overlaps {
            return Some(next);
        }
        if closest == Some(next.apex()) && prev_overlaps {
            return Some(prev);
        }
        if next_overlaps && prev_overlaps {
            return Some(if next.tri.c < prev.tri.b { next } else { prev });
        }
        if next_overlaps {
            return Some(next);
        }
        if prev_overlaps {
            return Some(prev);
        }

        let apex = tri.apex();
        let front = &afront.front;
        if next.tri.point_valid {
            let height = FENCE_HEIGHT_FACTOR * next.tri.side_b * self.hausdorff_error;
            if self.fence_violated(&front.geom.p[0], &apex, next.secondary, height).is_some() {
                return Some(next);
            }
        }
        if prev.tri.point_valid {
            let height = FENCE_HEIGHT_FACTOR * prev.tri.side_c * self.hausdorff_error;
            if self.fence_violated(&front.geom.p[1], &apex, prev.secondary, height).is_some() {
                return Some(prev);
            }
        }
        None
    }

    /// Whether the segment `start`-`end` crosses the fence on `fence`
    ///
    /// The segment is first flattened onto the plane of the face behind the
    /// fence.
    fn fence_violated(&self, start: &Point3f, end: &Point3f, fence: HalfEdgeId, height: f32) -> Option<LinePlaneIntersection> {
        let face = self.mesh.opposite_face(fence)?;
        let n = self.mesh.face_data(face).normal;
        let base = self.position(self.mesh.origin_vertex(fence));
        let tip = self.position(self.mesh.terminating_vertex(fence));

        let u = tip - base;
        let v = n * height;
        let start = start - n * (start - base).dot(&n);
        let end = end - n * (end - base).dot(&n);

        let hit = intersect_line_plane(&start, &end, &base, &u, &v)?;
        let inside = (0.0..=1.0).contains(&hit.mw) && (0.0..=1.0).contains(&hit.mu) && (-1.0..=1.0).contains(&hit.mv);
        inside.then_some(hit)
    }

    /// Nearest fence crossed by the segment from `from` to `to`
    ///
    /// Fences touching `closest` are ignored. Distance is measured along the
    /// grow direction.
    fn fences_violated(
        &self,
        front: &FrontData,
        from: VertexId,
        to: &Point3f,
        fences: &[HalfEdgeId],
        closest: Option<VertexId>,
    ) -> Option<FenceHit> {
        let start = self.position(from);
        let height = FENCE_HEIGHT_FACTOR * front.max_step * self.hausdorff_error;

        let mut best: Option<FenceHit> = None;
        for &fence in fences {
            debug_assert!(from != self.mesh.origin_vertex(fence) && from != self.mesh.terminating_vertex(fence));
            if let Some(c) = closest {
                if c == self.mesh.origin_vertex(fence) || c == self.mesh.terminating_vertex(fence) {
                    continue;
                }
            }
            if let Some(hit) = self.fence_violated(&start, to, fence, height) {
                let dist = (hit.w * hit.mw).dot(&front.geom.direction);
                if best.map_or(true, |b| dist < b.dist) {
                    best = Some(FenceHit { he: fence, dist });
                }
            }
        }
        best
    }

    /// Existing vertex the front must connect to, if the predicted triangle
    /// comes too close to the mesh
    pub(super) fn triangle_too_close(&self, afront: &AdvancingFront, predicted: &PredictedVertex) -> Option<CloseVertex> {
        let front = &afront.front;
        let (found, fences) = self.close_proximity(afront, predicted);

        let (mut closest, mut tri) = match found {
            Some(candidate) => (Some(candidate.vertex), candidate.tri),
            None => (None, predicted.tri),
        };
        if let Some(ear) = self.check_prev_next(afront, &tri, closest) {
            closest = Some(ear.apex());
            tri = ear.tri;
        }

        // each redirect can expose another fence, at most one per fence
        for _ in 0..fences.len() {
            let hit = if closest == Some(afront.prev.apex()) {
                self.fences_violated(front, front.vi[1], &afront.prev.tri.apex(), &fences, closest)
            } else if closest == Some(afront.next.apex()) {
                self.fences_violated(front, front.vi[0], &afront.next.tri.apex(), &fences, closest)
            } else {
                let apex = tri.apex();
                let from_origin = self.fences_violated(front, front.vi[0], &apex, &fences, closest);
                let from_target = self.fences_violated(front, front.vi[1], &apex, &fences, closest);
                match (from_origin, from_target) {
                    (Some(a), Some(b)) => Some(if b.dist < a.dist { b } else { a }),
                    (a, b) => a.or(b),
                }
            };

            let Some(hit) = hit else {
                break;
            };
            trace!("Fence {:?} violated by front {:?}", hit.he, front.he);

            let fv = [self.mesh.origin_vertex(hit.he), self.mesh.terminating_vertex(hit.he)];
            let fp = [self.position(fv[0]), self.position(fv[1])];
            let index = Self::pick_endpoint(front, &fp, |p| point_segment_distance(&front.geom.p[0], &front.geom.p[1], p));

            closest = Some(fv[index]);
            tri = self.triangle_to(front, fv[index]);
            if let Some(ear) = self.check_prev_next(afront, &tri, closest) {
                closest = Some(ear.apex());
                tri = ear.tri;
            }
        }

        closest.map(|closest| CloseVertex { closest, tri })
    }
}
