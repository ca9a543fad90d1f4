//! Front context and vertex prediction

use super::{AdvancingFront, AfrontMesher, CutEarData, FrontData, PredictionFailure};
use crate::geometry::{align_normal, FrontGeometry, TriangleCandidate};
use crate::guidance::ProjectedSample;
use crate::halfedge::{HalfEdgeId, VertexId};
use frontmesh_core::Vector3f;

/// A projected apex and the triangle it would form with the front
#[derive(Debug, Clone, Copy)]
pub(crate) struct PredictedVertex {
    pub sample: ProjectedSample,
    pub tri: TriangleCandidate,
    /// Failed normal check; such a vertex is only usable if merged away
    pub normal_failure: Option<PredictionFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EarSide {
    Next,
    Prev,
}

impl AfrontMesher {
    /// Candidate triangle from the front to an existing vertex
    pub(super) fn triangle_to(&self, front: &FrontData, v: VertexId) -> TriangleCandidate {
        let vertex = self.mesh.vertex(v);
        TriangleCandidate::new(&front.geom, &vertex.position, &vertex.normal, &self.tolerances)
    }

    pub(super) fn advancing_front(&self, he: HalfEdgeId) -> Option<AdvancingFront> {
        let front = self.front_data(he)?;
        let next = self.ear_candidate(&front, EarSide::Next)?;
        let prev = self.ear_candidate(&front, EarSide::Prev)?;
        Some(AdvancingFront { front, next, prev })
    }

    fn front_data(&self, he: HalfEdgeId) -> Option<FrontData> {
        let face = self.mesh.opposite_face(he)?;
        let face_data = self.mesh.face_data(face);
        let vi = [self.mesh.origin_vertex(he), self.mesh.terminating_vertex(he)];
        let (a, b) = (self.mesh.vertex(vi[0]), self.mesh.vertex(vi[1]));

        let max_step = a.max_step.min(b.max_step);
        Some(FrontData {
            he,
            vi,
            geom: FrontGeometry::new(
                [a.position, b.position],
                [a.normal, b.normal],
                &face_data.center,
                &face_data.normal,
            ),
            max_step,
            max_step_search_radius: a.max_step_search_radius.max(b.max_step_search_radius) + max_step,
        })
    }

    /// Best boundary edge adjoining the front at one end
    ///
    /// Starts from the boundary edge continuing the front (leaving the target
    /// for `Next`, entering the origin for `Prev`) and then scans every
    /// boundary edge at that vertex. A candidate on the growing side beats one
    /// behind it; between two on the growing side the smaller base angle wins.
    /// When the pivot carries several boundary edges the starting one is the
    /// earliest created, so ties resolve in creation order.
    fn ear_candidate(&self, front: &FrontData, side: EarSide) -> Option<CutEarData> {
        let pivot = match side {
            EarSide::Next => front.vi[1],
            EarSide::Prev => front.vi[0],
        };
        let outgoing = self.mesh.outgoing_half_edges(pivot);

        let continuing = outgoing.iter().copied().find_map(|h| {
            let he = match side {
                EarSide::Next => h,
                EarSide::Prev => self.mesh.opposite(h),
            };
            (he != front.he && self.mesh.is_boundary(he)).then(|| (he, self.mesh.terminating_vertex(h)))
        });

        let mut best = continuing.map(|(secondary, apex)| CutEarData {
            primary: front.he,
            secondary,
            vi: [front.vi[0], front.vi[1], apex],
            tri: self.triangle_to(front, apex),
        });

        for &h in outgoing {
            let Some(secondary) = self.mesh.boundary_side(h) else {
                continue;
            };
            if secondary == front.he {
                continue;
            }

            let apex = self.mesh.terminating_vertex(h);
            let tri = self.triangle_to(front, apex);
            let better = match &best {
                None => true,
                Some(current) => {
                    let narrower = match side {
                        EarSide::Next => tri.c < current.tri.c,
                        EarSide::Prev => tri.b < current.tri.b,
                    };
                    (tri.point_valid && !current.tri.point_valid)
                        || (tri.point_valid && current.tri.point_valid && narrower)
                }
            };
            if better {
                best = Some(CutEarData {
                    primary: front.he,
                    secondary,
                    vi: [front.vi[0], front.vi[1], apex],
                    tri,
                });
            }
        }

        best
    }

    /// Project a new apex for the front onto the guidance field
    pub(super) fn predict_vertex(&self, afront: &AdvancingFront) -> Result<PredictedVertex, PredictionFailure> {
        let front = &afront.front;
        let half = 0.5 * front.geom.length;
        let height = (front.max_step * front.max_step - half * half).sqrt();
        if !height.is_finite() {
            return Err(PredictionFailure::InvalidStepSize);
        }

        let raw = front.geom.mid + front.geom.direction * height;
        let mut sample = self.guidance.sample_point(&raw);
        sample.normal = align_normal(&sample.normal, &self.mesh.vertex(front.vi[0]).normal);

        if sample.num_neighbors < self.config.required_neighbors {
            return Err(PredictionFailure::InvalidFit);
        }
        if (sample.point - sample.orig).norm() > front.max_step {
            return Err(PredictionFailure::InvalidProjection);
        }
        if self.near_boundary(&front.geom, sample.closest) {
            return Err(PredictionFailure::AtBoundary);
        }

        let tri = TriangleCandidate::new(&front.geom, &sample.point, &sample.normal, &self.tolerances);
        if !tri.point_valid {
            return Err(PredictionFailure::InvalidProjection);
        }
        let normal_failure = if !tri.vertex_normals_valid {
            Some(PredictionFailure::InvalidVertexNormal)
        } else if !tri.triangle_normal_valid {
            Some(PredictionFailure::InvalidTriangleNormal)
        } else {
            None
        };

        Ok(PredictedVertex {
            sample,
            tri,
            normal_failure,
        })
    }

    /// Whether the guidance sample used for a projection lies at the cloud edge
    ///
    /// A sample squarely in front of the edge is never a boundary; anything
    /// else falls back to the angular gap test.
    fn near_boundary(&self, front: &FrontGeometry, closest: usize) -> bool {
        let sample = &self.guidance.samples()[closest];
        let along = (front.p[1] - front.mid)
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(Vector3f::zeros);
        let offset = sample.position - front.mid;

        if offset.dot(&front.direction) > 0.0 && offset.dot(&along).abs() <= 0.5 * front.length {
            return false;
        }
        self.guidance.is_boundary_sample(closest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AfrontConfig, SeedSelection};
    use approx::assert_relative_eq;
    use frontmesh_core::{Point3f, PointCloud3f};

    fn seeded_plane() -> AfrontMesher {
        let cloud: PointCloud3f = (0..20)
            .flat_map(|i| (0..20).map(move |j| Point3f::new(i as f32 * 0.1, j as f32 * 0.1, 0.0)))
            .collect();
        let config = AfrontConfig::new(0.25).with_seed(SeedSelection::Nearest(Point3f::new(1.0, 1.0, 0.0)));
        let mut mesher = AfrontMesher::new(&cloud, config);
        mesher.initialize().unwrap();
        mesher
    }

    #[test]
    fn test_seed_front_ears_meet_at_opposite_corner() {
        let mesher = seeded_plane();
        let he = mesher.front().queue().next().unwrap();
        let afront = mesher.advancing_front(he).unwrap();

        // a lone triangle: both ears close onto its third vertex, behind the front
        assert_eq!(afront.next.apex(), afront.prev.apex());
        assert!(!afront.next.tri.point_valid);
        assert!(!afront.prev.tri.point_valid);
        assert!(!mesher.is_closed_area(&afront));
    }

    #[test]
    fn test_front_data_step_and_direction() {
        let mesher = seeded_plane();
        let he = mesher.front().queue().next().unwrap();
        let afront = mesher.advancing_front(he).unwrap();
        let front = &afront.front;

        assert_relative_eq!(front.max_step, 0.2, epsilon = 1e-3);
        assert!(front.max_step_search_radius > front.max_step);
        assert_relative_eq!(front.geom.direction.z, 0.0, epsilon = 1e-5);
        // the seed face lies behind the grow direction
        assert!(!front.geom.is_ahead(&afront.next.tri.apex()));
    }

    #[test]
    fn test_predicted_vertex_on_plane() {
        let mesher = seeded_plane();
        let he = mesher.front().queue().next().unwrap();
        let afront = mesher.advancing_front(he).unwrap();
        let predicted = mesher.predict_vertex(&afront).unwrap();

        assert!(predicted.normal_failure.is_none());
        assert!(predicted.tri.is_valid());
        assert_relative_eq!(predicted.sample.point.z, 0.0, epsilon = 1e-4);
        assert_relative_eq!(predicted.tri.a + predicted.tri.b + predicted.tri.c, std::f32::consts::PI, epsilon = 1e-4);
        assert!(predicted.tri.side_b <= afront.front.max_step * 1.01);
    }
}
