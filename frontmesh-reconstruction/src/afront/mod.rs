//! Advancing-front surface reconstruction
//!
//! A seed triangle is placed on the guidance field and its boundary edges are
//! queued. Each step pops one edge and either grows a new triangle outward,
//! merges with a nearby existing vertex, cuts an ear with an adjacent front
//! edge, closes a three-edge hole, or sets the edge aside on the boundary.
//! Reconstruction is finished once the queue drains.

mod export;
mod predict;
mod proximity;
mod topology;

pub use export::ViewOrientation;

use crate::config::{AfrontConfig, SeedSelection};
use crate::front::FrontController;
use crate::geometry::{FrontGeometry, NormalTolerances, TriangleCandidate};
use crate::guidance::GuidanceField;
use crate::halfedge::{FaceId, HalfEdgeId, HalfEdgeMesh, TopologyError, VertexId};
use crate::spatial::IncrementalPointIndex;
use frontmesh_core::{Error, Point3f, PointCloud3f, Result, TriangleMesh, Vector3f};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error as ThisError;

/// Per-vertex state of the growing mesh
#[derive(Debug, Clone, Copy)]
pub struct MeshVertex {
    pub position: Point3f,
    pub normal: Vector3f,
    /// Locally allowed growth distance
    pub max_step: f32,
    /// Radius at which `max_step` was last resolved
    pub max_step_search_radius: f32,
}

/// Reference frame stored on each face
#[derive(Debug, Clone, Copy)]
pub struct MeshFace {
    pub center: Point3f,
    pub normal: Vector3f,
}

impl MeshFace {
    fn from_candidate(tri: &TriangleCandidate) -> Self {
        Self {
            center: tri.centroid(),
            normal: tri.normal,
        }
    }
}

/// Topology store used by the mesher
pub type AfrontMesh = HalfEdgeMesh<MeshVertex, MeshFace>;

/// Why a predicted vertex was rejected
#[derive(ThisError, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionFailure {
    #[error("too few neighbours behind the local fit")]
    InvalidFit,
    #[error("projection moved the vertex too far or behind the front")]
    InvalidProjection,
    #[error("predicted vertex lies at the edge of the point cloud")]
    AtBoundary,
    #[error("max step is too short for the front edge")]
    InvalidStepSize,
    #[error("vertex normals disagree")]
    InvalidVertexNormal,
    #[error("triangle normal disagrees with its vertex normals")]
    InvalidTriangleNormal,
}

/// Why an edge was moved to the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    Prediction(PredictionFailure),
    /// The vertex found close by has inconsistent normals
    ClosestVertexNormal,
    /// The triangle to the vertex found close by has an inconsistent normal
    ClosestTriangleNormal,
    Topology(TopologyError),
    /// No adjacent boundary edge could be found around the front
    MissingNeighborhood,
}

impl fmt::Display for DeferReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeferReason::Prediction(failure) => write!(f, "{}", failure),
            DeferReason::ClosestVertexNormal => write!(f, "closest vertex has inconsistent normals"),
            DeferReason::ClosestTriangleNormal => write!(f, "closest vertex forms an inconsistent triangle"),
            DeferReason::Topology(err) => write!(f, "{}", err),
            DeferReason::MissingNeighborhood => write!(f, "no neighbouring boundary edge"),
        }
    }
}

/// What a single step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Grew { vertex: VertexId, face: FaceId },
    Merged { vertex: VertexId, face: FaceId },
    CutEar { face: FaceId },
    ClosedArea { face: FaceId },
    Deferred { edge: HalfEdgeId, reason: DeferReason },
}

/// Notification sent after every step
#[derive(Debug, Clone, Copy)]
pub struct StepEvent {
    pub step: usize,
    pub edge: HalfEdgeId,
    pub outcome: StepOutcome,
    pub queued: usize,
    pub boundary: usize,
}

/// Receives step notifications, e.g. for debugging overlays
pub trait StepObserver {
    fn on_stepped(&mut self, event: &StepEvent);
}

impl<F> StepObserver for F
where
    F: FnMut(&StepEvent),
{
    fn on_stepped(&mut self, event: &StepEvent) {
        self(event)
    }
}

/// Statistics of a finished reconstruction
#[derive(Debug, Clone)]
pub struct ReconstructionSummary {
    pub steps: usize,
    pub elapsed: Duration,
    pub vertices: usize,
    pub faces: usize,
    pub boundary_edges: usize,
}

/// A boundary edge with its derived geometry
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrontData {
    pub he: HalfEdgeId,
    pub vi: [VertexId; 2],
    pub geom: FrontGeometry,
    pub max_step: f32,
    pub max_step_search_radius: f32,
}

/// The triangle an adjacent boundary edge would close with the front
#[derive(Debug, Clone, Copy)]
pub(crate) struct CutEarData {
    pub primary: HalfEdgeId,
    pub secondary: HalfEdgeId,
    pub vi: [VertexId; 3],
    pub tri: TriangleCandidate,
}

impl CutEarData {
    pub fn apex(&self) -> VertexId {
        self.vi[2]
    }
}

/// Front edge plus the best ears on either side
#[derive(Debug, Clone, Copy)]
pub(crate) struct AdvancingFront {
    pub front: FrontData,
    pub next: CutEarData,
    pub prev: CutEarData,
}

/// Incremental advancing-front mesher
pub struct AfrontMesher {
    config: AfrontConfig,
    input: Vec<Point3f>,
    guidance: GuidanceField,
    mesh: AfrontMesh,
    vertex_index: IncrementalPointIndex,
    front: FrontController,
    tolerances: NormalTolerances,
    hausdorff_error: f32,
    max_edge_length: f32,
    steps: usize,
    initialized: bool,
    finished: bool,
    observer: Option<Box<dyn StepObserver>>,
}

impl AfrontMesher {
    pub fn new(cloud: &PointCloud3f, config: AfrontConfig) -> Self {
        Self::from_points(cloud.points.clone(), config)
    }

    pub fn from_points(points: Vec<Point3f>, config: AfrontConfig) -> Self {
        info!("Creating mesher for {} points", points.len());
        let tolerances = NormalTolerances {
            vertex: config.vertex_normal_tolerance,
            triangle: config.triangle_normal_tolerance,
        };
        Self {
            hausdorff_error: config.hausdorff_error(),
            config,
            input: points,
            guidance: GuidanceField::default(),
            mesh: AfrontMesh::new(),
            vertex_index: IncrementalPointIndex::new(),
            front: FrontController::new(),
            tolerances,
            max_edge_length: 0.0,
            steps: 0,
            initialized: false,
            finished: false,
            observer: None,
        }
    }

    /// Install an observer notified after every step
    pub fn set_observer(&mut self, observer: impl StepObserver + 'static) {
        self.observer = Some(Box::new(observer));
    }

    /// Fit the guidance field and place the seed triangle
    ///
    /// Any previous mesh is discarded. Nothing is kept when this fails.
    pub fn initialize(&mut self) -> Result<()> {
        self.initialized = false;
        self.finished = false;
        self.mesh = AfrontMesh::new();
        self.vertex_index = IncrementalPointIndex::new();
        self.front.clear();
        self.max_edge_length = 0.0;
        self.steps = 0;
        self.guidance = GuidanceField::default();

        self.config.validate()?;
        self.hausdorff_error = self.config.hausdorff_error();
        self.tolerances = NormalTolerances {
            vertex: self.config.vertex_normal_tolerance,
            triangle: self.config.triangle_normal_tolerance,
        };
        if self.input.is_empty() {
            return Err(Error::InvalidData("input cloud is empty".to_string()));
        }

        let guidance = GuidanceField::estimate(&self.input, &self.config)?;
        let seed = match self.config.seed {
            SeedSelection::Index(i) if i < guidance.len() => i,
            SeedSelection::Index(i) => {
                return Err(Error::InvalidData(format!(
                    "seed index {} out of range for {} guidance samples",
                    i,
                    guidance.len()
                )))
            }
            SeedSelection::Nearest(p) => guidance.index().nearest(&p).map(|(i, _)| i).unwrap_or(0),
            SeedSelection::Random(s) => StdRng::seed_from_u64(s).gen_range(0..guidance.len()),
        };

        self.guidance = guidance;
        self.create_first_triangle(seed)?;
        self.initialized = true;
        info!("Mesher initialized from guidance sample {}", seed);
        Ok(())
    }

    /// Run steps until the queue is empty
    pub fn reconstruct(&mut self) -> Result<ReconstructionSummary> {
        if !self.initialized {
            self.initialize()?;
        }

        info!("Meshing started");
        let start = Instant::now();
        while !self.finished {
            self.step();
        }
        let elapsed = start.elapsed();

        let summary = ReconstructionSummary {
            steps: self.steps,
            elapsed,
            vertices: self.mesh.vertex_count(),
            faces: self.mesh.face_count(),
            boundary_edges: self.front.boundary().len(),
        };
        info!(
            "Meshing finished: {} faces, {} vertices, {} boundary edges ({:.3} sec)",
            summary.faces,
            summary.vertices,
            summary.boundary_edges,
            elapsed.as_secs_f64()
        );
        Ok(summary)
    }

    /// Advance one front edge
    ///
    /// Returns `None` without touching the mesh when not initialized or
    /// already finished.
    pub fn step(&mut self) -> Option<StepOutcome> {
        if !self.initialized {
            error!("Mesher has not been initialized");
            return None;
        }
        if self.finished {
            warn!("Tried to step the mesher after it finished");
            return None;
        }

        let Some(he) = self.front.dequeue_front() else {
            self.finished = true;
            return None;
        };

        let outcome = self.advance(he);
        self.steps += 1;
        debug!("Step {}: {:?} -> {:?}", self.steps, he, outcome);

        if self.front.is_queue_empty() {
            self.finished = true;
        }

        if let Some(observer) = self.observer.as_mut() {
            observer.on_stepped(&StepEvent {
                step: self.steps,
                edge: he,
                outcome,
                queued: self.front.queue_len(),
                boundary: self.front.boundary().len(),
            });
        }
        Some(outcome)
    }

    fn advance(&mut self, he: HalfEdgeId) -> StepOutcome {
        let Some(afront) = self.advancing_front(he) else {
            error!("No neighbouring boundary edges around {:?}", he);
            return self.defer(he, DeferReason::MissingNeighborhood);
        };

        if self.is_closed_area(&afront) {
            return self.close_area(&afront);
        }

        let predicted = match self.predict_vertex(&afront) {
            Ok(predicted) => predicted,
            Err(failure) => return self.defer(he, DeferReason::Prediction(failure)),
        };

        match self.triangle_too_close(&afront, &predicted) {
            None => match predicted.normal_failure {
                None => self.grow(&afront, &predicted),
                Some(failure) => self.defer(he, DeferReason::Prediction(failure)),
            },
            Some(close) if !close.tri.vertex_normals_valid => self.defer(he, DeferReason::ClosestVertexNormal),
            Some(close) if !close.tri.triangle_normal_valid => self.defer(he, DeferReason::ClosestTriangleNormal),
            Some(close) => self.merge(&afront, close.closest, &close.tri),
        }
    }

    fn defer(&mut self, he: HalfEdgeId, reason: DeferReason) -> StepOutcome {
        debug!("Deferring {:?}: {}", he, reason);
        self.front.move_to_boundary(he);
        StepOutcome::Deferred { edge: he, reason }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn config(&self) -> &AfrontConfig {
        &self.config
    }

    /// The fitted guidance field, once initialized
    pub fn guidance(&self) -> Option<&GuidanceField> {
        self.initialized.then_some(&self.guidance)
    }

    pub fn half_edge_mesh(&self) -> &AfrontMesh {
        &self.mesh
    }

    pub fn front(&self) -> &FrontController {
        &self.front
    }

    /// Longest edge created so far
    pub fn max_edge_length(&self) -> f32 {
        self.max_edge_length
    }

    pub fn steps(&self) -> usize {
        self.steps
    }
}

/// Reconstruct a mesh with default settings and the given search radius
pub fn afront_reconstruction(cloud: &PointCloud3f, search_radius: f32) -> Result<TriangleMesh> {
    afront_reconstruction_with_config(cloud, &AfrontConfig::new(search_radius))
}

/// Reconstruct a mesh with a full configuration
pub fn afront_reconstruction_with_config(cloud: &PointCloud3f, config: &AfrontConfig) -> Result<TriangleMesh> {
    let mut mesher = AfrontMesher::new(cloud, config.clone());
    mesher.reconstruct()?;
    Ok(mesher.mesh())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn plane(n: usize, spacing: f32) -> PointCloud3f {
        (0..n)
            .flat_map(|i| (0..n).map(move |j| Point3f::new(i as f32 * spacing, j as f32 * spacing, 0.0)))
            .collect()
    }

    #[test]
    fn test_initialize_rejects_bad_radius() {
        let mut mesher = AfrontMesher::new(&plane(5, 1.0), AfrontConfig::new(0.0));
        assert!(matches!(mesher.initialize(), Err(Error::InvalidConfiguration(_))));
        assert!(!mesher.is_initialized());
    }

    #[test]
    fn test_initialize_rejects_empty_cloud() {
        let mut mesher = AfrontMesher::new(&PointCloud3f::new(), AfrontConfig::new(1.0));
        assert!(matches!(mesher.initialize(), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_initialize_rejects_out_of_range_seed() {
        let config = AfrontConfig::new(0.25).with_seed(SeedSelection::Index(10_000));
        let mut mesher = AfrontMesher::new(&plane(10, 0.1), config);
        assert!(matches!(mesher.initialize(), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_step_before_initialize_is_noop() {
        let mut mesher = AfrontMesher::new(&plane(10, 0.1), AfrontConfig::new(0.25));
        assert!(mesher.step().is_none());
        assert_eq!(mesher.half_edge_mesh().face_count(), 0);
    }

    #[test]
    fn test_seed_triangle_enqueues_three_edges() {
        let config = AfrontConfig::new(0.25).with_seed(SeedSelection::Nearest(Point3f::new(0.5, 0.5, 0.0)));
        let mut mesher = AfrontMesher::new(&plane(12, 0.1), config);
        mesher.initialize().unwrap();

        assert_eq!(mesher.half_edge_mesh().face_count(), 1);
        assert_eq!(mesher.half_edge_mesh().vertex_count(), 3);
        assert_eq!(mesher.front().queue_len(), 3);
        assert!(mesher.front().boundary().is_empty());
        assert!(mesher.max_edge_length() > 0.0);
    }

    #[test]
    fn test_observer_sees_every_step() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);

        let config = AfrontConfig::new(0.25).with_seed(SeedSelection::Index(0));
        let mut mesher = AfrontMesher::new(&plane(12, 0.1), config);
        mesher.set_observer(move |event: &StepEvent| sink.borrow_mut().push(event.step));
        mesher.initialize().unwrap();

        for _ in 0..5 {
            mesher.step();
        }
        let steps = seen.borrow().clone();
        assert_eq!(steps, (1..=steps.len()).collect::<Vec<_>>());
        assert_eq!(steps.len(), mesher.steps());
    }
}
