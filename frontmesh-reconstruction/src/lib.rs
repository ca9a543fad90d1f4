//! # frontmesh reconstruction
//!
//! Advancing-front surface reconstruction for unorganized 3D point clouds.
//!
//! A guidance field of local polynomial fits sizes and orients the triangles.
//! Starting from a seed triangle, boundary edges are advanced one at a time:
//! each step grows a new triangle, connects to a nearby vertex, cuts an ear
//! with a neighbouring edge or closes a small hole. Edges that cannot advance
//! safely are kept as the boundary of the result.
//!
//! ```no_run
//! use frontmesh_core::{Point3f, PointCloud3f};
//! use frontmesh_reconstruction::{AfrontConfig, AfrontMesher};
//!
//! let cloud: PointCloud3f = (0..400)
//!     .map(|i| Point3f::new((i % 20) as f32 * 0.1, (i / 20) as f32 * 0.1, 0.0))
//!     .collect();
//! let mut mesher = AfrontMesher::new(&cloud, AfrontConfig::new(0.25));
//! let summary = mesher.reconstruct()?;
//! println!("{} faces in {:?}", summary.faces, summary.elapsed);
//! # Ok::<(), frontmesh_core::Error>(())
//! ```

pub mod afront;
pub mod config;
pub mod front;
pub mod geometry;
pub mod guidance;
pub mod halfedge;
pub mod parallel;
pub mod spatial;

// Re-export commonly used items
pub use afront::{
    afront_reconstruction, afront_reconstruction_with_config, AfrontMesh, AfrontMesher, DeferReason, MeshFace,
    MeshVertex, PredictionFailure, ReconstructionSummary, StepEvent, StepObserver, StepOutcome, ViewOrientation,
};
pub use config::{AfrontConfig, SeedSelection};
pub use front::FrontController;
pub use guidance::{GuidanceField, GuidanceSample, LocalSurface, ProjectedSample};
pub use halfedge::{FaceId, HalfEdgeId, HalfEdgeMesh, TopologyError, VertexId};
pub use spatial::{IncrementalPointIndex, StaticPointIndex};
