//! Core data structures and traits for frontmesh
//!
//! This crate provides fundamental types shared by the reconstruction engine:
//! points, point clouds, triangle meshes, the nearest-neighbor search trait and
//! the common error type.

pub mod point;
pub mod point_cloud;
pub mod mesh;
pub mod traits;
pub mod error;

pub use point::*;
pub use point_cloud::*;
pub use mesh::*;
pub use traits::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3, Matrix3};
