//! Configuration for advancing-front reconstruction

use frontmesh_core::{Error, Point3f, Result};
use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

/// Aspect ratio at or above which a neighbouring ear triangle is preferred
pub const ASPECT_RATIO_TOLERANCE: f32 = 0.85;

/// Fraction of the max step under which an existing vertex counts as close
pub const CLOSE_PROXIMITY_FACTOR: f32 = 0.5;

/// Fence height as a multiple of the Hausdorff-scaled edge length
pub const FENCE_HEIGHT_FACTOR: f32 = 2.0;

/// Highest supported local fit order
pub const MAX_POLYNOMIAL_ORDER: usize = 4;

/// How the first triangle is placed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SeedSelection {
    /// Seed at the guidance sample with this index
    Index(usize),
    /// Seed at the guidance sample closest to this position
    Nearest(Point3f),
    /// Seed at a sample drawn from a generator with this seed
    Random(u64),
}

impl Default for SeedSelection {
    fn default() -> Self {
        SeedSelection::Random(0)
    }
}

/// Configuration for the advancing-front mesher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AfrontConfig {
    /// Neighbourhood radius for local fits and boundary tests
    pub search_radius: f32,
    /// Angle subtended by an edge on the osculating circle
    pub rho: f32,
    /// Blend between sample distance and ideal edge length in the max step rule
    pub reduction: f32,
    /// Worker threads for guidance estimation (0 = rayon default)
    pub threads: usize,
    /// Order of the local polynomial fit (0 = plane only)
    pub polynomial_order: usize,
    /// Angular gap (radians) above which a sample lies on the cloud boundary
    pub boundary_angle_threshold: f32,
    /// Minimum fitted neighbours for a usable fit
    pub required_neighbors: usize,
    /// Maximum angle between a candidate normal and the front endpoint normals
    pub vertex_normal_tolerance: f32,
    /// Maximum angle between a triangle normal and its averaged vertex normal
    pub triangle_normal_tolerance: f32,
    /// Seed triangle placement
    pub seed: SeedSelection,
}

impl AfrontConfig {
    /// Create a configuration with the given search radius and defaults elsewhere
    pub fn new(search_radius: f32) -> Self {
        Self {
            search_radius,
            rho: 0.9,
            reduction: 0.8,
            threads: 1,
            polynomial_order: 2,
            boundary_angle_threshold: FRAC_PI_2,
            required_neighbors: 5,
            vertex_normal_tolerance: FRAC_PI_4,
            triangle_normal_tolerance: FRAC_PI_4,
            seed: SeedSelection::default(),
        }
    }

    pub fn with_rho(mut self, rho: f32) -> Self {
        self.rho = rho;
        self
    }

    pub fn with_reduction(mut self, reduction: f32) -> Self {
        self.reduction = reduction;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_polynomial_order(mut self, order: usize) -> Self {
        self.polynomial_order = order;
        self
    }

    pub fn with_boundary_angle_threshold(mut self, angle: f32) -> Self {
        self.boundary_angle_threshold = angle;
        self
    }

    pub fn with_required_neighbors(mut self, count: usize) -> Self {
        self.required_neighbors = count;
        self
    }

    pub fn with_normal_tolerances(mut self, vertex: f32, triangle: f32) -> Self {
        self.vertex_normal_tolerance = vertex;
        self.triangle_normal_tolerance = triangle;
        self
    }

    pub fn with_seed(mut self, seed: SeedSelection) -> Self {
        self.seed = seed;
        self
    }

    /// Check every parameter is in range
    pub fn validate(&self) -> Result<()> {
        if !(self.search_radius.is_finite() && self.search_radius > 0.0) {
            return Err(Error::InvalidConfiguration(format!(
                "search radius must be positive, got {}",
                self.search_radius
            )));
        }
        if !(self.rho > 0.0 && self.rho < std::f32::consts::PI) {
            return Err(Error::InvalidConfiguration(format!(
                "rho must be in (0, pi), got {}",
                self.rho
            )));
        }
        if !(0.0..1.0).contains(&self.reduction) {
            return Err(Error::InvalidConfiguration(format!(
                "reduction must be in [0, 1), got {}",
                self.reduction
            )));
        }
        if self.polynomial_order > MAX_POLYNOMIAL_ORDER {
            return Err(Error::Unsupported(format!(
                "polynomial order {} exceeds {}",
                self.polynomial_order, MAX_POLYNOMIAL_ORDER
            )));
        }
        if self.boundary_angle_threshold <= 0.0 {
            return Err(Error::InvalidConfiguration(
                "boundary angle threshold must be positive".to_string(),
            ));
        }
        if self.vertex_normal_tolerance <= 0.0 || self.triangle_normal_tolerance <= 0.0 {
            return Err(Error::InvalidConfiguration(
                "normal tolerances must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Maximum deviation between a chord and its osculating arc, per unit edge length
    pub fn hausdorff_error(&self) -> f32 {
        let rho = self.rho;
        (1.0 - ((1.0 + 2.0 * rho.cos()) / 3.0).sqrt()) / (2.0 * (rho * 0.5).sin())
    }

    /// Edge length that keeps the chord error bounded for a given curvature
    pub fn ideal_edge_length(&self, curvature: f32) -> f32 {
        let length = 2.0 * (self.rho * 0.5).sin() / curvature.abs();
        if length.is_finite() {
            length.min(self.search_radius)
        } else {
            self.search_radius
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults() {
        let config = AfrontConfig::new(0.5);
        assert_eq!(config.required_neighbors, 5);
        assert_eq!(config.polynomial_order, 2);
        assert_relative_eq!(config.reduction, 0.8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_missing_radius() {
        assert!(AfrontConfig::new(0.0).validate().is_err());
        assert!(AfrontConfig::new(-1.0).validate().is_err());
        assert!(AfrontConfig::new(f32::NAN).validate().is_err());
    }

    #[test]
    fn test_rejects_reduction_of_one() {
        let config = AfrontConfig::new(1.0).with_reduction(1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_high_fit_order() {
        let result = AfrontConfig::new(1.0).with_polynomial_order(MAX_POLYNOMIAL_ORDER + 1).validate();
        assert!(matches!(result, Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_ideal_edge_length_is_capped() {
        let config = AfrontConfig::new(2.0);
        assert_relative_eq!(config.ideal_edge_length(0.0), 2.0);
        // radius 10 sphere: 20 * sin(0.45)
        assert_relative_eq!(config.ideal_edge_length(0.1), 2.0, epsilon = 1e-6);
        let wide = AfrontConfig::new(50.0);
        assert_relative_eq!(wide.ideal_edge_length(0.1), 20.0 * 0.45f32.sin(), epsilon = 1e-4);
    }

    #[test]
    fn test_hausdorff_error_is_small_and_positive() {
        let h = AfrontConfig::new(1.0).hausdorff_error();
        assert!(h > 0.0 && h < 0.2);
    }
}
