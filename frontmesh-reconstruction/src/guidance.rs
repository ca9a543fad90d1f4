//! Guidance field: per-sample local surface fits
//!
//! Every input point gets a weighted least-squares fit of a height polynomial
//! over its tangent plane. The fit supplies a smoothed position and normal, a
//! curvature estimate and from it the ideal edge length used to size
//! triangles. Arbitrary query points are projected onto the fit of the nearest
//! sample.

use crate::config::AfrontConfig;
use crate::parallel::{self, ThreadPoolConfig};
use crate::spatial::StaticPointIndex;
use frontmesh_core::{Error, NearestNeighborSearch, Point3f, Result, Vector3f};
use log::{info, warn};
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use std::time::Instant;

/// Weighted polynomial fit `w = f(u, v)` over a tangent frame
#[derive(Debug, Clone)]
pub struct LocalSurface {
    /// Query point projected onto the least-squares plane
    pub origin: Vector3<f64>,
    pub plane_normal: Vector3<f64>,
    pub u_axis: Vector3<f64>,
    pub v_axis: Vector3<f64>,
    /// Coefficients of `u^i v^j` for `i + j <= order`, `i` outer; empty for a plain plane
    pub coefficients: Vec<f64>,
    pub order: usize,
    pub num_neighbors: usize,
}

/// Height and derivatives of a fit at one `(u, v)`
#[derive(Debug, Clone, Copy, Default)]
struct HeightSample {
    w: f64,
    wu: f64,
    wv: f64,
    wuu: f64,
    wuv: f64,
    wvv: f64,
}

fn unit_orthogonal(n: &Vector3<f64>) -> Vector3<f64> {
    if n.x.abs() > n.z.abs() || n.y.abs() > n.z.abs() {
        Vector3::new(-n.y, n.x, 0.0).normalize()
    } else {
        Vector3::new(0.0, -n.z, n.y).normalize()
    }
}

fn monomial(x: f64, power: usize) -> f64 {
    x.powi(power as i32)
}

/// `power * x^(power-1)`, zero for a constant term
fn monomial_derivative(x: f64, power: usize) -> f64 {
    if power == 0 {
        0.0
    } else {
        power as f64 * x.powi(power as i32 - 1)
    }
}

fn monomial_second_derivative(x: f64, power: usize) -> f64 {
    if power < 2 {
        0.0
    } else {
        (power * (power - 1)) as f64 * x.powi(power as i32 - 2)
    }
}

impl LocalSurface {
    /// Fit a surface around `query`; `None` when fewer than three neighbours
    pub fn fit(query: &Point3f, neighbors: &[Point3f], radius: f32, order: usize) -> Option<Self> {
        if neighbors.len() < 3 {
            return None;
        }

        let count = neighbors.len() as f64;
        let centroid = neighbors
            .iter()
            .fold(Vector3::<f64>::zeros(), |acc, p| acc + p.coords.cast::<f64>())
            / count;

        let mut covariance = Matrix3::<f64>::zeros();
        for p in neighbors {
            let d = p.coords.cast::<f64>() - centroid;
            covariance += d * d.transpose();
        }
        covariance /= count;

        let eigen = covariance.symmetric_eigen();
        let smallest = eigen.eigenvalues.imin();
        let plane_normal = eigen.eigenvectors.column(smallest).into_owned().try_normalize(f64::EPSILON)?;

        let q = query.coords.cast::<f64>();
        let origin = q - plane_normal * (q - centroid).dot(&plane_normal);
        let u_axis = unit_orthogonal(&plane_normal);
        let v_axis = plane_normal.cross(&u_axis);

        let mut surface = Self {
            origin,
            plane_normal,
            u_axis,
            v_axis,
            coefficients: Vec::new(),
            order,
            num_neighbors: neighbors.len(),
        };

        let basis_size = (order + 1) * (order + 2) / 2;
        if order > 0 && neighbors.len() >= basis_size {
            if let Some(coefficients) = surface.fit_polynomial(neighbors, radius as f64, basis_size) {
                surface.coefficients = coefficients;
            }
        }

        Some(surface)
    }

    fn fit_polynomial(&self, neighbors: &[Point3f], radius: f64, basis_size: usize) -> Option<Vec<f64>> {
        let sqr_gauss = radius * radius;
        let mut basis = DMatrix::<f64>::zeros(basis_size, neighbors.len());
        let mut weights = DVector::<f64>::zeros(neighbors.len());
        let mut heights = DVector::<f64>::zeros(neighbors.len());

        for (col, p) in neighbors.iter().enumerate() {
            let d = p.coords.cast::<f64>() - self.origin;
            weights[col] = (-d.norm_squared() / sqr_gauss).exp();
            heights[col] = d.dot(&self.plane_normal);
            let (u, v) = (d.dot(&self.u_axis), d.dot(&self.v_axis));
            let mut row = 0;
            for i in 0..=self.order {
                for j in 0..=(self.order - i) {
                    basis[(row, col)] = monomial(u, i) * monomial(v, j);
                    row += 1;
                }
            }
        }

        let weighted = &basis * DMatrix::from_diagonal(&weights);
        let normal_matrix = &weighted * basis.transpose();
        let rhs = &weighted * heights;
        solve_weighted_system(normal_matrix, rhs).map(|x| x.iter().copied().collect())
    }

    fn height(&self, u: f64, v: f64) -> HeightSample {
        let mut h = HeightSample::default();
        if self.coefficients.is_empty() {
            return h;
        }
        let mut k = 0;
        for i in 0..=self.order {
            for j in 0..=(self.order - i) {
                let c = self.coefficients[k];
                h.w += c * monomial(u, i) * monomial(v, j);
                h.wu += c * monomial_derivative(u, i) * monomial(v, j);
                h.wv += c * monomial(u, i) * monomial_derivative(v, j);
                h.wuu += c * monomial_second_derivative(u, i) * monomial(v, j);
                h.wuv += c * monomial_derivative(u, i) * monomial_derivative(v, j);
                h.wvv += c * monomial(u, i) * monomial_second_derivative(v, j);
                k += 1;
            }
        }
        h
    }

    fn local_coordinates(&self, p: &Point3f) -> (f64, f64) {
        let d = p.coords.cast::<f64>() - self.origin;
        (d.dot(&self.u_axis), d.dot(&self.v_axis))
    }

    /// Project `p` onto the fitted surface, returning the point and unit normal
    pub fn project(&self, p: &Point3f) -> (Point3f, Vector3f) {
        let (u, v) = self.local_coordinates(p);
        let h = self.height(u, v);
        let point = self.origin + self.u_axis * u + self.v_axis * v + self.plane_normal * h.w;
        let normal = (self.plane_normal - self.u_axis * h.wu - self.v_axis * h.wv)
            .try_normalize(f64::EPSILON)
            .unwrap_or(self.plane_normal);
        (Point3f::from(point.cast::<f32>()), normal.cast::<f32>())
    }

    /// Largest principal curvature magnitude of the fit under `p`
    pub fn max_curvature(&self, p: &Point3f) -> f32 {
        let (u, v) = self.local_coordinates(p);
        let h = self.height(u, v);

        let e = 1.0 + h.wu * h.wu;
        let f = h.wu * h.wv;
        let g = 1.0 + h.wv * h.wv;
        let scale = (1.0 + h.wu * h.wu + h.wv * h.wv).sqrt();
        let (l, m, n) = (h.wuu / scale, h.wuv / scale, h.wvv / scale);

        let det = e * g - f * f;
        let gaussian = (l * n - m * m) / det;
        let mean = (e * n - 2.0 * f * m + g * l) / (2.0 * det);
        let spread = (mean * mean - gaussian).max(0.0).sqrt();
        (mean + spread).abs().max((mean - spread).abs()) as f32
    }
}

/// Solve the normal equations, falling back to SVD when Cholesky fails
fn solve_weighted_system(matrix: DMatrix<f64>, rhs: DVector<f64>) -> Option<DVector<f64>> {
    match matrix.clone().cholesky() {
        Some(chol) => Some(chol.solve(&rhs)),
        None => matrix.svd(true, true).solve(&rhs, 1e-12).ok(),
    }
}

/// One input point after fitting
#[derive(Debug, Clone)]
pub struct GuidanceSample {
    pub position: Point3f,
    pub normal: Vector3f,
    pub curvature: f32,
    pub ideal_edge_length: f32,
    pub num_neighbors: usize,
    /// Index of the input point this sample came from
    pub source: usize,
    pub surface: LocalSurface,
}

/// A query point projected onto the guidance field
#[derive(Debug, Clone, Copy)]
pub struct ProjectedSample {
    /// The point that was projected
    pub orig: Point3f,
    pub point: Point3f,
    pub normal: Vector3f,
    /// Guidance sample whose fit was used
    pub closest: usize,
    pub num_neighbors: usize,
    pub curvature: f32,
    pub ideal_edge_length: f32,
}

/// Fitted samples plus sorted-search indices over their positions and the input cloud
pub struct GuidanceField {
    samples: Vec<GuidanceSample>,
    index: StaticPointIndex,
    input_index: StaticPointIndex,
    search_radius: f32,
    reduction: f32,
    required_neighbors: usize,
    boundary_angle_threshold: f32,
}

impl GuidanceField {
    /// Fit every input point; fails when no point yields a usable fit
    pub fn estimate(points: &[Point3f], config: &AfrontConfig) -> Result<Self> {
        info!("Computing guidance field for {} points", points.len());
        let start = Instant::now();

        let input_index = StaticPointIndex::build(points);
        let radius = config.search_radius;
        let pool = ThreadPoolConfig::for_threads(config.threads);

        let fits = parallel::parallel_map_indexed(&pool, points, |i, p| {
            let neighbors: Vec<Point3f> = input_index
                .radius_search(p, radius)
                .into_iter()
                .map(|(j, _)| points[j])
                .collect();
            let surface = LocalSurface::fit(p, &neighbors, radius, config.polynomial_order)?;
            let (position, normal) = surface.project(p);
            let curvature = surface.max_curvature(p);
            Some(GuidanceSample {
                position,
                normal,
                curvature,
                ideal_edge_length: config.ideal_edge_length(curvature),
                num_neighbors: surface.num_neighbors,
                source: i,
                surface,
            })
        })?;

        let samples: Vec<GuidanceSample> = fits.into_iter().flatten().collect();
        if samples.is_empty() {
            return Err(Error::Algorithm(
                "no point produced a valid local fit; try increasing the search radius".to_string(),
            ));
        }

        let positions: Vec<Point3f> = samples.iter().map(|s| s.position).collect();
        let index = StaticPointIndex::build(&positions);

        info!(
            "Computing guidance field finished: {} samples ({:.3} sec)",
            samples.len(),
            start.elapsed().as_secs_f64()
        );

        Ok(Self {
            samples,
            index,
            input_index,
            search_radius: radius,
            reduction: config.reduction,
            required_neighbors: config.required_neighbors,
            boundary_angle_threshold: config.boundary_angle_threshold,
        })
    }

    pub fn samples(&self) -> &[GuidanceSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn index(&self) -> &StaticPointIndex {
        &self.index
    }

    /// Index over the input cloud the field was estimated from
    pub fn input_index(&self) -> &StaticPointIndex {
        &self.input_index
    }

    pub fn search_radius(&self) -> f32 {
        self.search_radius
    }

    /// Project `q` onto the fit of its nearest sample
    pub fn sample_point(&self, q: &Point3f) -> ProjectedSample {
        let closest = self.index.nearest(q).map(|(i, _)| i).unwrap_or(0);
        let sample = &self.samples[closest];
        let (point, normal) = sample.surface.project(q);
        ProjectedSample {
            orig: *q,
            point,
            normal,
            closest,
            num_neighbors: sample.num_neighbors,
            curvature: sample.curvature,
            ideal_edge_length: sample.ideal_edge_length,
        }
    }

    /// Largest safe step from `p`
    ///
    /// Widens the search window in multiples of `radius_hint` (or the search
    /// radius when the hint is not positive) until a sample at distance `d`
    /// satisfies `d >= len / (1 - reduction)`, where `len` is the running
    /// minimum of `(1 - reduction) * d + reduction * ideal_edge_length`. On
    /// success the hint is set to that distance. When the cloud runs out first
    /// a warning is logged and the running minimum (`f32::MAX` if nothing
    /// qualified) is returned.
    pub fn max_step(&self, p: &Point3f, radius_hint: &mut f32) -> f32 {
        if !p.coords.iter().all(|c| c.is_finite()) {
            warn!("Max step requested at a non-finite point");
            return f32::MAX;
        }
        let search_radius = if *radius_hint > 0.0 {
            *radius_hint
        } else {
            self.search_radius
        };
        let keep = 1.0 - self.reduction;

        let mut len = f32::MAX;
        let mut examined = 0usize;
        let mut window = 1usize;
        while examined + 1 < self.samples.len() {
            let found = self.index.radius_search(p, window as f32 * search_radius);
            for &(k, distance) in found.iter().skip(examined) {
                let sample = &self.samples[k];
                if sample.num_neighbors < self.required_neighbors {
                    continue;
                }
                let step = keep * distance + self.reduction * sample.ideal_edge_length;
                len = len.min(step);
                if distance >= len / keep {
                    *radius_hint = distance;
                    return len;
                }
            }
            if !found.is_empty() {
                examined = found.len() - 1;
            }
            window += 1;
        }

        warn!("Max step not found near ({}, {}, {}); using {}", p.x, p.y, p.z, len);
        len
    }

    /// Whether a sample sits on the edge of the cloud
    ///
    /// Neighbours are sorted by their angle in the sample's tangent frame; a
    /// gap wider than the boundary threshold marks a boundary.
    pub fn is_boundary_sample(&self, index: usize) -> bool {
        let sample = &self.samples[index];
        let neighbors = self.index.radius_search(&sample.position, self.search_radius);
        if neighbors.len() < 3 {
            return false;
        }

        let u = sample.surface.u_axis.cast::<f32>();
        let v = sample.surface.v_axis.cast::<f32>();
        let mut angles: Vec<f32> = neighbors
            .iter()
            .filter_map(|&(k, _)| {
                let delta = self.samples[k].position - sample.position;
                if delta == Vector3f::zeros() {
                    None
                } else {
                    Some(v.dot(&delta).atan2(u.dot(&delta)))
                }
            })
            .collect();
        if angles.is_empty() {
            return false;
        }
        angles.sort_by(f32::total_cmp);

        let widest = angles
            .windows(2)
            .map(|w| w[1] - w[0])
            .fold(f32::MIN_POSITIVE, f32::max);
        let wrap = 2.0 * std::f32::consts::PI - angles[angles.len() - 1] + angles[0];
        widest.max(wrap) > self.boundary_angle_threshold
    }
}

impl Default for GuidanceField {
    /// A field with no samples, used before estimation has run
    fn default() -> Self {
        Self {
            samples: Vec::new(),
            index: StaticPointIndex::build(&[]),
            input_index: StaticPointIndex::build(&[]),
            search_radius: 0.0,
            reduction: 0.0,
            required_neighbors: 0,
            boundary_angle_threshold: 0.0,
        }
    }
}

impl NearestNeighborSearch for GuidanceField {
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)> {
        self.index.find_k_nearest(query, k)
    }

    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)> {
        self.index.radius_search(query, radius)
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
