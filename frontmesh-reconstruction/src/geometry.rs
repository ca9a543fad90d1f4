//! Geometric predicates used while advancing the front

use frontmesh_core::{Point3f, Vector3f};
use nalgebra::Matrix3;
use std::f32::consts::PI;

/// Midpoint of a segment
pub fn mid_point(a: &Point3f, b: &Point3f) -> Point3f {
    Point3f::from((a.coords + b.coords) * 0.5)
}

/// Distance from `p` to the segment `a`-`b`
pub fn point_segment_distance(a: &Point3f, b: &Point3f, p: &Point3f) -> f32 {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 <= f32::EPSILON {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

/// `normal` flipped if needed so it points into the same half-space as `reference`
pub fn align_normal(normal: &Vector3f, reference: &Vector3f) -> Vector3f {
    if normal.dot(reference) < 0.0 {
        -normal
    } else {
        *normal
    }
}

/// Whether the angle between two directions is within `tolerance` radians
pub fn check_normal(a: &Vector3f, b: &Vector3f, tolerance: f32) -> bool {
    match (a.try_normalize(f32::EPSILON), b.try_normalize(f32::EPSILON)) {
        (Some(a), Some(b)) => a.dot(&b).clamp(-1.0, 1.0).acos() <= tolerance,
        _ => false,
    }
}

/// Direction in which a front edge grows, away from the face it bounds
pub fn grow_direction(p0: &Point3f, mid: &Point3f, face_center: &Point3f, face_normal: &Vector3f) -> Vector3f {
    let along = mid - p0;
    let dir = face_normal.cross(&along).normalize();
    if dir.dot(&(face_center - mid)) > 0.0 {
        -dir
    } else {
        dir
    }
}

/// Parametric coordinates of a line hitting a plane patch
///
/// The plane passes through `origin` spanned by `u` and `v`; the line runs
/// from `l0` along `w`. The hit point is `origin + mu*u + mv*v`, which also
/// equals `l0 + mw*w`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinePlaneIntersection {
    pub mu: f32,
    pub mv: f32,
    pub mw: f32,
    pub w: Vector3f,
}

/// Intersect the line `l0`-`l1` with a plane patch; `None` when they are parallel
pub fn intersect_line_plane(
    l0: &Point3f,
    l1: &Point3f,
    origin: &Point3f,
    u: &Vector3f,
    v: &Vector3f,
) -> Option<LinePlaneIntersection> {
    let w = l1 - l0;
    let normal = u.cross(v).try_normalize(f32::EPSILON)?;
    let w_dir = w.try_normalize(f32::EPSILON)?;
    if normal.dot(&w_dir).abs() < 1e-8 {
        return None;
    }

    let basis = Matrix3::from_columns(&[*u, *v, -w]);
    let params = basis.try_inverse()? * (l0 - origin);
    Some(LinePlaneIntersection {
        mu: params.x,
        mv: params.y,
        mw: params.z,
        w,
    })
}

/// Geometry of a boundary edge about to be advanced
#[derive(Debug, Clone, Copy)]
pub struct FrontGeometry {
    pub p: [Point3f; 2],
    pub n: [Vector3f; 2],
    pub mid: Point3f,
    pub length: f32,
    pub direction: Vector3f,
}

impl FrontGeometry {
    pub fn new(p: [Point3f; 2], n: [Vector3f; 2], face_center: &Point3f, face_normal: &Vector3f) -> Self {
        let mid = mid_point(&p[0], &p[1]);
        Self {
            p,
            n,
            mid,
            length: (p[1] - p[0]).norm(),
            direction: grow_direction(&p[0], &mid, face_center, face_normal),
        }
    }

    /// Whether `q` lies on the growing side of the edge
    pub fn is_ahead(&self, q: &Point3f) -> bool {
        (q - self.mid).dot(&self.direction) > 0.0
    }
}

/// Angular tolerances applied to candidate triangles
#[derive(Debug, Clone, Copy)]
pub struct NormalTolerances {
    pub vertex: f32,
    pub triangle: f32,
}

/// Shape and validity of the triangle a front edge would form with an apex
///
/// Angle `b` sits at the front origin, `c` at the front target and `a` at the
/// apex. Side `side_a` is the front edge, `side_b` runs from the front target
/// to the apex and `side_c` from the front origin to the apex.
#[derive(Debug, Clone, Copy)]
pub struct TriangleCandidate {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub side_a: f32,
    pub side_b: f32,
    pub side_c: f32,
    pub aspect_ratio: f32,
    pub normal: Vector3f,
    pub points: [Point3f; 3],
    pub point_valid: bool,
    pub vertex_normals_valid: bool,
    pub triangle_normal_valid: bool,
}

impl TriangleCandidate {
    pub fn new(front: &FrontGeometry, apex: &Point3f, apex_normal: &Vector3f, tolerances: &NormalTolerances) -> Self {
        let [p0, p1] = front.p;
        let v1 = p1 - p0;
        let v2 = apex - p1;
        let v3 = apex - p0;

        let side_a = v1.norm();
        let side_b = v2.norm();
        let side_c = v3.norm();

        let cross = v1.cross(&v3);
        let b = cross.norm().atan2(v1.dot(&v3));
        let c = (-v1).cross(&v2).norm().atan2((-v1).dot(&v2));

        let area = 0.5 * cross.norm();
        let aspect_ratio = 4.0 * area * 3.0f32.sqrt() / (side_a * side_a + side_b * side_b + side_c * side_c);

        let (normal, degenerate) = match cross.try_normalize(f32::EPSILON) {
            Some(n) => (align_normal(&n, &front.n[0]), false),
            None => (front.n[0], true),
        };

        let point_valid = v2.dot(&front.direction) > 0.0;
        let mut vertex_normals_valid = true;
        let mut triangle_normal_valid = !degenerate;
        if !check_normal(&front.n[0], apex_normal, tolerances.vertex)
            || !check_normal(&front.n[1], apex_normal, tolerances.vertex)
        {
            vertex_normals_valid = false;
            triangle_normal_valid = false;
        } else {
            let average = (front.n[0] + front.n[1] + apex_normal) / 3.0;
            if !check_normal(&average, &normal, tolerances.triangle) {
                triangle_normal_valid = false;
            }
        }

        Self {
            a: PI - b - c,
            b,
            c,
            side_a,
            side_b,
            side_c,
            aspect_ratio,
            normal,
            points: [p0, p1, *apex],
            point_valid,
            vertex_normals_valid,
            triangle_normal_valid,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.point_valid && self.vertex_normals_valid && self.triangle_normal_valid
    }

    pub fn centroid(&self) -> Point3f {
        Point3f::from((self.points[0].coords + self.points[1].coords + self.points[2].coords) / 3.0)
    }

    pub fn apex(&self) -> Point3f {
        self.points[2]
    }
}
