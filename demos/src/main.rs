use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use env_logger::Env;
use log::{debug, info};

use frontmesh_core::{Point3f, PointCloud3f, TriangleMesh, Vector3f};
use frontmesh_reconstruction::{AfrontConfig, AfrontMesher, SeedSelection, StepEvent, StepOutcome};

/// Reconstruct a synthetic point cloud with the advancing-front mesher
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Surface to sample
    #[clap(value_enum, default_value_t = Shape::Wave)]
    shape: Shape,

    /// Sample spacing
    #[clap(long, default_value_t = 0.05)]
    spacing: f32,

    /// Neighbourhood radius for local fits
    #[clap(short, long, default_value_t = 0.15)]
    radius: f32,

    /// Edge length reduction factor
    #[clap(long, default_value_t = 0.8)]
    reduction: f32,

    /// Order of the local polynomial fit
    #[clap(long, default_value_t = 2)]
    order: usize,

    /// Index of the sample to seed from (random when omitted)
    #[clap(long)]
    seed_index: Option<usize>,

    /// Random seed used when no seed index is given
    #[clap(long, default_value_t = 0)]
    random_seed: u64,

    /// Worker threads for guidance estimation (0 = all cores)
    #[clap(short, long, default_value_t = 0)]
    threads: usize,

    /// Orient the result towards a viewer looking down the -Z axis
    #[clap(long)]
    orient: bool,

    /// Name of a `.obj` file to write
    #[clap(short, long)]
    out: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Shape {
    Plane,
    Wave,
    Sphere,
    Holed,
}

fn sample_shape(shape: Shape, spacing: f32) -> PointCloud3f {
    let n = (2.0 / spacing).round() as usize + 1;
    let grid = move |height: fn(f32, f32) -> f32| {
        (0..n).flat_map(move |i| {
            (0..n).map(move |j| {
                let (x, y) = (i as f32 * spacing - 1.0, j as f32 * spacing - 1.0);
                Point3f::new(x, y, height(x, y))
            })
        })
    };

    match shape {
        Shape::Plane => grid(|_, _| 0.0).collect(),
        Shape::Wave => grid(|x, y| 0.2 * (2.0 * x).sin() * (1.5 * y).cos()).collect(),
        Shape::Holed => grid(|_, _| 0.0).filter(|p| p.coords.xy().norm() > 0.4).collect(),
        Shape::Sphere => {
            // Fibonacci lattice on the unit sphere
            let count = (4.0 * std::f32::consts::PI / (spacing * spacing)) as usize;
            let golden = std::f32::consts::PI * (3.0 - 5.0f32.sqrt());
            (0..count)
                .map(|i| {
                    let z = 1.0 - 2.0 * (i as f32 + 0.5) / count as f32;
                    let r = (1.0 - z * z).sqrt();
                    let theta = golden * i as f32;
                    Point3f::new(r * theta.cos(), r * theta.sin(), z)
                })
                .collect()
        }
    }
}

fn write_obj(path: &Path, mesh: &TriangleMesh) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for v in &mesh.vertices {
        writeln!(out, "v {} {} {}", v.x, v.y, v.z)?;
    }
    if let Some(normals) = &mesh.normals {
        for n in normals {
            writeln!(out, "vn {} {} {}", n.x, n.y, n.z)?;
        }
        for [a, b, c] in &mesh.faces {
            writeln!(out, "f {0}//{0} {1}//{1} {2}//{2}", a + 1, b + 1, c + 1)?;
        }
    } else {
        for [a, b, c] in &mesh.faces {
            writeln!(out, "f {} {} {}", a + 1, b + 1, c + 1)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.spacing <= 0.0 {
        bail!("spacing must be positive");
    }

    let start = Instant::now();
    let cloud = sample_shape(args.shape, args.spacing);
    info!("Sampled {} points from {:?} in {:?}", cloud.len(), args.shape, start.elapsed());
    if let Some((min, max)) = cloud.bounding_box() {
        info!(
            "Bounds ({:.2}, {:.2}, {:.2}) to ({:.2}, {:.2}, {:.2})",
            min.x, min.y, min.z, max.x, max.y, max.z
        );
    }

    let seed = match args.seed_index {
        Some(i) => SeedSelection::Index(i),
        None => SeedSelection::Random(args.random_seed),
    };
    let config = AfrontConfig::new(args.radius)
        .with_reduction(args.reduction)
        .with_polynomial_order(args.order)
        .with_threads(args.threads)
        .with_seed(seed);

    let mut mesher = AfrontMesher::new(&cloud, config);
    let mut deferred = 0usize;
    mesher.set_observer(move |event: &StepEvent| {
        if let StepOutcome::Deferred { edge, reason } = &event.outcome {
            deferred += 1;
            debug!("step {}: {:?} kept as boundary ({}), {} deferred so far", event.step, edge, reason, deferred);
        }
    });

    let summary = mesher.reconstruct()?;
    println!(
        "{} vertices, {} faces, {} boundary edges after {} steps ({:?})",
        summary.vertices, summary.faces, summary.boundary_edges, summary.steps, summary.elapsed
    );
    println!("longest edge: {:.4}", mesher.max_edge_length());

    let mesh = if args.orient {
        // look down at the first sample so the ray always meets the surface
        let target = cloud.points.first().copied().unwrap_or_else(Point3f::origin);
        let eye = target + Vector3f::z() * 10.0;
        let view = mesher.orient_from_viewpoint(&eye, &-Vector3f::z())?;
        info!("Oriented towards +Z (flipped: {})", view.flipped);
        view.mesh
    } else {
        mesher.mesh()
    };

    if let Some(out) = &args.out {
        let now = Instant::now();
        write_obj(out, &mesh)?;
        info!("Wrote {:?} in {:?}", out, now.elapsed());
    }
    Ok(())
}
