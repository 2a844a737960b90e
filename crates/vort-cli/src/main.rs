//! vort CLI - inspect, verify and ray trace Voronoi mesh snapshots
//!
//! Snapshots are JSON files holding one task's mesh and hydro fields. A
//! partitioned run passes one file per task, in task order.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use vort_math::Vec3;
use vort_mesh::{check, dump, testkit, Connectivity, FacePolygons};
use vort_trace::{
    run_partitioned, KdTree, LocalExchange, NearestNeighbor, TraceEngine, TraceOutcome,
    TraceRay,
};

mod config;
mod files;

use config::TraceConfig;
use files::{read_rays, SnapshotFile};

#[derive(Parser)]
#[command(name = "vort")]
#[command(about = "Ray marching through Voronoi mesh snapshots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print counts and field statistics of a snapshot
    Info {
        /// Snapshot file
        input: PathBuf,
    },
    /// Write a tabular listing of a snapshot and its connectivity
    Dump {
        /// Snapshot file
        input: PathBuf,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Also list face polygons built from the tetrahedra
        #[arg(long)]
        polygons: bool,
        /// Append Delaunay and Voronoi edge segments
        #[arg(long)]
        wireframe: bool,
    },
    /// Check connectivity and that every generator lies in its own cell
    Verify {
        /// Snapshot file
        input: PathBuf,
        /// Compare against all points instead of direct neighbors
        #[arg(long)]
        full: bool,
    },
    /// Trace rays and write their samples as JSON
    Trace {
        /// Snapshot files, one per task in task order
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// JSON list of rays
        #[arg(short, long)]
        rays: PathBuf,
        /// TOML trace configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the sub-step size
        #[arg(long)]
        step_size: Option<f64>,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write a lattice test snapshot, split into slabs for several tasks
    Lattice {
        /// Cells per axis
        n: usize,
        /// Cell edge length
        #[arg(long, default_value_t = 1.0)]
        spacing: f64,
        /// Number of tasks
        #[arg(long, default_value_t = 1)]
        tasks: usize,
        /// Density at the origin
        #[arg(long, default_value_t = 1.0)]
        density: f64,
        /// Density gradient
        #[arg(long, num_args = 3, value_names = ["GX", "GY", "GZ"])]
        gradient: Option<Vec<f64>>,
        /// Output path prefix; task files are named PREFIX.N.json
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Info { input } => show_info(&input)?,
        Commands::Dump {
            input,
            output,
            polygons,
            wireframe,
        } => dump_snapshot(&input, output.as_deref(), polygons, wireframe)?,
        Commands::Verify { input, full } => verify_snapshot(&input, full)?,
        Commands::Trace {
            inputs,
            rays,
            config,
            step_size,
            output,
        } => trace(&inputs, &rays, config.as_deref(), step_size, output.as_deref())?,
        Commands::Lattice {
            n,
            spacing,
            tasks,
            density,
            gradient,
            output,
        } => write_lattice(n, spacing, tasks, density, gradient, &output)?,
    }

    Ok(())
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("creating {}", p.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

fn show_info(input: &Path) -> Result<()> {
    let snap = SnapshotFile::read(input)?;
    let mesh = &snap.mesh;

    println!("Snapshot: {}", input.display());
    println!("  Version: {}", mesh.version);
    println!("  Task: {} of {}", mesh.task, mesh.num_tasks);
    println!(
        "  Extent: ({}, {}, {}) - ({}, {}, {})",
        mesh.extent.min.x,
        mesh.extent.min.y,
        mesh.extent.min.z,
        mesh.extent.max.x,
        mesh.extent.max.y,
        mesh.extent.max.z
    );
    println!(
        "  Points: {} ({} primary, {} ghost)",
        mesh.num_points(),
        mesh.num_primary,
        mesh.num_points() - mesh.num_primary
    );
    println!("  Tetrahedra: {}", mesh.num_tetras());
    println!("  Faces: {}", mesh.faces.len());

    let conn = Connectivity::build(mesh)?;
    println!("  Connectivity edges: {}", conn.num_edges());

    if let Some(b) = snap.fields.quantity_bounds() {
        println!(
            "  Density: min {:.6e} max {:.6e} mean {:.6e}",
            b.density.min, b.density.max, b.density.mean
        );
        println!(
            "  Utherm: min {:.6e} max {:.6e} mean {:.6e}",
            b.utherm.min, b.utherm.max, b.utherm.mean
        );
    }
    Ok(())
}

fn dump_snapshot(input: &Path, output: Option<&Path>, polygons: bool, wireframe: bool) -> Result<()> {
    let snap = SnapshotFile::read(input)?;
    let conn = Connectivity::build(&snap.mesh)?;
    let polys = if polygons || wireframe {
        if snap.mesh.tetras.is_empty() {
            anyhow::bail!("{} has no tetrahedra to build polygons from", input.display());
        }
        Some(FacePolygons::build(&snap.mesh)?)
    } else {
        None
    };

    let mut w = open_output(output)?;
    let listed = if polygons { polys.as_ref() } else { None };
    dump::write_mesh(&mut w, &snap.mesh, Some(&snap.fields), Some(&conn), listed)?;
    if wireframe {
        dump::write_wireframe(&mut w, &snap.mesh, polys.as_ref())?;
    }
    w.flush()?;
    Ok(())
}

fn verify_snapshot(input: &Path, full: bool) -> Result<()> {
    let snap = SnapshotFile::read(input)?;
    let mesh = &snap.mesh;
    let conn = Connectivity::build(mesh)?;
    let tol = vort_math::Tolerance::DEFAULT;

    for p in 0..mesh.num_primary {
        let pos = mesh.position(p);
        if full {
            check::verify_point_in_cell(mesh, p, &pos, &tol)?;
        } else {
            check::verify_point_in_cell_local(mesh, &conn, p, &pos, &tol)?;
        }
    }
    if !mesh.tetras.is_empty() {
        let polys = FacePolygons::build(mesh)?;
        println!("Face polygons: {} with {} vertices", polys.len(), polys.num_vertices());
    }

    println!(
        "OK: {} points, {} edges, {} primaries checked",
        mesh.num_points(),
        conn.num_edges(),
        mesh.num_primary
    );
    Ok(())
}

fn trace(
    inputs: &[PathBuf],
    rays: &Path,
    config: Option<&Path>,
    step_size: Option<f64>,
    output: Option<&Path>,
) -> Result<()> {
    let mut config = TraceConfig::load(config)?;
    if step_size.is_some() {
        config.settings.step_size = step_size;
    }
    config.settings.validate()?;
    config.transfer.validate()?;

    let mut snaps = inputs
        .iter()
        .map(|p| SnapshotFile::read(p))
        .collect::<Result<Vec<_>>>()?;
    for (t, s) in snaps.iter().enumerate() {
        if s.mesh.task != t || s.mesh.num_tasks != snaps.len() {
            anyhow::bail!(
                "snapshot {} is task {} of {}, expected task {} of {}",
                inputs[t].display(),
                s.mesh.task,
                s.mesh.num_tasks,
                t,
                snaps.len()
            );
        }
    }
    if config.limit_boundary_densities {
        for s in &mut snaps {
            let n = s.fields.limit_boundary_densities(&s.mesh);
            log::info!("task {}: zeroed {} boundary cells", s.mesh.task, n);
        }
    }

    let conns = snaps
        .iter()
        .map(|s| Connectivity::build(&s.mesh))
        .collect::<vort_mesh::Result<Vec<_>>>()?;
    let trees: Vec<KdTree> = snaps.iter().map(|s| KdTree::build(&s.mesh)).collect();
    let transfer = config.transfer.as_transfer();
    let engines = snaps
        .iter()
        .zip(&conns)
        .zip(&trees)
        .map(|((s, c), t)| TraceEngine::new(&s.mesh, c, &s.fields, transfer, t, &config.settings))
        .collect::<vort_trace::Result<Vec<_>>>()?;

    let extent = snaps[0].mesh.extent;
    let specs = read_rays(rays)?;
    let mut rays: Vec<TraceRay> = Vec::with_capacity(specs.len());
    for spec in &specs {
        match spec.to_ray(&extent)? {
            Some(ray) => rays.push(ray),
            None => log::warn!("ray {} misses the domain", spec.id),
        }
    }

    let samples = if engines.len() == 1 {
        engines[0]
            .trace_batch(&rays)?
            .into_iter()
            .map(|outcome| match outcome {
                TraceOutcome::Finished(s) => Ok(s),
                TraceOutcome::Handoff(m) => Err(anyhow::anyhow!(
                    "ray {} left for task {} in a single-task run",
                    m.ray_id,
                    m.dest_task
                )),
            })
            .collect::<Result<Vec<_>>>()?
    } else {
        let start: Vec<(usize, TraceRay)> = rays
            .into_iter()
            .map(|ray| (start_task(&trees, &ray), ray))
            .collect();
        let channel = LocalExchange::new(engines.len());
        run_partitioned(&engines, &channel, start)?
    };

    let mut w = open_output(output)?;
    serde_json::to_writer_pretty(&mut w, &samples)?;
    writeln!(w)?;
    w.flush()?;
    Ok(())
}

/// Task whose primaries lie closest to the ray's start.
fn start_task(trees: &[KdTree], ray: &TraceRay) -> usize {
    let pos = ray.position();
    trees
        .iter()
        .enumerate()
        .filter_map(|(t, tree)| tree.find_nearest(&pos, None).map(|(_, d)| (t, d)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map_or(0, |(t, _)| t)
}

fn write_lattice(
    n: usize,
    spacing: f64,
    tasks: usize,
    density: f64,
    gradient: Option<Vec<f64>>,
    output: &Path,
) -> Result<()> {
    if n == 0 || tasks == 0 || tasks > n {
        anyhow::bail!("need 0 < tasks <= n, got n = {n}, tasks = {tasks}");
    }
    if !(spacing > 0.0) {
        anyhow::bail!("spacing must be positive");
    }
    let grad = match gradient.as_deref() {
        Some([x, y, z]) => Vec3::new(*x, *y, *z),
        Some(_) => anyhow::bail!("gradient needs three components"),
        None => Vec3::zeros(),
    };

    let meshes = if tasks == 1 {
        vec![testkit::lattice(n, spacing)]
    } else {
        testkit::slab_partition(n, spacing, tasks)
    };
    for mesh in meshes {
        let fields = testkit::linear_fields(&mesh, density, grad);
        let path = if tasks == 1 {
            output.with_extension("json")
        } else {
            PathBuf::from(format!("{}.{}.json", output.display(), mesh.task))
        };
        SnapshotFile { mesh, fields }.write(&path)?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}
