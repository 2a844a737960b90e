//! Synthetic snapshots for tests and demos.
//!
//! Cubic lattices have cube-shaped Voronoi cells whose faces are exactly the
//! six axis neighbors, so expected traversal results can be computed by
//! hand. None of the lattice fixtures carry tetrahedra; use [`edge_ring`]
//! for the tetra graph.

use std::collections::HashMap;

use vort_math::{midpoint, Aabb3, Point3, Vec3};

use crate::fields::{FieldStore, HydroCell};
use crate::snapshot::{MeshPoint, MeshSnapshot, PointKind, Tetra, VoronoiFace};

type Coord = (i64, i64, i64);

/// Global cell id of lattice coordinate `(i, j, k)`.
pub fn lattice_id(n: usize, i: usize, j: usize, k: usize) -> u64 {
    (i + n * (j + n * k)) as u64
}

fn cell_center(c: Coord, spacing: f64) -> Point3 {
    Point3::new(
        (c.0 as f64 + 0.5) * spacing,
        (c.1 as f64 + 0.5) * spacing,
        (c.2 as f64 + 0.5) * spacing,
    )
}

/// Connect every pair of points whose lattice coordinates differ by one
/// step along a single axis.
fn lattice_faces(coords: &[Coord], spacing: f64) -> Vec<VoronoiFace> {
    let lookup: HashMap<Coord, usize> = coords.iter().enumerate().map(|(i, &c)| (c, i)).collect();
    let mut faces = Vec::new();
    for (p, &(i, j, k)) in coords.iter().enumerate() {
        for step in [(i + 1, j, k), (i, j + 1, k), (i, j, k + 1)] {
            if let Some(&q) = lookup.get(&step) {
                let a = cell_center((i, j, k), spacing);
                let b = cell_center(step, spacing);
                faces.push(VoronoiFace {
                    p1: p,
                    p2: q,
                    area: spacing * spacing,
                    centroid: midpoint(&a, &b),
                });
            }
        }
    }
    faces
}

/// Single-task `n x n x n` lattice with cells of edge `spacing`, spanning
/// `[0, n * spacing]` on each axis. Point index equals the global id.
pub fn lattice(n: usize, spacing: f64) -> MeshSnapshot {
    let mut coords = Vec::with_capacity(n * n * n);
    let mut points = Vec::with_capacity(n * n * n);
    for k in 0..n {
        for j in 0..n {
            for i in 0..n {
                let c = (i as i64, j as i64, k as i64);
                points.push(MeshPoint {
                    id: lattice_id(n, i, j, k),
                    position: cell_center(c, spacing),
                    task: 0,
                    cell: points.len(),
                    kind: PointKind::Primary,
                });
                coords.push(c);
            }
        }
    }

    MeshSnapshot {
        version: 1,
        task: 0,
        num_tasks: 1,
        extent: Aabb3::cube(n as f64 * spacing),
        num_primary: points.len(),
        faces: lattice_faces(&coords, spacing),
        points,
        tetras: Vec::new(),
        circumcenters: Vec::new(),
    }
}

/// Lattice that is periodic along x: a ghost layer at `i = -1` images the
/// cells at `i = n - 1`, and a layer at `i = n` images the cells at `i = 0`.
///
/// The ghost layers lie outside the extent.
pub fn periodic_lattice(n: usize, spacing: f64) -> MeshSnapshot {
    let mut snap = lattice(n, spacing);
    let mut coords: Vec<Coord> = snap
        .points
        .iter()
        .enumerate()
        .map(|(idx, _)| {
            let (i, j, k) = (idx % n, (idx / n) % n, idx / (n * n));
            (i as i64, j as i64, k as i64)
        })
        .collect();

    for (gi, src) in [(-1i64, n - 1), (n as i64, 0)] {
        for k in 0..n {
            for j in 0..n {
                let cell = src + n * (j + n * k);
                snap.points.push(MeshPoint {
                    id: lattice_id(n, src, j, k),
                    position: cell_center((gi, j as i64, k as i64), spacing),
                    task: 0,
                    cell,
                    kind: PointKind::Ghost,
                });
                coords.push((gi, j as i64, k as i64));
            }
        }
    }

    snap.faces = lattice_faces(&coords, spacing);
    snap
}

/// Split an `n`-lattice into `tasks` slabs along x, one snapshot per task.
///
/// Task `r` owns columns `r * n / tasks .. (r + 1) * n / tasks`. Each
/// snapshot carries its own primaries followed by one foreign ghost layer
/// on each side that borders another task. A ghost's `cell` is the owning
/// task's local index of the imaged cell.
pub fn slab_partition(n: usize, spacing: f64, tasks: usize) -> Vec<MeshSnapshot> {
    let lo = |r: usize| r * n / tasks;
    let width = |r: usize| lo(r + 1) - lo(r);
    let local = |r: usize, i: usize, j: usize, k: usize| (i - lo(r)) + width(r) * (j + n * k);

    (0..tasks)
        .map(|r| {
            let mut points = Vec::new();
            let mut coords = Vec::new();
            for k in 0..n {
                for j in 0..n {
                    for i in lo(r)..lo(r + 1) {
                        points.push(MeshPoint {
                            id: lattice_id(n, i, j, k),
                            position: cell_center((i as i64, j as i64, k as i64), spacing),
                            task: r,
                            cell: local(r, i, j, k),
                            kind: PointKind::Primary,
                        });
                        coords.push((i as i64, j as i64, k as i64));
                    }
                }
            }
            let num_primary = points.len();

            let mut layers = Vec::new();
            if r > 0 {
                layers.push((r - 1, lo(r) - 1));
            }
            if r + 1 < tasks {
                layers.push((r + 1, lo(r + 1)));
            }
            for (owner, i) in layers {
                for k in 0..n {
                    for j in 0..n {
                        points.push(MeshPoint {
                            id: lattice_id(n, i, j, k),
                            position: cell_center((i as i64, j as i64, k as i64), spacing),
                            task: owner,
                            cell: local(owner, i, j, k),
                            kind: PointKind::Ghost,
                        });
                        coords.push((i as i64, j as i64, k as i64));
                    }
                }
            }

            MeshSnapshot {
                version: 1,
                task: r,
                num_tasks: tasks,
                extent: Aabb3::cube(n as f64 * spacing),
                num_primary,
                faces: lattice_faces(&coords, spacing),
                points,
                tetras: Vec::new(),
                circumcenters: Vec::new(),
            }
        })
        .collect()
}

/// Hydro state at rest with the given density and no gradient.
pub fn hydro_cell(density: f64, center: Point3) -> HydroCell {
    HydroCell {
        density,
        utherm: 1.0,
        pressure: density,
        energy: 1.5 * density,
        velocity: Vec3::zeros(),
        density_gradient: Vec3::zeros(),
        center,
    }
}

/// One cell per primary, built by `f` from the primary's position.
pub fn fields_with(snapshot: &MeshSnapshot, f: impl Fn(&Point3) -> HydroCell) -> FieldStore {
    FieldStore::new(
        snapshot.points[..snapshot.num_primary]
            .iter()
            .map(|p| f(&p.position))
            .collect(),
    )
}

/// Constant density everywhere.
pub fn uniform_fields(snapshot: &MeshSnapshot, density: f64) -> FieldStore {
    fields_with(snapshot, |p| hydro_cell(density, *p))
}

/// Density `rho0 + grad . x`, stored as cell value plus gradient so that the
/// gradient-corrected value is exact at every position.
pub fn linear_fields(snapshot: &MeshSnapshot, rho0: f64, grad: Vec3) -> FieldStore {
    fields_with(snapshot, |p| HydroCell {
        density_gradient: grad,
        ..hydro_cell(rho0 + grad.dot(&p.coords), *p)
    })
}

/// Circumcenter of the tetrahedron `a b c d`.
///
/// Falls back to the vertex centroid for a flat tetra.
pub fn circumcenter(a: &Point3, b: &Point3, c: &Point3, d: &Point3) -> Point3 {
    let u = b - a;
    let v = c - a;
    let w = d - a;
    let denom = 2.0 * u.dot(&v.cross(&w));
    if denom.abs() < 1e-300 {
        return Point3::from((a.coords + b.coords + c.coords + d.coords) * 0.25);
    }
    let num = u.norm_squared() * v.cross(&w)
        + v.norm_squared() * w.cross(&u)
        + w.norm_squared() * u.cross(&v);
    a + num / denom
}

/// Ring of `k` tetrahedra sharing the edge between two apex points.
///
/// Points 0 and 1 sit at `z = -1` and `z = 1` on the axis; points
/// `2..2 + k` lie on a circle of radius 2 in `z = 0`. Tetra `m` is
/// `[apex0, apex1, ring[m], ring[m + 1]]`, so the faces opposite the apexes
/// are open hull. Face 0 is the axis face; its Voronoi polygon is a regular
/// `k`-gon in `z = 0`.
pub fn edge_ring(k: usize) -> MeshSnapshot {
    let mut positions = vec![Point3::new(0.0, 0.0, -1.0), Point3::new(0.0, 0.0, 1.0)];
    for m in 0..k {
        let phi = std::f64::consts::TAU * m as f64 / k as f64;
        positions.push(Point3::new(2.0 * phi.cos(), 2.0 * phi.sin(), 0.0));
    }
    let ring = |m: usize| 2 + m % k;

    let points: Vec<MeshPoint> = positions
        .iter()
        .enumerate()
        .map(|(i, &position)| MeshPoint {
            id: i as u64,
            position,
            task: 0,
            cell: i,
            kind: PointKind::Primary,
        })
        .collect();

    let mut tetras = Vec::with_capacity(k);
    let mut circumcenters = Vec::with_capacity(k);
    for m in 0..k {
        let p = [Some(0), Some(1), Some(ring(m)), Some(ring(m + 1))];
        let t = [None, None, Some((m + 1) % k), Some((m + k - 1) % k)];
        tetras.push(Tetra::new(p, t));
        circumcenters.push(circumcenter(
            &positions[0],
            &positions[1],
            &positions[ring(m)],
            &positions[ring(m + 1)],
        ));
    }

    let face = |p1: usize, p2: usize| VoronoiFace {
        p1,
        p2,
        area: 0.0,
        centroid: midpoint(&positions[p1], &positions[p2]),
    };
    let mut faces = vec![face(0, 1)];
    for m in 0..k {
        faces.push(face(0, ring(m)));
        faces.push(face(1, ring(m)));
        faces.push(face(ring(m), ring(m + 1)));
    }

    MeshSnapshot {
        version: 1,
        task: 0,
        num_tasks: 1,
        extent: Aabb3::new(Point3::new(-2.5, -2.5, -2.5), Point3::new(2.5, 2.5, 2.5)),
        num_primary: points.len(),
        points,
        tetras,
        circumcenters,
        faces,
    }
}
