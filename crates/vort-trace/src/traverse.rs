//! Ray-cell traversal: one Voronoi cell per call.
//!
//! Each step finds the face through which the ray leaves the current cell,
//! integrates emission over the in-cell segment, and moves the ray to the
//! neighbor across that face. The neighbor may belong to another task, in
//! which case the caller hands the ray off.

use vort_math::Point3;
use vort_mesh::{check, Connectivity, FieldStore, HydroCell, MeshSnapshot};

use crate::error::{Result, TraceError};
use crate::ray::{Accumulator, TraceRay, TraversalState};
use crate::settings::TraceSettings;
use crate::spectrum::Spectrum;
use crate::transfer::{FieldVector, TransferFunction};

/// Read-only view of everything a traversal step touches.
#[derive(Clone, Copy)]
pub struct Traversal<'a> {
    snapshot: &'a MeshSnapshot,
    conn: &'a Connectivity,
    fields: &'a FieldStore,
    transfer: &'a dyn TransferFunction,
    settings: &'a TraceSettings,
}

impl<'a> Traversal<'a> {
    /// Bundle a snapshot with its derived data.
    ///
    /// Fails if the field store or connectivity do not belong to the
    /// snapshot.
    pub fn new(
        snapshot: &'a MeshSnapshot,
        conn: &'a Connectivity,
        fields: &'a FieldStore,
        transfer: &'a dyn TransferFunction,
        settings: &'a TraceSettings,
    ) -> Result<Self> {
        fields.check_matches(snapshot)?;
        conn.check_matches(snapshot)?;
        Ok(Self {
            snapshot,
            conn,
            fields,
            transfer,
            settings,
        })
    }

    /// Advance `ray` through its current cell.
    ///
    /// Returns `true` if the ray moved into a neighbor and should be advanced
    /// again (possibly on another task, see [`TraceRay::task`]), `false` once
    /// it has left the domain or exhausted its span.
    pub fn advance_one_cell(&self, ray: &mut TraceRay, acc: &mut Accumulator) -> Result<bool> {
        let local = self.snapshot.task;
        if ray.task != local {
            return Err(TraceError::WrongTask {
                ray_task: ray.task,
                local_task: local,
            });
        }
        let cell = ray.cell;
        if cell >= self.snapshot.num_points() {
            return Err(TraceError::CellOutOfRange {
                cell,
                len: self.snapshot.num_points(),
            });
        }

        let eps = self.settings.inside_eps;
        if self.settings.verify_each_step {
            check::verify_point_in_cell_local(
                self.snapshot,
                self.conn,
                cell,
                &ray.position(),
                &self.settings.tolerance(),
            )?;
        }
        ray.steps += 1;

        match self.find_exit(ray) {
            Some((next, t_exit)) if t_exit < ray.max_t - eps => {
                let t_in = ray.min_t;
                let t_exit = t_exit.clamp(t_in, ray.max_t);
                self.integrate(ray, cell, t_in, t_exit, acc)?;

                ray.prev_cell = Some(cell);
                ray.cell = next;
                ray.task = self.snapshot.points[next].task;
                ray.min_t = t_exit;

                log::trace!(
                    "ray {}: {} -> {} (task {}) at t = {:.10}",
                    ray.id,
                    cell,
                    next,
                    ray.task,
                    ray.min_t
                );

                if (ray.max_t - ray.min_t).abs() <= eps {
                    ray.state = TraversalState::Done;
                    return Ok(false);
                }
                ray.state = if ray.task == local {
                    TraversalState::InCell
                } else {
                    TraversalState::ExitingFace
                };
                Ok(true)
            }
            Some(_) => {
                // Segment ends inside this cell.
                self.finish(ray, cell, acc)?;
                Ok(false)
            }
            None => {
                let end = ray.line.at(ray.max_t);
                if !self.snapshot.extent.contains_strict(&end, eps) {
                    self.finish(ray, cell, acc)?;
                    Ok(false)
                } else if ray.min_t < ray.max_t - eps {
                    Err(TraceError::MissingExit {
                        ray: ray.id,
                        cell,
                        min_t: ray.min_t,
                        max_t: ray.max_t,
                    })
                } else {
                    ray.min_t = ray.max_t;
                    ray.state = TraversalState::Done;
                    Ok(false)
                }
            }
        }
    }

    /// Nearest face the ray leaves the current cell through, as
    /// `(opposite point, absolute ray parameter)`.
    fn find_exit(&self, ray: &TraceRay) -> Option<(usize, f64)> {
        let pos = ray.position();
        let cellp = self.snapshot.position(ray.cell);
        let dir = ray.line.direction.into_inner();
        let eps = self.settings.inside_eps;

        let mut best: Option<(usize, f64)> = None;
        for e in self.conn.neighbors(ray.cell) {
            if Some(e.opposite) == ray.prev_cell {
                continue;
            }
            let normal = e.midpoint - cellp;
            let dn = dir.dot(&normal);
            let dm = (e.midpoint - pos).dot(&normal);
            if dn == 0.0 && dm == 0.0 {
                continue;
            }
            if dn <= 0.0 {
                continue;
            }
            // Faces the ray already sits on (edges, corners) count as
            // immediate exits.
            let t = dm / dn;
            if t > -eps && best.map_or(true, |(_, b)| t < b) {
                best = Some((e.opposite, t));
            }
        }
        best.map(|(q, t)| (q, ray.min_t + t))
    }

    /// Integrate to `max_t` and mark the ray terminal.
    fn finish(&self, ray: &mut TraceRay, cell: usize, acc: &mut Accumulator) -> Result<()> {
        let (t_in, t_out) = (ray.min_t, ray.max_t);
        self.integrate(ray, cell, t_in, t_out, acc)?;
        ray.min_t = t_out;
        let end = ray.line.at(ray.max_t);
        ray.state = if self
            .snapshot
            .extent
            .contains_strict(&end, self.settings.inside_eps)
        {
            TraversalState::Done
        } else {
            TraversalState::ExitingDomain
        };
        log::trace!("ray {} finished in {} ({:?})", ray.id, cell, ray.state);
        Ok(())
    }

    /// Accumulate emission (and optionally absorption) over `[t_in, t_out]`
    /// inside `cell`.
    fn integrate(
        &self,
        ray: &mut TraceRay,
        cell: usize,
        t_in: f64,
        t_out: f64,
        acc: &mut Accumulator,
    ) -> Result<()> {
        let step = self.settings.step_size;
        if !self.snapshot.is_primary(cell) {
            // Ghosts only steer the ray; keep the sampling phase moving.
            if let Some(s) = step {
                ray.depth = ray.depth.max(grid_index(t_out, s));
            }
            return Ok(());
        }

        let len = t_out - t_in;
        if len <= 0.0 {
            return Ok(());
        }
        let hydro = self.fields.cell(self.snapshot.points[cell].cell)?;
        let weight = self.settings.sample_weight;
        let mid = ray.line.at(t_in + 0.5 * len);

        match step {
            Some(s) if len > s => {
                // floor(len / S) samples on the global grid strictly inside
                // the segment. Sample k covers ((k - 1) S, k S] clipped to the
                // cell; the last one also covers the tail.
                ray.depth = ray.depth.max(grid_index(t_in, s));
                let count = (len / s).floor() as u64;
                let mut from = t_in;
                let mut k = ray.depth + 1;
                let mut taken = 0;
                while taken < count && (k as f64) * s < t_out {
                    let t = k as f64 * s;
                    let last = taken + 1 == count || ((k + 1) as f64) * s >= t_out;
                    let to = if last { t_out } else { t };
                    acc.emit(self.emission(hydro, &ray.line.at(t)), (to - from) * weight);
                    from = to;
                    taken += 1;
                    k += 1;
                }
                if taken == 0 {
                    acc.emit(self.emission(hydro, &mid), len * weight);
                }
            }
            _ => acc.emit(self.emission(hydro, &mid), len * weight),
        }
        if let Some(s) = step {
            ray.depth = ray.depth.max(grid_index(t_out, s));
        }

        if self.settings.attenuate {
            let tau = self.transfer.sigma_t() * hydro.density_at(&mid) * len;
            acc.absorb(tau);
        }
        Ok(())
    }

    #[inline]
    fn emission(&self, hydro: &HydroCell, x: &Point3) -> Spectrum {
        self.transfer.emission(&FieldVector::sample(hydro, x))
    }
}

/// Index of the last sub-step grid point at or before `t`.
#[inline]
pub(crate) fn grid_index(t: f64, step: f64) -> u64 {
    (t / step).floor().max(0.0) as u64
}
