//! Per-task trace driver.
//!
//! A [`TraceEngine`] owns nothing: it borrows one task's snapshot,
//! connectivity, fields, transfer function and nearest-neighbor index for
//! the duration of a trace pass, and marches rays until they finish or
//! must move to another task.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use vort_mesh::{Connectivity, FieldStore, MeshSnapshot};

use crate::error::{Result, TraceError};
use crate::handoff::{HandoffChannel, RayHandoff};
use crate::locate::{Located, Locator};
use crate::nearest::NearestNeighbor;
use crate::ray::{Accumulator, TraceRay, TraversalState};
use crate::settings::TraceSettings;
use crate::spectrum::Spectrum;
use crate::transfer::TransferFunction;
use crate::traverse::{grid_index, Traversal};

/// Rays per parallel work unit in [`TraceEngine::trace_batch`].
const BATCH_CHUNK: usize = 64;

/// Final spectral sample of one ray.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RaySample {
    /// Ray id.
    pub ray_id: u64,
    /// Accumulated radiance.
    pub radiance: Spectrum,
    /// Remaining transmittance.
    pub transmittance: Spectrum,
    /// How the ray ended.
    pub state: TraversalState,
    /// Cells visited.
    pub steps: usize,
}

/// Result of marching a ray on one task.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceOutcome {
    /// Ray is complete.
    Finished(RaySample),
    /// Ray continues on another task.
    Handoff(RayHandoff),
}

/// Traces rays against one task's snapshot.
pub struct TraceEngine<'a> {
    snapshot: &'a MeshSnapshot,
    conn: &'a Connectivity,
    settings: &'a TraceSettings,
    traversal: Traversal<'a>,
    locator: Locator<'a>,
}

impl<'a> TraceEngine<'a> {
    /// Set up tracing for one snapshot.
    pub fn new(
        snapshot: &'a MeshSnapshot,
        conn: &'a Connectivity,
        fields: &'a FieldStore,
        transfer: &'a dyn TransferFunction,
        index: &'a dyn NearestNeighbor,
        settings: &'a TraceSettings,
    ) -> Result<Self> {
        settings.validate()?;
        let traversal = Traversal::new(snapshot, conn, fields, transfer, settings)?;
        let locator = Locator::new(snapshot, conn, index, settings)?;

        if let Some(b) = fields.quantity_bounds() {
            log::info!(
                "task {}: density [{:.4e}, {:.4e}] mean {:.4e}, utherm [{:.4e}, {:.4e}] mean {:.4e}",
                snapshot.task,
                b.density.min,
                b.density.max,
                b.density.mean,
                b.utherm.min,
                b.utherm.max,
                b.utherm.mean
            );
        }

        Ok(Self {
            snapshot,
            conn,
            settings,
            traversal,
            locator,
        })
    }

    /// Task this engine evaluates.
    pub fn task(&self) -> usize {
        self.snapshot.task
    }

    /// Entry-cell locator.
    pub fn locator(&self) -> &Locator<'a> {
        &self.locator
    }

    /// Single-cell traversal.
    pub fn traversal(&self) -> &Traversal<'a> {
        &self.traversal
    }

    /// Cap on cells a ray may visit.
    fn step_cap(&self) -> usize {
        self.settings
            .max_cells_per_ray
            .unwrap_or(self.snapshot.num_points() * self.snapshot.num_tasks + 1)
    }

    /// Locate the entry cell of `ray` and march it.
    ///
    /// Also returns where the ray was located, to seed the next search.
    pub fn trace(&self, ray: TraceRay, guess: Option<usize>) -> Result<(TraceOutcome, Located)> {
        ray.validate()?;
        let mut ray = ray;
        let located = self.locator.locate_entry_cell(&mut ray, guess)?;
        if let Some(s) = self.settings.step_size {
            ray.depth = grid_index(ray.min_t, s);
        }
        let outcome = self.march(ray, Accumulator::new())?;
        Ok((outcome, located))
    }

    /// Advance `ray` until it finishes or leaves this task.
    pub fn march(&self, ray: TraceRay, acc: Accumulator) -> Result<TraceOutcome> {
        let mut ray = ray;
        let mut acc = acc;
        let cap = self.step_cap();

        loop {
            if ray.task != self.snapshot.task {
                return Ok(TraceOutcome::Handoff(self.handoff(&ray, &acc)?));
            }
            if ray.steps >= cap {
                return Err(TraceError::Stalled {
                    ray: ray.id,
                    steps: ray.steps,
                });
            }
            if !self.traversal.advance_one_cell(&mut ray, &mut acc)? {
                return Ok(TraceOutcome::Finished(RaySample {
                    ray_id: ray.id,
                    radiance: acc.radiance,
                    transmittance: acc.transmittance,
                    state: ray.state,
                    steps: ray.steps,
                }));
            }
        }
    }

    /// Pack a ray whose current point belongs to another task.
    pub fn handoff(&self, ray: &TraceRay, acc: &Accumulator) -> Result<RayHandoff> {
        let dest = self.snapshot.point(ray.cell)?;
        let prev_id = ray
            .prev_cell
            .map(|p| self.snapshot.point(p).map(|q| q.id))
            .transpose()?;

        log::debug!(
            "ray {} leaves task {} for task {} cell {}",
            ray.id,
            self.snapshot.task,
            dest.task,
            dest.cell
        );

        Ok(RayHandoff {
            ray_id: ray.id,
            origin: ray.line.origin,
            direction: ray.line.direction.into_inner(),
            min_t: ray.min_t,
            max_t: ray.max_t,
            dest_task: dest.task,
            dest_cell: dest.cell,
            prev_id,
            radiance: acc.radiance,
            transmittance: acc.transmittance,
            depth: ray.depth,
            steps: ray.steps,
        })
    }

    /// Rebuild a handed-off ray in this task's numbering.
    ///
    /// The previous cell is matched by global id among the destination's
    /// neighbors. A ray without one was located on the sender and is
    /// refined locally from the destination cell.
    pub fn receive(&self, msg: RayHandoff) -> Result<(TraceRay, Accumulator)> {
        if msg.dest_task != self.snapshot.task {
            return Err(TraceError::WrongTask {
                ray_task: msg.dest_task,
                local_task: self.snapshot.task,
            });
        }
        if msg.dest_cell >= self.snapshot.num_primary {
            return Err(TraceError::CellOutOfRange {
                cell: msg.dest_cell,
                len: self.snapshot.num_primary,
            });
        }

        let mut ray = TraceRay::new(msg.ray_id, msg.origin, msg.direction, msg.min_t, msg.max_t);
        ray.validate()?;
        ray.cell = msg.dest_cell;
        ray.task = self.snapshot.task;
        ray.depth = msg.depth;
        ray.steps = msg.steps;

        match msg.prev_id {
            Some(id) => {
                ray.prev_cell = self
                    .conn
                    .neighbors(msg.dest_cell)
                    .iter()
                    .map(|e| e.opposite)
                    .find(|&q| self.snapshot.points[q].id == id);
                if ray.prev_cell.is_none() {
                    log::warn!(
                        "ray {}: previous point id {id} is not a neighbor of cell {}",
                        ray.id,
                        msg.dest_cell
                    );
                }
            }
            None => {
                let found = self.locator.refine(msg.dest_cell, &ray.position())?;
                ray.cell = found.point;
                ray.task = self.snapshot.points[found.point].task;
            }
        }
        ray.state = if ray.task == self.snapshot.task {
            TraversalState::InCell
        } else {
            TraversalState::ExitingFace
        };

        let acc = Accumulator {
            radiance: msg.radiance,
            transmittance: msg.transmittance,
        };
        Ok((ray, acc))
    }

    /// Continue a handed-off ray.
    pub fn resume(&self, msg: RayHandoff) -> Result<TraceOutcome> {
        let (ray, acc) = self.receive(msg)?;
        self.march(ray, acc)
    }

    /// Trace independent rays in parallel.
    ///
    /// Outcomes are returned in input order. Each worker chunk seeds every
    /// location with the previous ray's entry point.
    pub fn trace_batch(&self, rays: &[TraceRay]) -> Result<Vec<TraceOutcome>> {
        let chunks = rays
            .par_chunks(BATCH_CHUNK)
            .map(|chunk| {
                let mut guess = None;
                chunk
                    .iter()
                    .map(|ray| {
                        let (outcome, located) = self.trace(ray.clone(), guess)?;
                        guess = self
                            .snapshot
                            .is_primary(located.point)
                            .then_some(located.point);
                        Ok(outcome)
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(chunks.into_iter().flatten().collect())
    }
}

/// Trace rays across cooperating tasks until every one is finished.
///
/// `engines[t]` must evaluate task `t`. Each ray starts on the task given
/// alongside it; rays that cross partition boundaries travel through
/// `channel`. Samples are returned sorted by ray id.
pub fn run_partitioned(
    engines: &[TraceEngine<'_>],
    channel: &dyn HandoffChannel,
    rays: Vec<(usize, TraceRay)>,
) -> Result<Vec<RaySample>> {
    for (t, engine) in engines.iter().enumerate() {
        if engine.task() != t {
            return Err(TraceError::WrongTask {
                ray_task: t,
                local_task: engine.task(),
            });
        }
    }

    let mut finished = Vec::with_capacity(rays.len());
    let mut handoffs = 0usize;

    for (task, ray) in rays {
        let engine = engines.get(task).ok_or(TraceError::TaskOutOfRange {
            task,
            num_tasks: engines.len(),
        })?;
        match engine.trace(ray, None)?.0 {
            TraceOutcome::Finished(s) => finished.push(s),
            TraceOutcome::Handoff(m) => {
                channel.send(&m)?;
                handoffs += 1;
            }
        }
    }

    loop {
        let mut moved = false;
        for engine in engines {
            while let Some(msg) = channel.recv(engine.task())? {
                moved = true;
                match engine.resume(msg)? {
                    TraceOutcome::Finished(s) => finished.push(s),
                    TraceOutcome::Handoff(m) => {
                        channel.send(&m)?;
                        handoffs += 1;
                    }
                }
            }
        }
        if !moved {
            break;
        }
    }

    log::info!(
        "traced {} rays across {} tasks with {} hand-offs",
        finished.len(),
        engines.len(),
        handoffs
    );

    finished.sort_by_key(|s| s.ray_id);
    Ok(finished)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nearest::KdTree;
    use crate::transfer::DensityEmission;
    use approx::assert_relative_eq;
    use vort_math::{Point3, Vec3};
    use vort_mesh::testkit;

    #[test]
    fn test_trace_single_ray() {
        let snap = testkit::lattice(3, 1.0);
        let conn = Connectivity::build(&snap).unwrap();
        let fields = testkit::uniform_fields(&snap, 1.5);
        let tree = KdTree::build(&snap);
        let tf = DensityEmission::default();
        let settings = TraceSettings::default();
        let engine = TraceEngine::new(&snap, &conn, &fields, &tf, &tree, &settings).unwrap();

        let ray = TraceRay::clipped(5, Point3::new(-2.0, 1.5, 0.5), Vec3::x(), &snap.extent).unwrap();
        let (outcome, located) = engine.trace(ray, None).unwrap();
        assert_eq!(located.point, 3);
        match outcome {
            TraceOutcome::Finished(s) => {
                assert_eq!(s.ray_id, 5);
                assert_eq!(s.steps, 3);
                assert_eq!(s.state, TraversalState::ExitingDomain);
                assert_relative_eq!(s.radiance.band(0), 4.5, epsilon = 1e-12);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_stall_cap() {
        let snap = testkit::lattice(4, 1.0);
        let conn = Connectivity::build(&snap).unwrap();
        let fields = testkit::uniform_fields(&snap, 1.0);
        let tree = KdTree::build(&snap);
        let tf = DensityEmission::default();
        let settings = TraceSettings {
            max_cells_per_ray: Some(2),
            ..Default::default()
        };
        let engine = TraceEngine::new(&snap, &conn, &fields, &tf, &tree, &settings).unwrap();
        let ray = TraceRay::clipped(0, Point3::new(-1.0, 0.5, 0.5), Vec3::x(), &snap.extent).unwrap();
        assert!(matches!(
            engine.trace(ray, None),
            Err(TraceError::Stalled { steps: 2, .. })
        ));
    }

    #[test]
    fn test_degenerate_direction_is_rejected() {
        let snap = testkit::lattice(2, 1.0);
        let conn = Connectivity::build(&snap).unwrap();
        let fields = testkit::uniform_fields(&snap, 1.0);
        let tree = KdTree::build(&snap);
        let tf = DensityEmission::default();
        let settings = TraceSettings::default();
        let engine = TraceEngine::new(&snap, &conn, &fields, &tf, &tree, &settings).unwrap();

        let ray = TraceRay::new(0, Point3::new(0.5, 0.5, 0.5), Vec3::zeros(), 0.0, 1.0);
        assert!(matches!(
            engine.trace(ray, None),
            Err(TraceError::InvalidRay { ray: 0, .. })
        ));
        let ray = TraceRay::new(1, Point3::new(0.5, 0.5, 0.5), Vec3::x(), 0.0, f64::NAN);
        assert!(matches!(
            engine.trace(ray, None),
            Err(TraceError::InvalidRay { ray: 1, .. })
        ));

        let msg = RayHandoff {
            ray_id: 2,
            origin: Point3::new(0.5, 0.5, 0.5),
            direction: Vec3::zeros(),
            min_t: 0.0,
            max_t: 1.0,
            dest_task: 0,
            dest_cell: 0,
            prev_id: None,
            radiance: Spectrum::zero(),
            transmittance: Spectrum::one(),
            depth: 0,
            steps: 1,
        };
        assert!(matches!(
            engine.receive(msg),
            Err(TraceError::InvalidRay { ray: 2, .. })
        ));
    }

    #[test]
    fn test_batch_matches_sequential() {
        let snap = testkit::lattice(5, 0.4);
        let conn = Connectivity::build(&snap).unwrap();
        let fields = testkit::linear_fields(&snap, 1.0, Vec3::new(0.3, -0.2, 0.1));
        let tree = KdTree::build(&snap);
        let tf = DensityEmission::default();
        let settings = TraceSettings::default();
        let engine = TraceEngine::new(&snap, &conn, &fields, &tf, &tree, &settings).unwrap();

        let rays: Vec<TraceRay> = (0..150)
            .filter_map(|i| {
                let f = i as f64;
                let origin = Point3::new(-1.0, 0.05 + (f * 0.0131) % 1.9, 0.05 + (f * 0.0071) % 1.9);
                let dir = Vec3::new(1.0, 0.1 * (f * 0.37).sin(), 0.1 * (f * 0.53).cos());
                TraceRay::clipped(i, origin, dir, &snap.extent)
            })
            .collect();
        assert!(!rays.is_empty());

        let batch = engine.trace_batch(&rays).unwrap();
        assert_eq!(batch.len(), rays.len());
        for (ray, out) in rays.iter().zip(&batch) {
            let (single, _) = engine.trace(ray.clone(), None).unwrap();
            assert_eq!(&single, out);
        }
    }

    #[test]
    fn test_engines_must_be_in_task_order() {
        let parts = testkit::slab_partition(4, 1.0, 2);
        let conns: Vec<_> = parts.iter().map(|s| Connectivity::build(s).unwrap()).collect();
        let fields: Vec<_> = parts.iter().map(|s| testkit::uniform_fields(s, 1.0)).collect();
        let trees: Vec<_> = parts.iter().map(KdTree::build).collect();
        let tf = DensityEmission::default();
        let settings = TraceSettings::default();
        let mut engines: Vec<TraceEngine<'_>> = (0..2)
            .map(|t| {
                TraceEngine::new(&parts[t], &conns[t], &fields[t], &tf, &trees[t], &settings).unwrap()
            })
            .collect();
        engines.reverse();
        let channel = crate::handoff::LocalExchange::new(2);
        assert!(matches!(
            run_partitioned(&engines, &channel, Vec::new()),
            Err(TraceError::WrongTask { .. })
        ));
    }
}
