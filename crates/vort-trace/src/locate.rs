//! Entry-cell location: nearest-neighbor seed plus local refinement.
//!
//! The index only knows primary points and may be approximate. The answer
//! is refined by walking the connectivity toward strictly closer
//! neighbors; Voronoi cells are convex, so the walk ends at the owner.

use vort_math::Point3;
use vort_mesh::{Connectivity, MeshSnapshot};

use crate::error::{Result, TraceError};
use crate::nearest::NearestNeighbor;
use crate::ray::{TraceRay, TraversalState};
use crate::settings::TraceSettings;

/// A resolved owning point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Located {
    /// Owning point index.
    pub point: usize,
    /// Refinement moves taken after the seed.
    pub iterations: usize,
    /// Moves back to the point just left that were rejected.
    pub bounces: usize,
}

/// Finds the cell owning a position.
pub struct Locator<'a> {
    snapshot: &'a MeshSnapshot,
    conn: &'a Connectivity,
    index: &'a dyn NearestNeighbor,
    settings: &'a TraceSettings,
}

impl<'a> Locator<'a> {
    /// Locator over one snapshot.
    ///
    /// Fails if `conn` was not built from `snapshot`.
    pub fn new(
        snapshot: &'a MeshSnapshot,
        conn: &'a Connectivity,
        index: &'a dyn NearestNeighbor,
        settings: &'a TraceSettings,
    ) -> Result<Self> {
        conn.check_matches(snapshot)?;
        Ok(Self {
            snapshot,
            conn,
            index,
            settings,
        })
    }

    /// Set `ray`'s cell and task to the owner of its position at `min_t`.
    ///
    /// `guess` seeds the index search. Clears `prev_cell`.
    pub fn locate_entry_cell(&self, ray: &mut TraceRay, guess: Option<usize>) -> Result<Located> {
        let pos = ray.position();
        let found = self.locate_point(&pos, guess)?;

        let owner = self.snapshot.point(found.point)?;
        if owner.task >= self.snapshot.num_tasks {
            return Err(TraceError::TaskOutOfRange {
                task: owner.task,
                num_tasks: self.snapshot.num_tasks,
            });
        }

        ray.cell = found.point;
        ray.task = owner.task;
        ray.prev_cell = None;
        ray.state = if owner.task == self.snapshot.task {
            TraversalState::InCell
        } else {
            TraversalState::ExitingFace
        };

        log::trace!(
            "ray {} enters point {} (task {}) after {} refinements",
            ray.id,
            found.point,
            owner.task,
            found.iterations
        );
        Ok(found)
    }

    /// Owner of `pos`, seeded from the nearest-neighbor index.
    pub fn locate_point(&self, pos: &Point3, guess: Option<usize>) -> Result<Located> {
        let (seed, _) = self
            .index
            .find_nearest(pos, guess)
            .ok_or(TraceError::EmptyIndex)?;
        if seed >= self.snapshot.num_points() {
            return Err(TraceError::CellOutOfRange {
                cell: seed,
                len: self.snapshot.num_points(),
            });
        }

        let found = self.refine(seed, pos)?;
        if found.iterations == 0 && self.snapshot.is_ghost(found.point) {
            return Err(TraceError::GhostEntry(found.point));
        }
        Ok(found)
    }

    /// Walk from `start` to the owner of `pos` without consulting the index.
    ///
    /// Moves to the closest neighbor nearer than the current point. The
    /// point just left is never a candidate; when it is within tolerance of
    /// the current distance, `pos` sits on their shared face and a plain
    /// walk would bounce between the two. That case is logged and counted.
    pub fn refine(&self, start: usize, pos: &Point3) -> Result<Located> {
        let tol = self.settings.tolerance();
        let mut current = start;
        let mut previous: Option<usize> = None;
        let mut iterations = 0usize;
        let mut bounces = 0usize;
        let mut warned = false;

        loop {
            let d2_current = (self.snapshot.point(current)?.position - pos).norm_squared();

            let mut best: Option<(usize, f64)> = None;
            for e in self.conn.neighbors(current) {
                let d2 = (self.snapshot.position(e.opposite) - pos).norm_squared();
                if Some(e.opposite) == previous {
                    if !tol.strictly_closer(d2_current, d2) {
                        bounces += 1;
                        log::warn!(
                            "locator bounce between points {current} and {} at ({:.6}, {:.6}, {:.6})",
                            e.opposite,
                            pos.x,
                            pos.y,
                            pos.z
                        );
                    }
                    continue;
                }
                if d2 < d2_current && best.map_or(true, |(_, b)| d2 < b) {
                    best = Some((e.opposite, d2));
                }
            }

            let Some((next, _)) = best else {
                return Ok(Located {
                    point: current,
                    iterations,
                    bounces,
                });
            };

            previous = Some(current);
            current = next;
            iterations += 1;

            if iterations > self.settings.refine_warn_iterations && !warned {
                log::warn!(
                    "locator needed more than {} iterations near ({:.6}, {:.6}, {:.6})",
                    self.settings.refine_warn_iterations,
                    pos.x,
                    pos.y,
                    pos.z
                );
                warned = true;
            }
            if iterations >= self.settings.max_refine_iterations {
                return Err(TraceError::RefineLimit {
                    iterations,
                    point: current,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nearest::{BruteForceIndex, KdTree};
    use vort_math::Vec3;
    use vort_mesh::testkit;

    /// Index that always answers with a fixed point.
    struct Fixed(usize);

    impl NearestNeighbor for Fixed {
        fn find_nearest(&self, _pos: &Point3, _guess: Option<usize>) -> Option<(usize, f64)> {
            Some((self.0, 0.0))
        }
    }

    #[test]
    fn test_locate_with_tree() {
        let snap = testkit::lattice(4, 1.0);
        let conn = Connectivity::build(&snap).unwrap();
        let tree = KdTree::build(&snap);
        let settings = TraceSettings::default();
        let locator = Locator::new(&snap, &conn, &tree, &settings).unwrap();

        let found = locator.locate_point(&Point3::new(3.2, 1.9, 0.4), None).unwrap();
        assert_eq!(found.point, 3 + 4 * (1 + 4 * 0));
    }

    #[test]
    fn test_refinement_walks_from_bad_seed() {
        let snap = testkit::lattice(5, 1.0);
        let conn = Connectivity::build(&snap).unwrap();
        let settings = TraceSettings::default();
        let far = Fixed(0);
        let locator = Locator::new(&snap, &conn, &far, &settings).unwrap();

        let found = locator.locate_point(&Point3::new(4.5, 4.5, 4.5), None).unwrap();
        assert_eq!(found.point, 124);
        assert_eq!(found.iterations, 12);
    }

    #[test]
    fn test_tie_with_previous_point_is_a_bounce() {
        // Query just past the face between cells 0 and 1, well inside the
        // relative tolerance of both generators.
        let snap = testkit::lattice(2, 1.0);
        let conn = Connectivity::build(&snap).unwrap();
        let settings = TraceSettings::default();
        let seed = Fixed(0);
        let locator = Locator::new(&snap, &conn, &seed, &settings).unwrap();

        let pos = Point3::new(1.0 + 1e-10, 0.5, 0.5);
        let found = locator.locate_point(&pos, None).unwrap();
        assert_eq!(found.point, 1);
        assert_eq!(found.iterations, 1);
        assert_eq!(found.bounces, 1);

        // A clear win leaves nothing to bounce against.
        let found = locator.locate_point(&Point3::new(1.3, 0.5, 0.5), None).unwrap();
        assert_eq!((found.point, found.iterations, found.bounces), (1, 1, 0));
    }

    #[test]
    fn test_mismatched_connectivity_rejected() {
        let snap = testkit::lattice(3, 1.0);
        let other = testkit::lattice(2, 1.0);
        let conn = Connectivity::build(&other).unwrap();
        let settings = TraceSettings::default();
        let seed = Fixed(0);
        assert!(matches!(
            Locator::new(&snap, &conn, &seed, &settings),
            Err(TraceError::Mesh(vort_mesh::MeshError::InvalidSnapshot(_)))
        ));
    }

    #[test]
    fn test_refine_limit_is_fatal() {
        let snap = testkit::lattice(5, 1.0);
        let conn = Connectivity::build(&snap).unwrap();
        let settings = TraceSettings {
            refine_warn_iterations: 2,
            max_refine_iterations: 4,
            ..Default::default()
        };
        let far = Fixed(0);
        let locator = Locator::new(&snap, &conn, &far, &settings).unwrap();
        assert!(matches!(
            locator.locate_point(&Point3::new(4.5, 4.5, 4.5), None),
            Err(TraceError::RefineLimit { iterations: 4, .. })
        ));
    }

    #[test]
    fn test_idempotent_relocation() {
        let snap = testkit::lattice(4, 1.0);
        let conn = Connectivity::build(&snap).unwrap();
        let brute = BruteForceIndex::new(&snap);
        let settings = TraceSettings::default();
        let locator = Locator::new(&snap, &conn, &brute, &settings).unwrap();

        for dp in 0..snap.num_points() {
            let inside = snap.position(dp) + Vec3::new(0.2, -0.3, 0.1);
            for guess in [None, Some(0), Some(dp)] {
                assert_eq!(locator.locate_point(&inside, guess).unwrap().point, dp);
            }
            assert_eq!(locator.refine(dp, &inside).unwrap().iterations, 0);
        }
    }

    #[test]
    fn test_ghost_seed_is_fatal() {
        let snap = testkit::periodic_lattice(2, 1.0);
        let conn = Connectivity::build(&snap).unwrap();
        let settings = TraceSettings::default();
        let ghost = snap.num_primary;
        let seed = Fixed(ghost);
        let locator = Locator::new(&snap, &conn, &seed, &settings).unwrap();
        let pos = snap.position(ghost);
        assert!(matches!(
            locator.locate_point(&pos, None),
            Err(TraceError::GhostEntry(g)) if g == ghost
        ));
    }

    #[test]
    fn test_entry_cell_sets_ray_owner() {
        let parts = testkit::slab_partition(4, 1.0, 2);
        let snap = &parts[0];
        let conn = Connectivity::build(snap).unwrap();
        let tree = KdTree::build(snap);
        let settings = TraceSettings::default();
        let locator = Locator::new(snap, &conn, &tree, &settings).unwrap();

        let mut ray = TraceRay::new(1, Point3::new(0.5, 0.5, 0.5), Vec3::x(), 0.0, 3.5);
        locator.locate_entry_cell(&mut ray, None).unwrap();
        assert_eq!(ray.cell, 0);
        assert_eq!(ray.task, 0);
        assert_eq!(ray.state, TraversalState::InCell);

        // Starting in task 1's slab resolves to a foreign ghost.
        let mut ray = TraceRay::new(2, Point3::new(2.3, 0.5, 0.5), Vec3::x(), 0.0, 1.0);
        locator.locate_entry_cell(&mut ray, None).unwrap();
        assert!(snap.is_ghost(ray.cell));
        assert_eq!(ray.task, 1);
        assert_eq!(ray.state, TraversalState::ExitingFace);
    }
}
