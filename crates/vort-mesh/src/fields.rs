//! Per-cell fluid state supplied by the hydro solver.

use serde::{Deserialize, Serialize};
use vort_math::{Point3, Vec3};

use crate::error::{MeshError, Result};
use crate::snapshot::MeshSnapshot;

/// Physical state of one primary cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HydroCell {
    /// Mass density.
    pub density: f64,
    /// Specific internal energy.
    pub utherm: f64,
    /// Pressure.
    pub pressure: f64,
    /// Total energy.
    pub energy: f64,
    /// Bulk velocity.
    pub velocity: Vec3,
    /// Spatial gradient of density.
    pub density_gradient: Vec3,
    /// Cell centroid; the reference point for gradient extrapolation.
    pub center: Point3,
}

impl HydroCell {
    /// Density extrapolated linearly from the cell center to `pos`.
    #[inline]
    pub fn density_at(&self, pos: &Point3) -> f64 {
        self.density + self.density_gradient.dot(&(pos - self.center))
    }
}

/// Min, max and mean of one field over all primary cells.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Minimum value.
    pub min: f64,
    /// Maximum value.
    pub max: f64,
    /// Arithmetic mean.
    pub mean: f64,
}

/// Field ranges used to scale transfer functions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantityBounds {
    /// Density range.
    pub density: Bounds,
    /// Internal energy range.
    pub utherm: Bounds,
}

/// Read-only hydro state for every primary cell of one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldStore {
    cells: Vec<HydroCell>,
}

impl FieldStore {
    /// Wrap a list of cells, indexed by hydro cell id.
    pub fn new(cells: Vec<HydroCell>) -> Self {
        Self { cells }
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True if there are no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// All cells.
    pub fn cells(&self) -> &[HydroCell] {
        &self.cells
    }

    /// Bounds-checked cell access.
    pub fn cell(&self, cell: usize) -> Result<&HydroCell> {
        self.cells.get(cell).ok_or(MeshError::CellOutOfRange {
            cell,
            len: self.cells.len(),
        })
    }

    /// Check that there is exactly one cell per primary point.
    pub fn check_matches(&self, snapshot: &MeshSnapshot) -> Result<()> {
        if self.cells.len() != snapshot.num_primary {
            return Err(MeshError::FieldCountMismatch {
                cells: self.cells.len(),
                primaries: snapshot.num_primary,
            });
        }
        Ok(())
    }

    /// Density and internal energy ranges. `None` when the store is empty.
    pub fn quantity_bounds(&self) -> Option<QuantityBounds> {
        if self.cells.is_empty() {
            return None;
        }
        let summarize = |f: fn(&HydroCell) -> f64| {
            let mut b = Bounds {
                min: f64::INFINITY,
                max: f64::NEG_INFINITY,
                mean: 0.0,
            };
            for c in &self.cells {
                let v = f(c);
                b.min = b.min.min(v);
                b.max = b.max.max(v);
                b.mean += v;
            }
            b.mean /= self.cells.len() as f64;
            b
        };
        Some(QuantityBounds {
            density: summarize(|c| c.density),
            utherm: summarize(|c| c.utherm),
        })
    }

    /// Zero density and density gradient of every primary cell that is a
    /// vertex of a finite, live tetra whose circumcenter falls outside the
    /// domain extent. Returns the number of cells zeroed.
    pub fn limit_boundary_densities(&mut self, snapshot: &MeshSnapshot) -> usize {
        let mut zeroed = vec![false; self.cells.len()];

        for (tet, cc) in snapshot.tetras.iter().zip(&snapshot.circumcenters) {
            if tet.deleted || !tet.is_finite() || snapshot.extent.contains(cc) {
                continue;
            }
            for dp in tet.p.iter().flatten() {
                if !snapshot.is_primary(*dp) {
                    continue;
                }
                let cell = snapshot.points[*dp].cell;
                if let Some(c) = self.cells.get_mut(cell) {
                    log::debug!("zeroing density of cell {cell} (circumcenter {cc:?} outside box)");
                    c.density = 0.0;
                    c.density_gradient = Vec3::zeros();
                    zeroed[cell] = true;
                }
            }
        }

        zeroed.into_iter().filter(|&z| z).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cell(density: f64, utherm: f64) -> HydroCell {
        HydroCell {
            density,
            utherm,
            pressure: 0.0,
            energy: 0.0,
            velocity: Vec3::zeros(),
            density_gradient: Vec3::new(1.0, 0.0, 0.0),
            center: Point3::new(1.0, 1.0, 1.0),
        }
    }

    #[test]
    fn test_density_at_uses_gradient() {
        let c = cell(2.0, 1.0);
        assert_relative_eq!(c.density_at(&Point3::new(1.5, 7.0, -3.0)), 2.5);
        assert_relative_eq!(c.density_at(&c.center), 2.0);
    }

    #[test]
    fn test_quantity_bounds() {
        let store = FieldStore::new(vec![cell(1.0, 10.0), cell(3.0, 20.0), cell(5.0, 60.0)]);
        let b = store.quantity_bounds().unwrap();
        assert_relative_eq!(b.density.min, 1.0);
        assert_relative_eq!(b.density.max, 5.0);
        assert_relative_eq!(b.density.mean, 3.0);
        assert_relative_eq!(b.utherm.mean, 30.0);
        assert!(FieldStore::default().quantity_bounds().is_none());
    }

    #[test]
    fn test_cell_out_of_range() {
        let store = FieldStore::new(vec![cell(1.0, 1.0)]);
        assert!(store.cell(0).is_ok());
        assert_eq!(
            store.cell(3).unwrap_err(),
            MeshError::CellOutOfRange { cell: 3, len: 1 }
        );
    }
}
