//! On-disk formats: snapshots with their fields, and ray lists.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use vort_math::{Point3, Vec3};
use vort_mesh::{FieldStore, MeshSnapshot};
use vort_trace::TraceRay;

/// One task's snapshot and its hydro state, stored as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub mesh: MeshSnapshot,
    pub fields: FieldStore,
}

impl SnapshotFile {
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let snap: Self = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing snapshot {}", path.display()))?;
        snap.mesh
            .validate()
            .with_context(|| format!("invalid snapshot {}", path.display()))?;
        snap.fields.check_matches(&snap.mesh)?;
        Ok(snap)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut w = BufWriter::new(file);
        serde_json::to_writer(&mut w, self)?;
        w.flush()?;
        Ok(())
    }
}

/// A ray as given on the command line.
///
/// Without `max_t` the ray is clipped to the snapshot extent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaySpec {
    pub id: u64,
    pub origin: Point3,
    pub direction: Vec3,
    #[serde(default)]
    pub min_t: Option<f64>,
    #[serde(default)]
    pub max_t: Option<f64>,
}

impl RaySpec {
    /// Ray over the requested span, or `None` if a clipped ray misses the box.
    ///
    /// Fails on a zero or non-finite direction, origin or span.
    pub fn to_ray(&self, extent: &vort_math::Aabb3) -> Result<Option<TraceRay>> {
        let ray = match self.max_t {
            Some(max_t) => TraceRay::new(
                self.id,
                self.origin,
                self.direction,
                self.min_t.unwrap_or(0.0),
                max_t,
            ),
            None => {
                let line = TraceRay::new(self.id, self.origin, self.direction, 0.0, 0.0);
                line.validate().with_context(|| format!("ray {}", self.id))?;
                let Some(mut ray) = TraceRay::clipped(self.id, self.origin, self.direction, extent)
                else {
                    return Ok(None);
                };
                if let Some(min_t) = self.min_t {
                    ray.min_t = ray.min_t.max(min_t).min(ray.max_t);
                }
                ray
            }
        };
        ray.validate().with_context(|| format!("ray {}", self.id))?;
        Ok(Some(ray))
    }
}

pub fn read_rays(path: &Path) -> Result<Vec<RaySpec>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing rays {}", path.display()))
}
