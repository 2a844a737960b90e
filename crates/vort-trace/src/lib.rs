#![warn(missing_docs)]

//! Ray marching through distributed Voronoi meshes.
//!
//! Rays are walked cell by cell through a [`vort_mesh::MeshSnapshot`]: the
//! entry cell is found with a nearest-neighbor seed plus local refinement
//! ([`Locator`]), then each [`Traversal`] step picks the exit face from the
//! face midpoints, integrates emission through a [`TransferFunction`] and
//! moves to the neighbor. When the neighbor is owned by another task the
//! ray is packed into a [`RayHandoff`] and continues there.
//!
//! # Example
//!
//! ```ignore
//! use vort_mesh::Connectivity;
//! use vort_trace::{DensityEmission, KdTree, TraceEngine, TraceRay, TraceSettings};
//!
//! let conn = Connectivity::build(&snapshot)?;
//! let tree = KdTree::build(&snapshot);
//! let settings = TraceSettings::default();
//! let tf = DensityEmission::default();
//! let engine = TraceEngine::new(&snapshot, &conn, &fields, &tf, &tree, &settings)?;
//!
//! let ray = TraceRay::clipped(0, origin, direction, &snapshot.extent).unwrap();
//! let outcomes = engine.trace_batch(&[ray])?;
//! ```

pub mod engine;
pub mod error;
pub mod handoff;
pub mod locate;
pub mod nearest;
pub mod ray;
pub mod settings;
pub mod spectrum;
pub mod transfer;
pub mod traverse;

pub use engine::{run_partitioned, RaySample, TraceEngine, TraceOutcome};
pub use error::{Result, TraceError};
pub use handoff::{HandoffChannel, LocalExchange, RayHandoff};
pub use locate::{Located, Locator};
pub use nearest::{BruteForceIndex, KdTree, NearestNeighbor};
pub use ray::{Accumulator, TraceRay, TraversalState};
pub use settings::TraceSettings;
pub use spectrum::{Spectrum, BANDS};
pub use transfer::{DensityEmission, Field, FieldVector, GaussianBand, TransferFunction};
pub use traverse::Traversal;
