#![warn(missing_docs)]

//! Voronoi mesh snapshots for the vort ray marcher.
//!
//! A [`MeshSnapshot`] is the immutable tessellation one task sees: Delaunay
//! points (primary cells plus ghost images), tetrahedra with their
//! circumcenters, and the Voronoi faces as point pairs. From it this crate
//! derives:
//!
//! - [`Connectivity`]: flat per-point adjacency (opposite point + face
//!   midpoint) that the traversal walks
//! - [`FacePolygons`]: ordered circumcenter rings for face export
//! - point-in-cell checks in [`check`]
//! - a plain-text listing in [`dump`]
//!
//! Per-cell fluid state lives in a [`FieldStore`] alongside the snapshot.
//!
//! # Example
//!
//! ```ignore
//! use vort_mesh::{Connectivity, MeshSnapshot};
//!
//! let snapshot: MeshSnapshot = serde_json::from_str(&text)?;
//! let conn = Connectivity::build(&snapshot)?;
//! for edge in conn.neighbors(0) {
//!     println!("{} via {:?}", edge.opposite, edge.midpoint);
//! }
//! ```

pub mod check;
pub mod connectivity;
pub mod dump;
pub mod error;
pub mod fields;
pub mod polygons;
pub mod snapshot;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use check::{verify_point_in_cell, verify_point_in_cell_local};
pub use connectivity::{Connectivity, ConnectivityEdge, EdgeRange, PrimaryRef};
pub use error::{MeshError, Result};
pub use fields::{Bounds, FieldStore, HydroCell, QuantityBounds};
pub use polygons::FacePolygons;
pub use snapshot::{MeshPoint, MeshSnapshot, PointKind, Tetra, VoronoiFace};
