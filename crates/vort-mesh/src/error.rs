//! Error types for mesh construction and verification.

use thiserror::Error;
use vort_math::Point3;

/// Errors raised while validating a snapshot or deriving connectivity.
///
/// All of these are fatal: a snapshot that produces one must not be traced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeshError {
    /// Snapshot arrays are inconsistent with each other.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// A point index is outside the snapshot.
    #[error("point {point} out of range (snapshot has {len} points)")]
    PointOutOfRange {
        /// Offending index.
        point: usize,
        /// Number of points in the snapshot.
        len: usize,
    },

    /// A hydro cell index is outside the field store.
    #[error("hydro cell {cell} out of range (store has {len} cells)")]
    CellOutOfRange {
        /// Offending index.
        cell: usize,
        /// Number of hydro cells.
        len: usize,
    },

    /// Field store does not match the snapshot's primary count.
    #[error("field store has {cells} cells but snapshot has {primaries} primary points")]
    FieldCountMismatch {
        /// Number of hydro cells supplied.
        cells: usize,
        /// Number of primary points in the snapshot.
        primaries: usize,
    },

    /// A local point references a hydro cell that no local primary owns.
    #[error("point {point} (cell {cell}) maps to no primary cell")]
    MissingPrimary {
        /// Point index.
        point: usize,
        /// Hydro cell it references.
        cell: usize,
    },

    /// A point has no Voronoi faces at all.
    #[error("point {0} has no connections")]
    NoConnections(usize),

    /// A Voronoi face references a point outside the snapshot.
    #[error("voronoi face {face} references point out of range")]
    FaceOutOfRange {
        /// Face index.
        face: usize,
    },

    /// A Voronoi face connects a point to itself.
    #[error("voronoi face {face} is degenerate (p1 == p2 == {point})")]
    DegenerateFace {
        /// Face index.
        face: usize,
        /// Repeated point.
        point: usize,
    },

    /// `q` is a neighbor of `p` but not the other way round.
    #[error("asymmetric adjacency: {q} is a neighbor of {p} but not vice versa")]
    AsymmetricAdjacency {
        /// Point whose list holds the edge.
        p: usize,
        /// Neighbor missing the reverse edge.
        q: usize,
    },

    /// Edge-ring walk could not find the shared vertices in the next tetra.
    #[error("edge ring pivot from tetra {from} to tetra {to} failed")]
    RingPivot {
        /// Tetra being left.
        from: usize,
        /// Tetra that should share the edge.
        to: usize,
    },

    /// An edge of a tetra was reached by two different rings.
    #[error("edge {edge} of tetra {tetra} visited twice")]
    RingRevisit {
        /// Tetra index.
        tetra: usize,
        /// Local edge number (0..6).
        edge: usize,
    },

    /// Edge-ring walk did not return to its start tetra.
    #[error("edge ring starting at tetra {0} does not close")]
    RingTooLong(usize),

    /// Another point is closer to the position than the owning point.
    #[error(
        "point-in-cell check failed at ({:.10}, {:.10}, {:.10}): point {closer} is closer than owner {point}",
        .position.x, .position.y, .position.z
    )]
    PointNotInCell {
        /// Claimed owning point.
        point: usize,
        /// Point found to be closer.
        closer: usize,
        /// Position checked.
        position: Point3,
    },
}

/// Result type for mesh operations.
pub type Result<T> = std::result::Result<T, MeshError>;
