//! Error types for locating and tracing rays.

use thiserror::Error;
use vort_mesh::MeshError;

/// Errors that abort a trace.
///
/// Every variant is fatal for the ray being traced. A ray leaving the
/// domain or exhausting its span is not an error.
#[derive(Error, Debug)]
pub enum TraceError {
    /// Ray is owned by a different task than the one evaluating it.
    #[error("ray owned by task {ray_task} evaluated on task {local_task}")]
    WrongTask {
        /// Task recorded on the ray.
        ray_task: usize,
        /// Task doing the evaluation.
        local_task: usize,
    },

    /// A task id outside the partition.
    #[error("task {task} out of range (have {num_tasks} tasks)")]
    TaskOutOfRange {
        /// Offending task id.
        task: usize,
        /// Number of tasks.
        num_tasks: usize,
    },

    /// A cell or point index outside the snapshot.
    #[error("cell {cell} out of range (have {len})")]
    CellOutOfRange {
        /// Offending index.
        cell: usize,
        /// Number of valid entries.
        len: usize,
    },

    /// No exit face was found while the ray is still inside the domain.
    #[error("ray {ray} found no exit from cell {cell} (min_t = {min_t}, max_t = {max_t})")]
    MissingExit {
        /// Ray id.
        ray: u64,
        /// Cell the ray is stuck in.
        cell: usize,
        /// Current segment start.
        min_t: f64,
        /// Segment end.
        max_t: f64,
    },

    /// Locator refinement hit its absolute iteration cap.
    #[error("locator refinement exceeded {iterations} iterations at point {point}")]
    RefineLimit {
        /// Iterations performed.
        iterations: usize,
        /// Candidate when the cap was hit.
        point: usize,
    },

    /// Refinement ended on a ghost point straight from the index.
    #[error("locator resolved to ghost point {0} without refinement")]
    GhostEntry(usize),

    /// Nearest-neighbor index returned nothing.
    #[error("nearest-neighbor index is empty")]
    EmptyIndex,

    /// Ray line or span cannot be marched.
    #[error("ray {ray} is invalid: {reason}")]
    InvalidRay {
        /// Ray id.
        ray: u64,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// Ray visited more cells than the configured cap.
    #[error("ray {ray} stalled after {steps} cells")]
    Stalled {
        /// Ray id.
        ray: u64,
        /// Cells visited.
        steps: usize,
    },

    /// Invalid trace settings.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Hand-off message could not be encoded or decoded.
    #[error("hand-off serialization failed: {0}")]
    Handoff(#[from] serde_json::Error),

    /// Hand-off addressed to a task no channel endpoint exists for.
    #[error("no hand-off endpoint for task {0}")]
    UnknownDestination(usize),

    /// Snapshot or connectivity failure.
    #[error(transparent)]
    Mesh(#[from] MeshError),
}

/// Result type for trace operations.
pub type Result<T> = std::result::Result<T, TraceError>;
