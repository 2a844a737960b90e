//! Moving rays between tasks.
//!
//! When a ray crosses into a cell owned by another task it is packed into a
//! [`RayHandoff`], serialized, and delivered through a [`HandoffChannel`].
//! The receiving task rebuilds the ray in its own numbering and continues.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use vort_math::{Point3, Vec3};

use crate::error::{Result, TraceError};
use crate::spectrum::Spectrum;

/// Minimal ray state sent to the task owning the next cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RayHandoff {
    /// Ray id.
    pub ray_id: u64,
    /// Ray origin.
    pub origin: Point3,
    /// Unit ray direction.
    pub direction: Vec3,
    /// Start of the remaining segment.
    pub min_t: f64,
    /// End of the segment.
    pub max_t: f64,
    /// Receiving task.
    pub dest_task: usize,
    /// Hydro cell on the receiving task, which is also its primary point
    /// index there.
    pub dest_cell: usize,
    /// Global id of the point the ray came from. `None` when the ray was
    /// located on the sender but starts on the receiver.
    pub prev_id: Option<u64>,
    /// Radiance gathered so far.
    pub radiance: Spectrum,
    /// Transmittance so far.
    pub transmittance: Spectrum,
    /// Sub-step grid index.
    pub depth: u64,
    /// Cells visited so far.
    pub steps: usize,
}

impl RayHandoff {
    /// Serialize to bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Transport for hand-off messages.
pub trait HandoffChannel: Send + Sync {
    /// Queue `msg` for `msg.dest_task`.
    fn send(&self, msg: &RayHandoff) -> Result<()>;

    /// Next message waiting for `task`, if any.
    fn recv(&self, task: usize) -> Result<Option<RayHandoff>>;
}

/// In-process channel: one FIFO of encoded messages per task.
#[derive(Debug)]
pub struct LocalExchange {
    queues: Vec<Mutex<VecDeque<Vec<u8>>>>,
}

impl LocalExchange {
    /// Exchange between `num_tasks` tasks.
    pub fn new(num_tasks: usize) -> Self {
        Self {
            queues: (0..num_tasks).map(|_| Mutex::new(VecDeque::new())).collect(),
        }
    }

    /// Messages waiting for `task`.
    pub fn pending(&self, task: usize) -> usize {
        self.queues
            .get(task)
            .map_or(0, |q| q.lock().unwrap_or_else(PoisonError::into_inner).len())
    }

    /// Messages waiting across all tasks.
    pub fn total_pending(&self) -> usize {
        (0..self.queues.len()).map(|t| self.pending(t)).sum()
    }
}

impl HandoffChannel for LocalExchange {
    fn send(&self, msg: &RayHandoff) -> Result<()> {
        let queue = self
            .queues
            .get(msg.dest_task)
            .ok_or(TraceError::UnknownDestination(msg.dest_task))?;
        let bytes = msg.encode()?;
        queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(bytes);
        Ok(())
    }

    fn recv(&self, task: usize) -> Result<Option<RayHandoff>> {
        let queue = self
            .queues
            .get(task)
            .ok_or(TraceError::UnknownDestination(task))?;
        let bytes = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        bytes.map(|b| RayHandoff::decode(&b)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(dest_task: usize) -> RayHandoff {
        RayHandoff {
            ray_id: 42,
            origin: Point3::new(0.1, 0.2, 0.3),
            direction: Vec3::new(0.0, 1.0, 0.0),
            min_t: 1.25,
            max_t: 4.0,
            dest_task,
            dest_cell: 17,
            prev_id: Some(9),
            radiance: Spectrum([0.5, 0.25, 0.0]),
            transmittance: Spectrum([1.0, 0.9, 0.8]),
            depth: 6,
            steps: 3,
        }
    }

    #[test]
    fn test_encode_preserves_state() {
        let msg = message(1);
        let back = RayHandoff::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(
            RayHandoff::decode(b"not json"),
            Err(TraceError::Handoff(_))
        ));
    }

    #[test]
    fn test_local_exchange_fifo_per_task() {
        let ex = LocalExchange::new(2);
        let mut a = message(1);
        a.ray_id = 1;
        let mut b = message(1);
        b.ray_id = 2;
        ex.send(&a).unwrap();
        ex.send(&b).unwrap();
        assert_eq!(ex.pending(1), 2);
        assert_eq!(ex.total_pending(), 2);

        assert!(ex.recv(0).unwrap().is_none());
        assert_eq!(ex.recv(1).unwrap().unwrap().ray_id, 1);
        assert_eq!(ex.recv(1).unwrap().unwrap().ray_id, 2);
        assert!(ex.recv(1).unwrap().is_none());
    }

    #[test]
    fn test_unknown_destination() {
        let ex = LocalExchange::new(2);
        assert!(matches!(
            ex.send(&message(5)),
            Err(TraceError::UnknownDestination(5))
        ));
        assert!(matches!(ex.recv(9), Err(TraceError::UnknownDestination(9))));
    }
}
