//! Active front queue and deferred boundary set

use crate::halfedge::HalfEdgeId;
use std::collections::VecDeque;

/// Boundary half-edges awaiting work and those set aside as stuck
///
/// The two collections are disjoint. Listing an edge twice is a logic error
/// and trips a debug assertion.
#[derive(Debug, Clone, Default)]
pub struct FrontController {
    queue: VecDeque<HalfEdgeId>,
    boundary: Vec<HalfEdgeId>,
}

impl FrontController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an edge to the back of the work queue
    pub fn enqueue(&mut self, he: HalfEdgeId) {
        debug_assert!(!self.queue.contains(&he), "half-edge {:?} queued twice", he);
        debug_assert!(!self.boundary.contains(&he), "half-edge {:?} queued while on the boundary", he);
        self.queue.push_back(he);
    }

    /// Take the oldest edge off the queue
    pub fn dequeue_front(&mut self) -> Option<HalfEdgeId> {
        self.queue.pop_front()
    }

    /// Set an edge aside as unresolvable for now
    pub fn move_to_boundary(&mut self, he: HalfEdgeId) {
        debug_assert!(!self.boundary.contains(&he), "half-edge {:?} listed on the boundary twice", he);
        debug_assert!(!self.queue.contains(&he), "half-edge {:?} deferred while still queued", he);
        self.boundary.push(he);
    }

    pub fn remove_from_queue(&mut self, he: HalfEdgeId) -> bool {
        match self.queue.iter().position(|&q| q == he) {
            Some(pos) => {
                self.queue.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn remove_from_boundary(&mut self, he: HalfEdgeId) -> bool {
        match self.boundary.iter().position(|&b| b == he) {
            Some(pos) => {
                self.boundary.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn is_queued(&self, he: HalfEdgeId) -> bool {
        self.queue.contains(&he)
    }

    pub fn is_on_boundary(&self, he: HalfEdgeId) -> bool {
        self.boundary.contains(&he)
    }

    pub fn queue(&self) -> impl Iterator<Item = HalfEdgeId> + '_ {
        self.queue.iter().copied()
    }

    pub fn boundary(&self) -> &[HalfEdgeId] {
        &self.boundary
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_queue_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.boundary.clear();
    }
}
