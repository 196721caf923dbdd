// Deferred actions - cancellable future events keyed by fire time

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};
use std::time::Instant;

/// Action the engine wants to happen later
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredAction {
    /// Release a gated note
    NoteOff { note: u8 },
}

/// Handle used to cancel a scheduled action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledTask {
    fire_at: Instant,
    id: u64,
    action: DeferredAction,
}

impl Ord for ScheduledTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Same instant: first scheduled fires first
        self.fire_at
            .cmp(&other.fire_at)
            .then(self.id.cmp(&other.id))
    }
}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of deferred actions.
///
/// Cancelling only forgets the task id; the stale heap entry is discarded
/// once it reaches the top.
#[derive(Debug, Default)]
pub struct DeferredQueue {
    heap: BinaryHeap<Reverse<ScheduledTask>>,
    /// Ids scheduled and neither fired nor cancelled
    live: HashSet<u64>,
    next_id: u64,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, fire_at: Instant, action: DeferredAction) -> TaskHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.live.insert(id);
        self.heap.push(Reverse(ScheduledTask {
            fire_at,
            id,
            action,
        }));
        TaskHandle(id)
    }

    /// Cancel a pending task. Returns false if it already fired or was
    /// cancelled before.
    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        self.live.remove(&handle.0)
    }

    /// Pop the earliest live action due at or before `now`
    pub fn pop_due(&mut self, now: Instant) -> Option<(TaskHandle, DeferredAction)> {
        while let Some(Reverse(task)) = self.heap.peek() {
            if task.fire_at > now {
                return None;
            }
            let Some(Reverse(task)) = self.heap.pop() else {
                return None;
            };
            if !self.live.remove(&task.id) {
                continue;
            }
            return Some((TaskHandle(task.id), task.action));
        }
        None
    }

    /// Fire time of the earliest live action
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap
            .iter()
            .filter(|Reverse(task)| self.live.contains(&task.id))
            .map(|Reverse(task)| task.fire_at)
            .min()
    }

    /// Number of live (not cancelled) actions
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every pending action
    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
    }
}
