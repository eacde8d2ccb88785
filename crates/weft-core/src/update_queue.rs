//! Ordered update mailboxes with per-lane skipping and rebasing.

use std::rc::Rc;

use crate::lanes::Lanes;

/// One queued state transition.
pub(crate) struct Update<A> {
    pub lane: Lanes,
    pub action: Rc<A>,
}

impl<A> Clone for Update<A> {
    fn clone(&self) -> Self {
        Self {
            lane: self.lane,
            action: Rc::clone(&self.action),
        }
    }
}

/// Persisted queue state held by one copy of a fiber (current or
/// work-in-progress).
///
/// `base_state` is the state before the first update in `base_queue`; when
/// the base queue is empty it equals `memoized`.
pub(crate) struct QueueState<S, A> {
    pub memoized: S,
    pub base_state: S,
    pub base_queue: Vec<Update<A>>,
}

impl<S: Clone, A> Clone for QueueState<S, A> {
    fn clone(&self) -> Self {
        Self {
            memoized: self.memoized.clone(),
            base_state: self.base_state.clone(),
            base_queue: self.base_queue.clone(),
        }
    }
}

pub(crate) struct Processed<S, A> {
    pub state: QueueState<S, A>,
    /// Lanes of updates left in the base queue for a later pass.
    pub skipped_lanes: Lanes,
}

impl<S: Clone, A> QueueState<S, A> {
    pub fn new(initial: S) -> Self {
        Self {
            memoized: initial.clone(),
            base_state: initial,
            base_queue: Vec::new(),
        }
    }

    /// Appends freshly dispatched updates after the rebased ones.
    pub fn with_pending(&self, pending: &[Update<A>]) -> Self {
        let mut merged = self.clone();
        merged.base_queue.extend(pending.iter().cloned());
        merged
    }

    /// Applies every update whose lane is part of `render_lanes`, in order.
    ///
    /// Updates outside the render lanes stay queued. Once one update has been
    /// skipped, every later update is kept too (with an empty lane so it
    /// always applies) so replaying the queue at the skipped lane reproduces
    /// the original order on top of `base_state`.
    pub fn process(&self, render_lanes: Lanes, reduce: impl Fn(&S, &Rc<A>) -> S) -> Processed<S, A> {
        if self.base_queue.is_empty() {
            return Processed {
                state: self.clone(),
                skipped_lanes: Lanes::empty(),
            };
        }

        let mut state = self.base_state.clone();
        let mut new_base_state: Option<S> = None;
        let mut new_base_queue: Vec<Update<A>> = Vec::new();
        let mut skipped_lanes = Lanes::empty();

        for update in &self.base_queue {
            if !render_lanes.is_superset_of(update.lane) {
                if new_base_queue.is_empty() {
                    new_base_state = Some(state.clone());
                }
                new_base_queue.push(update.clone());
                skipped_lanes |= update.lane;
            } else {
                if !new_base_queue.is_empty() {
                    new_base_queue.push(Update {
                        lane: Lanes::empty(),
                        action: Rc::clone(&update.action),
                    });
                }
                state = reduce(&state, &update.action);
            }
        }

        let base_state = new_base_state.unwrap_or_else(|| state.clone());
        Processed {
            state: QueueState {
                memoized: state,
                base_state,
                base_queue: new_base_queue,
            },
            skipped_lanes,
        }
    }
}

#[cfg(test)]
#[path = "tests/update_queue_tests.rs"]
mod tests;
