use std::{collections::VecDeque, fmt};

use referrer_model::Outcome;
use tokio::sync::oneshot;

/// Identifies a queued caller so it can be withdrawn on timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaiterId(pub(crate) u64);

enum Delivery {
    Callback(Box<dyn FnOnce(Outcome) + Send + 'static>),
    Channel(oneshot::Sender<Outcome>),
}

/// A caller waiting for the outcome. Consumed by [`Waiter::dispatch`], so it
/// can be delivered to at most once.
pub(crate) struct Waiter {
    id: WaiterId,
    delivery: Delivery,
}

impl fmt::Debug for Waiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.delivery {
            Delivery::Callback(_) => "callback",
            Delivery::Channel(_) => "channel",
        };
        f.debug_struct("Waiter")
            .field("id", &self.id)
            .field("delivery", &kind)
            .finish()
    }
}

impl Waiter {
    pub(crate) fn callback<F>(id: WaiterId, on_outcome: F) -> Self
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        Self {
            id,
            delivery: Delivery::Callback(Box::new(on_outcome)),
        }
    }

    pub(crate) fn channel(id: WaiterId, tx: oneshot::Sender<Outcome>) -> Self {
        Self {
            id,
            delivery: Delivery::Channel(tx),
        }
    }

    pub(crate) fn id(&self) -> WaiterId {
        self.id
    }

    pub(crate) fn dispatch(self, outcome: Outcome) {
        match self.delivery {
            Delivery::Callback(on_outcome) => on_outcome(outcome),
            // Receiver gone means the caller stopped waiting.
            Delivery::Channel(tx) => {
                let _ = tx.send(outcome);
            }
        }
    }
}

/// FIFO of callers parked while the connection is in flight.
#[derive(Debug, Default)]
pub(crate) struct WaiterQueue {
    waiters: VecDeque<Waiter>,
}

impl WaiterQueue {
    pub(crate) fn push(&mut self, waiter: Waiter) {
        self.waiters.push_back(waiter);
    }

    /// Remove a waiter that gave up. Returns whether it was still queued.
    pub(crate) fn withdraw(&mut self, id: WaiterId) -> bool {
        match self.waiters.iter().position(|w| w.id() == id) {
            Some(index) => self.waiters.remove(index).is_some(),
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Take every waiter in arrival order, leaving the queue empty.
    pub(crate) fn drain(&mut self) -> Vec<Waiter> {
        self.waiters.drain(..).collect()
    }
}
