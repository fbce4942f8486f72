use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Weak,
    task::{Context, Poll},
};

use referrer_model::{AttributionPayload, Outcome};
use tokio::sync::oneshot;
use tracing::debug;

use super::{Shared, waiter::WaiterId};
use crate::error::{ReferrerError, Result};

/// Future for one queued caller, returned by
/// [`ReferrerResolver::subscribe`](super::ReferrerResolver::subscribe).
///
/// Dropping it before it completes withdraws the caller from the waiter
/// queue; other waiters are unaffected.
#[must_use = "the caller is only dispatched to while this future is alive"]
pub struct PendingReferrer {
    id: WaiterId,
    rx: oneshot::Receiver<Outcome>,
    resolver: Weak<Shared>,
    finished: bool,
}

impl PendingReferrer {
    pub(super) fn new(
        id: WaiterId,
        rx: oneshot::Receiver<Outcome>,
        resolver: Weak<Shared>,
    ) -> Self {
        Self {
            id,
            rx,
            resolver,
            finished: false,
        }
    }

    pub fn id(&self) -> WaiterId {
        self.id
    }
}

impl Future for PendingReferrer {
    type Output = Result<AttributionPayload>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let received = match Pin::new(&mut self.rx).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(received) => received,
        };
        self.finished = true;
        Poll::Ready(match received {
            Ok(outcome) => outcome.into_result().map_err(ReferrerError::Resolved),
            // Sender dropped without dispatch: the queue was abandoned.
            Err(_) => Err(ReferrerError::Abandoned),
        })
    }
}

impl Drop for PendingReferrer {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Some(shared) = self.resolver.upgrade()
            && shared.withdraw(self.id)
        {
            debug!("referrer waiter withdrawn: waiter={:?}", self.id);
        }
    }
}

impl fmt::Debug for PendingReferrer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingReferrer")
            .field("id", &self.id)
            .field("finished", &self.finished)
            .finish()
    }
}
