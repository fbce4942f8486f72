//! Single-flight resolver for the install-referrer query.
//!
//! The first caller opens one connection to the referrer service; callers
//! arriving while it is in flight are parked in a FIFO queue; the
//! completion callback (which may fire on any thread) computes the outcome,
//! caches it for the lifetime of the resolver, and fans it out to every
//! parked caller. Callers arriving after that are answered from the cache.
//!
//! State, cache and queue live behind one mutex. The connector, the port's
//! `open` and caller callbacks all run outside it, so a port that completes
//! inline or a collaborator that re-enters the resolver cannot deadlock.

mod pending;
mod waiter;

use std::{
    any::type_name_of_val,
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use referrer_model::{AttributionPayload, ErrorKind, Failure, Outcome, StatusCode};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::{
    config::ResolverConfig,
    error::{ReferrerError, Result},
    port::{PortError, PortGuard, ReferrerConnector},
};

pub use pending::PendingReferrer;
pub use waiter::WaiterId;
use waiter::{Waiter, WaiterQueue};

/// Lifecycle of the one connection a resolver may open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection has been attempted.
    Idle,
    /// A connection is open and its completion has not arrived.
    Connecting,
    /// An outcome is cached. Terminal.
    Resolved,
}

#[derive(Debug)]
enum Phase {
    Idle,
    Connecting { port: PortSlot },
    Resolved(Outcome),
}

/// The connection while `Connecting`.
#[derive(Debug)]
enum PortSlot {
    /// The leader is still building the port outside the lock.
    Building,
    Held(PortGuard),
    /// Teardown released it (or it was never installed).
    Released,
}

impl PortSlot {
    fn take(&mut self) -> Option<PortGuard> {
        match std::mem::replace(self, PortSlot::Released) {
            PortSlot::Held(guard) => Some(guard),
            PortSlot::Building | PortSlot::Released => None,
        }
    }
}

impl Phase {
    fn state(&self) -> ConnectionState {
        match self {
            Phase::Idle => ConnectionState::Idle,
            Phase::Connecting { .. } => ConnectionState::Connecting,
            Phase::Resolved(_) => ConnectionState::Resolved,
        }
    }
}

#[derive(Debug)]
struct ResolverState {
    phase: Phase,
    // Non-empty only while `phase` is `Connecting`.
    waiters: WaiterQueue,
}

pub(crate) struct Shared {
    connector: Arc<dyn ReferrerConnector>,
    config: ResolverConfig,
    state: Mutex<ResolverState>,
    next_waiter: AtomicU64,
}

impl Shared {
    // Every critical section leaves the state consistent, so a panic in
    // user code elsewhere does not make it unusable.
    fn lock(&self) -> MutexGuard<'_, ResolverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn withdraw(&self, id: WaiterId) -> bool {
        self.lock().waiters.withdraw(id)
    }

    /// Install a freshly built port. Hands the guard back when the phase
    /// moved on while it was being built, so the caller closes it unused.
    fn install(&self, guard: PortGuard) -> Option<PortGuard> {
        let mut state = self.lock();
        match &mut state.phase {
            Phase::Connecting {
                port: slot @ PortSlot::Building,
            } => {
                *slot = PortSlot::Held(guard);
                None
            }
            _ => Some(guard),
        }
    }

    /// Settle a connection attempt whose connector panicked, so queued
    /// callers are not stranded.
    fn abandon_connect(&self) {
        let (outcome, waiters) = {
            let mut state = self.lock();
            if !matches!(state.phase, Phase::Connecting { .. }) {
                return;
            }
            let outcome = Outcome::failure(
                ErrorKind::BadState,
                "referrer connector failed to build a client",
            );
            state.phase = Phase::Resolved(outcome.clone());
            (outcome, state.waiters.drain())
        };
        warn!(
            "install referrer connect aborted: waiters={}",
            waiters.len()
        );
        for waiter in waiters {
            waiter.dispatch(outcome.clone());
        }
    }

    fn complete(&self, status: StatusCode) {
        let (outcome, waiters) = {
            let mut state = self.lock();
            let port = match &mut state.phase {
                Phase::Resolved(cached) => {
                    warn!(
                        "duplicate referrer completion ignored: status={}, cached_kind={:?}",
                        status,
                        cached.error_kind()
                    );
                    return;
                }
                Phase::Idle => None,
                Phase::Connecting { port } => port.take(),
            };

            let outcome = resolve_outcome(status, port);
            state.phase = Phase::Resolved(outcome.clone());
            (outcome, state.waiters.drain())
        };

        match &outcome {
            Outcome::Success(_) => info!(
                "install referrer resolved: status={}, waiters={}",
                status,
                waiters.len()
            ),
            Outcome::Failure(failure) => warn!(
                "install referrer failed: status={}, kind={}, message={}, waiters={}",
                status,
                failure.kind,
                failure.message,
                waiters.len()
            ),
        }

        for waiter in waiters {
            waiter.dispatch(outcome.clone());
        }
    }
}

/// Map a completion status to an outcome. `port` is released on every
/// path, including a panicking read.
fn resolve_outcome(status: StatusCode, port: Option<PortGuard>) -> Outcome {
    if let Some(failure) = Failure::for_status(status) {
        return failure.into();
    }
    let Some(guard) = port else {
        return Outcome::failure(ErrorKind::BadState, "referrer client is absent");
    };

    match guard.port().read_payload() {
        Ok(payload) => Outcome::Success(payload),
        Err(err @ PortError::ConnectionLost(_)) => {
            Outcome::failure(ErrorKind::DeadObject, err.to_string())
        }
        Err(err @ PortError::Remote(_)) => {
            Outcome::failure(ErrorKind::RemoteError, err.to_string())
        }
    }
}

/// Coordinates concurrent install-referrer requests over a single
/// connection. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ReferrerResolver {
    shared: Arc<Shared>,
}

impl fmt::Debug for ReferrerResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("ReferrerResolver")
            .field(
                "connector",
                &type_name_of_val(self.shared.connector.as_ref()),
            )
            .field("state", &state.phase.state())
            .field("pending_waiters", &state.waiters.len())
            .field("config", &self.shared.config)
            .finish()
    }
}

impl ReferrerResolver {
    pub fn new(connector: Arc<dyn ReferrerConnector>) -> Self {
        Self::with_config(connector, ResolverConfig::default())
    }

    pub fn with_config(
        connector: Arc<dyn ReferrerConnector>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                connector,
                config,
                state: Mutex::new(ResolverState {
                    phase: Phase::Idle,
                    waiters: WaiterQueue::default(),
                }),
                next_waiter: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.shared.config
    }

    /// Ask for the outcome, delivered to `on_outcome` exactly once.
    ///
    /// Never blocks. If the outcome is already cached the callback runs
    /// before this returns; otherwise it runs on whichever thread delivers
    /// the service's completion.
    pub fn request<F>(&self, on_outcome: F)
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        let waiter = Waiter::callback(self.next_waiter_id(), on_outcome);
        self.admit(waiter);
    }

    /// Future-based form of [`Self::request`].
    pub fn subscribe(&self) -> PendingReferrer {
        let id = self.next_waiter_id();
        let (tx, rx) = oneshot::channel();
        self.admit(Waiter::channel(id, tx));
        PendingReferrer::new(id, rx, Arc::downgrade(&self.shared))
    }

    /// Resolve the attribution payload, honouring the configured request
    /// timeout.
    pub async fn get_attribution(&self) -> Result<AttributionPayload> {
        match self.shared.config.request_timeout {
            Some(timeout) => self.get_attribution_within(timeout).await,
            None => self.subscribe().await,
        }
    }

    /// Resolve the attribution payload, giving up after `timeout`.
    ///
    /// A timed-out caller is withdrawn from the queue; the connection and
    /// every other waiter carry on.
    pub async fn get_attribution_within(
        &self,
        timeout: Duration,
    ) -> Result<AttributionPayload> {
        let pending = self.subscribe();
        let id = pending.id();
        match tokio::time::timeout(timeout, pending).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "install referrer request timed out: waiter={:?}, timeout={:?}",
                    id, timeout
                );
                Err(ReferrerError::TimedOut(timeout))
            }
        }
    }

    /// Feed a completion status into the resolver.
    ///
    /// Ports call this through the handler registered at `open`. The first
    /// call resolves; later calls are ignored.
    pub fn on_completion(&self, status: StatusCode) {
        self.shared.complete(status);
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock().phase.state()
    }

    /// The cached outcome, if resolved.
    pub fn cached(&self) -> Option<Outcome> {
        match &self.shared.lock().phase {
            Phase::Resolved(outcome) => Some(outcome.clone()),
            _ => None,
        }
    }

    pub fn pending_waiters(&self) -> usize {
        self.shared.lock().waiters.len()
    }

    /// Tear the session down: release the connection if one is held and
    /// drop queued callers without dispatching to them.
    ///
    /// Future-based callers observe [`ReferrerError::Abandoned`]; callback
    /// callers are never invoked. A completion that arrives afterwards is
    /// still recorded but finds no connection to read from. The resolver is
    /// not meant to be used for new requests afterwards.
    pub fn shutdown(&self) {
        let (port, abandoned) = {
            let mut state = self.shared.lock();
            let port = match &mut state.phase {
                Phase::Connecting { port } => port.take(),
                Phase::Idle | Phase::Resolved(_) => None,
            };
            (port, state.waiters.drain())
        };

        if abandoned.is_empty() {
            debug!("referrer resolver shut down: held_port={}", port.is_some());
        } else {
            warn!(
                "referrer resolver shut down with queued callers: abandoned={}, held_port={}",
                abandoned.len(),
                port.is_some()
            );
        }
        drop(abandoned);
        drop(port);
    }

    fn next_waiter_id(&self) -> WaiterId {
        WaiterId(self.shared.next_waiter.fetch_add(1, Ordering::Relaxed))
    }

    fn admit(&self, waiter: Waiter) {
        let mut state = self.shared.lock();
        match &state.phase {
            Phase::Resolved(outcome) => {
                let outcome = outcome.clone();
                drop(state);
                debug!("install referrer cache hit: waiter={:?}", waiter.id());
                waiter.dispatch(outcome);
            }
            Phase::Connecting { .. } => {
                let id = waiter.id();
                state.waiters.push(waiter);
                debug!(
                    "install referrer wait: waiter={:?}, waiters={}",
                    id,
                    state.waiters.len()
                );
            }
            Phase::Idle => {
                let id = waiter.id();
                state.waiters.push(waiter);
                state.phase = Phase::Connecting {
                    port: PortSlot::Building,
                };
                drop(state);

                info!("install referrer lead: waiter={:?}, opening connection", id);
                let attempt = ConnectAttempt {
                    shared: &self.shared,
                    armed: true,
                };
                let port = self.shared.connector.connect();
                attempt.disarm();

                let guard = PortGuard::new(Arc::clone(&port));
                if let Some(unused) = self.shared.install(guard) {
                    debug!(
                        "install referrer settled while connecting; releasing unopened port"
                    );
                    drop(unused);
                    return;
                }

                let resolver = Arc::downgrade(&self.shared);
                port.open(Box::new(move |status| match resolver.upgrade() {
                    Some(shared) => shared.complete(status),
                    None => debug!(
                        "referrer completion after resolver dropped: status={}",
                        status
                    ),
                }));
            }
        }
    }
}

/// Settles the attempt if the connector unwinds before returning a port.
struct ConnectAttempt<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl ConnectAttempt<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.abandon_connect();
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !state.waiters.is_empty() {
            debug!(
                "dropping referrer resolver with queued callers: waiters={}",
                state.waiters.len()
            );
        }
    }
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("connector", &type_name_of_val(self.connector.as_ref()))
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{
        ConnectionPort,
        scripted::{CompletionScript, PayloadScript, ScriptedConnector},
    };
    use std::sync::OnceLock;

    fn payload() -> AttributionPayload {
        AttributionPayload {
            install_referrer: "utm_source=unit".into(),
            referrer_click_timestamp_seconds: 1,
            install_begin_timestamp_seconds: 2,
            referrer_click_timestamp_server_seconds: 3,
            install_begin_timestamp_server_seconds: 4,
            install_version: "0.1.0".into(),
            experiment_param: "false".into(),
        }
    }

    #[test]
    fn idle_until_first_request() {
        let connector = Arc::new(ScriptedConnector::manual(PayloadScript::Payload(
            payload(),
        )));
        let resolver = ReferrerResolver::new(connector.clone());

        assert_eq!(resolver.state(), ConnectionState::Idle);
        assert_eq!(connector.stats().connects(), 0);

        resolver.request(|_| {});
        assert_eq!(resolver.state(), ConnectionState::Connecting);
        assert_eq!(resolver.pending_waiters(), 1);
    }

    #[test]
    fn inline_completion_does_not_deadlock() {
        let connector = Arc::new(ScriptedConnector::new(
            CompletionScript::Immediate(StatusCode::Ok),
            PayloadScript::Payload(payload()),
        ));
        let resolver = ReferrerResolver::new(connector.clone());
        let seen = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&seen);
        resolver.request(move |outcome| {
            *slot.lock().expect("lock") = Some(outcome);
        });

        assert_eq!(resolver.state(), ConnectionState::Resolved);
        assert_eq!(
            seen.lock().expect("lock").clone(),
            Some(Outcome::Success(payload()))
        );
        assert_eq!(connector.stats().closes(), 1);
    }

    #[test]
    fn callback_may_reenter_resolver() {
        let connector = Arc::new(ScriptedConnector::manual(PayloadScript::Payload(
            payload(),
        )));
        let resolver = ReferrerResolver::new(connector.clone());
        let nested = Arc::new(Mutex::new(None));

        let inner = resolver.clone();
        let slot = Arc::clone(&nested);
        resolver.request(move |_| {
            inner.request(move |outcome| {
                *slot.lock().expect("lock") = Some(outcome);
            });
        });
        assert!(connector.complete(StatusCode::Ok));

        assert_eq!(
            nested.lock().expect("lock").clone(),
            Some(Outcome::Success(payload()))
        );
        assert_eq!(connector.stats().opens(), 1);
    }

    /// Connector that calls back into the resolver from `connect`.
    struct ReentrantConnector {
        resolver: OnceLock<ReferrerResolver>,
        inner: ScriptedConnector,
        teardown_on_connect: bool,
    }

    impl ReferrerConnector for ReentrantConnector {
        fn connect(&self) -> Arc<dyn ConnectionPort> {
            if let Some(resolver) = self.resolver.get() {
                assert_eq!(resolver.state(), ConnectionState::Connecting);
                let _ = format!("{resolver:?}");
                if self.teardown_on_connect {
                    resolver.shutdown();
                }
            }
            self.inner.connect()
        }
    }

    fn reentrant(teardown_on_connect: bool) -> (ReferrerResolver, Arc<ReentrantConnector>) {
        let connector = Arc::new(ReentrantConnector {
            resolver: OnceLock::new(),
            inner: ScriptedConnector::manual(PayloadScript::Payload(payload())),
            teardown_on_connect,
        });
        let resolver = ReferrerResolver::new(connector.clone());
        connector
            .resolver
            .set(resolver.clone())
            .expect("resolver set once");
        (resolver, connector)
    }

    #[test]
    fn connector_may_reenter_resolver() {
        let (resolver, connector) = reentrant(false);
        let (tx, rx) = std::sync::mpsc::channel();

        let caller = resolver.clone();
        std::thread::spawn(move || {
            caller.request(|_| {});
            let _ = tx.send(());
        });
        rx.recv_timeout(Duration::from_secs(2))
            .expect("request returns while the connector inspects the resolver");

        assert_eq!(resolver.state(), ConnectionState::Connecting);
        assert_eq!(connector.inner.stats().opens(), 1);
        assert!(connector.inner.complete(StatusCode::Ok));
        assert_eq!(resolver.cached(), Some(Outcome::Success(payload())));
        assert_eq!(connector.inner.stats().closes(), 1);
    }

    #[test]
    fn teardown_while_connecting_closes_unopened_port_once() {
        let (resolver, connector) = reentrant(true);

        resolver.request(|_| panic!("abandoned callers are never dispatched"));

        let stats = connector.inner.stats();
        assert_eq!(stats.connects(), 1);
        assert_eq!(stats.opens(), 0);
        assert_eq!(stats.closes(), 1);
        assert_eq!(resolver.pending_waiters(), 0);
    }

    #[test]
    fn panicking_connector_settles_queued_callers() {
        let connector: Arc<dyn ReferrerConnector> =
            Arc::new(|| -> Arc<dyn ConnectionPort> { panic!("no client") });
        let resolver = ReferrerResolver::new(connector);
        let seen = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&seen);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            resolver.request(move |outcome| {
                *slot.lock().expect("lock") = Some(outcome);
            });
        }));

        assert!(result.is_err());
        assert_eq!(resolver.state(), ConnectionState::Resolved);
        assert_eq!(resolver.pending_waiters(), 0);
        assert_eq!(
            seen.lock()
                .expect("lock")
                .as_ref()
                .and_then(Outcome::error_kind),
            Some(ErrorKind::BadState)
        );
    }

    #[test]
    fn resolve_outcome_without_port_is_bad_state() {
        let outcome = resolve_outcome(StatusCode::Ok, None);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::BadState));
    }
}
