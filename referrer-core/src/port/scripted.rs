//! In-process port that plays back a fixed script.
//!
//! Used by the probe binary and the test suites to stand in for the real
//! referrer service. Completions can be fired by hand, inline from `open`, or
//! after a delay from another task/thread.

use std::{
    fmt,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use referrer_model::{AttributionPayload, StatusCode};
use tracing::debug;

use super::{CompletionHandler, ConnectionPort, PortError, ReferrerConnector};

/// When and how the scripted port reports completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionScript {
    /// Hold the handler until [`ScriptedConnector::complete`] is called.
    Manual,
    /// Complete synchronously from inside `open`.
    Immediate(StatusCode),
    /// Complete from a background task after `delay`.
    Delayed { status: StatusCode, delay: Duration },
    /// Never complete. Models a service that drops the callback.
    Silent,
}

/// What `read_payload` returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadScript {
    Payload(AttributionPayload),
    ConnectionLost(String),
    Remote(String),
}

impl PayloadScript {
    fn read(&self) -> Result<AttributionPayload, PortError> {
        match self {
            PayloadScript::Payload(payload) => Ok(payload.clone()),
            PayloadScript::ConnectionLost(reason) => {
                Err(PortError::ConnectionLost(reason.clone()))
            }
            PayloadScript::Remote(reason) => Err(PortError::Remote(reason.clone())),
        }
    }
}

/// Call counters shared by a connector and every port it builds.
#[derive(Debug, Default)]
pub struct PortStats {
    connects: AtomicUsize,
    opens: AtomicUsize,
    reads: AtomicUsize,
    closes: AtomicUsize,
}

impl PortStats {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Connector producing [`ScriptedPort`]s.
pub struct ScriptedConnector {
    completion: CompletionScript,
    payload: PayloadScript,
    stats: Arc<PortStats>,
    ports: Mutex<Vec<Arc<ScriptedPort>>>,
}

impl fmt::Debug for ScriptedConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedConnector")
            .field("completion", &self.completion)
            .field("payload", &self.payload)
            .field("stats", &self.stats)
            .finish()
    }
}

impl ScriptedConnector {
    pub fn new(completion: CompletionScript, payload: PayloadScript) -> Self {
        Self {
            completion,
            payload,
            stats: Arc::new(PortStats::default()),
            ports: Mutex::new(Vec::new()),
        }
    }

    /// Connector whose ports wait for [`Self::complete`].
    pub fn manual(payload: PayloadScript) -> Self {
        Self::new(CompletionScript::Manual, payload)
    }

    pub fn stats(&self) -> Arc<PortStats> {
        Arc::clone(&self.stats)
    }

    /// Fire the pending completion of the most recently built port.
    ///
    /// Returns `false` when no port has been opened or its handler was
    /// already used.
    pub fn complete(&self, status: StatusCode) -> bool {
        let port = self
            .ports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned();
        match port {
            Some(port) => port.fire(status),
            None => false,
        }
    }
}

impl ReferrerConnector for ScriptedConnector {
    fn connect(&self) -> Arc<dyn ConnectionPort> {
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        let port = Arc::new(ScriptedPort {
            completion: self.completion,
            payload: self.payload.clone(),
            stats: Arc::clone(&self.stats),
            handler: Mutex::new(None),
        });
        self.ports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&port));
        port
    }
}

/// A single scripted connection.
pub struct ScriptedPort {
    completion: CompletionScript,
    payload: PayloadScript,
    stats: Arc<PortStats>,
    handler: Mutex<Option<CompletionHandler>>,
}

impl fmt::Debug for ScriptedPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self
            .handler
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false);
        f.debug_struct("ScriptedPort")
            .field("completion", &self.completion)
            .field("handler_pending", &pending)
            .finish()
    }
}

impl ScriptedPort {
    fn fire(&self, status: StatusCode) -> bool {
        let handler = self
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handler {
            Some(handler) => {
                debug!("scripted port completing: status={}", status);
                handler(status);
                true
            }
            None => false,
        }
    }
}

impl ConnectionPort for ScriptedPort {
    fn open(&self, on_completion: CompletionHandler) {
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        match self.completion {
            CompletionScript::Manual => {
                *self.handler.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(on_completion);
            }
            CompletionScript::Immediate(status) => on_completion(status),
            CompletionScript::Delayed { status, delay } => {
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        handle.spawn(async move {
                            tokio::time::sleep(delay).await;
                            on_completion(status);
                        });
                    }
                    Err(_) => {
                        std::thread::spawn(move || {
                            std::thread::sleep(delay);
                            on_completion(status);
                        });
                    }
                }
            }
            CompletionScript::Silent => drop(on_completion),
        }
    }

    fn read_payload(&self) -> Result<AttributionPayload, PortError> {
        self.stats.reads.fetch_add(1, Ordering::SeqCst);
        self.payload.read()
    }

    fn close(&self) {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
    }
}
