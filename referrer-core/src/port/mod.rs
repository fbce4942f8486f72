//! Boundary to the out-of-process referrer service.
//!
//! A [`ReferrerConnector`] builds one [`ConnectionPort`] per connection
//! attempt. The port reports completion through a callback that may run on
//! any thread, possibly before [`ConnectionPort::open`] returns.

pub mod scripted;

use std::{any::type_name_of_val, fmt, sync::Arc};

use referrer_model::{AttributionPayload, StatusCode};
use thiserror::Error;
use tracing::debug;

/// Completion callback handed to [`ConnectionPort::open`].
pub type CompletionHandler = Box<dyn FnOnce(StatusCode) + Send + 'static>;

/// Errors raised while reading the payload from an open port.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PortError {
    #[error("service connection lost: {0}")]
    ConnectionLost(String),

    #[error("remote service error: {0}")]
    Remote(String),
}

/// One connection to the referrer service.
pub trait ConnectionPort: Send + Sync {
    /// Start the handshake. `on_completion` must be invoked at most once.
    fn open(&self, on_completion: CompletionHandler);

    /// Read the attribution payload after an OK completion.
    fn read_payload(&self) -> Result<AttributionPayload, PortError>;

    /// Release the connection. Idempotent, and safe on a port that never
    /// finished opening.
    fn close(&self);
}

/// Builds fresh ports for the resolver.
pub trait ReferrerConnector: Send + Sync {
    fn connect(&self) -> Arc<dyn ConnectionPort>;
}

impl<F> ReferrerConnector for F
where
    F: Fn() -> Arc<dyn ConnectionPort> + Send + Sync,
{
    fn connect(&self) -> Arc<dyn ConnectionPort> {
        self()
    }
}

/// Owns a port and closes it when dropped.
pub(crate) struct PortGuard {
    port: Arc<dyn ConnectionPort>,
}

impl PortGuard {
    pub(crate) fn new(port: Arc<dyn ConnectionPort>) -> Self {
        Self { port }
    }

    pub(crate) fn port(&self) -> &Arc<dyn ConnectionPort> {
        &self.port
    }
}

impl Drop for PortGuard {
    fn drop(&mut self) {
        debug!(
            "releasing referrer connection: port={}",
            type_name_of_val(self.port.as_ref())
        );
        self.port.close();
    }
}

impl fmt::Debug for PortGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortGuard")
            .field("port", &type_name_of_val(self.port.as_ref()))
            .finish()
    }
}
