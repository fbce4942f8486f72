//! # Referrer Core
//!
//! Single-flight resolution of install-referrer attribution data.
//!
//! A [`ReferrerResolver`] owns at most one connection to the referrer
//! service over its lifetime. Concurrent callers collapse onto that
//! connection, the outcome (payload or categorized [`Failure`]) is cached
//! forever, and every caller gets it exactly once.
//!
//! ## Architecture
//!
//! - [`port`]: the connection boundary ([`ConnectionPort`],
//!   [`ReferrerConnector`]) plus a scripted in-process implementation.
//! - [`resolver`]: the state machine, waiter queue and dispatch.
//! - [`config`]: runtime knobs such as the request timeout.
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use referrer_core::{
//!     ReferrerResolver,
//!     port::scripted::{PayloadScript, ScriptedConnector},
//! };
//! use referrer_model::{AttributionPayload, StatusCode};
//!
//! async fn attribution() -> Result<(), Box<dyn std::error::Error>> {
//!     let connector = Arc::new(ScriptedConnector::manual(PayloadScript::Payload(
//!         AttributionPayload::default(),
//!     )));
//!     let resolver = ReferrerResolver::new(connector.clone());
//!
//!     let pending = resolver.subscribe();
//!     connector.complete(StatusCode::Ok);
//!     let payload = pending.await?;
//!     println!("referrer: {}", payload.install_referrer);
//!     Ok(())
//! }
//! ```

#![allow(missing_docs)]

pub mod config;
pub mod error;
pub mod port;
pub mod resolver;

pub use config::ResolverConfig;
pub use error::{ReferrerError, Result};
pub use port::{CompletionHandler, ConnectionPort, PortError, ReferrerConnector};
pub use referrer_model::{
    AttributionPayload, ErrorKind, Failure, Outcome, StatusCode,
};
pub use resolver::{ConnectionState, PendingReferrer, ReferrerResolver, WaiterId};
