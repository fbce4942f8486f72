//! Data model shared by the install-referrer resolver and its callers.
//!
//! Everything here is plain data: the attribution record returned by the
//! referrer service, the status codes its connection reports, and the
//! success-or-failure [`Outcome`] a resolver caches and fans out.

#![allow(missing_docs)]

pub mod outcome;
pub mod payload;
pub mod status;

pub use outcome::{ErrorKind, Failure, Outcome};
pub use payload::AttributionPayload;
pub use status::StatusCode;
