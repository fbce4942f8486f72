//! Configuration loading for the install-referrer resolver.
//!
//! The resolver itself only understands [`ResolverConfig`]; this crate
//! decides where that value comes from (environment, TOML/JSON files or
//! defaults) and reports which source won. The `referrer-probe` binary uses
//! it to drive a resolver against the scripted connection port.

#![allow(missing_docs)]

pub mod loader;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigSource};
pub use referrer_core::ResolverConfig;
