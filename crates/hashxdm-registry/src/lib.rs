//! Channel-scoped registry shared by the documents of one application.
//!
//! The hosting application owns one registry and hands it to every
//! transport and relay document it creates. Entries are keyed by channel id
//! and hold a pending readiness callback, the counterpart window once it is
//! announced, and an optional relay handler.

pub mod config;
pub mod error;
pub mod registry;

pub use config::RegistryConfig;
pub use error::{RegistryError, Result};
pub use registry::{ChannelRegistry, ReadyCallback, RelayHandler};
