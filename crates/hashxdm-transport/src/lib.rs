//! Fragment-based cross-document transport.
//!
//! This is the "just works" layer. A [`HashTransport`] negotiates a
//! channel between a host document and a guest document on another
//! origin, then carries messages in the fragment of URLs each side writes
//! into a window of the other. A behavior chain on top of the raw fragment
//! writes adds acknowledgements, chunking and a shared-secret check.

pub mod behavior;
pub mod config;
pub mod delivery;
pub mod error;
pub mod handshake;
pub mod hash;
pub mod relay;

pub use behavior::{
    Chain, Effect, Link, QueueBehavior, ReliableBehavior, Stage, VerifyBehavior, Wake,
};
pub use config::{HashTransportConfig, LocalTarget};
pub use delivery::{Caller, Delivery, DeliveryOptions};
pub use error::{Result, TransportError};
pub use handshake::{acquire_window, HandshakeState, ReceiveMode, WindowSource};
pub use hash::{HashTransport, TransportHandlers};
pub use relay::HashRelay;
