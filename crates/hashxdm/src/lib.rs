//! Cross-origin document messaging over URL fragments.
//!
//! hashxdm lets two documents on different origins talk by writing
//! messages into the fragment of a URL loaded in a window of the other
//! side. A behavior chain adds acknowledgements, chunking of long
//! messages and a shared-secret check on top of the raw fragment writes.
//!
//! # Crate Structure
//!
//! - [`window`]: Window, frame and timer abstraction, plus a simulated browser
//! - [`codec`]: Fragment wire format and channel negotiation parameters
//! - [`registry`]: Channel-scoped readiness registry (behind `transport` feature)
//! - [`transport`]: The hash transport and its behaviors (behind `transport` feature)

/// Re-export window types.
pub mod window {
    pub use hashxdm_window::*;
}

/// Re-export codec types.
pub mod codec {
    pub use hashxdm_codec::*;
}

/// Re-export registry types (requires `transport` feature).
#[cfg(feature = "transport")]
pub mod registry {
    pub use hashxdm_registry::*;
}

/// Re-export transport types (requires `transport` feature).
#[cfg(feature = "transport")]
pub mod transport {
    pub use hashxdm_transport::*;
}
