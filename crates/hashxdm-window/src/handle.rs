//! Opaque handles to browser objects.
//!
//! Handles never grant ownership of the counterpart document. They are
//! plain identifiers resolved through an [`Environment`](crate::Environment)
//! on every use, so a stale handle degrades into an error instead of
//! touching a torn-down document.

use std::fmt;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw identifier.
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            /// The raw identifier.
            pub const fn as_raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

handle!(
    /// A browsing context (top-level window or a frame's content window).
    WindowId,
    "window"
);
handle!(
    /// A frame element hosted by some document.
    FrameId,
    "frame"
);
handle!(
    /// A registered resize listener.
    ListenerId,
    "listener"
);
handle!(
    /// A scheduled one-shot timer.
    TimerId,
    "timer"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_id() {
        assert_eq!(WindowId::from_raw(3).to_string(), "window#3");
        assert_eq!(FrameId::from_raw(7).to_string(), "frame#7");
        assert_eq!(TimerId::from_raw(0).as_raw(), 0);
    }
}
