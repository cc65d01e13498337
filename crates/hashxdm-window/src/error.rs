use crate::handle::{FrameId, WindowId};

/// Errors that can occur while touching windows and frames.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    /// The same-origin policy refused access to another document.
    #[error("access to {window} denied ({operation})")]
    AccessDenied {
        window: WindowId,
        operation: &'static str,
    },

    /// The window does not exist (closed, or never created).
    #[error("no such window: {0}")]
    NoSuchWindow(WindowId),

    /// The frame does not exist or was already removed.
    #[error("no such frame: {0}")]
    NoSuchFrame(FrameId),

    /// A location could not be parsed as an absolute URL.
    #[error("invalid location '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

pub type Result<T> = std::result::Result<T, WindowError>;
