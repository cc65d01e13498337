//! Negotiation query parameters.
//!
//! The host appends these to the guest URL. Presence alone carries meaning
//! for the `xdm_p`, `xdm_pa` and `xdm_po` flags; their values are ignored.

/// Channel id.
pub const PARAM_CHANNEL: &str = "xdm_c";

/// Transport protocol id. Its presence marks the loading document as guest.
pub const PARAM_PROTOCOL: &str = "xdm_p";

/// Percent-encoded URL of the host's callback document.
pub const PARAM_LOCAL_URL: &str = "xdm_e";

/// Guest should treat its parent window as the counterpart.
pub const PARAM_USE_PARENT: &str = "xdm_pa";

/// Guest should poll instead of waiting for resize notifications.
pub const PARAM_USE_POLLING: &str = "xdm_po";

/// Protocol id of the hash transport.
pub const HASH_PROTOCOL_ID: &str = "0";

/// Name prefix of the frame a host creates for the guest document.
pub const LOCAL_FRAME_PREFIX: &str = "local_";

/// Name prefix of the frame a guest creates for the host's callback document.
pub const REMOTE_FRAME_PREFIX: &str = "remote_";

/// Name of the frame hosting the guest document for a channel.
pub fn local_frame_name(channel: &str) -> String {
    format!("{LOCAL_FRAME_PREFIX}{channel}")
}

/// Name of the frame hosting the host's callback document for a channel.
pub fn remote_frame_name(channel: &str) -> String {
    format!("{REMOTE_FRAME_PREFIX}{channel}")
}
