//! Channel role resolution from the negotiation query.

use std::collections::HashMap;

use serde::Serialize;

use crate::codec::percent_decode;
use crate::error::{CodecError, Result};
use crate::params::{
    PARAM_CHANNEL, PARAM_LOCAL_URL, PARAM_PROTOCOL, PARAM_USE_PARENT, PARAM_USE_POLLING,
};
use crate::url::parse_query;

/// Parameters a guest learns from the URL it was loaded with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuestParams {
    pub channel: String,
    /// Host callback URL, percent-decoded.
    pub remote_url: String,
    pub use_parent: bool,
    pub use_polling: bool,
}

/// Which side of a channel the loading document is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChannelRole {
    Host,
    Guest(GuestParams),
}

impl ChannelRole {
    pub fn is_host(&self) -> bool {
        matches!(self, Self::Host)
    }
}

/// Resolve the role from already-parsed query parameters.
///
/// The document is a guest iff `xdm_p` is present; a guest requires both
/// `xdm_c` and `xdm_e`.
pub fn resolve_role(query: &HashMap<String, String>) -> Result<ChannelRole> {
    if !query.contains_key(PARAM_PROTOCOL) {
        return Ok(ChannelRole::Host);
    }

    let channel = query
        .get(PARAM_CHANNEL)
        .ok_or(CodecError::MissingParameter(PARAM_CHANNEL))?;
    if channel.is_empty() {
        return Err(CodecError::InvalidParameter {
            name: PARAM_CHANNEL,
            reason: "channel id is empty".to_string(),
        });
    }
    let remote_url = query
        .get(PARAM_LOCAL_URL)
        .map(|raw| percent_decode(raw))
        .ok_or(CodecError::MissingParameter(PARAM_LOCAL_URL))?;
    if remote_url.is_empty() {
        return Err(CodecError::InvalidParameter {
            name: PARAM_LOCAL_URL,
            reason: "callback url is empty".to_string(),
        });
    }

    Ok(ChannelRole::Guest(GuestParams {
        channel: percent_decode(channel),
        remote_url,
        use_parent: query.contains_key(PARAM_USE_PARENT),
        use_polling: query.contains_key(PARAM_USE_POLLING),
    }))
}

/// Resolve the role of the document loaded at `location`.
pub fn resolve_role_from_location(location: &str) -> Result<ChannelRole> {
    let role = resolve_role(&parse_query(location))?;
    tracing::debug!(host = role.is_host(), "resolved channel role");
    Ok(role)
}
