//! Fragment message codec and channel negotiation.
//!
//! Every message travels in the fragment of a URL:
//! - a decimal sequence number, unique per sending side
//! - an `_` separator
//! - the percent-encoded message
//!
//! The negotiation parameters a host appends to the guest URL, and the
//! resolver that turns them back into a channel role, also live here.

pub mod codec;
pub mod error;
pub mod params;
pub mod role;
pub mod url;

pub use codec::{
    decode_fragment, encode_message, parse_fragment, percent_decode, percent_encode, Fragment,
};
pub use error::{CodecError, Result};
pub use params::{
    HASH_PROTOCOL_ID, LOCAL_FRAME_PREFIX, PARAM_CHANNEL, PARAM_LOCAL_URL, PARAM_PROTOCOL,
    PARAM_USE_PARENT, PARAM_USE_POLLING, REMOTE_FRAME_PREFIX,
};
pub use role::{resolve_role, resolve_role_from_location, ChannelRole, GuestParams};
pub use url::{append_query_parameters, get_origin, parse_query, resolve_to_absolute};
