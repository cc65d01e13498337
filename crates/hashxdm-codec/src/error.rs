/// Errors that can occur while building or reading negotiation URLs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The URL could not be parsed.
    #[error("invalid url '{url}': {source}")]
    InvalidUrl {
        url: String,
        source: ::url::ParseError,
    },

    /// A negotiation parameter required for the guest role is missing.
    #[error("missing negotiation parameter '{0}'")]
    MissingParameter(&'static str),

    /// A negotiation parameter is present but unusable.
    #[error("invalid negotiation parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, CodecError>;
