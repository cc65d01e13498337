/// Errors that can occur in transport operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Window or frame access failed.
    #[error("window error: {0}")]
    Window(#[from] hashxdm_window::WindowError),

    /// Negotiation URL could not be built or read.
    #[error("negotiation error: {0}")]
    Codec(#[from] hashxdm_codec::CodecError),

    /// Channel registry rejected the channel.
    #[error("registry error: {0}")]
    Registry(#[from] hashxdm_registry::RegistryError),

    /// No window source yielded the counterpart window.
    #[error("no counterpart window for channel '{channel}'")]
    NoCounterpartWindow { channel: String },

    /// Guest configured to use its parent window is not framed.
    #[error("document has no parent window")]
    NoParentWindow,

    /// Configuration cannot produce a working channel.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The transport was destroyed.
    #[error("transport destroyed")]
    Destroyed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
