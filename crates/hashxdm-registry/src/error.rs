/// Errors that can occur while registering channel entries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A readiness callback or relay handler is already pending for the channel.
    #[error("channel '{0}' is already in use")]
    ChannelInUse(String),

    /// The registry holds its configured maximum of channels.
    #[error("registry is full ({max} channels)")]
    RegistryFull { max: usize },
}

pub type Result<T> = std::result::Result<T, RegistryError>;
