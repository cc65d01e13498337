use std::fmt;
use std::io;

use hashxdm_codec::CodecError;
use hashxdm_registry::RegistryError;
use hashxdm_transport::TransportError;
use hashxdm_window::WindowError;

// Process exit codes. 64 follows sysexits(3) EX_USAGE and 124 the timeout(1) convention.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::NotFound => USAGE,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn window_error(context: &str, err: WindowError) -> CliError {
    let code = match err {
        WindowError::AccessDenied { .. } => PERMISSION_DENIED,
        WindowError::InvalidUrl { .. } => DATA_INVALID,
        WindowError::NoSuchWindow(_) | WindowError::NoSuchFrame(_) => TRANSPORT_ERROR,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn codec_error(context: &str, err: CodecError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn registry_error(context: &str, err: RegistryError) -> CliError {
    match err {
        RegistryError::ChannelInUse(_) => CliError::new(USAGE, format!("{context}: {err}")),
        RegistryError::RegistryFull { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Window(err) => window_error(context, err),
        TransportError::Codec(err) => codec_error(context, err),
        TransportError::Registry(err) => registry_error(context, err),
        TransportError::InvalidConfig(_) => CliError::new(USAGE, format!("{context}: {err}")),
        TransportError::NoCounterpartWindow { .. } | TransportError::NoParentWindow => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        TransportError::Destroyed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use hashxdm_window::WindowId;

    use super::*;

    #[test]
    fn transport_errors_unwrap_to_their_source_code() {
        let err = TransportError::Window(WindowError::AccessDenied {
            window: WindowId::from_raw(3),
            operation: "location",
        });
        assert_eq!(transport_error("send", err).code, PERMISSION_DENIED);

        let err = TransportError::Codec(CodecError::MissingParameter("xdm_c"));
        assert_eq!(transport_error("start", err).code, DATA_INVALID);

        let err = TransportError::Registry(RegistryError::ChannelInUse("c1".to_string()));
        assert_eq!(transport_error("start", err).code, USAGE);
    }

    #[test]
    fn handshake_failures_are_transport_errors() {
        let err = transport_error(
            "handshake",
            TransportError::NoCounterpartWindow {
                channel: "c1".to_string(),
            },
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
        assert_eq!(
            err.to_string(),
            "handshake: no counterpart window for channel 'c1'"
        );
    }

    #[test]
    fn missing_file_is_usage() {
        let err = io_error("read", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(err.code, USAGE);
    }
}
