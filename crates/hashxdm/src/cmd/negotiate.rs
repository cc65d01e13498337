use std::rc::Rc;

use hashxdm_codec::{resolve_role_from_location, ChannelRole};
use hashxdm_registry::ChannelRegistry;
use hashxdm_transport::{
    HashTransport, HashTransportConfig, LocalTarget, ReceiveMode, TransportHandlers,
};
use hashxdm_window::{SimBrowser, SimConfig};
use serde::Serialize;

use crate::cmd::{parse_duration, HostArgs, NegotiateArgs};
use crate::exit::{
    codec_error, transport_error, window_error, CliError, CliResult, INTERNAL, SUCCESS,
};
use crate::output::{print_record, schema_id, OutputFormat, Record};

/// Callback document used when neither `--local` nor `--current-window`
/// is given.
const DEFAULT_LOCAL: &str = "hash.html";

#[derive(Serialize)]
struct NegotiateOutput {
    schema_id: String,
    channel: String,
    remote_url: String,
    remote_origin: String,
    url_length: usize,
    max_url_length: usize,
    host_mode: ReceiveMode,
    guest_mode: ReceiveMode,
}

pub fn run(args: NegotiateArgs, format: OutputFormat) -> CliResult<i32> {
    let config = host_config(&args.host)?;

    let browser = SimBrowser::new(SimConfig::default());
    let doc = browser
        .open(&args.host.host_url)
        .map_err(|err| window_error("opening host document failed", err))?;
    let transport = HashTransport::new(
        doc,
        Rc::new(ChannelRegistry::new()),
        config.clone(),
        TransportHandlers::new(|_, _| {}),
    )
    .map_err(|err| transport_error("negotiation failed", err))?;

    let remote_url = transport.remote_url();
    let guest_mode = match resolve_role_from_location(&remote_url)
        .map_err(|err| codec_error("guest url does not negotiate", err))?
    {
        ChannelRole::Guest(params) => ReceiveMode::for_guest(params.use_polling),
        ChannelRole::Host => {
            return Err(CliError::new(
                INTERNAL,
                format!("guest url carries no negotiation parameters: {remote_url}"),
            ))
        }
    };
    let out = NegotiateOutput {
        schema_id: schema_id("negotiation"),
        channel: transport.channel().to_string(),
        remote_origin: transport.remote_origin(),
        url_length: transport.remote_url_len(),
        max_url_length: config.max_url_length,
        host_mode: transport.receive_mode(),
        guest_mode,
        remote_url: remote_url.clone(),
    };
    transport.destroy();

    print_record(
        &Record {
            value: &out,
            fields: vec![
                ("channel", out.channel.clone()),
                ("remote_url", out.remote_url.clone()),
                ("remote_origin", out.remote_origin.clone()),
                (
                    "url_length",
                    format!("{}/{}", out.url_length, out.max_url_length),
                ),
                ("host_mode", out.host_mode.to_string()),
                ("guest_mode", out.guest_mode.to_string()),
            ],
            raw: remote_url,
        },
        format,
    );
    Ok(SUCCESS)
}

/// Host configuration described by the command line flags.
pub fn host_config(args: &HostArgs) -> CliResult<HashTransportConfig> {
    let local = if args.current_window {
        LocalTarget::CurrentWindow
    } else {
        LocalTarget::Url(args.local.clone().unwrap_or_else(|| DEFAULT_LOCAL.to_string()))
    };
    let mut config = HashTransportConfig::host(args.channel.clone(), args.remote.clone(), local);
    config.container = args.container.clone();
    if let Some(delay) = &args.ready_after {
        config.ready_after = Some(parse_duration(delay)?);
    }
    if let Some(max) = args.max_url_length {
        config.max_url_length = max;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cmd::DEFAULT_HOST_URL;

    fn args() -> HostArgs {
        HostArgs {
            channel: "c1".to_string(),
            remote: "https://guest.example/cb.html".to_string(),
            local: None,
            current_window: false,
            container: None,
            ready_after: None,
            max_url_length: None,
            host_url: DEFAULT_HOST_URL.to_string(),
        }
    }

    #[test]
    fn defaults_to_callback_document() {
        let config = host_config(&args()).unwrap();
        assert_eq!(config.local, Some(LocalTarget::Url("hash.html".to_string())));
        assert_eq!(config.ready_after, None);
    }

    #[test]
    fn flags_override_defaults() {
        let mut args = args();
        args.current_window = true;
        args.ready_after = Some("150ms".to_string());
        args.max_url_length = Some(2000);
        args.container = Some("box".to_string());

        let config = host_config(&args).unwrap();
        assert_eq!(config.local, Some(LocalTarget::CurrentWindow));
        assert_eq!(config.ready_after, Some(Duration::from_millis(150)));
        assert_eq!(config.max_url_length, 2000);
        assert_eq!(config.container.as_deref(), Some("box"));
    }

    #[test]
    fn rejects_bad_ready_after() {
        let mut args = args();
        args.ready_after = Some("soon".to_string());
        assert!(host_config(&args).is_err());
    }
}
