//! Readiness handshake states and counterpart window acquisition.

use std::fmt;

use hashxdm_codec::params::remote_frame_name;
use hashxdm_registry::ChannelRegistry;
use hashxdm_window::{Environment, FrameId, WindowError, WindowId};
use serde::Serialize;

use crate::error::{Result, TransportError};

/// Interval of the document body check.
pub const BODY_CHECK_INTERVAL: std::time::Duration = std::time::Duration::from_millis(10);

/// Lifecycle of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeState {
    /// Constructed, waiting for a readiness trigger.
    Initial,
    /// Host is probing for the window it reads from.
    AwaitingCounterpartWindow,
    /// The listener window exists but has no body yet.
    AwaitingDocumentBody,
    /// Receiving and sending.
    Active,
    Destroyed,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initial => "initial",
            Self::AwaitingCounterpartWindow => "awaiting_counterpart_window",
            Self::AwaitingDocumentBody => "awaiting_document_body",
            Self::Active => "active",
            Self::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// How this side learns about new fragments. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiveMode {
    /// Read the listener fragment every poll interval.
    Poll,
    /// Read the listener fragment on its resize notifications.
    Resize,
    /// Receive fragments pushed by the relay document through the registry.
    Relay,
}

impl ReceiveMode {
    pub fn for_host(use_parent: bool, ready_after: bool) -> Self {
        if use_parent {
            Self::Poll
        } else if ready_after {
            Self::Resize
        } else {
            Self::Relay
        }
    }

    pub fn for_guest(use_polling: bool) -> Self {
        if use_polling {
            Self::Poll
        } else {
            Self::Resize
        }
    }
}

impl fmt::Display for ReceiveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Poll => "poll",
            Self::Resize => "resize",
            Self::Relay => "relay",
        })
    }
}

/// One way of finding the window a host reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowSource {
    /// The host's own window.
    OwnWindow,
    /// A named child of a frame's content window.
    NamedChildFrame { frame: FrameId, name: String },
    /// A window reused by name.
    NamedWindow(String),
    /// The window announced in the registry for the channel.
    Registry,
}

/// Probes a host tries, in order.
pub fn host_window_sources(
    channel: &str,
    use_parent: bool,
    ready_after: bool,
    caller_frame: Option<FrameId>,
) -> Vec<WindowSource> {
    if use_parent {
        return vec![WindowSource::OwnWindow];
    }
    if !ready_after {
        return vec![WindowSource::Registry];
    }
    let name = remote_frame_name(channel);
    let mut sources = Vec::with_capacity(2);
    if let Some(frame) = caller_frame {
        sources.push(WindowSource::NamedChildFrame {
            frame,
            name: name.clone(),
        });
    }
    sources.push(WindowSource::NamedWindow(name));
    sources
}

fn try_source(
    env: &dyn Environment,
    registry: &ChannelRegistry,
    channel: &str,
    source: &WindowSource,
) -> std::result::Result<Option<WindowId>, WindowError> {
    match source {
        WindowSource::OwnWindow => Ok(Some(env.current_window())),
        WindowSource::NamedChildFrame { frame, name } => {
            let window = env.frame_window(*frame)?;
            env.child_frame(window, name)
        }
        WindowSource::NamedWindow(name) => Ok(env.open_named(name)),
        WindowSource::Registry => Ok(registry.lookup_window(channel)),
    }
}

/// Try `sources` in order and return the first window found.
///
/// A source denied by the same-origin policy counts as a miss.
pub fn acquire_window(
    env: &dyn Environment,
    registry: &ChannelRegistry,
    channel: &str,
    sources: &[WindowSource],
) -> Result<WindowId> {
    for source in sources {
        match try_source(env, registry, channel, source) {
            Ok(Some(window)) => {
                tracing::debug!(channel, ?source, %window, "counterpart window acquired");
                return Ok(window);
            }
            Ok(None) => tracing::trace!(channel, ?source, "source found no window"),
            Err(err) => tracing::trace!(channel, ?source, error = %err, "source unreachable"),
        }
    }
    Err(TransportError::NoCounterpartWindow {
        channel: channel.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use hashxdm_window::{FrameSpec, SimBrowser, SimConfig, SimDocument};

    use super::*;

    fn frame_spec(url: &str, name: &str) -> FrameSpec {
        FrameSpec {
            url: url.to_string(),
            container: None,
            name: name.to_string(),
        }
    }

    #[test]
    fn receive_mode_selection() {
        assert_eq!(ReceiveMode::for_host(true, true), ReceiveMode::Poll);
        assert_eq!(ReceiveMode::for_host(false, true), ReceiveMode::Resize);
        assert_eq!(ReceiveMode::for_host(false, false), ReceiveMode::Relay);
        assert_eq!(ReceiveMode::for_guest(true), ReceiveMode::Poll);
        assert_eq!(ReceiveMode::for_guest(false), ReceiveMode::Resize);
    }

    #[test]
    fn sources_per_configuration() {
        let frame = FrameId::from_raw(1);
        assert_eq!(
            host_window_sources("c1", true, false, Some(frame)),
            vec![WindowSource::OwnWindow]
        );
        assert_eq!(
            host_window_sources("c1", false, false, Some(frame)),
            vec![WindowSource::Registry]
        );
        assert_eq!(
            host_window_sources("c1", false, true, Some(frame)),
            vec![
                WindowSource::NamedChildFrame {
                    frame,
                    name: "remote_c1".to_string()
                },
                WindowSource::NamedWindow("remote_c1".to_string()),
            ]
        );
    }

    #[test]
    fn denied_child_frame_falls_back_to_named_window() {
        let browser = SimBrowser::new(SimConfig::default());
        browser.serve(
            "https://guest.example/",
            Rc::new(|doc: Rc<SimDocument>| {
                doc.create_frame(frame_spec("https://host.example/hash.html#c1", "remote_c1"), None)
                    .unwrap();
            }),
        );
        let host = browser.open("https://host.example/app.html").unwrap();
        let frame = host
            .create_frame(frame_spec("https://guest.example/cb.html", "local_c1"), None)
            .unwrap();
        browser.advance(std::time::Duration::from_millis(5));

        let registry = ChannelRegistry::new();
        let sources = host_window_sources("c1", false, true, Some(frame));
        let window = acquire_window(host.as_ref(), &registry, "c1", &sources).unwrap();
        assert_eq!(browser.find_named("remote_c1"), Some(window));
    }

    #[test]
    fn all_sources_failing_is_fatal() {
        let browser = SimBrowser::new(SimConfig::default());
        let host = browser.open("https://host.example/app.html").unwrap();
        let registry = ChannelRegistry::new();
        let err = acquire_window(host.as_ref(), &registry, "c1", &[WindowSource::Registry])
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::NoCounterpartWindow {
                channel: "c1".to_string()
            }
        );
    }

    #[test]
    fn registry_source_uses_announced_window() {
        let browser = SimBrowser::new(SimConfig::default());
        let host = browser.open("https://host.example/app.html").unwrap();
        let registry = ChannelRegistry::new();
        registry.announce("c1", WindowId::from_raw(42)).unwrap();
        let window =
            acquire_window(host.as_ref(), &registry, "c1", &[WindowSource::Registry]).unwrap();
        assert_eq!(window, WindowId::from_raw(42));
    }
}
