//! Host and guest documents talking inside a [`SimBrowser`].

use std::cell::{Cell, RefCell};
use std::fs;
use std::rc::{Rc, Weak};
use std::time::Duration;

use hashxdm_codec::resolve_to_absolute;
use hashxdm_registry::ChannelRegistry;
use hashxdm_transport::{
    HashRelay, HashTransport, HashTransportConfig, LocalTarget, TransportError, TransportHandlers,
};
use hashxdm_window::{SimBrowser, SimConfig, SimDocument};
use serde::Serialize;

use crate::cmd::negotiate::host_config;
use crate::cmd::{parse_duration, SimulateArgs};
use crate::exit::{
    codec_error, io_error, transport_error, window_error, CliError, CliResult, SUCCESS, TIMEOUT,
};
use crate::output::{print_json, print_rows, schema_id, OutputFormat};

/// Virtual time advanced between progress checks.
const STEP: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum Side {
    Host,
    Guest,
}

impl Side {
    fn as_str(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Guest => "guest",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum EventKind {
    Ready,
    Message { message: String, origin: String },
}

#[derive(Debug, Clone, Serialize)]
struct Event {
    at_ms: u64,
    side: Side,
    #[serde(flatten)]
    kind: EventKind,
}

#[derive(Serialize)]
struct SummaryOutput {
    schema_id: String,
    channel: String,
    elapsed_ms: u64,
    host_state: String,
    guest_state: Option<String>,
    host_ready: bool,
    guest_ready: bool,
    sent: usize,
    received_by_guest: usize,
    received_by_host: usize,
}

/// Everything both documents report, stamped with virtual time.
#[derive(Default)]
struct Journal {
    clock: Weak<SimBrowser>,
    events: RefCell<Vec<Event>>,
}

impl Journal {
    fn record(&self, side: Side, kind: EventKind) {
        let at_ms = self
            .clock
            .upgrade()
            .map(|browser| browser.now().as_millis() as u64)
            .unwrap_or_default();
        tracing::info!(at_ms, side = side.as_str(), ?kind, "simulation event");
        self.events.borrow_mut().push(Event { at_ms, side, kind });
    }

    fn count(&self, side: Side, ready: bool) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|event| event.side == side)
            .filter(|event| matches!(event.kind, EventKind::Ready) == ready)
            .count()
    }

    fn handlers(self: &Rc<Self>, side: Side, reply: Option<Rc<Slot>>) -> TransportHandlers {
        let on_message = {
            let journal = Rc::clone(self);
            move |message: &str, origin: &str| {
                journal.record(
                    side,
                    EventKind::Message {
                        message: message.to_string(),
                        origin: origin.to_string(),
                    },
                );
                if let Some(slot) = &reply {
                    slot.reply(&format!("echo:{message}"));
                }
            }
        };
        let journal = Rc::clone(self);
        TransportHandlers::new(on_message).on_ready(move || journal.record(side, EventKind::Ready))
    }
}

/// Guest transport, filled in once its document loads.
#[derive(Default)]
struct Slot {
    transport: RefCell<Option<HashTransport>>,
    setup_error: RefCell<Option<TransportError>>,
}

impl Slot {
    fn reply(&self, message: &str) {
        if let Some(transport) = self.transport.borrow().as_ref() {
            if let Err(err) = transport.post_message(message) {
                tracing::warn!(error = %err, "guest reply dropped");
            }
        }
    }

    fn failure(&self) -> Option<TransportError> {
        let transport_failure = self
            .transport
            .borrow()
            .as_ref()
            .and_then(HashTransport::failure);
        transport_failure.or_else(|| self.setup_error.borrow().clone())
    }
}

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let duration = parse_duration(&args.duration)?;
    let config = match &args.config {
        Some(path) => {
            let json = fs::read_to_string(path).map_err(|err| {
                io_error(&format!("failed reading {}", path.display()), err)
            })?;
            HashTransportConfig::from_json_str(&json)
                .map_err(|err| transport_error("invalid config", err))?
        }
        None => host_config(&args.host)?,
    };
    let host_url = args.host.host_url.as_str();

    let browser = SimBrowser::new(SimConfig::default());
    let journal = Rc::new(Journal {
        clock: Rc::downgrade(&browser),
        events: RefCell::new(Vec::new()),
    });
    let registry = Rc::new(ChannelRegistry::new());
    let relays: Rc<RefCell<Vec<HashRelay>>> = Rc::default();
    let guest = Rc::new(Slot::default());

    if let Some(LocalTarget::Url(local)) = &config.local {
        let local = resolve_to_absolute(host_url, local)
            .map_err(|err| codec_error("invalid local url", err))?;
        serve_relay(&browser, local, &registry, &relays);
    }
    let remote = resolve_to_absolute(host_url, &config.remote)
        .map_err(|err| codec_error("invalid remote url", err))?;
    serve_guest(&browser, remote, &config, &journal, &guest, args.echo);

    let host_doc = browser
        .open(host_url)
        .map_err(|err| window_error("opening host document failed", err))?;
    let host = HashTransport::new(
        host_doc,
        Rc::clone(&registry),
        config.clone(),
        journal.handlers(Side::Host, None),
    )
    .map_err(|err| transport_error("host setup failed", err))?;

    let expected_echoes = if args.echo { args.messages.len() } else { 0 };
    let mut posted = false;
    while browser.now() < duration {
        browser.advance(STEP);
        if host.failure().is_some() || guest.failure().is_some() {
            break;
        }
        if !posted && journal.count(Side::Host, true) > 0 {
            for message in &args.messages {
                host.post_message(message)
                    .map_err(|err| transport_error("post failed", err))?;
            }
            posted = true;
        }
        if posted
            && journal.count(Side::Guest, true) > 0
            && journal.count(Side::Guest, false) >= args.messages.len()
            && journal.count(Side::Host, false) >= expected_echoes
        {
            break;
        }
    }

    let summary = SummaryOutput {
        schema_id: schema_id("simulation-summary"),
        channel: host.channel().to_string(),
        elapsed_ms: browser.now().as_millis() as u64,
        host_state: host.state().to_string(),
        guest_state: guest
            .transport
            .borrow()
            .as_ref()
            .map(|transport| transport.state().to_string()),
        host_ready: journal.count(Side::Host, true) > 0,
        guest_ready: journal.count(Side::Guest, true) > 0,
        sent: args.messages.len(),
        received_by_guest: journal.count(Side::Guest, false),
        received_by_host: journal.count(Side::Host, false),
    };
    report(&journal.events.borrow(), &summary, format);

    let host_failure = host.failure();
    let guest_failure = guest.failure();
    host.destroy();
    if let Some(transport) = guest.transport.borrow().as_ref() {
        transport.destroy();
    }

    if let Some(err) = host_failure {
        return Err(transport_error("host failed", err));
    }
    if let Some(err) = guest_failure {
        return Err(transport_error("guest failed", err));
    }
    if !summary.host_ready || !summary.guest_ready {
        return Err(CliError::new(
            TIMEOUT,
            format!("channel not ready after {}ms", summary.elapsed_ms),
        ));
    }
    if summary.received_by_guest < summary.sent || summary.received_by_host < expected_echoes {
        return Err(CliError::new(
            TIMEOUT,
            format!(
                "delivered {} of {} messages after {}ms",
                summary.received_by_guest, summary.sent, summary.elapsed_ms
            ),
        ));
    }
    Ok(SUCCESS)
}

fn serve_relay(
    browser: &Rc<SimBrowser>,
    local: String,
    registry: &Rc<ChannelRegistry>,
    relays: &Rc<RefCell<Vec<HashRelay>>>,
) {
    let registry = Rc::clone(registry);
    let relays = Rc::clone(relays);
    browser.serve(
        local,
        Rc::new(
            move |doc: Rc<SimDocument>| match HashRelay::attach(doc, Rc::clone(&registry)) {
                Ok(relay) => relays.borrow_mut().push(relay),
                Err(err) => tracing::error!(error = %err, "relay failed to attach"),
            },
        ),
    );
}

fn serve_guest(
    browser: &Rc<SimBrowser>,
    remote: String,
    host: &HashTransportConfig,
    journal: &Rc<Journal>,
    slot: &Rc<Slot>,
    echo: bool,
) {
    let config = HashTransportConfig {
        poll_interval: host.poll_interval,
        resize_nudge: host.resize_nudge,
        send_pacing: host.send_pacing,
        max_url_length: host.max_url_length,
        reliable_max_attempts: host.reliable_max_attempts,
        ..HashTransportConfig::default()
    };
    let journal = Rc::clone(journal);
    let slot = Rc::clone(slot);
    let loaded = Cell::new(false);
    browser.serve(
        remote,
        Rc::new(move |doc: Rc<SimDocument>| {
            if loaded.replace(true) {
                tracing::warn!("guest document reloaded, keeping the first transport");
                return;
            }
            let reply = echo.then(|| Rc::clone(&slot));
            match HashTransport::new(
                doc,
                Rc::new(ChannelRegistry::new()),
                config.clone(),
                journal.handlers(Side::Guest, reply),
            ) {
                Ok(transport) => *slot.transport.borrow_mut() = Some(transport),
                Err(err) => {
                    tracing::error!(error = %err, "guest setup failed");
                    *slot.setup_error.borrow_mut() = Some(err);
                }
            }
        }),
    );
}

fn report(events: &[Event], summary: &SummaryOutput, format: OutputFormat) {
    let schema = schema_id("simulation-event");
    let rows: Vec<_> = events
        .iter()
        .map(|event| {
            let detail = match &event.kind {
                EventKind::Ready => String::new(),
                EventKind::Message { message, origin } => format!("{message} ({origin})"),
            };
            let kind = match event.kind {
                EventKind::Ready => "ready",
                EventKind::Message { .. } => "message",
            };
            (
                EventRow {
                    schema_id: &schema,
                    event,
                },
                vec![
                    event.at_ms.to_string(),
                    event.side.as_str().to_string(),
                    kind.to_string(),
                    detail,
                ],
            )
        })
        .collect();
    let raw: Vec<String> = events
        .iter()
        .filter_map(|event| match &event.kind {
            EventKind::Message { message, .. } => Some(message.clone()),
            EventKind::Ready => None,
        })
        .collect();

    print_rows(&["AT_MS", "SIDE", "EVENT", "DETAIL"], &rows, &raw, format);
    match format {
        OutputFormat::Json => print_json(summary),
        OutputFormat::Table | OutputFormat::Pretty => println!(
            "host={} guest={} sent={} received_by_guest={} received_by_host={} elapsed_ms={}",
            summary.host_state,
            summary.guest_state.as_deref().unwrap_or("not_loaded"),
            summary.sent,
            summary.received_by_guest,
            summary.received_by_host,
            summary.elapsed_ms
        ),
        OutputFormat::Raw => {}
    }
}

#[derive(Serialize)]
struct EventRow<'a> {
    schema_id: &'a str,
    #[serde(flatten)]
    event: &'a Event,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_events_flatten_into_one_object() {
        let event = Event {
            at_ms: 30,
            side: Side::Guest,
            kind: EventKind::Message {
                message: "hi".to_string(),
                origin: "https://host.example".to_string(),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "message");
        assert_eq!(json["side"], "guest");
        assert_eq!(json["message"], "hi");
        assert_eq!(json["at_ms"], 30);
    }

    #[test]
    fn journal_counts_by_side_and_kind() {
        let journal = Journal::default();
        journal.record(Side::Host, EventKind::Ready);
        journal.record(
            Side::Host,
            EventKind::Message {
                message: "a".to_string(),
                origin: "o".to_string(),
            },
        );
        assert_eq!(journal.count(Side::Host, true), 1);
        assert_eq!(journal.count(Side::Host, false), 1);
        assert_eq!(journal.count(Side::Guest, false), 0);
    }
}
