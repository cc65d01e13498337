#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use hashxdm_registry::ChannelRegistry;
use hashxdm_transport::{HashRelay, HashTransport, HashTransportConfig, LocalTarget, TransportHandlers};
use hashxdm_window::{Environment, SimBrowser, SimConfig, SimDocument};

pub const HOST_URL: &str = "https://host.example/app.html";
pub const GUEST_URL: &str = "https://guest.example/cb.html";
pub const LOCAL_URL: &str = "https://host.example/hash.html";
pub const HOST_ORIGIN: &str = "https://host.example";
pub const GUEST_ORIGIN: &str = "https://guest.example";

/// What one side observed through its handlers.
#[derive(Clone, Default)]
pub struct Observed {
    pub messages: Rc<RefCell<Vec<(String, String)>>>,
    pub ready: Rc<Cell<u32>>,
}

impl Observed {
    pub fn handlers(&self) -> TransportHandlers {
        let messages = Rc::clone(&self.messages);
        let ready = Rc::clone(&self.ready);
        TransportHandlers::new(move |message, origin| {
            messages
                .borrow_mut()
                .push((message.to_string(), origin.to_string()))
        })
        .on_ready(move || ready.set(ready.get() + 1))
    }

    pub fn texts(&self) -> Vec<String> {
        self.messages
            .borrow()
            .iter()
            .map(|(message, _)| message.clone())
            .collect()
    }
}

pub struct Options {
    pub host: HashTransportConfig,
    pub guest: HashTransportConfig,
    /// Serve the callback document with a relay attached.
    pub relay: bool,
    /// Serve the guest document.
    pub serve_guest: bool,
    /// Guest answers every message with `echo:<message>`.
    pub echo: bool,
}

impl Options {
    pub fn new(host: HashTransportConfig) -> Self {
        Self {
            host,
            guest: HashTransportConfig::default(),
            relay: true,
            serve_guest: true,
            echo: false,
        }
    }
}

pub fn host_config(local: LocalTarget) -> HashTransportConfig {
    HashTransportConfig::host("c1", GUEST_URL, local)
}

pub fn relay_config() -> HashTransportConfig {
    host_config(LocalTarget::Url(LOCAL_URL.to_string()))
}

pub struct Harness {
    pub browser: Rc<SimBrowser>,
    pub registry: Rc<ChannelRegistry>,
    pub host_doc: Rc<SimDocument>,
    pub host: HashTransport,
    pub host_seen: Observed,
    pub guest: Rc<RefCell<Option<HashTransport>>>,
    pub guest_doc: Rc<RefCell<Option<Rc<SimDocument>>>>,
    pub guest_seen: Observed,
    pub relays: Rc<RefCell<Vec<HashRelay>>>,
}

impl Harness {
    pub fn start(options: Options) -> Self {
        let browser = SimBrowser::new(SimConfig::default());
        let registry = Rc::new(ChannelRegistry::new());
        let relays = Rc::new(RefCell::new(Vec::new()));
        let guest = Rc::new(RefCell::new(None::<HashTransport>));
        let guest_doc = Rc::new(RefCell::new(None::<Rc<SimDocument>>));
        let guest_seen = Observed::default();

        if options.relay {
            let registry = Rc::clone(&registry);
            let relays = Rc::clone(&relays);
            browser.serve(
                LOCAL_URL,
                Rc::new(move |doc: Rc<SimDocument>| {
                    let relay = HashRelay::attach(doc, Rc::clone(&registry))
                        .expect("relay attaches");
                    relays.borrow_mut().push(relay);
                }),
            );
        }

        if options.serve_guest {
            let slot = Rc::clone(&guest);
            let doc_slot = Rc::clone(&guest_doc);
            let seen = guest_seen.clone();
            let config = options.guest.clone();
            let echo = options.echo;
            browser.serve(
                GUEST_URL,
                Rc::new(move |doc: Rc<SimDocument>| {
                    let mut handlers = seen.handlers();
                    if echo {
                        let messages = Rc::clone(&seen.messages);
                        let reply_slot = Rc::clone(&slot);
                        handlers = TransportHandlers::new(move |message, origin| {
                            messages
                                .borrow_mut()
                                .push((message.to_string(), origin.to_string()));
                            if let Some(guest) = reply_slot.borrow().as_ref() {
                                guest
                                    .post_message(&format!("echo:{message}"))
                                    .expect("guest alive");
                            }
                        })
                        .on_ready({
                            let ready = Rc::clone(&seen.ready);
                            move || ready.set(ready.get() + 1)
                        });
                    }
                    let env: Rc<dyn Environment> = doc.clone();
                    let transport = HashTransport::new(
                        env,
                        Rc::new(ChannelRegistry::new()),
                        config.clone(),
                        handlers,
                    )
                    .expect("guest transport");
                    *slot.borrow_mut() = Some(transport);
                    *doc_slot.borrow_mut() = Some(doc);
                }),
            );
        }

        let host_doc = browser.open(HOST_URL).expect("host document");
        let host_seen = Observed::default();
        let host = HashTransport::new(
            host_doc.clone(),
            Rc::clone(&registry),
            options.host,
            host_seen.handlers(),
        )
        .expect("host transport");

        Self {
            browser,
            registry,
            host_doc,
            host,
            host_seen,
            guest,
            guest_doc,
            guest_seen,
            relays,
        }
    }

    pub fn run(&self, millis: u64) {
        self.browser.advance(Duration::from_millis(millis));
    }

    pub fn with_guest<R>(&self, f: impl FnOnce(&HashTransport) -> R) -> R {
        let guest = self.guest.borrow();
        f(guest.as_ref().expect("guest loaded"))
    }

    pub fn both_ready(&self) -> bool {
        self.host_seen.ready.get() == 1 && self.guest_seen.ready.get() == 1
    }
}
