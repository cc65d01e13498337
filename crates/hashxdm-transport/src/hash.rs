use std::cell::{Cell, RefCell};
use std::ops::ControlFlow;
use std::rc::{Rc, Weak};
use std::time::Duration;

use hashxdm_codec::params::{local_frame_name, remote_frame_name};
use hashxdm_codec::{
    append_query_parameters, get_origin, resolve_role_from_location, resolve_to_absolute,
    ChannelRole, HASH_PROTOCOL_ID, PARAM_CHANNEL, PARAM_LOCAL_URL, PARAM_PROTOCOL,
    PARAM_USE_PARENT, PARAM_USE_POLLING,
};
use hashxdm_registry::ChannelRegistry;
use hashxdm_window::{
    repeat, Environment, FrameSpec, ListenerId, RepeatStart, WindowId,
};
use tokio_util::sync::CancellationToken;

use crate::behavior::{Chain, Effect, QueueBehavior, ReliableBehavior, VerifyBehavior, Wake};
use crate::config::{HashTransportConfig, LocalTarget};
use crate::delivery::{Caller, Delivery, DeliveryOptions};
use crate::error::{Result, TransportError};
use crate::handshake::{
    acquire_window, host_window_sources, HandshakeState, ReceiveMode, BODY_CHECK_INTERVAL,
};

/// Application callbacks of a transport.
pub struct TransportHandlers {
    on_message: Box<dyn Fn(&str, &str)>,
    on_ready: Option<Box<dyn FnOnce()>>,
}

impl TransportHandlers {
    /// `on_message` receives every message with the counterpart's origin.
    pub fn new(on_message: impl Fn(&str, &str) + 'static) -> Self {
        Self {
            on_message: Box::new(on_message),
            on_ready: None,
        }
    }

    /// Run `on_ready` once, when the channel becomes usable.
    pub fn on_ready(mut self, on_ready: impl FnOnce() + 'static) -> Self {
        self.on_ready = Some(Box::new(on_ready));
        self
    }
}

/// How this side talks, fixed at construction.
#[derive(Debug, Clone, Copy)]
struct Profile {
    is_host: bool,
    use_parent: bool,
    ready_after: Option<Duration>,
    poll_interval: Duration,
    mode: ReceiveMode,
}

struct Inner {
    env: Rc<dyn Environment>,
    registry: Rc<ChannelRegistry>,
    channel: String,
    profile: Profile,
    token: CancellationToken,
    registered: Cell<bool>,
    state: Cell<HandshakeState>,
    listener: Cell<Option<WindowId>>,
    resize_listener: Cell<Option<(WindowId, ListenerId)>>,
    delivery: RefCell<Delivery>,
    chain: RefCell<Chain>,
    failure: RefCell<Option<TransportError>>,
    on_message: Box<dyn Fn(&str, &str)>,
    on_ready: RefCell<Option<Box<dyn FnOnce()>>>,
}

/// One side of a fragment-based channel between two documents.
///
/// The role is read from the owning document's location: a document
/// loaded with the negotiation parameters is the guest, any other is the
/// host. Construction sets up the frames and readiness triggers; the
/// channel becomes usable asynchronously and reports it through the
/// `on_ready` handler. Messages posted earlier are held until then.
///
/// Dropping the transport without [`destroy`](Self::destroy) turns every
/// pending callback into a no-op but leaves frames in place.
pub struct HashTransport {
    inner: Rc<Inner>,
}

impl HashTransport {
    pub fn new(
        env: Rc<dyn Environment>,
        registry: Rc<ChannelRegistry>,
        config: HashTransportConfig,
        handlers: TransportHandlers,
    ) -> Result<Self> {
        config.validate()?;
        let location = env.location(env.current_window())?;
        let role = resolve_role_from_location(&location)?;

        let (channel, remote_url, profile, use_resize, use_polling) = match &role {
            ChannelRole::Host => {
                let local = config.validate_host()?;
                let use_parent = matches!(local, LocalTarget::CurrentWindow);
                let local_url = match local {
                    LocalTarget::CurrentWindow => strip_fragment(&location).to_string(),
                    LocalTarget::Url(url) => resolve_to_absolute(&location, url)?,
                };
                let remote = resolve_to_absolute(&location, &config.remote)?;

                let mut params = vec![
                    (PARAM_CHANNEL, config.channel.as_str()),
                    (PARAM_PROTOCOL, HASH_PROTOCOL_ID),
                    (PARAM_LOCAL_URL, local_url.as_str()),
                ];
                if use_parent {
                    params.push((PARAM_USE_PARENT, "1"));
                }
                if config.container.is_some() {
                    params.push((PARAM_USE_POLLING, "1"));
                }
                let remote_url = append_query_parameters(&remote, &params);

                let profile = Profile {
                    is_host: true,
                    use_parent,
                    ready_after: config.ready_after,
                    poll_interval: config.poll_interval,
                    mode: ReceiveMode::for_host(use_parent, config.ready_after.is_some()),
                };
                (
                    config.channel.clone(),
                    remote_url,
                    profile,
                    config.container.is_none(),
                    use_parent,
                )
            }
            ChannelRole::Guest(params) => {
                let profile = Profile {
                    is_host: false,
                    use_parent: params.use_parent,
                    ready_after: None,
                    poll_interval: config.poll_interval,
                    mode: ReceiveMode::for_guest(params.use_polling),
                };
                (
                    params.channel.clone(),
                    params.remote_url.clone(),
                    profile,
                    !params.use_parent,
                    params.use_polling,
                )
            }
        };

        let remote_origin = get_origin(&remote_url)?;
        let max_length = config
            .max_url_length
            .checked_sub(remote_url.len())
            .ok_or_else(|| {
                TransportError::InvalidConfig(format!(
                    "remote url is longer than max_url_length ({})",
                    config.max_url_length
                ))
            })?;
        let chain = Chain::compose(vec![
            Box::new(ReliableBehavior::new(
                ReliableBehavior::timeout_for(use_resize, use_polling, config.poll_interval),
                config.reliable_max_attempts,
            )),
            Box::new(QueueBehavior::new(max_length)?),
            Box::new(VerifyBehavior::new(profile.is_host)),
        ]);

        let delivery = Delivery::new(
            Rc::clone(&env),
            &channel,
            remote_url,
            remote_origin,
            DeliveryOptions {
                use_resize,
                resize_nudge: config.resize_nudge,
                poll_interval: config.poll_interval,
                send_pacing: config.send_pacing,
            },
        );

        tracing::debug!(
            channel = %channel,
            host = profile.is_host,
            mode = %profile.mode,
            use_parent = profile.use_parent,
            use_resize,
            use_polling,
            "creating hash transport"
        );

        let inner = Rc::new(Inner {
            env,
            registry,
            channel,
            profile,
            token: CancellationToken::new(),
            registered: Cell::new(false),
            state: Cell::new(HandshakeState::Initial),
            listener: Cell::new(None),
            resize_listener: Cell::new(None),
            delivery: RefCell::new(delivery),
            chain: RefCell::new(chain),
            failure: RefCell::new(None),
            on_message: handlers.on_message,
            on_ready: RefCell::new(handlers.on_ready),
        });

        let setup = if profile.is_host {
            Inner::start_host(&inner, config.container)
        } else {
            Inner::start_guest(&inner)
        };
        if let Err(err) = setup {
            inner.destroy();
            return Err(err);
        }

        Ok(Self { inner })
    }

    /// Send a message to the counterpart.
    ///
    /// Messages posted before the channel is ready are held.
    pub fn post_message(&self, message: &str) -> Result<()> {
        if self.inner.token.is_cancelled() {
            return Err(TransportError::Destroyed);
        }
        let effects = self.inner.chain.borrow_mut().outgoing(message.to_string());
        self.inner.apply(effects);
        Ok(())
    }

    /// Tear the channel down. No handler runs afterwards.
    pub fn destroy(&self) {
        self.inner.destroy();
    }

    pub fn state(&self) -> HandshakeState {
        self.inner.state.get()
    }

    /// Fatal error raised by a deferred readiness trigger.
    pub fn failure(&self) -> Option<TransportError> {
        self.inner.failure.borrow().clone()
    }

    /// Length of the URL every message is appended to.
    pub fn remote_url_len(&self) -> usize {
        self.inner.delivery.borrow().remote_url().len()
    }

    pub fn remote_url(&self) -> String {
        self.inner.delivery.borrow().remote_url().to_string()
    }

    pub fn remote_origin(&self) -> String {
        self.inner.delivery.borrow().remote_origin().to_string()
    }

    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    pub fn is_host(&self) -> bool {
        self.inner.profile.is_host
    }

    pub fn receive_mode(&self) -> ReceiveMode {
        self.inner.profile.mode
    }

    /// Sequence number the next fragment write will carry.
    pub fn sequence(&self) -> u64 {
        self.inner.delivery.borrow().sequence()
    }

    /// Window this side reads from, once known.
    pub fn listener_window(&self) -> Option<WindowId> {
        self.inner.listener.get()
    }
}

impl std::fmt::Debug for HashTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashTransport")
            .field("channel", &self.inner.channel)
            .field("host", &self.inner.profile.is_host)
            .field("mode", &self.inner.profile.mode)
            .field("state", &self.inner.state.get())
            .finish()
    }
}

impl Inner {
    fn start_host(this: &Rc<Self>, container: Option<String>) -> Result<()> {
        if this.profile.mode == ReceiveMode::Relay {
            let weak = Rc::downgrade(this);
            this.registry.register_relay(
                &this.channel,
                Rc::new(move |fragment: &str| {
                    if let Some(inner) = weak.upgrade() {
                        inner.receive(fragment);
                    }
                }),
            )?;
            this.registered.set(true);
        }

        let on_load = this
            .profile
            .use_parent
            .then(|| Box::new(begin_callback(this)) as Box<dyn FnOnce()>);
        let remote_url = this.delivery.borrow().remote_url().to_string();
        let frame = this.env.create_frame(
            FrameSpec {
                url: remote_url,
                container,
                name: local_frame_name(&this.channel),
            },
            on_load,
        )?;
        this.delivery.borrow_mut().set_caller(Caller::Frame(frame));

        match this.profile.ready_after {
            Some(delay) => {
                let token = this.token.clone();
                let begin = begin_callback(this);
                this.env.scheduler().set_timeout(
                    delay,
                    Box::new(move || {
                        if !token.is_cancelled() {
                            begin();
                        }
                    }),
                );
            }
            None => {
                this.registered.set(true);
                if let Err(err) = this
                    .registry
                    .register_ready(&this.channel, Box::new(begin_callback(this)))
                {
                    this.registered.set(this.profile.mode == ReceiveMode::Relay);
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }

    fn start_guest(this: &Rc<Self>) -> Result<()> {
        let own = this.env.current_window();
        this.listener.set(Some(own));

        if this.profile.use_parent {
            let parent = this.env.parent_window().ok_or(TransportError::NoParentWindow)?;
            this.delivery.borrow_mut().set_caller(Caller::Parent(parent));
            this.registry.announce(&this.channel, own)?;
            this.registered.set(true);
            Inner::begin(this);
            return Ok(());
        }

        let url = format!("{}#{}", this.delivery.borrow().remote_url(), this.channel);
        let frame = this.env.create_frame(
            FrameSpec {
                url,
                container: None,
                name: remote_frame_name(&this.channel),
            },
            Some(Box::new(begin_callback(this))),
        )?;
        this.delivery.borrow_mut().set_caller(Caller::Frame(frame));
        Ok(())
    }

    fn begin(this: &Rc<Self>) {
        if this.token.is_cancelled() || this.state.get() != HandshakeState::Initial {
            tracing::trace!(channel = %this.channel, state = %this.state.get(), "ignoring readiness trigger");
            return;
        }

        if this.profile.is_host {
            this.set_state(HandshakeState::AwaitingCounterpartWindow);
            let caller_frame = match this.delivery.borrow().caller() {
                Some(Caller::Frame(frame)) => Some(frame),
                _ => None,
            };
            let sources = host_window_sources(
                &this.channel,
                this.profile.use_parent,
                this.profile.ready_after.is_some(),
                caller_frame,
            );
            match acquire_window(this.env.as_ref(), &this.registry, &this.channel, &sources) {
                Ok(window) => this.listener.set(Some(window)),
                Err(err) => {
                    this.fail(err);
                    return;
                }
            }
        }

        this.set_state(HandshakeState::AwaitingDocumentBody);
        let weak = Rc::downgrade(this);
        repeat(
            &this.env.scheduler(),
            BODY_CHECK_INTERVAL,
            RepeatStart::Now,
            this.token.clone(),
            move || {
                let Some(inner) = weak.upgrade() else {
                    return ControlFlow::Break(());
                };
                let has_body = inner
                    .listener
                    .get()
                    .is_some_and(|window| inner.env.has_body(window));
                if has_body {
                    Inner::activate(&inner);
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            },
        );
    }

    fn activate(this: &Rc<Self>) {
        this.set_state(HandshakeState::Active);

        match this.profile.mode {
            ReceiveMode::Poll => {
                let weak = Rc::downgrade(this);
                let interval = this.profile.poll_interval;
                repeat(
                    &this.env.scheduler(),
                    interval,
                    RepeatStart::After(interval),
                    this.token.clone(),
                    move || match weak.upgrade() {
                        Some(inner) => {
                            inner.check_listener();
                            ControlFlow::Continue(())
                        }
                        None => ControlFlow::Break(()),
                    },
                );
            }
            ReceiveMode::Resize => {
                let Some(window) = this.listener.get() else {
                    return;
                };
                let weak = Rc::downgrade(this);
                let added = this.env.add_resize_listener(
                    window,
                    Rc::new(move || {
                        if let Some(inner) = weak.upgrade() {
                            inner.check_listener();
                        }
                    }),
                );
                match added {
                    Ok(listener) => this.resize_listener.set(Some((window, listener))),
                    Err(err) => {
                        this.fail(err.into());
                        return;
                    }
                }
            }
            ReceiveMode::Relay => {}
        }

        this.check_listener();
        let effects = this.chain.borrow_mut().ready();
        this.apply(effects);
    }

    fn check_listener(self: &Rc<Self>) {
        let Some(window) = self.listener.get() else {
            return;
        };
        match self.env.fragment(window) {
            Ok(fragment) => self.receive(&fragment),
            Err(err) => tracing::trace!(channel = %self.channel, error = %err, "listener unreadable"),
        }
    }

    fn receive(self: &Rc<Self>, fragment: &str) {
        if self.token.is_cancelled() || self.state.get() != HandshakeState::Active {
            return;
        }
        let accepted = self.delivery.borrow_mut().accept(fragment);
        let Some(message) = accepted else {
            return;
        };
        tracing::trace!(channel = %self.channel, "received fragment");
        let origin = self.delivery.borrow().remote_origin().to_string();
        let effects = self.chain.borrow_mut().incoming(message, origin);
        self.apply(effects);
    }

    fn apply(self: &Rc<Self>, effects: Vec<Effect>) {
        for effect in effects {
            if self.token.is_cancelled() {
                return;
            }
            match effect {
                Effect::Transmit { message, wake } => {
                    // A failed write still releases the chunk; the reliable
                    // stage retransmits it.
                    if !self.delivery.borrow_mut().send(&message) {
                        tracing::debug!(channel = %self.channel, "fragment write failed");
                    }
                    if let Some(wake) = wake {
                        let pacing = self.delivery.borrow().pacing();
                        self.schedule_wake(pacing, wake);
                    }
                }
                Effect::Deliver { message, origin } => (self.on_message)(&message, &origin),
                Effect::Ready => {
                    let on_ready = self.on_ready.borrow_mut().take();
                    if let Some(on_ready) = on_ready {
                        tracing::debug!(channel = %self.channel, "channel ready");
                        on_ready();
                    }
                }
                Effect::Schedule { delay, wake } => self.schedule_wake(delay, wake),
            }
        }
    }

    fn schedule_wake(self: &Rc<Self>, delay: Duration, wake: Wake) {
        let weak = Rc::downgrade(self);
        self.env.scheduler().set_timeout(
            delay,
            Box::new(move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if inner.token.is_cancelled() {
                    return;
                }
                let effects = inner.chain.borrow_mut().wake(wake);
                inner.apply(effects);
            }),
        );
    }

    fn set_state(&self, state: HandshakeState) {
        tracing::debug!(channel = %self.channel, from = %self.state.get(), to = %state, "handshake state");
        self.state.set(state);
    }

    fn fail(&self, err: TransportError) {
        tracing::error!(channel = %self.channel, error = %err, "hash transport failed");
        self.failure.replace(Some(err));
        self.destroy();
    }

    fn destroy(&self) {
        if self.state.get() == HandshakeState::Destroyed {
            return;
        }
        self.token.cancel();
        self.chain.borrow_mut().destroy();

        if let Some((window, listener)) = self.resize_listener.take() {
            if let Err(err) = self.env.remove_resize_listener(window, listener) {
                tracing::trace!(error = %err, "resize listener already gone");
            }
        }
        if self.registered.get() {
            self.registry.clear(&self.channel);
        }
        let caller = self.delivery.borrow_mut().take_caller();
        if let Some(Caller::Frame(frame)) = caller {
            if let Err(err) = self.env.remove_frame(frame) {
                tracing::trace!(%frame, error = %err, "caller frame already gone");
            }
        }
        self.set_state(HandshakeState::Destroyed);
    }
}

/// Readiness trigger holding only a weak reference to the transport.
fn begin_callback(this: &Rc<Inner>) -> impl FnOnce() + 'static {
    let weak: Weak<Inner> = Rc::downgrade(this);
    move || {
        if let Some(inner) = weak.upgrade() {
            Inner::begin(&inner);
        }
    }
}

fn strip_fragment(location: &str) -> &str {
    location.split_once('#').map_or(location, |(base, _)| base)
}
