//! Fragment writes toward the counterpart and dedup of fragment reads.

use std::rc::Rc;
use std::time::Duration;

use hashxdm_codec::{decode_fragment, encode_message, percent_decode};
use hashxdm_window::{Environment, FrameId, WindowId};

/// Window this side writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    /// A frame created by this side.
    Frame(FrameId),
    /// The parent window of a guest.
    Parent(WindowId),
}

/// How writes are signalled and paced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOptions {
    /// The counterpart is told about writes through resize notifications.
    pub use_resize: bool,
    /// Toggle the caller frame's width after each write.
    pub resize_nudge: bool,
    pub poll_interval: Duration,
    /// Explicit delay before a chunk continuation runs.
    pub send_pacing: Option<Duration>,
}

impl DeliveryOptions {
    fn nudges(&self) -> bool {
        self.use_resize && self.resize_nudge
    }

    /// Delay between handing a chunk to the wire and its continuation.
    ///
    /// A polling counterpart only sees the fragment as it stands at each
    /// poll, so consecutive writes must be more than one poll interval
    /// apart.
    pub fn pacing(&self) -> Duration {
        match self.send_pacing {
            Some(pacing) => pacing,
            None if self.nudges() => Duration::ZERO,
            None => self.poll_interval + self.poll_interval / 10,
        }
    }
}

/// Writes messages into the counterpart's fragment and filters reads of
/// this side's listener fragment.
pub struct Delivery {
    env: Rc<dyn Environment>,
    remote_url: String,
    remote_origin: String,
    options: DeliveryOptions,
    caller: Option<Caller>,
    sequence: u64,
    last_seen: String,
}

impl Delivery {
    pub fn new(
        env: Rc<dyn Environment>,
        channel: &str,
        remote_url: String,
        remote_origin: String,
        options: DeliveryOptions,
    ) -> Self {
        Self {
            env,
            remote_url,
            remote_origin,
            options,
            caller: None,
            sequence: 0,
            last_seen: format!("#{channel}"),
        }
    }

    pub fn set_caller(&mut self, caller: Caller) {
        self.caller = Some(caller);
    }

    pub fn caller(&self) -> Option<Caller> {
        self.caller
    }

    /// Detach the caller; later sends are dropped.
    pub fn take_caller(&mut self) -> Option<Caller> {
        self.caller.take()
    }

    pub fn remote_url(&self) -> &str {
        &self.remote_url
    }

    pub fn remote_origin(&self) -> &str {
        &self.remote_origin
    }

    /// Sequence number the next write will carry.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn pacing(&self) -> Duration {
        self.options.pacing()
    }

    /// Write `message` into the caller's fragment.
    ///
    /// Returns `false` when there is no caller or the write failed.
    pub fn send(&mut self, message: &str) -> bool {
        let Some(caller) = self.caller else {
            tracing::trace!("no caller window, message dropped");
            return false;
        };

        let sequence = self.sequence;
        self.sequence += 1;
        let url = encode_message(&self.remote_url, sequence, message);
        tracing::trace!(sequence, origin = %self.remote_origin, "sending fragment");

        match caller {
            Caller::Frame(frame) => {
                let written = self
                    .env
                    .frame_window(frame)
                    .and_then(|window| self.env.navigate(window, &url));
                if let Err(err) = written {
                    tracing::warn!(%frame, error = %err, "fragment write failed");
                    return false;
                }
                if self.options.nudges() {
                    self.nudge(frame);
                }
            }
            Caller::Parent(window) => {
                if let Err(err) = self.env.navigate(window, &url) {
                    tracing::warn!(%window, error = %err, "fragment write failed");
                    return false;
                }
            }
        }
        true
    }

    fn nudge(&self, frame: FrameId) {
        let resized = self
            .env
            .frame_width(frame)
            .and_then(|width| {
                let width = if width > 75 { 50 } else { 100 };
                self.env.set_frame_width(frame, width)
            });
        if let Err(err) = resized {
            tracing::trace!(%frame, error = %err, "resize nudge failed");
        }
    }

    /// Accept a fragment read from the listener window.
    ///
    /// Returns the decoded message when the fragment is non-empty and
    /// differs from the last one accepted.
    pub fn accept(&mut self, fragment: &str) -> Option<String> {
        if fragment.is_empty() || fragment == self.last_seen {
            return None;
        }
        self.last_seen = fragment.to_string();
        let raw = fragment.strip_prefix('#').unwrap_or(fragment);
        Some(percent_decode(decode_fragment(raw)))
    }
}

#[cfg(test)]
mod tests {
    use hashxdm_window::{FrameSpec, SimBrowser, SimConfig};

    use super::*;

    const REMOTE: &str = "https://guest.example/cb.html?xdm_c=c1&xdm_p=0";

    fn options() -> DeliveryOptions {
        DeliveryOptions {
            use_resize: true,
            resize_nudge: true,
            poll_interval: Duration::from_millis(300),
            send_pacing: None,
        }
    }

    fn host_with_frame() -> (Rc<SimBrowser>, Rc<dyn Environment>, FrameId) {
        let browser = SimBrowser::new(SimConfig::default());
        let env: Rc<dyn Environment> = browser.open("https://host.example/app.html").unwrap();
        let frame = env
            .create_frame(
                FrameSpec {
                    url: REMOTE.to_string(),
                    container: None,
                    name: "local_c1".to_string(),
                },
                None,
            )
            .unwrap();
        (browser, env, frame)
    }

    fn delivery(env: &Rc<dyn Environment>, options: DeliveryOptions) -> Delivery {
        Delivery::new(
            Rc::clone(env),
            "c1",
            REMOTE.to_string(),
            "https://guest.example".to_string(),
            options,
        )
    }

    #[test]
    fn send_without_caller_is_dropped() {
        let (_, env, _) = host_with_frame();
        let mut delivery = delivery(&env, options());
        assert!(!delivery.send("hello"));
        assert_eq!(delivery.sequence(), 0);
    }

    #[test]
    fn sequence_numbers_make_repeats_distinct() {
        let (browser, env, frame) = host_with_frame();
        let window = env.frame_window(frame).unwrap();
        let mut delivery = delivery(&env, options());
        delivery.set_caller(Caller::Frame(frame));

        assert!(delivery.send("same"));
        let first = browser.href(window).unwrap();
        assert!(delivery.send("same"));
        let second = browser.href(window).unwrap();

        assert_eq!(first, format!("{REMOTE}#0_same"));
        assert_eq!(second, format!("{REMOTE}#1_same"));
        assert_ne!(first, second);
        assert_eq!(delivery.sequence(), 2);
    }

    #[test]
    fn nudge_toggles_frame_width() {
        let (_, env, frame) = host_with_frame();
        let mut delivery = delivery(&env, options());
        delivery.set_caller(Caller::Frame(frame));

        delivery.send("a");
        assert_eq!(env.frame_width(frame).unwrap(), 100);
        delivery.send("b");
        assert_eq!(env.frame_width(frame).unwrap(), 50);
        delivery.send("c");
        assert_eq!(env.frame_width(frame).unwrap(), 100);
    }

    #[test]
    fn nudge_can_be_disabled() {
        let (_, env, frame) = host_with_frame();
        let mut delivery = delivery(
            &env,
            DeliveryOptions {
                resize_nudge: false,
                ..options()
            },
        );
        delivery.set_caller(Caller::Frame(frame));
        delivery.send("a");
        assert_eq!(env.frame_width(frame).unwrap(), 0);
        assert_eq!(delivery.pacing(), Duration::from_millis(330));
    }

    #[test]
    fn pacing_follows_signalling() {
        assert_eq!(options().pacing(), Duration::ZERO);
        let polling = DeliveryOptions {
            use_resize: false,
            ..options()
        };
        assert_eq!(polling.pacing(), Duration::from_millis(330));
        assert!(polling.pacing() > polling.poll_interval);
        let explicit = DeliveryOptions {
            send_pacing: Some(Duration::from_millis(400)),
            ..polling
        };
        assert_eq!(explicit.pacing(), Duration::from_millis(400));
    }

    #[test]
    fn accept_filters_sentinel_repeats_and_empty() {
        let (_, env, _) = host_with_frame();
        let mut delivery = delivery(&env, options());

        assert_eq!(delivery.accept(""), None);
        assert_eq!(delivery.accept("#c1"), None);
        assert_eq!(
            delivery.accept("#0_a%20b%26c%23d").as_deref(),
            Some("a b&c#d")
        );
        assert_eq!(delivery.accept("#0_a%20b%26c%23d"), None);
        assert_eq!(delivery.accept("#1_a%20b%26c%23d").as_deref(), Some("a b&c#d"));
    }

    #[test]
    fn parent_caller_is_written_without_nudge() {
        let browser = SimBrowser::new(SimConfig::default());
        let host = browser.open("https://host.example/app.html").unwrap();
        let parent = host.window();
        let env: Rc<dyn Environment> = host;
        let mut delivery = Delivery::new(
            Rc::clone(&env),
            "c1",
            "https://host.example/app.html".to_string(),
            "https://host.example".to_string(),
            options(),
        );
        delivery.set_caller(Caller::Parent(parent));
        assert!(delivery.send("hi"));
        assert_eq!(
            browser.href(parent).as_deref(),
            Some("https://host.example/app.html#0_hi")
        );
        assert_eq!(delivery.take_caller(), Some(Caller::Parent(parent)));
        assert!(!delivery.send("again"));
    }
}
