//! Callback document of a host.
//!
//! The guest writes to a frame loaded from the host's origin at
//! `<local url>#<channel>`. That document cannot be read by the guest, but
//! the host can reach it through the shared [`ChannelRegistry`]: on load
//! it announces its window for the channel, and on every resize it pushes
//! its current fragment to the channel's relay handler.

use std::rc::Rc;

use hashxdm_registry::ChannelRegistry;
use hashxdm_window::{Environment, ListenerId, WindowId};

use crate::error::{Result, TransportError};

/// A relay attached to the document it runs in.
///
/// The resize listener stays registered until [`detach`](Self::detach) or
/// until the document unloads.
pub struct HashRelay {
    env: Rc<dyn Environment>,
    channel: String,
    window: WindowId,
    listener: ListenerId,
}

impl HashRelay {
    /// Attach to the owning document of `env`, reading the channel from
    /// its fragment.
    pub fn attach(env: Rc<dyn Environment>, registry: Rc<ChannelRegistry>) -> Result<Self> {
        let window = env.current_window();
        let fragment = env.fragment(window)?;
        let channel = fragment.trim_start_matches('#').to_string();
        if channel.is_empty() {
            return Err(TransportError::InvalidConfig(
                "relay document loaded without a channel fragment".to_string(),
            ));
        }

        let listener = {
            let env_ref = Rc::clone(&env);
            let registry = Rc::clone(&registry);
            let channel = channel.clone();
            env.add_resize_listener(
                window,
                Rc::new(move || match env_ref.fragment(window) {
                    Ok(fragment) => {
                        registry.relay(&channel, &fragment);
                    }
                    Err(err) => tracing::trace!(error = %err, "relay fragment unreadable"),
                }),
            )?
        };

        tracing::debug!(channel = %channel, %window, "relay attached");
        registry.announce(&channel, window)?;

        Ok(Self {
            env,
            channel,
            window,
            listener,
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    /// Stop relaying resize notifications.
    pub fn detach(self) -> Result<()> {
        self.env
            .remove_resize_listener(self.window, self.listener)
            .map_err(TransportError::from)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::time::Duration;

    use hashxdm_window::{FrameSpec, SimBrowser, SimConfig};

    use super::*;

    #[test]
    fn announces_and_relays_fragments() {
        let browser = SimBrowser::new(SimConfig::default());
        let host = browser.open("https://host.example/app.html").unwrap();
        let registry = Rc::new(ChannelRegistry::new());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        registry
            .register_relay(
                "c1",
                Rc::new(move |fragment: &str| sink.borrow_mut().push(fragment.to_string())),
            )
            .unwrap();

        let frame = host
            .create_frame(
                FrameSpec {
                    url: "https://host.example/hash.html#c1".to_string(),
                    container: None,
                    name: "remote_c1".to_string(),
                },
                None,
            )
            .unwrap();
        let window = host.frame_window(frame).unwrap();
        let env: Rc<dyn Environment> = browser.document(window);
        let relay = HashRelay::attach(env, Rc::clone(&registry)).unwrap();
        assert_eq!(relay.channel(), "c1");
        assert_eq!(registry.lookup_window("c1"), Some(window));

        host.navigate(window, "https://host.example/hash.html#0_hi")
            .unwrap();
        host.set_frame_width(frame, 100).unwrap();
        browser.advance(Duration::ZERO);
        assert_eq!(*seen.borrow(), vec!["#0_hi".to_string()]);

        relay.detach().unwrap();
        host.set_frame_width(frame, 50).unwrap();
        browser.advance(Duration::ZERO);
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn missing_channel_fragment_is_rejected() {
        let browser = SimBrowser::new(SimConfig::default());
        let doc = browser.open("https://host.example/hash.html").unwrap();
        let result = HashRelay::attach(doc, Rc::new(ChannelRegistry::new()));
        assert!(matches!(result, Err(TransportError::InvalidConfig(_))));
    }
}
