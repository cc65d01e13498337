use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use hashxdm_window::WindowId;

use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};

/// Called once when the counterpart window of a channel is announced.
pub type ReadyCallback = Box<dyn FnOnce()>;

/// Receives fragments pushed by a relay document.
pub type RelayHandler = Rc<dyn Fn(&str)>;

#[derive(Default)]
struct Entry {
    ready: Option<ReadyCallback>,
    window: Option<WindowId>,
    relay: Option<RelayHandler>,
}

/// Channel-keyed registry of readiness callbacks, windows and relay handlers.
///
/// Callbacks and handlers are always invoked after the internal borrow is
/// released, so they may call back into the registry.
pub struct ChannelRegistry {
    entries: RefCell<HashMap<String, Entry>>,
    config: RegistryConfig,
}

impl ChannelRegistry {
    /// Create an empty registry with default config.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with explicit config.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            entries: RefCell::new(HashMap::new()),
            config,
        }
    }

    /// Register the readiness callback of a channel.
    ///
    /// If the counterpart window was already announced the callback runs
    /// immediately.
    pub fn register_ready(&self, channel: &str, callback: ReadyCallback) -> Result<()> {
        {
            let mut entries = self.entries.borrow_mut();
            let entry = self.entry_mut(&mut entries, channel)?;
            if entry.ready.is_some() {
                return Err(RegistryError::ChannelInUse(channel.to_string()));
            }
            if entry.window.is_none() {
                entry.ready = Some(callback);
                return Ok(());
            }
        }

        tracing::debug!(channel, "window already announced, running readiness callback");
        callback();
        Ok(())
    }

    /// Record the counterpart window of a channel and consume its pending
    /// readiness callback, if any.
    ///
    /// Returns whether a callback ran.
    pub fn announce(&self, channel: &str, window: WindowId) -> Result<bool> {
        let pending = {
            let mut entries = self.entries.borrow_mut();
            let entry = self.entry_mut(&mut entries, channel)?;
            entry.window = Some(window);
            entry.ready.take()
        };

        tracing::debug!(channel, %window, "counterpart window announced");
        match pending {
            Some(callback) => {
                callback();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Window announced for a channel.
    pub fn lookup_window(&self, channel: &str) -> Option<WindowId> {
        self.entries
            .borrow()
            .get(channel)
            .and_then(|entry| entry.window)
    }

    /// Register the handler receiving relayed fragments of a channel.
    pub fn register_relay(&self, channel: &str, handler: RelayHandler) -> Result<()> {
        let mut entries = self.entries.borrow_mut();
        let entry = self.entry_mut(&mut entries, channel)?;
        if entry.relay.is_some() {
            return Err(RegistryError::ChannelInUse(channel.to_string()));
        }
        entry.relay = Some(handler);
        Ok(())
    }

    /// Push a fragment to the relay handler of a channel.
    ///
    /// Returns `false` when no handler is registered.
    pub fn relay(&self, channel: &str, fragment: &str) -> bool {
        let handler = self
            .entries
            .borrow()
            .get(channel)
            .and_then(|entry| entry.relay.clone());

        match handler {
            Some(handler) => {
                handler(fragment);
                true
            }
            None => {
                tracing::trace!(channel, "no relay handler registered, fragment dropped");
                false
            }
        }
    }

    /// Drop every entry of a channel. Pending callbacks are discarded.
    pub fn clear(&self, channel: &str) {
        let removed = self.entries.borrow_mut().remove(channel);
        if removed.is_some() {
            tracing::debug!(channel, "registry entry cleared");
        }
    }

    /// Whether a readiness callback is pending for a channel.
    pub fn is_pending(&self, channel: &str) -> bool {
        self.entries
            .borrow()
            .get(channel)
            .is_some_and(|entry| entry.ready.is_some())
    }

    /// Channels with a live entry, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.entries.borrow().keys().cloned().collect();
        channels.sort_unstable();
        channels
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Get registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn entry_mut<'a>(
        &self,
        entries: &'a mut HashMap<String, Entry>,
        channel: &str,
    ) -> Result<&'a mut Entry> {
        if !entries.contains_key(channel) && entries.len() >= self.config.max_channels {
            return Err(RegistryError::RegistryFull {
                max: self.config.max_channels,
            });
        }
        Ok(entries.entry(channel.to_string()).or_default())
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.channels())
            .field("config", &self.config)
            .finish()
    }
}
