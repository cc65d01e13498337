//! Deterministic in-memory browser.
//!
//! `SimBrowser` models just enough of a browser for the hash transport:
//! windows with locations, frames that load documents after a delay,
//! same-origin checks, resize notifications and a virtual clock. Nothing
//! happens until [`SimBrowser::advance`] moves the clock, which makes every
//! interleaving reproducible.
//!
//! Documents are served by registering a [`PageHandler`] for a URL prefix.
//! When a frame loads a matching URL the handler runs with the new
//! document's [`SimDocument`], the way a page script would.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::time::Duration;

use url::Url;

use crate::env::{Environment, FrameSpec, LoadCallback, ResizeCallback};
use crate::error::{Result, WindowError};
use crate::handle::{FrameId, ListenerId, TimerId, WindowId};
use crate::schedule::{Scheduler, Task};

/// Script run when a document matching a served prefix loads.
pub type PageHandler = Rc<dyn Fn(Rc<SimDocument>)>;

/// Timing of simulated document loads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    /// Delay between creating or reloading a frame and its load event.
    pub load_delay: Duration,
    /// Delay between creating or reloading a frame and its body existing.
    ///
    /// A value larger than `load_delay` models scripts that run before the
    /// body has been parsed.
    pub body_delay: Duration,
    /// Width of a freshly created frame.
    pub initial_frame_width: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            load_delay: Duration::from_millis(5),
            body_delay: Duration::from_millis(20),
            initial_frame_width: 0,
        }
    }
}

struct WindowState {
    href: String,
    parent: Option<WindowId>,
    name: Option<String>,
    body_at: Option<Duration>,
    listeners: Vec<(ListenerId, ResizeCallback)>,
}

struct FrameState {
    window: WindowId,
    host: WindowId,
    width: u32,
}

struct PendingTimer {
    id: TimerId,
    task: Task,
}

#[derive(Default)]
struct SimState {
    now: Duration,
    next_id: u64,
    next_seq: u64,
    windows: HashMap<WindowId, WindowState>,
    frames: HashMap<FrameId, FrameState>,
    timers: BTreeMap<(Duration, u64), PendingTimer>,
    timer_keys: HashMap<TimerId, (Duration, u64)>,
}

impl SimState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn window(&self, window: WindowId) -> Result<&WindowState> {
        self.windows
            .get(&window)
            .ok_or(WindowError::NoSuchWindow(window))
    }

    fn window_mut(&mut self, window: WindowId) -> Result<&mut WindowState> {
        self.windows
            .get_mut(&window)
            .ok_or(WindowError::NoSuchWindow(window))
    }

    fn same_origin(&self, from: WindowId, target: WindowId, operation: &'static str) -> Result<()> {
        if from == target {
            return Ok(());
        }
        let here = origin_of(&self.window(from)?.href);
        let there = origin_of(&self.window(target)?.href);
        if here == there {
            Ok(())
        } else {
            Err(WindowError::AccessDenied {
                window: target,
                operation,
            })
        }
    }

    fn owned_frame(&self, from: WindowId, frame: FrameId) -> Result<&FrameState> {
        let state = self
            .frames
            .get(&frame)
            .ok_or(WindowError::NoSuchFrame(frame))?;
        if state.host != from {
            return Err(WindowError::AccessDenied {
                window: state.host,
                operation: "frame element",
            });
        }
        Ok(state)
    }

    fn remove_window_tree(&mut self, root: WindowId) {
        let mut doomed = vec![root];
        while let Some(window) = doomed.pop() {
            self.windows.remove(&window);
            doomed.extend(
                self.windows
                    .iter()
                    .filter(|(_, state)| state.parent == Some(window))
                    .map(|(id, _)| *id),
            );
            self.frames.retain(|_, frame| frame.host != window);
        }
    }
}

/// A simulated browser shared by every document it hosts.
pub struct SimBrowser {
    config: SimConfig,
    state: RefCell<SimState>,
    pages: RefCell<Vec<(String, PageHandler)>>,
}

impl SimBrowser {
    /// Create an empty browser at virtual time zero.
    pub fn new(config: SimConfig) -> Rc<Self> {
        Rc::new(Self {
            config,
            state: RefCell::new(SimState::default()),
            pages: RefCell::new(Vec::new()),
        })
    }

    /// Browser timing configuration.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Serve documents whose URL starts with `prefix` with `handler`.
    ///
    /// The first registered matching prefix wins.
    pub fn serve(&self, prefix: impl Into<String>, handler: PageHandler) {
        self.pages.borrow_mut().push((prefix.into(), handler));
    }

    /// Open a top-level window whose document is already loaded.
    pub fn open(self: &Rc<Self>, url: &str) -> Result<Rc<SimDocument>> {
        parse_absolute(url)?;
        let window = {
            let mut state = self.state.borrow_mut();
            let window = WindowId::from_raw(state.next_id());
            let now = state.now;
            state.windows.insert(
                window,
                WindowState {
                    href: url.to_string(),
                    parent: None,
                    name: None,
                    body_at: Some(now),
                    listeners: Vec::new(),
                },
            );
            window
        };
        tracing::trace!(%window, url, "opened top-level window");
        Ok(self.document(window))
    }

    /// Document view of an existing window.
    pub fn document(self: &Rc<Self>, window: WindowId) -> Rc<SimDocument> {
        Rc::new(SimDocument {
            browser: Rc::clone(self),
            window,
        })
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Move the clock forward, running every timer that falls due.
    ///
    /// Timers due at the same instant run in scheduling order; a timer
    /// scheduled while advancing runs in the same call if it falls due.
    pub fn advance(&self, by: Duration) {
        let target = self.now() + by;
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                let due = state.timers.first_key_value().map(|(&(due, _), _)| due);
                match due {
                    Some(due) if due <= target => {
                        state.now = due;
                        match state.timers.pop_first() {
                            Some((_, timer)) => {
                                state.timer_keys.remove(&timer.id);
                                Some(timer.task)
                            }
                            None => None,
                        }
                    }
                    _ => None,
                }
            };
            match next {
                Some(task) => task(),
                None => break,
            }
        }
        self.state.borrow_mut().now = target;
    }

    /// Number of timers that have not fired yet.
    pub fn pending_timers(&self) -> usize {
        self.state.borrow().timers.len()
    }

    /// Location of any window, bypassing origin checks.
    pub fn href(&self, window: WindowId) -> Option<String> {
        self.state
            .borrow()
            .windows
            .get(&window)
            .map(|state| state.href.clone())
    }

    /// Whether a window still exists.
    pub fn contains(&self, window: WindowId) -> bool {
        self.state.borrow().windows.contains_key(&window)
    }

    /// Most recently created window with the given name.
    pub fn find_named(&self, name: &str) -> Option<WindowId> {
        self.state
            .borrow()
            .windows
            .iter()
            .filter(|(_, state)| state.name.as_deref() == Some(name))
            .map(|(id, _)| *id)
            .max()
    }

    fn schedule_load(self: &Rc<Self>, window: WindowId, on_load: Option<LoadCallback>) {
        {
            let mut state = self.state.borrow_mut();
            let body_at = state.now + self.config.body_delay;
            if let Some(target) = state.windows.get_mut(&window) {
                target.body_at = Some(body_at);
            }
        }
        let browser = Rc::clone(self);
        self.set_timeout(
            self.config.load_delay,
            Box::new(move || browser.finish_load(window, on_load)),
        );
    }

    fn finish_load(self: &Rc<Self>, window: WindowId, on_load: Option<LoadCallback>) {
        let Some(href) = self.href(window) else {
            tracing::trace!(%window, "window removed before load");
            return;
        };
        let handler = self
            .pages
            .borrow()
            .iter()
            .find(|(prefix, _)| href.starts_with(prefix.as_str()))
            .map(|(_, handler)| Rc::clone(handler));
        tracing::trace!(%window, href, served = handler.is_some(), "document loaded");
        if let Some(handler) = handler {
            handler(self.document(window));
        }
        if let Some(on_load) = on_load {
            on_load();
        }
    }

    fn fire_resize(&self, window: WindowId) {
        let callbacks: Vec<ResizeCallback> = match self.state.borrow().windows.get(&window) {
            Some(state) => state
                .listeners
                .iter()
                .map(|(_, callback)| Rc::clone(callback))
                .collect(),
            None => return,
        };
        for callback in callbacks {
            callback();
        }
    }
}

impl Scheduler for SimBrowser {
    fn set_timeout(&self, delay: Duration, task: Task) -> TimerId {
        let mut state = self.state.borrow_mut();
        let id = TimerId::from_raw(state.next_id());
        state.next_seq += 1;
        let key = (state.now + delay, state.next_seq);
        state.timers.insert(key, PendingTimer { id, task });
        state.timer_keys.insert(id, key);
        id
    }

    fn clear_timeout(&self, timer: TimerId) {
        let mut state = self.state.borrow_mut();
        if let Some(key) = state.timer_keys.remove(&timer) {
            state.timers.remove(&key);
        }
    }
}

/// One document hosted by a [`SimBrowser`].
pub struct SimDocument {
    browser: Rc<SimBrowser>,
    window: WindowId,
}

impl SimDocument {
    /// The browser hosting this document.
    pub fn browser(&self) -> &Rc<SimBrowser> {
        &self.browser
    }

    /// Window of this document.
    pub fn window(&self) -> WindowId {
        self.window
    }

    /// Location of this document.
    pub fn href(&self) -> String {
        self.browser.href(self.window).unwrap_or_default()
    }
}

impl Environment for SimDocument {
    fn current_window(&self) -> WindowId {
        self.window
    }

    fn parent_window(&self) -> Option<WindowId> {
        self.browser
            .state
            .borrow()
            .windows
            .get(&self.window)
            .and_then(|state| state.parent)
    }

    fn location(&self, window: WindowId) -> Result<String> {
        let state = self.browser.state.borrow();
        state.same_origin(self.window, window, "location")?;
        Ok(state.window(window)?.href.clone())
    }

    fn fragment(&self, window: WindowId) -> Result<String> {
        let state = self.browser.state.borrow();
        state.same_origin(self.window, window, "location.hash")?;
        Ok(fragment_of(&state.window(window)?.href).to_string())
    }

    fn navigate(&self, window: WindowId, url: &str) -> Result<()> {
        parse_absolute(url)?;
        let reload = {
            let mut state = self.browser.state.borrow_mut();
            let target = state.window_mut(window)?;
            let same_document = strip_fragment(&target.href) == strip_fragment(url);
            target.href = url.to_string();
            if !same_document {
                target.body_at = None;
                target.listeners.clear();
            }
            !same_document
        };
        tracing::trace!(%window, url, reload, "navigate");
        if reload {
            self.browser.schedule_load(window, None);
        }
        Ok(())
    }

    fn create_frame(&self, spec: FrameSpec, on_load: Option<LoadCallback>) -> Result<FrameId> {
        parse_absolute(&spec.url)?;
        let (frame, window) = {
            let mut state = self.browser.state.borrow_mut();
            state.window(self.window)?;
            let window = WindowId::from_raw(state.next_id());
            let frame = FrameId::from_raw(state.next_id());
            state.windows.insert(
                window,
                WindowState {
                    href: spec.url.clone(),
                    parent: Some(self.window),
                    name: Some(spec.name.clone()),
                    body_at: None,
                    listeners: Vec::new(),
                },
            );
            state.frames.insert(
                frame,
                FrameState {
                    window,
                    host: self.window,
                    width: self.browser.config.initial_frame_width,
                },
            );
            (frame, window)
        };
        tracing::trace!(
            %frame,
            %window,
            url = %spec.url,
            name = %spec.name,
            visible = spec.container.is_some(),
            "created frame"
        );
        self.browser.schedule_load(window, on_load);
        Ok(frame)
    }

    fn frame_window(&self, frame: FrameId) -> Result<WindowId> {
        let state = self.browser.state.borrow();
        Ok(state.owned_frame(self.window, frame)?.window)
    }

    fn frame_width(&self, frame: FrameId) -> Result<u32> {
        let state = self.browser.state.borrow();
        Ok(state.owned_frame(self.window, frame)?.width)
    }

    fn set_frame_width(&self, frame: FrameId, width: u32) -> Result<()> {
        let resized = {
            let mut state = self.browser.state.borrow_mut();
            state.owned_frame(self.window, frame)?;
            let Some(target) = state.frames.get_mut(&frame) else {
                return Err(WindowError::NoSuchFrame(frame));
            };
            let changed = target.width != width;
            target.width = width;
            changed.then_some(target.window)
        };
        if let Some(window) = resized {
            let browser = Rc::clone(&self.browser);
            self.browser
                .set_timeout(Duration::ZERO, Box::new(move || browser.fire_resize(window)));
        }
        Ok(())
    }

    fn remove_frame(&self, frame: FrameId) -> Result<()> {
        let mut state = self.browser.state.borrow_mut();
        let window = state.owned_frame(self.window, frame)?.window;
        state.frames.remove(&frame);
        state.remove_window_tree(window);
        tracing::trace!(%frame, %window, "removed frame");
        Ok(())
    }

    fn has_body(&self, window: WindowId) -> bool {
        let state = self.browser.state.borrow();
        let now = state.now;
        state
            .windows
            .get(&window)
            .and_then(|target| target.body_at)
            .is_some_and(|at| at <= now)
    }

    fn child_frame(&self, window: WindowId, name: &str) -> Result<Option<WindowId>> {
        let state = self.browser.state.borrow();
        state.window(window)?;
        state.same_origin(self.window, window, "frames")?;
        Ok(state
            .windows
            .iter()
            .filter(|(_, child)| child.parent == Some(window) && child.name.as_deref() == Some(name))
            .map(|(id, _)| *id)
            .max())
    }

    fn open_named(&self, name: &str) -> Option<WindowId> {
        self.browser.find_named(name)
    }

    fn add_resize_listener(
        &self,
        window: WindowId,
        callback: ResizeCallback,
    ) -> Result<ListenerId> {
        let mut state = self.browser.state.borrow_mut();
        state.same_origin(self.window, window, "addEventListener")?;
        let listener = ListenerId::from_raw(state.next_id());
        state.window_mut(window)?.listeners.push((listener, callback));
        Ok(listener)
    }

    fn remove_resize_listener(&self, window: WindowId, listener: ListenerId) -> Result<()> {
        let mut state = self.browser.state.borrow_mut();
        state
            .window_mut(window)?
            .listeners
            .retain(|(id, _)| *id != listener);
        Ok(())
    }

    fn scheduler(&self) -> Rc<dyn Scheduler> {
        self.browser.clone()
    }
}

fn parse_absolute(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|err| WindowError::InvalidUrl {
        url: url.to_string(),
        reason: err.to_string(),
    })
}

fn origin_of(href: &str) -> String {
    Url::parse(href)
        .map(|url| url.origin().ascii_serialization())
        .unwrap_or_else(|_| "null".to_string())
}

fn strip_fragment(href: &str) -> &str {
    href.split_once('#').map_or(href, |(base, _)| base)
}

fn fragment_of(href: &str) -> &str {
    match href.find('#') {
        Some(index) if index + 1 < href.len() => &href[index..],
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;

    fn browser() -> Rc<SimBrowser> {
        SimBrowser::new(SimConfig::default())
    }

    #[test]
    fn timers_run_in_due_order() {
        let browser = browser();
        let order = Rc::new(RefCell::new(Vec::new()));

        for (delay, label) in [(30, "c"), (10, "a"), (10, "b")] {
            let order = order.clone();
            browser.set_timeout(
                Duration::from_millis(delay),
                Box::new(move || order.borrow_mut().push(label)),
            );
        }

        browser.advance(Duration::from_millis(20));
        assert_eq!(*order.borrow(), vec!["a", "b"]);
        browser.advance(Duration::from_millis(20));
        assert_eq!(*order.borrow(), vec!["a", "b", "c"]);
        assert_eq!(browser.now(), Duration::from_millis(40));
    }

    #[test]
    fn cleared_timer_never_fires() {
        let browser = browser();
        let fired = Rc::new(Cell::new(false));
        let flag = fired.clone();
        let timer = browser.set_timeout(
            Duration::from_millis(5),
            Box::new(move || flag.set(true)),
        );
        browser.clear_timeout(timer);
        browser.advance(Duration::from_millis(10));
        assert!(!fired.get());
    }

    #[test]
    fn fragment_navigation_keeps_document() {
        let browser = browser();
        let doc = browser.open("https://host.example/page.html").unwrap();
        let window = doc.window();

        doc.navigate(window, "https://host.example/page.html#1_hi")
            .unwrap();
        assert_eq!(doc.fragment(window).unwrap(), "#1_hi");
        assert!(doc.has_body(window));
        assert_eq!(browser.pending_timers(), 0);
    }

    #[test]
    fn bare_hash_reads_as_empty_fragment() {
        let browser = browser();
        let doc = browser.open("https://host.example/page.html#").unwrap();
        assert_eq!(doc.fragment(doc.window()).unwrap(), "");
    }

    #[test]
    fn frame_loads_page_then_fires_onload() {
        let browser = browser();
        let events = Rc::new(RefCell::new(Vec::new()));

        let seen = events.clone();
        browser.serve(
            "https://guest.example/",
            Rc::new(move |doc: Rc<SimDocument>| {
                seen.borrow_mut().push(format!("page {}", doc.href()));
            }),
        );

        let host = browser.open("https://host.example/").unwrap();
        let seen = events.clone();
        let frame = host
            .create_frame(
                FrameSpec {
                    url: "https://guest.example/cb.html".to_string(),
                    container: None,
                    name: "local_c1".to_string(),
                },
                Some(Box::new(move || seen.borrow_mut().push("onload".to_string()))),
            )
            .unwrap();

        let child = host.frame_window(frame).unwrap();
        assert!(!host.has_body(child));

        browser.advance(Duration::from_millis(5));
        assert_eq!(
            *events.borrow(),
            vec![
                "page https://guest.example/cb.html".to_string(),
                "onload".to_string()
            ]
        );
        assert!(!host.has_body(child));

        browser.advance(Duration::from_millis(15));
        assert!(host.has_body(child));
        assert_eq!(browser.find_named("local_c1"), Some(child));
    }

    #[test]
    fn cross_origin_reads_are_denied() {
        let browser = browser();
        let host = browser.open("https://host.example/").unwrap();
        let frame = host
            .create_frame(
                FrameSpec {
                    url: "https://guest.example/cb.html".to_string(),
                    container: None,
                    name: "local_c1".to_string(),
                },
                None,
            )
            .unwrap();
        let child = host.frame_window(frame).unwrap();

        assert!(matches!(
            host.fragment(child),
            Err(WindowError::AccessDenied { .. })
        ));
        assert!(matches!(
            host.child_frame(child, "remote_c1"),
            Err(WindowError::AccessDenied { .. })
        ));
        host.navigate(child, "https://guest.example/cb.html#0_x")
            .unwrap();
        assert_eq!(
            browser.href(child).as_deref(),
            Some("https://guest.example/cb.html#0_x")
        );
    }

    #[test]
    fn width_change_raises_resize_once() {
        let browser = browser();
        let host = browser.open("https://host.example/").unwrap();
        let frame = host
            .create_frame(
                FrameSpec {
                    url: "https://host.example/hash.html".to_string(),
                    container: None,
                    name: "helper".to_string(),
                },
                None,
            )
            .unwrap();
        let child = host.frame_window(frame).unwrap();
        browser.advance(Duration::from_millis(25));

        let count = Rc::new(Cell::new(0u32));
        let seen = count.clone();
        let listener = host
            .add_resize_listener(child, Rc::new(move || seen.set(seen.get() + 1)))
            .unwrap();

        host.set_frame_width(frame, 100).unwrap();
        host.set_frame_width(frame, 100).unwrap();
        browser.advance(Duration::ZERO);
        assert_eq!(count.get(), 1);

        host.remove_resize_listener(child, listener).unwrap();
        host.set_frame_width(frame, 50).unwrap();
        browser.advance(Duration::ZERO);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn removing_frame_drops_nested_windows() {
        let browser = browser();
        browser.serve(
            "https://guest.example/",
            Rc::new(|doc: Rc<SimDocument>| {
                doc.create_frame(
                    FrameSpec {
                        url: "https://host.example/hash.html#c1".to_string(),
                        container: None,
                        name: "remote_c1".to_string(),
                    },
                    None,
                )
                .unwrap();
            }),
        );
        let host = browser.open("https://host.example/").unwrap();
        let frame = host
            .create_frame(
                FrameSpec {
                    url: "https://guest.example/cb.html".to_string(),
                    container: None,
                    name: "local_c1".to_string(),
                },
                None,
            )
            .unwrap();
        browser.advance(Duration::from_millis(30));
        let nested = browser.find_named("remote_c1").unwrap();
        assert_eq!(host.open_named("remote_c1"), Some(nested));

        host.remove_frame(frame).unwrap();
        assert!(!browser.contains(nested));
        assert_eq!(host.open_named("remote_c1"), None);
        assert!(matches!(
            host.frame_window(frame),
            Err(WindowError::NoSuchFrame(_))
        ));
    }

    #[test]
    fn reload_on_document_change() {
        let browser = browser();
        let host = browser.open("https://host.example/").unwrap();
        let frame = host
            .create_frame(
                FrameSpec {
                    url: "https://host.example/a.html".to_string(),
                    container: None,
                    name: "f".to_string(),
                },
                None,
            )
            .unwrap();
        let child = host.frame_window(frame).unwrap();
        browser.advance(Duration::from_millis(25));
        assert!(host.has_body(child));

        host.navigate(child, "https://host.example/b.html").unwrap();
        assert!(!host.has_body(child));
        browser.advance(Duration::from_millis(25));
        assert!(host.has_body(child));
    }
}
