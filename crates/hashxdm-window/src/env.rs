use std::rc::Rc;

use crate::error::Result;
use crate::handle::{FrameId, ListenerId, WindowId};
use crate::schedule::Scheduler;

/// Invoked once when a created frame finishes loading its document.
pub type LoadCallback = Box<dyn FnOnce()>;

/// Invoked on every layout-resize notification of a window.
pub type ResizeCallback = Rc<dyn Fn()>;

/// Parameters for a hidden frame created by [`Environment::create_frame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSpec {
    /// Absolute URL loaded into the frame.
    pub url: String,
    /// Element id of a visible container, or `None` for a hidden frame.
    pub container: Option<String>,
    /// Frame name, also the name of its content window.
    pub name: String,
}

/// The document-side view of a browser.
///
/// Every method acts on behalf of the document owning this environment
/// (the window returned by [`current_window`](Environment::current_window)).
/// Operations that the same-origin policy forbids fail with
/// [`WindowError::AccessDenied`](crate::WindowError::AccessDenied); writing
/// a location is always permitted.
pub trait Environment {
    /// The window of the owning document.
    fn current_window(&self) -> WindowId;

    /// The parent of the owning document's window, if it is framed.
    fn parent_window(&self) -> Option<WindowId>;

    /// Full location of a same-origin window.
    fn location(&self, window: WindowId) -> Result<String>;

    /// Fragment of a same-origin window, including the leading `#`.
    ///
    /// Returns an empty string when the location has no fragment.
    fn fragment(&self, window: WindowId) -> Result<String>;

    /// Assign a new location to a window.
    ///
    /// A change that only touches the fragment does not reload the
    /// document.
    fn navigate(&self, window: WindowId, url: &str) -> Result<()>;

    /// Create a frame inside the owning document.
    fn create_frame(&self, spec: FrameSpec, on_load: Option<LoadCallback>) -> Result<FrameId>;

    /// Content window of a frame created by the owning document.
    fn frame_window(&self, frame: FrameId) -> Result<WindowId>;

    /// Current pixel width of a frame.
    fn frame_width(&self, frame: FrameId) -> Result<u32>;

    /// Set the pixel width of a frame. A change raises a resize
    /// notification in the frame's content window.
    fn set_frame_width(&self, frame: FrameId, width: u32) -> Result<()>;

    /// Detach a frame from its parent document.
    fn remove_frame(&self, frame: FrameId) -> Result<()>;

    /// Whether the window currently has a loaded document with a body.
    fn has_body(&self, window: WindowId) -> bool;

    /// Named child frame of a window (`window.frames[name]`).
    fn child_frame(&self, window: WindowId, name: &str) -> Result<Option<WindowId>>;

    /// Reuse an existing window by name (`window.open("", name)`).
    fn open_named(&self, name: &str) -> Option<WindowId>;

    /// Register a resize listener on a same-origin window.
    fn add_resize_listener(&self, window: WindowId, callback: ResizeCallback)
        -> Result<ListenerId>;

    /// Remove a listener registered with
    /// [`add_resize_listener`](Environment::add_resize_listener).
    fn remove_resize_listener(&self, window: WindowId, listener: ListenerId) -> Result<()>;

    /// Timer source of the owning document's event loop.
    fn scheduler(&self) -> Rc<dyn Scheduler>;
}
