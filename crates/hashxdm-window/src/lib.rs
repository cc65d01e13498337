//! Window, frame and timer abstraction for fragment-based messaging.
//!
//! Provides a narrow interface over the pieces of a browser the hash
//! transport touches:
//! - window locations and their fragments
//! - hidden frame creation, sizing and removal
//! - resize notifications
//! - one-shot timers and lifecycle-bound repeating tasks
//!
//! This is the lowest layer of hashxdm. Everything else builds on top of
//! the [`Environment`] and [`Scheduler`] traits provided here. The [`sim`]
//! module is a deterministic in-memory browser implementing both.

pub mod env;
pub mod error;
pub mod handle;
pub mod schedule;
pub mod sim;

#[cfg(feature = "async")]
pub mod local;

pub use env::{Environment, FrameSpec, LoadCallback, ResizeCallback};
pub use error::{Result, WindowError};
pub use handle::{FrameId, ListenerId, TimerId, WindowId};
pub use schedule::{repeat, RepeatStart, Scheduler, Task};
pub use sim::{PageHandler, SimBrowser, SimConfig, SimDocument};

#[cfg(feature = "async")]
pub use local::LocalScheduler;
