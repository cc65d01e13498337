//! Behavior chain between the application and the wire.
//!
//! A chain is an ordered list of stages. Outgoing messages enter at the
//! first stage and leave the last one toward the wire; incoming messages
//! and readiness enter at the last stage and leave the first one toward the
//! application. Stages never call each other: each one records signals on
//! a [`Link`], and the chain routes them through a FIFO work queue. What
//! leaves either end of the chain is returned to the caller as [`Effect`]s,
//! so the chain itself performs no I/O.

mod queue;
mod reliable;
mod verify;

use std::collections::VecDeque;
use std::time::Duration;

pub use queue::QueueBehavior;
pub use reliable::ReliableBehavior;
pub use verify::VerifyBehavior;

/// Continuation addressed to one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wake {
    pub stage: usize,
    pub key: u64,
}

/// Work leaving the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Write a message to the wire. `wake` runs once the write is paced.
    Transmit { message: String, wake: Option<Wake> },
    /// Hand a message to the application.
    Deliver { message: String, origin: String },
    /// The channel became usable.
    Ready,
    /// Run `wake` after `delay`.
    Schedule { delay: Duration, wake: Wake },
}

#[derive(Debug)]
enum Signal {
    Down(String, Option<Wake>),
    Up(String, String),
    UpReady,
    Timer(Duration, u64),
    Fire(Wake),
}

/// A stage's view of its neighbours.
#[derive(Debug)]
pub struct Link {
    stage: usize,
    signals: Vec<Signal>,
}

impl Link {
    fn new(stage: usize) -> Self {
        Self {
            stage,
            signals: Vec::new(),
        }
    }

    /// Pass a message toward the wire.
    pub fn down(&mut self, message: impl Into<String>) {
        self.signals.push(Signal::Down(message.into(), None));
    }

    /// Pass a message toward the wire, carrying a continuation.
    pub fn down_with(&mut self, message: impl Into<String>, wake: Option<Wake>) {
        self.signals.push(Signal::Down(message.into(), wake));
    }

    /// Pass a message toward the application.
    pub fn up(&mut self, message: impl Into<String>, origin: impl Into<String>) {
        self.signals.push(Signal::Up(message.into(), origin.into()));
    }

    /// Signal readiness toward the application.
    pub fn ready(&mut self) {
        self.signals.push(Signal::UpReady);
    }

    /// Ask to be woken with `key` after `delay`.
    pub fn timer(&mut self, delay: Duration, key: u64) {
        self.signals.push(Signal::Timer(delay, key));
    }

    /// Run a continuation handed down by a stage above.
    pub fn fire(&mut self, wake: Wake) {
        self.signals.push(Signal::Fire(wake));
    }

    /// A continuation that wakes this stage with `key`.
    pub fn wake(&self, key: u64) -> Wake {
        Wake {
            stage: self.stage,
            key,
        }
    }
}

/// One behavior in the chain.
pub trait Stage {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// A message from the stage above, heading to the wire.
    fn outgoing(&mut self, message: String, wake: Option<Wake>, link: &mut Link);

    /// A message from the stage below, heading to the application.
    fn incoming(&mut self, message: String, origin: String, link: &mut Link);

    /// The stage below became ready.
    fn ready(&mut self, link: &mut Link);

    /// A timer or continuation addressed to this stage fired.
    fn wake(&mut self, key: u64, link: &mut Link);

    /// Release held messages. No further events follow.
    fn destroy(&mut self) {}
}

enum Event {
    Outgoing(String, Option<Wake>),
    Incoming(String, String),
    Ready,
    Wake(u64),
}

/// Immutable ordered list of stages.
pub struct Chain {
    stages: Vec<Box<dyn Stage>>,
    destroyed: bool,
}

impl Chain {
    /// Compose stages ordered from the application toward the wire.
    pub fn compose(stages: Vec<Box<dyn Stage>>) -> Self {
        tracing::debug!(
            stages = ?stages.iter().map(|stage| stage.name()).collect::<Vec<_>>(),
            "composed behavior chain"
        );
        Self {
            stages,
            destroyed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Names of the stages, application side first.
    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Push an application message into the top of the chain.
    pub fn outgoing(&mut self, message: String) -> Vec<Effect> {
        if self.destroyed {
            return Vec::new();
        }
        if self.stages.is_empty() {
            return vec![Effect::Transmit {
                message,
                wake: None,
            }];
        }
        self.run(0, Event::Outgoing(message, None))
    }

    /// Push a message read from the wire into the bottom of the chain.
    pub fn incoming(&mut self, message: String, origin: String) -> Vec<Effect> {
        if self.destroyed {
            return Vec::new();
        }
        match self.stages.len().checked_sub(1) {
            Some(last) => self.run(last, Event::Incoming(message, origin)),
            None => vec![Effect::Deliver { message, origin }],
        }
    }

    /// Signal that the wire is usable.
    pub fn ready(&mut self) -> Vec<Effect> {
        if self.destroyed {
            return Vec::new();
        }
        match self.stages.len().checked_sub(1) {
            Some(last) => self.run(last, Event::Ready),
            None => vec![Effect::Ready],
        }
    }

    /// Deliver a continuation to the stage it addresses.
    pub fn wake(&mut self, wake: Wake) -> Vec<Effect> {
        if self.destroyed || wake.stage >= self.stages.len() {
            return Vec::new();
        }
        self.run(wake.stage, Event::Wake(wake.key))
    }

    /// Destroy every stage. Later calls produce no effects.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        for stage in &mut self.stages {
            stage.destroy();
        }
    }

    fn run(&mut self, stage: usize, event: Event) -> Vec<Effect> {
        let mut effects = Vec::new();
        let mut work = VecDeque::from([(stage, event)]);

        while let Some((index, event)) = work.pop_front() {
            let mut link = Link::new(index);
            let Some(stage) = self.stages.get_mut(index) else {
                continue;
            };
            match event {
                Event::Outgoing(message, wake) => stage.outgoing(message, wake, &mut link),
                Event::Incoming(message, origin) => stage.incoming(message, origin, &mut link),
                Event::Ready => stage.ready(&mut link),
                Event::Wake(key) => stage.wake(key, &mut link),
            }

            for signal in link.signals {
                match signal {
                    Signal::Down(message, wake) => {
                        if index + 1 < self.stages.len() {
                            work.push_back((index + 1, Event::Outgoing(message, wake)));
                        } else {
                            effects.push(Effect::Transmit { message, wake });
                        }
                    }
                    Signal::Up(message, origin) => match index.checked_sub(1) {
                        Some(above) => work.push_back((above, Event::Incoming(message, origin))),
                        None => effects.push(Effect::Deliver { message, origin }),
                    },
                    Signal::UpReady => match index.checked_sub(1) {
                        Some(above) => work.push_back((above, Event::Ready)),
                        None => effects.push(Effect::Ready),
                    },
                    Signal::Timer(delay, key) => effects.push(Effect::Schedule {
                        delay,
                        wake: Wake { stage: index, key },
                    }),
                    Signal::Fire(wake) => {
                        if wake.stage < self.stages.len() {
                            work.push_back((wake.stage, Event::Wake(wake.key)));
                        }
                    }
                }
            }
        }

        effects
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("stages", &self.names())
            .field("destroyed", &self.destroyed)
            .finish()
    }
}
