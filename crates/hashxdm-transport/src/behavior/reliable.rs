use std::collections::VecDeque;
use std::time::Duration;

use super::{Link, Stage, Wake};

struct InFlight {
    id: u64,
    payload: String,
    attempts: u32,
    armed: bool,
}

/// Stop-and-wait delivery with acknowledgements and retransmission.
///
/// Frames are `<last received id>,<sent id>_<payload>`. Exactly one frame
/// is in flight; later messages wait until it is acknowledged or dropped.
/// A received data frame is acknowledged by the next frame this side
/// sends, which is a bare acknowledgement with sent id 0 when nothing else
/// is waiting. Data ids start at 1, so an empty payload is still data.
///
/// The retransmission timer starts once the stages below report the frame
/// fully written, not when it is handed down.
pub struct ReliableBehavior {
    timeout: Duration,
    max_attempts: u32,
    ready: bool,
    id_in: u64,
    id_out: u64,
    in_flight: Option<InFlight>,
    pending: VecDeque<String>,
    generation: u64,
}

impl ReliableBehavior {
    pub fn new(timeout: Duration, max_attempts: u32) -> Self {
        Self {
            timeout,
            max_attempts: max_attempts.max(1),
            ready: false,
            id_in: 0,
            id_out: 0,
            in_flight: None,
            pending: VecDeque::new(),
            generation: 0,
        }
    }

    /// Retransmission timeout derived from how both directions are read.
    ///
    /// Each half is 50 ms when driven by resize notifications and one and a
    /// half poll intervals otherwise.
    pub fn timeout_for(use_resize: bool, use_polling: bool, poll_interval: Duration) -> Duration {
        let slow = poll_interval * 3 / 2;
        let fast = Duration::from_millis(50);
        (if use_resize { fast } else { slow }) + (if use_polling { slow } else { fast })
    }

    /// Messages waiting behind the frame in flight.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn pump(&mut self, link: &mut Link) -> bool {
        if !self.ready || self.in_flight.is_some() {
            return false;
        }
        let Some(payload) = self.pending.pop_front() else {
            return false;
        };
        self.id_out += 1;
        self.in_flight = Some(InFlight {
            id: self.id_out,
            payload,
            attempts: 0,
            armed: false,
        });
        self.transmit(link);
        true
    }

    fn transmit(&mut self, link: &mut Link) {
        let Some(frame) = self.in_flight.as_mut() else {
            return;
        };
        frame.attempts += 1;
        frame.armed = false;
        tracing::trace!(id = frame.id, attempt = frame.attempts, "reliable transmit");
        self.generation += 1;
        let written = link.wake(self.generation);
        link.down_with(
            format!("{},{}_{}", self.id_in, frame.id, frame.payload),
            Some(written),
        );
    }
}

impl Stage for ReliableBehavior {
    fn name(&self) -> &'static str {
        "reliable"
    }

    fn outgoing(&mut self, message: String, _wake: Option<Wake>, link: &mut Link) {
        self.pending.push_back(message);
        self.pump(link);
    }

    fn incoming(&mut self, message: String, origin: String, link: &mut Link) {
        let Some((acked, sent, payload)) = parse_frame(&message) else {
            tracing::warn!(frame = %message, "ignoring malformed reliable frame");
            return;
        };

        if self.in_flight.as_ref().is_some_and(|frame| frame.id == acked) {
            tracing::trace!(id = acked, "reliable frame acknowledged");
            self.in_flight = None;
            self.generation += 1;
        }

        let needs_ack = sent != ACK;
        if needs_ack {
            if sent != self.id_in {
                self.id_in = sent;
                link.up(payload, origin);
            } else {
                tracing::trace!(id = sent, "duplicate reliable frame");
            }
        }

        if !self.pump(link) && needs_ack {
            link.down(format!("{},{ACK}_", self.id_in));
        }
    }

    fn ready(&mut self, link: &mut Link) {
        self.ready = true;
        link.ready();
        self.pump(link);
    }

    fn wake(&mut self, key: u64, link: &mut Link) {
        if key != self.generation {
            return;
        }
        let Some(frame) = self.in_flight.as_mut() else {
            return;
        };
        if !frame.armed {
            frame.armed = true;
            link.timer(self.timeout, self.generation);
            return;
        }
        if frame.attempts >= self.max_attempts {
            tracing::warn!(
                id = frame.id,
                attempts = frame.attempts,
                "reliable frame unacknowledged, dropping"
            );
            self.in_flight = None;
            self.pump(link);
            return;
        }
        self.transmit(link);
    }

    fn destroy(&mut self) {
        self.pending.clear();
        self.in_flight = None;
    }
}

/// Sent id carried by bare acknowledgements.
const ACK: u64 = 0;

fn parse_frame(frame: &str) -> Option<(u64, u64, &str)> {
    let (header, payload) = frame.split_once('_')?;
    let (acked, sent) = header.split_once(',')?;
    Some((acked.parse().ok()?, sent.parse().ok()?, payload))
}
