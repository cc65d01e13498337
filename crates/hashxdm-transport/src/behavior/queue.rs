use std::collections::VecDeque;

use hashxdm_codec::percent_encode;

use super::{Link, Stage, Wake};
use crate::error::{Result, TransportError};

/// Room kept for the framing added below the queue: the fragment's
/// sequence number and separator, and the verification secret.
pub const LOWER_FRAMING: usize = 48;

/// Smallest encoded chunk the queue can work with.
pub const MIN_CHUNK: usize = 32;

#[derive(Default)]
struct Reassembly {
    count: usize,
    next: usize,
    buffer: String,
}

/// Buffers, splits and paces outgoing messages; reassembles incoming ones.
///
/// Chunks are `<index>/<count>:<data>`. One chunk is handed to the wire at
/// a time and the next one follows when the wire's continuation fires. A
/// continuation passed down with a message fires once its last chunk has
/// been paced out.
pub struct QueueBehavior {
    budget: usize,
    ready: bool,
    outbox: VecDeque<(String, Option<Wake>)>,
    waiting: Option<(u64, Option<Wake>)>,
    next_key: u64,
    reassembly: Option<Reassembly>,
}

impl QueueBehavior {
    /// Create a queue for messages whose URL may add at most `max_length`
    /// characters.
    pub fn new(max_length: usize) -> Result<Self> {
        let budget = max_length.saturating_sub(LOWER_FRAMING);
        if budget < MIN_CHUNK {
            return Err(TransportError::InvalidConfig(format!(
                "remote url leaves {max_length} characters per message, at least {} needed",
                LOWER_FRAMING + MIN_CHUNK
            )));
        }
        Ok(Self {
            budget,
            ready: false,
            outbox: VecDeque::new(),
            waiting: None,
            next_key: 0,
            reassembly: None,
        })
    }

    /// Encoded size available to one chunk, header included.
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Chunks not yet handed to the wire.
    pub fn queued(&self) -> usize {
        self.outbox.len()
    }

    fn pump(&mut self, link: &mut Link) {
        if !self.ready || self.waiting.is_some() {
            return;
        }
        let Some((chunk, upstream)) = self.outbox.pop_front() else {
            return;
        };
        self.next_key += 1;
        self.waiting = Some((self.next_key, upstream));
        let wake = link.wake(self.next_key);
        link.down_with(chunk, Some(wake));
    }
}

impl Stage for QueueBehavior {
    fn name(&self) -> &'static str {
        "queue"
    }

    fn outgoing(&mut self, message: String, wake: Option<Wake>, link: &mut Link) {
        let chunks = split(&message, self.budget);
        tracing::trace!(chunks = chunks.len(), len = message.len(), "queued message");
        let last = chunks.len().saturating_sub(1);
        self.outbox.extend(
            chunks
                .into_iter()
                .enumerate()
                .map(|(index, chunk)| (chunk, if index == last { wake } else { None })),
        );
        self.pump(link);
    }

    fn incoming(&mut self, message: String, origin: String, link: &mut Link) {
        let Some((index, count, data)) = parse_chunk(&message) else {
            tracing::warn!(chunk = %message, "ignoring malformed chunk");
            return;
        };

        if index == 0 {
            self.reassembly = Some(Reassembly {
                count,
                next: 0,
                buffer: String::new(),
            });
        }
        let in_sequence = self
            .reassembly
            .as_ref()
            .is_some_and(|state| state.next == index && state.count == count);
        if !in_sequence {
            tracing::warn!(index, count, "out-of-order chunk, discarding message");
            self.reassembly = None;
            return;
        }

        let complete = match self.reassembly.as_mut() {
            Some(state) => {
                state.buffer.push_str(data);
                state.next += 1;
                state.next == state.count
            }
            None => false,
        };
        if complete {
            if let Some(state) = self.reassembly.take() {
                link.up(state.buffer, origin);
            }
        }
    }

    fn ready(&mut self, link: &mut Link) {
        self.ready = true;
        link.ready();
        self.pump(link);
    }

    fn wake(&mut self, key: u64, link: &mut Link) {
        let Some((_, upstream)) = self.waiting.take_if(|(waiting, _)| *waiting == key) else {
            return;
        };
        if let Some(upstream) = upstream {
            link.fire(upstream);
        }
        self.pump(link);
    }

    fn destroy(&mut self) {
        self.outbox.clear();
        self.reassembly = None;
    }
}

fn encoded_len(ch: char) -> usize {
    let mut buf = [0u8; 4];
    percent_encode(ch.encode_utf8(&mut buf)).len()
}

fn header_len(index: usize, count: usize) -> usize {
    percent_encode(&format!("{index}/{count}:")).len()
}

/// Split `message` into framed chunks whose encoded length fits `budget`.
fn split(message: &str, budget: usize) -> Vec<String> {
    let mut count = 1usize;
    loop {
        // Widest header this chunk count can produce.
        let room = budget.saturating_sub(header_len(count - 1, count)).max(12);
        let pieces = pieces(message, room);
        if pieces.len() <= count {
            let total = pieces.len();
            return pieces
                .into_iter()
                .enumerate()
                .map(|(index, piece)| format!("{index}/{total}:{piece}"))
                .collect();
        }
        count = pieces.len();
    }
}

fn pieces(message: &str, room: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut used = 0;
    for (offset, ch) in message.char_indices() {
        let len = encoded_len(ch);
        if used + len > room && offset > start {
            pieces.push(&message[start..offset]);
            start = offset;
            used = 0;
        }
        used += len;
    }
    pieces.push(&message[start..]);
    pieces
}

fn parse_chunk(chunk: &str) -> Option<(usize, usize, &str)> {
    let (header, data) = chunk.split_once(':')?;
    let (index, count) = header.split_once('/')?;
    let index: usize = index.parse().ok()?;
    let count: usize = count.parse().ok()?;
    (index < count).then_some((index, count, data))
}
