//! Timestamped event buffer.

use delegate::delegate;
use serde::{Deserialize, Serialize};

/// Default number of events an event port can hold per round.
pub const DEFAULT_EVENT_CAPACITY: usize = 512;

/// A discrete musical event.
///
/// Channels are 0-based (0..16). Pitch bend is signed around centre (-8192..=8191).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelPressure { channel: u8, pressure: u8 },
    PitchBend { channel: u8, value: i16 },
}

impl EventKind {
    /// Decode a channel voice message. Running status and system messages are not
    /// supported and yield `None`. A note-on with velocity 0 decodes as a note-off.
    pub fn from_midi(bytes: &[u8]) -> Option<Self> {
        let status = *bytes.first()?;
        let channel = status & 0x0f;
        let data = |i: usize| bytes.get(i).copied().filter(|b| *b < 0x80);

        let kind = match status & 0xf0 {
            0x80 => EventKind::NoteOff { channel, note: data(1)?, velocity: data(2)? },
            0x90 => {
                let (note, velocity) = (data(1)?, data(2)?);
                if velocity == 0 {
                    EventKind::NoteOff { channel, note, velocity: 0 }
                } else {
                    EventKind::NoteOn { channel, note, velocity }
                }
            }
            0xb0 => EventKind::ControlChange { channel, controller: data(1)?, value: data(2)? },
            0xc0 => EventKind::ProgramChange { channel, program: data(1)? },
            0xd0 => EventKind::ChannelPressure { channel, pressure: data(1)? },
            0xe0 => {
                let raw = (data(1)? as i16) | ((data(2)? as i16) << 7);
                EventKind::PitchBend { channel, value: raw - 8192 }
            }
            _ => return None,
        };
        Some(kind)
    }

    /// Encode as a MIDI message. Returns the bytes and how many of them are used.
    pub fn to_midi(&self) -> ([u8; 3], usize) {
        match *self {
            EventKind::NoteOn { channel, note, velocity } => {
                ([0x90 | (channel & 0x0f), note & 0x7f, velocity & 0x7f], 3)
            }
            EventKind::NoteOff { channel, note, velocity } => {
                ([0x80 | (channel & 0x0f), note & 0x7f, velocity & 0x7f], 3)
            }
            EventKind::ControlChange { channel, controller, value } => {
                ([0xb0 | (channel & 0x0f), controller & 0x7f, value & 0x7f], 3)
            }
            EventKind::ProgramChange { channel, program } => {
                ([0xc0 | (channel & 0x0f), program & 0x7f, 0], 2)
            }
            EventKind::ChannelPressure { channel, pressure } => {
                ([0xd0 | (channel & 0x0f), pressure & 0x7f, 0], 2)
            }
            EventKind::PitchBend { channel, value } => {
                let raw = (value.clamp(-8192, 8191) + 8192) as u16;
                ([0xe0 | (channel & 0x0f), (raw & 0x7f) as u8, (raw >> 7) as u8], 3)
            }
        }
    }

    pub fn channel(&self) -> u8 {
        match *self {
            EventKind::NoteOn { channel, .. }
            | EventKind::NoteOff { channel, .. }
            | EventKind::ControlChange { channel, .. }
            | EventKind::ProgramChange { channel, .. }
            | EventKind::ChannelPressure { channel, .. }
            | EventKind::PitchBend { channel, .. } => channel,
        }
    }
}

/// An event tagged with its frame offset inside the current round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    pub frame: u32,
    pub kind: EventKind,
}

impl Event {
    pub fn new(frame: u32, kind: EventKind) -> Self {
        Self { frame, kind }
    }
}

/// Events for one round, kept sorted by frame.
///
/// Capacity is reserved up front; once it is reached further events are dropped and
/// counted instead of reallocating on the audio thread.
#[derive(Clone, Debug)]
pub struct EventBuffer {
    events: Vec<Event>,
    frames: usize,
    dropped: u64,
}

impl EventBuffer {
    /// Create an empty buffer for rounds of `frames` frames holding up to `capacity` events.
    pub fn new(frames: usize, capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            frames,
            dropped: 0,
        }
    }

    delegate! {
        to self.events {
            pub fn len(&self) -> usize;
            pub fn is_empty(&self) -> bool;
            pub fn capacity(&self) -> usize;
            pub fn iter(&self) -> core::slice::Iter<'_, Event>;
            pub fn first(&self) -> Option<&Event>;
            pub fn last(&self) -> Option<&Event>;
        }
    }

    /// Round length in frames; event timestamps are below this.
    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    pub fn as_slice(&self) -> &[Event] {
        &self.events
    }

    /// Events dropped because the buffer was full, since creation.
    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Change the round length and discard all events.
    pub fn resize(&mut self, frames: usize) {
        self.frames = frames;
        self.events.clear();
    }

    /// Grow the reserved capacity. Allocates.
    pub fn reserve_capacity(&mut self, capacity: usize) {
        if capacity > self.events.capacity() {
            self.events.reserve_exact(capacity - self.events.len());
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Insert an event keeping frame order; events with equal frames keep insertion
    /// order. Fails, handing the event back, when the frame lies outside the round or
    /// the buffer is full.
    pub fn push(&mut self, event: Event) -> Result<(), Event> {
        if event.frame as usize >= self.frames {
            return Err(event);
        }
        if self.events.len() == self.events.capacity() {
            self.dropped += 1;
            return Err(event);
        }
        let at = self.events.partition_point(|e| e.frame <= event.frame);
        self.events.insert(at, event);
        Ok(())
    }

    /// Merge `other` into this buffer keeping frame order. On equal frames this
    /// buffer's events come first. Events that do not fit are dropped and counted.
    pub fn mixin(&mut self, other: &EventBuffer) {
        let room = self.events.capacity() - self.events.len();
        let take = other.events.len().min(room);
        self.dropped += (other.events.len() - take) as u64;
        if take == 0 {
            return;
        }

        // The tail of `other` that does not fit is the latest part, so keep the head.
        let incoming = &other.events[..take];
        let mut i = self.events.len();
        let mut j = take;
        // Grow into reserved capacity, then merge from the back.
        self.events.extend_from_slice(incoming);
        let mut k = self.events.len();

        while j > 0 {
            if i > 0 && self.events[i - 1].frame > incoming[j - 1].frame {
                self.events[k - 1] = self.events[i - 1];
                i -= 1;
            } else {
                self.events[k - 1] = incoming[j - 1];
                j -= 1;
            }
            k -= 1;
        }
    }
}

impl<'a> IntoIterator for &'a EventBuffer {
    type Item = &'a Event;
    type IntoIter = core::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

impl PartialEq for EventBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.events == other.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(frame: u32, note: u8) -> Event {
        Event::new(frame, EventKind::NoteOn { channel: 0, note, velocity: 100 })
    }

    fn frames(buf: &EventBuffer) -> Vec<u32> {
        buf.iter().map(|e| e.frame).collect()
    }

    #[test]
    fn push_keeps_frame_order() {
        let mut buf = EventBuffer::new(64, 8);
        buf.push(note(10, 1)).unwrap();
        buf.push(note(2, 2)).unwrap();
        buf.push(note(10, 3)).unwrap();
        buf.push(note(5, 4)).unwrap();
        assert_eq!(frames(&buf), vec![2, 5, 10, 10]);
        // stable for equal frames
        assert_eq!(buf.as_slice()[2], note(10, 1));
        assert_eq!(buf.as_slice()[3], note(10, 3));
    }

    #[test]
    fn push_rejects_out_of_range_and_overflow() {
        let mut buf = EventBuffer::new(16, 1);
        assert!(buf.push(note(16, 1)).is_err());
        buf.push(note(0, 1)).unwrap();
        assert!(buf.push(note(1, 2)).is_err());
        assert_eq!(buf.dropped(), 1);
        assert_eq!(buf.capacity(), 1);
    }

    #[test]
    fn mixin_merges_in_order() {
        let mut a = EventBuffer::new(64, 16);
        let mut b = EventBuffer::new(64, 16);
        for f in [1, 4, 9] {
            a.push(note(f, 0)).unwrap();
        }
        for f in [0, 4, 20] {
            b.push(note(f, 1)).unwrap();
        }
        a.mixin(&b);
        assert_eq!(frames(&a), vec![0, 1, 4, 4, 9, 20]);
        // equal frames: receiving buffer first
        assert_eq!(a.as_slice()[2], note(4, 0));
        assert_eq!(a.as_slice()[3], note(4, 1));
    }

    #[test]
    fn mixin_does_not_grow_past_capacity() {
        let mut a = EventBuffer::new(64, 2);
        let mut b = EventBuffer::new(64, 4);
        a.push(note(3, 0)).unwrap();
        for f in [0, 1, 2] {
            b.push(note(f, 1)).unwrap();
        }
        a.mixin(&b);
        assert_eq!(frames(&a), vec![0, 3]);
        assert_eq!(a.dropped(), 2);
        assert_eq!(a.capacity(), 2);
    }

    #[test]
    fn midi_conversion() {
        let on = EventKind::from_midi(&[0x91, 60, 100]).unwrap();
        assert_eq!(on, EventKind::NoteOn { channel: 1, note: 60, velocity: 100 });
        assert_eq!(on.to_midi(), ([0x91, 60, 100], 3));

        let off = EventKind::from_midi(&[0x90, 60, 0]).unwrap();
        assert!(matches!(off, EventKind::NoteOff { note: 60, .. }));

        let bend = EventKind::PitchBend { channel: 0, value: -8192 };
        let (bytes, n) = bend.to_midi();
        assert_eq!(EventKind::from_midi(&bytes[..n]), Some(bend));

        assert_eq!(EventKind::from_midi(&[0xf8]), None);
        assert_eq!(EventKind::from_midi(&[0x90, 200, 1]), None);
    }
}
