//! Port buffers.
//!
//! Every port owns exactly one [`Buffer`]. The set of kinds is closed, so the buffer
//! is an enum and the kind check on the audio path is a discriminant compare.

mod audio;
mod event;

use core::fmt;

use serde::{Deserialize, Serialize};

pub use audio::AudioBuffer;
pub use event::{Event, EventBuffer, EventKind, DEFAULT_EVENT_CAPACITY};

/// Lightweight runtime tag identifying a buffer's kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferKind {
    Audio,
    Event,
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferKind::Audio => f.write_str("audio"),
            BufferKind::Event => f.write_str("event"),
        }
    }
}

/// Data carried by a port for the current round.
#[derive(Clone, Debug, PartialEq)]
pub enum Buffer {
    Audio(AudioBuffer),
    Event(EventBuffer),
}

impl Buffer {
    /// Create a buffer of the given kind sized for `frames` frames.
    pub fn new(kind: BufferKind, frames: usize, event_capacity: usize) -> Self {
        match kind {
            BufferKind::Audio => Buffer::Audio(AudioBuffer::new(frames)),
            BufferKind::Event => Buffer::Event(EventBuffer::new(frames, event_capacity)),
        }
    }

    #[inline]
    pub fn kind(&self) -> BufferKind {
        match self {
            Buffer::Audio(_) => BufferKind::Audio,
            Buffer::Event(_) => BufferKind::Event,
        }
    }

    /// Reset to the silent value: zeroed samples or no events.
    #[inline]
    pub fn clear(&mut self) {
        match self {
            Buffer::Audio(buf) => buf.clear(),
            Buffer::Event(buf) => buf.clear(),
        }
    }

    /// Accumulate `other` into this buffer. Returns `false`, leaving this buffer
    /// untouched, if the kinds differ.
    #[inline]
    pub fn mixin(&mut self, other: &Buffer) -> bool {
        match (self, other) {
            (Buffer::Audio(dst), Buffer::Audio(src)) => dst.mixin(src),
            (Buffer::Event(dst), Buffer::Event(src)) => dst.mixin(src),
            _ => return false,
        }
        true
    }

    /// Resize for a new round length. Allocates and clears.
    pub fn resize(&mut self, frames: usize) {
        match self {
            Buffer::Audio(buf) => buf.resize(frames),
            Buffer::Event(buf) => buf.resize(frames),
        }
    }

    /// Round length in frames.
    pub fn frames(&self) -> usize {
        match self {
            Buffer::Audio(buf) => buf.len(),
            Buffer::Event(buf) => buf.frames(),
        }
    }

    pub fn is_silent(&self) -> bool {
        match self {
            Buffer::Audio(buf) => buf.is_silent(),
            Buffer::Event(buf) => buf.is_empty(),
        }
    }

    #[inline]
    pub fn as_audio(&self) -> Option<&AudioBuffer> {
        match self {
            Buffer::Audio(buf) => Some(buf),
            Buffer::Event(_) => None,
        }
    }

    #[inline]
    pub fn as_audio_mut(&mut self) -> Option<&mut AudioBuffer> {
        match self {
            Buffer::Audio(buf) => Some(buf),
            Buffer::Event(_) => None,
        }
    }

    #[inline]
    pub fn as_event(&self) -> Option<&EventBuffer> {
        match self {
            Buffer::Event(buf) => Some(buf),
            Buffer::Audio(_) => None,
        }
    }

    #[inline]
    pub fn as_event_mut(&mut self) -> Option<&mut EventBuffer> {
        match self {
            Buffer::Event(buf) => Some(buf),
            Buffer::Audio(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn mixin_rejects_mismatched_kinds() {
        let mut audio = Buffer::new(BufferKind::Audio, 8, 0);
        let events = Buffer::new(BufferKind::Event, 8, 4);
        assert!(!audio.mixin(&events));
        assert!(audio.is_silent());
    }

    #[test]
    fn resize_reaches_both_kinds() {
        let mut audio = Buffer::new(BufferKind::Audio, 8, 0);
        let mut events = Buffer::new(BufferKind::Event, 8, 4);
        audio.resize(32);
        events.resize(32);
        assert_eq!(audio.frames(), 32);
        assert_eq!(events.frames(), 32);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Summing upstream buffers gives the same result whatever the order.
        #[test]
        fn audio_mixin_is_order_independent(
            sources in prop::collection::vec(prop::collection::vec(-1.0f32..=1.0f32, 32), 1..6),
            rotation in 0usize..6,
        ) {
            let buffers: Vec<AudioBuffer> = sources
                .iter()
                .map(|samples| {
                    let mut buf = AudioBuffer::new(samples.len());
                    buf.copy_from_slice(samples);
                    buf
                })
                .collect();

            let mut forward = AudioBuffer::new(32);
            for buf in &buffers {
                forward.mixin(buf);
            }

            let mut shuffled = AudioBuffer::new(32);
            let n = buffers.len();
            for i in (0..n).rev().map(|i| (i + rotation) % n) {
                shuffled.mixin(&buffers[i]);
            }

            for (a, b) in forward.iter().zip(shuffled.iter()) {
                prop_assert!((a - b).abs() <= 1e-5, "{} != {}", a, b);
            }
        }
    }
}
