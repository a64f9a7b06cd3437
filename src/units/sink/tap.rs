//! Ring buffer tap for recording and analysis

use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};

use crate::port::PortSpec;
use crate::unit::{Unit, UnitIo};

/// A sink that pushes interleaved audio into an rtrb ring buffer.
///
/// Useful for:
/// - Sending audio to another thread
/// - Recording/analysis
/// - Tests
///
/// A round that does not fit in the free space is skipped whole and counted as an
/// overrun.
pub struct Tap {
    producer: Producer<f32>,
    channels: usize,
    overruns: Arc<AtomicU64>,
}

/// Reading half of a [`Tap`].
pub struct TapReader {
    consumer: Consumer<f32>,
    channels: usize,
    overruns: Arc<AtomicU64>,
}

impl Tap {
    pub const KIND: &'static str = "tap";

    /// Create a tap with `channels` inputs and room for `capacity` samples.
    pub fn new(channels: usize, capacity: usize) -> (Self, TapReader) {
        let channels = channels.max(1);
        let (producer, consumer) = RingBuffer::new(capacity.max(channels));
        let overruns = Arc::new(AtomicU64::new(0));
        (
            Self {
                producer,
                channels,
                overruns: overruns.clone(),
            },
            TapReader {
                consumer,
                channels,
                overruns,
            },
        )
    }

    pub fn mono(capacity: usize) -> (Self, TapReader) {
        Self::new(1, capacity)
    }

    /// Returns how many sample slots are available
    #[inline]
    pub fn available(&self) -> usize {
        self.producer.slots()
    }
}

impl Unit for Tap {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn ports(&self) -> Vec<PortSpec> {
        if self.channels == 1 {
            return vec![PortSpec::audio_in("in")];
        }
        (0..self.channels)
            .map(|ch| PortSpec::audio_in(format!("in_{ch}")))
            .collect()
    }

    fn process(&mut self, io: &mut UnitIo<'_>) {
        let frames = io.context().buffer_size;
        let needed = frames * self.channels;
        if self.producer.slots() < needed {
            self.overruns.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let Ok(mut chunk) = self.producer.write_chunk_uninit(needed) else {
            return;
        };
        let (first, second) = chunk.as_mut_slices();
        let mut slots = first.iter_mut().chain(second.iter_mut());
        for frame in 0..frames {
            for ch in 0..self.channels {
                let sample = io
                    .audio_input(ch)
                    .and_then(|buf| buf.get(frame).copied())
                    .unwrap_or(0.0);
                if let Some(slot) = slots.next() {
                    slot.write(sample);
                }
            }
        }
        // SAFETY: the loops above wrote exactly `needed` samples, the chunk's length.
        unsafe { chunk.commit_all() };
    }
}

impl TapReader {
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Samples waiting to be read.
    #[inline]
    pub fn len(&self) -> usize {
        self.consumer.slots()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rounds skipped because the buffer was full.
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Move up to `out.len()` interleaved samples into `out`; returns how many.
    pub fn read(&mut self, out: &mut [f32]) -> usize {
        let n = out.len().min(self.consumer.slots());
        let Ok(chunk) = self.consumer.read_chunk(n) else {
            return 0;
        };
        let (first, second) = chunk.as_slices();
        out[..first.len()].copy_from_slice(first);
        out[first.len()..n].copy_from_slice(second);
        chunk.commit_all();
        n
    }

    /// Everything currently buffered.
    pub fn drain(&mut self) -> Vec<f32> {
        let mut out = vec![0.0; self.len()];
        let n = self.read(&mut out);
        out.truncate(n);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::testing::Rig;

    #[test]
    fn interleaves_channels() {
        let (mut tap, mut reader) = Tap::new(2, 64);
        let mut rig = Rig::new(&tap, 4);
        rig.input(0).as_audio_mut().unwrap().fill(1.0);
        rig.input(1).as_audio_mut().unwrap().fill(-1.0);
        rig.run(&mut tap);

        assert_eq!(reader.drain(), vec![1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0]);
        assert!(reader.is_empty());
    }

    #[test]
    fn skips_rounds_that_do_not_fit() {
        let (mut tap, mut reader) = Tap::mono(6);
        let mut rig = Rig::new(&tap, 4);
        rig.run(&mut tap);
        rig.run(&mut tap);
        assert_eq!(reader.len(), 4);
        assert_eq!(reader.overruns(), 1);
        assert_eq!(tap.available(), 2);

        let mut buf = [9.0; 3];
        assert_eq!(reader.read(&mut buf), 3);
        assert_eq!(buf, [0.0; 3]);
    }
}
