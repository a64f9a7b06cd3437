//! Aligned audio sample buffer.

use core::fmt;
use core::ops::{Deref, DerefMut};

/// Samples per storage lane.
const LANE_WIDTH: usize = 8;

/// One aligned block of samples. Keeping the storage in lanes gives every buffer a
/// 32 byte aligned start and a length that is a multiple of the SIMD width, so the
/// arithmetic below auto-vectorizes without remainder loops.
#[derive(Clone, Copy, Default)]
#[repr(C, align(32))]
struct Lane([f32; LANE_WIDTH]);

/// A fixed-length block of mono audio samples.
///
/// The length always equals the owning graph's buffer size. Resizing allocates and
/// therefore only happens under the graph lock outside a processing round; every
/// other operation is allocation-free and safe to call from [`Unit::process`].
///
/// [`Unit::process`]: crate::Unit::process
#[derive(Clone, Default)]
pub struct AudioBuffer {
    lanes: Vec<Lane>,
    len: usize,
}

impl AudioBuffer {
    /// Alignment in bytes of the first sample.
    pub const ALIGNMENT: usize = core::mem::align_of::<Lane>();

    /// Create a zeroed buffer holding `len` samples.
    pub fn new(len: usize) -> Self {
        Self {
            lanes: vec![Lane::default(); lanes_for(len)],
            len,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Change the length and zero the contents. Allocates.
    pub fn resize(&mut self, len: usize) {
        self.lanes.clear();
        self.lanes.resize(lanes_for(len), Lane::default());
        self.len = len;
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        // SAFETY: `Lane` is `repr(C)` over `[f32; LANE_WIDTH]`, so the lane storage is a
        // contiguous run of at least `len` initialized f32 values.
        unsafe { core::slice::from_raw_parts(self.lanes.as_ptr().cast::<f32>(), self.len) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        // SAFETY: see `as_slice`; the unique borrow of `self` guarantees exclusivity.
        unsafe { core::slice::from_raw_parts_mut(self.lanes.as_mut_ptr().cast::<f32>(), self.len) }
    }

    /// Zero-fill.
    #[inline]
    pub fn clear(&mut self) {
        self.lanes.iter_mut().for_each(|lane| *lane = Lane::default());
    }

    pub fn fill(&mut self, value: f32) {
        self.as_mut_slice().iter_mut().for_each(|s| *s = value);
    }

    /// Overwrite with the contents of `other`. Extra samples on either side are left
    /// untouched.
    pub fn copy_from(&mut self, other: &AudioBuffer) {
        let n = self.len.min(other.len);
        self.as_mut_slice()[..n].copy_from_slice(&other.as_slice()[..n]);
    }

    /// Accumulate `other` into this buffer. This is the fan-in merge used by input ports.
    #[inline]
    pub fn mixin(&mut self, other: &AudioBuffer) {
        self.add(other);
    }

    /// Elementwise `self += other`.
    pub fn add(&mut self, other: &AudioBuffer) {
        self.zip_lanes(other, |a, b| *a += b);
    }

    /// Elementwise `self -= other`.
    pub fn sub(&mut self, other: &AudioBuffer) {
        self.zip_lanes(other, |a, b| *a -= b);
    }

    /// Multiply every sample by `factor`.
    pub fn attenuate(&mut self, factor: f32) {
        for lane in self.lanes.iter_mut() {
            lane.0.iter_mut().for_each(|s| *s *= factor);
        }
    }

    pub fn negate(&mut self) {
        for lane in self.lanes.iter_mut() {
            lane.0.iter_mut().for_each(|s| *s = -*s);
        }
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        self.as_slice().iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
    }

    /// True when every sample is exactly zero.
    pub fn is_silent(&self) -> bool {
        self.as_slice().iter().all(|s| *s == 0.0)
    }

    #[inline]
    fn zip_lanes(&mut self, other: &AudioBuffer, op: impl Fn(&mut f32, f32)) {
        if self.len == other.len {
            for (dst, src) in self.lanes.iter_mut().zip(other.lanes.iter()) {
                for (a, b) in dst.0.iter_mut().zip(src.0.iter()) {
                    op(a, *b);
                }
            }
        } else {
            // Only reachable if a caller mixes buffers from different graphs.
            let n = self.len.min(other.len);
            let src = &other.as_slice()[..n];
            for (a, b) in self.as_mut_slice()[..n].iter_mut().zip(src.iter()) {
                op(a, *b);
            }
        }
    }
}

#[inline]
fn lanes_for(len: usize) -> usize {
    len.div_ceil(LANE_WIDTH)
}

impl Deref for AudioBuffer {
    type Target = [f32];

    #[inline]
    fn deref(&self) -> &[f32] {
        self.as_slice()
    }
}

impl DerefMut for AudioBuffer {
    #[inline]
    fn deref_mut(&mut self) -> &mut [f32] {
        self.as_mut_slice()
    }
}

impl PartialEq for AudioBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl fmt::Debug for AudioBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioBuffer")
            .field("len", &self.len)
            .field("peak", &self.peak())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(len: usize, value: f32) -> AudioBuffer {
        let mut buf = AudioBuffer::new(len);
        buf.fill(value);
        buf
    }

    #[test]
    fn storage_is_aligned() {
        let buf = AudioBuffer::new(100);
        assert_eq!(buf.as_ptr() as usize % AudioBuffer::ALIGNMENT, 0);
        assert_eq!(buf.len(), 100);
    }

    #[test]
    fn arithmetic() {
        let mut a = filled(13, 1.0);
        let b = filled(13, 0.5);

        a.mixin(&b);
        assert!(a.iter().all(|s| *s == 1.5));

        a.sub(&b);
        a.sub(&b);
        assert!(a.iter().all(|s| *s == 0.5));

        a.attenuate(4.0);
        a.negate();
        assert!(a.iter().all(|s| *s == -2.0));
        assert_eq!(a.peak(), 2.0);

        a.clear();
        assert!(a.is_silent());
    }

    #[test]
    fn resize_zeroes_padding() {
        let mut buf = filled(3, 1.0);
        buf.resize(7);
        assert_eq!(buf.len(), 7);
        assert!(buf.is_silent());
    }

    #[test]
    fn mismatched_lengths_touch_the_overlap_only() {
        let mut a = filled(4, 1.0);
        let b = filled(2, 1.0);
        a.add(&b);
        assert_eq!(a.as_slice(), &[2.0, 2.0, 1.0, 1.0]);
    }

    #[test]
    fn empty_buffer() {
        let mut buf = AudioBuffer::new(0);
        buf.clear();
        buf.fill(1.0);
        assert!(buf.is_empty());
        assert_eq!(buf.as_slice(), &[] as &[f32]);
    }
}
