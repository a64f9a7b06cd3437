//! Peak level meter

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::port::PortSpec;
use crate::unit::{Unit, UnitIo};

#[derive(Default)]
struct Shared {
    /// `f32` bits of the last round's peak
    peak: AtomicU32,
    /// `f32` bits of the highest peak since the last reset
    hold: AtomicU32,
    rounds: AtomicU64,
}

/// Read side of a [`PeakMeter`], for UI threads.
#[derive(Clone)]
pub struct PeakReading {
    shared: Arc<Shared>,
}

impl PeakReading {
    /// Peak absolute sample value of the most recent round.
    pub fn peak(&self) -> f32 {
        f32::from_bits(self.shared.peak.load(Ordering::Relaxed))
    }

    /// Highest peak seen since the last [`reset_hold`](Self::reset_hold).
    pub fn hold(&self) -> f32 {
        f32::from_bits(self.shared.hold.load(Ordering::Relaxed))
    }

    pub fn reset_hold(&self) {
        self.shared.hold.store(0f32.to_bits(), Ordering::Relaxed);
    }

    /// Number of rounds the meter has processed.
    pub fn rounds(&self) -> u64 {
        self.shared.rounds.load(Ordering::Acquire)
    }
}

/// Measures the peak of its audio input every round.
///
/// Meters usually hang off the side of a graph without feeding a backend; they are
/// still processed every round.
pub struct PeakMeter {
    shared: Arc<Shared>,
}

impl PeakMeter {
    pub const KIND: &'static str = "peak-meter";

    pub fn new() -> (Self, PeakReading) {
        let shared = Arc::new(Shared::default());
        (
            Self {
                shared: shared.clone(),
            },
            PeakReading { shared },
        )
    }
}

impl Unit for PeakMeter {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::audio_in("in")]
    }

    fn process(&mut self, io: &mut UnitIo<'_>) {
        let peak = io.audio_input(0).map_or(0.0, |buf| buf.peak());
        self.shared.peak.store(peak.to_bits(), Ordering::Relaxed);
        let hold = f32::from_bits(self.shared.hold.load(Ordering::Relaxed));
        if peak > hold {
            self.shared.hold.store(peak.to_bits(), Ordering::Relaxed);
        }
        self.shared.rounds.fetch_add(1, Ordering::Release);
    }

    fn panic(&mut self) {
        self.shared.peak.store(0f32.to_bits(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::testing::Rig;

    #[test]
    fn reports_peak_and_hold() {
        let (mut meter, reading) = PeakMeter::new();
        let mut rig = Rig::new(&meter, 8);

        rig.input(0).as_audio_mut().unwrap()[3] = -0.75;
        rig.run(&mut meter);
        assert_eq!(reading.peak(), 0.75);

        rig.input(0).as_audio_mut().unwrap().fill(0.25);
        rig.run(&mut meter);
        assert_eq!(reading.peak(), 0.25);
        assert_eq!(reading.hold(), 0.75);
        assert_eq!(reading.rounds(), 2);

        reading.reset_hold();
        assert_eq!(reading.hold(), 0.0);
    }
}
