//! Gain/volume control effect

use crate::control::{self, Controller, Inbox};
use crate::graph::GraphParams;
use crate::port::PortSpec;
use crate::unit::{Persistent, Unit, UnitIo, UnitState};
use crate::units::state_f32;

/// Messages to control gain
#[derive(Clone, Copy, Debug)]
pub enum GainMessage {
    /// Set the gain multiplier (1.0 = unity, 0.0 = silence)
    SetGain(f32),
}

/// A gain (volume) control that passes audio through with amplitude scaling.
///
/// Gain changes are smoothed with a one-pole filter to avoid clicks.
pub struct Gain {
    gain: f32,
    smoothed_gain: f32,
    /// Smoothing coefficient (0.0 = instant, 1.0 = no change)
    smooth_coeff: f32,
    /// Smoothing time, re-applied when the sample rate changes
    smoothing_ms: Option<f32>,
    inbox: Option<Inbox<GainMessage>>,
}

impl Gain {
    pub const KIND: &'static str = "gain";

    pub fn new(gain: f32) -> Self {
        Self {
            gain,
            smoothed_gain: gain,
            smooth_coeff: 0.995, // ~7ms at 48kHz
            smoothing_ms: None,
            inbox: None,
        }
    }

    /// Set the smoothing time in milliseconds. The coefficient follows the graph's
    /// sample rate.
    pub fn with_smoothing_ms(mut self, ms: f32) -> Self {
        self.smoothing_ms = Some(ms.max(0.0));
        self
    }

    /// Disable smoothing for instant gain changes
    pub fn without_smoothing(mut self) -> Self {
        self.smooth_coeff = 0.0;
        self.smoothing_ms = None;
        self
    }

    /// Attach a message queue and return its sending half.
    pub fn controlled(mut self) -> (Self, Controller<GainMessage>) {
        let (controller, inbox) = control::channel(control::DEFAULT_CAPACITY);
        self.inbox = Some(inbox);
        (self, controller)
    }

    #[inline]
    pub fn gain(&self) -> f32 {
        self.gain
    }
}

impl Unit for Gain {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::audio_in("in"), PortSpec::audio_out("out")]
    }

    fn process(&mut self, io: &mut UnitIo<'_>) {
        if let Some(inbox) = &mut self.inbox {
            for msg in inbox.drain() {
                match msg {
                    GainMessage::SetGain(g) => self.gain = g,
                }
            }
        }

        let Some((input, output)) = io.audio_through(0, 0) else {
            return;
        };

        let smooth_coeff = self.smooth_coeff;
        let target = self.gain;
        let mut gain = self.smoothed_gain;
        for (out, &sample) in output.iter_mut().zip(input.iter()) {
            gain = target + smooth_coeff * (gain - target);
            *out = sample * gain;
        }
        self.smoothed_gain = gain;
    }

    fn panic(&mut self) {
        self.smoothed_gain = self.gain;
    }

    fn graph_updated(&mut self, params: &GraphParams) {
        if let Some(ms) = self.smoothing_ms {
            // Time constant: after `ms` milliseconds we've reached ~63% of target
            let samples = (ms / 1000.0) * params.sample_rate as f32;
            self.smooth_coeff = if samples > 0.0 { (-1.0 / samples).exp() } else { 0.0 };
        }
    }

    fn persistence(&mut self) -> Option<&mut dyn Persistent> {
        Some(self)
    }
}

impl Persistent for Gain {
    fn save_state(&self) -> UnitState {
        UnitState::from([("gain".to_owned(), self.gain.to_string())])
    }

    fn load_state(&mut self, state: &UnitState) -> Result<(), String> {
        if let Some(gain) = state_f32(state, "gain")? {
            self.gain = gain;
            self.smoothed_gain = gain;
        }
        Ok(())
    }
}
