//! Sine wave oscillator

use crate::buffer::EventKind;
use crate::control::{self, Controller, Inbox};
use crate::port::PortSpec;
use crate::unit::{Persistent, ProcessContext, Unit, UnitIo, UnitState};
use crate::units::state_f32;

/// Messages to control a [`Sine`] oscillator
#[derive(Clone, Copy, Debug)]
pub enum SineMessage {
    SetFrequency(f32),
    SetAmplitude(f32),
}

/// A mono sine oscillator.
///
/// Runs freely at its frequency. Note-on events on the `notes` input retune it to
/// the note's pitch relative to the graph's master tune, sample-accurately.
pub struct Sine {
    frequency: f32,
    amplitude: f32,
    phase: f32,
    /// Last note played, so master tune changes retune it.
    note: Option<u8>,
    inbox: Option<Inbox<SineMessage>>,
}

impl Sine {
    pub const KIND: &'static str = "sine";

    pub fn new(frequency: f32) -> Self {
        Self {
            frequency: frequency.max(0.0),
            amplitude: 0.25, // -12dB, safe default
            phase: 0.0,
            note: None,
            inbox: None,
        }
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude.clamp(0.0, 1.0);
        self
    }

    /// Attach a message queue and return its sending half.
    pub fn controlled(mut self) -> (Self, Controller<SineMessage>) {
        let (controller, inbox) = control::channel(control::DEFAULT_CAPACITY);
        self.inbox = Some(inbox);
        (self, controller)
    }

    #[inline]
    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    #[inline]
    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }

    fn render(&mut self, ctx: &ProcessContext, out: &mut [f32]) {
        let phase_inc = self.frequency / ctx.sample_rate as f32;
        for sample in out.iter_mut() {
            *sample = (self.phase * core::f32::consts::TAU).sin() * self.amplitude;
            self.phase += phase_inc;
            // Branchless phase wrap (phase is always positive)
            self.phase -= (self.phase >= 1.0) as u32 as f32;
        }
    }
}

impl Unit for Sine {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::event_in("notes"), PortSpec::audio_out("out")]
    }

    fn process(&mut self, io: &mut UnitIo<'_>) {
        if let Some(inbox) = &mut self.inbox {
            for msg in inbox.drain() {
                match msg {
                    SineMessage::SetFrequency(f) => {
                        self.frequency = f.max(0.0);
                        self.note = None;
                    }
                    SineMessage::SetAmplitude(a) => self.amplitude = a.clamp(0.0, 1.0),
                }
            }
        }

        let ctx = *io.context();
        let (inputs, outputs) = io.split();
        let Some(out) = outputs.first_mut().and_then(|p| p.buffer_mut().as_audio_mut()) else {
            return;
        };
        let out = out.as_mut_slice();
        let mut start = 0;
        if let Some(events) = inputs.first().and_then(|p| p.buffer().as_event()) {
            for event in events {
                let EventKind::NoteOn { note, .. } = event.kind else {
                    continue;
                };
                let at = (event.frame as usize).min(out.len());
                self.render(&ctx, &mut out[start..at]);
                start = at;
                self.note = Some(note);
                self.frequency = ctx.note_frequency(note as f32);
            }
        }
        self.render(&ctx, &mut out[start..]);
    }

    fn panic(&mut self) {
        self.phase = 0.0;
    }

    fn graph_updated(&mut self, params: &crate::GraphParams) {
        if let Some(note) = self.note {
            self.frequency = params.master_tune * ((note as f32 - 69.0) / 12.0).exp2();
        }
    }

    fn persistence(&mut self) -> Option<&mut dyn Persistent> {
        Some(self)
    }
}

impl Persistent for Sine {
    fn save_state(&self) -> UnitState {
        UnitState::from([
            ("frequency".to_owned(), self.frequency.to_string()),
            ("amplitude".to_owned(), self.amplitude.to_string()),
        ])
    }

    fn load_state(&mut self, state: &UnitState) -> Result<(), String> {
        let frequency = state_f32(state, "frequency")?;
        let amplitude = state_f32(state, "amplitude")?;
        if let Some(f) = frequency {
            self.frequency = f.max(0.0);
            self.note = None;
        }
        if let Some(a) = amplitude {
            self.amplitude = a.clamp(0.0, 1.0);
        }
        Ok(())
    }
}
