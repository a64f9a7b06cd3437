//! Note gate: events in, gate signal out

use crate::buffer::EventKind;
use crate::port::PortSpec;
use crate::unit::{Unit, UnitIo};

/// Outputs `level` while at least one note is held and `0.0` otherwise.
///
/// Note on/off events switch the gate at their exact frame. All-notes-off
/// (controller 123) releases everything.
pub struct NoteGate {
    /// One bit per note number, shared across channels
    held: u128,
    level: f32,
}

impl NoteGate {
    pub const KIND: &'static str = "note-gate";

    const ALL_NOTES_OFF: u8 = 123;

    pub fn new() -> Self {
        Self { held: 0, level: 1.0 }
    }

    pub fn with_level(mut self, level: f32) -> Self {
        self.level = level;
        self
    }

    /// True while any note is held.
    pub fn is_open(&self) -> bool {
        self.held != 0
    }

    fn apply(&mut self, kind: EventKind) {
        match kind {
            EventKind::NoteOn { note, .. } => self.held |= 1u128 << (note & 0x7f),
            EventKind::NoteOff { note, .. } => self.held &= !(1u128 << (note & 0x7f)),
            EventKind::ControlChange { controller, .. } if controller == Self::ALL_NOTES_OFF => {
                self.held = 0
            }
            _ => {}
        }
    }

    fn current(&self) -> f32 {
        if self.is_open() {
            self.level
        } else {
            0.0
        }
    }
}

impl Default for NoteGate {
    fn default() -> Self {
        Self::new()
    }
}

impl Unit for NoteGate {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::event_in("notes"), PortSpec::audio_out("gate")]
    }

    fn process(&mut self, io: &mut UnitIo<'_>) {
        let (inputs, outputs) = io.split();
        let Some(out) = outputs.first_mut().and_then(|p| p.buffer_mut().as_audio_mut()) else {
            return;
        };
        let out = out.as_mut_slice();
        let mut start = 0;
        if let Some(events) = inputs.first().and_then(|p| p.buffer().as_event()) {
            for event in events {
                let at = (event.frame as usize).min(out.len());
                out[start..at].fill(self.current());
                start = at;
                self.apply(event.kind);
            }
        }
        out[start..].fill(self.current());
    }

    fn panic(&mut self) {
        self.held = 0;
    }
}
