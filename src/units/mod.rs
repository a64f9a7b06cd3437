//! Built-in units.
//!
//! Units are organized into four categories:
//!
//! ## Sources ([`source`])
//!
//! No audio inputs:
//! - [`Constant`] - A fixed value on every sample
//! - [`Sine`] - Sine oscillator, optionally played by note events
//!
//! ## Effects ([`effect`])
//!
//! - [`Passthrough`] - Copies its input unchanged (audio or events)
//! - [`Gain`] - Volume control with smoothing
//! - [`Mixer`] - Per-input levels summed into one output
//!
//! ## Sinks ([`sink`])
//!
//! No outputs:
//! - [`PeakMeter`] - Publishes the peak level of each round
//! - [`Tap`] - Copies audio into a ring buffer for another thread
//!
//! ## Event processors ([`event`])
//!
//! - [`NoteGate`] - Turns held notes into a gate signal
//!
//! # Control
//!
//! Units with runtime parameters have a `controlled()` constructor that also returns
//! a [`Controller`](crate::control::Controller) for their message type. Messages are
//! applied at the start of the next round.

pub mod effect;
pub mod event;
pub mod sink;
pub mod source;

pub use effect::{Gain, GainMessage, Mixer, MixerMessage, Passthrough};
pub use event::NoteGate;
pub use sink::{PeakMeter, PeakReading, Tap, TapReader};
pub use source::{Constant, ConstantMessage, Sine, SineMessage};

use crate::unit::UnitState;

/// Read an `f32` entry from a saved state. Missing keys yield `None`.
pub(crate) fn state_f32(state: &UnitState, key: &str) -> Result<Option<f32>, String> {
    match state.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<f32>()
            .map(Some)
            .map_err(|err| format!("{key}: {err}")),
    }
}
