//! Example: Creating a custom unit
//!
//! This demonstrates how to implement the `Unit` trait for your own processing
//! unit, with message-based parameter control and saved state, and how to render
//! it offline.
//!
//! Run with: cargo run --example custom_unit

use klangnetz::backend::{Backend, ClientSpec, OfflineHost};
use klangnetz::control::{self, Controller, Inbox};
use klangnetz::units::Gain;
use klangnetz::{logging, Graph, GraphParams, Persistent, PortSpec, Unit, UnitIo, UnitState};

// =============================================================================
// Step 1: Define your message type for runtime parameter control
// =============================================================================

/// Messages to control our square wave oscillator
#[derive(Clone, Copy, Debug)]
pub enum SquareMessage {
    /// Set the frequency in Hz
    SetFrequency(f32),
    /// Set the pulse width (0.0 to 1.0, where 0.5 is a standard square wave)
    SetPulseWidth(f32),
}

// =============================================================================
// Step 2: Define your unit with internal state
// =============================================================================

/// A square wave oscillator with variable pulse width
pub struct Square {
    frequency: f32,
    pulse_width: f32,
    amplitude: f32,
    phase: f32,
    inbox: Inbox<SquareMessage>,
}

impl Square {
    pub fn new(frequency: f32) -> (Self, Controller<SquareMessage>) {
        let (controller, inbox) = control::channel(control::DEFAULT_CAPACITY);
        let square = Self {
            frequency,
            pulse_width: 0.5,
            amplitude: 0.25, // -12dB, safe default
            phase: 0.0,
            inbox,
        };
        (square, controller)
    }
}

// =============================================================================
// Step 3: Implement Unit
// =============================================================================

impl Unit for Square {
    fn kind(&self) -> &str {
        "square"
    }

    // A source: no inputs, one output
    fn ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::audio_out("out")]
    }

    fn process(&mut self, io: &mut UnitIo<'_>) {
        // 1. Handle any pending messages
        for msg in self.inbox.drain() {
            match msg {
                SquareMessage::SetFrequency(f) => self.frequency = f.max(0.0),
                SquareMessage::SetPulseWidth(pw) => self.pulse_width = pw.clamp(0.0, 1.0),
            }
        }

        // 2. Generate samples
        let phase_inc = self.frequency / io.context().sample_rate as f32;
        let Some(out) = io.audio_output(0) else {
            return;
        };
        for sample in out.iter_mut() {
            *sample = if self.phase < self.pulse_width {
                self.amplitude
            } else {
                -self.amplitude
            };
            self.phase += phase_inc;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            }
        }
    }

    fn panic(&mut self) {
        self.phase = 0.0;
    }

    fn persistence(&mut self) -> Option<&mut dyn Persistent> {
        Some(self)
    }
}

impl Persistent for Square {
    fn save_state(&self) -> UnitState {
        UnitState::from([
            ("frequency".to_owned(), self.frequency.to_string()),
            ("pulse_width".to_owned(), self.pulse_width.to_string()),
        ])
    }

    fn load_state(&mut self, state: &UnitState) -> Result<(), String> {
        for (key, value) in state {
            let parsed: f32 = value.parse().map_err(|e| format!("{key}: {e}"))?;
            match key.as_str() {
                "frequency" => self.frequency = parsed,
                "pulse_width" => self.pulse_width = parsed,
                _ => {}
            }
        }
        Ok(())
    }
}

// =============================================================================
// Main: Use the custom unit just like built-in units
// =============================================================================

fn main() {
    logging::init();

    let graph = Graph::new(GraphParams::default()).expect("valid parameters");
    let host = OfflineHost::new(48000, 256);
    let client = ClientSpec::new("custom").with_audio(0, 1);
    let mut backend = Backend::new(&graph, host.server(), client).expect("backend units");

    let (square, mut square_control) = Square::new(220.0);
    let square_id = {
        let g = graph.lock();
        let square = g.register_unit(square).unwrap();
        let gain = g.register_unit(Gain::new(0.5)).unwrap();
        g.connect(square.output(0), gain.input(0)).unwrap();
        g.connect(gain.output(0), backend.transport().audio_unit().input(0)).unwrap();
        square.id
    };

    backend.connect().expect("offline server accepts connections");

    // Sweep the pulse width over one second of audio
    let periods = 48000 / 256;
    for period in 0..periods {
        let pw = 0.25 + 0.5 * period as f32 / periods as f32;
        square_control.send(SquareMessage::SetPulseWidth(pw)).ok();
        host.run_period();
    }

    let last = host.playback("custom", 0).unwrap_or_default();
    let peak = last.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    println!("Rendered {periods} periods, last peak {peak:.3}");
    println!("Saved state: {:?}", graph.lock().save_unit_state(square_id).unwrap());
}
