//! Mixer effect - sums multiple inputs with individual levels

use crate::control::{self, Controller, Inbox};
use crate::port::PortSpec;
use crate::unit::{Persistent, Unit, UnitIo, UnitState};
use crate::units::state_f32;

/// Messages to control a [`Mixer`]
#[derive(Clone, Copy, Debug)]
pub enum MixerMessage {
    /// Set the level of one input channel
    SetLevel { input: usize, level: f32 },
    /// Set the level applied after summing
    SetMaster(f32),
}

/// Sums `channels` audio inputs into one output, each with its own level.
///
/// Every input port already sums whatever is connected to it; the mixer adds
/// per-channel levels on top of that.
pub struct Mixer {
    levels: Vec<f32>,
    master: f32,
    inbox: Option<Inbox<MixerMessage>>,
}

impl Mixer {
    pub const KIND: &'static str = "mixer";

    /// Create a new mixer with `channels` inputs at unity level
    pub fn new(channels: usize) -> Self {
        Self {
            levels: vec![1.0; channels.max(1)],
            master: 1.0,
            inbox: None,
        }
    }

    pub fn stereo() -> Self {
        Self::new(2)
    }

    /// Attach a message queue and return its sending half.
    pub fn controlled(mut self) -> (Self, Controller<MixerMessage>) {
        let (controller, inbox) = control::channel(control::DEFAULT_CAPACITY);
        self.inbox = Some(inbox);
        (self, controller)
    }

    pub fn channels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, input: usize) -> Option<f32> {
        self.levels.get(input).copied()
    }
}

impl Unit for Mixer {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn ports(&self) -> Vec<PortSpec> {
        let mut ports: Vec<PortSpec> = (0..self.levels.len())
            .map(|i| PortSpec::audio_in(format!("in_{i}")))
            .collect();
        ports.push(PortSpec::audio_out("out"));
        ports
    }

    fn process(&mut self, io: &mut UnitIo<'_>) {
        if let Some(inbox) = &mut self.inbox {
            for msg in inbox.drain() {
                match msg {
                    MixerMessage::SetLevel { input, level } => {
                        if let Some(slot) = self.levels.get_mut(input) {
                            *slot = level;
                        }
                    }
                    MixerMessage::SetMaster(level) => self.master = level,
                }
            }
        }

        let (inputs, outputs) = io.split();
        let Some(out) = outputs.first_mut().and_then(|p| p.buffer_mut().as_audio_mut()) else {
            return;
        };
        out.clear();
        for (port, &level) in inputs.iter().zip(self.levels.iter()) {
            let Some(input) = port.buffer().as_audio() else {
                continue;
            };
            if level == 0.0 {
                continue;
            }
            for (o, &i) in out.iter_mut().zip(input.iter()) {
                *o += i * level;
            }
        }
        if self.master != 1.0 {
            out.attenuate(self.master);
        }
    }

    fn persistence(&mut self) -> Option<&mut dyn Persistent> {
        Some(self)
    }
}

impl Persistent for Mixer {
    fn save_state(&self) -> UnitState {
        let mut state: UnitState = self
            .levels
            .iter()
            .enumerate()
            .map(|(i, level)| (format!("level_{i}"), level.to_string()))
            .collect();
        state.insert("master".to_owned(), self.master.to_string());
        state
    }

    fn load_state(&mut self, state: &UnitState) -> Result<(), String> {
        let mut levels = self.levels.clone();
        for (i, level) in levels.iter_mut().enumerate() {
            if let Some(v) = state_f32(state, &format!("level_{i}"))? {
                *level = v;
            }
        }
        if let Some(master) = state_f32(state, "master")? {
            self.master = master;
        }
        self.levels = levels;
        Ok(())
    }
}
