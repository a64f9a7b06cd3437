//! Constant value source

use crate::control::{self, Controller, Inbox};
use crate::port::PortSpec;
use crate::unit::{Persistent, Unit, UnitIo, UnitState};
use crate::units::state_f32;

/// Messages to control a [`Constant`]
#[derive(Clone, Copy, Debug)]
pub enum ConstantMessage {
    SetValue(f32),
}

/// Writes the same value to every sample of its single audio output.
///
/// Mostly useful as a DC offset, a control signal, or in tests.
pub struct Constant {
    value: f32,
    inbox: Option<Inbox<ConstantMessage>>,
}

impl Constant {
    pub const KIND: &'static str = "constant";

    pub fn new(value: f32) -> Self {
        Self { value, inbox: None }
    }

    /// Attach a message queue and return its sending half.
    pub fn controlled(mut self) -> (Self, Controller<ConstantMessage>) {
        let (controller, inbox) = control::channel(control::DEFAULT_CAPACITY);
        self.inbox = Some(inbox);
        (self, controller)
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }
}

impl Unit for Constant {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::audio_out("out")]
    }

    fn process(&mut self, io: &mut UnitIo<'_>) {
        if let Some(inbox) = &mut self.inbox {
            for msg in inbox.drain() {
                match msg {
                    ConstantMessage::SetValue(v) => self.value = v,
                }
            }
        }
        if let Some(out) = io.audio_output(0) {
            out.fill(self.value);
        }
    }

    fn persistence(&mut self) -> Option<&mut dyn Persistent> {
        Some(self)
    }
}

impl Persistent for Constant {
    fn save_state(&self) -> UnitState {
        UnitState::from([("value".to_owned(), self.value.to_string())])
    }

    fn load_state(&mut self, state: &UnitState) -> Result<(), String> {
        if let Some(value) = state_f32(state, "value")? {
            self.value = value;
        }
        Ok(())
    }
}
