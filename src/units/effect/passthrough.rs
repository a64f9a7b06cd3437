//! Pass-through unit

use crate::buffer::BufferKind;
use crate::port::{Direction, PortSpec};
use crate::unit::{Unit, UnitIo};

/// Copies its single input to its single output unchanged.
///
/// Works for either buffer kind; useful as a bus or a patch point.
pub struct Passthrough {
    kind: BufferKind,
}

impl Passthrough {
    pub const AUDIO_KIND: &'static str = "passthrough";
    pub const EVENT_KIND: &'static str = "event-passthrough";

    pub fn new(kind: BufferKind) -> Self {
        Self { kind }
    }

    pub fn audio() -> Self {
        Self::new(BufferKind::Audio)
    }

    pub fn events() -> Self {
        Self::new(BufferKind::Event)
    }
}

impl Unit for Passthrough {
    fn kind(&self) -> &str {
        match self.kind {
            BufferKind::Audio => Self::AUDIO_KIND,
            BufferKind::Event => Self::EVENT_KIND,
        }
    }

    fn ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::new("in", Direction::Input, self.kind),
            PortSpec::new("out", Direction::Output, self.kind),
        ]
    }

    fn process(&mut self, io: &mut UnitIo<'_>) {
        let (inputs, outputs) = io.split();
        if let (Some(input), Some(output)) = (inputs.first(), outputs.first_mut()) {
            let out = output.buffer_mut();
            out.clear();
            out.mixin(input.buffer());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Event, EventKind};
    use crate::units::testing::Rig;

    #[test]
    fn copies_audio() {
        let mut unit = Passthrough::audio();
        let mut rig = Rig::new(&unit, 8);
        rig.input(0).as_audio_mut().unwrap().fill(0.3);
        rig.run(&mut unit);
        rig.run(&mut unit);
        assert!(rig.audio_out(0).iter().all(|s| *s == 0.3));
    }

    #[test]
    fn copies_events() {
        let mut unit = Passthrough::events();
        let mut rig = Rig::new(&unit, 8);
        let event = Event::new(
            3,
            EventKind::ControlChange {
                channel: 1,
                controller: 7,
                value: 90,
            },
        );
        rig.input(0).as_event_mut().unwrap().push(event).unwrap();
        rig.run(&mut unit);
        rig.run(&mut unit);
        assert_eq!(rig.output(0).as_event().unwrap().as_slice(), &[event]);
    }
}
