use crate::buffer::BufferKind;
use crate::port::{Direction, PortSpec};
use crate::unit::{Persistent, Unit, UnitIo, UnitState};
use crate::units::state_f32;

/// The graph-side face of a server connection.
///
/// Capture ports are outputs: the transport writes what the server captured into
/// them before each round. Playback ports are inputs: pulling them at the start of
/// a round is what drives the rest of the graph. Processing itself does nothing.
#[derive(Clone, Debug)]
pub struct BackendUnit {
    kind: BufferKind,
    captures: usize,
    playbacks: usize,
}

impl BackendUnit {
    pub const AUDIO_KIND: &'static str = "audio-backend";
    pub const EVENT_KIND: &'static str = "event-backend";

    pub fn audio(captures: usize, playbacks: usize) -> Self {
        Self {
            kind: BufferKind::Audio,
            captures,
            playbacks,
        }
    }

    pub fn events(captures: usize, playbacks: usize) -> Self {
        Self {
            kind: BufferKind::Event,
            captures,
            playbacks,
        }
    }

    pub fn buffer_kind(&self) -> BufferKind {
        self.kind
    }

    pub fn captures(&self) -> usize {
        self.captures
    }

    pub fn playbacks(&self) -> usize {
        self.playbacks
    }

    /// Rebuild from a saved state, as written by [`Persistent::save_state`].
    pub fn from_state(kind: &str, state: Option<&UnitState>) -> Option<Self> {
        let count = |key: &str| {
            state
                .and_then(|s| s.get(key))
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(0)
        };
        let (captures, playbacks) = (count("captures"), count("playbacks"));
        match kind {
            Self::AUDIO_KIND => Some(Self::audio(captures, playbacks)),
            Self::EVENT_KIND => Some(Self::events(captures, playbacks)),
            _ => None,
        }
    }
}

impl Unit for BackendUnit {
    fn kind(&self) -> &str {
        match self.kind {
            BufferKind::Audio => Self::AUDIO_KIND,
            BufferKind::Event => Self::EVENT_KIND,
        }
    }

    fn ports(&self) -> Vec<PortSpec> {
        let kind = self.kind;
        (0..self.captures)
            .map(|i| PortSpec::new(format!("capture_{}", i + 1), Direction::Output, kind))
            .chain((0..self.playbacks).map(|i| {
                PortSpec::new(format!("playback_{}", i + 1), Direction::Input, kind)
            }))
            .collect()
    }

    fn process(&mut self, _io: &mut UnitIo<'_>) {}

    fn persistence(&mut self) -> Option<&mut dyn Persistent> {
        Some(self)
    }
}

impl Persistent for BackendUnit {
    fn save_state(&self) -> UnitState {
        UnitState::from([
            ("captures".to_owned(), self.captures.to_string()),
            ("playbacks".to_owned(), self.playbacks.to_string()),
        ])
    }

    /// Port counts are fixed once registered; a state only has to agree with them.
    fn load_state(&mut self, state: &UnitState) -> Result<(), String> {
        for (key, expected) in [("captures", self.captures), ("playbacks", self.playbacks)] {
            let Some(saved) = state_f32(state, key)? else {
                continue;
            };
            if saved as usize != expected {
                return Err(format!("{key} is {saved}, unit has {expected}"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_are_outputs_and_playbacks_inputs() {
        let unit = BackendUnit::audio(2, 1);
        let ports = unit.ports();
        let names: Vec<_> = ports.iter().map(|p| (p.name.as_str(), p.direction)).collect();
        assert_eq!(
            names,
            [
                ("capture_1", Direction::Output),
                ("capture_2", Direction::Output),
                ("playback_1", Direction::Input),
            ]
        );
        assert!(ports.iter().all(|p| p.kind == BufferKind::Audio));
    }

    #[test]
    fn state_round_trips_through_factory_helper() {
        let unit = BackendUnit::events(1, 3);
        let state = unit.save_state();
        let rebuilt = BackendUnit::from_state(BackendUnit::EVENT_KIND, Some(&state)).unwrap();
        assert_eq!(rebuilt.captures(), 1);
        assert_eq!(rebuilt.playbacks(), 3);
        assert_eq!(rebuilt.buffer_kind(), BufferKind::Event);

        let mut other = BackendUnit::events(2, 3);
        assert!(other.load_state(&state).is_err());
    }
}
