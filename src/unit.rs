//! Core unit trait and context types.

use core::any::Any;
use core::fmt;
use std::collections::BTreeMap;

use crate::buffer::{AudioBuffer, Buffer, EventBuffer};
use crate::graph::GraphParams;
use crate::port::{Port, PortInfo, PortSpec};

/// Identifier of a unit registered with a graph.
///
/// The generation makes ids of unregistered units unusable even if the slot is
/// reused by a later registration.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct UnitId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}.{}", self.index, self.generation)
    }
}

/// Information available during a processing round.
///
/// Passed to every [`Unit::process`] call through [`UnitIo::context`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProcessContext {
    /// Frames per round; every port buffer has this length.
    pub buffer_size: usize,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Tempo in beats per minute.
    pub tempo: f32,
    /// Frequency of A4 in Hz.
    pub master_tune: f32,
    /// Logical timestamp of the current round, incremented by every
    /// `enter_processing_round`.
    pub round: u64,
    /// Frames processed before this round.
    pub frame_time: u64,
}

impl ProcessContext {
    pub(crate) fn from_params(params: &GraphParams) -> Self {
        Self {
            buffer_size: params.buffer_size,
            sample_rate: params.sample_rate,
            tempo: params.tempo,
            master_tune: params.master_tune,
            round: 0,
            frame_time: 0,
        }
    }

    /// Frequency of a MIDI note number relative to the master tune.
    #[inline]
    pub fn note_frequency(&self, note: f32) -> f32 {
        self.master_tune * ((note - 69.0) / 12.0).exp2()
    }

    /// Length of one round in seconds.
    #[inline]
    pub fn round_duration(&self) -> f64 {
        self.buffer_size as f64 / self.sample_rate as f64
    }
}

/// Saved parameters of a unit, as string key/value pairs.
pub type UnitState = BTreeMap<String, String>;

/// Optional capability: units that can save and restore their parameters.
pub trait Persistent {
    fn save_state(&self) -> UnitState;

    /// Apply a saved state. Unknown keys should be ignored; malformed values
    /// reported as an error message.
    fn load_state(&mut self, state: &UnitState) -> Result<(), String>;
}

/// Capabilities a unit advertised when it was registered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub persistent: bool,
}

/// An opaque broadcast delivered to every unit by [`GraphGuard::notify`].
///
/// Any `Send + Debug + 'static` type is a notification; units pick out the kinds
/// they understand with [`downcast_ref`](trait.Notification.html#method.downcast_ref).
///
/// [`GraphGuard::notify`]: crate::GraphGuard::notify
pub trait Notification: Any + Send + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + fmt::Debug> Notification for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn Notification {
    pub fn downcast_ref<T: Notification>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn is<T: Notification>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// The core trait for processing units.
///
/// Units can be:
/// - **Sources**: no inputs, one or more outputs (oscillators, constant generators)
/// - **Effects**: inputs and outputs (gain, mixers, filters)
/// - **Sinks**: inputs only (meters, backend playback, recorders)
///
/// # Evaluation
///
/// A unit is processed at most once per round. When one of its output ports is
/// pulled, all of its input ports are synchronized first (recursively pulling
/// whatever feeds them) and then [`process`](Self::process) runs. A disabled unit is
/// never processed; its outputs read as silence.
///
/// # Real-time rules
///
/// `process` runs on the audio thread: it must not allocate, lock, or block. Use
/// [`control::channel`](crate::control::channel) for parameter updates:
///
/// ```
/// use klangnetz::{control, PortSpec, Unit, UnitIo};
///
/// enum VolumeMessage {
///     Set(f32),
/// }
///
/// struct Volume {
///     level: f32,
///     inbox: control::Inbox<VolumeMessage>,
/// }
///
/// impl Unit for Volume {
///     fn kind(&self) -> &str {
///         "volume"
///     }
///
///     fn ports(&self) -> Vec<PortSpec> {
///         vec![PortSpec::audio_in("in"), PortSpec::audio_out("out")]
///     }
///
///     fn process(&mut self, io: &mut UnitIo<'_>) {
///         for msg in self.inbox.drain() {
///             match msg {
///                 VolumeMessage::Set(level) => self.level = level,
///             }
///         }
///         if let Some((input, output)) = io.audio_through(0, 0) {
///             output.copy_from(input);
///             output.attenuate(self.level);
///         }
///     }
/// }
/// ```
pub trait Unit: Send + 'static {
    /// Kind identifier, used by persistence to recreate the unit.
    fn kind(&self) -> &str;

    /// Ports attached when the unit is registered.
    fn ports(&self) -> Vec<PortSpec> {
        Vec::new()
    }

    /// Process one round: read input buffers, write output buffers.
    fn process(&mut self, io: &mut UnitIo<'_>);

    /// Reset all internal state to silence, immediately.
    fn panic(&mut self) {}

    /// Called after any global parameter change, once buffers have been resized.
    fn graph_updated(&mut self, params: &GraphParams) {
        let _ = params;
    }

    /// Receive a broadcast notification.
    fn notify(&mut self, notification: &dyn Notification) {
        let _ = notification;
    }

    /// The unit's persistence capability, if it has one. Queried once at
    /// registration.
    fn persistence(&mut self) -> Option<&mut dyn Persistent> {
        None
    }
}

/// A unit's view of its ports during [`Unit::process`].
///
/// Input buffers are already synchronized for this round.
pub struct UnitIo<'a> {
    ctx: &'a ProcessContext,
    inputs: &'a [Port],
    outputs: &'a mut [Port],
}

impl<'a> UnitIo<'a> {
    pub(crate) fn new(
        ctx: &'a ProcessContext,
        inputs: &'a [Port],
        outputs: &'a mut [Port],
    ) -> Self {
        Self { ctx, inputs, outputs }
    }

    #[inline]
    pub fn context(&self) -> &ProcessContext {
        self.ctx
    }

    #[inline]
    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    #[inline]
    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    #[inline]
    pub fn input(&self, index: usize) -> Option<&Buffer> {
        self.inputs.get(index).map(Port::buffer)
    }

    #[inline]
    pub fn output(&mut self, index: usize) -> Option<&mut Buffer> {
        self.outputs.get_mut(index).map(Port::buffer_mut)
    }

    #[inline]
    pub fn audio_input(&self, index: usize) -> Option<&AudioBuffer> {
        self.input(index).and_then(Buffer::as_audio)
    }

    #[inline]
    pub fn audio_output(&mut self, index: usize) -> Option<&mut AudioBuffer> {
        self.output(index).and_then(Buffer::as_audio_mut)
    }

    #[inline]
    pub fn event_input(&self, index: usize) -> Option<&EventBuffer> {
        self.input(index).and_then(Buffer::as_event)
    }

    #[inline]
    pub fn event_output(&mut self, index: usize) -> Option<&mut EventBuffer> {
        self.output(index).and_then(Buffer::as_event_mut)
    }

    /// Borrow an audio input and an audio output at the same time.
    pub fn audio_through(
        &mut self,
        input: usize,
        output: usize,
    ) -> Option<(&AudioBuffer, &mut AudioBuffer)> {
        let src = self.inputs.get(input)?.buffer.as_audio()?;
        let dst = self.outputs.get_mut(output)?.buffer.as_audio_mut()?;
        Some((src, dst))
    }

    /// All input ports and all output ports.
    pub fn split(&mut self) -> (&[Port], &mut [Port]) {
        (&*self.inputs, &mut *self.outputs)
    }

    pub fn clear_outputs(&mut self) {
        self.outputs.iter_mut().for_each(|port| port.buffer.clear());
    }
}

/// Read-only description of a registered unit.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitInfo {
    pub id: UnitId,
    pub kind: String,
    pub title: String,
    pub enabled: bool,
    pub capabilities: Capabilities,
    pub inputs: Vec<PortInfo>,
    pub outputs: Vec<PortInfo>,
}

impl UnitInfo {
    pub fn input(&self, name: &str) -> Option<&PortInfo> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&PortInfo> {
        self.outputs.iter().find(|p| p.name == name)
    }
}
