//! The processing graph.
//!
//! [`Graph`] is a cheap, cloneable handle. All work happens through a
//! [`GraphGuard`] obtained from [`Graph::lock`]; the lock is re-entrant, so code
//! already holding a guard on this thread can lock again without deadlocking.
//!
//! Ports live in one arena (`Wiring`, a petgraph `StableGraph`) whose edges are the
//! connections. Units and their port buffers live in a separate generational arena.
//! During a round the wiring is only read, which lets the recursive pull borrow the
//! two independently.

mod sync;
mod units;
mod wiring;

use core::cell::{RefCell, RefMut};
use std::sync::Arc;

use crossbeam_channel::Receiver;
use hashbrown::HashMap;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use petgraph::stable_graph::StableGraph;
use serde::{Deserialize, Serialize};

use crate::buffer::{Buffer, DEFAULT_EVENT_CAPACITY};
use crate::error::GraphError;
use crate::events::{GraphEvent, Observers};
use crate::port::{Direction, PortGroup, PortGroupId, PortId};
use crate::unit::{Notification, ProcessContext, UnitId};

use self::units::Units;

pub use self::wiring::UnitHandle;

/// Global parameters shared by every unit in a graph.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphParams {
    /// Frames per processing round.
    pub buffer_size: usize,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Tempo in beats per minute.
    pub tempo: f32,
    /// Frequency of A4 in Hz.
    pub master_tune: f32,
}

impl Default for GraphParams {
    fn default() -> Self {
        Self {
            buffer_size: 256,
            sample_rate: 48000,
            tempo: 120.0,
            master_tune: 440.0,
        }
    }
}

impl GraphParams {
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.buffer_size == 0 {
            return Err(GraphError::InvalidBufferSize(self.buffer_size));
        }
        if self.sample_rate == 0 {
            return Err(GraphError::InvalidSampleRate(self.sample_rate));
        }
        check_positive("tempo", self.tempo)?;
        check_positive("master tune", self.master_tune)?;
        Ok(())
    }
}

fn check_positive(name: &'static str, value: f32) -> Result<(), GraphError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(GraphError::InvalidParameter { name, value })
    }
}

/// Node weight in the wiring arena: where a port's buffer lives.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PortKey {
    pub(crate) unit: UnitId,
    pub(crate) direction: Direction,
    pub(crate) index: usize,
    pub(crate) serial: u64,
}

/// Port arena; an edge `a -> b` means `a` feeds `b`.
pub(crate) type Wiring = StableGraph<PortKey, ()>;

pub(crate) struct Engine {
    units: Units,
    wiring: Wiring,
    params: GraphParams,
    ctx: ProcessContext,
    in_round: bool,
    frames_processed: u64,
    event_capacity: usize,
    next_port_serial: u64,
    groups: HashMap<PortGroupId, PortGroup>,
    next_group: u32,
    audio_backend: Option<UnitId>,
    event_backend: Option<UnitId>,
    observers: Observers,
}

impl Engine {
    fn new(params: GraphParams, event_capacity: usize) -> Self {
        Self {
            units: Units::default(),
            wiring: Wiring::default(),
            ctx: ProcessContext::from_params(&params),
            params,
            in_round: false,
            frames_processed: 0,
            event_capacity,
            next_port_serial: 0,
            groups: HashMap::new(),
            next_group: 0,
            audio_backend: None,
            event_backend: None,
            observers: Observers::default(),
        }
    }

    fn ensure_idle(&self) -> Result<(), GraphError> {
        if self.in_round {
            Err(GraphError::InsideProcessingRound)
        } else {
            Ok(())
        }
    }

    /// Resolve a port handle, rejecting stale ones.
    fn port_key(&self, port: PortId) -> Result<PortKey, GraphError> {
        match self.wiring.node_weight(port.node) {
            Some(key) if key.serial == port.serial => Ok(*key),
            _ => Err(GraphError::UnknownPort(port)),
        }
    }

    fn port_buffer(&self, port: PortId) -> Result<&Buffer, GraphError> {
        let key = self.port_key(port)?;
        self.units
            .get(key.unit)
            .and_then(|entry| entry.ports(key.direction).get(key.index))
            .map(|p| &p.buffer)
            .ok_or(GraphError::UnknownPort(port))
    }

    fn port_buffer_mut(&mut self, port: PortId) -> Result<&mut Buffer, GraphError> {
        let key = self.port_key(port)?;
        self.units
            .get_mut(key.unit)
            .and_then(|entry| entry.ports_mut(key.direction).get_mut(key.index))
            .map(|p| &mut p.buffer)
            .ok_or(GraphError::UnknownPort(port))
    }

    /// Push the current parameters to every buffer and unit.
    fn propagate_params(&mut self, resize: bool) {
        self.ctx.buffer_size = self.params.buffer_size;
        self.ctx.sample_rate = self.params.sample_rate;
        self.ctx.tempo = self.params.tempo;
        self.ctx.master_tune = self.params.master_tune;

        let frames = self.params.buffer_size;
        let params = self.params;
        for (_, entry) in self.units.iter_mut() {
            if resize {
                entry.all_ports_mut().for_each(|port| port.buffer.resize(frames));
            }
            entry.unit.graph_updated(&params);
        }
        self.observers.emit(GraphEvent::ParametersChanged(params));
    }
}

/// A demand-driven processing graph.
///
/// # Example
///
/// ```
/// use klangnetz::units::{Constant, Passthrough};
/// use klangnetz::{Graph, GraphParams};
///
/// let graph = Graph::new(GraphParams::default()).unwrap();
/// let guard = graph.lock();
///
/// let source = guard.register_unit(Constant::new(1.0)).unwrap();
/// let through = guard.register_unit(Passthrough::audio()).unwrap();
/// guard.connect(source.output(0), through.input(0)).unwrap();
///
/// guard.enter_processing_round();
/// guard.sync(through.output(0)).unwrap();
/// guard.leave_processing_round();
///
/// let peak = guard
///     .with_buffer(through.output(0), |buf| buf.as_audio().unwrap().peak())
///     .unwrap();
/// assert_eq!(peak, 1.0);
/// ```
#[derive(Clone)]
pub struct Graph {
    shared: Arc<ReentrantMutex<RefCell<Engine>>>,
}

impl Graph {
    /// Create an empty graph.
    pub fn new(params: GraphParams) -> Result<Self, GraphError> {
        Self::with_event_capacity(params, DEFAULT_EVENT_CAPACITY)
    }

    /// Create an empty graph whose event ports hold up to `event_capacity` events per round.
    pub fn with_event_capacity(
        params: GraphParams,
        event_capacity: usize,
    ) -> Result<Self, GraphError> {
        params.validate()?;
        tracing::debug!(?params, event_capacity, "creating graph");
        Ok(Self {
            shared: Arc::new(ReentrantMutex::new(RefCell::new(Engine::new(
                params,
                event_capacity,
            )))),
        })
    }

    /// Acquire the graph lock. Re-entrant on the same thread.
    pub fn lock(&self) -> GraphGuard<'_> {
        GraphGuard {
            guard: self.shared.lock(),
        }
    }

    /// Acquire the graph lock without blocking.
    pub fn try_lock(&self) -> Option<GraphGuard<'_>> {
        self.shared.try_lock().map(|guard| GraphGuard { guard })
    }

    pub fn params(&self) -> GraphParams {
        self.lock().params()
    }

    /// Subscribe to topology and parameter changes.
    pub fn subscribe(&self) -> Receiver<GraphEvent> {
        self.lock().engine().observers.subscribe()
    }

    /// True if both handles refer to the same graph.
    pub fn ptr_eq(&self, other: &Graph) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self {
            shared: Arc::new(ReentrantMutex::new(RefCell::new(Engine::new(
                GraphParams::default(),
                DEFAULT_EVENT_CAPACITY,
            )))),
        }
    }
}

/// Exclusive access to a [`Graph`], held for as long as the guard lives.
///
/// Every topology and parameter operation goes through a guard. Units must not call
/// back into the graph from their own callbacks.
pub struct GraphGuard<'a> {
    guard: ReentrantMutexGuard<'a, RefCell<Engine>>,
}

impl GraphGuard<'_> {
    #[inline]
    fn engine(&self) -> RefMut<'_, Engine> {
        self.guard.borrow_mut()
    }

    pub fn params(&self) -> GraphParams {
        self.engine().params
    }

    /// True between `enter_processing_round` and `leave_processing_round`.
    pub fn in_processing_round(&self) -> bool {
        self.engine().in_round
    }

    /// Context of the current (or most recent) round.
    pub fn context(&self) -> ProcessContext {
        self.engine().ctx
    }

    // ---- rounds ----------------------------------------------------------

    /// Start a processing round: clear every unit's processed marker and advance the
    /// round timestamp.
    pub fn enter_processing_round(&self) {
        let mut engine = self.engine();
        let engine = &mut *engine;
        engine.in_round = true;
        engine.ctx.round += 1;
        engine.ctx.frame_time = engine.frames_processed;
        for (_, entry) in engine.units.iter_mut() {
            entry.bumped = false;
        }
    }

    /// Finish a processing round. Units the pull did not reach are processed now, so
    /// every enabled unit produces current data even when it is not connected to a
    /// backend.
    pub fn leave_processing_round(&self) {
        let mut engine = self.engine();
        let Engine {
            units,
            wiring,
            ctx,
            ..
        } = &mut *engine;
        for index in 0..units.capacity() {
            if let Some(id) = units.id_at(index) {
                sync::bump_unit(units, wiring, ctx, id);
            }
        }
        engine.in_round = false;
        engine.frames_processed += engine.params.buffer_size as u64;
    }

    /// Run a complete round: enter, pull through the designated backends, leave.
    pub fn process_round(&self) {
        self.enter_processing_round();
        {
            let mut engine = self.engine();
            let Engine {
                units,
                wiring,
                ctx,
                audio_backend,
                event_backend,
                ..
            } = &mut *engine;
            for root in [*audio_backend, *event_backend].into_iter().flatten() {
                sync::bump_unit(units, wiring, ctx, root);
            }
        }
        self.leave_processing_round();
    }

    /// Synchronize a port for the current round (see [`crate::port`]).
    pub fn sync(&self, port: PortId) -> Result<(), GraphError> {
        let mut engine = self.engine();
        if !engine.in_round {
            return Err(GraphError::OutsideProcessingRound);
        }
        engine.port_key(port)?;
        let Engine { units, wiring, ctx, .. } = &mut *engine;
        sync::sync_port(units, wiring, ctx, port.node);
        Ok(())
    }

    /// Process a unit for the current round if it has not been processed yet.
    pub fn bump(&self, unit: UnitId) -> Result<(), GraphError> {
        let mut engine = self.engine();
        if !engine.in_round {
            return Err(GraphError::OutsideProcessingRound);
        }
        if engine.units.get(unit).is_none() {
            return Err(GraphError::UnknownUnit(unit));
        }
        let Engine { units, wiring, ctx, .. } = &mut *engine;
        sync::bump_unit(units, wiring, ctx, unit);
        Ok(())
    }

    /// Read a port's buffer.
    pub fn with_buffer<R>(
        &self,
        port: PortId,
        f: impl FnOnce(&Buffer) -> R,
    ) -> Result<R, GraphError> {
        let engine = self.engine();
        engine.port_buffer(port).map(f)
    }

    /// Write a port's buffer directly, e.g. to inject captured input.
    pub fn with_buffer_mut<R>(
        &self,
        port: PortId,
        f: impl FnOnce(&mut Buffer) -> R,
    ) -> Result<R, GraphError> {
        let mut engine = self.engine();
        engine.port_buffer_mut(port).map(f)
    }

    /// Copy of a port's buffer. Allocates; meant for the control thread and tests.
    pub fn buffer_snapshot(&self, port: PortId) -> Result<Buffer, GraphError> {
        self.with_buffer(port, Buffer::clone)
    }

    // ---- parameters ------------------------------------------------------

    /// Change the round length, resizing every port buffer.
    pub fn set_buffer_size(&self, buffer_size: usize) -> Result<(), GraphError> {
        let mut engine = self.engine();
        engine.ensure_idle()?;
        if buffer_size == 0 {
            return Err(GraphError::InvalidBufferSize(buffer_size));
        }
        tracing::info!(buffer_size, "graph buffer size changed");
        engine.params.buffer_size = buffer_size;
        engine.propagate_params(true);
        Ok(())
    }

    /// Change the sample rate. Buffers are cleared and units notified.
    pub fn set_sample_rate(&self, sample_rate: u32) -> Result<(), GraphError> {
        let mut engine = self.engine();
        engine.ensure_idle()?;
        if sample_rate == 0 {
            return Err(GraphError::InvalidSampleRate(sample_rate));
        }
        tracing::info!(sample_rate, "graph sample rate changed");
        engine.params.sample_rate = sample_rate;
        engine.propagate_params(true);
        Ok(())
    }

    pub fn set_tempo(&self, tempo: f32) -> Result<(), GraphError> {
        let mut engine = self.engine();
        engine.ensure_idle()?;
        check_positive("tempo", tempo)?;
        tracing::debug!(tempo, "graph tempo changed");
        engine.params.tempo = tempo;
        engine.propagate_params(false);
        Ok(())
    }

    pub fn set_master_tune(&self, master_tune: f32) -> Result<(), GraphError> {
        let mut engine = self.engine();
        engine.ensure_idle()?;
        check_positive("master tune", master_tune)?;
        tracing::debug!(master_tune, "graph master tune changed");
        engine.params.master_tune = master_tune;
        engine.propagate_params(false);
        Ok(())
    }

    /// Replace all parameters at once.
    pub fn set_params(&self, params: GraphParams) -> Result<(), GraphError> {
        let mut engine = self.engine();
        engine.ensure_idle()?;
        params.validate()?;
        let resize = params.buffer_size != engine.params.buffer_size
            || params.sample_rate != engine.params.sample_rate;
        tracing::info!(?params, "graph parameters changed");
        engine.params = params;
        engine.propagate_params(resize);
        Ok(())
    }

    /// Maximum number of events each event port holds per round. Growing it
    /// reallocates event buffers; shrinking only applies to ports created later.
    pub fn set_event_capacity(&self, event_capacity: usize) -> Result<(), GraphError> {
        let mut engine = self.engine();
        engine.ensure_idle()?;
        engine.event_capacity = event_capacity;
        for (_, entry) in engine.units.iter_mut() {
            for port in entry.all_ports_mut() {
                if let Buffer::Event(events) = &mut port.buffer {
                    events.reserve_capacity(event_capacity);
                }
            }
        }
        Ok(())
    }

    pub fn event_capacity(&self) -> usize {
        self.engine().event_capacity
    }

    // ---- broadcasts ------------------------------------------------------

    /// Silence everything immediately: every unit resets its state and every port
    /// buffer is cleared.
    pub fn panic(&self) {
        let mut engine = self.engine();
        tracing::warn!(units = engine.units.len(), "panic: silencing all units");
        for (_, entry) in engine.units.iter_mut() {
            entry.unit.panic();
            entry.all_ports_mut().for_each(|port| port.buffer.clear());
        }
        engine.observers.emit(GraphEvent::Panic);
    }

    /// Deliver a notification to every unit, then drop it.
    pub fn notify<N: Notification>(&self, notification: N) {
        let mut engine = self.engine();
        tracing::trace!(?notification, "broadcasting notification");
        for (_, entry) in engine.units.iter_mut() {
            entry.unit.notify(&notification);
        }
    }
}
