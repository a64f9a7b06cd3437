use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::buffer::{Buffer, Event};
use crate::error::GraphError;
use crate::graph::{Graph, GraphGuard, UnitHandle};
use crate::port::PortId;

use super::{BackendUnit, ClientSpec, Period, ServerHandler};

/// Moves data between a server and a graph, one period at a time.
///
/// Owns the two backend units it registered (audio and event) and designates them
/// as the graph's round roots. After the server shuts down the transport is inert:
/// periods produce silence and port lookups come back empty.
pub struct Transport {
    graph: Graph,
    audio: UnitHandle,
    events: UnitHandle,
    connected: AtomicBool,
    periods: AtomicU64,
    dropped_events: AtomicU64,
}

impl Transport {
    pub(crate) fn new(graph: Graph, client: &ClientSpec) -> Result<Self, GraphError> {
        let (audio, events) = {
            let g = graph.lock();
            let audio =
                g.register_unit(BackendUnit::audio(client.audio_inputs, client.audio_outputs))?;
            let events = match register_roots(&g, client, &audio) {
                Ok(events) => events,
                Err(err) => {
                    let _ = g.unregister_unit(audio.id);
                    return Err(err);
                }
            };
            (audio, events)
        };
        tracing::debug!(
            client = %client.name,
            audio = %audio.id,
            events = %events.id,
            "transport created"
        );
        Ok(Self {
            graph,
            audio,
            events,
            connected: AtomicBool::new(false),
            periods: AtomicU64::new(0),
            dropped_events: AtomicU64::new(0),
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The backend unit carrying audio.
    pub fn audio_unit(&self) -> &UnitHandle {
        &self.audio
    }

    /// The backend unit carrying events.
    pub fn event_unit(&self) -> &UnitHandle {
        &self.events
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    /// Graph output port holding what the server captured on audio input `index`.
    pub fn audio_capture(&self, index: usize) -> Option<PortId> {
        self.live(self.audio.outputs.get(index))
    }

    /// Graph input port whose data the server plays back on audio output `index`.
    pub fn audio_playback(&self, index: usize) -> Option<PortId> {
        self.live(self.audio.inputs.get(index))
    }

    pub fn event_capture(&self, index: usize) -> Option<PortId> {
        self.live(self.events.outputs.get(index))
    }

    pub fn event_playback(&self, index: usize) -> Option<PortId> {
        self.live(self.events.inputs.get(index))
    }

    fn live(&self, port: Option<&PortId>) -> Option<PortId> {
        port.copied().filter(|_| self.is_connected())
    }

    /// Periods processed since creation.
    pub fn periods(&self) -> u64 {
        self.periods.load(Ordering::Relaxed)
    }

    /// Events lost because a server-side or graph-side event buffer was full.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Bring the graph in line with what the server runs at.
    pub(crate) fn apply_server_params(
        &self,
        sample_rate: u32,
        buffer_size: usize,
    ) -> Result<(), GraphError> {
        let g = self.graph.lock();
        let mut params = g.params();
        if params.sample_rate == sample_rate && params.buffer_size == buffer_size {
            return Ok(());
        }
        params.sample_rate = sample_rate;
        params.buffer_size = buffer_size;
        g.set_params(params)
    }

    fn inject(&self, g: &GraphGuard<'_>, period: &Period<'_>) {
        for (port, samples) in self.audio.outputs.iter().zip(period.audio_in) {
            let written = g.with_buffer_mut(*port, |buf| {
                if let Some(audio) = buf.as_audio_mut() {
                    let n = audio.len().min(samples.len());
                    audio.as_mut_slice()[..n].copy_from_slice(&samples[..n]);
                    audio.as_mut_slice()[n..].iter_mut().for_each(|s| *s = 0.0);
                }
            });
            debug_assert!(written.is_ok(), "backend capture port {port} is gone");
        }
        let mut dropped = 0;
        for (port, incoming) in self.events.outputs.iter().zip(period.events_in) {
            let written = g.with_buffer_mut(*port, |buf| {
                if let Some(events) = buf.as_event_mut() {
                    events.clear();
                    for event in incoming {
                        if events.push(*event).is_err() {
                            dropped += 1;
                        }
                    }
                }
            });
            debug_assert!(written.is_ok(), "backend capture port {port} is gone");
        }
        if dropped > 0 {
            self.dropped_events.fetch_add(dropped, Ordering::Relaxed);
        }
    }

    fn collect(&self, g: &GraphGuard<'_>, period: &mut Period<'_>) {
        for (port, samples) in self.audio.inputs.iter().zip(period.audio_out.iter_mut()) {
            let copied = g.with_buffer(*port, |buf| match buf.as_audio() {
                Some(audio) => {
                    let n = audio.len().min(samples.len());
                    samples[..n].copy_from_slice(&audio.as_slice()[..n]);
                    n
                }
                None => 0,
            });
            debug_assert!(copied.is_ok(), "backend playback port {port} is gone");
            samples[copied.unwrap_or(0)..].iter_mut().for_each(|s| *s = 0.0);
        }
        let mut dropped = 0;
        for (port, outgoing) in self.events.inputs.iter().zip(period.events_out.iter_mut()) {
            outgoing.clear();
            let read = g.with_buffer(*port, |buf| {
                if let Buffer::Event(events) = buf {
                    dropped += copy_bounded(events.as_slice(), outgoing);
                }
            });
            debug_assert!(read.is_ok(), "backend playback port {port} is gone");
        }
        if dropped > 0 {
            self.dropped_events.fetch_add(dropped, Ordering::Relaxed);
        }
    }
}

fn register_roots(
    g: &GraphGuard<'_>,
    client: &ClientSpec,
    audio: &UnitHandle,
) -> Result<UnitHandle, GraphError> {
    let events = g.register_unit(BackendUnit::events(client.event_inputs, client.event_outputs))?;
    let designated = g
        .set_title(audio.id, format!("{} audio", client.name))
        .and_then(|()| g.set_title(events.id, format!("{} events", client.name)))
        .and_then(|()| g.register_audio_backend(audio.id))
        .and_then(|()| g.register_event_backend(events.id));
    if let Err(err) = designated {
        let _ = g.unregister_unit(events.id);
        return Err(err);
    }
    Ok(events)
}

/// Append without growing past the vector's capacity. Returns how many were left out.
fn copy_bounded(events: &[Event], out: &mut Vec<Event>) -> u64 {
    let room = out.capacity() - out.len();
    let take = events.len().min(room);
    out.extend_from_slice(&events[..take]);
    (events.len() - take) as u64
}

impl ServerHandler for Transport {
    fn process(&self, period: &mut Period<'_>) {
        if !self.is_connected() {
            period.silence();
            return;
        }
        let g = self.graph.lock();
        if g.params().buffer_size != period.frames {
            // The server skipped the buffer-size callback; resizing here allocates.
            if g.set_buffer_size(period.frames).is_err() {
                period.silence();
                return;
            }
        }
        self.inject(&g, period);
        g.process_round();
        self.collect(&g, period);
        self.periods.fetch_add(1, Ordering::Relaxed);
    }

    fn sample_rate_changed(&self, sample_rate: u32) {
        match self.graph.lock().set_sample_rate(sample_rate) {
            Ok(()) => tracing::info!(sample_rate, "server sample rate changed"),
            Err(err) => tracing::warn!(sample_rate, %err, "ignoring server sample rate"),
        }
    }

    fn buffer_size_changed(&self, frames: usize) {
        match self.graph.lock().set_buffer_size(frames) {
            Ok(()) => tracing::info!(buffer_size = frames, "server buffer size changed"),
            Err(err) => tracing::warn!(buffer_size = frames, %err, "ignoring server buffer size"),
        }
    }

    fn shutdown(&self, reason: &str) {
        self.set_connected(false);
        tracing::warn!(reason, "server shut down, backend disconnected");
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        let g = self.graph.lock();
        if g.in_processing_round() {
            return;
        }
        for unit in [self.audio.id, self.events.id] {
            let _ = g.unregister_unit(unit);
        }
    }
}
