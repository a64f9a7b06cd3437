//! An in-process server driven by hand.
//!
//! Nothing runs on its own: the owner of an [`OfflineHost`] decides when a period
//! happens, what was captured and what the server does next. Used for rendering
//! to memory and for tests.

use std::sync::Arc;

use hashbrown::HashMap;
use itertools::Itertools;
use parking_lot::Mutex;

use crate::buffer::{Event, DEFAULT_EVENT_CAPACITY};
use crate::error::BackendError;

use super::{ClientSpec, Period, Server, ServerHandler, ServerInfo};

const SERVER_NAME: &str = "offline";

struct ClientSlot {
    handler: Arc<dyn ServerHandler>,
    audio_in: Vec<Vec<f32>>,
    audio_out: Vec<Vec<f32>>,
    events_in: Vec<Vec<Event>>,
    events_out: Vec<Vec<Event>>,
}

impl ClientSlot {
    fn new(spec: &ClientSpec, handler: Arc<dyn ServerHandler>, frames: usize) -> Self {
        Self {
            handler,
            audio_in: vec![vec![0.0; frames]; spec.audio_inputs],
            audio_out: vec![vec![0.0; frames]; spec.audio_outputs],
            events_in: (0..spec.event_inputs)
                .map(|_| Vec::with_capacity(DEFAULT_EVENT_CAPACITY))
                .collect(),
            events_out: (0..spec.event_outputs)
                .map(|_| Vec::with_capacity(DEFAULT_EVENT_CAPACITY))
                .collect(),
        }
    }

    fn resize(&mut self, frames: usize) {
        for channel in self.audio_in.iter_mut().chain(self.audio_out.iter_mut()) {
            channel.clear();
            channel.resize(frames, 0.0);
        }
    }

    fn run(&mut self, frames: usize) {
        let mut period = Period {
            frames,
            audio_in: &self.audio_in,
            audio_out: &mut self.audio_out,
            events_in: &self.events_in,
            events_out: &mut self.events_out,
        };
        self.handler.process(&mut period);
        // Queued events are delivered once.
        self.events_in.iter_mut().for_each(Vec::clear);
    }
}

struct HostState {
    available: bool,
    sample_rate: u32,
    buffer_size: usize,
    clients: HashMap<String, ClientSlot>,
}

/// A manually clocked server. Cheap to clone; clones share one server.
#[derive(Clone)]
pub struct OfflineHost {
    state: Arc<Mutex<HostState>>,
}

impl OfflineHost {
    pub fn new(sample_rate: u32, buffer_size: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(HostState {
                available: true,
                sample_rate,
                buffer_size,
                clients: HashMap::new(),
            })),
        }
    }

    /// A connection handle for one client.
    pub fn server(&self) -> OfflineServer {
        OfflineServer {
            host: self.clone(),
            client: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.state.lock().sample_rate
    }

    pub fn buffer_size(&self) -> usize {
        self.state.lock().buffer_size
    }

    /// Make the server refuse (or accept again) new connections.
    pub fn set_available(&self, available: bool) {
        self.state.lock().available = available;
    }

    pub fn clients(&self) -> Vec<String> {
        self.state.lock().clients.keys().cloned().sorted().collect()
    }

    /// Run one period for every connected client. Returns how many ran.
    pub fn run_period(&self) -> usize {
        let mut state = self.state.lock();
        let frames = state.buffer_size;
        for slot in state.clients.values_mut() {
            slot.run(frames);
        }
        state.clients.len()
    }

    pub fn run_periods(&self, count: usize) {
        for _ in 0..count {
            self.run_period();
        }
    }

    /// Set what audio input `channel` of `client` captures from now on. Shorter data
    /// is padded with silence, longer data truncated.
    pub fn set_capture(
        &self,
        client: &str,
        channel: usize,
        samples: &[f32],
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let target = slot_mut(&mut state, client)?
            .audio_in
            .get_mut(channel)
            .ok_or_else(|| missing_port(client, "audio input", channel))?;
        let n = target.len().min(samples.len());
        target[..n].copy_from_slice(&samples[..n]);
        target[n..].iter_mut().for_each(|s| *s = 0.0);
        Ok(())
    }

    /// Queue an event on event input `port` of `client` for the next period.
    pub fn queue_event(&self, client: &str, port: usize, event: Event) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let queue = slot_mut(&mut state, client)?
            .events_in
            .get_mut(port)
            .ok_or_else(|| missing_port(client, "event input", port))?;
        if queue.len() == queue.capacity() {
            return Err(BackendError::stream("event queue is full"));
        }
        let at = queue.partition_point(|e| e.frame <= event.frame);
        queue.insert(at, event);
        Ok(())
    }

    /// What audio output `channel` of `client` played in the last period.
    pub fn playback(&self, client: &str, channel: usize) -> Option<Vec<f32>> {
        let state = self.state.lock();
        state.clients.get(client)?.audio_out.get(channel).cloned()
    }

    /// Events event output `port` of `client` sent in the last period.
    pub fn playback_events(&self, client: &str, port: usize) -> Option<Vec<Event>> {
        let state = self.state.lock();
        state.clients.get(client)?.events_out.get(port).cloned()
    }

    /// Switch the server's sample rate and tell every client.
    pub fn change_sample_rate(&self, sample_rate: u32) {
        let handlers = {
            let mut state = self.state.lock();
            state.sample_rate = sample_rate;
            handlers(&state)
        };
        tracing::debug!(
            sample_rate,
            clients = handlers.len(),
            "offline server sample rate changed"
        );
        for handler in handlers {
            handler.sample_rate_changed(sample_rate);
        }
    }

    /// Switch the period length and tell every client.
    pub fn change_buffer_size(&self, frames: usize) {
        let handlers = {
            let mut state = self.state.lock();
            state.buffer_size = frames;
            state.clients.values_mut().for_each(|slot| slot.resize(frames));
            handlers(&state)
        };
        tracing::debug!(
            buffer_size = frames,
            clients = handlers.len(),
            "offline server buffer size changed"
        );
        for handler in handlers {
            handler.buffer_size_changed(frames);
        }
    }

    /// Stop the server: every client is dropped and told why. The server stays
    /// unavailable until [`set_available`](Self::set_available) is called.
    pub fn shutdown(&self, reason: &str) {
        let slots: Vec<ClientSlot> = {
            let mut state = self.state.lock();
            state.available = false;
            state.clients.drain().map(|(_, slot)| slot).collect()
        };
        tracing::debug!(reason, clients = slots.len(), "offline server shutting down");
        for slot in slots {
            slot.handler.shutdown(reason);
        }
    }
}

fn handlers(state: &HostState) -> Vec<Arc<dyn ServerHandler>> {
    state.clients.values().map(|slot| slot.handler.clone()).collect()
}

fn slot_mut<'a>(
    state: &'a mut HostState,
    client: &str,
) -> Result<&'a mut ClientSlot, BackendError> {
    state.clients.get_mut(client).ok_or(BackendError::NotConnected)
}

fn missing_port(client: &str, what: &str, index: usize) -> BackendError {
    BackendError::PortRegistration {
        name: format!("{client}:{what} {index}"),
        reason: "no such port".into(),
    }
}

/// One client's connection to an [`OfflineHost`].
pub struct OfflineServer {
    host: OfflineHost,
    client: Option<String>,
}

impl OfflineServer {
    pub fn host(&self) -> &OfflineHost {
        &self.host
    }

    /// Name this connection registered under, while connected.
    pub fn client_name(&self) -> Option<&str> {
        self.client.as_deref()
    }
}

impl Server for OfflineServer {
    fn name(&self) -> &str {
        SERVER_NAME
    }

    fn connect(
        &mut self,
        client: &ClientSpec,
        handler: Arc<dyn ServerHandler>,
    ) -> Result<ServerInfo, BackendError> {
        if self.is_connected() {
            return Err(BackendError::AlreadyConnected);
        }
        let mut state = self.host.state.lock();
        if !state.available {
            return Err(BackendError::ServerUnavailable(SERVER_NAME.to_owned()));
        }
        if state.clients.contains_key(&client.name) {
            return Err(BackendError::NameConflict(client.name.clone()));
        }
        let slot = ClientSlot::new(client, handler, state.buffer_size);
        state.clients.insert(client.name.clone(), slot);
        self.client = Some(client.name.clone());
        Ok(ServerInfo {
            server_name: SERVER_NAME.to_owned(),
            sample_rate: state.sample_rate,
            buffer_size: state.buffer_size,
        })
    }

    fn disconnect(&mut self) -> Result<(), BackendError> {
        let name = self.client.take().ok_or(BackendError::NotConnected)?;
        match self.host.state.lock().clients.remove(&name) {
            Some(_) => Ok(()),
            None => Err(BackendError::NotConnected),
        }
    }

    fn is_connected(&self) -> bool {
        match &self.client {
            Some(name) => self.host.state.lock().clients.contains_key(name),
            None => false,
        }
    }
}

impl Drop for OfflineServer {
    fn drop(&mut self) {
        if let Some(name) = self.client.take() {
            self.host.state.lock().clients.remove(&name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        periods: AtomicUsize,
        shutdowns: AtomicUsize,
    }

    impl ServerHandler for Counter {
        fn process(&self, period: &mut Period<'_>) {
            self.periods.fetch_add(1, Ordering::Relaxed);
            for (out, input) in period.audio_out.iter_mut().zip(period.audio_in) {
                out.copy_from_slice(input);
            }
        }

        fn sample_rate_changed(&self, _sample_rate: u32) {}

        fn buffer_size_changed(&self, _frames: usize) {}

        fn shutdown(&self, _reason: &str) {
            self.shutdowns.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn names_are_unique_per_host() {
        let host = OfflineHost::new(48000, 64);
        let mut a = host.server();
        let mut b = host.server();
        a.connect(&ClientSpec::new("synth"), Arc::new(Counter::default())).unwrap();
        let err = b.connect(&ClientSpec::new("synth"), Arc::new(Counter::default())).unwrap_err();
        assert_eq!(err, BackendError::NameConflict("synth".into()));
        assert!(!b.is_connected());

        a.disconnect().unwrap();
        b.connect(&ClientSpec::new("synth"), Arc::new(Counter::default())).unwrap();
    }

    #[test]
    fn unavailable_host_refuses_connections() {
        let host = OfflineHost::new(48000, 64);
        host.set_available(false);
        let mut server = host.server();
        let err = server.connect(&ClientSpec::new("x"), Arc::new(Counter::default())).unwrap_err();
        assert_eq!(err, BackendError::ServerUnavailable("offline".into()));
    }

    #[test]
    fn capture_reaches_playback_and_shutdown_disconnects() {
        let host = OfflineHost::new(48000, 4);
        let counter = Arc::new(Counter::default());
        let mut server = host.server();
        server.connect(&ClientSpec::new("loop"), counter.clone()).unwrap();

        host.set_capture("loop", 1, &[0.5, 0.25]).unwrap();
        assert_eq!(host.run_period(), 1);
        assert_eq!(host.playback("loop", 1).unwrap(), vec![0.5, 0.25, 0.0, 0.0]);

        host.shutdown("maintenance");
        assert!(!server.is_connected());
        assert_eq!(counter.shutdowns.load(Ordering::Relaxed), 1);
        assert_eq!(host.run_period(), 0);
        assert_eq!(counter.periods.load(Ordering::Relaxed), 1);
        assert!(host.playback("loop", 0).is_none());
    }
}
