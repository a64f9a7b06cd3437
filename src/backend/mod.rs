//! Bridges between a real-time audio/event server and a [`Graph`].
//!
//! A [`Server`] owns the connection to the outside world and calls a
//! [`ServerHandler`] from its real-time thread. The handler provided here is the
//! [`Transport`]: once per period it injects captured data into the graph's backend
//! units, runs a processing round and copies the playback data back out.
//!
//! [`Backend`] ties a server and a transport together and is what applications use:
//!
//! ```
//! use klangnetz::backend::{Backend, ClientSpec, OfflineHost};
//! use klangnetz::{Graph, GraphParams};
//!
//! let graph = Graph::new(GraphParams::default()).unwrap();
//! let host = OfflineHost::new(48000, 256);
//! let mut backend = Backend::new(&graph, host.server(), ClientSpec::new("demo")).unwrap();
//!
//! backend.connect().unwrap();
//! host.run_period();
//! assert_eq!(host.playback("demo", 0).unwrap().len(), 256);
//! ```

mod offline;
mod transport;
mod units;

#[cfg(feature = "cpal_backend")]
mod cpal;

use std::sync::Arc;

use crate::buffer::Event;
use crate::config::BackendSettings;
use crate::error::{BackendError, GraphError};
use crate::graph::Graph;

pub use self::offline::{OfflineHost, OfflineServer};
pub use self::transport::Transport;
pub use self::units::BackendUnit;

#[cfg(feature = "cpal_backend")]
pub use self::cpal::{CpalDevice, CpalServer};

/// How a client presents itself to a server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientSpec {
    pub name: String,
    pub audio_inputs: usize,
    pub audio_outputs: usize,
    pub event_inputs: usize,
    pub event_outputs: usize,
}

impl ClientSpec {
    /// Stereo audio in and out, one event port each way.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            audio_inputs: 2,
            audio_outputs: 2,
            event_inputs: 1,
            event_outputs: 1,
        }
    }

    pub fn with_audio(mut self, inputs: usize, outputs: usize) -> Self {
        self.audio_inputs = inputs;
        self.audio_outputs = outputs;
        self
    }

    pub fn with_events(mut self, inputs: usize, outputs: usize) -> Self {
        self.event_inputs = inputs;
        self.event_outputs = outputs;
        self
    }
}

impl From<&BackendSettings> for ClientSpec {
    fn from(settings: &BackendSettings) -> Self {
        Self {
            name: settings.client_name.clone(),
            audio_inputs: settings.audio_inputs,
            audio_outputs: settings.audio_outputs,
            event_inputs: settings.event_inputs,
            event_outputs: settings.event_outputs,
        }
    }
}

/// What a server reported when a client connected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerInfo {
    pub server_name: String,
    pub sample_rate: u32,
    pub buffer_size: usize,
}

/// Data exchanged with the server for one period.
///
/// Audio is planar, one vector per port. Event vectors are cleared by the server
/// and must not grow past their capacity.
pub struct Period<'a> {
    pub frames: usize,
    pub audio_in: &'a [Vec<f32>],
    pub audio_out: &'a mut [Vec<f32>],
    pub events_in: &'a [Vec<Event>],
    pub events_out: &'a mut [Vec<Event>],
}

impl Period<'_> {
    /// Zero every output.
    pub fn silence(&mut self) {
        for channel in self.audio_out.iter_mut() {
            channel.iter_mut().for_each(|s| *s = 0.0);
        }
        for events in self.events_out.iter_mut() {
            events.clear();
        }
    }
}

/// Callbacks a server makes into its client.
///
/// `process` runs on the server's real-time thread; the others may run on any
/// thread, but never concurrently with `process` for the same period.
pub trait ServerHandler: Send + Sync {
    fn process(&self, period: &mut Period<'_>);

    fn sample_rate_changed(&self, sample_rate: u32);

    fn buffer_size_changed(&self, frames: usize);

    /// The server went away. The client must treat itself as disconnected.
    fn shutdown(&self, reason: &str);
}

/// A connection to a real-time server.
pub trait Server {
    /// Name of the server implementation, for logs and errors.
    fn name(&self) -> &str;

    fn connect(
        &mut self,
        client: &ClientSpec,
        handler: Arc<dyn ServerHandler>,
    ) -> Result<ServerInfo, BackendError>;

    fn disconnect(&mut self) -> Result<(), BackendError>;

    fn is_connected(&self) -> bool;
}

/// A server connection driving a graph through a [`Transport`].
///
/// Connection failures are reported as [`BackendError`]s; the graph keeps working
/// without the backend and the connection can be retried.
pub struct Backend<S: Server> {
    server: S,
    client: ClientSpec,
    transport: Arc<Transport>,
}

impl<S: Server> Backend<S> {
    /// Register the backend units in `graph` and designate them as the round roots.
    /// Nothing is connected yet.
    pub fn new(graph: &Graph, server: S, client: ClientSpec) -> Result<Self, GraphError> {
        let transport = Arc::new(Transport::new(graph.clone(), &client)?);
        Ok(Self {
            server,
            client,
            transport,
        })
    }

    pub fn connect(&mut self) -> Result<ServerInfo, BackendError> {
        if self.server.is_connected() {
            return Err(BackendError::AlreadyConnected);
        }
        let handler: Arc<dyn ServerHandler> = self.transport.clone();
        let info = match self.server.connect(&self.client, handler) {
            Ok(info) => info,
            Err(err) => {
                tracing::warn!(
                    server = self.server.name(),
                    client = %self.client.name,
                    %err,
                    "backend connection failed"
                );
                return Err(err);
            }
        };
        if let Err(err) = self.transport.apply_server_params(info.sample_rate, info.buffer_size) {
            let _ = self.server.disconnect();
            return Err(err.into());
        }
        self.transport.set_connected(true);
        tracing::info!(
            server = %info.server_name,
            client = %self.client.name,
            sample_rate = info.sample_rate,
            buffer_size = info.buffer_size,
            "backend connected"
        );
        Ok(info)
    }

    pub fn disconnect(&mut self) -> Result<(), BackendError> {
        if !self.server.is_connected() {
            return Err(BackendError::NotConnected);
        }
        self.transport.set_connected(false);
        self.server.disconnect()?;
        tracing::info!(client = %self.client.name, "backend disconnected");
        Ok(())
    }

    /// Connected to the server, and the server has not shut down since.
    pub fn is_connected(&self) -> bool {
        self.server.is_connected() && self.transport.is_connected()
    }

    pub fn client(&self) -> &ClientSpec {
        &self.client
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn server(&self) -> &S {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut S {
        &mut self.server
    }
}
