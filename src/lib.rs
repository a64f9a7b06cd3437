//! Klangnetz - a demand-driven graph of audio and event processing units
//!
//! Design principles:
//! - Units own their ports; ports own their buffers; connections are edges
//! - A round is driven by pulling the backend's playback ports, and every unit is
//!   processed at most once per round
//! - One re-entrant lock serializes topology changes and rounds
//! - Parameters reach running units through lock-free message queues
//! - Servers (offline, cpal) are adapters; the graph does not know which one runs it
//!
//! # Example
//!
//! ```
//! use klangnetz::backend::{Backend, ClientSpec, OfflineHost};
//! use klangnetz::units::{Gain, Sine};
//! use klangnetz::{Graph, GraphParams};
//!
//! let graph = Graph::new(GraphParams::default()).unwrap();
//! let host = OfflineHost::new(48000, 256);
//! let mut backend = Backend::new(&graph, host.server(), ClientSpec::new("demo")).unwrap();
//!
//! {
//!     let g = graph.lock();
//!     let sine = g.register_unit(Sine::new(440.0)).unwrap();
//!     let gain = g.register_unit(Gain::new(0.5)).unwrap();
//!     g.connect(sine.output(0), gain.input(0)).unwrap();
//!     for playback in backend.transport().audio_unit().inputs.clone() {
//!         g.connect(gain.output(0), playback).unwrap();
//!     }
//! }
//!
//! backend.connect().unwrap();
//! host.run_periods(4);
//! let left = host.playback("demo", 0).unwrap();
//! assert!(left.iter().any(|s| *s != 0.0));
//! ```

pub mod backend;
pub mod buffer;
pub mod config;
pub mod context;
pub mod control;
pub mod diagnostics;
pub mod error;
pub mod events;
mod graph;
pub mod logging;
pub mod port;
pub mod topology;
pub mod unit;
pub mod units;
pub mod workers;

pub use buffer::{AudioBuffer, Buffer, BufferKind, Event, EventBuffer, EventKind};
pub use config::Config;
pub use context::Context;
pub use error::{BackendError, ConfigError, ContextError, GraphError, WorkerError};
pub use events::{BackendRole, GraphEvent};
pub use graph::{Graph, GraphGuard, GraphParams, UnitHandle};
pub use port::{Direction, PortGroup, PortGroupId, PortId, PortInfo, PortSpec};
pub use topology::{BuiltinFactory, Topology, UnitFactory};
pub use unit::{
    Capabilities, Notification, Persistent, ProcessContext, Unit, UnitId, UnitInfo, UnitIo,
    UnitState,
};
