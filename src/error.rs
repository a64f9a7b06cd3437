//! Error types.
//!
//! Topology and parameter misuse surfaces as [`GraphError`] on the control thread.
//! Server connectivity problems are [`BackendError`]s; they are recoverable and the
//! graph keeps running without the affected backend.

use std::path::PathBuf;

use thiserror::Error;

use crate::buffer::BufferKind;
use crate::port::{Direction, PortGroupId, PortId};
use crate::unit::UnitId;

/// Errors raised by topology and parameter operations on a [`Graph`](crate::Graph).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    /// Topology or parameter mutation attempted between
    /// `enter_processing_round` and `leave_processing_round`.
    #[error("graph cannot be modified while a processing round is active")]
    InsideProcessingRound,

    /// Synchronization requested while no processing round is active.
    #[error("no processing round is active")]
    OutsideProcessingRound,

    /// A port was connected to itself.
    #[error("port {0} cannot be connected to itself")]
    SelfConnection(PortId),

    /// The two ports carry different buffer kinds.
    #[error("cannot connect {from_kind} port {from} to {to_kind} port {to}")]
    IncompatiblePorts {
        from: PortId,
        from_kind: BufferKind,
        to: PortId,
        to_kind: BufferKind,
    },

    /// Connections run from an output port to an input port.
    #[error("port {port} is an {actual} port, expected {expected}")]
    DirectionMismatch {
        port: PortId,
        expected: Direction,
        actual: Direction,
    },

    #[error("unit {0} is not registered")]
    UnknownUnit(UnitId),

    #[error("port {0} does not exist")]
    UnknownPort(PortId),

    #[error("no port named '{name}' on unit {unit}")]
    UnknownPortName { unit: UnitId, name: String },

    #[error("port group {0} does not exist")]
    UnknownPortGroup(PortGroupId),

    /// Buffer size must be non-zero.
    #[error("invalid buffer size {0}")]
    InvalidBufferSize(usize),

    #[error("invalid sample rate {0}")]
    InvalidSampleRate(u32),

    /// Tempo and master tune must be finite and positive.
    #[error("invalid {name}: {value}")]
    InvalidParameter { name: &'static str, value: f32 },

    /// Restoring a topology referenced a unit kind the factory cannot build.
    #[error("unknown unit kind '{0}'")]
    UnknownUnitKind(String),

    /// A snapshot refers to something it does not contain.
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    /// A unit rejected a persisted state during restore.
    #[error("unit {unit} rejected its saved state: {reason}")]
    InvalidUnitState { unit: UnitId, reason: String },
}

/// Errors raised while talking to a real-time audio/event server.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BackendError {
    #[error("audio server '{0}' is not available")]
    ServerUnavailable(String),

    #[error("client name '{0}' is already in use")]
    NameConflict(String),

    #[error("backend is not connected")]
    NotConnected,

    #[error("backend is already connected")]
    AlreadyConnected,

    #[error("failed to register server port '{name}': {reason}")]
    PortRegistration { name: String, reason: String },

    /// Anything the underlying driver reported that has no better variant.
    #[error("audio stream error: {0}")]
    Stream(String),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Errors raised by the background worker pools.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to spawn worker thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("worker pool '{0}' has shut down")]
    PoolClosed(String),

    #[error("job was cancelled before it ran")]
    Cancelled,
}

/// Errors raised while loading, saving or validating a [`Config`](crate::config::Config).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// A value is out of range for its key.
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: &'static str, reason: String },

    /// The graph section describes parameters a graph would reject.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Errors raised while building a [`Context`](crate::context::Context).
#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

impl ConfigError {
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::ReadFile {
            path: path.into(),
            source,
        }
    }

    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::WriteFile {
            path: path.into(),
            source,
        }
    }
}

impl BackendError {
    pub fn stream(err: impl std::fmt::Display) -> Self {
        BackendError::Stream(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inside_round_display() {
        let msg = GraphError::InsideProcessingRound.to_string();
        assert_eq!(msg, "graph cannot be modified while a processing round is active");
    }

    #[test]
    fn graph_error_converts_into_backend_error() {
        let err: BackendError = GraphError::InvalidBufferSize(0).into();
        assert!(matches!(err, BackendError::Graph(GraphError::InvalidBufferSize(0))));
        assert_eq!(err.to_string(), "invalid buffer size 0");
    }

    #[test]
    fn config_io_errors_keep_path_and_source() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "mock");
        let err = ConfigError::read_file("/etc/klangnetz.toml", io);
        let msg = err.to_string();
        assert!(msg.contains("failed to read file"), "got: {msg}");
        assert!(msg.contains("/etc/klangnetz.toml"), "got: {msg}");
        assert!(err.source().is_some());
    }

    #[test]
    fn stream_helper_keeps_message() {
        let err = BackendError::stream("device unplugged");
        assert_eq!(err.to_string(), "audio stream error: device unplugged");
    }
}
