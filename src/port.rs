//! Ports and port groups.
//!
//! A [`Port`] belongs to exactly one unit and owns one [`Buffer`]. Connections between
//! ports are not stored on the port itself: the graph keeps them as index pairs in a
//! single adjacency structure, so a port's forward and back connection sets are two
//! views of the same edge list and cannot disagree.

use core::fmt;

use petgraph::stable_graph::NodeIndex;
use serde::{Deserialize, Serialize};

use crate::buffer::{Buffer, BufferKind};

/// Stable handle to a port in a graph.
///
/// The serial makes handles of removed ports unusable even if the slot is reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct PortId {
    pub(crate) node: NodeIndex,
    pub(crate) serial: u64,
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.serial)
    }
}

/// Direction of data flow relative to the owning unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => f.write_str("input"),
            Direction::Output => f.write_str("output"),
        }
    }
}

/// Identifier of a [`PortGroup`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortGroupId(pub(crate) u32);

impl fmt::Display for PortGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group#{}", self.0)
    }
}

/// A named collection of ports, e.g. the left/right pair of a stereo bus.
///
/// Purely organizational; it has no effect on evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortGroup {
    pub(crate) name: String,
}

impl PortGroup {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Declaration of a port, used when attaching ports to a unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortSpec {
    pub name: String,
    pub direction: Direction,
    pub kind: BufferKind,
    pub group: Option<PortGroupId>,
}

impl PortSpec {
    pub fn new(name: impl Into<String>, direction: Direction, kind: BufferKind) -> Self {
        Self {
            name: name.into(),
            direction,
            kind,
            group: None,
        }
    }

    pub fn audio_in(name: impl Into<String>) -> Self {
        Self::new(name, Direction::Input, BufferKind::Audio)
    }

    pub fn audio_out(name: impl Into<String>) -> Self {
        Self::new(name, Direction::Output, BufferKind::Audio)
    }

    pub fn event_in(name: impl Into<String>) -> Self {
        Self::new(name, Direction::Input, BufferKind::Event)
    }

    pub fn event_out(name: impl Into<String>) -> Self {
        Self::new(name, Direction::Output, BufferKind::Event)
    }

    /// Place the port in a group (builder pattern).
    pub fn in_group(mut self, group: PortGroupId) -> Self {
        self.group = Some(group);
        self
    }
}

/// A named, directional attachment point on a unit.
#[derive(Debug)]
pub struct Port {
    pub(crate) id: PortId,
    pub(crate) name: String,
    pub(crate) direction: Direction,
    pub(crate) group: Option<PortGroupId>,
    pub(crate) buffer: Buffer,
}

impl Port {
    pub(crate) fn new(id: PortId, spec: PortSpec, frames: usize, event_capacity: usize) -> Self {
        Self {
            id,
            buffer: Buffer::new(spec.kind, frames, event_capacity),
            name: spec.name,
            direction: spec.direction,
            group: spec.group,
        }
    }

    #[inline]
    pub fn id(&self) -> PortId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[inline]
    pub fn kind(&self) -> BufferKind {
        self.buffer.kind()
    }

    #[inline]
    pub fn group(&self) -> Option<PortGroupId> {
        self.group
    }

    #[inline]
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    #[inline]
    pub fn buffer_mut(&mut self) -> &mut Buffer {
        &mut self.buffer
    }
}

/// Read-only description of a port, returned by graph introspection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortInfo {
    pub id: PortId,
    pub name: String,
    pub direction: Direction,
    pub kind: BufferKind,
    pub group: Option<PortGroupId>,
}

impl From<&Port> for PortInfo {
    fn from(port: &Port) -> Self {
        Self {
            id: port.id,
            name: port.name.clone(),
            direction: port.direction,
            kind: port.kind(),
            group: port.group,
        }
    }
}
