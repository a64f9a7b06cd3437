//! Topology snapshots.
//!
//! A [`Topology`] records the global parameters, every unit (kind, title, enable
//! state and saved parameters) and every connection by unit position and port name.
//! It is plain serde data; pick whatever format suits the session file.
//!
//! The designated backend roots are kept apart from the other units. Connections
//! to them name the role instead of a position, and replaying resolves the role
//! against the roots the target graph already has, so a restored patch plays
//! through whichever server is driving that graph. Roots are only created from
//! their records when the target has none.
//!
//! Replaying a snapshot creates units through a [`UnitFactory`], then connects them,
//! all under one lock.

use serde::{Deserialize, Serialize};

use crate::backend::BackendUnit;
use crate::error::GraphError;
use crate::events::BackendRole;
use crate::graph::{GraphGuard, GraphParams};
use crate::port::{Direction, PortId};
use crate::unit::{Unit, UnitId, UnitState};
use crate::units::{Constant, Gain, Mixer, NoteGate, Passthrough, Sine};

/// Serializable description of a graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub params: GraphParams,
    #[serde(default)]
    pub units: Vec<UnitRecord>,
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
    /// The audio root, recorded apart from `units`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_backend: Option<UnitRecord>,
    /// The event root. Left out when the same unit holds both roles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_backend: Option<UnitRecord>,
}

impl Topology {
    pub fn backend(&self, role: BackendRole) -> Option<&UnitRecord> {
        match role {
            BackendRole::Audio => self.audio_backend.as_ref(),
            BackendRole::Event => self.event_backend.as_ref(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub kind: String,
    pub title: String,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<UnitState>,
}

fn enabled_default() -> bool {
    true
}

/// One end of a connection: the port's name on either a backend root or the unit
/// at a position in [`Topology::units`]. `unit` is ignored when `backend` is set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendRole>,
    #[serde(default)]
    pub unit: usize,
    pub port: String,
}

impl PortRef {
    pub fn unit(unit: usize, port: impl Into<String>) -> Self {
        Self {
            backend: None,
            unit,
            port: port.into(),
        }
    }

    pub fn backend(role: BackendRole, port: impl Into<String>) -> Self {
        Self {
            backend: Some(role),
            unit: 0,
            port: port.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub from: PortRef,
    pub to: PortRef,
}

/// Creates units by kind when replaying a [`Topology`].
pub trait UnitFactory {
    fn create(&self, kind: &str, state: Option<&UnitState>) -> Option<Box<dyn Unit>>;
}

impl<F> UnitFactory for F
where
    F: Fn(&str, Option<&UnitState>) -> Option<Box<dyn Unit>>,
{
    fn create(&self, kind: &str, state: Option<&UnitState>) -> Option<Box<dyn Unit>> {
        self(kind, state)
    }
}

/// Builds the self-contained built-in units. Units that hand out a reader (meters,
/// taps) are left to the application.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuiltinFactory;

impl UnitFactory for BuiltinFactory {
    fn create(&self, kind: &str, state: Option<&UnitState>) -> Option<Box<dyn Unit>> {
        let unit: Box<dyn Unit> = match kind {
            Constant::KIND => Box::new(Constant::new(0.0)),
            Sine::KIND => Box::new(Sine::new(440.0)),
            Passthrough::AUDIO_KIND => Box::new(Passthrough::audio()),
            Passthrough::EVENT_KIND => Box::new(Passthrough::events()),
            Gain::KIND => Box::new(Gain::new(1.0)),
            Mixer::KIND => {
                let channels = state.map_or(2, |s| {
                    s.keys().filter(|k| k.starts_with("level_")).count()
                });
                Box::new(Mixer::new(channels))
            }
            NoteGate::KIND => Box::new(NoteGate::new()),
            BackendUnit::AUDIO_KIND | BackendUnit::EVENT_KIND => {
                Box::new(BackendUnit::from_state(kind, state)?)
            }
            _ => return None,
        };
        Some(unit)
    }
}

impl GraphGuard<'_> {
    /// Capture the graph's structure and unit states.
    pub fn snapshot(&self) -> Result<Topology, GraphError> {
        let audio_root = self.audio_backend();
        let event_root = self.event_backend().filter(|&id| Some(id) != audio_root);
        let role_of = |id: UnitId| {
            if Some(id) == audio_root {
                Some(BackendRole::Audio)
            } else if Some(id) == event_root {
                Some(BackendRole::Event)
            } else {
                None
            }
        };

        let infos = self.units();
        let mut ordinary = Vec::with_capacity(infos.len());
        let mut units = Vec::with_capacity(infos.len());
        for info in &infos {
            if role_of(info.id).is_none() {
                ordinary.push(info.id);
                units.push(self.record(info.id)?);
            }
        }

        let locate = |id: UnitId, name: String| -> Option<PortRef> {
            match role_of(id) {
                Some(role) => Some(PortRef::backend(role, name)),
                None => {
                    let position = ordinary.iter().position(|&unit| unit == id)?;
                    Some(PortRef::unit(position, name))
                }
            }
        };
        let mut connections = Vec::new();
        for (from, to) in self.connections() {
            let (from_name, to_name) = (self.port(from)?.name, self.port(to)?.name);
            let (Some(from), Some(to)) = (
                locate(self.port_owner(from)?, from_name),
                locate(self.port_owner(to)?, to_name),
            ) else {
                continue;
            };
            connections.push(ConnectionRecord { from, to });
        }

        Ok(Topology {
            params: self.params(),
            units,
            connections,
            audio_backend: audio_root.map(|id| self.record(id)).transpose()?,
            event_backend: event_root.map(|id| self.record(id)).transpose()?,
        })
    }

    fn record(&self, id: UnitId) -> Result<UnitRecord, GraphError> {
        let info = self.unit(id)?;
        Ok(UnitRecord {
            kind: info.kind,
            title: info.title,
            enabled: info.enabled,
            state: self.save_unit_state(id)?,
        })
    }

    /// Recreate a snapshot in this graph, adding to whatever it already contains.
    ///
    /// Connections to a backend role land on the root this graph already has for
    /// it; a missing root is created from its record. Returns the ids of the units
    /// created from [`Topology::units`], in snapshot order. On error every unit
    /// created so far is unregistered again and the previous parameters are put
    /// back.
    pub fn restore(
        &self,
        topology: &Topology,
        factory: &dyn UnitFactory,
    ) -> Result<Vec<UnitId>, GraphError> {
        let previous = self.params();
        let mut created = Vec::with_capacity(topology.units.len());
        let mut roots = Vec::new();
        let result = self
            .set_params(topology.params)
            .and_then(|()| self.replay(topology, factory, &mut created, &mut roots));
        match result {
            Ok(()) => {
                tracing::info!(
                    units = created.len(),
                    roots = roots.len(),
                    connections = topology.connections.len(),
                    "topology restored"
                );
                Ok(created)
            }
            Err(err) => {
                tracing::warn!(%err, "topology restore failed, rolling back");
                for id in created.into_iter().chain(roots) {
                    let _ = self.unregister_unit(id);
                }
                if let Err(params_err) = self.set_params(previous) {
                    tracing::warn!(%params_err, "could not put back previous parameters");
                }
                Err(err)
            }
        }
    }

    fn create(
        &self,
        record: &UnitRecord,
        factory: &dyn UnitFactory,
        created: &mut Vec<UnitId>,
    ) -> Result<UnitId, GraphError> {
        let unit = factory
            .create(&record.kind, record.state.as_ref())
            .ok_or_else(|| GraphError::UnknownUnitKind(record.kind.clone()))?;
        let handle = self.register_boxed(unit)?;
        created.push(handle.id);
        self.set_title(handle.id, record.title.clone())?;
        if let Some(state) = &record.state {
            self.load_unit_state(handle.id, state)?;
        }
        self.set_enabled(handle.id, record.enabled)?;
        Ok(handle.id)
    }

    /// The root this graph uses for `role`, created from the snapshot if it has none.
    fn root(
        &self,
        role: BackendRole,
        topology: &Topology,
        factory: &dyn UnitFactory,
        roots: &mut Vec<UnitId>,
    ) -> Result<Option<UnitId>, GraphError> {
        let current = match role {
            BackendRole::Audio => self.audio_backend(),
            BackendRole::Event => self.event_backend(),
        };
        if current.is_some() {
            return Ok(current);
        }
        let Some(record) = topology.backend(role) else {
            return Ok(None);
        };
        let id = self.create(record, factory, roots)?;
        match role {
            BackendRole::Audio => self.register_audio_backend(id)?,
            BackendRole::Event => self.register_event_backend(id)?,
        }
        Ok(Some(id))
    }

    fn replay(
        &self,
        topology: &Topology,
        factory: &dyn UnitFactory,
        created: &mut Vec<UnitId>,
        roots: &mut Vec<UnitId>,
    ) -> Result<(), GraphError> {
        for record in &topology.units {
            self.create(record, factory, created)?;
        }
        let audio = self.root(BackendRole::Audio, topology, factory, roots)?;
        let event = self.root(BackendRole::Event, topology, factory, roots)?;

        let resolve = |port: &PortRef, direction: Direction| -> Result<PortId, GraphError> {
            let unit = match port.backend {
                Some(BackendRole::Audio) => audio,
                Some(BackendRole::Event) => event,
                None => created.get(port.unit).copied(),
            };
            let unit = unit.ok_or_else(|| {
                GraphError::InvalidTopology(match port.backend {
                    Some(role) => format!("connection refers to missing {role:?} backend"),
                    None => format!("connection refers to missing unit {}", port.unit),
                })
            })?;
            self.find_port(unit, direction, &port.port)
        };
        for connection in &topology.connections {
            let from = resolve(&connection.from, Direction::Output)?;
            let to = resolve(&connection.to, Direction::Input)?;
            self.connect(from, to)?;
        }
        Ok(())
    }
}
