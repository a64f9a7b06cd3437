//! Topology operations: units, ports, connections and port groups.

use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::{Incoming, Outgoing};

use super::units::UnitEntry;
use super::{Engine, GraphGuard, PortKey};
use crate::error::GraphError;
use crate::events::{BackendRole, GraphEvent};
use crate::port::{Direction, Port, PortGroup, PortGroupId, PortId, PortInfo, PortSpec};
use crate::unit::{Unit, UnitId, UnitInfo, UnitState};

/// Returned by [`GraphGuard::register_unit`]: the unit's id and the ids of the ports
/// it declared, in declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitHandle {
    pub id: UnitId,
    pub inputs: Vec<PortId>,
    pub outputs: Vec<PortId>,
}

impl UnitHandle {
    /// Id of the `index`th input port.
    ///
    /// # Panics
    ///
    /// If the unit declared fewer inputs.
    pub fn input(&self, index: usize) -> PortId {
        self.inputs[index]
    }

    /// Id of the `index`th output port.
    ///
    /// # Panics
    ///
    /// If the unit declared fewer outputs.
    pub fn output(&self, index: usize) -> PortId {
        self.outputs[index]
    }
}

impl Engine {
    fn attach_port(&mut self, unit: UnitId, spec: PortSpec) -> Result<PortId, GraphError> {
        if let Some(group) = spec.group {
            if !self.groups.contains_key(&group) {
                return Err(GraphError::UnknownPortGroup(group));
            }
        }
        let frames = self.params.buffer_size;
        let event_capacity = self.event_capacity;
        let serial = self.next_port_serial;

        let entry = self.units.get_mut(unit).ok_or(GraphError::UnknownUnit(unit))?;
        let direction = spec.direction;
        let index = entry.ports(direction).len();
        let node = self.wiring.add_node(PortKey {
            unit,
            direction,
            index,
            serial,
        });
        let id = PortId { node, serial };
        entry.ports_mut(direction).push(Port::new(id, spec, frames, event_capacity));
        self.next_port_serial += 1;
        Ok(id)
    }

    fn detach_port(&mut self, port: PortId) -> Result<(), GraphError> {
        let key = self.port_key(port)?;
        self.sever(port, Direction::Input);
        self.sever(port, Direction::Output);
        self.wiring.remove_node(port.node);

        let entry = self.units.get_mut(key.unit).ok_or(GraphError::UnknownUnit(key.unit))?;
        let ports = entry.ports_mut(key.direction);
        ports.remove(key.index);
        for moved in &ports[key.index..] {
            if let Some(weight) = self.wiring.node_weight_mut(moved.id.node) {
                weight.index -= 1;
            }
        }
        Ok(())
    }

    /// Drop every edge of `port` on one side, emitting a `Disconnected` for each.
    fn sever(&mut self, port: PortId, side: Direction) {
        let direction = match side {
            Direction::Input => Incoming,
            Direction::Output => Outgoing,
        };
        let edges: Vec<_> = self
            .wiring
            .edges_directed(port.node, direction)
            .map(|edge| (edge.id(), edge.source(), edge.target()))
            .collect();
        for (edge, source, target) in edges {
            self.wiring.remove_edge(edge);
            if let (Some(from), Some(to)) = (self.port_id(source), self.port_id(target)) {
                self.observers.emit(GraphEvent::Disconnected { from, to });
            }
        }
    }

    fn port_id(&self, node: petgraph::stable_graph::NodeIndex) -> Option<PortId> {
        self.wiring.node_weight(node).map(|key| PortId {
            node,
            serial: key.serial,
        })
    }

    fn neighbors(
        &self,
        port: PortId,
        direction: petgraph::Direction,
    ) -> Result<Vec<PortId>, GraphError> {
        self.port_key(port)?;
        Ok(self
            .wiring
            .neighbors_directed(port.node, direction)
            .filter_map(|node| self.port_id(node))
            .collect())
    }

    fn entry(&self, unit: UnitId) -> Result<&UnitEntry, GraphError> {
        self.units.get(unit).ok_or(GraphError::UnknownUnit(unit))
    }

    fn entry_mut(&mut self, unit: UnitId) -> Result<&mut UnitEntry, GraphError> {
        self.units.get_mut(unit).ok_or(GraphError::UnknownUnit(unit))
    }

    fn port_ref(&self, port: PortId) -> Result<&Port, GraphError> {
        let key = self.port_key(port)?;
        self.entry(key.unit)?
            .ports(key.direction)
            .get(key.index)
            .ok_or(GraphError::UnknownPort(port))
    }

    fn port_mut(&mut self, port: PortId) -> Result<&mut Port, GraphError> {
        let key = self.port_key(port)?;
        self.entry_mut(key.unit)?
            .ports_mut(key.direction)
            .get_mut(key.index)
            .ok_or(GraphError::UnknownPort(port))
    }
}

fn unit_info(id: UnitId, entry: &UnitEntry) -> UnitInfo {
    UnitInfo {
        id,
        kind: entry.unit.kind().to_owned(),
        title: entry.title.clone(),
        enabled: entry.enabled,
        capabilities: entry.capabilities,
        inputs: entry.inputs.iter().map(PortInfo::from).collect(),
        outputs: entry.outputs.iter().map(PortInfo::from).collect(),
    }
}

impl GraphGuard<'_> {
    // ---- units -----------------------------------------------------------

    /// Register a unit and attach the ports it declares.
    pub fn register_unit<U: Unit>(&self, unit: U) -> Result<UnitHandle, GraphError> {
        self.register_boxed(Box::new(unit))
    }

    pub fn register_boxed(&self, unit: Box<dyn Unit>) -> Result<UnitHandle, GraphError> {
        let mut engine = self.engine();
        engine.ensure_idle()?;

        let specs = unit.ports();
        let params = engine.params;
        let mut entry = UnitEntry::new(unit);
        entry.unit.graph_updated(&params);
        let kind = entry.unit.kind().to_owned();
        let id = engine.units.insert(entry);

        let mut handle = UnitHandle {
            id,
            inputs: Vec::new(),
            outputs: Vec::new(),
        };
        for spec in specs {
            let direction = spec.direction;
            let port = match engine.attach_port(id, spec) {
                Ok(port) => port,
                Err(err) => {
                    // Roll back whatever was attached so far.
                    for port in handle.inputs.iter().chain(&handle.outputs) {
                        engine.wiring.remove_node(port.node);
                    }
                    engine.units.remove(id);
                    return Err(err);
                }
            };
            match direction {
                Direction::Input => handle.inputs.push(port),
                Direction::Output => handle.outputs.push(port),
            }
        }

        tracing::debug!(
            unit = %id,
            kind = %kind,
            inputs = handle.inputs.len(),
            outputs = handle.outputs.len(),
            "unit registered"
        );
        engine.observers.emit(GraphEvent::UnitRegistered(id));
        Ok(handle)
    }

    /// Remove a unit from the graph, disconnecting all of its ports first, and give
    /// it back to the caller.
    pub fn unregister_unit(&self, unit: UnitId) -> Result<Box<dyn Unit>, GraphError> {
        let mut engine = self.engine();
        engine.ensure_idle()?;
        let entry = engine.entry(unit)?;
        let ports: Vec<PortId> = entry.all_ports().map(Port::id).collect();

        for port in ports {
            engine.sever(port, Direction::Input);
            engine.sever(port, Direction::Output);
            engine.wiring.remove_node(port.node);
        }
        let entry = engine.units.remove(unit).ok_or(GraphError::UnknownUnit(unit))?;

        if engine.audio_backend == Some(unit) {
            engine.audio_backend = None;
            engine.observers.emit(GraphEvent::BackendDesignated {
                role: BackendRole::Audio,
                unit: None,
            });
        }
        if engine.event_backend == Some(unit) {
            engine.event_backend = None;
            engine.observers.emit(GraphEvent::BackendDesignated {
                role: BackendRole::Event,
                unit: None,
            });
        }

        tracing::debug!(unit = %unit, kind = entry.unit.kind(), "unit unregistered");
        engine.observers.emit(GraphEvent::UnitUnregistered(unit));
        Ok(entry.unit)
    }

    pub fn contains_unit(&self, unit: UnitId) -> bool {
        self.engine().units.get(unit).is_some()
    }

    pub fn num_units(&self) -> usize {
        self.engine().units.len()
    }

    /// Descriptions of every registered unit, in slot order.
    pub fn units(&self) -> Vec<UnitInfo> {
        self.engine()
            .units
            .iter()
            .map(|(id, entry)| unit_info(id, entry))
            .collect()
    }

    pub fn unit(&self, unit: UnitId) -> Result<UnitInfo, GraphError> {
        let engine = self.engine();
        engine.entry(unit).map(|entry| unit_info(unit, entry))
    }

    /// A disabled unit is skipped by evaluation; its outputs read as silence.
    pub fn set_enabled(&self, unit: UnitId, enabled: bool) -> Result<(), GraphError> {
        let mut engine = self.engine();
        let entry = engine.entry_mut(unit)?;
        if entry.enabled == enabled {
            return Ok(());
        }
        entry.enabled = enabled;
        if !enabled {
            entry.outputs.iter_mut().for_each(|port| port.buffer.clear());
        }
        tracing::debug!(unit = %unit, enabled, "unit enable state changed");
        engine.observers.emit(GraphEvent::UnitEnabled { unit, enabled });
        Ok(())
    }

    pub fn enable(&self, unit: UnitId) -> Result<(), GraphError> {
        self.set_enabled(unit, true)
    }

    pub fn disable(&self, unit: UnitId) -> Result<(), GraphError> {
        self.set_enabled(unit, false)
    }

    pub fn is_enabled(&self, unit: UnitId) -> Result<bool, GraphError> {
        self.engine().entry(unit).map(|entry| entry.enabled)
    }

    /// Human-readable label; defaults to the unit's kind.
    pub fn set_title(&self, unit: UnitId, title: impl Into<String>) -> Result<(), GraphError> {
        self.engine().entry_mut(unit)?.title = title.into();
        Ok(())
    }

    // ---- ports -----------------------------------------------------------

    /// Attach an additional port to a registered unit. Its buffer is sized to the
    /// current parameters.
    pub fn add_port(&self, unit: UnitId, spec: PortSpec) -> Result<PortId, GraphError> {
        let mut engine = self.engine();
        engine.ensure_idle()?;
        let port = engine.attach_port(unit, spec)?;
        engine.observers.emit(GraphEvent::PortAdded { unit, port });
        Ok(port)
    }

    /// Disconnect and destroy a port. Later ports of the same direction shift down
    /// one position; their ids stay valid.
    pub fn remove_port(&self, port: PortId) -> Result<(), GraphError> {
        let mut engine = self.engine();
        engine.ensure_idle()?;
        let unit = engine.port_key(port)?.unit;
        engine.detach_port(port)?;
        engine.observers.emit(GraphEvent::PortRemoved { unit, port });
        Ok(())
    }

    pub fn port(&self, port: PortId) -> Result<PortInfo, GraphError> {
        self.engine().port_ref(port).map(PortInfo::from)
    }

    /// The unit a port belongs to.
    pub fn port_owner(&self, port: PortId) -> Result<UnitId, GraphError> {
        self.engine().port_key(port).map(|key| key.unit)
    }

    /// Look a port up by name.
    pub fn find_port(
        &self,
        unit: UnitId,
        direction: Direction,
        name: &str,
    ) -> Result<PortId, GraphError> {
        let engine = self.engine();
        engine
            .entry(unit)?
            .ports(direction)
            .iter()
            .find(|port| port.name == name)
            .map(Port::id)
            .ok_or_else(|| GraphError::UnknownPortName {
                unit,
                name: name.to_owned(),
            })
    }

    // ---- connections -----------------------------------------------------

    /// Connect an output port to an input port.
    ///
    /// Connecting an already connected pair is a no-op.
    pub fn connect(&self, from: PortId, to: PortId) -> Result<(), GraphError> {
        if from == to {
            return Err(GraphError::SelfConnection(from));
        }
        let mut engine = self.engine();
        engine.ensure_idle()?;

        let (from_kind, from_dir) = {
            let port = engine.port_ref(from)?;
            (port.kind(), port.direction())
        };
        let (to_kind, to_dir) = {
            let port = engine.port_ref(to)?;
            (port.kind(), port.direction())
        };
        if from_dir != Direction::Output {
            return Err(GraphError::DirectionMismatch {
                port: from,
                expected: Direction::Output,
                actual: from_dir,
            });
        }
        if to_dir != Direction::Input {
            return Err(GraphError::DirectionMismatch {
                port: to,
                expected: Direction::Input,
                actual: to_dir,
            });
        }
        if from_kind != to_kind {
            return Err(GraphError::IncompatiblePorts {
                from,
                from_kind,
                to,
                to_kind,
            });
        }

        if engine.wiring.contains_edge(from.node, to.node) {
            return Ok(());
        }
        engine.wiring.add_edge(from.node, to.node, ());
        tracing::trace!(%from, %to, "ports connected");
        engine.observers.emit(GraphEvent::Connected { from, to });
        Ok(())
    }

    /// Remove one connection. Returns `false` if the ports were not connected.
    pub fn disconnect(&self, from: PortId, to: PortId) -> Result<bool, GraphError> {
        let mut engine = self.engine();
        engine.ensure_idle()?;
        engine.port_key(from)?;
        engine.port_key(to)?;
        let Some(edge) = engine.wiring.find_edge(from.node, to.node) else {
            return Ok(false);
        };
        engine.wiring.remove_edge(edge);
        tracing::trace!(%from, %to, "ports disconnected");
        engine.observers.emit(GraphEvent::Disconnected { from, to });
        Ok(true)
    }

    /// Sever every connection of a port, in both directions.
    pub fn disconnect_all(&self, port: PortId) -> Result<(), GraphError> {
        let mut engine = self.engine();
        engine.ensure_idle()?;
        engine.port_key(port)?;
        engine.sever(port, Direction::Input);
        engine.sever(port, Direction::Output);
        Ok(())
    }

    /// Ports this port feeds.
    pub fn forward_connections(&self, port: PortId) -> Result<Vec<PortId>, GraphError> {
        self.engine().neighbors(port, Outgoing)
    }

    /// Ports feeding this port.
    pub fn back_connections(&self, port: PortId) -> Result<Vec<PortId>, GraphError> {
        self.engine().neighbors(port, Incoming)
    }

    pub fn is_connected(&self, from: PortId, to: PortId) -> bool {
        let engine = self.engine();
        engine.port_key(from).is_ok()
            && engine.port_key(to).is_ok()
            && engine.wiring.contains_edge(from.node, to.node)
    }

    /// Every connection in the graph as `(from, to)` pairs.
    pub fn connections(&self) -> Vec<(PortId, PortId)> {
        let engine = self.engine();
        engine
            .wiring
            .edge_references()
            .filter_map(|edge| {
                Some((engine.port_id(edge.source())?, engine.port_id(edge.target())?))
            })
            .collect()
    }

    // ---- port groups -----------------------------------------------------

    pub fn create_port_group(&self, name: impl Into<String>) -> PortGroupId {
        let mut engine = self.engine();
        let id = PortGroupId(engine.next_group);
        engine.next_group += 1;
        engine.groups.insert(id, PortGroup { name: name.into() });
        id
    }

    /// Delete a group. Its ports stay where they are, ungrouped.
    pub fn remove_port_group(&self, group: PortGroupId) -> Result<(), GraphError> {
        let mut engine = self.engine();
        engine.groups.remove(&group).ok_or(GraphError::UnknownPortGroup(group))?;
        for (_, entry) in engine.units.iter_mut() {
            for port in entry.all_ports_mut() {
                if port.group == Some(group) {
                    port.group = None;
                }
            }
        }
        Ok(())
    }

    pub fn port_group(&self, group: PortGroupId) -> Result<PortGroup, GraphError> {
        self.engine()
            .groups
            .get(&group)
            .cloned()
            .ok_or(GraphError::UnknownPortGroup(group))
    }

    /// Move a port into a group, or out of any group with `None`.
    pub fn set_port_group(
        &self,
        port: PortId,
        group: Option<PortGroupId>,
    ) -> Result<(), GraphError> {
        let mut engine = self.engine();
        if let Some(group) = group {
            if !engine.groups.contains_key(&group) {
                return Err(GraphError::UnknownPortGroup(group));
            }
        }
        engine.port_mut(port)?.group = group;
        Ok(())
    }

    /// Ports currently in a group, across all units.
    pub fn ports_in_group(&self, group: PortGroupId) -> Result<Vec<PortId>, GraphError> {
        let engine = self.engine();
        if !engine.groups.contains_key(&group) {
            return Err(GraphError::UnknownPortGroup(group));
        }
        Ok(engine
            .units
            .iter()
            .flat_map(|(_, entry)| entry.all_ports())
            .filter(|port| port.group == Some(group))
            .map(Port::id)
            .collect())
    }

    // ---- backends --------------------------------------------------------

    /// Designate the unit whose pull drives audio each round.
    pub fn register_audio_backend(&self, unit: UnitId) -> Result<(), GraphError> {
        self.designate(BackendRole::Audio, Some(unit))
    }

    /// Designate the unit whose pull drives events each round.
    pub fn register_event_backend(&self, unit: UnitId) -> Result<(), GraphError> {
        self.designate(BackendRole::Event, Some(unit))
    }

    pub fn clear_backend(&self, role: BackendRole) -> Result<(), GraphError> {
        self.designate(role, None)
    }

    pub fn audio_backend(&self) -> Option<UnitId> {
        self.engine().audio_backend
    }

    pub fn event_backend(&self) -> Option<UnitId> {
        self.engine().event_backend
    }

    fn designate(&self, role: BackendRole, unit: Option<UnitId>) -> Result<(), GraphError> {
        let mut engine = self.engine();
        engine.ensure_idle()?;
        if let Some(unit) = unit {
            engine.entry(unit)?;
        }
        match role {
            BackendRole::Audio => engine.audio_backend = unit,
            BackendRole::Event => engine.event_backend = unit,
        }
        tracing::debug!(?role, ?unit, "backend designated");
        engine.observers.emit(GraphEvent::BackendDesignated { role, unit });
        Ok(())
    }

    // ---- persistence -----------------------------------------------------

    /// Saved state of a unit, or `None` if it has no persistence capability.
    pub fn save_unit_state(&self, unit: UnitId) -> Result<Option<UnitState>, GraphError> {
        let mut engine = self.engine();
        let entry = engine.entry_mut(unit)?;
        if !entry.capabilities.persistent {
            return Ok(None);
        }
        Ok(entry.unit.persistence().map(|p| p.save_state()))
    }

    /// Apply a saved state. Units without persistence ignore it.
    pub fn load_unit_state(&self, unit: UnitId, state: &UnitState) -> Result<(), GraphError> {
        let mut engine = self.engine();
        engine.ensure_idle()?;
        let entry = engine.entry_mut(unit)?;
        if !entry.capabilities.persistent {
            return Ok(());
        }
        match entry.unit.persistence() {
            Some(persistent) => persistent
                .load_state(state)
                .map_err(|reason| GraphError::InvalidUnitState { unit, reason }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::buffer::BufferKind;
    use crate::port::{Direction, PortSpec};
    use crate::unit::{Unit, UnitIo};
    use crate::{Graph, GraphError, GraphParams};

    struct Ports(Vec<PortSpec>);

    impl Unit for Ports {
        fn kind(&self) -> &str {
            "ports"
        }

        fn ports(&self) -> Vec<PortSpec> {
            self.0.clone()
        }

        fn process(&mut self, _io: &mut UnitIo<'_>) {}
    }

    fn stereo_through() -> Ports {
        Ports(vec![
            PortSpec::audio_in("in_l"),
            PortSpec::audio_in("in_r"),
            PortSpec::audio_out("out_l"),
            PortSpec::audio_out("out_r"),
        ])
    }

    #[test]
    fn removing_a_port_shifts_later_ports() {
        let graph = Graph::new(GraphParams::default()).unwrap();
        let g = graph.lock();
        let a = g.register_unit(stereo_through()).unwrap();
        let b = g.register_unit(stereo_through()).unwrap();
        g.connect(a.output(1), b.input(1)).unwrap();

        g.remove_port(b.input(0)).unwrap();

        assert!(matches!(g.port(b.input(0)), Err(GraphError::UnknownPort(_))));
        let info = g.unit(b.id).unwrap();
        assert_eq!(info.inputs.len(), 1);
        assert_eq!(info.inputs[0].id, b.input(1));
        assert!(g.is_connected(a.output(1), b.input(1)));
        assert_eq!(g.find_port(b.id, Direction::Input, "in_r").unwrap(), b.input(1));
    }

    #[test]
    fn unknown_group_rolls_back_registration() {
        let graph = Graph::new(GraphParams::default()).unwrap();
        let g = graph.lock();
        let group = g.create_port_group("stereo");
        g.remove_port_group(group).unwrap();

        let unit = Ports(vec![
            PortSpec::audio_in("in"),
            PortSpec::audio_out("out").in_group(group),
        ]);
        assert_eq!(g.register_unit(unit).unwrap_err(), GraphError::UnknownPortGroup(group));
        assert_eq!(g.num_units(), 0);
        assert!(g.connections().is_empty());
    }

    #[test]
    fn groups_collect_ports_across_units() {
        let graph = Graph::new(GraphParams::default()).unwrap();
        let g = graph.lock();
        let bus = g.create_port_group("bus");
        let a = g
            .register_unit(Ports(vec![
                PortSpec::audio_out("l").in_group(bus),
                PortSpec::audio_out("r"),
            ]))
            .unwrap();
        let b = g.register_unit(Ports(vec![PortSpec::event_in("midi")])).unwrap();
        g.set_port_group(b.input(0), Some(bus)).unwrap();

        let ports = g.ports_in_group(bus).unwrap();
        assert_eq!(ports, vec![a.output(0), b.input(0)]);
        assert_eq!(g.port(b.input(0)).unwrap().kind, BufferKind::Event);
        assert_eq!(g.port_group(bus).unwrap().name(), "bus");

        g.remove_port_group(bus).unwrap();
        assert_eq!(g.port(a.output(0)).unwrap().group, None);
    }
}
