//! Demand-driven evaluation.
//!
//! Everything in here runs on the audio thread during a processing round: no
//! allocation, no locking, recursion bounded by the depth of the graph.

use petgraph::stable_graph::NodeIndex;
use petgraph::Incoming;

use super::units::{UnitEntry, Units};
use super::{PortKey, Wiring};
use crate::port::Direction;
use crate::unit::{ProcessContext, UnitId, UnitIo};

/// Bring a port's buffer up to date for the current round.
///
/// - disabled owner: the buffer is cleared;
/// - output port: the owner is processed unless it already was this round;
/// - input port: the buffer is cleared and every port feeding it is synchronized
///   and summed in.
pub(crate) fn sync_port(units: &mut Units, wiring: &Wiring, ctx: &ProcessContext, node: NodeIndex) {
    let Some(key) = wiring.node_weight(node).copied() else {
        return;
    };
    let Some(entry) = units.get_mut(key.unit) else {
        return;
    };

    if !entry.enabled {
        if let Some(port) = entry.ports_mut(key.direction).get_mut(key.index) {
            port.buffer.clear();
        }
        return;
    }

    match key.direction {
        Direction::Output => bump_unit(units, wiring, ctx, key.unit),
        Direction::Input => {
            match entry.inputs.get_mut(key.index) {
                Some(port) => port.buffer.clear(),
                None => return,
            }
            for source in wiring.neighbors_directed(node, Incoming) {
                sync_port(units, wiring, ctx, source);
                if let Some(source_key) = wiring.node_weight(source) {
                    mix_into(units, *source_key, key);
                }
            }
        }
    }
}

/// Process a unit once for this round, pulling its inputs first.
///
/// The unit is marked before its inputs are pulled, so a feedback cycle that leads
/// back here reads the previous round's output instead of recursing.
pub(crate) fn bump_unit(units: &mut Units, wiring: &Wiring, ctx: &ProcessContext, id: UnitId) {
    let Some(entry) = units.get_mut(id) else {
        return;
    };
    if entry.bumped {
        return;
    }
    entry.bumped = true;

    if !entry.enabled {
        entry.outputs.iter_mut().for_each(|port| port.buffer.clear());
        return;
    }

    let num_inputs = entry.inputs.len();
    for index in 0..num_inputs {
        let node = match units.get(id).and_then(|e| e.inputs.get(index)) {
            Some(port) => port.id.node,
            None => return,
        };
        sync_port(units, wiring, ctx, node);
    }

    if let Some(entry) = units.get_mut(id) {
        let UnitEntry {
            unit,
            inputs,
            outputs,
            ..
        } = entry;
        let mut io = UnitIo::new(ctx, inputs, outputs);
        unit.process(&mut io);
    }
}

fn mix_into(units: &mut Units, source: PortKey, target: PortKey) {
    if source.unit == target.unit {
        let Some(entry) = units.get_mut(source.unit) else {
            return;
        };
        // Same unit: only output -> input is possible, and those are separate vectors.
        if let (Direction::Output, Direction::Input) = (source.direction, target.direction) {
            let UnitEntry { inputs, outputs, .. } = entry;
            if let (Some(from), Some(to)) =
                (outputs.get(source.index), inputs.get_mut(target.index))
            {
                to.buffer.mixin(&from.buffer);
            }
        }
        return;
    }

    let Some((from, to)) = units.pair_mut(source.unit, target.unit) else {
        return;
    };
    let from = from.ports(source.direction).get(source.index);
    let to = to.ports_mut(target.direction).get_mut(target.index);
    if let (Some(from), Some(to)) = (from, to) {
        to.buffer.mixin(&from.buffer);
    }
}
