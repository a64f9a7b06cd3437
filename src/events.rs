//! Graph change notifications for control-side observers.
//!
//! Observers hold a [`crossbeam_channel::Receiver`]; dropping it ends the
//! subscription, and the graph prunes the dead sender on its next emit.

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::graph::GraphParams;
use crate::port::PortId;
use crate::unit::UnitId;

/// Which root a backend unit was designated as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendRole {
    Audio,
    Event,
}

/// A change to the graph's topology or parameters.
#[derive(Clone, Debug, PartialEq)]
pub enum GraphEvent {
    UnitRegistered(UnitId),
    UnitUnregistered(UnitId),
    UnitEnabled { unit: UnitId, enabled: bool },
    PortAdded { unit: UnitId, port: PortId },
    PortRemoved { unit: UnitId, port: PortId },
    Connected { from: PortId, to: PortId },
    Disconnected { from: PortId, to: PortId },
    ParametersChanged(GraphParams),
    BackendDesignated { role: BackendRole, unit: Option<UnitId> },
    Panic,
}

impl GraphEvent {
    /// True for events that change which ports are connected or exist.
    pub fn is_topology_change(&self) -> bool {
        matches!(
            self,
            GraphEvent::UnitRegistered(_)
                | GraphEvent::UnitUnregistered(_)
                | GraphEvent::PortAdded { .. }
                | GraphEvent::PortRemoved { .. }
                | GraphEvent::Connected { .. }
                | GraphEvent::Disconnected { .. }
        )
    }
}

#[derive(Default)]
pub(crate) struct Observers {
    subscribers: Vec<Sender<GraphEvent>>,
}

impl Observers {
    pub(crate) fn subscribe(&mut self) -> Receiver<GraphEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub(crate) fn emit(&mut self, event: GraphEvent) {
        if self.subscribers.is_empty() {
            return;
        }
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_receivers_are_pruned() {
        let mut observers = Observers::default();
        let kept = observers.subscribe();
        let dropped = observers.subscribe();
        drop(dropped);

        observers.emit(GraphEvent::Panic);
        assert_eq!(observers.len(), 1);
        assert_eq!(kept.try_recv(), Ok(GraphEvent::Panic));
    }
}
