mod common;

use std::thread;

use klangnetz::units::{Constant, NoteGate, Passthrough};
use klangnetz::{Direction, Graph, GraphError, GraphEvent, PortSpec};

#[test]
fn connection_sets_are_symmetric() {
    let graph = Graph::default();
    let g = graph.lock();
    let a = g.register_unit(Constant::new(1.0)).unwrap();
    let b = g.register_unit(Passthrough::audio()).unwrap();
    let c = g.register_unit(Passthrough::audio()).unwrap();

    g.connect(a.output(0), b.input(0)).unwrap();
    g.connect(a.output(0), c.input(0)).unwrap();

    let forward = g.forward_connections(a.output(0)).unwrap();
    assert_eq!(forward.len(), 2);
    for target in &forward {
        assert_eq!(g.back_connections(*target).unwrap(), vec![a.output(0)]);
    }

    assert!(g.disconnect(a.output(0), b.input(0)).unwrap());
    assert_eq!(g.forward_connections(a.output(0)).unwrap(), vec![c.input(0)]);
    assert!(g.back_connections(b.input(0)).unwrap().is_empty());
}

#[test]
fn disconnect_all_empties_both_sides() {
    let graph = Graph::default();
    let g = graph.lock();
    let a = g.register_unit(Constant::new(1.0)).unwrap();
    let b = g.register_unit(Constant::new(0.5)).unwrap();
    let hub = g.register_unit(Passthrough::audio()).unwrap();
    let x = g.register_unit(Passthrough::audio()).unwrap();
    let y = g.register_unit(Passthrough::audio()).unwrap();

    g.connect(a.output(0), hub.input(0)).unwrap();
    g.connect(b.output(0), hub.input(0)).unwrap();
    g.connect(hub.output(0), x.input(0)).unwrap();
    g.connect(hub.output(0), y.input(0)).unwrap();
    g.connect(a.output(0), x.input(0)).unwrap();

    g.disconnect_all(hub.input(0)).unwrap();
    assert!(g.back_connections(hub.input(0)).unwrap().is_empty());
    assert!(g.forward_connections(hub.input(0)).unwrap().is_empty());
    assert_eq!(g.forward_connections(a.output(0)).unwrap(), vec![x.input(0)]);
    assert!(g.forward_connections(b.output(0)).unwrap().is_empty());

    g.disconnect_all(hub.output(0)).unwrap();
    assert!(g.forward_connections(hub.output(0)).unwrap().is_empty());
    assert!(g.back_connections(hub.output(0)).unwrap().is_empty());
    assert!(g.back_connections(y.input(0)).unwrap().is_empty());
    assert_eq!(g.back_connections(x.input(0)).unwrap(), vec![a.output(0)]);

    // Unrelated connections survive, and repeating is harmless.
    assert_eq!(g.connections(), vec![(a.output(0), x.input(0))]);
    g.disconnect_all(hub.output(0)).unwrap();
}

#[test]
fn self_connection_is_rejected_and_changes_nothing() {
    let graph = Graph::default();
    let g = graph.lock();
    let a = g.register_unit(Passthrough::audio()).unwrap();
    let port = a.input(0);

    assert_eq!(g.connect(port, port), Err(GraphError::SelfConnection(port)));
    assert!(g.forward_connections(port).unwrap().is_empty());
    assert!(g.back_connections(port).unwrap().is_empty());
    assert!(g.connections().is_empty());
}

#[test]
fn kinds_and_directions_are_checked() {
    let graph = Graph::default();
    let g = graph.lock();
    let audio = g.register_unit(Constant::new(1.0)).unwrap();
    let events = g.register_unit(Passthrough::events()).unwrap();
    let through = g.register_unit(Passthrough::audio()).unwrap();

    assert!(matches!(
        g.connect(audio.output(0), events.input(0)),
        Err(GraphError::IncompatiblePorts { .. })
    ));
    assert!(matches!(
        g.connect(through.input(0), audio.output(0)),
        Err(GraphError::DirectionMismatch {
            expected: Direction::Output,
            actual: Direction::Input,
            ..
        })
    ));
    assert!(g.connections().is_empty());
}

#[test]
fn connecting_twice_is_a_no_op() {
    let graph = Graph::default();
    let g = graph.lock();
    let a = g.register_unit(Constant::new(1.0)).unwrap();
    let b = g.register_unit(Passthrough::audio()).unwrap();

    g.connect(a.output(0), b.input(0)).unwrap();
    g.connect(a.output(0), b.input(0)).unwrap();
    assert_eq!(g.connections(), vec![(a.output(0), b.input(0))]);

    assert!(g.disconnect(a.output(0), b.input(0)).unwrap());
    assert!(!g.disconnect(a.output(0), b.input(0)).unwrap());
}

#[test]
fn unregistering_cleans_up_peers() {
    let graph = Graph::default();
    let g = graph.lock();
    let a = g.register_unit(Constant::new(1.0)).unwrap();
    let b = g.register_unit(Passthrough::audio()).unwrap();
    g.connect(a.output(0), b.input(0)).unwrap();

    g.unregister_unit(a.id).unwrap();
    assert!(g.back_connections(b.input(0)).unwrap().is_empty());
    assert_eq!(g.forward_connections(a.output(0)), Err(GraphError::UnknownPort(a.output(0))));
    assert!(matches!(g.unregister_unit(a.id), Err(GraphError::UnknownUnit(_))));

    // A new unit may reuse the slot, but not the old handles.
    let c = g.register_unit(Constant::new(2.0)).unwrap();
    assert_ne!(c.id, a.id);
    assert!(g.connect(a.output(0), b.input(0)).is_err());
}

#[test]
fn ports_can_be_added_and_found_by_name() {
    let graph = Graph::default();
    let g = graph.lock();
    let gate = g.register_unit(NoteGate::new()).unwrap();
    let extra = g.add_port(gate.id, PortSpec::audio_out("aux")).unwrap();

    assert_eq!(g.find_port(gate.id, Direction::Output, "aux").unwrap(), extra);
    assert_eq!(g.port(extra).unwrap().name, "aux");
    assert_eq!(g.port_owner(extra).unwrap(), gate.id);
    assert!(matches!(
        g.find_port(gate.id, Direction::Input, "aux"),
        Err(GraphError::UnknownPortName { .. })
    ));

    g.remove_port(extra).unwrap();
    assert!(g.port(extra).is_err());
}

#[test]
fn observers_see_topology_changes() {
    let graph = Graph::default();
    let events = graph.subscribe();
    let g = graph.lock();
    let a = g.register_unit(Constant::new(1.0)).unwrap();
    let b = g.register_unit(Passthrough::audio()).unwrap();
    g.connect(a.output(0), b.input(0)).unwrap();
    g.unregister_unit(b.id).unwrap();

    let seen: Vec<GraphEvent> = events.try_iter().collect();
    assert_eq!(
        seen,
        vec![
            GraphEvent::UnitRegistered(a.id),
            GraphEvent::UnitRegistered(b.id),
            GraphEvent::Connected {
                from: a.output(0),
                to: b.input(0),
            },
            GraphEvent::Disconnected {
                from: a.output(0),
                to: b.input(0),
            },
            GraphEvent::UnitUnregistered(b.id),
        ]
    );
}

#[test]
fn lock_is_reentrant_on_one_thread() {
    let graph = Graph::default();
    let outer = graph.lock();
    let a = outer.register_unit(Constant::new(1.0)).unwrap();

    let register_more = |graph: &Graph| {
        let inner = graph.lock();
        inner.register_unit(Passthrough::audio()).unwrap()
    };
    let b = register_more(&graph);

    outer.connect(a.output(0), b.input(0)).unwrap();
    assert_eq!(outer.num_units(), 2);
}

#[test]
fn other_threads_wait_for_the_lock() {
    let graph = Graph::default();
    let guard = graph.lock();

    let remote = graph.clone();
    let locked_elsewhere = thread::spawn(move || remote.try_lock().is_none())
        .join()
        .unwrap();
    assert!(locked_elsewhere);

    drop(guard);
    let remote = graph.clone();
    let free = thread::spawn(move || remote.try_lock().is_some()).join().unwrap();
    assert!(free);
}
