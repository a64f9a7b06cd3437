mod common;

use std::sync::atomic::Ordering;

use common::counted;
use klangnetz::backend::{Backend, ClientSpec, OfflineHost, OfflineServer};
use klangnetz::units::{Constant, Passthrough};
use klangnetz::{BackendError, Event, EventKind, Graph, GraphParams};

fn setup(host: &OfflineHost, name: &str) -> (Graph, Backend<OfflineServer>) {
    let graph = Graph::new(GraphParams::default()).unwrap();
    let backend = Backend::new(&graph, host.server(), ClientSpec::new(name)).unwrap();
    (graph, backend)
}

fn note_on(frame: u32, note: u8) -> Event {
    Event::new(
        frame,
        EventKind::NoteOn {
            channel: 0,
            note,
            velocity: 100,
        },
    )
}

#[test]
fn renders_a_constant_to_both_outputs() {
    let host = OfflineHost::new(48000, 256);
    let (graph, mut backend) = setup(&host, "render");
    let (source, calls) = counted(Constant::new(1.0));
    {
        let g = graph.lock();
        let a = g.register_unit(source).unwrap();
        for playback in &backend.transport().audio_unit().inputs {
            g.connect(a.output(0), *playback).unwrap();
        }
    }

    backend.connect().unwrap();
    assert_eq!(host.run_period(), 1);

    assert_eq!(host.playback("render", 0).unwrap(), vec![1.0; 256]);
    assert_eq!(host.playback("render", 1).unwrap(), vec![1.0; 256]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(backend.transport().periods(), 1);
}

#[test]
fn connect_adopts_the_server_parameters() {
    let host = OfflineHost::new(44100, 64);
    let (graph, mut backend) = setup(&host, "params");

    let info = backend.connect().unwrap();
    assert_eq!(info.sample_rate, 44100);
    assert_eq!(info.buffer_size, 64);
    assert_eq!(graph.params().sample_rate, 44100);
    assert_eq!(graph.params().buffer_size, 64);
    assert!(backend.is_connected());
}

#[test]
fn capture_flows_through_the_graph() {
    let host = OfflineHost::new(48000, 8);
    let (graph, mut backend) = setup(&host, "loop");
    {
        let g = graph.lock();
        let through = g.register_unit(Passthrough::audio()).unwrap();
        let audio = backend.transport().audio_unit().clone();
        g.connect(audio.output(0), through.input(0)).unwrap();
        g.connect(through.output(0), audio.input(1)).unwrap();
    }
    backend.connect().unwrap();

    let ramp: Vec<f32> = (0..8).map(|i| i as f32 / 8.0).collect();
    host.set_capture("loop", 0, &ramp).unwrap();
    host.run_period();

    assert_eq!(host.playback("loop", 1).unwrap(), ramp);
    assert_eq!(host.playback("loop", 0).unwrap(), vec![0.0; 8]);
}

#[test]
fn events_pass_through_once() {
    let host = OfflineHost::new(48000, 32);
    let (graph, mut backend) = setup(&host, "midi");
    {
        let g = graph.lock();
        let events = backend.transport().event_unit().clone();
        g.connect(events.output(0), events.input(0)).unwrap();
    }
    backend.connect().unwrap();

    host.queue_event("midi", 0, note_on(20, 64)).unwrap();
    host.queue_event("midi", 0, note_on(3, 60)).unwrap();
    host.run_period();
    assert_eq!(host.playback_events("midi", 0).unwrap(), vec![note_on(3, 60), note_on(20, 64)]);

    host.run_period();
    assert!(host.playback_events("midi", 0).unwrap().is_empty());
}

#[test]
fn name_conflict_is_reported_and_the_first_client_keeps_running() {
    let host = OfflineHost::new(48000, 16);
    let (_first_graph, mut first) = setup(&host, "shared");
    let (second_graph, mut second) = setup(&host, "shared");

    first.connect().unwrap();
    let err = second.connect().unwrap_err();
    assert_eq!(err, BackendError::NameConflict("shared".into()));
    assert!(!second.is_connected());

    // The rejected graph still works on its own.
    second_graph.lock().process_round();

    host.run_period();
    assert_eq!(first.transport().periods(), 1);
    assert_eq!(second.transport().periods(), 0);
}

#[test]
fn unavailable_server_can_be_retried() {
    let host = OfflineHost::new(48000, 16);
    let (_graph, mut backend) = setup(&host, "retry");
    host.set_available(false);

    assert_eq!(
        backend.connect().unwrap_err(),
        BackendError::ServerUnavailable("offline".into())
    );
    assert!(!backend.is_connected());

    host.set_available(true);
    backend.connect().unwrap();
    assert!(backend.is_connected());
}

#[test]
fn shutdown_marks_the_backend_disconnected() {
    let host = OfflineHost::new(48000, 16);
    let (graph, mut backend) = setup(&host, "gone");
    backend.connect().unwrap();
    assert!(backend.transport().audio_capture(0).is_some());

    host.shutdown("server restarting");

    assert!(!backend.is_connected());
    assert!(!backend.transport().is_connected());
    assert_eq!(backend.transport().audio_capture(0), None);
    assert_eq!(backend.transport().event_playback(0), None);
    assert_eq!(host.run_period(), 0);
    assert_eq!(backend.disconnect().unwrap_err(), BackendError::NotConnected);

    // The graph is unaffected.
    graph.lock().process_round();

    host.set_available(true);
    backend.connect().unwrap();
    assert!(backend.transport().audio_capture(0).is_some());
}

#[test]
fn server_changes_reach_the_graph() {
    let host = OfflineHost::new(48000, 128);
    let (graph, mut backend) = setup(&host, "changes");
    backend.connect().unwrap();

    host.change_buffer_size(32);
    host.change_sample_rate(96000);
    assert_eq!(graph.params().buffer_size, 32);
    assert_eq!(graph.params().sample_rate, 96000);

    host.run_period();
    assert_eq!(host.playback("changes", 0).unwrap().len(), 32);
}

#[test]
fn explicit_disconnect() {
    let host = OfflineHost::new(48000, 16);
    let (_graph, mut backend) = setup(&host, "bye");
    backend.connect().unwrap();
    assert_eq!(backend.connect().unwrap_err(), BackendError::AlreadyConnected);

    backend.disconnect().unwrap();
    assert!(!backend.is_connected());
    assert!(host.clients().is_empty());
    assert_eq!(backend.disconnect().unwrap_err(), BackendError::NotConnected);
}
