mod common;

use std::sync::atomic::Ordering;

use common::{counted, pull, samples};
use klangnetz::units::{Constant, Passthrough};
use klangnetz::{Graph, GraphError, GraphParams};

fn graph(buffer_size: usize) -> Graph {
    Graph::new(GraphParams {
        buffer_size,
        ..GraphParams::default()
    })
    .unwrap()
}

#[test]
fn fan_out_processes_source_once() {
    let graph = graph(256);
    let g = graph.lock();
    let (source, source_calls) = counted(Constant::new(1.0));
    let a = g.register_unit(source).unwrap();
    let b = g.register_unit(Passthrough::audio()).unwrap();
    let c = g.register_unit(Passthrough::audio()).unwrap();
    g.connect(a.output(0), b.input(0)).unwrap();
    g.connect(a.output(0), c.input(0)).unwrap();

    pull(&g, &[b.output(0), c.output(0)]);

    assert_eq!(samples(&g, b.output(0)), vec![1.0; 256]);
    assert_eq!(samples(&g, c.output(0)), vec![1.0; 256]);
    assert_eq!(source_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn diamond_sums_both_paths() {
    let graph = graph(32);
    let g = graph.lock();
    let (source, source_calls) = counted(Constant::new(0.25));
    let (sink, sink_calls) = counted(Passthrough::audio());
    let a = g.register_unit(source).unwrap();
    let b = g.register_unit(Passthrough::audio()).unwrap();
    let c = g.register_unit(Passthrough::audio()).unwrap();
    let d = g.register_unit(sink).unwrap();
    g.connect(a.output(0), b.input(0)).unwrap();
    g.connect(a.output(0), c.input(0)).unwrap();
    g.connect(b.output(0), d.input(0)).unwrap();
    g.connect(c.output(0), d.input(0)).unwrap();

    pull(&g, &[d.output(0), d.output(0)]);

    assert_eq!(samples(&g, d.output(0)), vec![0.5; 32]);
    assert_eq!(source_calls.load(Ordering::SeqCst), 1);
    assert_eq!(sink_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn disabled_source_reads_as_silence_not_stale_data() {
    let graph = graph(64);
    let g = graph.lock();
    let a = g.register_unit(Constant::new(1.0)).unwrap();
    let b = g.register_unit(Passthrough::audio()).unwrap();
    g.connect(a.output(0), b.input(0)).unwrap();

    pull(&g, &[b.output(0)]);
    assert_eq!(samples(&g, b.output(0)), vec![1.0; 64]);

    g.disable(a.id).unwrap();
    pull(&g, &[b.output(0)]);
    assert_eq!(samples(&g, b.output(0)), vec![0.0; 64]);

    g.enable(a.id).unwrap();
    pull(&g, &[b.output(0)]);
    assert_eq!(samples(&g, b.output(0)), vec![1.0; 64]);
}

#[test]
fn disabled_unit_is_never_processed() {
    let graph = graph(16);
    let g = graph.lock();
    let (source, calls) = counted(Constant::new(1.0));
    let a = g.register_unit(source).unwrap();
    g.disable(a.id).unwrap();

    pull(&g, &[a.output(0)]);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(samples(&g, a.output(0)), vec![0.0; 16]);
}

#[test]
fn unreached_units_are_processed_when_the_round_ends() {
    let graph = graph(16);
    let g = graph.lock();
    let (lonely, calls) = counted(Constant::new(1.0));
    let lonely = g.register_unit(lonely).unwrap();

    g.enter_processing_round();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    g.leave_processing_round();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(samples(&g, lonely.output(0)), vec![1.0; 16]);
}

#[test]
fn feedback_reads_previous_round() {
    let graph = graph(8);
    let g = graph.lock();
    let a = g.register_unit(Constant::new(1.0)).unwrap();
    let (through, calls) = counted(Passthrough::audio());
    let b = g.register_unit(through).unwrap();
    g.connect(a.output(0), b.input(0)).unwrap();
    g.connect(b.output(0), b.input(0)).unwrap();

    pull(&g, &[b.output(0)]);
    assert_eq!(samples(&g, b.output(0)), vec![1.0; 8]);
    pull(&g, &[b.output(0)]);
    assert_eq!(samples(&g, b.output(0)), vec![2.0; 8]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn each_round_advances_the_clock() {
    let graph = graph(128);
    let g = graph.lock();
    assert_eq!(g.context().round, 0);

    g.enter_processing_round();
    assert!(g.in_processing_round());
    assert_eq!(g.context().round, 1);
    assert_eq!(g.context().frame_time, 0);
    g.leave_processing_round();
    assert!(!g.in_processing_round());

    g.process_round();
    assert_eq!(g.context().round, 2);
    assert_eq!(g.context().frame_time, 128);
}

#[test]
fn sync_needs_an_active_round() {
    let graph = graph(16);
    let g = graph.lock();
    let a = g.register_unit(Constant::new(1.0)).unwrap();
    assert_eq!(g.sync(a.output(0)), Err(GraphError::OutsideProcessingRound));
    assert_eq!(g.bump(a.id), Err(GraphError::OutsideProcessingRound));
}

#[test]
fn topology_is_frozen_during_a_round() {
    let graph = graph(16);
    let g = graph.lock();
    let a = g.register_unit(Constant::new(1.0)).unwrap();
    let b = g.register_unit(Passthrough::audio()).unwrap();

    g.enter_processing_round();
    assert_eq!(g.connect(a.output(0), b.input(0)), Err(GraphError::InsideProcessingRound));
    assert!(matches!(
        g.register_unit(Passthrough::audio()),
        Err(GraphError::InsideProcessingRound)
    ));
    assert_eq!(g.set_buffer_size(32), Err(GraphError::InsideProcessingRound));
    g.leave_processing_round();

    g.connect(a.output(0), b.input(0)).unwrap();
}

#[test]
fn process_round_pulls_through_the_audio_root() {
    let graph = graph(16);
    let g = graph.lock();
    let (source, calls) = counted(Constant::new(0.5));
    let a = g.register_unit(source).unwrap();
    let root = g.register_unit(Passthrough::audio()).unwrap();
    g.connect(a.output(0), root.input(0)).unwrap();
    g.register_audio_backend(root.id).unwrap();

    g.process_round();
    assert_eq!(samples(&g, root.output(0)), vec![0.5; 16]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
