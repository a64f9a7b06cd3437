use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use klangnetz::units::{Gain, Mixer, Passthrough, Sine};
use klangnetz::{Graph, GraphParams};

/// `voices` sines through gains into one mixer, pulled through a root unit.
fn voice_graph(voices: usize) -> Graph {
    let graph = Graph::new(GraphParams {
        buffer_size: 256,
        ..GraphParams::default()
    })
    .unwrap();
    {
        let g = graph.lock();
        let mixer = g.register_unit(Mixer::new(voices)).unwrap();
        for voice in 0..voices {
            let sine = g.register_unit(Sine::new(110.0 * (voice + 1) as f32)).unwrap();
            let gain = g.register_unit(Gain::new(0.1)).unwrap();
            g.connect(sine.output(0), gain.input(0)).unwrap();
            g.connect(gain.output(0), mixer.input(voice)).unwrap();
        }
        let root = g.register_unit(Passthrough::audio()).unwrap();
        g.connect(mixer.output(0), root.input(0)).unwrap();
        g.register_audio_backend(root.id).unwrap();
    }
    graph
}

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("Sine round (256 frames)", |b| {
        let graph = voice_graph(1);
        b.iter(|| graph.lock().process_round())
    });

    let mut group = c.benchmark_group("process_round");
    for voices in [4, 16, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(voices), &voices, |b, &voices| {
            let graph = voice_graph(voices);
            b.iter(|| {
                let g = graph.lock();
                g.process_round();
                black_box(g.context().round)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
