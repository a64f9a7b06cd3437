//! Example: render a patch offline and print the session
//!
//! Run with: cargo run --example offline_render [config.toml]
//!
//! Builds the engine from a configuration file (or defaults), plays a short
//! melody into a sine through the event capture port, renders two seconds into a
//! tap and prints the resulting topology as JSON.

use klangnetz::backend::OfflineHost;
use klangnetz::units::{Gain, NoteGate, PeakMeter, Sine, Tap};
use klangnetz::{logging, Config, Context, Event, EventKind};

fn main() {
    logging::init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path).unwrap_or_else(|err| {
            eprintln!("{err}");
            std::process::exit(1);
        }),
        None => Config::default(),
    };
    let ctx = Context::new(config).expect("valid configuration");
    let client = ctx.config().backend.client_name.clone();
    let host = OfflineHost::new(ctx.config().graph.sample_rate, ctx.config().graph.buffer_size);
    let mut backend = ctx.backend(host.server()).expect("backend units");

    let (tap, mut reader) = Tap::mono(ctx.config().graph.sample_rate as usize * 4);
    let (meter, reading) = PeakMeter::new();
    {
        let g = ctx.graph().lock();
        let events = backend.transport().event_unit().clone();
        let audio = backend.transport().audio_unit().clone();

        let sine = g.register_unit(Sine::new(220.0)).unwrap();
        let gate = g.register_unit(NoteGate::new()).unwrap();
        let vca = g.register_unit(Gain::new(0.5)).unwrap();
        let tap = g.register_unit(tap).unwrap();
        let meter = g.register_unit(meter).unwrap();
        g.set_title(sine.id, "lead").unwrap();

        g.connect(events.output(0), sine.input(0)).unwrap();
        g.connect(events.output(0), gate.input(0)).unwrap();
        g.connect(sine.output(0), vca.input(0)).unwrap();
        g.connect(gate.output(0), meter.input(0)).unwrap();
        g.connect(vca.output(0), tap.input(0)).unwrap();
        for playback in &audio.inputs {
            g.connect(vca.output(0), *playback).unwrap();
        }
    }
    backend.connect().expect("offline server accepts connections");

    let melody = [57u8, 60, 64, 69, 64, 60];
    let periods = (2 * host.sample_rate() as usize) / host.buffer_size();
    let step = periods / melody.len();
    for period in 0..periods {
        if period % step == 0 {
            if let Some(&note) = melody.get(period / step) {
                let on = Event::new(0, EventKind::NoteOn { channel: 0, note, velocity: 100 });
                host.queue_event(&client, 0, on).unwrap();
            }
        }
        host.run_period();
    }

    let rendered = reader.drain();
    println!(
        "Rendered {} samples in {} periods, gate peak {:.3}, overruns {}",
        rendered.len(),
        backend.transport().periods(),
        reading.hold(),
        reader.overruns()
    );

    let snapshot = ctx.graph().lock().snapshot().expect("snapshot");
    match serde_json::to_string_pretty(&snapshot) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("could not serialize session: {err}"),
    }
}
