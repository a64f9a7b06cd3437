//! Simple example: play a sine wave on a chosen output device
//!
//! Run with: cargo run --example simple_sine --features cpal_backend
//!
//! Lists available devices and lets you pick one, then plays a 440Hz sine whose
//! pitch drifts slowly.

use std::io::{self, Write};
use std::thread::sleep;
use std::time::{Duration, Instant};

use klangnetz::backend::{Backend, ClientSpec, CpalDevice};
use klangnetz::units::{Sine, SineMessage};
use klangnetz::{logging, Graph};

fn main() {
    logging::init();

    let devices = CpalDevice::list_outputs();
    if devices.is_empty() {
        eprintln!("No audio output devices found!");
        return;
    }

    println!("Available audio output devices:");
    for (i, device) in devices.iter().enumerate() {
        println!(
            "  [{}] {} ({}Hz, {} ch)",
            i,
            device.name(),
            device.sample_rate(),
            device.channels()
        );
    }

    print!("\nSelect device [0]: ");
    io::stdout().flush().unwrap();
    let mut input = String::new();
    io::stdin().read_line(&mut input).unwrap();
    let choice: usize = input.trim().parse().unwrap_or(0);

    let device = devices.into_iter().nth(choice).unwrap_or_else(|| {
        println!("Invalid choice, using default device");
        CpalDevice::default_output().expect("No default device")
    });
    println!("\nUsing: {} @ {}Hz", device.name(), device.sample_rate());

    let graph = Graph::default();
    let client = ClientSpec::new("simple_sine").with_audio(0, 2);
    let mut backend =
        Backend::new(&graph, device.into_server(256), client).expect("backend units");

    let (sine, mut sine_control) = Sine::new(440.0).with_amplitude(0.25).controlled();
    {
        let g = graph.lock();
        let sine = g.register_unit(sine).unwrap();
        for playback in &backend.transport().audio_unit().inputs {
            g.connect(sine.output(0), *playback).unwrap();
        }
    }

    if let Err(err) = backend.connect() {
        eprintln!("Could not start audio: {err}");
        return;
    }

    println!("Playing 440Hz sine wave...");
    println!("Press Ctrl+C to stop\n");

    let start = Instant::now();
    while backend.is_connected() {
        let elapsed = start.elapsed().as_secs_f32();
        let freq = 440.0 + 220.0 * (elapsed * 0.5 * std::f32::consts::PI).sin();
        let _ = sine_control.send(SineMessage::SetFrequency(freq));
        sleep(Duration::from_millis(10));
    }
    println!("Audio device went away.");
}
