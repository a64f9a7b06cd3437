#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use klangnetz::{GraphGuard, GraphParams, Notification, Persistent, PortId, PortSpec, Unit, UnitIo};
use parking_lot::Mutex;

/// Wraps a unit and counts how often it is processed.
pub struct Counted<U> {
    inner: U,
    calls: Arc<AtomicUsize>,
}

pub fn counted<U: Unit>(inner: U) -> (Counted<U>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    (
        Counted {
            inner,
            calls: calls.clone(),
        },
        calls,
    )
}

impl<U: Unit> Unit for Counted<U> {
    fn kind(&self) -> &str {
        self.inner.kind()
    }

    fn ports(&self) -> Vec<PortSpec> {
        self.inner.ports()
    }

    fn process(&mut self, io: &mut UnitIo<'_>) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.process(io);
    }

    fn panic(&mut self) {
        self.inner.panic();
    }

    fn graph_updated(&mut self, params: &GraphParams) {
        self.inner.graph_updated(params);
    }

    fn notify(&mut self, notification: &dyn Notification) {
        self.inner.notify(notification);
    }

    fn persistence(&mut self) -> Option<&mut dyn Persistent> {
        self.inner.persistence()
    }
}

/// What a [`Recorder`] saw.
#[derive(Default)]
pub struct Seen {
    pub params: Vec<GraphParams>,
    pub notifications: Vec<String>,
    pub panics: usize,
}

/// Records every callback other than `process`.
pub struct Recorder {
    seen: Arc<Mutex<Seen>>,
}

pub fn recorder() -> (Recorder, Arc<Mutex<Seen>>) {
    let seen = Arc::new(Mutex::new(Seen::default()));
    (Recorder { seen: seen.clone() }, seen)
}

impl Unit for Recorder {
    fn kind(&self) -> &str {
        "recorder"
    }

    fn ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::audio_in("in"), PortSpec::audio_out("out")]
    }

    fn process(&mut self, io: &mut UnitIo<'_>) {
        if let Some((input, output)) = io.audio_through(0, 0) {
            output.copy_from(input);
        }
    }

    fn panic(&mut self) {
        self.seen.lock().panics += 1;
    }

    fn graph_updated(&mut self, params: &GraphParams) {
        self.seen.lock().params.push(*params);
    }

    fn notify(&mut self, notification: &dyn Notification) {
        self.seen.lock().notifications.push(format!("{notification:?}"));
    }
}

/// Samples of an audio port.
pub fn samples(g: &GraphGuard<'_>, port: PortId) -> Vec<f32> {
    g.with_buffer(port, |buf| buf.as_audio().expect("audio port").as_slice().to_vec())
        .expect("port exists")
}

/// Run one round pulling the given ports.
pub fn pull(g: &GraphGuard<'_>, ports: &[PortId]) {
    g.enter_processing_round();
    for port in ports {
        g.sync(*port).expect("sync inside round");
    }
    g.leave_processing_round();
}
