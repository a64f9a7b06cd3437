//! Output through a cpal device.
//!
//! cpal hands out callbacks of whatever size the driver picks, so the server renders
//! fixed periods of `buffer_size` frames and feeds them out in pieces. The stream
//! lives on a dedicated thread for as long as the connection does.
//!
//! ```no_run
//! use klangnetz::backend::{Backend, ClientSpec, CpalDevice};
//! use klangnetz::Graph;
//!
//! for device in CpalDevice::list_outputs() {
//!     println!("{}: {} Hz, {} ch", device.name(), device.sample_rate(), device.channels());
//! }
//!
//! let graph = Graph::default();
//! let device = CpalDevice::default_output().expect("no output device");
//! let server = device.into_server(256);
//! let mut backend = Backend::new(&graph, server, ClientSpec::new("demo")).unwrap();
//! backend.connect().unwrap();
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, StreamError, SupportedStreamConfig};
use crossbeam_channel::{bounded, Sender};

use crate::buffer::{Event, DEFAULT_EVENT_CAPACITY};
use crate::error::BackendError;

use super::{ClientSpec, Period, Server, ServerHandler, ServerInfo};

/// A discovered audio output device.
#[derive(Clone)]
pub struct CpalDevice {
    device: cpal::Device,
    config: SupportedStreamConfig,
    name: String,
}

impl CpalDevice {
    /// The host's default output device, if there is one.
    pub fn default_output() -> Option<Self> {
        let host = cpal::default_host();
        Self::from_device(host.default_output_device()?)
    }

    /// Every output device the default host can open. Empty if enumeration fails.
    pub fn list_outputs() -> Vec<Self> {
        let host = cpal::default_host();
        host.output_devices()
            .map(|devices| devices.filter_map(Self::from_device).collect())
            .unwrap_or_default()
    }

    fn from_device(device: cpal::Device) -> Option<Self> {
        let config = device.default_output_config().ok()?;
        let name = device.name().unwrap_or_else(|_| "Unknown".into());
        Some(Self { device, config, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate().0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels()
    }

    /// A server rendering periods of `buffer_size` frames on this device.
    pub fn into_server(self, buffer_size: usize) -> CpalServer {
        CpalServer {
            device: self,
            buffer_size: buffer_size.max(1),
            running: None,
        }
    }
}

struct Running {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

/// A [`Server`] that plays a client's audio outputs on a cpal device.
///
/// Captures stay silent and event ports carry nothing; the device only plays.
pub struct CpalServer {
    device: CpalDevice,
    buffer_size: usize,
    running: Option<Running>,
}

impl CpalServer {
    /// Server on the host's default output device.
    pub fn default_output(buffer_size: usize) -> Result<Self, BackendError> {
        CpalDevice::default_output()
            .map(|device| device.into_server(buffer_size))
            .ok_or_else(|| BackendError::ServerUnavailable("cpal".to_owned()))
    }

    pub fn device(&self) -> &CpalDevice {
        &self.device
    }
}

impl Server for CpalServer {
    fn name(&self) -> &str {
        "cpal"
    }

    fn connect(
        &mut self,
        client: &ClientSpec,
        handler: Arc<dyn ServerHandler>,
    ) -> Result<ServerInfo, BackendError> {
        if self.running.is_some() {
            return Err(BackendError::AlreadyConnected);
        }
        let device = self.device.device.clone();
        let config = self.device.config.clone();
        let renderer = Renderer::new(client, handler, self.buffer_size, config.channels() as usize);

        let (ready_tx, ready_rx) = bounded(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let thread = thread::Builder::new()
            .name(format!("{}-cpal", client.name))
            .spawn(move || {
                let stream = match build_stream(&device, &config, renderer).and_then(|stream| {
                    stream.play().map_err(BackendError::stream)?;
                    Ok(stream)
                }) {
                    Ok(stream) => stream,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Keep the stream alive until asked to stop.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(BackendError::stream)?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = thread.join();
                return Err(err);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(BackendError::stream("cpal stream thread exited"));
            }
        }

        self.running = Some(Running { stop: stop_tx, thread });
        Ok(ServerInfo {
            server_name: format!("cpal:{}", self.device.name),
            sample_rate: self.device.sample_rate(),
            buffer_size: self.buffer_size,
        })
    }

    fn disconnect(&mut self) -> Result<(), BackendError> {
        let running = self.running.take().ok_or(BackendError::NotConnected)?;
        let _ = running.stop.send(());
        running
            .thread
            .join()
            .map_err(|_| BackendError::stream("cpal stream thread panicked"))
    }

    fn is_connected(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.thread.is_finished())
    }
}

impl Drop for CpalServer {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}

/// Runs periods inside the cpal callback and interleaves them out.
struct Renderer {
    handler: Arc<dyn ServerHandler>,
    frames: usize,
    channels: usize,
    cursor: usize,
    audio_in: Vec<Vec<f32>>,
    audio_out: Vec<Vec<f32>>,
    events_in: Vec<Vec<Event>>,
    events_out: Vec<Vec<Event>>,
}

impl Renderer {
    fn new(
        client: &ClientSpec,
        handler: Arc<dyn ServerHandler>,
        frames: usize,
        channels: usize,
    ) -> Self {
        Self {
            handler,
            frames,
            channels: channels.max(1),
            cursor: frames,
            audio_in: vec![vec![0.0; frames]; client.audio_inputs],
            audio_out: vec![vec![0.0; frames]; client.audio_outputs],
            events_in: vec![Vec::new(); client.event_inputs],
            events_out: (0..client.event_outputs)
                .map(|_| Vec::with_capacity(DEFAULT_EVENT_CAPACITY))
                .collect(),
        }
    }

    fn render(&mut self) {
        let mut period = Period {
            frames: self.frames,
            audio_in: &self.audio_in,
            audio_out: &mut self.audio_out,
            events_in: &self.events_in,
            events_out: &mut self.events_out,
        };
        self.handler.process(&mut period);
    }

    /// Device channels past the client's outputs repeat its last output.
    fn fill<T: SizedSample + FromSample<f32>>(&mut self, data: &mut [T]) {
        for frame in data.chunks_mut(self.channels) {
            if self.cursor >= self.frames {
                self.render();
                self.cursor = 0;
            }
            for (channel, sample) in frame.iter_mut().enumerate() {
                let value = self
                    .audio_out
                    .get(channel)
                    .or_else(|| self.audio_out.last())
                    .map_or(0.0, |samples| samples[self.cursor]);
                *sample = T::from_sample(value.clamp(-1.0, 1.0));
            }
            self.cursor += 1;
        }
    }
}

fn build_stream(
    device: &cpal::Device,
    config: &SupportedStreamConfig,
    renderer: Renderer,
) -> Result<cpal::Stream, BackendError> {
    match config.sample_format() {
        SampleFormat::F32 => build_typed::<f32>(device, config, renderer),
        SampleFormat::I16 => build_typed::<i16>(device, config, renderer),
        SampleFormat::U16 => build_typed::<u16>(device, config, renderer),
        other => Err(BackendError::stream(format!("unsupported sample format {other:?}"))),
    }
}

fn build_typed<T: SizedSample + FromSample<f32>>(
    device: &cpal::Device,
    config: &SupportedStreamConfig,
    mut renderer: Renderer,
) -> Result<cpal::Stream, BackendError> {
    let handler = renderer.handler.clone();
    device
        .build_output_stream(
            &config.config(),
            move |data: &mut [T], _| renderer.fill(data),
            move |err| match err {
                StreamError::DeviceNotAvailable => {
                    handler.shutdown("cpal device is no longer available")
                }
                other => tracing::warn!(error = %other, "cpal stream error"),
            },
            None,
        )
        .map_err(BackendError::stream)
}
