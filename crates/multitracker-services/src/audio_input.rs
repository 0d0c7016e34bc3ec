//! Audio capture devices

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, StreamConfig};
use crossbeam_channel::Sender;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum AudioInputError {
    #[error("No audio input devices found")]
    NoDevices,
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
    #[error("Failed to get input config: {0}")]
    ConfigError(String),
    #[error("Failed to build input stream: {0}")]
    StreamError(String),
}

#[derive(Debug, Clone)]
pub struct InputDevice {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub is_default: bool,
}

/// A running capture stream. Dropping it stops delivery.
pub struct InputStreamHandle {
    stop_flag: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    sample_rate: u32,
    channels: u16,
    _stream: cpal::Stream,
}

impl InputStreamHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Chunks the receiver could not accept
    pub fn dropped_chunks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}

impl Drop for InputStreamHandle {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}

pub struct AudioInputService;

impl AudioInputService {
    pub fn list_devices() -> Result<Vec<InputDevice>, AudioInputError> {
        let host = cpal::default_host();
        let default_name = host.default_input_device().and_then(|d| d.name().ok());

        let devices: Vec<_> = host
            .input_devices()
            .map_err(|e| AudioInputError::ConfigError(e.to_string()))?
            .filter_map(|device| {
                let name = device.name().ok()?;
                let config = device.default_input_config().ok()?;
                Some(InputDevice {
                    is_default: default_name.as_deref() == Some(name.as_str()),
                    name,
                    sample_rate: config.sample_rate().0,
                    channels: config.channels(),
                })
            })
            .collect();

        if devices.is_empty() {
            return Err(AudioInputError::NoDevices);
        }

        info!(count = devices.len(), "Found audio input devices");
        Ok(devices)
    }

    /// Device by name, or the host default for "default"
    fn get_device(device_name: &str) -> Result<Device, AudioInputError> {
        let host = cpal::default_host();

        if device_name == "default" {
            return host.default_input_device().ok_or(AudioInputError::NoDevices);
        }

        host.input_devices()
            .map_err(|e| AudioInputError::ConfigError(e.to_string()))?
            .find(|device| device.name().is_ok_and(|name| name == device_name))
            .ok_or_else(|| AudioInputError::DeviceNotFound(device_name.to_string()))
    }

    /// Start delivering interleaved f32 chunks to `chunk_tx`.
    pub fn start_stream(
        device_name: &str,
        chunk_tx: Sender<Vec<f32>>,
    ) -> Result<InputStreamHandle, AudioInputError> {
        let device = Self::get_device(device_name)?;
        let config = device
            .default_input_config()
            .map_err(|e| AudioInputError::ConfigError(e.to_string()))?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();

        info!(
            device = %device.name().unwrap_or_default(),
            sample_rate,
            channels,
            "Starting audio input stream"
        );

        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();
        let dropped = Arc::new(AtomicU64::new(0));
        let sink = ChunkSink { tx: chunk_tx, dropped: dropped.clone() };
        let stream_config: StreamConfig = config.clone().into();

        let stream = match config.sample_format() {
            SampleFormat::F32 => Self::build_stream::<f32>(&device, &stream_config, sink, stop_clone),
            SampleFormat::I16 => Self::build_stream::<i16>(&device, &stream_config, sink, stop_clone),
            SampleFormat::I32 => Self::build_stream::<i32>(&device, &stream_config, sink, stop_clone),
            format => return Err(AudioInputError::ConfigError(format!("Unsupported format: {:?}", format))),
        }?;

        stream.play().map_err(|e| AudioInputError::StreamError(e.to_string()))?;

        Ok(InputStreamHandle { stop_flag, dropped, sample_rate, channels, _stream: stream })
    }

    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        sink: ChunkSink,
        stop_flag: Arc<AtomicBool>,
    ) -> Result<cpal::Stream, AudioInputError>
    where
        T: cpal::Sample + cpal::SizedSample + Send + 'static,
        f32: FromSample<T>,
    {
        device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    if stop_flag.load(Ordering::SeqCst) {
                        return;
                    }
                    let samples: Vec<f32> = data.iter().map(|s| f32::from_sample_(*s)).collect();
                    sink.send(samples);
                },
                |err| error!("Input stream error: {}", err),
                None,
            )
            .map_err(|e| AudioInputError::StreamError(e.to_string()))
    }
}

/// Callback side of an input stream. A chunk the receiver cannot take is
/// counted, never blocked on.
struct ChunkSink {
    tx: Sender<Vec<f32>>,
    dropped: Arc<AtomicU64>,
}

impl ChunkSink {
    fn send(&self, chunk: Vec<f32>) {
        if self.tx.try_send(chunk).is_ok() {
            return;
        }
        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        if dropped == 1 || dropped % 100 == 0 {
            warn!(dropped, "Input chunk dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_full_or_closed_receiver_counts_drops() {
        let (tx, rx) = bounded(2);
        let sink = ChunkSink { tx, dropped: Arc::new(AtomicU64::new(0)) };
        for i in 0..5 {
            sink.send(vec![i as f32]);
        }
        assert_eq!(sink.dropped.load(Ordering::Relaxed), 3);
        assert_eq!(rx.try_recv().unwrap(), vec![0.0]);

        drop(rx);
        sink.send(vec![9.0]);
        assert_eq!(sink.dropped.load(Ordering::Relaxed), 4);
    }
}
