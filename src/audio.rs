//! Audio input capture and device management
//!
//! The acquisition loop only sees the [`AudioSource`] trait: acquire a
//! device, pull the most recent N samples, release. [`MicrophoneSource`]
//! implements it on top of cpal, with the device callback feeding a rolling
//! buffer behind a mutex that the loop reads synchronously.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Sample, SampleFormat, Stream, StreamConfig};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};

use crate::error::{AudioError, AudioResult};

const DEFAULT_SAMPLE_RATE: f32 = 44100.0;

/// A fixed-length block of mono samples in roughly [-1, 1], tagged with the
/// rate it was captured at.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: f32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: f32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        (self.samples.iter().map(|s| s * s).sum::<f32>() / self.samples.len() as f32).sqrt()
    }
}

/// Where the acquisition loop gets its audio from.
pub trait AudioSource {
    /// Open the device and start capturing.
    fn acquire(&mut self) -> AudioResult<()>;

    /// Synchronous pull of the most recent `buffer_size` samples.
    fn read(&mut self, buffer_size: usize) -> AudioResult<AudioBuffer>;

    fn sample_rate(&self) -> f32;

    /// Stop capturing and close the device. Safe to call when not acquired.
    fn release(&mut self);
}

/// Rolling window of the most recent samples, written by the device
/// callback and read by the acquisition loop.
#[derive(Debug, Clone)]
pub struct AudioData {
    samples: Vec<f32>,
    capacity: usize,
    pub sample_rate: f32,
}

impl AudioData {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }

    pub fn push_samples(&mut self, new_samples: &[f32]) {
        if new_samples.len() >= self.capacity {
            self.samples.clear();
            self.samples
                .extend_from_slice(&new_samples[new_samples.len() - self.capacity..]);
        } else {
            if self.samples.len() + new_samples.len() > self.capacity {
                let overflow = (self.samples.len() + new_samples.len()) - self.capacity;
                self.samples.drain(0..overflow);
            }
            self.samples.extend_from_slice(new_samples);
        }
    }

    /// The newest `count` samples, left-padded with silence while the
    /// window is still filling.
    pub fn latest(&self, count: usize) -> Vec<f32> {
        let available = self.samples.len().min(count);
        let mut out = vec![0.0; count - available];
        out.extend_from_slice(&self.samples[self.samples.len() - available..]);
        out
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Microphone capture through cpal.
pub struct MicrophoneSource {
    audio_data: Arc<Mutex<AudioData>>,
    device_name: Option<String>,
    stream: Option<Stream>,
}

impl MicrophoneSource {
    /// `device_name` selects an input by name, `None` uses the host default.
    /// `capacity` bounds the rolling window and should be at least the
    /// loop's buffer size.
    pub fn new(device_name: Option<String>, capacity: usize) -> Self {
        Self {
            audio_data: Arc::new(Mutex::new(AudioData::new(capacity))),
            device_name,
            stream: None,
        }
    }

    pub fn is_acquired(&self) -> bool {
        self.stream.is_some()
    }

    fn select_device(&self) -> AudioResult<Device> {
        let host = cpal::default_host();
        match &self.device_name {
            None => host.default_input_device().ok_or(AudioError::NoInputDevice),
            Some(wanted) => {
                for device in host.input_devices()? {
                    if device.name().map(|name| &name == wanted).unwrap_or(false) {
                        return Ok(device);
                    }
                }
                Err(AudioError::DeviceNotFound(wanted.clone()))
            }
        }
    }

    fn open_stream(&self, device: &Device) -> AudioResult<Stream> {
        let config = device.default_input_config()?;
        let actual_sample_rate = config.sample_rate().0 as f32;

        info!("Input device: {}", device.name()?);
        debug!("Default input config: {:?}", config);
        info!("Actual sample rate: {} Hz", actual_sample_rate);

        {
            let mut audio_data = self
                .audio_data
                .lock()
                .map_err(|_| AudioError::LockPoisoned)?;
            audio_data.clear();
            audio_data.sample_rate = actual_sample_rate;
        }

        let audio_data = self.audio_data.clone();
        let stream_config: StreamConfig = config.config();
        let stream = match config.sample_format() {
            SampleFormat::I8 => create_stream::<i8>(device, &stream_config, audio_data)?,
            SampleFormat::I16 => create_stream::<i16>(device, &stream_config, audio_data)?,
            SampleFormat::I32 => create_stream::<i32>(device, &stream_config, audio_data)?,
            SampleFormat::I64 => create_stream::<i64>(device, &stream_config, audio_data)?,
            SampleFormat::U8 => create_stream::<u8>(device, &stream_config, audio_data)?,
            SampleFormat::U16 => create_stream::<u16>(device, &stream_config, audio_data)?,
            SampleFormat::U32 => create_stream::<u32>(device, &stream_config, audio_data)?,
            SampleFormat::U64 => create_stream::<u64>(device, &stream_config, audio_data)?,
            SampleFormat::F32 => create_stream::<f32>(device, &stream_config, audio_data)?,
            SampleFormat::F64 => create_stream::<f64>(device, &stream_config, audio_data)?,
            other => return Err(AudioError::UnsupportedSampleFormat(format!("{other:?}"))),
        };

        stream.play()?;
        Ok(stream)
    }
}

impl AudioSource for MicrophoneSource {
    fn acquire(&mut self) -> AudioResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let device = self.select_device()?;
        self.stream = Some(self.open_stream(&device)?);
        Ok(())
    }

    fn read(&mut self, buffer_size: usize) -> AudioResult<AudioBuffer> {
        if self.stream.is_none() {
            return Err(AudioError::NotAcquired);
        }
        let audio_data = self
            .audio_data
            .lock()
            .map_err(|_| AudioError::LockPoisoned)?;
        let sample_rate = audio_data.sample_rate;
        Ok(AudioBuffer::new(audio_data.latest(buffer_size), sample_rate))
    }

    fn sample_rate(&self) -> f32 {
        self.audio_data
            .lock()
            .map(|audio_data| audio_data.sample_rate)
            .unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                warn!("Failed to pause input stream: {}", err);
            }
            drop(stream);
            if let Ok(mut audio_data) = self.audio_data.lock() {
                audio_data.clear();
            }
            info!("Input stream closed");
        }
    }
}

impl Drop for MicrophoneSource {
    fn drop(&mut self) {
        self.release();
    }
}

fn create_stream<T>(
    device: &Device,
    config: &StreamConfig,
    audio_data: Arc<Mutex<AudioData>>,
) -> AudioResult<Stream>
where
    T: Sample + cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let channels = config.channels.max(1) as usize;
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let mono = downmix::<T>(data, channels);
            if let Ok(mut audio_data) = audio_data.lock() {
                audio_data.push_samples(&mono);
            }
        },
        |err| warn!("Audio stream error: {}", err),
        None,
    )?;

    Ok(stream)
}

/// Averages interleaved frames down to one channel.
fn downmix<T>(data: &[T], channels: usize) -> Vec<f32>
where
    T: Sample,
    f32: cpal::FromSample<T>,
{
    if channels == 1 {
        return data.iter().map(|&sample| f32::from_sample(sample)).collect();
    }
    data.chunks(channels)
        .map(|frame| {
            frame.iter().map(|&sample| f32::from_sample(sample)).sum::<f32>() / frame.len() as f32
        })
        .collect()
}

pub fn list_input_devices() -> AudioResult<Vec<String>> {
    let host = cpal::default_host();
    let mut names = Vec::new();

    for device in host.input_devices()? {
        if let Ok(name) = device.name() {
            names.push(name);
        }
    }

    Ok(names)
}

pub fn default_input_device_name() -> AudioResult<String> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(AudioError::NoInputDevice)?;
    Ok(device.name()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_window_keeps_newest_samples() {
        let mut data = AudioData::new(4);
        data.push_samples(&[1.0, 2.0, 3.0]);
        data.push_samples(&[4.0, 5.0]);
        assert_eq!(data.latest(4), vec![2.0, 3.0, 4.0, 5.0]);

        data.push_samples(&[6.0, 7.0, 8.0, 9.0, 10.0, 11.0]);
        assert_eq!(data.latest(4), vec![8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn test_latest_pads_with_silence_while_filling() {
        let mut data = AudioData::new(8);
        data.push_samples(&[0.5, -0.5]);
        assert_eq!(data.latest(4), vec![0.0, 0.0, 0.5, -0.5]);
        assert_eq!(data.latest(1), vec![-0.5]);
    }

    #[test]
    fn test_downmix_averages_frames() {
        let stereo = [0.5f32, -0.5, 1.0, 0.0, 0.25, 0.25];
        assert_eq!(downmix(&stereo, 2), vec![0.0, 0.5, 0.25]);
        assert_eq!(downmix(&stereo[..2], 1), vec![0.5, -0.5]);
    }

    #[test]
    fn test_buffer_rms() {
        assert_eq!(AudioBuffer::new(Vec::new(), 44100.0).rms(), 0.0);
        let square = AudioBuffer::new(vec![0.5, -0.5, 0.5, -0.5], 44100.0);
        assert!((square.rms() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_read_before_acquire_is_an_error() {
        let mut source = MicrophoneSource::new(None, 1024);
        assert!(!source.is_acquired());
        assert!(matches!(source.read(512), Err(AudioError::NotAcquired)));
        source.release();
    }
}
