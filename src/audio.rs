//! Playback of captured audio on the default output device (cpal).
//!
//! The player subscribes to the feed like a session does. Samples are
//! resampled from the console rate to the device rate and queued on a
//! bounded channel the cpal callback drains; underruns play silence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use capview_katsukity::AUDIO_SAMPLE_RATE;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Sample, SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use flume::RecvTimeoutError;

use crate::config::AudioConfig;
use crate::error::{CapviewError, CapviewResult};
use crate::feed::{FrameFeed, Subscription};

/// Streaming linear resampler for interleaved stereo i16.
pub struct Resampler {
    step: f64,
    pos: f64,
    prev: [f32; 2],
}

impl Resampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            step: from_rate as f64 / to_rate.max(1) as f64,
            pos: 0.0,
            prev: [0.0; 2],
        }
    }

    /// Resample one chunk. State carries over so chunk boundaries are seamless.
    pub fn process(&mut self, input: &[i16]) -> Vec<[f32; 2]> {
        let frames: Vec<[f32; 2]> = input
            .chunks_exact(2)
            .map(|s| [s[0].to_sample::<f32>(), s[1].to_sample::<f32>()])
            .collect();
        let n = frames.len();
        let mut out = Vec::with_capacity((n as f64 / self.step) as usize + 1);

        // Positions index [prev, frames[0], frames[1], ...]
        while self.pos < n as f64 {
            let i = self.pos.floor() as usize;
            let t = (self.pos - i as f64) as f32;
            let a = if i == 0 { self.prev } else { frames[i - 1] };
            let b = frames[i];
            out.push([a[0] + (b[0] - a[0]) * t, a[1] + (b[1] - a[1]) * t]);
            self.pos += self.step;
        }

        if let Some(last) = frames.last() {
            self.prev = *last;
            self.pos -= n as f64;
        }
        out
    }
}

/// Map stereo frames onto the device's channel count.
pub fn map_channels(frames: &[[f32; 2]], channels: u16, volume: f32, out: &mut Vec<f32>) {
    for &[l, r] in frames {
        match channels {
            0 => {},
            1 => out.push((l + r) * 0.5 * volume),
            n => {
                out.push(l * volume);
                out.push(r * volume);
                out.extend(std::iter::repeat(0.0).take(n as usize - 2));
            },
        }
    }
}

/// Plays the feed's audio until stopped or the feed ends.
pub struct AudioPlayer {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl AudioPlayer {
    /// Subscribe to `feed` and start playback on a background thread.
    ///
    /// Opening the output device happens on that thread; if it fails the
    /// player logs and goes idle without affecting video.
    pub fn start(feed: &FrameFeed, config: &AudioConfig) -> CapviewResult<Self> {
        let subscription = feed.subscribe("audio", 8)?;
        let stop = Arc::new(AtomicBool::new(false));
        let config = config.clone();

        let thread_stop = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name("capview-audio".to_string())
            .spawn(move || {
                if let Err(e) = playback_loop(subscription, &config, &thread_stop) {
                    log::warn!("[AUDIO] Playback disabled: {}", e);
                }
            })
            .map_err(|e| CapviewError::Audio(format!("Failed to spawn audio thread: {}", e)))?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// The playback thread has exited (feed ended or no output device).
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for AudioPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_output(config: &AudioConfig) -> CapviewResult<(Stream, StreamConfig, Sender<f32>)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| CapviewError::Audio("No output device available".to_string()))?;

    let supported = device
        .default_output_config()
        .map_err(|e| CapviewError::Audio(format!("Failed to get output config: {}", e)))?;
    let sample_format = supported.sample_format();
    let stream_config: StreamConfig = supported.into();

    let capacity = (config.buffer_ms as usize * stream_config.sample_rate as usize / 1000)
        * stream_config.channels as usize;
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, rx)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, rx)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, rx)?,
        other => {
            return Err(CapviewError::Audio(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        },
    };

    stream
        .play()
        .map_err(|e| CapviewError::Audio(format!("Failed to start playback: {}", e)))?;

    log::info!(
        "[AUDIO] Output started: {} Hz, {} channels, {:?}",
        stream_config.sample_rate,
        stream_config.channels,
        sample_format
    );
    Ok((stream, stream_config, tx))
}

fn build_stream<T>(device: &Device, config: &StreamConfig, rx: Receiver<f32>) -> CapviewResult<Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let data_callback = move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        for sample in data.iter_mut() {
            *sample = T::from_sample(rx.try_recv().unwrap_or(0.0));
        }
    };
    let err_fn = |err| log::warn!("[AUDIO] Stream error: {}", err);

    device
        .build_output_stream(config, data_callback, err_fn, None)
        .map_err(|e| CapviewError::Audio(format!("Failed to build output stream: {}", e)))
}

fn playback_loop(subscription: Subscription, config: &AudioConfig, stop: &AtomicBool) -> CapviewResult<()> {
    let (_stream, stream_config, tx) = open_output(config)?;
    let mut resampler = Resampler::new(AUDIO_SAMPLE_RATE, stream_config.sample_rate);
    let mut samples = Vec::new();
    let mut dropped: u64 = 0;

    while !stop.load(Ordering::SeqCst) {
        let frame = match subscription.recv_timeout(Duration::from_millis(50)) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                log::info!("[AUDIO] Feed ended");
                break;
            },
        };

        samples.clear();
        map_channels(
            &resampler.process(&frame.audio),
            stream_config.channels,
            config.volume,
            &mut samples,
        );
        for &sample in &samples {
            match tx.try_send(sample) {
                Ok(()) => {},
                Err(TrySendError::Full(_)) => dropped += 1,
                Err(TrySendError::Disconnected(_)) => return Ok(()),
            }
        }
    }

    if dropped > 0 {
        log::debug!("[AUDIO] Dropped {} samples on a full queue", dropped);
    }
    log::info!("[AUDIO] Playback stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_rate_passthrough() {
        let mut r = Resampler::new(48_000, 48_000);
        let out = r.process(&[16384, -16384, 8192, 0]);
        // One frame of latency from the initial silent frame
        assert_eq!(out, vec![[0.0, 0.0], [0.5, -0.5]]);
        let out = r.process(&[0, 0]);
        assert_eq!(out, vec![[0.25, 0.0]]);
    }

    #[test]
    fn test_upsample_doubles_frames() {
        let mut r = Resampler::new(24_000, 48_000);
        let input: Vec<i16> = (0..100).flat_map(|i| [i * 100, -i * 100]).collect();
        let out = r.process(&input);
        assert_eq!(out.len(), 200);
        // Midpoints are interpolated
        assert!((out[3][0] - (50.0 / 32768.0)).abs() < 1e-6);
    }

    #[test]
    fn test_console_rate_to_48k_over_chunks() {
        let mut r = Resampler::new(AUDIO_SAMPLE_RATE, 48_000);
        let chunk = vec![0i16; 3204 * 2];
        let total: usize = (0..10).map(|_| r.process(&chunk).len()).sum();
        let expected = 32_040.0 * 48_000.0 / AUDIO_SAMPLE_RATE as f64;
        assert!((total as f64 - expected).abs() <= 1.0);
    }

    #[test]
    fn test_map_channels() {
        let frames = [[0.5, -0.5], [1.0, 0.0]];
        let mut out = Vec::new();
        map_channels(&frames, 1, 1.0, &mut out);
        assert_eq!(out, vec![0.0, 0.5]);

        out.clear();
        map_channels(&frames, 4, 0.5, &mut out);
        assert_eq!(out, vec![0.25, -0.25, 0.0, 0.0, 0.5, 0.0, 0.0, 0.0]);
    }
}
