//! CPAL output device backend.
//!
//! Implements [`PcmSink`] over a CPAL output stream. The blocking `write`
//! pushes S32LE frames into a bounded [`SampleRing`]; the real-time callback
//! drains the ring, applies the master volume, and converts to the device
//! sample format. The callback latching an underrun (ring ran dry) or the
//! stream reporting the device gone surfaces as the corresponding
//! [`SinkError`] on the next write, where the controller recovers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::config::PlayerConfig;
use crate::quantize::BYTES_PER_SAMPLE;
use crate::ring::SampleRing;
use crate::sink::{PcmSink, SinkError};

/// Opened output device session.
///
/// Opened exactly once per playback run, after the first decoded frame fixes
/// the sample rate and channel count; closed on drop.
pub struct CpalSink {
    stream: cpal::Stream,
    ring: Arc<SampleRing>,
    suspended: Arc<AtomicBool>,
    channels: u16,
}

impl CpalSink {
    /// Open the output device at the stream's rate and channel count.
    ///
    /// The closest supported sample rate is negotiated; an unsupported channel
    /// count or an unopenable device is fatal, there is no fallback
    /// negotiation.
    pub fn open(
        rate: u32,
        channels: u16,
        name_filter: Option<&str>,
        cfg: &PlayerConfig,
    ) -> Result<Self> {
        let host = cpal::default_host();
        let device = pick_device(&host, name_filter)?;
        if let Ok(desc) = device.description() {
            tracing::info!(device = %desc, "output device");
        }

        let config = pick_output_config(&device, rate, channels)?;
        let stream_config: cpal::StreamConfig = config.clone().into();
        tracing::info!(
            requested_rate_hz = rate,
            rate_hz = stream_config.sample_rate,
            channels,
            format = ?config.sample_format(),
            "device output config"
        );

        let ring_samples = (rate as f32 * cfg.ring_seconds).ceil() as usize * channels as usize;
        let ring = Arc::new(SampleRing::new(ring_samples.max(channels as usize * 1152)));
        let suspended = Arc::new(AtomicBool::new(false));
        let gain_q15 = volume_gain_q15(cfg.volume_percent);

        let stream = build_output_stream(
            &device,
            &stream_config,
            config.sample_format(),
            &ring,
            &suspended,
            gain_q15,
        )?;
        stream.play().context("start output stream")?;

        Ok(Self {
            stream,
            ring,
            suspended,
            channels,
        })
    }
}

impl PcmSink for CpalSink {
    fn write(&mut self, pcm: &[u8], frames: usize) -> Result<(), SinkError> {
        debug_assert_eq!(pcm.len(), frames * self.channels as usize * BYTES_PER_SAMPLE);

        if self.suspended.load(Ordering::Relaxed) {
            return Err(SinkError::Suspended);
        }
        if self.ring.take_underrun() {
            return Err(SinkError::Underrun);
        }

        let samples: Vec<i32> = pcm
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        if !self.ring.push_blocking(&samples) {
            return Err(SinkError::Fatal("output stream closed".into()));
        }
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), SinkError> {
        self.ring.take_underrun();
        self.stream
            .play()
            .map_err(|e| SinkError::Fatal(e.to_string()))?;
        self.suspended.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn try_resume(&mut self) -> Result<bool, SinkError> {
        match self.stream.play() {
            Ok(()) => {
                self.suspended.store(false, Ordering::Relaxed);
                Ok(true)
            }
            Err(cpal::PlayStreamError::DeviceNotAvailable) => Ok(false),
            Err(e) => Err(SinkError::Fatal(e.to_string())),
        }
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        // Give the callback a chance to drain the queued tail of the stream.
        self.ring.wait_empty(Duration::from_secs(2));
        self.ring.close();
        let _ = self.stream.pause();
    }
}

/// Pick the first output device whose name contains `needle`
/// (case-insensitive), or the host default.
fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    let mut devices: Vec<cpal::Device> = host
        .output_devices()
        .context("No output devices")?
        .collect();

    if let Some(needle) = needle {
        if let Some(d) = devices.drain(..).find(|d| {
            d.description()
                .ok()
                .map(|n| matches_device_name(&n.name(), needle))
                .unwrap_or(false)
        }) {
            return Ok(d);
        }
        return Err(anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}

/// Choose the output config closest to `target_rate` among the ranges that
/// support exactly `channels` channels.
///
/// Ties prefer sample formats cheaper to convert from S32.
fn pick_output_config(
    device: &cpal::Device,
    target_rate: u32,
    channels: u16,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = device
        .supported_output_configs()
        .context("query output configs")?
        .filter(|r| r.channels() == channels)
        .collect();
    if ranges.is_empty() {
        return Err(anyhow!("Device has no {channels}-channel output config"));
    }

    let mut best: Option<(u32, u8, cpal::SupportedStreamConfig)> = None;
    for range in ranges {
        let rate = clamp_rate(range.min_sample_rate(), range.max_sample_rate(), target_rate);
        let dist = rate.abs_diff(target_rate);
        let rank = sample_format_rank(range.sample_format());
        let replace = match &best {
            None => true,
            Some((b_dist, b_rank, _)) => dist < *b_dist || (dist == *b_dist && rank < *b_rank),
        };
        if replace {
            best = Some((dist, rank, range.with_sample_rate(rate)));
        }
    }

    Ok(best.unwrap().2)
}

fn clamp_rate(min: u32, max: u32, target: u32) -> u32 {
    if target < min {
        min
    } else if target > max {
        max
    } else {
        target
    }
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::I32 => 0,
        cpal::SampleFormat::F32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

/// Q15 fixed-point gain for a volume percent (100 ⇒ unity).
fn volume_gain_q15(percent: u8) -> i32 {
    (percent.min(100) as i32 * 32_768) / 100
}

fn apply_volume(sample: i32, gain_q15: i32) -> i32 {
    ((sample as i64 * gain_q15 as i64) >> 15) as i32
}

fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    ring: &Arc<SampleRing>,
    suspended: &Arc<AtomicBool>,
    gain_q15: i32,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, ring, suspended, gain_q15),
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, ring, suspended, gain_q15),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, ring, suspended, gain_q15),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, ring, suspended, gain_q15),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

/// Type-specialized stream builder. The callback drains the ring without
/// blocking, applies the gain, and converts each sample to `T`.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    ring: &Arc<SampleRing>,
    suspended: &Arc<AtomicBool>,
    gain_q15: i32,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<i32>,
{
    let ring_cb = ring.clone();
    let suspended_err = suspended.clone();
    let err_fn = move |err: cpal::StreamError| match err {
        cpal::StreamError::DeviceNotAvailable => {
            tracing::warn!("output device became unavailable");
            suspended_err.store(true, Ordering::Relaxed);
        }
        other => tracing::warn!("stream error: {other}"),
    };

    let mut scratch: Vec<i32> = Vec::new();
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            scratch.resize(data.len(), 0);
            ring_cb.pop_into(&mut scratch);
            for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
                *dst = T::from_sample(apply_volume(src, gain_q15));
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Print available output devices to stdout (CLI `--list-devices`).
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    let devices = host.output_devices().context("No output devices")?;
    for (i, d) in devices.enumerate() {
        println!("#{i}: {}", d.description()?);
    }
    Ok(())
}
