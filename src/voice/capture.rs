//! Microphone access
//!
//! [`Microphone`] decides whether a device exists and opens it;
//! [`AudioSource`] hands out fixed 30ms frames of 16kHz mono audio.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use flume::{Receiver, RecvTimeoutError};
use rubato::{FftFixedIn, Resampler};
use std::time::Duration;

use super::VoiceError;

pub const TARGET_RATE: usize = 16000;
/// 30ms at 16kHz
pub const FRAME_SAMPLES: usize = 480;
const RESAMPLE_CHUNK: usize = 1024;

pub trait Microphone: Send {
    fn is_present(&self) -> bool;
    fn open(&self) -> Result<Box<dyn AudioSource>, VoiceError>;
}

pub trait AudioSource {
    fn sample_rate(&self) -> u32;

    /// Next frame, or `None` if nothing arrived within `timeout`
    fn read_frame(&mut self, timeout: Duration) -> Result<Option<Vec<f32>>, VoiceError>;
}

/// Re-chunks device audio into 16kHz frames of [`FRAME_SAMPLES`]
struct FrameResampler {
    resampler: Option<FftFixedIn<f32>>,
    in_buf: Vec<f32>,
    pending: Vec<f32>,
    frame_samples: usize,
}

impl FrameResampler {
    fn new(in_hz: usize, out_hz: usize, frame_samples: usize) -> Result<Self, VoiceError> {
        let resampler = if in_hz != out_hz {
            Some(
                FftFixedIn::<f32>::new(in_hz, out_hz, RESAMPLE_CHUNK, 1, 1)
                    .map_err(|e| VoiceError::Device(e.to_string()))?,
            )
        } else {
            None
        };
        Ok(Self {
            resampler,
            in_buf: Vec::with_capacity(RESAMPLE_CHUNK),
            pending: Vec::with_capacity(frame_samples),
            frame_samples,
        })
    }

    fn push(&mut self, src: &[f32], mut emit: impl FnMut(Vec<f32>)) {
        let Some(resampler) = self.resampler.as_mut() else {
            self.pending.extend_from_slice(src);
            self.drain_frames(&mut emit);
            return;
        };

        self.in_buf.extend_from_slice(src);
        while self.in_buf.len() >= RESAMPLE_CHUNK {
            let chunk: Vec<f32> = self.in_buf.drain(..RESAMPLE_CHUNK).collect();
            match resampler.process(&[&chunk], None) {
                Ok(out) => self.pending.extend_from_slice(&out[0]),
                Err(e) => tracing::warn!(error = %e, "resample failed, dropping chunk"),
            }
        }
        self.drain_frames(&mut emit);
    }

    fn drain_frames(&mut self, emit: &mut impl FnMut(Vec<f32>)) {
        while self.pending.len() >= self.frame_samples {
            emit(self.pending.drain(..self.frame_samples).collect());
        }
    }
}

/// Default input device through cpal
#[derive(Debug, Default)]
pub struct CpalMicrophone;

impl Microphone for CpalMicrophone {
    fn is_present(&self) -> bool {
        cpal::default_host().default_input_device().is_some()
    }

    fn open(&self) -> Result<Box<dyn AudioSource>, VoiceError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(VoiceError::NoInputDevice)?;
        let supported = device
            .default_input_config()
            .map_err(|e| VoiceError::Device(e.to_string()))?;
        let input_rate = u32::from(supported.sample_rate()) as usize;
        let channels = supported.channels() as usize;

        tracing::debug!(
            input_rate,
            channels,
            target_rate = TARGET_RATE,
            "opening microphone"
        );

        let mut resampler = FrameResampler::new(input_rate, TARGET_RATE, FRAME_SAMPLES)?;
        let (tx, rx) = flume::unbounded();

        let stream = device
            .build_input_stream(
                &supported.config(),
                move |data: &[f32], _| {
                    let mono: Vec<f32> = if channels == 1 {
                        data.to_vec()
                    } else {
                        data.chunks(channels)
                            .map(|c| c.iter().sum::<f32>() / channels as f32)
                            .collect()
                    };
                    resampler.push(&mono, |frame| {
                        let _ = tx.send(frame);
                    });
                },
                |err| tracing::error!(error = %err, "audio stream error"),
                None,
            )
            .map_err(|e| VoiceError::Device(e.to_string()))?;
        stream
            .play()
            .map_err(|e| VoiceError::Device(e.to_string()))?;

        Ok(Box::new(CpalSource {
            _stream: stream,
            rx,
        }))
    }
}

/// Open capture stream; closing it is dropping it
struct CpalSource {
    _stream: cpal::Stream,
    rx: Receiver<Vec<f32>>,
}

impl AudioSource for CpalSource {
    fn sample_rate(&self) -> u32 {
        TARGET_RATE as u32
    }

    fn read_frame(&mut self, timeout: Duration) -> Result<Option<Vec<f32>>, VoiceError> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(VoiceError::StreamClosed),
        }
    }
}
