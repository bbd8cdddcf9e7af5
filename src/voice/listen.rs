//! Energy-based phrase capture
//!
//! Calibrates against ambient noise, waits for speech onset, and records
//! until enough trailing silence or the phrase limit. All timing is counted
//! in audio samples so it does not depend on how fast frames arrive.

use std::collections::VecDeque;
use std::io::Cursor;
use std::time::{Duration, Instant};

use crate::config::VoiceConfig;

use super::VoiceError;
use super::capture::AudioSource;

/// Ambient energy is multiplied by this to get the dynamic threshold
const AMBIENT_FACTOR: f32 = 1.5;
/// Consecutive loud frames needed to count as speech onset
const ONSET_FRAMES: usize = 2;
/// Audio kept from before the onset (300ms)
const PREFILL_FRAMES: usize = 10;
const FRAME_WAIT: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListenParams {
    pub calibration: Duration,
    /// Give up if speech has not started by then
    pub timeout: Duration,
    pub phrase_limit: Duration,
    pub pause_threshold: Duration,
    pub energy_threshold: f32,
}

impl ListenParams {
    pub fn from_config(config: &VoiceConfig) -> Self {
        Self {
            calibration: Duration::from_millis(config.calibration_ms),
            timeout: Duration::from_millis(config.listen_timeout_ms),
            phrase_limit: Duration::from_millis(config.phrase_limit_ms),
            pause_threshold: Duration::from_millis(config.pause_threshold_ms),
            energy_threshold: config.energy_threshold,
        }
    }

    /// Shorter, more sensitive settings for the microphone test
    pub fn mic_test() -> Self {
        Self {
            calibration: Duration::from_secs(2),
            timeout: Duration::from_secs(5),
            phrase_limit: Duration::from_secs(3),
            pause_threshold: Duration::from_millis(800),
            energy_threshold: 400.0,
        }
    }
}

/// One captured phrase, 16-bit mono
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl Utterance {
    pub fn from_f32(samples: &[f32], sample_rate: u32) -> Self {
        Self {
            samples: samples.iter().map(|&s| to_i16(s)).collect(),
            sample_rate,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate.max(1) as f64)
    }

    /// Raw little-endian PCM (LINEAR16)
    pub fn pcm_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    pub fn to_wav(&self) -> Result<Vec<u8>, hound::Error> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            for &s in &self.samples {
                writer.write_sample(s)?;
            }
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// RMS energy of a frame on the 16-bit scale
pub fn frame_energy(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: f32 = frame
        .iter()
        .map(|&s| {
            let v = s * 32768.0;
            v * v
        })
        .sum();
    (sum / frame.len() as f32).sqrt()
}

fn samples_for(duration: Duration, rate: u32) -> usize {
    (duration.as_secs_f64() * rate as f64) as usize
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Waiting { onset: usize },
    Speaking { silence: usize },
}

pub struct PhraseListener {
    params: ListenParams,
}

impl PhraseListener {
    pub fn new(params: ListenParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ListenParams {
        &self.params
    }

    /// Mean frame energy over the calibration period
    pub fn calibrate(&self, source: &mut dyn AudioSource) -> Result<f32, VoiceError> {
        let needed = samples_for(self.params.calibration, source.sample_rate());
        let deadline = Instant::now() + self.params.calibration + FRAME_WAIT * 4;

        let mut seen = 0usize;
        let mut total = 0.0f32;
        let mut frames = 0usize;
        while seen < needed && Instant::now() < deadline {
            if let Some(frame) = source.read_frame(FRAME_WAIT)? {
                seen += frame.len();
                total += frame_energy(&frame);
                frames += 1;
            }
        }

        let ambient = if frames == 0 { 0.0 } else { total / frames as f32 };
        tracing::debug!(ambient, frames, "ambient noise calibrated");
        Ok(ambient)
    }

    pub fn threshold(&self, ambient: f32) -> f32 {
        self.params.energy_threshold.max(ambient * AMBIENT_FACTOR)
    }

    /// Record one phrase; `None` if no speech started before the timeout
    pub fn capture(
        &self,
        source: &mut dyn AudioSource,
        ambient: f32,
    ) -> Result<Option<Utterance>, VoiceError> {
        let rate = source.sample_rate();
        let threshold = self.threshold(ambient);
        let timeout_samples = samples_for(self.params.timeout, rate);
        let limit_samples = samples_for(self.params.phrase_limit, rate);
        let pause_samples = samples_for(self.params.pause_threshold, rate);
        let gap_samples = samples_for(FRAME_WAIT, rate);
        let wall_deadline = Instant::now() + self.params.timeout + FRAME_WAIT * 4;

        let mut phase = Phase::Waiting { onset: 0 };
        let mut prefill: VecDeque<Vec<f32>> = VecDeque::with_capacity(PREFILL_FRAMES + 1);
        let mut phrase: Vec<f32> = Vec::with_capacity(limit_samples);
        let mut waited = 0usize;

        loop {
            let Some(frame) = source.read_frame(FRAME_WAIT)? else {
                match &mut phase {
                    // a stalled device must not hold the pipeline forever
                    Phase::Waiting { .. } if Instant::now() >= wall_deadline => return Ok(None),
                    Phase::Waiting { .. } => {}
                    // no audio for the whole wait counts as silence
                    Phase::Speaking { silence } => {
                        *silence += gap_samples;
                        if *silence >= pause_samples {
                            break;
                        }
                    }
                }
                continue;
            };
            let loud = frame_energy(&frame) > threshold;

            match &mut phase {
                Phase::Waiting { onset } => {
                    waited += frame.len();
                    *onset = if loud { *onset + 1 } else { 0 };
                    prefill.push_back(frame);
                    if prefill.len() > PREFILL_FRAMES {
                        prefill.pop_front();
                    }

                    if *onset >= ONSET_FRAMES {
                        phrase.extend(prefill.drain(..).flatten());
                        phase = Phase::Speaking { silence: 0 };
                    } else if waited >= timeout_samples {
                        tracing::debug!("no speech before timeout");
                        return Ok(None);
                    }
                }
                Phase::Speaking { silence } => {
                    *silence = if loud { 0 } else { *silence + frame.len() };
                    let done = *silence >= pause_samples;
                    phrase.extend_from_slice(&frame);
                    if done || phrase.len() >= limit_samples {
                        break;
                    }
                }
            }
        }

        phrase.truncate(limit_samples);
        let utterance = Utterance::from_f32(&phrase, rate);
        tracing::debug!(
            duration_ms = utterance.duration().as_millis() as u64,
            "phrase captured"
        );
        Ok(Some(utterance))
    }
}
