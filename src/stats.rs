//! Latency stats for voice capture and recognition

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Clone, Default, Debug)]
pub struct RecognitionStats {
    pub capture: Vec<Sample>,
    pub remote: Vec<Sample>,
    pub local: Vec<Sample>,
    /// Transcripts that matched no command
    pub unmatched: usize,
}

#[derive(Clone, Debug)]
pub struct Sample {
    pub duration: Duration,
    pub audio_samples: usize, // 16kHz mono samples sent or captured
    pub succeeded: bool,
}

impl RecognitionStats {
    pub fn summary(&self) -> String {
        let mut out = String::new();

        for (label, samples) in [
            ("Capture", &self.capture),
            ("Remote STT", &self.remote),
            ("Local STT", &self.local),
        ] {
            if samples.is_empty() {
                continue;
            }
            let (avg, min, max, total) = Self::calc(samples);
            let ok = samples.iter().filter(|s| s.succeeded).count();
            let audio_secs: f64 =
                samples.iter().map(|s| s.audio_samples as f64).sum::<f64>() / 16000.0;
            let rtf = if audio_secs > 0.0 {
                total.as_secs_f64() / audio_secs
            } else {
                0.0
            };
            out.push_str(&format!(
                "{} (n={}, ok={}): avg={}ms min={}ms max={}ms total={:.1}s RTF={:.2}x\n",
                label,
                samples.len(),
                ok,
                avg.as_millis(),
                min.as_millis(),
                max.as_millis(),
                total.as_secs_f64(),
                rtf
            ));
        }

        if self.unmatched > 0 {
            out.push_str(&format!("Unmatched transcripts: {}\n", self.unmatched));
        }

        if out.is_empty() {
            out.push_str("No stats recorded yet.\n");
        }
        out
    }

    fn calc(samples: &[Sample]) -> (Duration, Duration, Duration, Duration) {
        let total: Duration = samples.iter().map(|s| s.duration).sum();
        let avg = total / samples.len() as u32;
        let min = samples.iter().map(|s| s.duration).min().unwrap_or_default();
        let max = samples.iter().map(|s| s.duration).max().unwrap_or_default();
        (avg, min, max, total)
    }
}

pub type SharedStats = Arc<Mutex<RecognitionStats>>;

pub fn new_shared() -> SharedStats {
    Arc::new(Mutex::new(RecognitionStats::default()))
}

pub fn record_unmatched(stats: &SharedStats) {
    if let Ok(mut stats) = stats.lock() {
        stats.unmatched += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    Capture,
    Remote,
    Local,
}

/// Measures one operation from creation to `finish`
pub struct Timer<'a> {
    start: Instant,
    stats: &'a SharedStats,
    kind: StatKind,
    audio_samples: usize,
}

impl<'a> Timer<'a> {
    pub fn new(stats: &'a SharedStats, kind: StatKind, audio_samples: usize) -> Self {
        Self {
            start: Instant::now(),
            stats,
            kind,
            audio_samples,
        }
    }

    pub fn finish(self, succeeded: bool) {
        let audio_samples = self.audio_samples;
        self.finish_with_samples(audio_samples, succeeded);
    }

    /// For captures, where the audio length is only known at the end
    pub fn finish_with_samples(self, audio_samples: usize, succeeded: bool) {
        let sample = Sample {
            duration: self.start.elapsed(),
            audio_samples,
            succeeded,
        };
        let Ok(mut stats) = self.stats.lock() else {
            return;
        };
        match self.kind {
            StatKind::Capture => stats.capture.push(sample),
            StatKind::Remote => stats.remote.push(sample),
            StatKind::Local => stats.local.push(sample),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_summary() {
        assert_eq!(RecognitionStats::default().summary(), "No stats recorded yet.\n");
    }

    #[test]
    fn test_timer_records_by_kind() {
        let stats = new_shared();
        Timer::new(&stats, StatKind::Remote, 16000).finish(false);
        Timer::new(&stats, StatKind::Local, 16000).finish(true);
        Timer::new(&stats, StatKind::Capture, 0).finish_with_samples(8000, true);
        record_unmatched(&stats);

        let s = stats.lock().unwrap();
        assert_eq!(s.remote.len(), 1);
        assert!(!s.remote[0].succeeded);
        assert_eq!(s.local.len(), 1);
        assert_eq!(s.capture[0].audio_samples, 8000);
        let summary = s.summary();
        assert!(summary.contains("Remote STT (n=1, ok=0)"));
        assert!(summary.contains("Local STT (n=1, ok=1)"));
        assert!(summary.contains("Unmatched transcripts: 1"));
    }
}
