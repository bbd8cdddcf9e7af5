//! The voice loop: wait for the activation window, capture, recognize, match

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use flume::{Receiver, Sender};
use tokio_util::sync::CancellationToken;

use crate::config::VoiceConfig;
use crate::state::SharedBus;
use crate::stats::{self, SharedStats, StatKind, Timer};
use crate::vocabulary::{Action, Vocabulary};

use super::capture::{AudioSource, Microphone};
use super::listen::{ListenParams, PhraseListener, Utterance};
use super::recognizer::{
    GoogleSpeechRecognizer, Recognition, RecognizeError, Recognizer, WhisperServerRecognizer,
};
use super::{VoiceError, VoiceState, VoiceStateCell};

const NO_MICROPHONE_BACKOFF: Duration = Duration::from_secs(2);
const WAIT_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Nobody spoke before the listen timeout
    NoAudio,
    /// Neither recognizer produced a transcript
    NotUnderstood,
    Transcribed {
        text: String,
        action: Option<Action>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    NoMicrophone,
    /// Outside the activation window, or a capture is already running
    Idle,
    Cycle(CycleOutcome),
}

/// Result of the interactive microphone test
#[derive(Debug, Clone, PartialEq)]
pub enum MicTestReport {
    MissingCredentials,
    NoMicrophone,
    Busy,
    NoAudio,
    NotRecognized,
    Command {
        text: String,
        confidence: Option<f32>,
    },
    Failed(String),
}

impl fmt::Display for MicTestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MicTestReport::MissingCredentials => {
                write!(f, "Remote recognizer credentials not found")
            }
            MicTestReport::NoMicrophone => write!(f, "No microphone detected"),
            MicTestReport::Busy => write!(f, "Microphone is busy, try again"),
            MicTestReport::NoAudio => write!(f, "Timed out - no audio detected"),
            MicTestReport::NotRecognized => write!(f, "No command recognized"),
            MicTestReport::Command {
                text,
                confidence: Some(c),
            } => write!(f, "Command: {} (Confidence: {:.0}%)", text, c * 100.0),
            MicTestReport::Command {
                text,
                confidence: None,
            } => write!(f, "Command: {}", text),
            MicTestReport::Failed(e) => write!(f, "Error: {}", e),
        }
    }
}

/// Requests served by the voice thread between cycles
pub enum VoiceRequest {
    MicTest(Sender<MicTestReport>),
}

/// Clears the bus listening flag however the capture ends
struct ListeningGuard<'a>(&'a SharedBus);

impl Drop for ListeningGuard<'_> {
    fn drop(&mut self) {
        self.0.end_listening();
    }
}

pub struct VoicePipeline {
    bus: SharedBus,
    microphone: Box<dyn Microphone>,
    remote: Option<Box<dyn Recognizer>>,
    local: Option<Box<dyn Recognizer>>,
    vocabulary: Vocabulary,
    actions: Sender<Action>,
    params: ListenParams,
    language: String,
    poll_interval: Duration,
    state: Arc<VoiceStateCell>,
    stats: SharedStats,
}

impl VoicePipeline {
    pub fn new(
        config: &VoiceConfig,
        bus: SharedBus,
        microphone: Box<dyn Microphone>,
        vocabulary: Vocabulary,
        actions: Sender<Action>,
    ) -> Self {
        Self {
            bus,
            microphone,
            remote: None,
            local: None,
            vocabulary,
            actions,
            params: ListenParams::from_config(config),
            language: config.language.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            state: Arc::new(VoiceStateCell::default()),
            stats: stats::new_shared(),
        }
    }

    /// Attach the configured HTTP recognizers.
    ///
    /// The remote one needs an api key; without it the pipeline runs on the
    /// local recognizer alone.
    pub fn with_configured_recognizers(mut self, config: &VoiceConfig) -> Self {
        if config.remote.enabled {
            let mut phrases = self.vocabulary.phrases();
            phrases.extend(config.remote.phrases.iter().cloned());
            match GoogleSpeechRecognizer::new(&config.remote) {
                Ok(r) => {
                    self.remote = Some(Box::new(r.with_phrases(phrases, config.remote.boost)));
                }
                Err(RecognizeError::MissingCredentials) => {
                    tracing::info!("no remote speech api key, using local recognizer only");
                }
                Err(e) => tracing::warn!(error = %e, "remote recognizer unavailable"),
            }
        }

        match WhisperServerRecognizer::new(&config.local) {
            Ok(r) => self.local = Some(Box::new(r)),
            Err(e) => tracing::warn!(error = %e, "local recognizer unavailable"),
        }
        self
    }

    pub fn with_remote(mut self, recognizer: Box<dyn Recognizer>) -> Self {
        self.remote = Some(recognizer);
        self
    }

    pub fn with_local(mut self, recognizer: Box<dyn Recognizer>) -> Self {
        self.local = Some(recognizer);
        self
    }

    pub fn with_stats(mut self, stats: SharedStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_state_cell(mut self, state: Arc<VoiceStateCell>) -> Self {
        self.state = state;
        self
    }

    pub fn with_params(mut self, params: ListenParams) -> Self {
        self.params = params;
        self
    }

    pub fn state(&self) -> VoiceState {
        self.state.get()
    }

    pub fn state_cell(&self) -> Arc<VoiceStateCell> {
        self.state.clone()
    }

    pub fn stats(&self) -> SharedStats {
        self.stats.clone()
    }

    /// One iteration of the voice loop
    pub fn step(&self, now: Instant) -> Result<StepOutcome, VoiceError> {
        if !self.microphone.is_present() {
            self.state.set(VoiceState::Idle);
            tracing::warn!("no microphone detected");
            return Ok(StepOutcome::NoMicrophone);
        }

        if !self.bus.is_armed(now) {
            self.state.set(VoiceState::Idle);
            return Ok(StepOutcome::Idle);
        }

        if !self.bus.try_begin_listening() {
            return Ok(StepOutcome::Idle);
        }
        let _guard = ListeningGuard(&self.bus);
        self.state.set(VoiceState::Armed);
        tracing::info!("activating microphone");

        let result = self.microphone.open().and_then(|mut source| self.cycle(source.as_mut()));
        self.state.set(VoiceState::Idle);
        result.map(StepOutcome::Cycle)
    }

    fn cycle(&self, source: &mut dyn AudioSource) -> Result<CycleOutcome, VoiceError> {
        self.state.set(VoiceState::Listening);
        let listener = PhraseListener::new(self.params);
        let ambient = listener.calibrate(source)?;

        let timer = Timer::new(&self.stats, StatKind::Capture, 0);
        let Some(utterance) = listener.capture(source, ambient)? else {
            timer.finish(false);
            tracing::info!("no speech detected");
            return Ok(CycleOutcome::NoAudio);
        };
        timer.finish_with_samples(utterance.samples.len(), true);

        let recognition = self.recognize(&utterance);
        let Some(transcript) = recognition.transcript() else {
            tracing::info!("could not understand audio");
            return Ok(CycleOutcome::NotUnderstood);
        };

        Ok(self.handle_transcript(&transcript.text))
    }

    /// Remote first, then local; failures only fall through
    pub fn recognize(&self, utterance: &Utterance) -> Recognition {
        if let Some(remote) = &self.remote {
            self.state.set(VoiceState::RecognizingRemote);
            let timer = Timer::new(&self.stats, StatKind::Remote, utterance.samples.len());
            match remote.recognize(utterance, &self.language) {
                Ok(Some(t)) => {
                    timer.finish(true);
                    tracing::info!(
                        backend = remote.name(),
                        text = %t.text,
                        confidence = ?t.confidence,
                        "recognized"
                    );
                    return Recognition::Remote(t);
                }
                Ok(None) => {
                    timer.finish(false);
                    tracing::debug!(backend = remote.name(), "empty remote result");
                }
                Err(e) => {
                    timer.finish(false);
                    tracing::warn!(
                        backend = remote.name(),
                        error = %e,
                        "remote recognition failed, trying local"
                    );
                }
            }
        }

        let Some(local) = &self.local else {
            return Recognition::Nothing;
        };
        self.state.set(VoiceState::RecognizingLocal);
        let timer = Timer::new(&self.stats, StatKind::Local, utterance.samples.len());
        match local.recognize(utterance, &self.language) {
            Ok(Some(t)) => {
                timer.finish(true);
                tracing::info!(backend = local.name(), text = %t.text, "recognized");
                Recognition::Local(t)
            }
            Ok(None) => {
                timer.finish(false);
                Recognition::Nothing
            }
            Err(e) => {
                timer.finish(false);
                tracing::warn!(backend = local.name(), error = %e, "local recognition failed");
                Recognition::Nothing
            }
        }
    }

    /// Record the transcript and forward its action to the main loop
    pub fn handle_transcript(&self, text: &str) -> CycleOutcome {
        let text = text.trim().to_lowercase();
        self.bus.set_last_command(&text);

        let action = self.vocabulary.resolve(&text);
        match action {
            Some(action) => {
                if self.actions.send(action).is_err() {
                    tracing::warn!(%action, "action receiver closed");
                }
            }
            None => stats::record_unmatched(&self.stats),
        }
        CycleOutcome::Transcribed { text, action }
    }

    /// Capture one phrase with test settings and recognize it remotely
    pub fn mic_test(&self) -> MicTestReport {
        let Some(remote) = &self.remote else {
            return MicTestReport::MissingCredentials;
        };
        if !self.microphone.is_present() {
            return MicTestReport::NoMicrophone;
        }
        if !self.bus.try_begin_listening() {
            return MicTestReport::Busy;
        }
        let _guard = ListeningGuard(&self.bus);

        let listener = PhraseListener::new(ListenParams::mic_test());
        let captured = self.microphone.open().and_then(|mut source| {
            tracing::info!("adjusting for ambient noise");
            let ambient = listener.calibrate(source.as_mut())?;
            tracing::info!("speak now");
            listener.capture(source.as_mut(), ambient)
        });
        let utterance = match captured {
            Ok(Some(u)) => u,
            Ok(None) => return MicTestReport::NoAudio,
            Err(e) => return MicTestReport::Failed(e.to_string()),
        };

        self.state.set(VoiceState::RecognizingRemote);
        let result = remote.recognize(&utterance, &self.language);
        self.state.set(VoiceState::Idle);

        match result {
            Ok(Some(t)) => {
                self.handle_transcript(&t.text);
                MicTestReport::Command {
                    text: t.text,
                    confidence: t.confidence,
                }
            }
            Ok(None) => MicTestReport::NotRecognized,
            Err(e) => MicTestReport::Failed(e.to_string()),
        }
    }

    /// Loop until cancelled. Returns early only on a step error.
    pub fn run(&self, token: &CancellationToken, requests: &Receiver<VoiceRequest>) {
        tracing::info!(
            remote = self.remote.as_ref().map(|r| r.name()),
            local = self.local.as_ref().map(|r| r.name()),
            "voice pipeline started"
        );

        while !token.is_cancelled() {
            while let Ok(request) = requests.try_recv() {
                match request {
                    VoiceRequest::MicTest(reply) => {
                        let _ = reply.send(self.mic_test());
                    }
                }
            }

            let wait = match self.step(Instant::now()) {
                Ok(StepOutcome::NoMicrophone) => NO_MICROPHONE_BACKOFF,
                Ok(StepOutcome::Idle) => self.poll_interval,
                Ok(StepOutcome::Cycle(outcome)) => {
                    tracing::debug!(?outcome, "voice cycle finished");
                    Duration::ZERO
                }
                Err(e) => {
                    tracing::error!(error = %e, "voice pipeline stopped");
                    break;
                }
            };
            wait_cancellable(token, wait);
        }

        self.state.set(VoiceState::Idle);
        tracing::info!("voice pipeline exited");
    }
}

/// Sleep in short slices so cancellation is noticed promptly
fn wait_cancellable(token: &CancellationToken, duration: Duration) {
    let deadline = Instant::now() + duration;
    while !token.is_cancelled() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(WAIT_SLICE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InputBus;
    use crate::voice::capture::FRAME_SAMPLES;
    use crate::voice::listen::tests::ScriptedSource;
    use crate::voice::recognizer::Transcript;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeMicrophone {
        present: bool,
        speech_frames: usize,
    }

    impl Microphone for FakeMicrophone {
        fn is_present(&self) -> bool {
            self.present
        }

        fn open(&self) -> Result<Box<dyn AudioSource>, VoiceError> {
            Ok(Box::new(
                ScriptedSource::new()
                    .silence(5)
                    .speech(self.speech_frames)
                    .silence(200),
            ))
        }
    }

    struct FakeRecognizer {
        reply: Mutex<Option<Result<Option<Transcript>, RecognizeError>>>,
        calls: Arc<AtomicUsize>,
    }

    impl FakeRecognizer {
        fn new(reply: Result<Option<Transcript>, RecognizeError>) -> (Box<Self>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let fake = Box::new(Self {
                reply: Mutex::new(Some(reply)),
                calls: calls.clone(),
            });
            (fake, calls)
        }

        fn text(text: &str) -> (Box<Self>, Arc<AtomicUsize>) {
            Self::new(Ok(Some(Transcript {
                text: text.into(),
                confidence: Some(0.9),
            })))
        }
    }

    impl Recognizer for FakeRecognizer {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn recognize(
            &self,
            _utterance: &Utterance,
            _language: &str,
        ) -> Result<Option<Transcript>, RecognizeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.lock().unwrap().take().unwrap_or(Ok(None))
        }
    }

    fn quick_params() -> ListenParams {
        ListenParams {
            calibration: Duration::from_millis(150),
            timeout: Duration::from_secs(1),
            phrase_limit: Duration::from_secs(2),
            pause_threshold: Duration::from_millis(300),
            energy_threshold: 300.0,
        }
    }

    fn pipeline(speech_frames: usize) -> (VoicePipeline, SharedBus, Receiver<Action>) {
        let bus = InputBus::new(Duration::from_secs(3));
        let (tx, rx) = flume::unbounded();
        let mic = FakeMicrophone {
            present: true,
            speech_frames,
        };
        let p = VoicePipeline::new(
            &VoiceConfig::default(),
            bus.clone(),
            Box::new(mic),
            Vocabulary::default(),
            tx,
        )
        .with_params(quick_params());
        (p, bus, rx)
    }

    #[test]
    fn test_no_microphone() {
        let bus = InputBus::new(Duration::from_secs(3));
        let (tx, _rx) = flume::unbounded();
        let p = VoicePipeline::new(
            &VoiceConfig::default(),
            bus.clone(),
            Box::new(FakeMicrophone {
                present: false,
                speech_frames: 0,
            }),
            Vocabulary::default(),
            tx,
        );
        bus.mark_activation();
        assert_eq!(p.step(Instant::now()).unwrap(), StepOutcome::NoMicrophone);
        assert_eq!(p.mic_test(), MicTestReport::MissingCredentials);
    }

    #[test]
    fn test_idle_outside_window() {
        let (p, bus, _rx) = pipeline(20);
        assert_eq!(p.step(Instant::now()).unwrap(), StepOutcome::Idle);

        let t0 = Instant::now();
        bus.mark_activation_at(t0);
        assert_eq!(
            p.step(t0 + Duration::from_millis(3001)).unwrap(),
            StepOutcome::Idle
        );
        assert_eq!(p.state(), VoiceState::Idle);
    }

    #[test]
    fn test_busy_flag_blocks_second_capture() {
        let (p, bus, _rx) = pipeline(20);
        bus.mark_activation();
        assert!(bus.try_begin_listening());
        assert_eq!(p.step(Instant::now()).unwrap(), StepOutcome::Idle);
        bus.end_listening();
    }

    #[test]
    fn test_remote_transcript_dispatches_action() {
        let (remote, remote_calls) = FakeRecognizer::text("Quero um CUBO");
        let (local, local_calls) = FakeRecognizer::text("esfera");
        let (p, bus, rx) = pipeline(20);
        let p = p.with_remote(remote).with_local(local);

        bus.mark_activation();
        let outcome = p.step(Instant::now()).unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Cycle(CycleOutcome::Transcribed {
                text: "quero um cubo".into(),
                action: Some(Action::Cube),
            })
        );
        assert_eq!(rx.try_recv().unwrap(), Action::Cube);
        assert_eq!(remote_calls.load(Ordering::SeqCst), 1);
        assert_eq!(local_calls.load(Ordering::SeqCst), 0);
        assert_eq!(bus.last_command().as_deref(), Some("quero um cubo"));
        assert!(!bus.is_listening());
    }

    #[test]
    fn test_remote_failure_falls_back_to_local() {
        let (remote, remote_calls) = FakeRecognizer::new(Err(RecognizeError::Status {
            status: 503,
            body: "unavailable".into(),
        }));
        let (local, local_calls) = FakeRecognizer::text("esquerda");
        let (p, bus, rx) = pipeline(20);
        let p = p.with_remote(remote).with_local(local);

        bus.mark_activation();
        p.step(Instant::now()).unwrap();
        assert_eq!(remote_calls.load(Ordering::SeqCst), 1);
        assert_eq!(local_calls.load(Ordering::SeqCst), 1);
        assert_eq!(rx.try_recv().unwrap(), Action::Left);

        let stats = p.stats();
        let stats = stats.lock().unwrap();
        assert!(!stats.remote[0].succeeded);
        assert!(stats.local[0].succeeded);
    }

    #[test]
    fn test_empty_remote_also_falls_back() {
        let (remote, _) = FakeRecognizer::new(Ok(None));
        let (local, local_calls) = FakeRecognizer::text("render");
        let (p, _bus, _rx) = pipeline(20);
        let p = p.with_remote(remote).with_local(local);
        let utt = Utterance {
            samples: vec![0; FRAME_SAMPLES],
            sample_rate: 16000,
        };
        assert!(matches!(p.recognize(&utt), Recognition::Local(_)));
        assert_eq!(local_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_both_fail_is_not_understood() {
        let (remote, _) = FakeRecognizer::new(Err(RecognizeError::MissingCredentials));
        let (local, _) = FakeRecognizer::new(Ok(None));
        let (p, bus, rx) = pipeline(20);
        let p = p.with_remote(remote).with_local(local);

        bus.mark_activation();
        assert_eq!(
            p.step(Instant::now()).unwrap(),
            StepOutcome::Cycle(CycleOutcome::NotUnderstood)
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_silence_is_no_audio() {
        let (local, local_calls) = FakeRecognizer::text("cubo");
        let (p, bus, _rx) = pipeline(0);
        let p = p.with_local(local);

        bus.mark_activation();
        assert_eq!(
            p.step(Instant::now()).unwrap(),
            StepOutcome::Cycle(CycleOutcome::NoAudio)
        );
        assert_eq!(local_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unmatched_transcript() {
        let (p, _bus, rx) = pipeline(0);
        let outcome = p.handle_transcript("  xyz ");
        assert_eq!(
            outcome,
            CycleOutcome::Transcribed {
                text: "xyz".into(),
                action: None
            }
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(p.stats().lock().unwrap().unmatched, 1);
    }

    #[test]
    fn test_mic_test_report_format() {
        let report = MicTestReport::Command {
            text: "cubo".into(),
            confidence: Some(0.87),
        };
        assert_eq!(report.to_string(), "Command: cubo (Confidence: 87%)");
    }

    #[test]
    fn test_run_stops_on_cancel() {
        let (p, _bus, _rx) = pipeline(0);
        let token = CancellationToken::new();
        let (_req_tx, req_rx) = flume::unbounded();
        let t = token.clone();
        let handle = thread::spawn(move || p.run(&t, &req_rx));
        thread::sleep(Duration::from_millis(150));
        token.cancel();
        handle.join().unwrap();
    }
}
