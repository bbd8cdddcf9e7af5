//! Shared runtime state - the bus between the background loops and the main loop
//!
//! The telemetry listener writes the latest stick sample and the voice
//! activation timestamp; the navigation tick and the voice pipeline read them.
//! Every field is an independent atomic: last write wins, and a reader may see
//! fields from two consecutive datagrams, which costs at most one stale tick.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::NavigationConfig;
use crate::navigation::NavigationMode;
use crate::telemetry::InputSnapshot;

pub const SENSITIVITY_RANGE: (f32, f32) = (0.01, 2.0);
pub const ORBIT_SPEED_RANGE: (f32, f32) = (0.1, 3.0);

const NEVER: u64 = u64::MAX;

/// Thread-safe f32 using bit casting to AtomicU32
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(v: f32) -> Self {
        Self(AtomicU32::new(v.to_bits()))
    }

    pub fn load(&self, order: Ordering) -> f32 {
        f32::from_bits(self.0.load(order))
    }

    pub fn store(&self, v: f32, order: Ordering) {
        self.0.store(v.to_bits(), order);
    }
}

/// Input state shared by the listener, the voice pipeline and the navigator
pub struct InputBus {
    // ========================================================================
    // Telemetry snapshot
    // ========================================================================
    axis_x: AtomicF32,
    axis_y: AtomicF32,
    button: AtomicBool,
    zoom: AtomicBool,
    voice_activation: AtomicBool,

    // ========================================================================
    // Voice activation window
    // ========================================================================
    /// Reference point for the activation timestamp
    epoch: Instant,
    /// Microseconds since `epoch` of the last activation pulse
    last_activation_us: AtomicU64,
    window_us: AtomicU64,

    // ========================================================================
    // Voice status (operator visible)
    // ========================================================================
    listening: AtomicBool,
    last_command: Mutex<Option<String>>,
}

impl InputBus {
    pub fn new(activation_window: Duration) -> Arc<Self> {
        Arc::new(Self {
            axis_x: AtomicF32::new(0.0),
            axis_y: AtomicF32::new(0.0),
            button: AtomicBool::new(false),
            zoom: AtomicBool::new(false),
            voice_activation: AtomicBool::new(false),
            epoch: Instant::now(),
            last_activation_us: AtomicU64::new(NEVER),
            window_us: AtomicU64::new(activation_window.as_micros() as u64),
            listening: AtomicBool::new(false),
            last_command: Mutex::new(None),
        })
    }

    // ========================================================================
    // Snapshot helpers
    // ========================================================================

    /// Replace the whole snapshot with a freshly decoded one
    pub fn publish(&self, snapshot: &InputSnapshot) {
        self.axis_x.store(snapshot.axis_x, Ordering::Relaxed);
        self.axis_y.store(snapshot.axis_y, Ordering::Relaxed);
        self.button.store(snapshot.button, Ordering::Relaxed);
        self.zoom.store(snapshot.zoom, Ordering::Relaxed);
        self.voice_activation
            .store(snapshot.voice_activation, Ordering::Relaxed);
    }

    /// Read the latest values; fields may come from different datagrams
    pub fn snapshot(&self) -> InputSnapshot {
        InputSnapshot {
            axis_x: self.axis_x.load(Ordering::Relaxed),
            axis_y: self.axis_y.load(Ordering::Relaxed),
            button: self.button.load(Ordering::Relaxed),
            zoom: self.zoom.load(Ordering::Relaxed),
            voice_activation: self.voice_activation.load(Ordering::Relaxed),
        }
    }

    // ========================================================================
    // Activation window helpers
    // ========================================================================

    pub fn mark_activation(&self) {
        self.mark_activation_at(Instant::now());
    }

    pub fn mark_activation_at(&self, at: Instant) {
        let us = at.saturating_duration_since(self.epoch).as_micros() as u64;
        self.last_activation_us.store(us, Ordering::SeqCst);
    }

    /// Time since the last activation pulse, if there ever was one
    pub fn since_activation(&self, now: Instant) -> Option<Duration> {
        let last = self.last_activation_us.load(Ordering::SeqCst);
        if last == NEVER {
            return None;
        }
        let now_us = now.saturating_duration_since(self.epoch).as_micros() as u64;
        Some(Duration::from_micros(now_us.saturating_sub(last)))
    }

    /// Voice input is permitted while `now - last_activation < window`
    pub fn is_armed(&self, now: Instant) -> bool {
        let window = Duration::from_micros(self.window_us.load(Ordering::Relaxed));
        self.since_activation(now)
            .is_some_and(|elapsed| elapsed < window)
    }

    pub fn activation_window(&self) -> Duration {
        Duration::from_micros(self.window_us.load(Ordering::Relaxed))
    }

    // ========================================================================
    // Voice status helpers
    // ========================================================================

    /// Claim the microphone; false if a capture is already running
    pub fn try_begin_listening(&self) -> bool {
        self.listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn end_listening(&self) {
        self.listening.store(false, Ordering::SeqCst);
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    pub fn set_last_command(&self, text: &str) {
        if let Ok(mut last) = self.last_command.lock() {
            *last = Some(text.to_string());
        }
    }

    pub fn last_command(&self) -> Option<String> {
        self.last_command.lock().ok().and_then(|last| last.clone())
    }
}

impl fmt::Debug for InputBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputBus")
            .field("snapshot", &self.snapshot())
            .field("listening", &self.is_listening())
            .field("last_command", &self.last_command())
            .finish()
    }
}

pub type SharedBus = Arc<InputBus>;

/// Operator-controlled navigation settings
///
/// Set from the console or config at any time; the navigator reads them on
/// every tick.
pub struct OperatorSettings {
    mode: AtomicU8,
    sensitivity: AtomicF32,
    orbit_speed: AtomicF32,
    target: Mutex<Option<String>>,
}

impl OperatorSettings {
    pub fn new(config: &NavigationConfig) -> Arc<Self> {
        let settings = Self {
            mode: AtomicU8::new(config.mode as u8),
            sensitivity: AtomicF32::new(0.0),
            orbit_speed: AtomicF32::new(0.0),
            target: Mutex::new(config.target.clone()),
        };
        settings.set_sensitivity(config.sensitivity);
        settings.set_orbit_speed(config.orbit_speed);
        Arc::new(settings)
    }

    pub fn mode(&self) -> NavigationMode {
        NavigationMode::from(self.mode.load(Ordering::SeqCst))
    }

    pub fn set_mode(&self, mode: NavigationMode) {
        self.mode.store(mode as u8, Ordering::SeqCst);
    }

    pub fn sensitivity(&self) -> f32 {
        self.sensitivity.load(Ordering::SeqCst)
    }

    /// Clamped to 0.01..=2.0; returns the stored value
    pub fn set_sensitivity(&self, value: f32) -> f32 {
        let value = value.clamp(SENSITIVITY_RANGE.0, SENSITIVITY_RANGE.1);
        self.sensitivity.store(value, Ordering::SeqCst);
        value
    }

    pub fn orbit_speed(&self) -> f32 {
        self.orbit_speed.load(Ordering::SeqCst)
    }

    /// Clamped to 0.1..=3.0; returns the stored value
    pub fn set_orbit_speed(&self, value: f32) -> f32 {
        let value = value.clamp(ORBIT_SPEED_RANGE.0, ORBIT_SPEED_RANGE.1);
        self.orbit_speed.store(value, Ordering::SeqCst);
        value
    }

    pub fn target(&self) -> Option<String> {
        self.target.lock().ok().and_then(|t| t.clone())
    }

    pub fn set_target(&self, target: Option<String>) {
        if let Ok(mut t) = self.target.lock() {
            *t = target;
        }
    }
}

impl fmt::Debug for OperatorSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorSettings")
            .field("mode", &self.mode())
            .field("sensitivity", &self.sensitivity())
            .field("orbit_speed", &self.orbit_speed())
            .field("target", &self.target())
            .finish()
    }
}

pub type SharedSettings = Arc<OperatorSettings>;

#[cfg(test)]
mod tests {
    use super::*;

    fn bus() -> SharedBus {
        InputBus::new(Duration::from_secs(3))
    }

    #[test]
    fn test_publish_replaces_everything() {
        let bus = bus();
        bus.publish(&InputSnapshot {
            axis_x: 0.5,
            axis_y: -0.25,
            button: true,
            zoom: true,
            voice_activation: true,
        });
        bus.publish(&InputSnapshot {
            button: true,
            ..InputSnapshot::default()
        });
        let s = bus.snapshot();
        assert_eq!(s.axis_x, 0.0);
        assert_eq!(s.axis_y, 0.0);
        assert!(s.button);
        assert!(!s.zoom);
    }

    #[test]
    fn test_never_activated_is_not_armed() {
        let bus = bus();
        assert!(!bus.is_armed(Instant::now()));
        assert_eq!(bus.since_activation(Instant::now()), None);
    }

    #[test]
    fn test_activation_window_is_strict() {
        let bus = bus();
        let t0 = Instant::now();
        bus.mark_activation_at(t0);
        assert!(bus.is_armed(t0));
        assert!(bus.is_armed(t0 + Duration::from_millis(2999)));
        assert!(!bus.is_armed(t0 + Duration::from_secs(3)));
        assert!(!bus.is_armed(t0 + Duration::from_millis(3001)));
    }

    #[test]
    fn test_activation_window_slides() {
        let bus = bus();
        let t0 = Instant::now();
        bus.mark_activation_at(t0);
        bus.mark_activation_at(t0 + Duration::from_secs(2));
        assert!(bus.is_armed(t0 + Duration::from_millis(4500)));
    }

    #[test]
    fn test_listening_guard() {
        let bus = bus();
        assert!(bus.try_begin_listening());
        assert!(!bus.try_begin_listening());
        assert!(bus.is_listening());
        bus.end_listening();
        assert!(bus.try_begin_listening());
    }

    #[test]
    fn test_last_command() {
        let bus = bus();
        assert_eq!(bus.last_command(), None);
        bus.set_last_command("quero um cubo");
        assert_eq!(bus.last_command().as_deref(), Some("quero um cubo"));
    }

    #[test]
    fn test_settings_are_clamped() {
        let settings = OperatorSettings::new(&NavigationConfig::default());
        assert_eq!(settings.set_sensitivity(5.0), 2.0);
        assert_eq!(settings.set_sensitivity(0.0), 0.01);
        assert_eq!(settings.set_orbit_speed(0.0), 0.1);
        assert_eq!(settings.set_orbit_speed(10.0), 3.0);
        settings.set_mode(NavigationMode::RotateY);
        assert_eq!(settings.mode(), NavigationMode::RotateY);
    }
}
