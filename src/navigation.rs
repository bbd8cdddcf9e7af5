//! Navigation lifecycle
//!
//! [`Navigator`] owns at most one [`ModalSession`] and the telemetry listener
//! that feeds it. The host loop forwards its events here; timer events tick
//! the session, everything else passes through untouched.

use serde::Deserialize;
use std::fmt;
use std::io;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::{NavigationConfig, TelemetryConfig};
use crate::host::{Host, ReportLevel};
use crate::listener::{ListenerHandle, TelemetryListener};
use crate::motion::{ModalSession, NavigationSettings, TickReport};
use crate::state::{SharedBus, SharedSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum NavigationMode {
    #[default]
    Free = 0,
    Orbit = 1,
    RotateX = 2,
    RotateY = 3,
}

impl NavigationMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "free" => Some(NavigationMode::Free),
            "orbit" => Some(NavigationMode::Orbit),
            "rotate-x" => Some(NavigationMode::RotateX),
            "rotate-y" => Some(NavigationMode::RotateY),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NavigationMode::Free => "free",
            NavigationMode::Orbit => "orbit",
            NavigationMode::RotateX => "rotate-x",
            NavigationMode::RotateY => "rotate-y",
        }
    }

    /// Modes that act on the bound target object
    pub fn needs_target(self) -> bool {
        !matches!(self, NavigationMode::Free)
    }
}

impl From<u8> for NavigationMode {
    fn from(v: u8) -> Self {
        match v {
            1 => NavigationMode::Orbit,
            2 => NavigationMode::RotateX,
            3 => NavigationMode::RotateY,
            _ => NavigationMode::Free,
        }
    }
}

impl fmt::Display for NavigationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NavigationError {
    #[error("navigation is already running")]
    AlreadyRunning,

    #[error("failed to bind telemetry socket: {0}")]
    Bind(#[source] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Running,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    Timer,
    PointerMove,
    PointerButton,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    /// The host keeps processing the event
    PassThrough,
}

pub struct Navigator {
    telemetry: TelemetryConfig,
    tick_interval: Duration,
    bus: SharedBus,
    settings: SharedSettings,
    root: CancellationToken,
    session: Option<ModalSession>,
    listener: Option<ListenerHandle>,
    /// Stopped listener thread that may still hold the port
    retired: Option<JoinHandle<()>>,
    last_tick: TickReport,
}

impl Navigator {
    pub fn new(
        telemetry: &TelemetryConfig,
        navigation: &NavigationConfig,
        bus: SharedBus,
        settings: SharedSettings,
        root: CancellationToken,
    ) -> Self {
        Self {
            telemetry: telemetry.clone(),
            tick_interval: Duration::from_millis(navigation.tick_interval_ms.max(1)),
            bus,
            settings,
            root,
            session: None,
            listener: None,
            retired: None,
            last_tick: TickReport::default(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn session(&self) -> Option<&ModalSession> {
        self.session.as_ref()
    }

    pub fn listener(&self) -> Option<&ListenerHandle> {
        self.listener.as_ref()
    }

    pub fn last_tick(&self) -> &TickReport {
        &self.last_tick
    }

    /// Start listening for telemetry and ticking the viewport
    pub fn start(&mut self, host: &mut dyn Host) -> Result<StartOutcome, NavigationError> {
        if self.session.is_some() {
            return Err(NavigationError::AlreadyRunning);
        }

        if !host.has_viewport() {
            host.report(ReportLevel::Error, "no 3D viewport found");
            return Ok(StartOutcome::Cancelled);
        }

        if let Some(thread) = self.retired.take()
            && thread.join().is_err()
        {
            tracing::error!("telemetry listener thread panicked");
        }

        let listener = TelemetryListener::spawn(
            &self.telemetry,
            self.bus.clone(),
            self.root.child_token(),
        )
        .map_err(NavigationError::Bind)?;

        self.listener = Some(listener);
        self.session = Some(ModalSession::new(self.tick_interval));
        self.last_tick = TickReport::default();

        tracing::info!(
            mode = %self.settings.mode(),
            interval_ms = self.tick_interval.as_millis() as u64,
            "navigation started"
        );
        host.report(ReportLevel::Info, "joystick navigation started");
        Ok(StartOutcome::Running)
    }

    pub fn handle_event(&mut self, event: &HostEvent, host: &mut dyn Host) -> EventDisposition {
        if let (HostEvent::Timer, Some(session)) = (event, self.session.as_mut()) {
            let input = self.bus.snapshot();
            let settings = NavigationSettings::from(&*self.settings);
            self.last_tick = session.tick(&input, &settings, host);
        }
        EventDisposition::PassThrough
    }

    /// Tear down the session; false if nothing was running.
    ///
    /// Returns without waiting for the listener thread, which is joined on
    /// the next [`start`](Self::start) instead.
    pub fn stop(&mut self, host: &mut dyn Host) -> bool {
        let Some(mut session) = self.session.take() else {
            return false;
        };
        session.cancel_timer();

        if let Some(listener) = self.listener.take() {
            self.retired = listener.detach();
        }

        tracing::info!(ticks = session.ticks(), "navigation stopped");
        host.report(ReportLevel::Info, "joystick navigation stopped");
        true
    }

    /// Host-initiated cancellation; same teardown as [`stop`](Self::stop)
    pub fn cancel(&mut self, host: &mut dyn Host) -> bool {
        self.stop(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{InputBus, OperatorSettings};
    use crate::sim::SimHost;
    use crate::telemetry::InputSnapshot;

    fn navigator() -> Navigator {
        navigator_with_timeout(50)
    }

    fn navigator_with_timeout(recv_timeout_ms: u64) -> Navigator {
        let telemetry = TelemetryConfig {
            bind_address: "127.0.0.1".into(),
            port: 0,
            recv_timeout_ms,
            ..TelemetryConfig::default()
        };
        let navigation = NavigationConfig::default();
        Navigator::new(
            &telemetry,
            &navigation,
            InputBus::new(Duration::from_secs(3)),
            OperatorSettings::new(&navigation),
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_mode_parse_and_u8() {
        assert_eq!(NavigationMode::parse("rotate_x"), Some(NavigationMode::RotateX));
        assert_eq!(NavigationMode::parse("ORBIT"), Some(NavigationMode::Orbit));
        assert_eq!(NavigationMode::parse("spin"), None);
        for mode in [
            NavigationMode::Free,
            NavigationMode::Orbit,
            NavigationMode::RotateX,
            NavigationMode::RotateY,
        ] {
            assert_eq!(NavigationMode::from(mode as u8), mode);
        }
    }

    #[test]
    fn test_start_without_viewport_is_cancelled() {
        let mut nav = navigator();
        let mut host = SimHost::new();
        host.set_viewport(false);
        assert_eq!(nav.start(&mut host).unwrap(), StartOutcome::Cancelled);
        assert!(!nav.is_running());
        assert_eq!(host.last_report().map(|(l, _)| *l), Some(ReportLevel::Error));
    }

    #[test]
    fn test_duplicate_start_is_rejected() {
        let mut nav = navigator();
        let mut host = SimHost::new();
        assert_eq!(nav.start(&mut host).unwrap(), StartOutcome::Running);
        assert!(matches!(nav.start(&mut host), Err(NavigationError::AlreadyRunning)));
        assert!(nav.stop(&mut host));
    }

    #[test]
    fn test_stop_clears_and_second_stop_is_noop() {
        let mut nav = navigator();
        let mut host = SimHost::new();
        nav.start(&mut host).unwrap();
        assert!(nav.listener().is_some());
        assert!(nav.stop(&mut host));
        assert!(!nav.is_running());
        assert!(nav.listener().is_none());
        assert!(!nav.stop(&mut host));
        // restart after stop is allowed
        assert_eq!(nav.start(&mut host).unwrap(), StartOutcome::Running);
        assert!(nav.cancel(&mut host));
    }

    #[test]
    fn test_stop_does_not_wait_for_receive_timeout() {
        let mut nav = navigator_with_timeout(1000);
        let mut host = SimHost::new();
        nav.start(&mut host).unwrap();
        // let the listener settle into its blocking receive
        std::thread::sleep(Duration::from_millis(50));

        let start = std::time::Instant::now();
        assert!(nav.stop(&mut host));
        assert!(start.elapsed() < Duration::from_millis(200));

        // the retired thread is joined before the next bind
        assert_eq!(nav.start(&mut host).unwrap(), StartOutcome::Running);
        assert!(nav.retired.is_none());
        nav.stop(&mut host);
    }

    #[test]
    fn test_events_pass_through_and_timer_ticks() {
        let mut nav = navigator();
        let mut host = SimHost::new();
        assert_eq!(
            nav.handle_event(&HostEvent::Timer, &mut host),
            EventDisposition::PassThrough
        );
        assert_eq!(host.redraws(), 0);

        nav.start(&mut host).unwrap();
        nav.bus.publish(&InputSnapshot {
            axis_x: 1.0,
            ..InputSnapshot::default()
        });
        let before = host.view();
        for event in [HostEvent::PointerMove, HostEvent::PointerButton, HostEvent::Other] {
            assert_eq!(nav.handle_event(&event, &mut host), EventDisposition::PassThrough);
        }
        assert_eq!(host.view(), before);

        nav.handle_event(&HostEvent::Timer, &mut host);
        assert!(nav.last_tick().view_moved);
        assert_ne!(host.view(), before);
        assert_eq!(host.redraws(), 1);
        nav.stop(&mut host);
    }
}
