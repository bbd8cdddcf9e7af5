//! Stick-to-motion mapping, one tick at a time
//!
//! A [`ModalSession`] is created when navigation starts and dropped when it
//! stops. Each tick reads the latest [`InputSnapshot`] and moves either the
//! viewport camera or the target object, depending on the navigation mode.

use glam::{Quat, Vec3};
use std::time::Duration;

use crate::host::{Host, ViewState};
use crate::menu::RadialMenu;
use crate::navigation::NavigationMode;
use crate::state::OperatorSettings;
use crate::telemetry::InputSnapshot;

pub const ROTATE_DEADZONE: f32 = 0.1;
pub const ORBIT_DEADZONE: f32 = 0.05;
pub const FREE_DEADZONE: f32 = 0.05;

/// Below this the cached orbit distance is replaced by [`DEFAULT_ORBIT_DISTANCE`]
pub const MIN_ORBIT_DISTANCE: f32 = 0.1;
pub const DEFAULT_ORBIT_DISTANCE: f32 = 3.0;

const SPEED_SCALE: f32 = 0.1;
const ROTATE_SCALE: f32 = 0.5;
const ORBIT_SCALE: f32 = 0.05;
const DOLLY_SCALE: f32 = 3.0;

pub fn deadzone_threshold(mode: NavigationMode) -> f32 {
    match mode {
        NavigationMode::RotateX | NavigationMode::RotateY => ROTATE_DEADZONE,
        NavigationMode::Orbit => ORBIT_DEADZONE,
        NavigationMode::Free => FREE_DEADZONE,
    }
}

/// Values with magnitude at or below the threshold become zero
pub fn apply_deadzone(value: f32, threshold: f32) -> f32 {
    if value.abs() <= threshold { 0.0 } else { value }
}

/// Fires once per false -> true transition
#[derive(Debug, Default, Clone, Copy)]
pub struct ButtonEdge {
    previous: bool,
}

impl ButtonEdge {
    pub fn update(&mut self, pressed: bool) -> bool {
        let rising = pressed && !self.previous;
        self.previous = pressed;
        rising
    }
}

/// Settings as seen by one tick
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationSettings {
    pub mode: NavigationMode,
    pub sensitivity: f32,
    pub orbit_speed: f32,
    pub target: Option<String>,
}

impl Default for NavigationSettings {
    fn default() -> Self {
        Self {
            mode: NavigationMode::Free,
            sensitivity: 0.2,
            orbit_speed: 1.0,
            target: None,
        }
    }
}

impl From<&OperatorSettings> for NavigationSettings {
    fn from(settings: &OperatorSettings) -> Self {
        Self {
            mode: settings.mode(),
            sensitivity: settings.sensitivity(),
            orbit_speed: settings.orbit_speed(),
            target: settings.target(),
        }
    }
}

/// Handle for the periodic tick registered with the host loop
#[derive(Debug)]
pub struct TickTimer {
    period: Duration,
    cancelled: bool,
}

impl TickTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            cancelled: false,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

/// What one tick did
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickReport {
    pub view_moved: bool,
    pub object_rotated: bool,
    pub menu_opened: bool,
}

#[derive(Debug)]
pub struct ModalSession {
    timer: TickTimer,
    orbit_distance: Option<f32>,
    button_edge: ButtonEdge,
    ticks: u64,
}

impl ModalSession {
    pub fn new(period: Duration) -> Self {
        Self {
            timer: TickTimer::new(period),
            orbit_distance: None,
            button_edge: ButtonEdge::default(),
            ticks: 0,
        }
    }

    pub fn timer(&self) -> &TickTimer {
        &self.timer
    }

    pub fn cancel_timer(&mut self) {
        self.timer.cancel();
    }

    pub fn orbit_distance(&self) -> Option<f32> {
        self.orbit_distance
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    #[hotpath::measure]
    pub fn tick(
        &mut self,
        input: &InputSnapshot,
        settings: &NavigationSettings,
        host: &mut dyn Host,
    ) -> TickReport {
        let mut report = TickReport::default();
        if self.timer.is_cancelled() {
            return report;
        }
        self.ticks += 1;

        let threshold = deadzone_threshold(settings.mode);
        let dx = apply_deadzone(input.axis_x, threshold);
        let dy = apply_deadzone(input.axis_y, threshold);

        match settings.mode {
            NavigationMode::RotateX => {
                // stick up tilts the object forward
                let angle = -dy * settings.sensitivity * SPEED_SCALE * ROTATE_SCALE;
                report.object_rotated = rotate_target(host, settings, Vec3::X * angle);
            }
            NavigationMode::RotateY => {
                let angle = dx * settings.sensitivity * SPEED_SCALE * ROTATE_SCALE;
                report.object_rotated = rotate_target(host, settings, Vec3::Y * angle);
            }
            NavigationMode::Orbit => {
                report.view_moved = self.orbit(host, settings, dx);
            }
            NavigationMode::Free => {
                report.view_moved = fly(host, settings, dx, dy, input.zoom);
            }
        }

        if self.button_edge.update(input.button) {
            let menu = RadialMenu::for_mode(host.object_mode());
            host.show_radial_menu(&menu);
            report.menu_opened = true;
        }

        host.tag_redraw();
        report
    }

    fn orbit(&mut self, host: &mut dyn Host, settings: &NavigationSettings, dx: f32) -> bool {
        let Some(target) = settings
            .target
            .as_deref()
            .and_then(|name| host.object_transform(name))
        else {
            return false;
        };
        let view = host.view();

        let distance = *self.orbit_distance.get_or_insert_with(|| {
            let d = (view.location - target.location).length();
            if d < MIN_ORBIT_DISTANCE {
                DEFAULT_ORBIT_DISTANCE
            } else {
                d
            }
        });

        if dx == 0.0 {
            return false;
        }

        let angle = -dx * settings.orbit_speed * SPEED_SCALE * ORBIT_SCALE;
        let rotation = (Quat::from_axis_angle(Vec3::Z, angle) * view.rotation).normalize();
        host.set_view(ViewState {
            location: target.location + rotation * Vec3::new(0.0, 0.0, distance),
            rotation,
        });
        true
    }
}

/// Add `delta` to the target's Euler rotation and keyframe it
fn rotate_target(host: &mut dyn Host, settings: &NavigationSettings, delta: Vec3) -> bool {
    if delta == Vec3::ZERO {
        return false;
    }
    let Some(name) = settings.target.as_deref() else {
        return false;
    };
    let Some(transform) = host.object_transform(name) else {
        return false;
    };

    if let Err(e) = host.set_object_rotation(name, transform.rotation + delta) {
        tracing::warn!(target_object = name, error = %e, "rotation failed");
        return false;
    }
    if let Err(e) = host.insert_rotation_keyframe(name) {
        tracing::warn!(target_object = name, error = %e, "keyframe insert failed");
    }
    true
}

/// Free-fly along the camera's own axes
fn fly(host: &mut dyn Host, settings: &NavigationSettings, dx: f32, dy: f32, zoom: bool) -> bool {
    let view = host.view();
    let speed = settings.orbit_speed * SPEED_SCALE;

    let right = view.rotation * Vec3::X;
    let up = view.rotation * Vec3::Y;
    let forward = view.rotation * Vec3::NEG_Z;

    let mut offset = Vec3::ZERO;
    if zoom {
        offset += forward * dy * speed * DOLLY_SCALE;
    } else {
        offset += right * dx * speed;
        offset += up * dy * speed;
    }

    if offset == Vec3::ZERO {
        return false;
    }
    host.set_view(ViewState {
        location: view.location + offset,
        rotation: view.rotation,
    });
    true
}
