//! Joystick telemetry and voice command fusion for an interactive 3D viewport.
//!
//! Two background loops feed a shared [`state::InputBus`]: the UDP telemetry
//! listener and the voice capture pipeline. The navigation controller polls
//! the bus on the host's main loop and turns stick deflection into camera or
//! object motion, while recognized voice commands are dispatched as host
//! actions.

pub mod config;
pub mod console;
pub mod dispatch;
pub mod host;
pub mod listener;
pub mod menu;
pub mod motion;
pub mod navigation;
pub mod sim;
pub mod state;
pub mod stats;
pub mod status;
pub mod telemetry;
pub mod vocabulary;
pub mod voice;

