//! Joystick telemetry datagrams
//!
//! The controller sends one datagram per sample, ASCII, with whitespace
//! separated `KEY=VALUE` tokens in no particular order:
//!
//! ```text
//! VRX=2048 VRY=1024 BTN=Solto ZOOM=Inativo comandoVoz=Ativo
//! ```
//!
//! Axis values are 12-bit ADC readings centered on 2048.

use crate::config::TelemetryConfig;

pub const AXIS_CENTER: f32 = 2048.0;
pub const AXIS_MAX_RAW: u16 = 4095;

const KEY_AXIS_X: &str = "VRX";
const KEY_AXIS_Y: &str = "VRY";
const KEY_BUTTON: &str = "BTN";
const KEY_ZOOM: &str = "ZOOM";
const KEY_VOICE: &str = "comandoVoz";

/// One decoded telemetry sample
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputSnapshot {
    /// Stick deflection, -1.0 ..= 1.0
    pub axis_x: f32,
    pub axis_y: f32,
    pub button: bool,
    /// Alternate-mode modifier (forward/back instead of pan in free mode)
    pub zoom: bool,
    /// The controller asked for voice input
    pub voice_activation: bool,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidAxis { key: &'static str, value: String },
}

/// Literal values that switch the boolean keys on
#[derive(Debug, Clone)]
pub struct Tokens {
    pressed: String,
    active: String,
}

impl Default for Tokens {
    fn default() -> Self {
        Self::new("pressionado", "ativo")
    }
}

impl Tokens {
    pub fn new(pressed: &str, active: &str) -> Self {
        Self {
            pressed: pressed.to_lowercase(),
            active: active.to_lowercase(),
        }
    }

    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self::new(&config.pressed_token, &config.active_token)
    }

    fn is_pressed(&self, value: &str) -> bool {
        value.to_lowercase() == self.pressed
    }

    fn is_active(&self, value: &str) -> bool {
        value.to_lowercase() == self.active
    }
}

/// Map a raw 12-bit reading onto -1.0 ..= 1.0
pub fn normalize_axis(raw: i64) -> f32 {
    ((raw as f32 - AXIS_CENTER) / AXIS_CENTER).clamp(-1.0, 1.0)
}

fn parse_axis(key: &'static str, value: &str) -> Result<f32, DecodeError> {
    value
        .parse::<i64>()
        .map(normalize_axis)
        .map_err(|_| DecodeError::InvalidAxis {
            key,
            value: value.to_string(),
        })
}

/// Decode with the default Portuguese tokens
pub fn decode(payload: &str) -> Result<InputSnapshot, DecodeError> {
    decode_with(payload, &Tokens::default())
}

/// Decode one datagram into a fresh snapshot.
///
/// Every field starts at its default and only keys present in this payload
/// are applied, so nothing carries over from earlier datagrams. Tokens
/// without `=` and unknown keys are ignored.
#[hotpath::measure]
pub fn decode_with(payload: &str, tokens: &Tokens) -> Result<InputSnapshot, DecodeError> {
    let mut snapshot = InputSnapshot::default();

    for part in payload.split_whitespace() {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        match key {
            KEY_AXIS_X => snapshot.axis_x = parse_axis(KEY_AXIS_X, value)?,
            KEY_AXIS_Y => snapshot.axis_y = parse_axis(KEY_AXIS_Y, value)?,
            KEY_BUTTON => snapshot.button = tokens.is_pressed(value),
            KEY_ZOOM => snapshot.zoom = tokens.is_active(value),
            KEY_VOICE => snapshot.voice_activation = tokens.is_active(value),
            _ => {}
        }
    }

    Ok(snapshot)
}

/// Whether the payload carries an active voice flag.
///
/// Only looks at the voice key, so it still answers when another field
/// fails to decode.
pub fn requests_voice(payload: &str, tokens: &Tokens) -> bool {
    payload
        .split_whitespace()
        .filter_map(|part| part.split_once('='))
        .any(|(key, value)| key == KEY_VOICE && tokens.is_active(value))
}

/// Raw controller state, as the firmware sends it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryFrame {
    pub vrx: u16,
    pub vry: u16,
    pub button: bool,
    pub zoom: bool,
    pub voice: bool,
}

impl Default for TelemetryFrame {
    fn default() -> Self {
        Self {
            vrx: AXIS_CENTER as u16,
            vry: AXIS_CENTER as u16,
            button: false,
            zoom: false,
            voice: false,
        }
    }
}

impl TelemetryFrame {
    pub fn encode(&self) -> String {
        format!(
            "{}={} {}={} {}={} {}={} {}={}",
            KEY_AXIS_X,
            self.vrx.min(AXIS_MAX_RAW),
            KEY_AXIS_Y,
            self.vry.min(AXIS_MAX_RAW),
            KEY_BUTTON,
            if self.button { "Pressionado" } else { "Solto" },
            KEY_ZOOM,
            if self.zoom { "Ativo" } else { "Inativo" },
            KEY_VOICE,
            if self.voice { "Ativo" } else { "Inativo" },
        )
    }
}
