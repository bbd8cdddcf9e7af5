//! Operator status line

use unicode_width::UnicodeWidthStr;

use crate::host::ObjectMode;
use crate::navigation::NavigationMode;
use crate::state::{InputBus, OperatorSettings};
use crate::telemetry::InputSnapshot;
use crate::voice::VoiceState;

const BARS: [&str; 5] = ["▁", "▂", "▄", "▆", "█"];
const NO_COMMAND: &str = "no command yet";

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StatusDisplayStyle {
    /// Symbols and colors
    Emoji,
    /// Plain labels, for logs and dumb terminals
    Text,
}

/// Everything the status line shows, captured at one instant
#[derive(Clone, Debug)]
pub struct StatusSnapshot {
    pub navigating: bool,
    pub mode: NavigationMode,
    pub sensitivity: f32,
    pub orbit_speed: f32,
    pub target: Option<String>,
    pub object_mode: ObjectMode,
    pub input: InputSnapshot,
    pub voice: VoiceState,
    pub armed: bool,
    pub listening: bool,
    pub last_command: Option<String>,
    pub clock: String,
}

impl StatusSnapshot {
    pub fn capture(
        navigating: bool,
        settings: &OperatorSettings,
        bus: &InputBus,
        voice: VoiceState,
        object_mode: ObjectMode,
    ) -> Self {
        Self {
            navigating,
            mode: settings.mode(),
            sensitivity: settings.sensitivity(),
            orbit_speed: settings.orbit_speed(),
            target: settings.target(),
            object_mode,
            input: bus.snapshot(),
            voice,
            armed: bus.is_armed(std::time::Instant::now()),
            listening: bus.is_listening(),
            last_command: bus.last_command(),
            clock: chrono::Local::now().format("%H:%M:%S").to_string(),
        }
    }

    /// Stick deflection as a bar glyph
    fn stick_bar(&self) -> &'static str {
        let magnitude = self.input.axis_x.abs().max(self.input.axis_y.abs()).min(1.0);
        BARS[(magnitude * (BARS.len() - 1) as f32).round() as usize]
    }

    fn voice_string(&self, style: StatusDisplayStyle) -> String {
        match style {
            StatusDisplayStyle::Emoji => {
                let icon = if self.listening {
                    "\x1b[92m🎙\x1b[90m"
                } else if self.armed {
                    "\x1b[93m👂\x1b[90m"
                } else {
                    "💤"
                };
                format!("{} {}", icon, self.voice)
            }
            StatusDisplayStyle::Text => format!("Voice: {}", self.voice),
        }
    }

    pub fn render(&self, style: StatusDisplayStyle, term_width: Option<usize>) -> String {
        let target = self.target.as_deref().unwrap_or("-");
        let last = self.last_command.as_deref().unwrap_or(NO_COMMAND);

        let content = match style {
            StatusDisplayStyle::Emoji => format!(
                "{} {} │ {} │ 🎯 {} │ ⚙ {:.2}/{:.2} │ {} │ {} │ 💬 '{}' │ {}",
                if self.navigating { "\x1b[92m▶\x1b[90m" } else { "\x1b[33m⏸\x1b[90m" },
                self.mode,
                self.object_mode,
                target,
                self.sensitivity,
                self.orbit_speed,
                self.stick_bar(),
                self.voice_string(style),
                last,
                self.clock,
            ),
            StatusDisplayStyle::Text => format!(
                "[{}] Mode: {} | Object: {} | Target: {} | Sens: {:.2} | Speed: {:.2} | {} | Last: '{}'",
                if self.navigating { "RUN" } else { "STOP" },
                self.mode,
                self.object_mode,
                target,
                self.sensitivity,
                self.orbit_speed,
                self.voice_string(style),
                last,
            ),
        };

        if let (Some(width), StatusDisplayStyle::Emoji) = (term_width, style) {
            let status_width = content.width();
            let padding = width.saturating_sub(status_width) / 2;
            format!("\x1b[90m{}{}\x1b[0m", " ".repeat(padding), content)
        } else {
            content
        }
    }
}
