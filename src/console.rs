//! Operator console - slash commands typed on stdin
//!
//! Settings changes are applied here directly. Anything that needs the host
//! or the navigator is returned to the main loop as a [`CommandResult`].
//! Text without a leading slash is treated like a spoken transcript.

use crate::host::ObjectMode;
use crate::navigation::NavigationMode;
use crate::state::SharedSettings;

/// Result of console input processing
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// Handled here; optional message for the operator
    Handled(Option<String>),

    StartNavigation,
    StopNavigation,
    SetObjectMode(ObjectMode),
    ResetView,
    MicTest,
    Stats,
    Status,

    /// Not a slash command, run it through the vocabulary
    Transcript(String),

    /// Request application shutdown
    Shutdown,
}

const HELP: &str = "\
Commands:
  /start                  - Start joystick navigation
  /stop                   - Stop joystick navigation
  /mode <free|orbit|rotate-x|rotate-y>
  /target <name|none>     - Object for orbit and rotate modes
  /sensitivity <0.01-2.0> - Rotation sensitivity
  /orbit-speed <0.1-3.0>  - Orbit and free-fly speed
  /object-mode <object|edit|sculpt>
  /reset                  - Move the view back to the origin
  /mic-test               - Record one phrase and show the recognition
  /stats                  - Recognition latency stats
  /status                 - Show current status
  /help                   - Show this help
  /quit                   - Exit

Anything else is handled like a voice command (e.g. 'cubo', 'render').";

/// Parse one console line
pub fn process_input(input: &str, settings: &SharedSettings) -> Option<CommandResult> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let Some(command) = input.strip_prefix('/') else {
        return Some(CommandResult::Transcript(input.to_string()));
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name.to_lowercase(), arg.trim()),
        None => (command.to_lowercase(), ""),
    };

    let result = match name.as_str() {
        "start" => CommandResult::StartNavigation,
        "stop" => CommandResult::StopNavigation,
        "mode" => match NavigationMode::parse(arg) {
            Some(mode) => {
                settings.set_mode(mode);
                let hint = if mode.needs_target() && settings.target().is_none() {
                    " (set a target with /target)"
                } else {
                    ""
                };
                CommandResult::Handled(Some(format!("Navigation mode: {}{}", mode, hint)))
            }
            None => usage("/mode <free|orbit|rotate-x|rotate-y>"),
        },
        "target" => match arg {
            "" => usage("/target <name|none>"),
            "none" => {
                settings.set_target(None);
                CommandResult::Handled(Some("Target cleared".to_string()))
            }
            name => {
                settings.set_target(Some(name.to_string()));
                CommandResult::Handled(Some(format!("Target: {}", name)))
            }
        },
        "sensitivity" => match arg.parse::<f32>() {
            Ok(v) if v.is_finite() => {
                let stored = settings.set_sensitivity(v);
                CommandResult::Handled(Some(format!("Sensitivity: {:.2}", stored)))
            }
            _ => usage("/sensitivity <0.01-2.0>"),
        },
        "orbit-speed" | "speed" => match arg.parse::<f32>() {
            Ok(v) if v.is_finite() => {
                let stored = settings.set_orbit_speed(v);
                CommandResult::Handled(Some(format!("Orbit speed: {:.2}", stored)))
            }
            _ => usage("/orbit-speed <0.1-3.0>"),
        },
        "object-mode" | "om" => match ObjectMode::parse(arg) {
            Some(mode) => CommandResult::SetObjectMode(mode),
            None => usage("/object-mode <object|edit|sculpt>"),
        },
        "reset" => CommandResult::ResetView,
        "mic-test" | "mic" => CommandResult::MicTest,
        "stats" => CommandResult::Stats,
        "status" => CommandResult::Status,
        "help" | "commands" => CommandResult::Handled(Some(HELP.to_string())),
        "quit" | "exit" => CommandResult::Shutdown,
        _ => CommandResult::Handled(Some(format!("Unknown command: /{} (try /help)", name))),
    };
    Some(result)
}

fn usage(text: &str) -> CommandResult {
    CommandResult::Handled(Some(format!("Usage: {}", text)))
}
