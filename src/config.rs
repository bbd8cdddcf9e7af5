use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::navigation::NavigationMode;
use crate::vocabulary::Action;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub vocabulary: VocabularyConfig,
}

// ============================================================================
// Telemetry Config
// ============================================================================

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    /// Address the datagram socket binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Receive timeout, also the shutdown polling interval
    #[serde(default = "default_recv_timeout_ms")]
    pub recv_timeout_ms: u64,
    /// Value of `BTN` that means pressed (case-insensitive)
    #[serde(default = "default_pressed_token")]
    pub pressed_token: String,
    /// Value of `ZOOM` / `comandoVoz` that means active (case-insensitive)
    #[serde(default = "default_active_token")]
    pub active_token: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            recv_timeout_ms: default_recv_timeout_ms(),
            pressed_token: default_pressed_token(),
            active_token: default_active_token(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_recv_timeout_ms() -> u64 {
    1000
}
fn default_pressed_token() -> String {
    "pressionado".into()
}
fn default_active_token() -> String {
    "ativo".into()
}

// ============================================================================
// Voice Config
// ============================================================================

#[derive(Debug, Deserialize, Clone)]
pub struct VoiceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// How long an activation pulse keeps the microphone armed
    #[serde(default = "default_activation_window_ms")]
    pub activation_window_ms: u64,
    #[serde(default = "default_calibration_ms")]
    pub calibration_ms: u64,
    /// Give up if no speech starts within this time
    #[serde(default = "default_listen_timeout_ms")]
    pub listen_timeout_ms: u64,
    /// Maximum length of a captured phrase
    #[serde(default = "default_phrase_limit_ms")]
    pub phrase_limit_ms: u64,
    /// Trailing silence that ends a phrase
    #[serde(default = "default_pause_threshold_ms")]
    pub pause_threshold_ms: u64,
    /// Minimum RMS energy (16-bit scale) treated as speech
    #[serde(default = "default_energy_threshold")]
    pub energy_threshold: f32,
    #[serde(default = "default_language")]
    pub language: String,
    /// Re-poll interval while outside the activation window
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub remote: RemoteSttConfig,
    #[serde(default)]
    pub local: LocalSttConfig,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            activation_window_ms: default_activation_window_ms(),
            calibration_ms: default_calibration_ms(),
            listen_timeout_ms: default_listen_timeout_ms(),
            phrase_limit_ms: default_phrase_limit_ms(),
            pause_threshold_ms: default_pause_threshold_ms(),
            energy_threshold: default_energy_threshold(),
            language: default_language(),
            poll_interval_ms: default_poll_interval_ms(),
            remote: RemoteSttConfig::default(),
            local: LocalSttConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_activation_window_ms() -> u64 {
    3000
}
fn default_calibration_ms() -> u64 {
    1000
}
fn default_listen_timeout_ms() -> u64 {
    5000
}
fn default_phrase_limit_ms() -> u64 {
    7000
}
fn default_pause_threshold_ms() -> u64 {
    1000
}
fn default_energy_threshold() -> f32 {
    300.0
}
fn default_language() -> String {
    "pt-BR".into()
}
fn default_poll_interval_ms() -> u64 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteSttConfig {
    /// Use the cloud recognizer first; only effective with an api key
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_remote_endpoint")]
    pub endpoint: String,
    /// API key (supports ${ENV_VAR} syntax)
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_remote_model")]
    pub model: String,
    /// Phrases the recognizer should favour
    #[serde(default)]
    pub phrases: Vec<String>,
    #[serde(default = "default_phrase_boost")]
    pub boost: f32,
    #[serde(default = "default_request_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RemoteSttConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_remote_endpoint(),
            api_key: None,
            model: default_remote_model(),
            phrases: Vec::new(),
            boost: default_phrase_boost(),
            timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_remote_endpoint() -> String {
    "https://speech.googleapis.com/v1p1beta1/speech:recognize".into()
}
fn default_remote_model() -> String {
    "command_and_search".into()
}
fn default_phrase_boost() -> f32 {
    15.0
}
fn default_request_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocalSttConfig {
    /// OpenAI-compatible transcription server (e.g. whisper.cpp)
    #[serde(default = "default_local_base_url")]
    pub base_url: String,
    #[serde(default = "default_local_model")]
    pub model: String,
    #[serde(default = "default_request_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for LocalSttConfig {
    fn default() -> Self {
        Self {
            base_url: default_local_base_url(),
            model: default_local_model(),
            timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_local_base_url() -> String {
    "http://127.0.0.1:9000/v1".into()
}
fn default_local_model() -> String {
    "whisper-1".into()
}

// ============================================================================
// Navigation Config
// ============================================================================

#[derive(Debug, Deserialize, Clone)]
pub struct NavigationConfig {
    #[serde(default)]
    pub mode: NavigationMode,
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f32,
    #[serde(default = "default_orbit_speed")]
    pub orbit_speed: f32,
    /// Object the orbit and rotate modes act on
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Start navigation (and the telemetry listener) at launch
    #[serde(default = "default_true")]
    pub autostart: bool,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            mode: NavigationMode::default(),
            sensitivity: default_sensitivity(),
            orbit_speed: default_orbit_speed(),
            target: None,
            tick_interval_ms: default_tick_interval_ms(),
            autostart: true,
        }
    }
}

fn default_sensitivity() -> f32 {
    0.2
}
fn default_orbit_speed() -> f32 {
    1.0
}
fn default_tick_interval_ms() -> u64 {
    20
}

// ============================================================================
// Vocabulary Config
// ============================================================================

#[derive(Debug, Deserialize, Default, Clone)]
pub struct VocabularyConfig {
    /// Additional keywords appended to an action's synonym list
    #[serde(default)]
    pub extra: Vec<ExtraKeywords>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtraKeywords {
    pub action: Action,
    pub keywords: Vec<String>,
}

/// Expand ${VAR} to environment variable values
fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();

    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_else(|_| {
                tracing::warn!(var = var_name, "environment variable not found");
                String::new()
            });
            result.replace_range(start..start + end + 1, &value);
        } else {
            break;
        }
    }

    result
}

impl RemoteSttConfig {
    /// The api key with environment references expanded, if one is set
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .as_deref()
            .map(expand_env_vars)
            .filter(|key| !key.is_empty())
    }
}

impl Config {
    /// Load `config.toml` from the working directory, falling back to defaults
    pub fn load() -> Self {
        let path = Path::new(DEFAULT_CONFIG_PATH);
        if !path.exists() {
            return Config::default();
        }
        match Self::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "using default configuration");
                Config::default()
            }
        }
    }

    /// Load an explicitly requested config file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_device_protocol() {
        let config = Config::default();
        assert_eq!(config.telemetry.port, 8080);
        assert_eq!(config.telemetry.recv_timeout_ms, 1000);
        assert_eq!(config.voice.activation_window_ms, 3000);
        assert_eq!(config.voice.listen_timeout_ms, 5000);
        assert_eq!(config.voice.phrase_limit_ms, 7000);
        assert_eq!(config.navigation.tick_interval_ms, 20);
        assert_eq!(config.navigation.mode, NavigationMode::Free);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::parse(
            r#"
            [telemetry]
            port = 8081

            [navigation]
            mode = "orbit"
            target = "Cube"
            "#,
        )
        .unwrap();
        assert_eq!(config.telemetry.port, 8081);
        assert_eq!(config.telemetry.pressed_token, "pressionado");
        assert_eq!(config.navigation.mode, NavigationMode::Orbit);
        assert_eq!(config.navigation.target.as_deref(), Some("Cube"));
        assert!((config.navigation.sensitivity - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_extra_vocabulary() {
        let config = Config::parse(
            r#"
            [[vocabulary.extra]]
            action = "cube"
            keywords = ["caixa"]
            "#,
        )
        .unwrap();
        assert_eq!(config.vocabulary.extra.len(), 1);
        assert_eq!(config.vocabulary.extra[0].action, Action::Cube);
    }

    #[test]
    fn test_expand_env_vars() {
        // SAFETY: test-local variable name, not read concurrently elsewhere
        unsafe { std::env::set_var("JOYVOX_TEST_KEY", "secret") };
        assert_eq!(expand_env_vars("${JOYVOX_TEST_KEY}"), "secret");
        assert_eq!(expand_env_vars("k-${JOYVOX_TEST_KEY}-x"), "k-secret-x");
        assert_eq!(expand_env_vars("plain"), "plain");
    }

    #[test]
    fn test_empty_api_key_is_none() {
        let remote = RemoteSttConfig {
            api_key: Some("${JOYVOX_TEST_MISSING_KEY}".into()),
            ..RemoteSttConfig::default()
        };
        assert_eq!(remote.resolved_api_key(), None);
    }
}
