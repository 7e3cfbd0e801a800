use serde::Deserialize;

use crate::error::ClientError;

/// Which side of the quiz this client drives.
///
/// Players join with a name, answer questions, and watch their score; hosts
/// list the question bank, start questions, and watch the leaderboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Player,
    Host,
}

/// Top-level client configuration, loaded from `quizwire.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the quiz backend (`http` or `https`).
    pub backend_url: String,
    /// Path of the WebSocket endpoint on the backend.
    pub ws_path: String,
    pub role: Role,
    /// Countdown duration per question, in seconds. The backend has shipped
    /// with different values over time, so this is never hard-coded.
    pub question_duration_secs: u32,
    pub timer: TimerConfig,
    pub reconnect: ReconnectConfig,
    pub limits: LimitsConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8000".to_string(),
            ws_path: "/ws".to_string(),
            role: Role::Player,
            question_duration_secs: 15,
            timer: TimerConfig::default(),
            reconnect: ReconnectConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

/// Countdown timer tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Interval between countdown ticks, in milliseconds.
    pub tick_interval_ms: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
        }
    }
}

/// Channel reconnect policy: a fixed delay per attempt, no growth and no
/// jitter, with an optional attempt cap.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay between reconnect attempts, in milliseconds.
    pub delay_ms: u64,
    /// Give up after this many consecutive failed attempts. `None` retries
    /// forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay_ms: 1500,
            max_attempts: None,
        }
    }
}

/// Buffer sizes and request limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Capacity of the server-event and session-event broadcast buffers.
    pub event_capacity: usize,
    /// Timeout applied to one-shot HTTP calls, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            event_capacity: 64,
            request_timeout_secs: 10,
        }
    }
}

impl ClientConfig {
    /// Check the configuration for values the client cannot run with.
    pub fn validate(&self) -> Result<(), ClientError> {
        let url = reqwest::Url::parse(&self.backend_url)
            .map_err(|e| ClientError::Validation(format!("backend_url is not a URL: {e}")))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ClientError::Validation(format!(
                "backend_url must be http or https, got {}",
                url.scheme()
            )));
        }
        if !self.ws_path.starts_with('/') {
            return Err(ClientError::Validation(
                "ws_path must start with '/'".to_string(),
            ));
        }
        if self.question_duration_secs == 0 {
            return Err(ClientError::Validation(
                "question_duration_secs must be > 0".to_string(),
            ));
        }
        if self.timer.tick_interval_ms == 0 {
            return Err(ClientError::Validation(
                "timer.tick_interval_ms must be > 0".to_string(),
            ));
        }
        if self.reconnect.delay_ms == 0 {
            return Err(ClientError::Validation(
                "reconnect.delay_ms must be > 0".to_string(),
            ));
        }
        if self.reconnect.max_attempts == Some(0) {
            return Err(ClientError::Validation(
                "reconnect.max_attempts must be > 0 when set".to_string(),
            ));
        }
        if self.limits.event_capacity == 0 {
            return Err(ClientError::Validation(
                "limits.event_capacity must be > 0".to_string(),
            ));
        }
        if self.limits.request_timeout_secs == 0 {
            return Err(ClientError::Validation(
                "limits.request_timeout_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Load config from `quizwire.toml` if it exists, then apply env var
    /// overrides.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string("quizwire.toml") {
            Ok(content) => match toml::from_str::<ClientConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from quizwire.toml");
                    cfg
                },
                Err(e) => {
                    tracing::warn!("Failed to parse quizwire.toml: {e}, using defaults");
                    ClientConfig::default()
                },
            },
            Err(_) => {
                tracing::info!("No quizwire.toml found, using defaults");
                ClientConfig::default()
            },
        };

        if let Ok(url) = std::env::var("QUIZWIRE_BACKEND_URL")
            && !url.is_empty()
        {
            config.backend_url = url;
        }
        if let Ok(path) = std::env::var("QUIZWIRE_WS_PATH")
            && !path.is_empty()
        {
            config.ws_path = path;
        }
        if let Ok(role) = std::env::var("QUIZWIRE_ROLE") {
            match role.to_ascii_lowercase().as_str() {
                "player" => config.role = Role::Player,
                "host" => config.role = Role::Host,
                "" => {},
                other => tracing::warn!(role = other, "Unknown QUIZWIRE_ROLE, keeping config"),
            }
        }
        if let Ok(val) = std::env::var("QUIZWIRE_QUESTION_DURATION_SECS")
            && let Ok(n) = val.parse::<u32>()
        {
            config.question_duration_secs = n;
        }
        if let Ok(val) = std::env::var("QUIZWIRE_RECONNECT_DELAY_MS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.reconnect.delay_ms = n;
        }
        if let Ok(val) = std::env::var("QUIZWIRE_RECONNECT_MAX_ATTEMPTS")
            && let Ok(n) = val.parse::<u32>()
        {
            config.reconnect.max_attempts = Some(n);
        }

        config
    }

    /// The WebSocket URL, derived from the backend base URL by mapping the
    /// scheme `http(s)` to `ws(s)`.
    pub fn ws_url(&self) -> String {
        let base = self.backend_url.trim_end_matches('/');
        let mapped = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{}{}", mapped, self.ws_path)
    }
}
