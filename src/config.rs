//! Runtime configuration, read from the process environment (and `.env`).

use crate::error::ConfigError;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_OLLAMA_HOST: &str = "http://127.0.0.1:11434";
pub const DEFAULT_MAX_CONCURRENT: usize = 1;
pub const DEFAULT_INVOKE_TIMEOUT: Duration = Duration::from_secs(20 * 60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub ollama_host: String,
    pub pipeline: PipelineConfig,
    pub state_path: PathBuf,
}

/// Knobs for the invocation queue.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Upper bound on backend calls in flight at once.
    pub max_concurrent: usize,
    /// Deadline applied to each backend call.
    pub invoke_timeout: Duration,
    /// Fallback wakeup when the queue is idle.
    pub poll_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            invoke_timeout: DEFAULT_INVOKE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PipelineConfig {
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_invoke_timeout(mut self, invoke_timeout: Duration) -> Self {
        self.invoke_timeout = invoke_timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl Config {
    /// Load `.env` if present, then read the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env is fine; real env vars still apply.
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let ollama_host = lookup("OLLAMA_HOST")
            .map(|host| host.trim().trim_end_matches('/').to_string())
            .filter(|host| !host.is_empty())
            .unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string());

        let max_concurrent: usize =
            parse_var(&lookup, "PROMPT_MAX_CONCURRENT")?.unwrap_or(DEFAULT_MAX_CONCURRENT);
        if max_concurrent == 0 {
            return Err(ConfigError::Invalid {
                key: "PROMPT_MAX_CONCURRENT",
                value: "0".to_string(),
            });
        }

        let invoke_timeout = parse_var::<u64>(&lookup, "PROMPT_INVOKE_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_INVOKE_TIMEOUT);
        let poll_interval = parse_var::<u64>(&lookup, "PROMPT_POLL_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_INTERVAL);

        let state_path = match lookup("PROMPT_STATE_PATH").filter(|p| !p.trim().is_empty()) {
            Some(path) => PathBuf::from(path),
            None => default_state_path()?,
        };

        Ok(Self {
            ollama_host,
            pipeline: PipelineConfig {
                max_concurrent,
                invoke_timeout,
                poll_interval,
            },
            state_path,
        })
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

fn default_state_path() -> Result<PathBuf, ConfigError> {
    dirs::data_local_dir()
        .map(|dir| dir.join("promptbench").join("state.json"))
        .ok_or(ConfigError::NoStateDir)
}
