use serde::{Deserialize, Serialize};

/// Content returned in place of a model reply when the call hits its deadline.
pub const TIMEOUT_MARKER: &str = "<timeout waiting for a response>";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// Stop words as typed by the user (comma separated) or already split.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopWords {
    Text(String),
    List(Vec<String>),
}

impl StopWords {
    /// Trimmed, non-empty stop words. `None` when nothing is left.
    pub fn compile(&self) -> Option<Vec<String>> {
        let words: Vec<String> = match self {
            StopWords::Text(text) => text
                .split(',')
                .map(str::trim)
                .filter(|word| !word.is_empty())
                .map(str::to_string)
                .collect(),
            StopWords::List(list) => list
                .iter()
                .map(|word| word.trim())
                .filter(|word| !word.is_empty())
                .map(str::to_string)
                .collect(),
        };

        if words.is_empty() { None } else { Some(words) }
    }
}

/// Sampling options attached to a prompt version and forwarded to the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: f32,
    pub num_ctx: i32,
    pub num_predict: i32,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default, rename = "stopWords", alias = "stop")]
    pub stop_words: Option<StopWords>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            top_p: 0.9,
            top_k: 40.0,
            num_ctx: 2048,
            num_predict: -1,
            seed: None,
            stop_words: None,
        }
    }
}

impl RequestOptions {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_stop_words(mut self, stop_words: StopWords) -> Self {
        self.stop_words = Some(stop_words);
        self
    }
}

/// One call to the model backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub options: RequestOptions,
}

impl ModelRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            model: model.into(),
            options: RequestOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

/// Timing and token counters reported by the backend, in nanoseconds and tokens.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseStats {
    #[serde(default)]
    pub total_duration: Option<u64>,
    #[serde(default)]
    pub load_duration: Option<u64>,
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
    #[serde(default)]
    pub prompt_eval_duration: Option<u64>,
    #[serde(default)]
    pub eval_count: Option<u64>,
    #[serde(default)]
    pub eval_duration: Option<u64>,
}

/// Reply to a dispatched [`ModelRequest`].
///
/// `options` echoes what was actually sent, so a seed generated at dispatch
/// time is visible to the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvokeResponse {
    pub content: String,
    pub role: String,
    #[serde(default)]
    pub stats: ResponseStats,
    pub options: RequestOptions,
}

impl InvokeResponse {
    /// Sentinel substituted when the deadline elapses.
    pub fn timed_out(options: RequestOptions) -> Self {
        Self {
            content: TIMEOUT_MARKER.to_string(),
            role: String::new(),
            stats: ResponseStats::default(),
            options,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.role.is_empty() && self.content == TIMEOUT_MARKER
    }
}
