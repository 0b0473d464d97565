//! Configuration: credentials, per-call sampling knobs and transport settings.
//!
//! Every knob here follows the same rule: a zero or empty value means "not set"
//! and is left out of the outbound payload so the server-side default applies.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Base URL of the hosted API.
pub const DEFAULT_API_BASE: &str = "https://api.groq.com/openai";

/// A secret string type for sensitive data like API keys.
/// Prevents accidental logging or display of secrets.
#[derive(Clone, Default)]
pub struct SecretString(String);

impl SecretString {
    /// Create a new secret string.
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Get the underlying secret value.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    /// An empty secret counts as absent.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

/// Optional sampling parameters for a chat query.
///
/// # Example
/// ```rust
/// use groq::options::QueryParameters;
///
/// let params = QueryParameters::default()
///     .with_max_tokens(100)
///     .with_temperature(0.2)
///     .with_system_prompt("Answer in one sentence.");
/// assert_eq!(params.top_p, 0.0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryParameters {
    /// Maximum tokens to generate (0 = server default)
    #[serde(default)]
    pub max_tokens: u32,

    /// Temperature for sampling (0.0 = server default)
    #[serde(default)]
    pub temperature: f32,

    /// Top-p (nucleus) sampling parameter (0.0 = server default)
    #[serde(default)]
    pub top_p: f32,

    /// System message placed before the user message (empty = none)
    #[serde(default)]
    pub system_prompt: String,
}

impl QueryParameters {
    /// Set maximum tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set top-p sampling parameter.
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    /// Set the system prompt.
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }
}

/// Text-to-speech parameters. Empty fields fall back to the client defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeechParameters {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub voice: String,
    #[serde(default)]
    pub response_format: String,
}

impl SpeechParameters {
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn with_response_format(mut self, response_format: impl Into<String>) -> Self {
        self.response_format = response_format.into();
        self
    }
}

/// Speech-to-text parameters. Empty/zero fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionParameters {
    #[serde(default)]
    pub model: String,
    /// ISO-639-1 language of the audio
    #[serde(default)]
    pub language: String,
    /// Text to guide the model's style or continue a previous segment
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub temperature: f32,
}

impl TranscriptionParameters {
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// HTTP transport configuration.
///
/// `timeout` bounds the whole exchange, body included, so leave it unset for
/// long-running streams.
///
/// # Example
/// ```rust
/// use groq::options::TransportOptions;
/// use std::time::Duration;
///
/// let options = TransportOptions::new()
///     .with_timeout(Duration::from_secs(30))
///     .with_base_url("http://localhost:8080".to_string());
/// assert_eq!(options.api_base(), "http://localhost:8080");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    /// Request timeout
    pub timeout: Option<Duration>,

    /// Base URL for API endpoints
    pub base_url: Option<String>,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Additional HTTP headers to include in requests
    pub extra_headers: Option<HashMap<String, String>>,
}

impl TransportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Set the proxy URL.
    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Set extra headers.
    pub fn with_extra_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.extra_headers = Some(headers);
        self
    }

    /// Add a single extra header.
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.extra_headers
            .get_or_insert_with(HashMap::new)
            .insert(key, value);
        self
    }

    /// Base URL without a trailing slash.
    pub fn api_base(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/')
    }

    /// Full URL for an API path such as `/v1/chat/completions`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_base(), path)
    }
}
