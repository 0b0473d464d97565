//! The API client and its error type.

use bytes::Bytes;
use nonempty::NonEmpty;
use reqwest::StatusCode;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::http::{api_headers, HttpRequest, MultipartForm, ReqwestTransport, RequestBody, Transport};
use crate::model::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, SpeechRequest,
    TranscriptionResponse,
};
use crate::options::{
    QueryParameters, SecretString, SpeechParameters, TranscriptionParameters, TransportOptions,
};
use crate::stream::{self, TokenStream};

/// Chat model used when none has been set on the client.
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
pub const DEFAULT_SPEECH_MODEL: &str = "playai-tts";
pub const DEFAULT_VOICE: &str = "Fritz-PlayAI";
pub const DEFAULT_SPEECH_FORMAT: &str = "wav";
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-large-v3-turbo";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "GROQ_API_KEY";
/// Environment variable holding an optional model override.
pub const MODEL_ENV: &str = "GROQ_MODEL";

const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
const SPEECH_PATH: &str = "/v1/audio/speech";
const TRANSCRIPTIONS_PATH: &str = "/v1/audio/transcriptions";
const UPLOAD_FILE_NAME: &str = "speech.wav";

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Caller-fixable setup problem, raised before any network I/O.
    #[error("configuration error: {0}")]
    Config(String),

    /// No response was obtained: connection, DNS or timeout failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status code: {status}{}", describe_message(.message))]
    HttpStatus {
        status: u16,
        message: Option<String>,
    },

    /// The response body failed mid-read.
    #[error("stream read error: {0}")]
    StreamRead(String),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no response choices received")]
    EmptyResponse,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_message(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(" ({m})"))
        .unwrap_or_default()
}

/// Client for the Groq OpenAI-compatible API.
///
/// Holds the API key, the model (defaulted on first use when unset) and the
/// number of successful operations. Operations that touch this state take
/// `&mut self`, so one handle cannot be used by concurrent calls; wrap it in a
/// lock or create one client per task.
///
/// # Example
/// ```no_run
/// use futures::StreamExt;
/// use groq::{GroqClient, QueryParameters};
///
/// # async fn run() -> Result<(), groq::ClientError> {
/// let mut client = GroqClient::from_env()?;
/// let mut tokens = client
///     .query_stream("Tell me about Rust", &QueryParameters::default())
///     .await?;
/// while let Some(token) = tokens.next().await {
///     print!("{}", token?);
/// }
/// println!("\nrequests made: {}", client.requests_count());
/// # Ok(())
/// # }
/// ```
pub struct GroqClient {
    api_key: SecretString,
    model: Option<String>,
    requests_count: u64,
    transport_options: TransportOptions,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for GroqClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroqClient")
            .field("api_key", &self.api_key)
            .field("model", &self.model)
            .field("requests_count", &self.requests_count)
            .field("transport_options", &self.transport_options)
            .finish_non_exhaustive()
    }
}

impl GroqClient {
    /// Create a client with default transport options.
    pub fn new(api_key: impl Into<SecretString>) -> Result<Self, ClientError> {
        Self::with_options(api_key, TransportOptions::default())
    }

    /// Create a client over a `reqwest` transport built from `transport_options`.
    pub fn with_options(
        api_key: impl Into<SecretString>,
        transport_options: TransportOptions,
    ) -> Result<Self, ClientError> {
        let transport = ReqwestTransport::new(&transport_options)?;
        Ok(Self::with_transport(
            api_key,
            transport_options,
            Arc::new(transport),
        ))
    }

    /// Create a client over any [`Transport`].
    pub fn with_transport(
        api_key: impl Into<SecretString>,
        transport_options: TransportOptions,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            model: None,
            requests_count: 0,
            transport_options,
            transport,
        }
    }

    /// Create a client from `GROQ_API_KEY` and, if set, `GROQ_MODEL`.
    pub fn from_env() -> Result<Self, ClientError> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| ClientError::Config(format!("{API_KEY_ENV} is not set")))?;
        let mut client = Self::new(api_key)?;
        if let Ok(model) = std::env::var(MODEL_ENV) {
            client.set_model(model);
        }
        Ok(client)
    }

    /// Set the chat model. An empty name unsets it.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.set_model(model);
        self
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        let model = model.into();
        self.model = (!model.is_empty()).then_some(model);
    }

    /// The chat model, once set or defaulted.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Number of operations that completed (or, for streams, opened) successfully.
    pub fn requests_count(&self) -> u64 {
        self.requests_count
    }

    /// Build a chat completion request for a single query.
    ///
    /// Defaults the client's model when unset. The conversation is the
    /// system prompt (if any) followed by the query; sampling parameters are
    /// copied only when non-zero.
    pub fn build_query_request(
        &mut self,
        query: &str,
        params: &QueryParameters,
    ) -> Result<ChatCompletionRequest, ClientError> {
        self.api_key()?;
        let model = self.resolve_model().to_string();

        let user = ChatMessage::user(query);
        let messages = if params.system_prompt.is_empty() {
            NonEmpty::new(user)
        } else {
            NonEmpty::from((ChatMessage::system(params.system_prompt.as_str()), vec![user]))
        };

        let mut request = ChatCompletionRequest::new(model, messages);
        request.max_tokens = (params.max_tokens != 0).then_some(params.max_tokens);
        request.temperature = (params.temperature != 0.0).then_some(params.temperature);
        request.top_p = (params.top_p != 0.0).then_some(params.top_p);
        Ok(request)
    }

    /// Ask a question with no sampling overrides.
    pub async fn ask(&mut self, query: &str) -> Result<String, ClientError> {
        self.query(query, &QueryParameters::default()).await
    }

    /// Ask a question and return the first choice's content.
    pub async fn query(
        &mut self,
        query: &str,
        params: &QueryParameters,
    ) -> Result<String, ClientError> {
        let request = self.build_query_request(query, params)?;
        let response = self.chat_completion(request).await?;
        Ok(response
            .content()
            .map(str::to_string)
            .unwrap_or_default())
    }

    /// Send a prepared request and return the full response.
    ///
    /// Fails with [`ClientError::EmptyResponse`] when the response has no choices.
    pub async fn chat_completion(
        &mut self,
        mut request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ClientError> {
        self.fill_model(&mut request)?;
        let api_key = self.api_key()?;
        request.stream = false;
        let body = serde_json::to_vec(&request)?;
        let headers = api_headers(api_key, Some("application/json"), None)?;
        let url = self.transport_options.endpoint(CHAT_COMPLETIONS_PATH);

        let response = self
            .transport
            .send(HttpRequest::post(url, headers, RequestBody::Json(body.into())))
            .await?;
        if response.status != StatusCode::OK {
            return Err(response.into_status_error().await);
        }

        let response: ChatCompletionResponse = response.json().await?;
        if response.choices.is_empty() {
            return Err(ClientError::EmptyResponse);
        }
        self.requests_count += 1;
        Ok(response)
    }

    /// Ask a question and stream the answer token by token.
    pub async fn query_stream(
        &mut self,
        query: &str,
        params: &QueryParameters,
    ) -> Result<TokenStream, ClientError> {
        let request = self.build_query_request(query, params)?;
        self.stream_chat_completion(request).await
    }

    /// Open a streaming chat completion for a prepared request.
    ///
    /// Returns once the response headers arrive. A non-200 status fails here
    /// and no stream is created. The request counter moves when the stream
    /// opens, not when it is drained.
    pub async fn stream_chat_completion(
        &mut self,
        mut request: ChatCompletionRequest,
    ) -> Result<TokenStream, ClientError> {
        self.fill_model(&mut request)?;
        let api_key = self.api_key()?;
        let url = self.transport_options.endpoint(CHAT_COMPLETIONS_PATH);
        let tokens = stream::open(self.transport.as_ref(), url, api_key, request).await?;
        self.requests_count += 1;
        Ok(tokens)
    }

    /// Synthesize speech and return the raw audio bytes.
    pub async fn speech(
        &mut self,
        input: &str,
        params: &SpeechParameters,
    ) -> Result<Bytes, ClientError> {
        let api_key = self.api_key()?;
        let request = SpeechRequest {
            model: or_default(&params.model, DEFAULT_SPEECH_MODEL),
            input: input.to_string(),
            voice: or_default(&params.voice, DEFAULT_VOICE),
            response_format: or_default(&params.response_format, DEFAULT_SPEECH_FORMAT),
        };
        let body = serde_json::to_vec(&request)?;
        let headers = api_headers(api_key, Some("application/json"), None)?;
        let url = self.transport_options.endpoint(SPEECH_PATH);

        let response = self
            .transport
            .send(HttpRequest::post(url, headers, RequestBody::Json(body.into())))
            .await?;
        if response.status != StatusCode::OK {
            return Err(response.into_status_error().await);
        }

        let audio = response.bytes().await?;
        self.requests_count += 1;
        Ok(audio)
    }

    /// Transcribe audio and return the text.
    pub async fn transcribe(
        &mut self,
        audio: impl Into<Bytes>,
        params: &TranscriptionParameters,
    ) -> Result<String, ClientError> {
        self.upload_transcription(UPLOAD_FILE_NAME, audio.into(), params)
            .await
    }

    /// Read an audio file and transcribe it.
    pub async fn transcribe_file(
        &mut self,
        path: impl AsRef<Path>,
        params: &TranscriptionParameters,
    ) -> Result<String, ClientError> {
        let path = path.as_ref();
        self.api_key()?;
        let audio = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| UPLOAD_FILE_NAME.to_string());
        self.upload_transcription(&file_name, audio.into(), params)
            .await
    }

    async fn upload_transcription(
        &mut self,
        file_name: &str,
        audio: Bytes,
        params: &TranscriptionParameters,
    ) -> Result<String, ClientError> {
        let api_key = self.api_key()?;

        let mut form = MultipartForm::default()
            .file("file", file_name, audio)
            .text(
                "model",
                or_default(&params.model, DEFAULT_TRANSCRIPTION_MODEL),
            );
        if !params.language.is_empty() {
            form = form.text("language", params.language.as_str());
        }
        if !params.prompt.is_empty() {
            form = form.text("prompt", params.prompt.as_str());
        }
        if params.temperature != 0.0 {
            form = form.text("temperature", params.temperature.to_string());
        }

        // reqwest sets the multipart content type with its boundary.
        let headers = api_headers(api_key, None, None)?;
        let url = self.transport_options.endpoint(TRANSCRIPTIONS_PATH);

        let response = self
            .transport
            .send(HttpRequest::post(url, headers, RequestBody::Multipart(form)))
            .await?;
        if response.status != StatusCode::OK {
            return Err(response.into_status_error().await);
        }

        let transcription: TranscriptionResponse = response.json().await?;
        self.requests_count += 1;
        Ok(transcription.text)
    }

    fn api_key(&self) -> Result<&SecretString, ClientError> {
        if self.api_key.is_empty() {
            return Err(ClientError::Config("API key is not specified".to_string()));
        }
        Ok(&self.api_key)
    }

    /// Give a request with no model the client's model, defaulting it if needed.
    fn fill_model(&mut self, request: &mut ChatCompletionRequest) -> Result<(), ClientError> {
        self.api_key()?;
        if request.model.is_empty() {
            request.model = self.resolve_model().to_string();
        }
        Ok(())
    }

    fn resolve_model(&mut self) -> &str {
        self.model.get_or_insert_with(|| {
            tracing::info!(model = DEFAULT_MODEL, "model is not specified, using default");
            DEFAULT_MODEL.to_string()
        })
    }
}

fn or_default(value: &str, default: &str) -> String {
    let value = if value.is_empty() { default } else { value };
    value.to_string()
}
