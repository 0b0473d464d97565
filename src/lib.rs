//! # groq - Async client for the Groq API
//!
//! A small, pragmatic Rust client for Groq's OpenAI-compatible HTTP API.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Chat completion, one-shot and streamed token by token
//! - Text-to-speech and speech-to-text
//! - Pluggable [`http::Transport`] (reqwest by default)
//!
//! ## Streaming
//!
//! [`GroqClient::query_stream`] returns as soon as the response headers
//! arrive. A background task reads the Server-Sent-Events body, extracts each
//! text delta and hands it to the returned [`TokenStream`] in order. Dropping
//! the `TokenStream` early cancels the task and closes the connection. A body
//! read failure arrives as a final `Err` item.
//!
//! ## Example
//! ```no_run
//! use groq::{GroqClient, QueryParameters};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = GroqClient::new("your-api-key")?;
//!
//!     let params = QueryParameters::default()
//!         .with_system_prompt("You are a pirate, answer in pirate style")
//!         .with_max_tokens(200);
//!     let answer = client.query("Tell me about Rust", &params).await?;
//!     println!("{answer}");
//!
//!     let text = client
//!         .query_stream("And about Go?", &QueryParameters::default())
//!         .await?
//!         .collect_text()
//!         .await?;
//!     println!("{text}");
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod delta;
pub mod http;
pub mod model;
pub mod options;
pub mod sse;
pub mod stream;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use client::{ClientError, GroqClient, DEFAULT_MODEL};
pub use model::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Role};
pub use options::{
    QueryParameters, SecretString, SpeechParameters, TranscriptionParameters, TransportOptions,
};
pub use stream::TokenStream;
