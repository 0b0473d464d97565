//! Delta extraction: one SSE data payload in, at most one text token out.
//!
//! Frames that fail to parse, or parse but carry no text (role-only deltas,
//! usage frames, empty choices), are skipped. Upstream occasionally sends
//! such frames mid-stream and they must never end it.

use futures::future;
use futures::stream::{Stream, StreamExt};

use crate::client::ClientError;
use crate::model::ChatCompletionChunk;

/// Parse one event-data string and return its non-empty text increment.
///
/// # Example
/// ```
/// use groq::delta::extract_delta;
///
/// assert_eq!(
///     extract_delta(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#).as_deref(),
///     Some("Hi")
/// );
/// assert_eq!(extract_delta("{not valid json"), None);
/// ```
pub fn extract_delta(data: &str) -> Option<String> {
    match serde_json::from_str::<ChatCompletionChunk>(data) {
        Ok(chunk) => chunk.into_content(),
        Err(error) => {
            tracing::debug!(%error, frame = data, "skipping malformed stream frame");
            None
        }
    }
}

/// Extension trait mapping a stream of SSE payloads to text tokens.
///
/// Errors pass through untouched; payloads without text are dropped. Order
/// is preserved and nothing is buffered across elements.
pub trait DeltaStreamExt: Stream<Item = Result<String, ClientError>> + Sized {
    fn deltas(self) -> impl Stream<Item = Result<String, ClientError>> + Send
    where
        Self: Send,
    {
        self.filter_map(|item| {
            future::ready(match item {
                Ok(data) => extract_delta(&data).map(Ok),
                Err(e) => Some(Err(e)),
            })
        })
    }
}

impl<S> DeltaStreamExt for S where S: Stream<Item = Result<String, ClientError>> + Sized {}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn frame(content: &str) -> String {
        format!(r#"{{"choices":[{{"delta":{{"content":"{content}"}}}}]}}"#)
    }

    #[test]
    fn test_extract_delta() {
        assert_eq!(extract_delta(&frame("a")).as_deref(), Some("a"));
        assert_eq!(extract_delta(&frame("")), None);
        assert_eq!(extract_delta(r#"{"choices":[]}"#), None);
        assert_eq!(extract_delta("{not valid json"), None);
        assert_eq!(extract_delta("42"), None);
    }

    #[test]
    fn test_only_first_choice_is_used() {
        let data = r#"{"choices":[{"delta":{"content":"first"}},{"delta":{"content":"second"}}]}"#;
        assert_eq!(extract_delta(data).as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_malformed_frame_does_not_halt() {
        let items = vec![Ok("{not valid json".to_string()), Ok(frame("x"))];
        let tokens: Vec<String> = stream::iter(items)
            .deltas()
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(tokens, vec!["x"]);
    }

    #[tokio::test]
    async fn test_order_and_error_passthrough() {
        let items = vec![
            Ok(frame("t1")),
            Ok(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#.to_string()),
            Ok(frame("t2")),
            Err(ClientError::StreamRead("reset".to_string())),
        ];
        let out: Vec<Result<String, ClientError>> = stream::iter(items).deltas().collect().await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].as_ref().unwrap(), "t1");
        assert_eq!(out[1].as_ref().unwrap(), "t2");
        assert!(out[2].is_err());
    }
}
