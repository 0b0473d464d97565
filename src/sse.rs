//! Server-Sent Events (SSE) line decoding.
//!
//! Turns a raw response body into the sequence of event-data strings it
//! carries. The rules are deliberately permissive:
//!
//! ```text
//! : keep-alive                      <- ignored (no "data: " prefix)
//! data: {"choices":[...]}           <- yields {"choices":[...]}
//!                                   <- ignored
//! data: [DONE]                      <- ends the sequence
//! ```
//!
//! The sequence also ends at body EOF (no error), and ends after yielding a
//! single error if the body fails to read or a line exceeds [`MAX_LINE_LEN`].
//! It is tied to one connection and can only be consumed once.

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use std::pin::Pin;

use crate::client::ClientError;
use crate::http::HttpResponse;

/// Prefix of a line carrying event data.
pub const DATA_PREFIX: &str = "data: ";

/// The exact line that terminates a completion stream.
pub const DONE_LINE: &str = "data: [DONE]";

/// Longest line accepted, terminator excluded. A longer line ends the
/// sequence with a read error.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// What a single body line means to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseLine<'a> {
    /// `data: [DONE]`
    Done,
    /// Payload after the `data: ` prefix
    Data(&'a str),
    /// Comments, blank separators, `event:`/`id:` fields and anything else
    Ignored,
}

/// Classify one line (without its terminator).
///
/// # Example
/// ```
/// use groq::sse::{classify_line, SseLine};
///
/// assert_eq!(classify_line("data: {\"a\":1}"), SseLine::Data("{\"a\":1}"));
/// assert_eq!(classify_line("data: [DONE]"), SseLine::Done);
/// assert_eq!(classify_line(": ping"), SseLine::Ignored);
/// ```
pub fn classify_line(line: &str) -> SseLine<'_> {
    if is_done_marker(line) {
        SseLine::Done
    } else if let Some(data) = parse_sse_line(line) {
        SseLine::Data(data)
    } else {
        SseLine::Ignored
    }
}

/// Extract the data portion of a `data: <content>` line.
///
/// # Example
/// ```
/// use groq::sse::parse_sse_line;
///
/// assert_eq!(parse_sse_line("data: {\"key\": \"value\"}"), Some("{\"key\": \"value\"}"));
/// assert_eq!(parse_sse_line("event: message"), None);
/// ```
pub fn parse_sse_line(line: &str) -> Option<&str> {
    line.strip_prefix(DATA_PREFIX)
}

/// Check if a line is the stream terminator.
pub fn is_done_marker(line: &str) -> bool {
    line == DONE_LINE
}

/// Decode a byte stream into SSE event-data strings.
pub fn decode<S>(body: S) -> impl Stream<Item = Result<String, ClientError>> + Send
where
    S: Stream<Item = Result<Bytes, ClientError>> + Send + 'static,
{
    let reader = LineReader::new(body);

    stream::unfold(Some(reader), |reader| async move {
        let Some(mut reader) = reader else {
            return None;
        };
        loop {
            let line = match reader.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(e) => return Some((Err(e), None)),
            };

            match classify_line(&line) {
                SseLine::Done => return None,
                SseLine::Ignored => continue,
                SseLine::Data(data) => {
                    let data = data.to_string();
                    return Some((Ok(data), Some(reader)));
                }
            }
        }
    })
}

/// Extension trait for [`HttpResponse`] to enable SSE streaming.
///
/// # Example
/// ```ignore
/// use groq::sse::SseResponseExt;
///
/// let response = transport.send(request).await?;
/// let mut events = Box::pin(response.sse());
/// while let Some(data) = events.next().await {
///     println!("SSE data: {}", data?);
/// }
/// ```
pub trait SseResponseExt {
    /// Convert the response into a stream of raw SSE data payloads.
    fn sse(self) -> impl Stream<Item = Result<String, ClientError>> + Send;
}

impl SseResponseExt for HttpResponse {
    fn sse(self) -> impl Stream<Item = Result<String, ClientError>> + Send {
        decode(self.body)
    }
}

/// Splits a byte stream on `\n`, dropping one trailing `\r`.
///
/// Buffering is byte-level so multi-byte characters split across network
/// chunks survive intact.
struct LineReader<S> {
    body: Pin<Box<S>>,
    buffer: BytesMut,
    /// Bytes of `buffer` already known to hold no `\n`.
    scanned: usize,
    eof: bool,
}

impl<S> LineReader<S>
where
    S: Stream<Item = Result<Bytes, ClientError>>,
{
    fn new(body: S) -> Self {
        Self {
            body: Box::pin(body),
            buffer: BytesMut::new(),
            scanned: 0,
            eof: false,
        }
    }

    async fn next_line(&mut self) -> Result<Option<String>, ClientError> {
        loop {
            if let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
                let pos = self.scanned + offset;
                self.scanned = 0;
                let mut line = self.buffer.split_to(pos + 1);
                line.truncate(pos);
                return into_line(line).map(Some);
            }
            self.scanned = self.buffer.len();
            // One byte of slack for a `\r` still waiting on its `\n`.
            if self.buffer.len() > MAX_LINE_LEN + 1 {
                return Err(line_too_long());
            }

            if self.eof {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                // Final line without a terminator.
                self.scanned = 0;
                let line = self.buffer.split();
                return into_line(line).map(Some);
            }

            match self.body.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(e),
                None => self.eof = true,
            }
        }
    }
}

fn into_line(mut line: BytesMut) -> Result<String, ClientError> {
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
    if line.len() > MAX_LINE_LEN {
        return Err(line_too_long());
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}

fn line_too_long() -> ClientError {
    ClientError::StreamRead(format!("line too long: more than {MAX_LINE_LEN} bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(chunks: Vec<&'static str>) -> impl Stream<Item = Result<Bytes, ClientError>> + Send {
        stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))))
    }

    async fn collect(chunks: Vec<&'static str>) -> Vec<String> {
        decode(body(chunks))
            .map(|item| item.unwrap())
            .collect()
            .await
    }

    #[test]
    fn test_classify_line() {
        assert_eq!(classify_line("data: hello"), SseLine::Data("hello"));
        assert_eq!(classify_line("data: "), SseLine::Data(""));
        assert_eq!(classify_line("data: [DONE]"), SseLine::Done);
        assert_eq!(classify_line("data:[DONE]"), SseLine::Ignored);
        assert_eq!(classify_line("data:no-space"), SseLine::Ignored);
        assert_eq!(classify_line(""), SseLine::Ignored);
        assert_eq!(classify_line(": keep-alive"), SseLine::Ignored);
        assert_eq!(classify_line("event: message"), SseLine::Ignored);
    }

    #[test]
    fn test_parse_keeps_payload_verbatim() {
        assert_eq!(parse_sse_line("data:   spaces  "), Some("  spaces  "));
        assert_eq!(parse_sse_line("invalid"), None);
    }

    #[test]
    fn test_is_done_marker() {
        assert!(is_done_marker("data: [DONE]"));
        assert!(!is_done_marker("[DONE]"));
        assert!(!is_done_marker("data: [DONE] "));
    }

    #[tokio::test]
    async fn test_terminator_ends_sequence() {
        let lines = collect(vec!["data: a\n", "data: [DONE]\n", "data: b\n"]).await;
        assert_eq!(lines, vec!["a"]);
    }

    #[tokio::test]
    async fn test_non_data_lines_are_skipped() {
        let lines = collect(vec![": ping\n\n", "event: chunk\n", "data: a\n\n", "data: b\n"]).await;
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_lines_split_across_chunks() {
        let lines = collect(vec!["da", "ta: {\"x\"", ":1}\r\ndata", ": 2\r\n"]).await;
        assert_eq!(lines, vec!["{\"x\":1}", "2"]);
    }

    #[tokio::test]
    async fn test_final_line_without_terminator() {
        let lines = collect(vec!["data: a\n", "data: tail"]).await;
        assert_eq!(lines, vec!["a", "tail"]);
    }

    #[tokio::test]
    async fn test_empty_body() {
        assert!(collect(vec![]).await.is_empty());
    }

    #[tokio::test]
    async fn test_multibyte_character_split_across_chunks() {
        let text = "data: héllo\n".as_bytes();
        // Split inside the two-byte 'é'.
        let split = 8;
        let chunks = vec![
            Ok(Bytes::copy_from_slice(&text[..split])),
            Ok(Bytes::copy_from_slice(&text[split..])),
        ];
        let lines: Vec<String> = decode(stream::iter(chunks))
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(lines, vec!["héllo"]);
    }

    #[tokio::test]
    async fn test_read_error_is_yielded_once_then_ends() {
        let chunks = vec![
            Ok(Bytes::from_static(b"data: a\n")),
            Err(ClientError::StreamRead("connection reset".to_string())),
            Ok(Bytes::from_static(b"data: b\n")),
        ];
        let items: Vec<Result<String, ClientError>> = decode(stream::iter(chunks)).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "a");
        assert!(matches!(items[1], Err(ClientError::StreamRead(_))));
    }

    fn owned_chunks(text: &[u8], size: usize) -> Vec<Result<Bytes, ClientError>> {
        text.chunks(size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect()
    }

    #[tokio::test]
    async fn test_long_line_in_small_chunks() {
        let payload = "x".repeat(MAX_LINE_LEN - DATA_PREFIX.len());
        let text = format!("data: {payload}\r\ndata: next\n");
        let lines: Vec<String> = decode(stream::iter(owned_chunks(text.as_bytes(), 7)))
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(lines, vec![payload, "next".to_string()]);
    }

    #[tokio::test]
    async fn test_oversized_line_is_a_read_error() {
        let text = format!("data: a\ndata: {}\ndata: b\n", "x".repeat(MAX_LINE_LEN));
        let items: Vec<Result<String, ClientError>> =
            decode(stream::iter(owned_chunks(text.as_bytes(), 1024)))
                .collect()
                .await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "a");
        match &items[1] {
            Err(ClientError::StreamRead(msg)) => assert!(msg.starts_with("line too long")),
            other => panic!("expected a read error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_oversized_line_without_newline_fails_before_eof() {
        // The body never ends, so the limit must trip while buffering.
        let chunk = Bytes::from(vec![b'x'; 4096]);
        let endless = stream::repeat_with(move || Ok(chunk.clone()));
        let items: Vec<Result<String, ClientError>> = decode(endless).collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(ClientError::StreamRead(_))));
    }
}
