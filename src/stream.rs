//! Streaming chat-completion session.
//!
//! Opening a stream sends the request and waits only for the status line and
//! headers. A non-success status fails right there: no channel, no task. On
//! success one background task drives the body through the SSE decoder and
//! the delta extractor and publishes each token, in body order, into a
//! capacity-1 channel wrapped by [`TokenStream`].
//!
//! The task owns the only sender and the body. Whatever ends it (terminator,
//! EOF, read failure, cancellation) drops both, so the channel closes exactly
//! once and the connection is released. A read failure is published as a
//! final `Err` item before the close.
//!
//! Dropping the [`TokenStream`] cancels the session: the task watches the
//! cancellation token while waiting on the body and before every publish.

use futures::stream::{Stream, StreamExt};
use reqwest::StatusCode;
use std::pin::{pin, Pin};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::Instrument;

use crate::client::ClientError;
use crate::delta::DeltaStreamExt;
use crate::http::{api_headers, HttpRequest, RequestBody, Transport};
use crate::model::ChatCompletionRequest;
use crate::options::SecretString;
use crate::sse::SseResponseExt;

const CHANNEL_CAPACITY: usize = 1;

/// Items published by a session: a text token, or the read error that ended it.
pub type StreamItem = Result<String, ClientError>;

/// Consumer side of a streaming session.
///
/// Yields tokens in arrival order and ends when the session ends. Dropping it
/// early cancels the session and releases the connection.
pub struct TokenStream {
    receiver: mpsc::Receiver<StreamItem>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl TokenStream {
    fn new(receiver: mpsc::Receiver<StreamItem>, cancel: CancellationToken) -> Self {
        let guard = cancel.clone().drop_guard();
        Self {
            receiver,
            cancel,
            _guard: guard,
        }
    }

    /// Next token; `None` once the session has ended.
    pub async fn next_token(&mut self) -> Option<StreamItem> {
        self.receiver.recv().await
    }

    /// Stop the session. Tokens already queued can still be received.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether [`cancel`](Self::cancel) has been called on this stream.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Concatenate every token, failing on the first read error.
    pub async fn collect_text(mut self) -> Result<String, ClientError> {
        let mut text = String::new();
        while let Some(item) = self.next_token().await {
            text.push_str(&item?);
        }
        Ok(text)
    }
}

impl Stream for TokenStream {
    type Item = StreamItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl std::fmt::Debug for TokenStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStream")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Terminator or EOF
    Completed,
    /// Body read failed
    Failed,
    /// Consumer cancelled or went away
    Cancelled,
}

/// Open a streaming chat completion against `url`.
///
/// Forces `stream = true`, sends the request, and on a `200 OK` starts the
/// background session.
pub async fn open(
    transport: &dyn Transport,
    url: String,
    api_key: &SecretString,
    mut request: ChatCompletionRequest,
) -> Result<TokenStream, ClientError> {
    request.stream = true;
    let body = serde_json::to_vec(&request)?;
    let headers = api_headers(api_key, Some("application/json"), Some("text/event-stream"))?;

    let response = transport
        .send(HttpRequest::post(url, headers, RequestBody::Json(body.into())))
        .await?;

    if response.status != StatusCode::OK {
        let status = response.status.as_u16();
        tracing::debug!(status, "stream open rejected");
        return Err(ClientError::HttpStatus {
            status,
            message: None,
        });
    }

    let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();
    let span = tracing::debug_span!("chat_stream", model = %request.model);
    tokio::spawn(run(response.sse().deltas(), sender, cancel.clone()).instrument(span));

    Ok(TokenStream::new(receiver, cancel))
}

/// Publish every token of `tokens` until it ends or the session is cancelled.
async fn run<S>(tokens: S, sender: mpsc::Sender<StreamItem>, cancel: CancellationToken) -> SessionEnd
where
    S: Stream<Item = StreamItem>,
{
    let mut tokens = pin!(tokens);
    let mut published = 0usize;

    let end = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break SessionEnd::Cancelled,
            next = tokens.next() => next,
        };

        let (item, end) = match next {
            None => break SessionEnd::Completed,
            Some(Ok(token)) => (Ok(token), None),
            Some(Err(error)) => {
                tracing::warn!(%error, "stream read failed");
                (Err(error), Some(SessionEnd::Failed))
            }
        };

        if cancel.is_cancelled() {
            break SessionEnd::Cancelled;
        }
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            sent = sender.send(item) => sent.is_ok(),
        };
        if !sent {
            break SessionEnd::Cancelled;
        }
        if let Some(end) = end {
            break end;
        }
        published += 1;
    };

    tracing::debug!(?end, published, "streaming session ended");
    end
}
