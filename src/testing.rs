//! Test doubles for the transport seam.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::oneshot;

use crate::client::ClientError;
use crate::http::{ByteStream, HttpRequest, HttpResponse, Transport};

/// Replays scripted responses in order and records every request it sees.
#[derive(Default)]
pub(crate) struct MockTransport {
    replies: Mutex<VecDeque<(StatusCode, ByteStream)>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, status: u16, body: ByteStream) {
        let status = StatusCode::from_u16(status).expect("valid status");
        self.replies.lock().unwrap().push_back((status, body));
    }

    pub(crate) fn push_text(&self, status: u16, body: impl Into<String>) {
        let body: String = body.into();
        self.push(status, body_from(stream::iter(vec![Ok(Bytes::from(body))])));
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        self.requests.lock().unwrap().push(request);
        let (status, body) = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted reply left");
        Ok(HttpResponse {
            status,
            headers: HeaderMap::new(),
            body,
        })
    }
}

pub(crate) fn body_from<S>(chunks: S) -> ByteStream
where
    S: Stream<Item = Result<Bytes, ClientError>> + Send + 'static,
{
    Box::pin(chunks)
}

/// Fires its channel when dropped; moved into a body to observe its release.
pub(crate) struct DropSignal(Option<oneshot::Sender<()>>);

impl DropSignal {
    pub(crate) fn new(sender: oneshot::Sender<()>) -> Self {
        Self(Some(sender))
    }

    pub(crate) fn keep_alive(&self) {}
}

impl Drop for DropSignal {
    fn drop(&mut self) {
        if let Some(sender) = self.0.take() {
            let _ = sender.send(());
        }
    }
}
