//! HTTP transport for the API.
//!
//! A [`Transport`] issues exactly one outbound request and hands back the raw
//! response: status, headers and a body that is read incrementally. It never
//! inspects the status and never retries; callers decide what a non-success
//! status means. [`ReqwestTransport`] is the production implementation.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::pin::Pin;

use crate::client::ClientError;
use crate::model::ApiErrorResponse;
use crate::options::{SecretString, TransportOptions};

/// Incrementally readable response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

/// Outbound request body.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    /// Already-serialized JSON document
    Json(Bytes),
    Multipart(MultipartForm),
}

/// Description of a `multipart/form-data` body: text fields plus at most one file.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    pub fields: Vec<(String, String)>,
    pub file: Option<FilePart>,
}

#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl MultipartForm {
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn file(
        mut self,
        field: impl Into<String>,
        file_name: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        self.file = Some(FilePart {
            field: field.into(),
            file_name: file_name.into(),
            content_type: "application/octet-stream".to_string(),
            data: data.into(),
        });
        self
    }

    /// Value of the first text field with this name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn into_reqwest(self) -> Result<reqwest::multipart::Form, ClientError> {
        let mut form = reqwest::multipart::Form::new();
        if let Some(file) = self.file {
            let part = reqwest::multipart::Part::bytes(file.data.to_vec())
                .file_name(file.file_name)
                .mime_str(&file.content_type)
                .map_err(|e| {
                    ClientError::Config(format!(
                        "invalid content type {:?} for multipart file: {e}",
                        file.content_type
                    ))
                })?;
            form = form.part(file.field, part);
        }
        for (name, value) in self.fields {
            form = form.text(name, value);
        }
        Ok(form)
    }
}

/// One outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn post(url: String, headers: HeaderMap, body: RequestBody) -> Self {
        Self {
            method: Method::POST,
            url,
            headers,
            body,
        }
    }
}

/// Raw response: status and headers are available, the body is still open.
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl HttpResponse {
    /// Drain the whole body.
    pub async fn bytes(mut self) -> Result<Bytes, ClientError> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = self.body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }

    /// Drain the body and decode it as JSON.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T, ClientError> {
        let body = self.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Turn a non-success response into [`ClientError::HttpStatus`], using the
    /// API error body for the message when it parses.
    pub async fn into_status_error(self) -> ClientError {
        let status = self.status.as_u16();
        let message = match self.bytes().await {
            Ok(body) => serde_json::from_slice::<ApiErrorResponse>(&body)
                .ok()
                .map(|parsed| parsed.error.describe()),
            Err(_) => None,
        };
        ClientError::HttpStatus { status, message }
    }
}

/// Issues one HTTP request and returns the response on any status.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fails only when no response was obtained (connection, DNS, timeout).
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ClientError>;
}

/// [`Transport`] backed by a `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    extra_headers: Option<HashMap<String, String>>,
}

impl ReqwestTransport {
    pub fn new(transport_options: &TransportOptions) -> Result<Self, ClientError> {
        let client = build_http_client(transport_options)
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            extra_headers: transport_options.extra_headers.clone(),
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        tracing::debug!(method = %request.method, url = %request.url, "sending request");

        let mut req = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);
        req = add_extra_headers(req, &self.extra_headers);
        req = match request.body {
            RequestBody::Empty => req,
            RequestBody::Json(body) => req.body(body),
            RequestBody::Multipart(form) => req.multipart(form.into_reqwest()?),
        };

        let response = req.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ClientError::StreamRead(e.to_string())));

        Ok(HttpResponse {
            status,
            headers,
            body: Box::pin(body),
        })
    }
}

/// Build a configured HTTP client from transport options.
///
/// This applies common configuration like timeouts and proxies.
pub fn build_http_client(transport_options: &TransportOptions) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder();

    if let Some(timeout) = transport_options.timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(proxy_url) = &transport_options.proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
    }

    builder.build()
}

/// Add extra headers to a request if specified in transport options.
pub fn add_extra_headers(
    mut request: RequestBuilder,
    extra_headers: &Option<HashMap<String, String>>,
) -> RequestBuilder {
    if let Some(headers) = extra_headers {
        for (key, value) in headers {
            request = request.header(key, value);
        }
    }
    request
}

/// `Authorization: Bearer <key>` plus the given content type and, optionally, accept type.
pub fn api_headers(
    api_key: &SecretString,
    content_type: Option<&'static str>,
    accept: Option<&'static str>,
) -> Result<HeaderMap, ClientError> {
    let mut headers = HeaderMap::new();

    let mut bearer = HeaderValue::from_str(&format!("Bearer {}", api_key.expose_secret()))
        .map_err(|_| ClientError::Config("API key is not a valid header value".to_string()))?;
    bearer.set_sensitive(true);
    headers.insert(AUTHORIZATION, bearer);

    if let Some(content_type) = content_type {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    if let Some(accept) = accept {
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
    }

    Ok(headers)
}
