//! Thin reqwest-backed transport adapter.
//!
//! Encodes data tasks as query/form parameters and upload tasks as
//! multipart form data, preserving item order. Upload progress is
//! best-effort: streamed and file parts are counted chunk by chunk,
//! inline byte parts are counted when handed to the client. Background
//! sessions are an OS facility; this adapter serves both session kinds
//! over one client.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use url::Url;

use super::{ProgressSink, Response, Transport, TransportCall, TransportFailure, TransportResult};
use crate::error::TransportError;
use crate::request::{Method, RequestData, TaskKind, UploadItem};

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .build()
            .map_err(|e| TransportError::Other(format!("building http client: {e}")))?;
        Ok(Self { client })
    }

    /// Wraps an existing client (custom TLS, proxies, user agent, ...).
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn perform(&self, call: TransportCall, progress: ProgressSink) -> TransportResult {
        let method = reqwest_method(call.method);
        let mut builder = self.client.request(method, call.url.clone());

        match call.task {
            TaskKind::Data => {
                let pairs = call.params.text_pairs();
                if !pairs.is_empty() {
                    builder = match call.method {
                        Method::Get | Method::Delete => builder.query(&pairs),
                        _ => builder.form(&pairs),
                    };
                }
            }
            TaskKind::Upload(items) => {
                let form = build_upload_form(&call.params, items, progress.clone()).await?;
                builder = builder.multipart(form);
            }
        }

        let response = builder
            .timeout(call.timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(map_reqwest_error)?
            .to_vec();
        let response = Response { status, body };

        if response.is_success() {
            progress.report(1.0);
            Ok(response)
        } else {
            Err(TransportFailure {
                error: TransportError::Status(status),
                response: Some(response),
            })
        }
    }

    async fn download(
        &self,
        url: Url,
        destination: PathBuf,
        progress: ProgressSink,
    ) -> Result<PathBuf, TransportFailure> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.bytes().await.unwrap_or_default().to_vec();
            return Err(TransportFailure {
                response: Some(Response { status, body }),
                error: TransportError::Status(status),
            });
        }

        let total = response.content_length();
        if let Some(dir) = destination.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(io_failure)?;
        }
        let mut file = tokio::fs::File::create(&destination)
            .await
            .map_err(io_failure)?;

        let mut stream = response.bytes_stream();
        let mut done: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            file.write_all(&chunk).await.map_err(io_failure)?;
            done += chunk.len() as u64;
            if let Some(total) = total {
                if total > 0 {
                    progress.report(done as f32 / total as f32);
                }
            }
        }
        file.flush().await.map_err(io_failure)?;
        progress.report(1.0);
        Ok(destination)
    }
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
        Method::Patch => reqwest::Method::PATCH,
    }
}

fn map_reqwest_error(error: reqwest::Error) -> TransportFailure {
    let mapped = if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_connect() {
        TransportError::Connection(error.to_string())
    } else {
        TransportError::Other(error.to_string())
    };
    TransportFailure::from_error(mapped)
}

fn io_failure(error: std::io::Error) -> TransportFailure {
    TransportFailure::from_error(TransportError::Io(error))
}

/// Builds the multipart form: text parameters first, then the upload
/// items in caller order, then file-reference parameters in key order.
async fn build_upload_form(
    params: &RequestData,
    items: Vec<UploadItem>,
    progress: ProgressSink,
) -> Result<Form, TransportFailure> {
    let mut queued = items;
    queued.extend(params.file_items().into_iter().cloned());

    let mut sized: Vec<(UploadItem, u64)> = Vec::with_capacity(queued.len());
    let mut total: u64 = 0;
    for item in queued {
        let length = match &item {
            UploadItem::Bytes { data, .. } => data.len() as u64,
            UploadItem::Stream { length, .. } => *length,
            UploadItem::File { path, .. } => tokio::fs::metadata(path)
                .await
                .map_err(io_failure)?
                .len(),
        };
        total = total.saturating_add(length);
        sized.push((item, length));
    }

    let sent = Arc::new(AtomicU64::new(0));
    let mut form = Form::new();
    for (key, value) in params.text_pairs() {
        form = form.text(key, value);
    }

    for (item, length) in sized {
        match item {
            UploadItem::Bytes {
                data,
                field_name,
                file_name,
                mime_type,
            } => {
                sent.fetch_add(length, Ordering::Relaxed);
                let part = with_mime(Part::bytes(data).file_name(file_name), mime_type)?;
                form = form.part(field_name, part);
            }
            UploadItem::Stream {
                source,
                field_name,
                file_name,
                length: declared,
                mime_type,
            } => {
                let reader = source.take().ok_or_else(|| {
                    TransportFailure::from_error(TransportError::Other(
                        "upload stream already consumed".into(),
                    ))
                })?;
                let body = counted_body(reader, Arc::clone(&sent), total, progress.clone());
                let part = with_mime(
                    Part::stream_with_length(body, declared).file_name(file_name),
                    mime_type,
                )?;
                form = form.part(field_name, part);
            }
            UploadItem::File { path, field_name } => {
                let file = tokio::fs::File::open(&path).await.map_err(io_failure)?;
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let body = counted_body(file, Arc::clone(&sent), total, progress.clone());
                let part = Part::stream_with_length(body, length).file_name(file_name);
                form = form.part(field_name, part);
            }
        }
    }

    Ok(form)
}

fn with_mime(part: Part, mime_type: Option<String>) -> Result<Part, TransportFailure> {
    match mime_type {
        Some(mime) => part.mime_str(&mime).map_err(|e| {
            TransportFailure::from_error(TransportError::Other(format!("invalid mime type: {e}")))
        }),
        None => Ok(part),
    }
}

/// Body that counts sent bytes and reports the overall upload fraction.
fn counted_body<R>(reader: R, sent: Arc<AtomicU64>, total: u64, progress: ProgressSink) -> Body
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let stream = ReaderStream::new(reader).map(move |chunk| {
        if let Ok(bytes) = &chunk {
            let done = sent.fetch_add(bytes.len() as u64, Ordering::Relaxed) + bytes.len() as u64;
            if total > 0 {
                progress.report(done as f32 / total as f32);
            }
        }
        chunk
    });
    Body::wrap_stream(stream)
}
