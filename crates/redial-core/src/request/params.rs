//! Request parameters and upload payloads.
//!
//! The core treats upload payloads as opaque values with caller-supplied
//! metadata; multipart encoding is the transport adapter's job. Item order
//! is preserved end to end.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::io::AsyncRead;

/// Boxed async byte source for streamed upload items.
pub type UploadReader = Box<dyn AsyncRead + Send + Unpin>;

/// One-shot handle around a streamed upload source.
///
/// A reader cannot be rewound, so a retried attempt that reaches a
/// `Stream` item whose reader was already consumed fails at the adapter
/// instead of silently re-sending nothing.
#[derive(Clone)]
pub struct StreamSource {
    inner: Arc<Mutex<Option<UploadReader>>>,
}

impl StreamSource {
    pub fn new(reader: UploadReader) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(reader))),
        }
    }

    /// Takes the reader out; subsequent calls return `None`.
    pub fn take(&self) -> Option<UploadReader> {
        self.inner.lock().ok()?.take()
    }
}

impl fmt::Debug for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let consumed = self
            .inner
            .lock()
            .map(|slot| slot.is_none())
            .unwrap_or(true);
        f.debug_struct("StreamSource")
            .field("consumed", &consumed)
            .finish()
    }
}

/// One item of a multipart upload. Metadata passes through to the adapter
/// unchanged.
#[derive(Debug, Clone)]
pub enum UploadItem {
    /// Inline bytes.
    Bytes {
        data: Vec<u8>,
        field_name: String,
        file_name: String,
        mime_type: Option<String>,
    },
    /// Streamed source with a declared length.
    Stream {
        source: StreamSource,
        field_name: String,
        file_name: String,
        length: u64,
        mime_type: Option<String>,
    },
    /// Reference to a file on disk; the adapter reads it.
    File { path: PathBuf, field_name: String },
}

impl UploadItem {
    pub fn field_name(&self) -> &str {
        match self {
            UploadItem::Bytes { field_name, .. }
            | UploadItem::Stream { field_name, .. }
            | UploadItem::File { field_name, .. } => field_name,
        }
    }
}

/// A single request parameter value.
#[derive(Debug, Clone)]
pub enum Param {
    /// Text value; `None` means "key present without a value" and is
    /// skipped by adapters.
    Text(Option<String>),
    /// File-reference value, folded into the multipart body by adapters.
    File(UploadItem),
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Text(Some(value.to_owned()))
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Text(Some(value))
    }
}

/// Parameter map for one request. Keys are unique; iteration order is
/// deterministic so encoded bodies are stable across attempts.
#[derive(Debug, Clone, Default)]
pub struct RequestData {
    entries: BTreeMap<String, Param>,
}

impl RequestData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a parameter.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Param>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Param> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Param)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Text parameters only, with valueless keys skipped. Convenience for
    /// adapters encoding query strings or form bodies.
    pub fn text_pairs(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .filter_map(|(k, v)| match v {
                Param::Text(Some(text)) => Some((k.clone(), text.clone())),
                _ => None,
            })
            .collect()
    }

    /// File-reference parameters, in key order.
    pub fn file_items(&self) -> Vec<&UploadItem> {
        self.entries
            .values()
            .filter_map(|v| match v {
                Param::File(item) => Some(item),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_existing_key() {
        let mut data = RequestData::new();
        data.set("name", "a");
        data.set("name", "b");
        assert_eq!(data.text_pairs(), vec![("name".into(), "b".into())]);
    }

    #[test]
    fn valueless_text_skipped_in_pairs() {
        let mut data = RequestData::new();
        data.set("flag", Param::Text(None));
        data.set("name", "x");
        assert_eq!(data.text_pairs(), vec![("name".into(), "x".into())]);
        assert!(data.get("flag").is_some());
    }

    #[test]
    fn stream_source_is_single_use() {
        let source = StreamSource::new(Box::new(std::io::Cursor::new(vec![1u8, 2, 3])));
        assert!(source.take().is_some());
        assert!(source.take().is_none());
        assert!(source.clone().take().is_none());
    }
}
