//! Logging trait for provider client operations.
//!
//! This module provides the [`ClientLogger`] trait that allows users to capture
//! and log every exchange passing through the [`OpenAi`](crate::OpenAi) client,
//! and [`JsonLinesLogger`], which writes one JSON object per line.

use std::io::Write;
use std::sync::Mutex;

use serde_json::json;

use crate::{ChatCompletionChunk, ChatCompletionRequest, Error};

/// A trait for logging provider client operations.
///
/// Implement this trait to record outgoing requests, every decoded stream
/// chunk, and stream failures. The credential is never passed to the logger.
pub trait ClientLogger: Send + Sync {
    /// Log an outgoing streaming request.
    fn log_request(&self, request: &ChatCompletionRequest);

    /// Log an individual decoded stream chunk.
    fn log_stream_chunk(&self, chunk: &ChatCompletionChunk);

    /// Log a failure, either while opening the stream or mid-stream.
    fn log_stream_error(&self, error: &Error);
}

/// A [`ClientLogger`] writing JSON lines to any writer.
///
/// Each record is an object with a `kind` of `request`, `chunk` or `error`.
/// Write failures are ignored so logging never disturbs a conversation.
pub struct JsonLinesLogger<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesLogger<W> {
    /// Creates a logger over `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_record(&self, record: serde_json::Value) {
        let mut writer = match self.writer.lock() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = writeln!(writer, "{record}");
        let _ = writer.flush();
    }
}

impl<W: Write + Send> ClientLogger for JsonLinesLogger<W> {
    fn log_request(&self, request: &ChatCompletionRequest) {
        self.write_record(json!({ "kind": "request", "request": request }));
    }

    fn log_stream_chunk(&self, chunk: &ChatCompletionChunk) {
        self.write_record(json!({ "kind": "chunk", "chunk": chunk }));
    }

    fn log_stream_error(&self, error: &Error) {
        self.write_record(json!({ "kind": "error", "error": error.to_string() }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KnownModel, Model, Turn};

    #[test]
    fn writes_one_record_per_line() {
        let logger = JsonLinesLogger::new(Vec::new());
        let request = ChatCompletionRequest::new(
            Model::Known(KnownModel::Gpt4oMini),
            vec![Turn::user("oi")],
            0.2,
        );
        logger.log_request(&request);
        logger.log_stream_error(&Error::streaming("reset", None));

        let output = String::from_utf8(logger.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["kind"], "request");
        assert_eq!(lines[0]["request"]["messages"][0]["content"], "oi");
        assert_eq!(lines[1]["kind"], "error");
        assert_eq!(lines[1]["error"], "Streaming error: reset");
    }
}
