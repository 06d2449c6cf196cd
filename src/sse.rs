//! Server-Sent Events (SSE) processing for streaming chat completions.
//!
//! This module turns the raw byte stream of a streaming completion response
//! into a stream of parsed [`ChatCompletionChunk`]s. Frames are separated by a
//! blank line; `data:` lines carry JSON, `data: [DONE]` ends the stream, and
//! lines starting with `:` are keep-alive comments. Bytes are buffered until a
//! whole frame is available, so multi-byte characters split across network
//! reads decode correctly.

use std::error;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use crate::observability::{STREAM_CHUNKS, STREAM_ERRORS};
use crate::types::{ChatCompletionChunk, ProviderErrorBody, ProviderErrorDetail};
use crate::{Error, Result};

const DONE_MARKER: &str = "[DONE]";

/// Process a stream of bytes into a stream of completion chunks.
///
/// The returned stream ends after the `[DONE]` marker, when the byte stream
/// ends, or right after yielding a transport error.
pub fn process_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<ChatCompletionChunk>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin + Send + 'static,
    E: error::Error + Send + Sync + 'static,
{
    let state = SseState {
        inner: byte_stream,
        buffer: Vec::new(),
        finished: false,
        pending_cr: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }

            // First check if we have a complete frame in the buffer
            if let Some(frame) = take_frame(&mut state.buffer) {
                match parse_frame(&frame) {
                    Frame::Skip => continue,
                    Frame::Done => return None,
                    Frame::Event(event) => return Some((count(event), state)),
                }
            }

            // Read more data
            match state.inner.next().await {
                Some(Ok(bytes)) => state.push_normalized(&bytes),
                Some(Err(e)) => {
                    state.finished = true;
                    let err = Error::streaming(
                        format!("Error in HTTP stream: {e}"),
                        Some(Box::new(e)),
                    );
                    return Some((count(Err(err)), state));
                }
                None => {
                    // End of stream; a trailing frame may lack its blank line
                    state.finished = true;
                    let rest = std::mem::take(&mut state.buffer);
                    if let Frame::Event(event) = parse_frame(&rest) {
                        return Some((count(event), state));
                    }
                    return None;
                }
            }
        }
    })
}

struct SseState<S> {
    inner: S,
    buffer: Vec<u8>,
    finished: bool,
    pending_cr: bool,
}

impl<S> SseState<S> {
    /// Appends bytes with `\r\n` and lone `\r` line endings turned into `\n`.
    ///
    /// A `\r` ending one read may pair with a `\n` starting the next.
    fn push_normalized(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            let after_cr = std::mem::replace(&mut self.pending_cr, byte == b'\r');
            match byte {
                b'\r' => self.buffer.push(b'\n'),
                b'\n' if after_cr => {}
                _ => self.buffer.push(byte),
            }
        }
    }
}

enum Frame {
    Skip,
    Done,
    Event(Result<ChatCompletionChunk>),
}

/// Payloads that may appear on a `data:` line.
#[derive(Deserialize)]
#[serde(untagged)]
enum StreamPayload {
    Error(ProviderErrorBody),
    Chunk(ChatCompletionChunk),
}

fn count(event: Result<ChatCompletionChunk>) -> Result<ChatCompletionChunk> {
    match &event {
        Ok(_) => STREAM_CHUNKS.click(),
        Err(_) => STREAM_ERRORS.click(),
    }
    event
}

/// Removes and returns the first complete frame, without its terminator.
fn take_frame(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let end = buffer.windows(2).position(|window| window == b"\n\n")?;
    let frame = buffer[..end].to_vec();
    buffer.drain(..end + 2);
    Some(frame)
}

/// Parses one frame into an event.
fn parse_frame(frame: &[u8]) -> Frame {
    let text = match std::str::from_utf8(frame) {
        Ok(text) => text,
        Err(e) => {
            return Frame::Event(Err(Error::encoding(
                format!("Invalid UTF-8 in stream: {e}"),
                Some(Box::new(e)),
            )));
        }
    };

    let mut event_type = None;
    let mut data: Option<String> = None;
    for line in text.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => event_type = Some(value),
            "data" => match &mut data {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            },
            _ => {}
        }
    }

    let Some(data) = data else {
        return Frame::Skip;
    };
    let data = data.trim();

    if event_type == Some("error") {
        return Frame::Event(Err(stream_error_event(data)));
    }
    if data == DONE_MARKER {
        return Frame::Done;
    }

    match serde_json::from_str::<StreamPayload>(data) {
        Ok(StreamPayload::Chunk(chunk)) => Frame::Event(Ok(chunk)),
        Ok(StreamPayload::Error(body)) => Frame::Event(Err(provider_error(body.error, data))),
        Err(e) => Frame::Event(Err(Error::serialization(
            format!("Failed to parse event JSON: {e}"),
            Some(Box::new(e)),
        ))),
    }
}

fn stream_error_event(data: &str) -> Error {
    match serde_json::from_str::<ProviderErrorBody>(data) {
        Ok(body) => provider_error(body.error, data),
        Err(_) => Error::api(500, Some("stream_error".to_string()), data.to_string(), None),
    }
}

fn provider_error(detail: ProviderErrorDetail, raw: &str) -> Error {
    Error::api(
        500,
        detail.error_type.or_else(|| Some("stream_error".to_string())),
        detail.message.unwrap_or_else(|| raw.to_string()),
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::io;

    type Chunk = std::result::Result<Bytes, io::Error>;

    fn chunk_frame(content: &str) -> String {
        let payload = serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": {"content": content}}]
        });
        format!("data: {payload}\n\n")
    }

    async fn contents(chunks: Vec<Chunk>) -> Vec<Result<Option<String>>> {
        process_sse(stream::iter(chunks))
            .map(|event| event.map(ChatCompletionChunk::into_content))
            .collect()
            .await
    }

    #[tokio::test]
    async fn parse_single_chunk() {
        let data = chunk_frame("Olá");
        let events = contents(vec![Ok(Bytes::from(data))]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().as_deref(), Some("Olá"));
    }

    #[tokio::test]
    async fn done_marker_ends_stream() {
        let data = format!(
            "{}{}data: [DONE]\n\n{}",
            chunk_frame("a"),
            chunk_frame("b"),
            chunk_frame("ignored")
        );
        let events = contents(vec![Ok(Bytes::from(data))]).await;
        let texts: Vec<_> = events
            .into_iter()
            .map(|event| event.unwrap().unwrap())
            .collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn handle_split_event() {
        let data = chunk_frame("mundo");
        let (first, second) = data.split_at(17);
        let events = contents(vec![
            Ok(Bytes::from(first.to_string())),
            Ok(Bytes::from(second.to_string())),
        ])
        .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().as_deref(), Some("mundo"));
    }

    #[tokio::test]
    async fn multibyte_character_split_across_reads() {
        let data = chunk_frame("á").into_bytes();
        let split = data
            .windows(2)
            .position(|window| window == "á".as_bytes())
            .unwrap()
            + 1;
        let events = contents(vec![
            Ok(Bytes::copy_from_slice(&data[..split])),
            Ok(Bytes::copy_from_slice(&data[split..])),
        ])
        .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().as_deref(), Some("á"));
    }

    #[tokio::test]
    async fn comments_and_crlf_are_tolerated() {
        let data = format!(
            ": keep-alive\r\n\r\n{}",
            chunk_frame("x").replace('\n', "\r\n")
        );
        let events = contents(vec![Ok(Bytes::from(data))]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn lone_cr_line_endings() {
        let data = format!(
            ": keep-alive\r\r{}data: [DONE]\r\r",
            chunk_frame("y").replace('\n', "\r")
        );
        let events = contents(vec![Ok(Bytes::from(data))]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().as_deref(), Some("y"));
    }

    #[tokio::test]
    async fn crlf_split_across_reads() {
        let data = chunk_frame("z").replace('\n', "\r\n");
        let split = data.find('\n').unwrap();
        let events = contents(vec![
            Ok(Bytes::from(data[..split].to_string())),
            Ok(Bytes::from(data[split..].to_string())),
            Ok(Bytes::from(chunk_frame("w"))),
        ])
        .await;
        let texts: Vec<_> = events
            .into_iter()
            .map(|event| event.unwrap().unwrap())
            .collect();
        assert_eq!(texts, vec!["z", "w"]);
    }

    #[tokio::test]
    async fn invalid_utf8_is_encoding_error() {
        let mut data = chunk_frame("Par").into_bytes();
        data.extend_from_slice(b"data: {\"choices\": [\xff\xfe]}\n\n");
        let events = contents(vec![Ok(Bytes::from(data))]).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap().as_deref(), Some("Par"));
        let err = events[1].as_ref().unwrap_err();
        assert!(matches!(err, Error::Encoding { .. }));
        assert!(err.to_string().contains("Invalid UTF-8"));
    }

    #[tokio::test]
    async fn trailing_frame_without_blank_line() {
        let data = chunk_frame("tail");
        let data = data.trim_end().to_string();
        let events = contents(vec![Ok(Bytes::from(data))]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().as_deref(), Some("tail"));
    }

    #[tokio::test]
    async fn in_band_error_payload() {
        let data = "data: {\"error\": {\"message\": \"overloaded\", \"type\": \"server_error\"}}\n\n";
        let events = contents(vec![Ok(Bytes::from(data))]).await;
        assert_eq!(events.len(), 1);
        let err = events[0].as_ref().unwrap_err();
        assert_eq!(err.to_string(), "server_error: overloaded");
    }

    #[tokio::test]
    async fn error_event_type() {
        let data = "event: error\ndata: upstream went away\n\n";
        let events = contents(vec![Ok(Bytes::from(data))]).await;
        let err = events[0].as_ref().unwrap_err();
        assert!(err.to_string().contains("upstream went away"));
    }

    #[tokio::test]
    async fn handle_malformed_event() {
        let data = "data: {not json\n\n";
        let events = contents(vec![Ok(Bytes::from(data))]).await;
        assert_eq!(events.len(), 1);
        assert!(events[0].as_ref().unwrap_err().to_string().contains("parse event JSON"));
    }

    #[tokio::test]
    async fn transport_error_ends_stream() {
        let events = contents(vec![
            Ok(Bytes::from(chunk_frame("Par"))),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            Ok(Bytes::from(chunk_frame("never"))),
        ])
        .await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap().as_deref(), Some("Par"));
        let err = events[1].as_ref().unwrap_err();
        assert!(err.is_streaming());
    }
}
