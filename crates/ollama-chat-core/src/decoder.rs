//! Newline-delimited JSON decoding for `/api/generate` streams.
//!
//! Network chunks do not line up with JSON lines, so the decoder carries the
//! trailing partial line over to the next chunk. Lines that fail to parse are
//! logged and skipped; they never end the stream.

use std::collections::VecDeque;

use futures::{Stream, StreamExt as _, stream};
use tracing::{debug, warn};

use crate::errors::ChatError;

/// One decoded event of a generation stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// A piece of generated text, in emission order.
    Token { text: String },
    /// Backend-reported failure.
    Error { message: String },
    /// The backend closed the stream.
    Done,
}

/// Incremental NDJSON decoder with a byte carry-over buffer.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buf: Vec<u8>,
    skipped: usize,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns the events of every line it completed.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(idx) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=idx).collect();
            if let Some(event) = self.decode_line(&line[..idx]) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes an unterminated final line and appends `Done`.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let rest = std::mem::take(&mut self.buf);
        let mut events = Vec::new();
        if let Some(event) = self.decode_line(&rest) {
            events.push(event);
        }
        events.push(StreamEvent::Done);
        events
    }

    /// Number of malformed lines skipped so far.
    pub fn skipped_lines(&self) -> usize {
        self.skipped
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<StreamEvent> {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_str::<serde_json::Value>(line) {
            Ok(value) => classify_line(&value),
            Err(err) => {
                self.skipped += 1;
                warn!(error = %err, line = %line, "skipping malformed stream line");
                None
            }
        }
    }
}

/// Maps one parsed line (or a whole non-streaming body) to an event.
///
/// `response` wins over `error`; objects carrying neither, such as the final
/// `{"done": true, ...}` statistics line, produce nothing.
pub(crate) fn classify_line(value: &serde_json::Value) -> Option<StreamEvent> {
    if let Some(text) = value.get("response").and_then(|v| v.as_str())
        && !text.is_empty()
    {
        return Some(StreamEvent::Token {
            text: text.to_string(),
        });
    }
    extract_error(value).map(|message| StreamEvent::Error { message })
}

pub(crate) fn extract_error(value: &serde_json::Value) -> Option<String> {
    match value.get("error")? {
        serde_json::Value::Null => None,
        serde_json::Value::String(message) => Some(message.clone()),
        other => Some(
            other
                .get("message")
                .and_then(|v| v.as_str())
                .map(ToOwned::to_owned)
                .unwrap_or_else(|| other.to_string()),
        ),
    }
}

/// Decodes a transport byte stream into events.
///
/// The stream ends with `Done` when the body ends, or with a single
/// `Err(ChatError::Transport)` when reading fails.
pub fn decode_events<S, B, E>(
    bytes_stream: S,
) -> impl Stream<Item = Result<StreamEvent, ChatError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    struct State<S> {
        bytes_stream: S,
        decoder: NdjsonDecoder,
        pending: VecDeque<StreamEvent>,
        done: bool,
    }

    stream::try_unfold(
        State {
            bytes_stream,
            decoder: NdjsonDecoder::new(),
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Ok(Some((event, state)));
                }
                if state.done {
                    return Ok(None);
                }

                match state.bytes_stream.next().await {
                    Some(Ok(chunk)) => {
                        let chunk = chunk.as_ref();
                        debug!(bytes = chunk.len(), "stream chunk received");
                        state.pending.extend(state.decoder.push_chunk(chunk));
                    }
                    Some(Err(e)) => {
                        return Err(ChatError::transport(format!("stream read failed: {e}")));
                    }
                    None => {
                        state.pending.extend(state.decoder.finish());
                        state.done = true;
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIRE: &str = concat!(
        "{\"model\":\"m\",\"response\":\"Hel\",\"done\":false}\n",
        "{\"model\":\"m\",\"response\":\"lo \",\"done\":false}\n",
        "{\"model\":\"m\",\"response\":\"wörld\",\"done\":false}\n",
        "{\"model\":\"m\",\"response\":\"\",\"done\":true,\"eval_count\":3}\n",
    );

    fn tokens(texts: &[&str]) -> Vec<StreamEvent> {
        let mut events: Vec<StreamEvent> = texts
            .iter()
            .map(|t| StreamEvent::Token {
                text: t.to_string(),
            })
            .collect();
        events.push(StreamEvent::Done);
        events
    }

    fn decode_split(bytes: &[u8], splits: &[usize]) -> Vec<StreamEvent> {
        let mut decoder = NdjsonDecoder::new();
        let mut events = Vec::new();
        let mut start = 0;
        for &end in splits.iter().chain(std::iter::once(&bytes.len())) {
            events.extend(decoder.push_chunk(&bytes[start..end]));
            start = end;
        }
        events.extend(decoder.finish());
        events
    }

    #[test]
    fn every_single_split_point_yields_same_events() {
        let bytes = WIRE.as_bytes();
        let expected = tokens(&["Hel", "lo ", "wörld"]);
        for split in 0..=bytes.len() {
            assert_eq!(decode_split(bytes, &[split]), expected, "split at {split}");
        }
    }

    #[test]
    fn byte_at_a_time_matches_whole_body() {
        let bytes = WIRE.as_bytes();
        let splits: Vec<usize> = (1..bytes.len()).collect();
        assert_eq!(decode_split(bytes, &splits), decode_split(bytes, &[]));
    }

    #[test]
    fn malformed_line_between_valid_lines_is_skipped() {
        let mut decoder = NdjsonDecoder::new();
        let mut events =
            decoder.push_chunk(b"{\"response\":\"a\"}\n{not json\n{\"response\":\"b\"}\n");
        events.extend(decoder.finish());
        assert_eq!(events, tokens(&["a", "b"]));
        assert_eq!(decoder.skipped_lines(), 1);
    }

    #[test]
    fn error_field_becomes_error_event() {
        let mut decoder = NdjsonDecoder::new();
        let events = decoder.push_chunk(b"{\"error\":\"model 'x' not found\"}\r\n");
        assert_eq!(
            events,
            vec![StreamEvent::Error {
                message: "model 'x' not found".into()
            }]
        );
    }

    #[test]
    fn unterminated_last_line_is_flushed_on_finish() {
        let mut decoder = NdjsonDecoder::new();
        assert!(decoder.push_chunk(b"{\"response\":\"tail\"}").is_empty());
        assert_eq!(decoder.finish(), tokens(&["tail"]));
    }

    #[test]
    fn blank_lines_are_ignored() {
        let mut decoder = NdjsonDecoder::new();
        assert!(decoder.push_chunk(b"\n\n  \n").is_empty());
        assert_eq!(decoder.skipped_lines(), 0);
    }

    #[tokio::test]
    async fn decode_events_appends_done_at_end_of_body() {
        let chunks: Vec<Result<&'static [u8], std::io::Error>> = vec![
            Ok(b"{\"response\":\"Hel".as_slice()),
            Ok(b"lo\"}\n{\"respon".as_slice()),
            Ok(b"se\":\"!\"}\n".as_slice()),
        ];
        let events: Vec<_> = decode_events(stream::iter(chunks)).collect().await;
        let events: Vec<StreamEvent> = events.into_iter().map(|e| e.expect("event")).collect();
        assert_eq!(events, tokens(&["Hello", "!"]));
    }

    #[tokio::test]
    async fn decode_events_reports_read_failure_as_transport_error() {
        let chunks: Vec<Result<&'static [u8], std::io::Error>> = vec![
            Ok(b"{\"response\":\"a\"}\n".as_slice()),
            Err(std::io::Error::other("connection reset")),
        ];
        let events: Vec<_> = decode_events(stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], Ok(StreamEvent::Token { text }) if text == "a"));
        assert!(matches!(&events[1], Err(ChatError::Transport(msg)) if msg.contains("connection reset")));
    }
}
