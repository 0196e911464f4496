//! Server-sent event decoding.
//!
//! Turns the raw byte stream of an engine response into the `data`
//! payloads of its events, one item per event, without buffering more
//! than the event currently being read.

use std::fmt;

use bytes::{Bytes, BytesMut};
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use thiserror::Error;
use tracing::warn;

/// End-of-stream sentinel some engines send as a final event.
const DONE_SENTINEL: &str = "[DONE]";

/// Errors from reading an event stream.
#[derive(Debug, Error)]
pub enum SseError {
    /// The underlying byte stream failed mid-read.
    #[error("Event stream broken: {0}")]
    Transport(String),
}

/// State threaded through the `unfold` stream.
struct DecoderState {
    stream: BoxStream<'static, Result<Bytes, String>>,
    buf: BytesMut,
    /// `data` lines of the event being read.
    data: Vec<String>,
    done: bool,
}

impl DecoderState {
    /// Finish the current event, returning its joined data if any.
    fn take_event(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let event = self.data.join("\n");
        self.data.clear();
        Some(event)
    }

    fn push_line(&mut self, line: &str) {
        if let Some(value) = data_field(line) {
            self.data.push(value.to_string());
        }
    }
}

/// Value of a `data` field line, or `None` for comments and other fields.
fn data_field(line: &str) -> Option<&str> {
    if line.starts_with(':') {
        return None;
    }
    let value = line.strip_prefix("data")?;
    if value.is_empty() {
        return Some("");
    }
    let value = value.strip_prefix(':')?;
    Some(value.strip_prefix(' ').unwrap_or(value))
}

fn find_newline(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|b| *b == b'\n')
}

/// Decode an SSE byte stream into event data payloads.
///
/// Comments, blank keep-alives and non-`data` fields are skipped.
/// Multi-line `data` fields of one event are joined with `\n`. A
/// `[DONE]` event ends the stream. A failing byte stream yields one
/// [`SseError`] and then ends.
pub fn decode_events<S, E>(byte_stream: S) -> impl Stream<Item = Result<String, SseError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: fmt::Display + 'static,
{
    let state = DecoderState {
        stream: byte_stream.map(|r| r.map_err(|e| e.to_string())).boxed(),
        buf: BytesMut::new(),
        data: Vec::new(),
        done: false,
    };

    futures_util::stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }

        loop {
            if let Some(line_end) = find_newline(&st.buf) {
                let raw = st.buf.split_to(line_end + 1);
                let text = String::from_utf8_lossy(&raw);
                let line = text.trim_end_matches(['\n', '\r']);

                if !line.is_empty() {
                    st.push_line(line);
                    continue;
                }

                // Blank line dispatches the event.
                match st.take_event() {
                    Some(event) if event.trim() == DONE_SENTINEL => {
                        st.done = true;
                        return None;
                    }
                    Some(event) => return Some((Ok(event), st)),
                    None => continue,
                }
            }

            match st.stream.next().await {
                Some(Ok(chunk)) => st.buf.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    warn!("Upstream event stream error: {e}");
                    st.done = true;
                    return Some((Err(SseError::Transport(e)), st));
                }
                None => {
                    // Flush an unterminated trailing event.
                    st.done = true;
                    if !st.buf.is_empty() {
                        let rest = st.buf.split();
                        let text = String::from_utf8_lossy(&rest);
                        st.push_line(text.trim_end_matches(['\n', '\r']));
                    }
                    return match st.take_event() {
                        Some(event) if event.trim() != DONE_SENTINEL => Some((Ok(event), st)),
                        _ => None,
                    };
                }
            }
        }
    })
}
