//! SSE relay transform.
//!
//! Turns the provider's `data: <json>` event stream into a lazy sequence of
//! [`StreamChunk`] deltas, and frames those deltas back into outbound SSE.
//! Each stage (line reassembly, prefix strip, sentinel check, JSON decode,
//! delta extraction) is a separate function so it can be tested alone.

use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};

use crate::error::Error;

/// Prefix marking an SSE data line.
pub const DATA_PREFIX: &str = "data: ";
/// Payload that terminates a stream, inbound and outbound.
pub const DONE_SENTINEL: &str = "[DONE]";
/// Final outbound event.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Longest line buffered without a newline before the buffer is discarded.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// One non-empty text delta and the event JSON it was taken from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    pub content: String,
    pub raw: String,
}

impl StreamChunk {
    /// Outbound SSE frame carrying the original event JSON.
    pub fn to_sse_frame(&self) -> Bytes {
        sse_frame(&self.raw)
    }
}

/// Frame a payload as a single SSE event.
pub fn sse_frame(payload: &str) -> Bytes {
    Bytes::from(format!("{}{}\n\n", DATA_PREFIX, payload))
}

/// What a single upstream line means to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// Not a data line (blank separator, comment, `event:`, `id:` ...).
    Ignored,
    /// A data line that carried nothing forwardable.
    Skipped,
    /// A forwardable delta.
    Delta(StreamChunk),
    /// The sentinel.
    Done,
}

/// Strip the `data: ` prefix, returning `None` for non-data lines.
pub fn strip_data_prefix(line: &str) -> Option<&str> {
    line.strip_prefix(DATA_PREFIX)
}

/// True when a data payload is the termination sentinel.
pub fn is_sentinel(payload: &str) -> bool {
    payload.trim() == DONE_SENTINEL
}

/// Decode a data payload as JSON.
pub fn decode_event(payload: &str) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::from_str(payload)
}

/// Extract `choices[0].delta.content` from a decoded event.
pub fn extract_delta(event: &serde_json::Value) -> Option<&str> {
    event
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
}

/// Run one line through the prefix, sentinel, decode and extract stages.
pub fn classify_line(line: &str) -> LineEvent {
    let Some(payload) = strip_data_prefix(line) else {
        return LineEvent::Ignored;
    };

    if is_sentinel(payload) {
        return LineEvent::Done;
    }

    let event = match decode_event(payload) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Skipping malformed streaming chunk");
            return LineEvent::Skipped;
        }
    };

    match extract_delta(&event) {
        Some(content) if !content.is_empty() => LineEvent::Delta(StreamChunk {
            content: content.to_string(),
            raw: payload.to_string(),
        }),
        Some(_) => LineEvent::Skipped,
        None => {
            tracing::debug!("Streaming chunk has no delta content");
            LineEvent::Skipped
        }
    }
}

/// Reassembles complete lines from arbitrarily split byte chunks.
///
/// Accepts `\n` and `\r\n` line endings.
pub(crate) struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Append raw bytes from the upstream stream.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);

        if self.buffer.len() > MAX_LINE_BYTES && !self.buffer.contains(&b'\n') {
            tracing::warn!(
                buffered = self.buffer.len(),
                "SSE line exceeded buffer cap, discarding"
            );
            self.buffer.clear();
        }
    }

    /// Pop the next complete line, without its terminator.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Take whatever is left after the stream ends as a final line.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let mut line = std::mem::take(&mut self.buffer);
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

/// State threaded through the relay `unfold`.
struct RelayState<E> {
    stream: BoxStream<'static, Result<Bytes, E>>,
    lines: SseLineBuffer,
    done: bool,
}

/// Convert an upstream SSE byte stream into a lazy stream of deltas.
///
/// The stream ends at the sentinel or at upstream EOF. A transport error is
/// yielded once and ends the stream. Dropping the returned stream drops the
/// upstream byte stream with it.
pub fn relay_events<S, E>(byte_stream: S) -> impl Stream<Item = Result<StreamChunk, Error>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<Error> + Send + 'static,
{
    let state = RelayState {
        stream: byte_stream.boxed(),
        lines: SseLineBuffer::new(),
        done: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }

        loop {
            while let Some(line) = st.lines.next_line() {
                match classify_line(&line) {
                    LineEvent::Delta(chunk) => return Some((Ok(chunk), st)),
                    LineEvent::Done => {
                        tracing::debug!("Upstream stream reached sentinel");
                        return None;
                    }
                    LineEvent::Ignored | LineEvent::Skipped => {}
                }
            }

            match st.stream.next().await {
                Some(Ok(bytes)) => st.lines.push(&bytes),
                Some(Err(e)) => {
                    let err: Error = e.into();
                    tracing::error!(error = %err, "Error streaming from provider");
                    st.done = true;
                    return Some((Err(err), st));
                }
                None => {
                    st.done = true;
                    if let Some(LineEvent::Delta(chunk)) =
                        st.lines.finish().map(|line| classify_line(&line))
                    {
                        return Some((Ok(chunk), st));
                    }
                    tracing::debug!("Upstream stream ended without sentinel");
                    return None;
                }
            }
        }
    })
}

/// Frame a delta stream as outbound SSE bytes.
///
/// Every chunk becomes `data: <event json>\n\n`. A clean end appends
/// [`DONE_FRAME`]; an error aborts the body without it.
pub fn outbound_sse<S>(chunks: S) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send
where
    S: Stream<Item = Result<StreamChunk, Error>> + Send + 'static,
{
    futures::stream::unfold(
        (chunks.boxed(), false),
        |(mut chunks, finished)| async move {
            if finished {
                return None;
            }

            match chunks.next().await {
                Some(Ok(chunk)) => Some((Ok(chunk.to_sse_frame()), (chunks, false))),
                Some(Err(e)) => Some((Err(std::io::Error::other(e)), (chunks, true))),
                None => Some((Ok(Bytes::from_static(DONE_FRAME.as_bytes())), (chunks, true))),
            }
        },
    )
}
