//! Server-sent-event decoding for streamed chat completions.
//!
//! The transport hands us arbitrary byte chunks; `SseDecoder` frames them
//! into lines, `chunks` turns the byte stream into a lazy sequence of
//! `StreamChunk`s, and `collect` folds that sequence into one `Completion`.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use tracing::trace;

use crate::errors::TransportError;
use crate::wire::{Completion, FinishReason, StreamChunk, StreamFrame};

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Line framer that survives chunk boundaries falling anywhere, including
/// inside a multi-byte character.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<SseEvent>, TransportError> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(ev) = parse_line(&line[..line.len() - 1])? {
                out.push(ev);
            }
        }
        Ok(out)
    }

    /// Flushes a trailing line that arrived without a newline.
    pub fn finish(&mut self) -> Result<Vec<SseEvent>, TransportError> {
        if self.buf.is_empty() {
            return Ok(Vec::new());
        }
        let line = std::mem::take(&mut self.buf);
        Ok(parse_line(&line)?.into_iter().collect())
    }
}

fn parse_line(raw: &[u8]) -> Result<Option<SseEvent>, TransportError> {
    let line = std::str::from_utf8(raw)
        .map_err(|e| TransportError::MalformedStream(format!("invalid utf-8 in event line: {e}")))?;
    let line = line.trim_end_matches('\r');

    if line.is_empty() || line.starts_with(':') {
        return Ok(None);
    }

    match line.strip_prefix("data:") {
        Some(data) => {
            let data = data.strip_prefix(' ').unwrap_or(data);
            if data.trim() == DONE_SENTINEL {
                Ok(Some(SseEvent::Done))
            } else {
                Ok(Some(SseEvent::Data(data.to_string())))
            }
        }
        // event:, id:, retry: carry nothing we use
        None => Ok(None),
    }
}

/// Decodes one `data:` payload. Frames without choices yield `None`.
pub fn decode_frame(data: &str) -> Result<Option<StreamChunk>, TransportError> {
    let frame: StreamFrame = serde_json::from_str(data)
        .map_err(|e| TransportError::MalformedStream(format!("{e}: {data}")))?;

    let Some(choice) = frame.choices.into_iter().next() else {
        return Ok(None);
    };

    Ok(Some(StreamChunk {
        text: choice.delta.content.unwrap_or_default(),
        finish_reason: FinishReason::parse(choice.finish_reason.as_deref()),
    }))
}

struct ChunkState<S> {
    bytes: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<StreamChunk, TransportError>>,
    ended: bool,
}

impl<S> ChunkState<S> {
    fn absorb(&mut self, events: Result<Vec<SseEvent>, TransportError>) {
        let events = match events {
            Ok(ev) => ev,
            Err(e) => {
                self.pending.push_back(Err(e));
                self.ended = true;
                return;
            }
        };
        for ev in events {
            match ev {
                SseEvent::Done => {
                    self.ended = true;
                    return;
                }
                SseEvent::Data(data) => match decode_frame(&data) {
                    Ok(Some(chunk)) => self.pending.push_back(Ok(chunk)),
                    Ok(None) => trace!(data = %data, "skipping frame without choices"),
                    Err(e) => {
                        self.pending.push_back(Err(e));
                        self.ended = true;
                        return;
                    }
                },
            }
        }
    }
}

/// Turns a raw byte stream into a lazy, finite, non-restartable sequence of
/// chunks. The sequence ends at the `[DONE]` sentinel, at the end of the
/// byte stream, or right after the first error it yields.
pub fn chunks<S, E>(bytes: S) -> impl Stream<Item = Result<StreamChunk, TransportError>>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<TransportError>,
{
    let state = ChunkState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        ended: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.ended {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(b)) => {
                    let events = st.decoder.push(&b);
                    st.absorb(events);
                }
                Some(Err(e)) => {
                    st.ended = true;
                    return Some((Err(e.into()), st));
                }
                None => {
                    let events = st.decoder.finish();
                    st.absorb(events);
                    st.ended = true;
                }
            }
        }
    })
}

/// Concatenates chunk text in arrival order. Any error aborts the whole
/// collection and the partial text is dropped.
pub async fn collect<S, F>(chunks: S, mut on_token: F) -> Result<Completion, TransportError>
where
    S: Stream<Item = Result<StreamChunk, TransportError>>,
    F: FnMut(&str),
{
    futures::pin_mut!(chunks);
    let mut content = String::new();
    let mut finish_reason = FinishReason::None;

    while let Some(item) = chunks.next().await {
        let chunk = item?;
        if !chunk.text.is_empty() {
            on_token(&chunk.text);
            content.push_str(&chunk.text);
        }
        if chunk.finish_reason != FinishReason::None {
            finish_reason = chunk.finish_reason;
        }
    }

    Ok(Completion { content, finish_reason })
}
