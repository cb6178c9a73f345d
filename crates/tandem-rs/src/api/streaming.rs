//! Incremental decoding of streamed chat responses.
//!
//! Ollama streams newline-delimited JSON objects; OpenAI-compatible servers
//! stream Server-Sent Events (`data: {...}` lines ending with
//! `data: [DONE]`). Both are line-oriented, so one [`StreamAccumulator`]
//! handles buffering and text assembly while a [`LineDecoder`] understands
//! the provider's line format.

use super::TransportError;
use serde::Deserialize;
use tracing::{debug, trace, warn};

/// A single decoded stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// An incremental text content delta.
    TextDelta(String),
    /// The server signalled the end of the stream.
    Done,
}

/// Decodes one complete, trimmed, non-empty line.
pub type LineDecoder = fn(&str) -> Result<Vec<StreamEvent>, TransportError>;

// ── OpenAI SSE ─────────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct SseChunk {
    choices: Option<Vec<SseChoice>>,
}

#[derive(Deserialize, Debug)]
struct SseChoice {
    delta: Option<SseDelta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct SseDelta {
    content: Option<String>,
}

/// Decode one SSE line from an OpenAI-compatible server. Comments and
/// non-`data` fields are ignored; malformed chunks are skipped.
pub fn parse_sse_line(line: &str) -> Result<Vec<StreamEvent>, TransportError> {
    if line.starts_with(':') {
        return Ok(Vec::new());
    }
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(Vec::new());
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return Ok(vec![StreamEvent::Done]);
    }

    let chunk = match serde_json::from_str::<SseChunk>(data) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse SSE chunk: {e}, data: {data}");
            return Ok(Vec::new());
        }
    };

    let mut events = Vec::new();
    for choice in chunk.choices.into_iter().flatten().take(1) {
        if let Some(content) = choice.delta.and_then(|d| d.content)
            && !content.is_empty()
        {
            events.push(StreamEvent::TextDelta(content));
        }
        if choice.finish_reason.is_some() {
            trace!("Stream finish_reason: {:?}", choice.finish_reason);
        }
    }
    Ok(events)
}

// ── Ollama NDJSON ──────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct NdjsonChunk {
    message: Option<NdjsonMessage>,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

#[derive(Deserialize, Debug)]
struct NdjsonMessage {
    content: Option<String>,
}

/// Decode one line of an Ollama `/api/chat` stream. An `error` object
/// ends the stream with [`TransportError::Decode`].
pub fn parse_ndjson_line(line: &str) -> Result<Vec<StreamEvent>, TransportError> {
    let chunk: NdjsonChunk = match serde_json::from_str(line) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse NDJSON line: {e}, data: {line}");
            return Ok(Vec::new());
        }
    };
    if let Some(error) = chunk.error {
        return Err(TransportError::Decode(error));
    }

    let mut events = Vec::new();
    if let Some(content) = chunk.message.and_then(|m| m.content)
        && !content.is_empty()
    {
        events.push(StreamEvent::TextDelta(content));
    }
    if chunk.done {
        events.push(StreamEvent::Done);
    }
    Ok(events)
}

// ── Accumulation ───────────────────────────────────────────────────

/// Buffers raw body chunks, splits them into lines, and assembles the
/// reply text.
///
/// Bytes are buffered undecoded until a newline arrives so multi-byte
/// characters split across network chunks survive intact.
#[derive(Debug)]
pub struct StreamAccumulator {
    decode: LineDecoder,
    buffer: Vec<u8>,
    text: String,
    done: bool,
}

impl StreamAccumulator {
    pub fn new(decode: LineDecoder) -> Self {
        Self {
            decode,
            buffer: Vec::new(),
            text: String::new(),
            done: false,
        }
    }

    /// Whether the server already signalled the end of the stream.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one body chunk, calling `on_chunk` for each text delta.
    pub fn feed(
        &mut self,
        bytes: &[u8],
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> Result<(), TransportError> {
        if self.done {
            return Ok(());
        }
        self.buffer.extend_from_slice(bytes);
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.process_line(&line, on_chunk)?;
            if self.done {
                break;
            }
        }
        Ok(())
    }

    /// Process any trailing partial line and return the assembled text.
    pub fn finish(
        mut self,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, TransportError> {
        if !self.done && !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.process_line(&rest, on_chunk)?;
        }
        debug!("Stream completed with {} chars", self.text.chars().count());
        Ok(self.text)
    }

    fn process_line(
        &mut self,
        raw: &[u8],
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> Result<(), TransportError> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        for event in (self.decode)(line)? {
            match event {
                StreamEvent::TextDelta(delta) => {
                    on_chunk(&delta);
                    self.text.push_str(&delta);
                }
                StreamEvent::Done => {
                    self.done = true;
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Drain a streaming response body through `decode`.
pub async fn read_stream(
    mut response: reqwest::Response,
    decode: LineDecoder,
    on_chunk: &mut (dyn FnMut(&str) + Send),
) -> Result<String, TransportError> {
    let mut acc = StreamAccumulator::new(decode);
    while let Some(chunk) = response.chunk().await? {
        acc.feed(&chunk, on_chunk)?;
        if acc.is_done() {
            break;
        }
    }
    acc.finish(on_chunk)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(decode: LineDecoder, chunks: &[&[u8]]) -> (Result<String, TransportError>, Vec<String>) {
        let mut seen = Vec::new();
        let mut on_chunk = |s: &str| seen.push(s.to_string());
        let mut acc = StreamAccumulator::new(decode);
        for chunk in chunks {
            if let Err(e) = acc.feed(chunk, &mut on_chunk) {
                return (Err(e), seen);
            }
        }
        let text = acc.finish(&mut on_chunk);
        (text, seen)
    }

    #[test]
    fn sse_text_deltas_until_done() {
        let body: &[u8] = b": keep-alive\n\
            data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n\
            data: {\"choices\":[{\"delta\":{\"content\":\"Hello \"}}]}\n\n\
            data: {\"choices\":[{\"delta\":{\"content\":\"world\"},\"finish_reason\":\"stop\"}]}\n\n\
            data: [DONE]\n\n\
            data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n";
        let (text, seen) = collect(parse_sse_line, &[body]);
        assert_eq!(text.unwrap(), "Hello world");
        assert_eq!(seen, vec!["Hello ", "world"]);
    }

    #[test]
    fn sse_malformed_chunks_are_skipped() {
        assert!(parse_sse_line("data: {not json").unwrap().is_empty());
        assert!(parse_sse_line("event: ping").unwrap().is_empty());
        assert_eq!(parse_sse_line("data:[DONE]").unwrap(), vec![StreamEvent::Done]);
    }

    #[test]
    fn ndjson_lines_split_across_chunks() {
        let (text, seen) = collect(
            parse_ndjson_line,
            &[
                b"{\"message\":{\"role\":\"assistant\",\"content\":\"Hi\"},\"done\":false}\n{\"message\":{\"con",
                b"tent\":\" there\"},\"done\":false}\n",
                b"{\"message\":{\"content\":\"\"},\"done\":true}\n",
            ],
        );
        assert_eq!(text.unwrap(), "Hi there");
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn ndjson_error_object_fails_the_stream() {
        let (text, _) = collect(parse_ndjson_line, &[b"{\"error\":\"model not found\"}\n"]);
        assert!(matches!(text, Err(TransportError::Decode(msg)) if msg == "model not found"));
    }

    #[test]
    fn trailing_line_without_newline_is_processed() {
        let (text, _) = collect(parse_ndjson_line, &[b"{\"message\":{\"content\":\"tail\"},\"done\":true}"]);
        assert_eq!(text.unwrap(), "tail");
    }

    #[test]
    fn multibyte_characters_split_across_chunks() {
        let line = "{\"message\":{\"content\":\"привет\"},\"done\":true}\n".as_bytes();
        let (first, second) = line.split_at(26);
        let (text, _) = collect(parse_ndjson_line, &[first, second]);
        assert_eq!(text.unwrap(), "привет");
    }
}
