//! Server-sent event decoding for streamed chat completions.
//!
//! The wire keys tool-call fragments by position (`index`); the decoder maps
//! each index to the call id announced in its first fragment and emits
//! id-keyed [`StreamDelta`]s.

use std::fmt::Display;

use agent_core::error::{AgentError, Result};
use agent_core::provider::{CompletionStream, FinishReason, StreamDelta};
use futures::{Stream, StreamExt};

use super::types::StreamChunk;
use super::{convert_finish_reason, convert_usage, generate_call_id};

/// Upper bound on a single buffered event
const MAX_EVENT_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug)]
struct OpenCall {
    index: u32,
    id: String,
    ended: bool,
}

/// Incremental SSE decoder for one response body
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
    calls: Vec<OpenCall>,
    finish_reason: Option<FinishReason>,
    done: bool,
}

impl SseDecoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Whether `data: [DONE]` has been seen
    pub(crate) const fn is_done(&self) -> bool {
        self.done
    }

    /// Feed raw body bytes, returning the deltas of every complete event.
    ///
    /// Bytes are only decoded once a whole event is buffered, so multi-byte
    /// characters split across network chunks are handled.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<Result<StreamDelta>> {
        if self.done {
            return Vec::new();
        }

        self.buffer.extend(bytes.iter().copied().filter(|b| *b != b'\r'));

        let mut out = Vec::new();
        while let Some(pos) = find_boundary(&self.buffer) {
            let event: Vec<u8> = self.buffer.drain(..pos + 2).take(pos).collect();
            if let Err(e) = self.decode_event(&event, &mut out) {
                out.push(Err(e));
                return out;
            }
            if self.done {
                self.buffer.clear();
                return out;
            }
        }

        if self.buffer.len() > MAX_EVENT_BYTES {
            self.buffer.clear();
            out.push(Err(AgentError::Provider(format!(
                "stream event exceeds {MAX_EVENT_BYTES} bytes"
            ))));
        }
        out
    }

    /// The body ended. Flushes a trailing event and closes the turn if the
    /// server never sent `[DONE]`.
    pub(crate) fn finish(&mut self) -> Vec<Result<StreamDelta>> {
        let mut out = Vec::new();
        if self.done {
            return out;
        }

        let rest = std::mem::take(&mut self.buffer);
        if !rest.iter().all(u8::is_ascii_whitespace) {
            if let Err(e) = self.decode_event(&rest, &mut out) {
                out.push(Err(e));
                return out;
            }
        }

        if !self.done {
            self.close(&mut out);
        }
        out
    }

    fn decode_event(&mut self, event: &[u8], out: &mut Vec<Result<StreamDelta>>) -> Result<()> {
        let text = std::str::from_utf8(event)
            .map_err(|e| AgentError::Provider(format!("stream event is not UTF-8: {e}")))?;

        let data = event_data(text);
        let Some(data) = data else {
            return Ok(());
        };

        if data.trim() == "[DONE]" {
            self.close(out);
            return Ok(());
        }

        let chunk: StreamChunk = serde_json::from_str(&data)
            .map_err(|e| AgentError::Provider(format!("malformed stream chunk: {e}")))?;
        self.apply_chunk(chunk, out)
    }

    fn apply_chunk(&mut self, chunk: StreamChunk, out: &mut Vec<Result<StreamDelta>>) -> Result<()> {
        for choice in chunk.choices {
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                out.push(Ok(StreamDelta::Text(text)));
            }

            for fragment in choice.delta.tool_calls.unwrap_or_default() {
                let (name, arguments) = fragment
                    .function
                    .map(|f| (f.name, f.arguments))
                    .unwrap_or_default();

                let id = match self.calls.iter().find(|c| c.index == fragment.index) {
                    Some(call) if call.ended => {
                        return Err(AgentError::Provider(format!(
                            "fragment for finished tool call at index {}",
                            fragment.index
                        )));
                    }
                    Some(call) => call.id.clone(),
                    None => {
                        let name = name.filter(|n| !n.is_empty()).ok_or_else(|| {
                            AgentError::Provider(format!(
                                "tool call at index {} started without a name",
                                fragment.index
                            ))
                        })?;
                        let id = fragment.id.filter(|i| !i.is_empty()).unwrap_or_else(generate_call_id);
                        self.calls.push(OpenCall {
                            index: fragment.index,
                            id: id.clone(),
                            ended: false,
                        });
                        out.push(Ok(StreamDelta::ToolCallStart { id: id.clone(), name }));
                        id
                    }
                };

                if let Some(fragment) = arguments.filter(|a| !a.is_empty()) {
                    out.push(Ok(StreamDelta::ToolCallArguments { id, fragment }));
                }
            }

            if let Some(reason) = choice.finish_reason {
                self.finish_reason = convert_finish_reason(&reason);
                self.end_open_calls(out);
            }
        }

        if let Some(usage) = chunk.usage {
            out.push(Ok(StreamDelta::Usage(convert_usage(usage))));
        }
        Ok(())
    }

    fn end_open_calls(&mut self, out: &mut Vec<Result<StreamDelta>>) {
        for call in self.calls.iter_mut().filter(|c| !c.ended) {
            call.ended = true;
            out.push(Ok(StreamDelta::ToolCallEnd { id: call.id.clone() }));
        }
    }

    fn close(&mut self, out: &mut Vec<Result<StreamDelta>>) {
        self.end_open_calls(out);
        self.done = true;
        out.push(Ok(StreamDelta::Done {
            finish_reason: self.finish_reason,
        }));
    }
}

fn find_boundary(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

/// Joined `data:` lines of one event; `None` for comment-only events
fn event_data(event: &str) -> Option<String> {
    let mut lines = event
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .peekable();

    lines.peek()?;
    Some(lines.collect::<Vec<_>>().join("\n"))
}

/// Turn an SSE body into a [`CompletionStream`].
pub(crate) fn decode_body<S, B, E>(body: S) -> CompletionStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = (Box::pin(body), SseDecoder::new(), false);

    let stream = futures::stream::unfold(state, |(mut body, mut decoder, ended)| async move {
        if ended {
            return None;
        }

        match body.next().await {
            Some(Ok(bytes)) => {
                let items = decoder.push(bytes.as_ref());
                let ended = decoder.is_done() || items.iter().any(Result::is_err);
                Some((items, (body, decoder, ended)))
            }
            Some(Err(e)) => {
                let item = Err(AgentError::ProviderUnavailable(format!("stream interrupted: {e}")));
                Some((vec![item], (body, decoder, true)))
            }
            None => {
                let items = decoder.finish();
                Some((items, (body, decoder, true)))
            }
        }
    })
    .flat_map(futures::stream::iter);

    Box::pin(stream)
}
