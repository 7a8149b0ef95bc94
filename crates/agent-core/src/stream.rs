//! Streamed Completion Accumulation
//!
//! Reduces a [`CompletionStream`] to the same [`Completion`] shape a whole
//! response has, so the conversation loop never sees partial output.
//!
//! ```text
//! Text("Let me ")  Text("check")     ─►  content = "Let me check"
//! ToolCallStart{a, meetings}
//! ToolCallArguments{a, "{\"user\":"}
//! ToolCallArguments{a, "\"miki\"}"}  ─►  a: {"user":"miki"}
//! ToolCallEnd{a}                     ─►  a finalized (dispatch eligible)
//! Done                               ─►  every open call finalized
//! ```

use std::collections::HashMap;

use futures::StreamExt;

use crate::error::{AgentError, Result};
use crate::provider::{Completion, CompletionStream, FinishReason, StreamDelta, TokenUsage};
use crate::tool::ToolCall;

/// A tool call under construction
#[derive(Debug)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
    finalized: Option<ToolCall>,
}

impl PendingCall {
    fn finalize(&mut self) -> Result<()> {
        if self.finalized.is_none() {
            let call = ToolCall::from_raw_arguments(&self.id, &self.name, &self.arguments)?;
            self.finalized = Some(call);
        }
        Ok(())
    }
}

/// Finite accumulator for streamed deltas.
///
/// Text fragments concatenate in arrival order. Argument fragments
/// concatenate per call id; a call is only turned into a [`ToolCall`] once
/// its end marker, the end of the turn, or the end of the stream is seen.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    calls: Vec<PendingCall>,
    index: HashMap<String, usize>,
    usage: Option<TokenUsage>,
    finish_reason: Option<FinishReason>,
    done: bool,
    discarded: usize,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the provider has signalled the end of the turn
    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one delta
    pub fn apply(&mut self, delta: StreamDelta) -> Result<()> {
        if self.done {
            self.discarded += 1;
            tracing::trace!(?delta, "Discarding delta after end of turn");
            return Ok(());
        }

        match delta {
            StreamDelta::Text(fragment) => self.text.push_str(&fragment),
            StreamDelta::ToolCallStart { id, name } => {
                if self.index.contains_key(&id) {
                    return Err(AgentError::Provider(format!(
                        "tool call {id:?} started twice"
                    )));
                }
                tracing::debug!(%id, %name, "Tool call started in stream");
                self.index.insert(id.clone(), self.calls.len());
                self.calls.push(PendingCall {
                    id,
                    name,
                    arguments: String::new(),
                    finalized: None,
                });
            }
            StreamDelta::ToolCallArguments { id, fragment } => {
                let call = self.pending_mut(&id)?;
                if call.finalized.is_some() {
                    return Err(AgentError::Provider(format!(
                        "argument fragment for already completed tool call {id:?}"
                    )));
                }
                call.arguments.push_str(&fragment);
            }
            StreamDelta::ToolCallEnd { id } => {
                let call = self.pending_mut(&id)?;
                if call.finalized.is_some() {
                    return Err(AgentError::Provider(format!(
                        "tool call {id:?} completed twice"
                    )));
                }
                call.finalize()?;
            }
            StreamDelta::Usage(usage) => self.usage = Some(usage),
            StreamDelta::Done { finish_reason } => {
                self.finalize_all()?;
                self.finish_reason = finish_reason;
                self.done = true;
            }
        }

        Ok(())
    }

    fn pending_mut(&mut self, id: &str) -> Result<&mut PendingCall> {
        let idx = *self.index.get(id).ok_or_else(|| {
            AgentError::Provider(format!("delta for unknown tool call {id:?}"))
        })?;
        Ok(&mut self.calls[idx])
    }

    fn finalize_all(&mut self) -> Result<()> {
        self.calls.iter_mut().try_for_each(PendingCall::finalize)
    }

    /// Close the turn and produce the reduced completion
    pub fn finish(mut self, model: impl Into<String>) -> Result<Completion> {
        self.finalize_all()?;

        let tool_calls: Vec<ToolCall> = self
            .calls
            .into_iter()
            .filter_map(|c| c.finalized)
            .collect();

        let finish_reason = self.finish_reason.or(if tool_calls.is_empty() {
            Some(FinishReason::Stop)
        } else {
            Some(FinishReason::ToolUse)
        });

        if self.discarded > 0 {
            tracing::debug!(discarded = self.discarded, "Drained deltas after end of turn");
        }

        Ok(Completion {
            content: self.text,
            tool_calls,
            model: model.into(),
            usage: self.usage,
            finish_reason,
        })
    }
}

/// Consume a stream to its end and reduce it to a [`Completion`].
///
/// The stream is always drained completely before returning, even after the
/// provider has signalled the end of the turn. Errors arriving after that
/// point are logged and ignored since the turn is already complete.
pub async fn collect(mut stream: CompletionStream, model: &str) -> Result<Completion> {
    let mut acc = StreamAccumulator::new();

    while let Some(item) = stream.next().await {
        match item {
            Ok(delta) => acc.apply(delta)?,
            Err(e) if acc.is_done() => {
                tracing::warn!(error = %e, "Stream error after end of turn ignored");
            }
            Err(e) => return Err(e),
        }
    }

    acc.finish(model)
}

/// Expand a whole completion into the deltas a streaming provider would emit.
///
/// Useful for providers without native streaming and for tests.
pub fn completion_to_deltas(completion: &Completion) -> Vec<StreamDelta> {
    let mut deltas = Vec::new();
    if !completion.content.is_empty() {
        deltas.push(StreamDelta::Text(completion.content.clone()));
    }
    for call in &completion.tool_calls {
        deltas.push(StreamDelta::ToolCallStart {
            id: call.id.clone(),
            name: call.name.clone(),
        });
        deltas.push(StreamDelta::ToolCallArguments {
            id: call.id.clone(),
            fragment: call.arguments.to_string(),
        });
        deltas.push(StreamDelta::ToolCallEnd {
            id: call.id.clone(),
        });
    }
    if let Some(usage) = completion.usage {
        deltas.push(StreamDelta::Usage(usage));
    }
    deltas.push(StreamDelta::Done {
        finish_reason: completion.finish_reason,
    });
    deltas
}
