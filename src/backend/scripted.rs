//! Deterministic backend driven by prompt markers.
//!
//! Each rule pairs a marker substring with a queue of replies. The first rule
//! whose marker occurs in the prompt answers; its last reply repeats once the
//! queue is drained. Every prompt is recorded so callers can count calls.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use super::{ModelBackend, ModelOutput, TokenStream, lenient};
use crate::error::PipelineError;

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail(String),
}

#[derive(Debug)]
struct Rule {
    marker: String,
    replies: Mutex<VecDeque<Reply>>,
}

#[derive(Debug)]
pub struct ScriptedBackend {
    rules: Vec<Rule>,
    calls: Mutex<Vec<String>>,
    chunk_size: usize,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            calls: Mutex::new(Vec::new()),
            chunk_size: 16,
        }
    }

    /// Answer prompts containing `marker` with `reply`.
    pub fn on(self, marker: &str, reply: impl Into<String>) -> Self {
        self.push_rule(marker, vec![Reply::Text(reply.into())])
    }

    /// Answer successive matching prompts with successive replies.
    pub fn on_sequence(self, marker: &str, replies: Vec<String>) -> Self {
        self.push_rule(marker, replies.into_iter().map(Reply::Text).collect())
    }

    /// Fail prompts containing `marker` with an upstream error.
    pub fn fail_on(self, marker: &str, message: &str) -> Self {
        self.push_rule(marker, vec![Reply::Fail(message.to_string())])
    }

    /// Chunk size used when streaming a text reply.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    fn push_rule(mut self, marker: &str, replies: Vec<Reply>) -> Self {
        self.rules.push(Rule {
            marker: marker.to_string(),
            replies: Mutex::new(replies.into()),
        });
        self
    }

    /// Every prompt received, in order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn calls_matching(&self, marker: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|p| p.contains(marker))
            .count()
    }

    fn reply_for(&self, prompt: &str) -> Reply {
        lock(&self.calls).push(prompt.to_string());
        let Some(rule) = self.rules.iter().find(|r| prompt.contains(&r.marker)) else {
            return Reply::Fail("no scripted reply for prompt".to_string());
        };
        let mut queue = lock(&rule.replies);
        match queue.len() {
            0 => Reply::Fail("scripted replies exhausted".to_string()),
            1 => queue[0].clone(),
            _ => queue
                .pop_front()
                .unwrap_or_else(|| Reply::Fail("scripted replies exhausted".to_string())),
        }
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn invoke(&self, prompt: &str, schema: Option<&Value>) -> Result<ModelOutput> {
        match self.reply_for(prompt) {
            Reply::Fail(message) => anyhow::bail!(PipelineError::upstream(message)),
            Reply::Text(text) => match schema {
                Some(_) => lenient::extract_json(&text)
                    .map(ModelOutput::Object)
                    .ok_or_else(|| PipelineError::upstream("scripted reply is not JSON").into()),
                None => Ok(ModelOutput::Text(text)),
            },
        }
    }

    async fn stream(&self, prompt: &str) -> Result<TokenStream> {
        match self.reply_for(prompt) {
            Reply::Fail(message) => anyhow::bail!(PipelineError::upstream(message)),
            Reply::Text(text) => {
                let chunks: Vec<Result<String>> = chunk_text(&text, self.chunk_size)
                    .into_iter()
                    .map(Ok)
                    .collect();
                Ok(Box::pin(futures::stream::iter(chunks)))
            }
        }
    }
}

/// Split on char boundaries into pieces of at most `size` chars.
fn chunk_text(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_sequence_then_repeat_last() {
        let backend =
            ScriptedBackend::new().on_sequence("[x]", vec!["one".to_string(), "two".to_string()]);
        let a = backend.invoke("[x]", None).await.unwrap().into_text();
        let b = backend.invoke("[x]", None).await.unwrap().into_text();
        let c = backend.invoke("[x]", None).await.unwrap().into_text();
        assert_eq!((a.as_str(), b.as_str(), c.as_str()), ("one", "two", "two"));
        assert_eq!(backend.calls_matching("[x]"), 3);
    }

    #[tokio::test]
    async fn test_unmatched_prompt_fails() {
        let backend = ScriptedBackend::new();
        assert!(backend.invoke("anything", None).await.is_err());
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_stream_preserves_order() {
        let backend = ScriptedBackend::new().on("[s]", "héllo wörld").with_chunk_size(3);
        let stream = backend.stream("[s]").await.unwrap();
        let parts: Vec<String> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(parts.concat(), "héllo wörld");
        assert_eq!(parts[0], "hél");
    }
}
