//! Anthropic Messages API backend.

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::{ModelBackend, ModelOutput, TokenStream, lenient};
use crate::config::ModelConfig;
use crate::error::PipelineError;

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicBackend {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl AnthropicBackend {
    /// Build from configuration. Missing credentials are a configuration
    /// error, raised here so no model call is ever attempted without them.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::configuration(format!(
                    "Missing model credentials: environment variable {} is not set",
                    config.api_key_env
                ))
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PipelineError::configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/v1/messages", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn body(&self, prompt: String, stream: bool) -> MessageRequest {
        MessageRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens.max(1),
            temperature: Some(self.temperature),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt,
            }],
            stream: stream.then_some(true),
        }
    }

    async fn post(&self, body: &MessageRequest) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() { "timed out" } else { "failed" };
                PipelineError::upstream(format!("Model request {kind}: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "model API returned an error status");
            anyhow::bail!(PipelineError::upstream(format!(
                "Model API returned {status}: {}",
                truncate(&text, 500)
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl ModelBackend for AnthropicBackend {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn invoke(&self, prompt: &str, schema: Option<&Value>) -> Result<ModelOutput> {
        let prompt = match schema {
            Some(schema) => format!(
                "{prompt}\n\nRespond with a single JSON value that conforms to this JSON Schema. \
                 Do not add commentary.\n{schema}"
            ),
            None => prompt.to_string(),
        };
        debug!(model = %self.model, prompt_len = prompt.len(), "invoke called");

        let response = self.post(&self.body(prompt, false)).await?;
        let message: MessageResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::upstream(format!("Malformed model response: {e}")))?;

        let text: String = message
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect();

        match schema {
            Some(_) => lenient::extract_json(&text)
                .map(ModelOutput::Object)
                .ok_or_else(|| PipelineError::upstream("Model output did not contain JSON").into()),
            None => Ok(ModelOutput::Text(text)),
        }
    }

    async fn stream(&self, prompt: &str) -> Result<TokenStream> {
        debug!(model = %self.model, prompt_len = prompt.len(), "stream called");
        let response = self.post(&self.body(prompt.to_string(), true)).await?;
        let mut bytes = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut decoder = SseDecoder::default();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err::<String, anyhow::Error>(
                            PipelineError::upstream(format!("Stream interrupted: {e}")).into(),
                        );
                        return;
                    }
                };
                for frame in decoder.push(&chunk) {
                    match frame {
                        SseFrame::Text(text) => yield Ok::<String, anyhow::Error>(text),
                        SseFrame::Stop => return,
                        SseFrame::Error(message) => {
                            yield Err::<String, anyhow::Error>(PipelineError::upstream(message).into());
                            return;
                        }
                        SseFrame::Skip => {}
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

// ---------------------------------------------------------------------------
// Server-sent events
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
enum SseFrame {
    Text(String),
    Stop,
    Error(String),
    Skip,
}

/// Splits a byte stream into SSE frames. Bytes are buffered until a frame
/// is complete, so a codepoint split across network chunks decodes intact.
#[derive(Default)]
struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = memchr::memmem::find(&self.buf, b"\n\n") {
            let raw: Vec<u8> = self.buf.drain(..pos + 2).collect();
            frames.push(parse_sse_frame(&String::from_utf8_lossy(&raw)));
        }
        frames
    }
}

/// Decode one SSE frame of the Messages streaming protocol.
fn parse_sse_frame(frame: &str) -> SseFrame {
    let data: String = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
        .collect::<Vec<_>>()
        .join("\n");
    if data.is_empty() {
        return SseFrame::Skip;
    }
    if data == "[DONE]" {
        return SseFrame::Stop;
    }
    let Ok(event) = serde_json::from_str::<Value>(&data) else {
        return SseFrame::Skip;
    };
    match event["type"].as_str() {
        Some("content_block_delta") => match event["delta"]["text"].as_str() {
            Some(text) => SseFrame::Text(text.to_string()),
            None => SseFrame::Skip,
        },
        Some("message_stop") => SseFrame::Stop,
        Some("error") => SseFrame::Error(
            event["error"]["message"]
                .as_str()
                .unwrap_or("stream error")
                .to_string(),
        ),
        _ => SseFrame::Skip,
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ----- Wire types -----

#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}
