//! Model backend seam.
//!
//! The pipeline only ever talks to [`ModelBackend`]. Responses are untrusted:
//! [`request`] decodes strictly and reports `UPSTREAM_MODEL_ERROR`, while
//! [`request_or`] is the parse-with-default combinator used by every
//! enrichment step.

pub mod anthropic;
pub mod lenient;
pub mod offline;
pub mod scripted;
pub mod stream;

use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::pin::Pin;
use tracing::{debug, warn};

use crate::error::{Phase, PipelineError};

/// Ordered text chunks of a streamed completion.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Output of a single invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    Text(String),
    /// Already-parsed JSON, returned when a schema was supplied.
    Object(Value),
}

impl ModelOutput {
    /// Best-effort JSON view of the output.
    pub fn into_json(self) -> Option<Value> {
        match self {
            Self::Object(v) => Some(v),
            Self::Text(t) => lenient::extract_json(&t),
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Text(t) => t,
            Self::Object(v) => v.to_string(),
        }
    }
}

#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Short backend name for logs and doctor output.
    fn name(&self) -> &'static str;

    /// Single completion. With `schema`, implementations return
    /// [`ModelOutput::Object`] or fail.
    async fn invoke(&self, prompt: &str, schema: Option<&Value>) -> Result<ModelOutput>;

    /// Streamed completion; chunks arrive in order.
    async fn stream(&self, prompt: &str) -> Result<TokenStream>;
}

/// JSON schema for `T`, as sent alongside a prompt.
pub fn schema_of<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null)
}

/// Invoke with `T`'s schema and decode. Any failure is an upstream error
/// tagged with `phase`.
pub async fn request<T>(backend: &dyn ModelBackend, prompt: &str, phase: Phase) -> Result<T>
where
    T: DeserializeOwned + JsonSchema,
{
    let schema = schema_of::<T>();
    let schema = (!schema.is_null()).then_some(schema);
    let output = backend
        .invoke(prompt, schema.as_ref())
        .await
        .map_err(|e| PipelineError::upstream(e.to_string()).in_phase(phase))?;

    let value = output.into_json().ok_or_else(|| {
        PipelineError::upstream("model response contained no JSON").in_phase(phase)
    })?;

    let decoded = serde_json::from_value::<T>(value).map_err(|e| {
        PipelineError::upstream(format!("model response did not match schema: {e}"))
            .in_phase(phase)
    })?;
    debug!(backend = backend.name(), %phase, "model response decoded");
    Ok(decoded)
}

/// Parse-with-default: like [`request`], but any failure is logged and
/// replaced by `fallback()`.
pub async fn request_or<T, F>(backend: &dyn ModelBackend, prompt: &str, phase: Phase, fallback: F) -> T
where
    T: DeserializeOwned + JsonSchema,
    F: FnOnce() -> T,
{
    match request::<T>(backend, prompt, phase).await {
        Ok(value) => value,
        Err(e) => {
            warn!(%phase, error = %e, "model step failed, falling back to default");
            fallback()
        }
    }
}
