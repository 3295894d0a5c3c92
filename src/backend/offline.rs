use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::{ModelBackend, ModelOutput, TokenStream};
use crate::error::PipelineError;

/// Backend that refuses every call.
///
/// Every enrichment step then takes its documented fallback, which makes
/// analysis and ranking usable without credentials.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineBackend;

#[async_trait]
impl ModelBackend for OfflineBackend {
    fn name(&self) -> &'static str {
        "offline"
    }

    async fn invoke(&self, _prompt: &str, _schema: Option<&Value>) -> Result<ModelOutput> {
        anyhow::bail!(PipelineError::upstream("model backend disabled (offline mode)"))
    }

    async fn stream(&self, _prompt: &str) -> Result<TokenStream> {
        anyhow::bail!(PipelineError::upstream("model backend disabled (offline mode)"))
    }
}
