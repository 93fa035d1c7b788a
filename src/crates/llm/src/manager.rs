//! Provider registry with runtime switching.
//!
//! Provider records are read from a JSON config file (written by the desktop
//! shell). Exactly one provider is active; requests may override the provider
//! and model for a turn, and the switch persists. Callers that cache a
//! compiled graph must rebuild it when [`ProviderManager::apply_override`]
//! reports a change.

use crate::config::RemoteLlmConfig;
use crate::error::{LlmError, Result};
use crate::openai::OpenAiCompatClient;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRecord {
    pub id: String,

    pub name: String,

    pub base_url: String,

    pub api_key: String,

    pub model_name: String,

    #[serde(default)]
    pub models: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_model: Option<String>,

    #[serde(default)]
    pub is_active: bool,
}

impl ProviderRecord {
    /// The model a new client should use.
    pub fn effective_model(&self) -> &str {
        self.active_model.as_deref().unwrap_or(&self.model_name)
    }

    fn knows_model(&self, model: &str) -> bool {
        if self.models.is_empty() {
            self.model_name == model
        } else {
            self.models.iter().any(|m| m == model)
        }
    }
}

pub struct ProviderManager {
    path: PathBuf,
    providers: RwLock<Vec<ProviderRecord>>,
}

impl ProviderManager {
    /// Load the registry from `path`; a missing file yields an empty registry.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let providers = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| LlmError::Config(format!("invalid provider config: {}", e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(LlmError::Config(e.to_string())),
        };
        Ok(Self {
            path,
            providers: RwLock::new(providers),
        })
    }

    pub async fn providers(&self) -> Vec<ProviderRecord> {
        self.providers.read().await.clone()
    }

    pub async fn active_provider(&self) -> Option<ProviderRecord> {
        self.providers
            .read()
            .await
            .iter()
            .find(|p| p.is_active)
            .cloned()
    }

    pub async fn set_active_provider(&self, provider_id: &str) -> Result<()> {
        let mut providers = self.providers.write().await;
        if !providers.iter().any(|p| p.id == provider_id) {
            return Err(LlmError::Config(format!(
                "provider '{}' not found",
                provider_id
            )));
        }
        for p in providers.iter_mut() {
            p.is_active = p.id == provider_id;
        }
        self.persist(&providers).await
    }

    pub async fn set_provider_active_model(&self, provider_id: &str, model: &str) -> Result<()> {
        let mut providers = self.providers.write().await;
        let provider = providers
            .iter_mut()
            .find(|p| p.id == provider_id)
            .ok_or_else(|| LlmError::Config(format!("provider '{}' not found", provider_id)))?;
        if !provider.knows_model(model) {
            return Err(LlmError::Config(format!(
                "model '{}' not found in provider '{}'",
                model, provider_id
            )));
        }
        provider.active_model = Some(model.to_string());
        self.persist(&providers).await
    }

    /// Apply a per-request provider/model override.
    ///
    /// Returns `true` when something actually changed — the signal for the
    /// caller to invalidate its cached graph runtime. Unknown providers or
    /// models are logged and ignored, matching the request-level semantics:
    /// a bad override falls back to the current configuration.
    pub async fn apply_override(
        &self,
        provider_id: Option<&str>,
        model: Option<&str>,
    ) -> Result<bool> {
        if provider_id.is_none() && model.is_none() {
            return Ok(false);
        }

        let mut changed = false;
        {
            let mut providers = self.providers.write().await;

            let target_idx = match provider_id {
                Some(id) => match providers.iter().position(|p| p.id == id) {
                    Some(idx) => idx,
                    None => {
                        warn!(provider_id = id, "requested provider not found");
                        return Ok(false);
                    }
                },
                None => match providers.iter().position(|p| p.is_active) {
                    Some(idx) => idx,
                    None => return Ok(false),
                },
            };

            if let Some(model) = model {
                if !providers[target_idx].knows_model(model) {
                    warn!(model, "requested model not found in provider");
                    return Ok(false);
                }
            }

            if !providers[target_idx].is_active {
                let target_id = providers[target_idx].id.clone();
                for p in providers.iter_mut() {
                    p.is_active = p.id == target_id;
                }
                changed = true;
            }

            if let Some(model) = model {
                if providers[target_idx].effective_model() != model {
                    providers[target_idx].active_model = Some(model.to_string());
                    changed = true;
                }
            }

            if changed {
                let active = &providers[target_idx];
                info!(
                    provider = %active.name,
                    model = %active.effective_model(),
                    "provider switched via request override"
                );
                self.persist(&providers).await?;
            }
        }
        Ok(changed)
    }

    /// Build a client for the active provider.
    pub async fn build_client(&self) -> Result<OpenAiCompatClient> {
        let provider = self
            .active_provider()
            .await
            .ok_or_else(|| LlmError::Config("no active LLM provider configured".to_string()))?;
        OpenAiCompatClient::new(RemoteLlmConfig::new(
            provider.base_url.clone(),
            provider.api_key.clone(),
            provider.effective_model(),
        ))
    }

    async fn persist(&self, providers: &[ProviderRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LlmError::Config(e.to_string()))?;
        }
        let bytes = serde_json::to_vec_pretty(providers)
            .map_err(|e| LlmError::Config(e.to_string()))?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| LlmError::Config(e.to_string()))
    }
}
