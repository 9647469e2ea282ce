//! Request and response types for the Ollama and OpenAI surfaces.

use crate::backend::ChatMessage;
use crate::dispatch::AvailableModel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Size reported for every model in `/api/tags`.
pub const MODEL_SIZE: u64 = 270_898_672;

/// Digest reported for every model in `/api/tags`.
pub const MODEL_DIGEST: &str = "9077fe9d2ae1a4a41a868836b56b8163731a8fe16621397028c2c76f838c6907";

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub app: &'static str,
    pub version: &'static str,
}

// ============================================================================
// OpenAI
// ============================================================================

#[derive(Serialize)]
pub struct ModelsResponse {
    pub object: &'static str,
    pub data: Vec<ModelInfo>,
}

#[derive(Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub owned_by: &'static str,
}

#[derive(Deserialize)]
pub struct OpenAiChatRequest {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: Option<bool>,
}

impl OpenAiChatRequest {
    pub fn wants_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

// ============================================================================
// Ollama
// ============================================================================

#[derive(Serialize)]
pub struct TagsResponse {
    pub models: Vec<OllamaModel>,
}

#[derive(Serialize)]
pub struct OllamaModel {
    pub name: String,
    pub model: String,
    pub modified_at: String,
    pub size: u64,
    pub digest: &'static str,
    pub details: ModelDetails,
}

impl OllamaModel {
    pub fn new(model: &AvailableModel, modified_at: &str) -> Self {
        Self {
            name: model.name.clone(),
            model: model.name.clone(),
            modified_at: modified_at.to_string(),
            size: MODEL_SIZE,
            digest: MODEL_DIGEST,
            details: ModelDetails::for_family(model.family),
        }
    }
}

#[derive(Serialize)]
pub struct ModelDetails {
    pub parent_model: &'static str,
    pub format: &'static str,
    pub family: &'static str,
    pub families: Vec<&'static str>,
    pub parameter_size: &'static str,
    pub quantization_level: &'static str,
}

impl ModelDetails {
    pub fn for_family(family: &'static str) -> Self {
        Self {
            parent_model: "",
            format: "gguf",
            family,
            families: vec![family],
            parameter_size: "varies",
            quantization_level: "Q4_K_M",
        }
    }
}

#[derive(Deserialize)]
pub struct ShowRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Serialize)]
pub struct ShowResponse {
    pub modelfile: String,
    pub parameters: String,
    pub template: String,
    pub details: ModelDetails,
    pub model_info: BTreeMap<String, serde_json::Value>,
}

impl ShowResponse {
    pub fn new(model: &AvailableModel) -> Self {
        let mut model_info = BTreeMap::new();
        model_info.insert(
            "general.architecture".to_string(),
            serde_json::Value::from(model.family),
        );
        model_info.insert(
            "general.basename".to_string(),
            serde_json::Value::from(model.id.clone()),
        );
        if let Some(ctx) = model.context_length {
            model_info.insert("general.context_length".to_string(), serde_json::Value::from(ctx));
        }

        Self {
            modelfile: format!("FROM {}", model.id),
            parameters: String::new(),
            template: String::new(),
            details: ModelDetails::for_family(model.family),
            model_info,
        }
    }
}

#[derive(Deserialize)]
pub struct OllamaChatRequest {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: Option<bool>,
}

impl OllamaChatRequest {
    /// Ollama clients often omit `stream` and expect a stream.
    pub fn wants_stream(&self) -> bool {
        self.stream.unwrap_or(true)
    }
}
