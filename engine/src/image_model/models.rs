//! Models known to work well for text-to-image, with the extra input they need.

use serde_json::{Map, Value};

pub const DEFAULT_MODEL: &str = "black-forest-labs/flux-schnell";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    /// Input parameters besides the prompt
    pub defaults: &'static [(&'static str, &'static str)],
}

pub static SUPPORTED: &[ModelInfo] = &[
    ModelInfo {
        id: "black-forest-labs/flux-schnell",
        name: "FLUX Schnell",
        description: "Fast, high-quality generations. Great default choice.",
        defaults: &[("output_format", "webp")],
    },
    ModelInfo {
        id: "black-forest-labs/flux-1.1-pro",
        name: "FLUX 1.1 Pro",
        description: "Higher quality than Schnell, slower. Best for final outputs.",
        defaults: &[("output_format", "webp")],
    },
    ModelInfo {
        id: "stability-ai/sdxl",
        name: "Stable Diffusion XL",
        description: "Classic model with wide style range and community support.",
        defaults: &[],
    },
    ModelInfo {
        id: "google/nano-banana-pro",
        name: "Nano Banana Pro",
        description: "Excellent for text rendering, diagrams, and technical illustrations.",
        defaults: &[("aspect_ratio", "1:1")],
    },
];

/// Looks up a model; a pinned version (`owner/name:version`) resolves to its base model.
pub fn get(id: &str) -> Option<&'static ModelInfo> {
    let base = id.split_once(':').map_or(id, |(base, _)| base);
    SUPPORTED.iter().find(|m| m.id == base)
}

pub fn is_supported(id: &str) -> bool {
    get(id).is_some()
}

pub fn list() -> impl Iterator<Item = &'static str> {
    SUPPORTED.iter().map(|m| m.id)
}

/// Prediction input: the model's defaults, with the prompt on top.
pub fn prediction_input(model: &str, prompt: &str) -> Value {
    let mut input = Map::new();
    if let Some(info) = get(model) {
        for (key, value) in info.defaults {
            input.insert(key.to_string(), Value::from(*value));
        }
    }
    input.insert("prompt".into(), Value::from(prompt));
    Value::Object(input)
}
