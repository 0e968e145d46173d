use std::path::Path;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::common::{KeypointSet, Prediction, Window};
use crate::error::PipelineError;

/// Maps a feature input to its top label and confidence. Implemented for
/// `KeypointSet` (static mode) and `Window` (dynamic mode).
#[async_trait]
pub trait GestureClassifier<I>: Send + Sync {
    async fn classify(&self, input: &I) -> Result<Prediction, PipelineError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TemplateModel {
    #[serde(default = "default_temperature")]
    temperature: f32,
    templates: Vec<Template>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Template {
    label: String,
    features: Vec<f32>,
}

fn default_temperature() -> f32 {
    1.0
}

/// Nearest-template classifier loaded from JSON.
///
/// Each label scores the distance to its closest template; the scores are
/// turned into probabilities with a softmax over `-distance / temperature`.
/// The same model format serves both modes, only the feature length differs
/// (63 for a keypoint set, 63 x window length for a window).
#[derive(Debug, Clone)]
pub struct TemplateClassifier {
    labels: Vec<String>,
    templates: Vec<(usize, Vec<f32>)>,
    feature_len: usize,
    temperature: f32,
}

impl TemplateClassifier {
    pub fn from_path(path: &Path) -> Result<Self, PipelineError> {
        let bytes = std::fs::read(path).map_err(|e| {
            PipelineError::Model(format!("failed to read model '{}': {}", path.display(), e))
        })?;
        Self::from_json(&bytes)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, PipelineError> {
        let model: TemplateModel =
            serde_json::from_slice(bytes).map_err(|e| PipelineError::Model(e.to_string()))?;
        Self::from_model(model)
    }

    fn from_model(model: TemplateModel) -> Result<Self, PipelineError> {
        if !(model.temperature > 0.0) {
            return Err(PipelineError::Model(
                "temperature must be greater than 0".to_string(),
            ));
        }
        let feature_len = model
            .templates
            .first()
            .map(|t| t.features.len())
            .ok_or_else(|| PipelineError::Model("model has no templates".to_string()))?;
        if feature_len == 0 {
            return Err(PipelineError::Model("templates have no features".to_string()));
        }

        let mut label_index: IndexMap<String, usize> = IndexMap::new();
        let mut templates = Vec::with_capacity(model.templates.len());
        for template in model.templates {
            if template.features.len() != feature_len {
                return Err(PipelineError::Model(format!(
                    "template '{}' has {} features, expected {}",
                    template.label,
                    template.features.len(),
                    feature_len
                )));
            }
            let next = label_index.len();
            let index = *label_index.entry(template.label).or_insert(next);
            templates.push((index, template.features));
        }

        Ok(Self {
            labels: label_index.into_keys().collect(),
            templates,
            feature_len,
            temperature: model.temperature,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn feature_len(&self) -> usize {
        self.feature_len
    }

    /// Probability per label, in label order.
    pub fn probabilities(&self, features: &[f32]) -> Result<Vec<f32>, PipelineError> {
        if features.len() != self.feature_len {
            return Err(PipelineError::Classification(format!(
                "expected {} features, got {}",
                self.feature_len,
                features.len()
            )));
        }

        let mut nearest = vec![f32::INFINITY; self.labels.len()];
        for (label, template) in &self.templates {
            let distance = features
                .iter()
                .zip(template)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f32>()
                .sqrt();
            nearest[*label] = nearest[*label].min(distance);
        }

        let logits: Vec<f32> = nearest.iter().map(|d| -d / self.temperature).collect();
        Ok(softmax(&logits))
    }

    fn predict(&self, features: &[f32]) -> Result<Prediction, PipelineError> {
        let probabilities = self.probabilities(features)?;
        Prediction::argmax(&self.labels, &probabilities)
            .ok_or_else(|| PipelineError::Classification("no labels to choose from".to_string()))
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    // Numerically stable softmax over logits
    if logits.is_empty() {
        return vec![];
    }
    let max_logit = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    let mut exps = Vec::with_capacity(logits.len());
    for &l in logits {
        let e = (l - max_logit).exp();
        sum += e;
        exps.push(e);
    }
    if sum <= 0.0 || !sum.is_finite() {
        // fallback to uniform
        let n = logits.len() as f32;
        return vec![1.0 / n; logits.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}

#[async_trait]
impl GestureClassifier<KeypointSet> for TemplateClassifier {
    async fn classify(&self, input: &KeypointSet) -> Result<Prediction, PipelineError> {
        self.predict(&input.flatten())
    }
}

#[async_trait]
impl GestureClassifier<Window> for TemplateClassifier {
    async fn classify(&self, input: &Window) -> Result<Prediction, PipelineError> {
        self.predict(&input.flatten())
    }
}
