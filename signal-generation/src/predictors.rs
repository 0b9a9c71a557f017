// Predictor Registry
// Named score models, grouped by algorithm family and predicted label

use crate::features::FeatureFrame;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Algorithm family a predictor belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    GradientBoosted,
    Neural,
    /// Linear or logistic regression
    Linear,
}

impl AlgorithmKind {
    /// Short tag used in score names
    pub fn tag(&self) -> &'static str {
        match self {
            AlgorithmKind::GradientBoosted => "gb",
            AlgorithmKind::Neural => "nn",
            AlgorithmKind::Linear => "lc",
        }
    }
}

impl std::fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Which side of the aggregate a score contributes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreGroup {
    /// Label predicts an upward move
    High,
    /// Label predicts a downward move
    Low,
    /// Scored, but not part of the aggregate
    Ungrouped,
}

impl ScoreGroup {
    /// Labels containing `high_` are upward, `low_` downward
    pub fn from_label(label: &str) -> Self {
        if label.contains("high_") {
            ScoreGroup::High
        } else if label.contains("low_") {
            ScoreGroup::Low
        } else {
            ScoreGroup::Ungrouped
        }
    }
}

/// Score model contract
///
/// `predict` returns the score for the last row of the frame. NaN means the
/// model has no opinion (e.g. not enough history); errors abort the cycle.
pub trait Predictor: Send + Sync {
    fn predict(&self, frame: &FeatureFrame) -> Result<f64>;
}

/// Weighted sum over named features with an optional logistic link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearPredictor {
    pub features: Vec<String>,
    pub weights: Vec<f64>,
    #[serde(default)]
    pub intercept: f64,
    #[serde(default)]
    pub logistic: bool,
}

impl LinearPredictor {
    pub fn new(features: Vec<String>, weights: Vec<f64>, intercept: f64, logistic: bool) -> Result<Self> {
        let predictor = Self {
            features,
            weights,
            intercept,
            logistic,
        };
        predictor.check()?;
        Ok(predictor)
    }

    fn check(&self) -> Result<()> {
        if self.features.len() != self.weights.len() {
            bail!(
                "{} features but {} weights",
                self.features.len(),
                self.weights.len()
            );
        }
        Ok(())
    }
}

impl Predictor for LinearPredictor {
    fn predict(&self, frame: &FeatureFrame) -> Result<f64> {
        let mut sum = self.intercept;
        for (name, weight) in self.features.iter().zip(&self.weights) {
            let value = frame.last_value(name)?;
            if value.is_nan() {
                return Ok(f64::NAN);
            }
            sum += weight * value;
        }

        if self.logistic {
            Ok(1.0 / (1.0 + (-sum).exp()))
        } else {
            Ok(sum)
        }
    }
}

/// One registered model
pub struct RegisteredPredictor {
    pub label: String,
    pub kind: AlgorithmKind,
    pub group: ScoreGroup,
    predictor: Box<dyn Predictor>,
}

impl RegisteredPredictor {
    /// Score name, e.g. `high_10_lc`
    pub fn name(&self) -> String {
        format!("{}_{}", self.label, self.kind.tag())
    }

    pub fn predict(&self, frame: &FeatureFrame) -> Result<f64> {
        self.predictor.predict(frame)
    }
}

impl std::fmt::Debug for RegisteredPredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredPredictor")
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("group", &self.group)
            .finish()
    }
}

/// Explicitly registered predictors, one per `(label, kind)`
#[derive(Debug, Default)]
pub struct PredictorRegistry {
    predictors: Vec<RegisteredPredictor>,
}

impl PredictorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a predictor for a label and algorithm family
    pub fn register(&mut self, label: &str, kind: AlgorithmKind, predictor: Box<dyn Predictor>) -> Result<()> {
        if self
            .predictors
            .iter()
            .any(|p| p.label == label && p.kind == kind)
        {
            bail!("predictor {}_{} already registered", label, kind.tag());
        }

        let group = ScoreGroup::from_label(label);
        if group == ScoreGroup::Ungrouped {
            warn!("Label {} is neither high_ nor low_, its score is not aggregated", label);
        }

        self.predictors.push(RegisteredPredictor {
            label: label.to_string(),
            kind,
            group,
            predictor,
        });
        Ok(())
    }

    /// Builder-style registration
    pub fn with(mut self, label: &str, kind: AlgorithmKind, predictor: Box<dyn Predictor>) -> Result<Self> {
        self.register(label, kind, predictor)?;
        Ok(self)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredPredictor> {
        self.predictors.iter()
    }

    pub fn len(&self) -> usize {
        self.predictors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictors.is_empty()
    }
}

/// Model description file: label and family are explicit, never parsed from the file name
#[derive(Debug, Clone, Deserialize)]
pub struct ModelFile {
    pub label: String,
    pub algorithm: AlgorithmKind,
    #[serde(flatten)]
    pub linear: Option<LinearPredictor>,
}

/// Load every `*.json` model description in `folder` whose label is configured
///
/// Only the linear family has a built-in evaluator; other families have to be
/// registered by the embedding application.
pub fn load_models(folder: &Path, labels: &[String]) -> Result<PredictorRegistry> {
    let mut registry = PredictorRegistry::new();

    let mut paths: Vec<_> = std::fs::read_dir(folder)
        .with_context(|| format!("Failed to read model folder {}", folder.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().map_or(false, |ext| ext == "json"))
        .collect();
    paths.sort();

    for path in paths {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read model {}", path.display()))?;
        let model: ModelFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse model {}", path.display()))?;

        if !labels.contains(&model.label) {
            warn!("Skipping model {} for unconfigured label {}", path.display(), model.label);
            continue;
        }

        match (model.algorithm, model.linear) {
            (AlgorithmKind::Linear, Some(linear)) => {
                linear
                    .check()
                    .with_context(|| format!("Invalid linear model {}", path.display()))?;
                registry.register(&model.label, AlgorithmKind::Linear, Box::new(linear))?;
            }
            (kind, _) => bail!(
                "Model {} uses algorithm {:?} which has no built-in evaluator",
                path.display(),
                kind
            ),
        }
    }

    info!("✅ Loaded {} predictors from {}", registry.len(), folder.display());
    Ok(registry)
}
