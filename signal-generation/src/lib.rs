// Signal Generation (Layer 2)
// Turns the stored kline window into a directional trade signal

pub mod features;
pub mod pipeline;
pub mod predictors;
pub mod signals;
pub mod storage;

pub use features::{FeatureFrame, FeaturePipeline, KlineFeatures};
pub use pipeline::{GeneratorConfig, SignalGenerator, Stage};
pub use predictors::{
    load_models, AlgorithmKind, LinearPredictor, ModelFile, Predictor, PredictorRegistry,
    RegisteredPredictor, ScoreGroup,
};
pub use signals::{aggregate, mean_ignoring_nan, normalize, AggregatedScore, PredictorScore};
pub use storage::{InMemorySignalStore, SignalStore};
