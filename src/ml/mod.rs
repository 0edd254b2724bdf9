pub mod preprocess;
pub mod feature_extractor;
pub mod label_map;
pub mod ml_model;
pub mod training;
pub mod evaluation;
pub mod pipeline;
pub mod inference;

#[cfg(test)]
pub(crate) mod testing;

pub use preprocess::{ImageTransform, PixelTensor};
pub use feature_extractor::{FeatureExtractor, TensorFlowExtractor};
pub use label_map::LabelMap;
pub use ml_model::MaxEntClassifier;
pub use training::{train_classifier, TrainingReport};
pub use evaluation::MulticlassMetrics;
pub use pipeline::{FittedPipeline, ImagePipeline};
pub use inference::InferenceEngine;
