//! モデル推論機能

use anyhow::Result;
use std::path::Path;

use crate::context::ClassifierContext;
use crate::ml::feature_extractor::{FeatureExtractor, TensorFlowExtractor};
use crate::ml::pipeline::FittedPipeline;
use crate::model::InferenceConfig;
use crate::types::{ImageData, ImagePrediction};

/// 推論エンジン
///
/// 学習済みパイプラインは読み取り専用なので、`&self` のまま何度でも呼び出せます。
pub struct InferenceEngine<E = TensorFlowExtractor> {
    pipeline: FittedPipeline<E>,
}

impl InferenceEngine<TensorFlowExtractor> {
    /// モデルを読み込んで推論エンジンを初期化
    ///
    /// グラフ設定はモデルのメタデータを優先し、無ければコンテキストの設定を使う。
    pub fn load<P: AsRef<Path>>(ctx: &ClassifierContext, model_path: P) -> Result<Self> {
        let model_path = model_path.as_ref();
        let config = InferenceConfig::load_from_model(model_path)?;

        let graph = match config.graph {
            Some(ref graph) => graph.clone(),
            None => {
                tracing::warn!("モデルにグラフ設定がありません。設定ファイルのグラフを使います");
                ctx.config().graph.clone()
            }
        };

        let extractor = TensorFlowExtractor::load(&graph, &config.image)?;
        Self::from_model(ctx, model_path, extractor)
    }
}

impl<E: FeatureExtractor> InferenceEngine<E> {
    pub fn new(pipeline: FittedPipeline<E>) -> Self {
        Self { pipeline }
    }

    /// 特徴抽出器を指定してモデルを読み込む
    pub fn from_model<P: AsRef<Path>>(ctx: &ClassifierContext, model_path: P, extractor: E) -> Result<Self> {
        let pipeline = FittedPipeline::load(ctx, model_path.as_ref(), extractor)?;
        Ok(Self::new(pipeline))
    }

    /// 単一画像を分類
    pub fn classify_image(&self, ctx: &ClassifierContext, image_path: &str) -> Result<ImagePrediction> {
        self.pipeline.predict(ctx, &ImageData::unlabeled(image_path))
    }

    /// 複数画像をバッチ分類
    pub fn classify_batch(&self, ctx: &ClassifierContext, image_paths: &[String]) -> Result<Vec<ImagePrediction>> {
        let mut results = Vec::with_capacity(image_paths.len());

        for path in image_paths {
            results.push(self.classify_image(ctx, path)?);
        }

        Ok(results)
    }

    pub fn pipeline(&self) -> &FittedPipeline<E> {
        &self.pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv_loader::load_dataset;
    use crate::ml::pipeline::ImagePipeline;
    use crate::ml::testing::{small_settings, write_toy_dataset, ChannelMeanExtractor};
    use crate::model::AppConfig;

    #[test]
    fn test_classify_from_saved_model() {
        let dir = tempfile::tempdir().unwrap();
        let (train, _) = write_toy_dataset(dir.path());
        let ctx = ClassifierContext::default();

        let saved = ImagePipeline::from_config(&AppConfig::default())
            .with_images_folder(dir.path())
            .with_image_settings(small_settings())
            .fit(&ctx, ChannelMeanExtractor, &load_dataset(&train).unwrap())
            .unwrap()
            .save(&dir.path().join("model.tar.gz"))
            .unwrap();

        let engine = InferenceEngine::from_model(&ctx, &saved, ChannelMeanExtractor).unwrap();

        // 絶対パスは画像フォルダに関係なく解決される
        let absolute = dir.path().join("teapot_test.png").to_string_lossy().to_string();
        let prediction = engine.classify_image(&ctx, &absolute).unwrap();
        assert_eq!(prediction.predicted_label, "teapot");

        let batch = engine
            .classify_batch(&ctx, &["toaster_test.png".to_string(), "teapot1.png".to_string()])
            .unwrap();
        let labels: Vec<&str> = batch.iter().map(|p| p.predicted_label.as_str()).collect();
        assert_eq!(labels, ["toaster", "teapot"]);
        assert_eq!(engine.pipeline().labels().len(), 2);
    }

    #[test]
    fn test_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ClassifierContext::default();
        assert!(InferenceEngine::load(&ctx, dir.path().join("nope.tar.gz")).is_err());
    }
}
