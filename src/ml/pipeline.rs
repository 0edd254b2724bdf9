//! 画像分類パイプライン
//!
//! 前処理 → 特徴抽出 → ラベルのキー化 → 分類器の学習 → キーからラベルへの復元
//! を一続きにまとめます。`ImagePipeline::fit` で学習し、得られた
//! `FittedPipeline` で推論・保存を行います。

use anyhow::{Context, Result};
use burn::data::dataset::Dataset;
use std::path::{Path, PathBuf};

use crate::context::{ClassifierBackend, ClassifierContext};
use crate::ml::feature_extractor::FeatureExtractor;
use crate::ml::label_map::LabelMap;
use crate::ml::ml_model::MaxEntClassifier;
use crate::ml::preprocess::ImageTransform;
use crate::ml::training::{train_classifier, TrainingReport};
use crate::model::config::{AppConfig, InceptionSettings, TrainerSettings};
use crate::model::inference_config::InferenceConfig;
use crate::model::model_metadata::ModelMetadata;
use crate::model::model_storage;
use crate::types::{ImageData, ImagePrediction};

/// 未学習のパイプライン定義
#[derive(Debug, Clone)]
pub struct ImagePipeline {
    transform: ImageTransform,
    trainer: TrainerSettings,
}

impl ImagePipeline {
    pub fn new(transform: ImageTransform, trainer: TrainerSettings) -> Self {
        Self { transform, trainer }
    }

    /// 設定ファイルの内容から構築
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            ImageTransform::new(&config.paths.images_folder, config.inception.clone()),
            config.trainer.clone(),
        )
    }

    pub fn with_images_folder(self, images_folder: impl Into<PathBuf>) -> Self {
        let settings = self.transform.settings().clone();
        Self {
            transform: ImageTransform::new(images_folder, settings),
            ..self
        }
    }

    pub fn with_image_settings(self, settings: InceptionSettings) -> Self {
        let folder = self.transform.images_folder().to_path_buf();
        Self {
            transform: ImageTransform::new(folder, settings),
            ..self
        }
    }

    pub fn with_trainer(self, trainer: TrainerSettings) -> Self {
        Self { trainer, ..self }
    }

    pub fn image_transform(&self) -> &ImageTransform {
        &self.transform
    }

    /// 学習データで分類器を学習する
    ///
    /// ラベルのキーは学習データでの出現順に割り当てる。
    pub fn fit<E, D>(&self, ctx: &ClassifierContext, extractor: E, dataset: &D) -> Result<FittedPipeline<E>>
    where
        E: FeatureExtractor,
        D: Dataset<ImageData>,
    {
        if dataset.is_empty() {
            anyhow::bail!("Training dataset is empty");
        }

        let records: Vec<ImageData> = dataset.iter().collect();
        let mut label_names = Vec::with_capacity(records.len());
        for record in &records {
            match record.label {
                Some(ref label) => label_names.push(label.as_str()),
                None => anyhow::bail!("Training record has no label: {}", record.image_path),
            }
        }

        let labels = LabelMap::fit(label_names.iter().copied());
        let keys: Vec<u32> = label_names
            .iter()
            .map(|label| {
                labels
                    .encode(label)
                    .ok_or_else(|| anyhow::anyhow!("Label {} was not registered", label))
            })
            .collect::<Result<_>>()?;

        tracing::info!(
            "学習データ {} 件, ラベル {} 種類: {}",
            records.len(),
            labels.len(),
            labels.labels().join(", ")
        );

        let embeddings = embed_all(&self.transform, &extractor, &records)?;
        let (classifier, report) = train_classifier(
            &embeddings,
            &keys,
            labels.len(),
            &self.trainer,
            ctx.device(),
        )?;

        Ok(FittedPipeline {
            transform: self.transform.clone(),
            extractor,
            labels,
            classifier,
            report,
        })
    }
}

/// 学習済みのパイプライン
pub struct FittedPipeline<E> {
    transform: ImageTransform,
    extractor: E,
    labels: LabelMap,
    classifier: MaxEntClassifier<ClassifierBackend>,
    report: TrainingReport,
}

impl<E: FeatureExtractor> FittedPipeline<E> {
    /// 学習時に見たラベル（キー順）
    pub fn labels(&self) -> &LabelMap {
        &self.labels
    }

    pub fn report(&self) -> &TrainingReport {
        &self.report
    }

    pub fn classifier(&self) -> &MaxEntClassifier<ClassifierBackend> {
        &self.classifier
    }

    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    pub fn image_transform(&self) -> &ImageTransform {
        &self.transform
    }

    /// 1件分の埋め込み
    pub fn embed(&self, record: &ImageData) -> Result<Vec<f32>> {
        embed_one(&self.transform, &self.extractor, record)
    }

    /// データセット全体を推論する（入力の順序を保つ）
    pub fn transform<D: Dataset<ImageData>>(
        &self,
        ctx: &ClassifierContext,
        dataset: &D,
    ) -> Result<Vec<ImagePrediction>> {
        let records: Vec<ImageData> = dataset.iter().collect();
        self.predict_records(ctx, records)
    }

    /// 単一画像を推論する
    pub fn predict(&self, ctx: &ClassifierContext, record: &ImageData) -> Result<ImagePrediction> {
        self.predict_records(ctx, vec![record.clone()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("No prediction for {}", record.image_path))
    }

    fn predict_records(&self, ctx: &ClassifierContext, records: Vec<ImageData>) -> Result<Vec<ImagePrediction>> {
        let embeddings = embed_all(&self.transform, &self.extractor, &records)?;
        let scores = self.classifier.score_rows(&embeddings, ctx.device())?;

        records
            .into_iter()
            .zip(scores)
            .map(|(record, score)| {
                let key = argmax(&score)
                    .ok_or_else(|| anyhow::anyhow!("Empty score vector for {}", record.image_path))?
                    as u32;
                let predicted_label = self
                    .labels
                    .decode(key)
                    .ok_or_else(|| anyhow::anyhow!("Predicted key {} has no label", key))?
                    .to_string();

                Ok(ImagePrediction {
                    image_path: record.image_path,
                    label: record.label,
                    predicted_key: key,
                    predicted_label,
                    score,
                })
            })
            .collect()
    }

    /// 保存用のメタデータ
    pub fn metadata(&self) -> ModelMetadata {
        ModelMetadata::new(
            self.labels.labels().to_vec(),
            self.classifier.embedding_dim(),
            self.transform.settings().clone(),
            self.transform.images_folder().to_string_lossy().to_string(),
            self.extractor.graph_settings().cloned(),
            self.extractor.describe(),
            self.report.clone(),
        )
    }

    /// tar.gzに保存し、保存先を返す
    pub fn save(&self, output_path: &Path) -> Result<PathBuf> {
        let binary = self.classifier.to_bytes()?;
        model_storage::save_model_with_metadata(output_path, &self.metadata(), &binary)
    }

    /// 保存済みモデルを読み込む
    ///
    /// 特徴抽出器は呼び出し側で用意する（グラフ本体はアーカイブに含まれない）。
    pub fn load(ctx: &ClassifierContext, model_path: &Path, extractor: E) -> Result<Self> {
        let (metadata, binary) = model_storage::load_model_with_metadata(model_path)
            .with_context(|| format!("Failed to load model: {}", model_path.display()))?;
        let config = InferenceConfig::from_metadata(&metadata)?;

        if extractor.embedding_dim() != config.embedding_dim {
            anyhow::bail!(
                "Feature extractor {} produces {} values, model expects {}",
                extractor.describe(),
                extractor.embedding_dim(),
                config.embedding_dim
            );
        }

        let classifier = MaxEntClassifier::from_bytes(
            binary,
            config.embedding_dim,
            config.num_total_classes(),
            ctx.device(),
        )?;

        tracing::info!(
            "モデルを読み込みました: {} ({} クラス)",
            model_path.display(),
            config.num_total_classes()
        );

        Ok(Self {
            transform: ImageTransform::new(config.images_folder, config.image),
            extractor,
            labels: config.labels,
            classifier,
            report: metadata.training,
        })
    }
}

fn embed_one<E: FeatureExtractor>(transform: &ImageTransform, extractor: &E, record: &ImageData) -> Result<Vec<f32>> {
    let pixels = transform.load(&record.image_path)?;
    let embedding = extractor
        .extract(&pixels)
        .with_context(|| format!("Failed to extract features: {}", record.image_path))?;

    if embedding.len() != extractor.embedding_dim() {
        anyhow::bail!(
            "Feature extractor returned {} values for {} (expected {})",
            embedding.len(),
            record.image_path,
            extractor.embedding_dim()
        );
    }
    Ok(embedding)
}

fn embed_all<E: FeatureExtractor>(
    transform: &ImageTransform,
    extractor: &E,
    records: &[ImageData],
) -> Result<Vec<Vec<f32>>> {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            tracing::debug!("特徴抽出 {}/{}: {}", i + 1, records.len(), record.image_path);
            embed_one(transform, extractor, record)
        })
        .collect()
}

/// 最大スコアの添字（同点なら先頭）
fn argmax(score: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &value) in score.iter().enumerate() {
        match best {
            Some((_, best_value)) if value <= best_value => {}
            _ => best = Some((i, value)),
        }
    }
    best.map(|(i, _)| i)
}
