//! モデルメタデータを使用した推論設定
//!
//! 保存されたモデルメタデータを読み込んで推論に必要な情報を復元します。

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::ml::label_map::LabelMap;
use crate::model::config::{GraphSettings, InceptionSettings};
use crate::model::model_metadata::ModelMetadata;
use crate::model::model_storage;

/// モデルメタデータから推論用情報を取得
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// ラベル（キー順）
    pub labels: LabelMap,

    /// 入力画像の前処理設定
    pub image: InceptionSettings,

    /// 相対パスの基準フォルダ
    pub images_folder: PathBuf,

    /// 学習済みグラフ
    pub graph: Option<GraphSettings>,

    /// 分類器の入力次元
    pub embedding_dim: usize,
}

impl InferenceConfig {
    /// メタデータからInferenceConfigを作成
    pub fn from_metadata(metadata: &ModelMetadata) -> Result<Self> {
        let labels = LabelMap::fit(&metadata.labels);
        if labels.len() != metadata.labels.len() {
            anyhow::bail!("Model metadata contains duplicate labels: {:?}", metadata.labels);
        }

        Ok(Self {
            labels,
            image: metadata.image.clone(),
            images_folder: PathBuf::from(&metadata.images_folder),
            graph: metadata.graph.clone(),
            embedding_dim: metadata.embedding_dim,
        })
    }

    /// モデルファイルから推論設定を読み込む
    pub fn load_from_model(model_path: &Path) -> Result<Self> {
        let metadata = model_storage::load_metadata(model_path).context("Failed to load model metadata")?;
        Self::from_metadata(&metadata)
    }

    /// クラス数
    pub fn num_total_classes(&self) -> usize {
        self.labels.len()
    }

    /// クラスインデックスからラベルを取得
    pub fn class_index_to_label(&self, index: usize) -> Option<String> {
        self.labels.decode(index as u32).map(str::to_string)
    }

    /// ラベルからクラスインデックスを取得
    pub fn label_to_index(&self, label: &str) -> Option<usize> {
        self.labels.encode(label).map(|key| key as usize)
    }

    /// 設定情報を表示
    pub fn print_info(&self) {
        println!("\n=== 推論設定 ===");
        println!("ラベル: {}", self.labels.labels().join(", "));
        println!("総クラス数: {}", self.num_total_classes());
        println!(
            "入力画像: {}x{} (resize: {})",
            self.image.image_width, self.image.image_height, self.image.resize_mode
        );
        println!("画像フォルダ: {}", self.images_folder.display());
        println!("埋め込み次元: {}", self.embedding_dim);
        match self.graph {
            Some(ref graph) => println!("グラフ: {} -> {}", graph.graph_path, graph.output_node),
            None => println!("グラフ: (なし)"),
        }
        println!("==================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::training::TrainingReport;

    fn metadata(labels: &[&str]) -> ModelMetadata {
        ModelMetadata::new(
            labels.iter().map(|l| l.to_string()).collect(),
            1008,
            InceptionSettings::default(),
            "assets/images".to_string(),
            None,
            "test".to_string(),
            TrainingReport {
                num_examples: 3,
                iterations: 1,
                final_loss: 0.0,
                converged: true,
            },
        )
    }

    #[test]
    fn test_label_lookup() {
        let config = InferenceConfig::from_metadata(&metadata(&["toaster", "teapot", "food"])).unwrap();

        assert_eq!(config.num_total_classes(), 3);
        assert_eq!(config.class_index_to_label(2).as_deref(), Some("food"));
        assert_eq!(config.class_index_to_label(3), None);
        assert_eq!(config.label_to_index("teapot"), Some(1));
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        assert!(InferenceConfig::from_metadata(&metadata(&["toaster", "toaster"])).is_err());
    }
}
