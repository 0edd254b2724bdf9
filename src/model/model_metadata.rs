//! モデルメタデータの定義
//!
//! tar.gz形式で分類器の重みと一緒に保存される情報です。
//! 学習済みグラフ本体は含めず、パスとテンソル名だけを記録します。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ml::training::TrainingReport;
use crate::model::config::{GraphSettings, InceptionSettings};

/// モデルメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - model.bin: 分類器の重み（バイナリ）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// キー順のラベル（キー = 添字）
    /// 例: ["toaster", "teapot", "food"]
    pub labels: Vec<String>,

    /// 埋め込みの次元（分類器の入力次元）
    pub embedding_dim: usize,

    /// 学習時の画像前処理設定
    pub image: InceptionSettings,

    /// 学習時の画像フォルダ（相対パスの解決に使う）
    pub images_folder: String,

    /// 学習済みグラフの設定（TensorFlowグラフ以外の特徴抽出器ではNone）
    #[serde(default)]
    pub graph: Option<GraphSettings>,

    /// 特徴抽出器の説明
    pub extractor: String,

    /// 学習の結果
    pub training: TrainingReport,

    /// モデルの学習時刻（ISO8601形式）
    pub trained_at: String,
}

impl ModelMetadata {
    /// 新しいメタデータを作成
    pub fn new(
        labels: Vec<String>,
        embedding_dim: usize,
        image: InceptionSettings,
        images_folder: String,
        graph: Option<GraphSettings>,
        extractor: String,
        training: TrainingReport,
    ) -> Self {
        let trained_at = chrono::Local::now().to_rfc3339();

        Self {
            labels,
            embedding_dim,
            image,
            images_folder,
            graph,
            extractor,
            training,
            trained_at,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize metadata from JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ModelMetadata {
        ModelMetadata::new(
            vec!["toaster".to_string(), "teapot".to_string()],
            1008,
            InceptionSettings::default(),
            "assets/images".to_string(),
            Some(GraphSettings::default()),
            "inception".to_string(),
            TrainingReport {
                num_examples: 12,
                iterations: 40,
                final_loss: 0.25,
                converged: true,
            },
        )
    }

    #[test]
    fn test_json_round_trip() {
        let metadata = sample();
        let json = metadata.to_json_string().unwrap();
        assert_eq!(ModelMetadata::from_json_string(&json).unwrap(), metadata);
        assert_eq!(metadata.num_classes(), 2);
    }

    #[test]
    fn test_graph_is_optional() {
        let mut value = serde_json::to_value(sample()).unwrap();
        value.as_object_mut().unwrap().remove("graph");

        let metadata: ModelMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(metadata.graph, None);
    }

    #[test]
    fn test_invalid_json() {
        assert!(ModelMetadata::from_json_string("{}").is_err());
    }
}
