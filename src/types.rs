use serde::{Deserialize, Serialize};
use std::path::Path;

/// 1行分の入力レコード（画像パスとラベル）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    pub image_path: String,

    // 推論だけならラベルは不要
    #[serde(default)]
    pub label: Option<String>,
}

impl ImageData {
    pub fn new(image_path: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            image_path: image_path.into(),
            label: Some(label.into()),
        }
    }

    /// ラベル無しのレコード（推論用）
    pub fn unlabeled(image_path: impl Into<String>) -> Self {
        Self {
            image_path: image_path.into(),
            label: None,
        }
    }

    /// 表示用のファイル名
    pub fn file_name(&self) -> String {
        file_name_of(&self.image_path)
    }
}

/// 推論結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePrediction {
    pub image_path: String,
    pub label: Option<String>,
    pub predicted_key: u32,
    pub predicted_label: String,
    /// 既知ラベルごとのスコア（softmax済み、キー順）
    pub score: Vec<f32>,
}

impl ImagePrediction {
    /// 最大スコア
    pub fn max_score(&self) -> Option<f32> {
        self.score.iter().copied().reduce(f32::max)
    }

    pub fn file_name(&self) -> String {
        file_name_of(&self.image_path)
    }
}

fn file_name_of(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}
