//! 多クラス分類の評価指標

use serde::{Deserialize, Serialize};

use crate::ml::label_map::LabelMap;
use crate::types::ImagePrediction;

/// 確率の下限（log(0) を避ける）
const LOG_LOSS_EPSILON: f64 = 1e-15;

/// 評価結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MulticlassMetrics {
    /// 平均ログ損失
    pub log_loss: f64,
    /// クラスごとのログ損失（キー順）。テストに無いクラスはNaN
    pub per_class_log_loss: Vec<f64>,
    /// テストデータのラベル分布（事前分布）に対する改善率
    pub log_loss_reduction: f64,
    /// 全件に対する正解率
    pub micro_accuracy: f64,
    /// テストに現れたクラスごとの正解率の平均
    pub macro_accuracy: f64,
    /// confusion_matrix[正解][予測]
    pub confusion_matrix: Vec<Vec<u64>>,
    /// 評価に使った件数
    pub num_evaluated: usize,
    /// ラベルが無い・未知のため除外した件数
    pub num_skipped: usize,
}

impl MulticlassMetrics {
    /// 推論結果と正解ラベルから指標を計算する
    pub fn evaluate(predictions: &[ImagePrediction], labels: &LabelMap) -> Self {
        let mut keyed = Vec::with_capacity(predictions.len());
        let mut skipped = 0;

        for prediction in predictions {
            match prediction.label.as_deref().and_then(|l| labels.encode(l)) {
                Some(key) => keyed.push((key, prediction)),
                None => {
                    tracing::warn!(
                        "評価対象外: {} (ラベル {:?} は学習データにありません)",
                        prediction.image_path,
                        prediction.label
                    );
                    skipped += 1;
                }
            }
        }

        let mut metrics = Self::from_keys(&keyed, labels.len());
        metrics.num_skipped = skipped;
        metrics
    }

    /// (正解キー, 推論結果) の組から計算する
    pub fn from_keys(records: &[(u32, &ImagePrediction)], num_classes: usize) -> Self {
        let mut class_loss = vec![0.0f64; num_classes];
        let mut class_count = vec![0u64; num_classes];
        let mut class_correct = vec![0u64; num_classes];
        let mut confusion_matrix = vec![vec![0u64; num_classes]; num_classes];
        let mut total_loss = 0.0;
        let mut correct = 0u64;

        for &(key, prediction) in records {
            let truth = key as usize;
            let p = prediction.score.get(truth).copied().map(f64::from).unwrap_or(0.0);
            let loss = -p.max(LOG_LOSS_EPSILON).ln();

            total_loss += loss;
            class_loss[truth] += loss;
            class_count[truth] += 1;

            let predicted = prediction.predicted_key as usize;
            if predicted < num_classes {
                confusion_matrix[truth][predicted] += 1;
            }
            if predicted == truth {
                correct += 1;
                class_correct[truth] += 1;
            }
        }

        let n = records.len() as f64;

        // 0/0 はNaNのまま返す
        let per_class_log_loss: Vec<f64> = class_loss
            .iter()
            .zip(&class_count)
            .map(|(&loss, &count)| loss / count as f64)
            .collect();

        let log_loss = total_loss / n;

        let prior_log_loss: f64 = class_count
            .iter()
            .filter(|&&count| count > 0)
            .map(|&count| {
                let prior = count as f64 / n;
                -prior * prior.ln()
            })
            .sum();
        let log_loss_reduction = if prior_log_loss > 0.0 {
            (prior_log_loss - log_loss) / prior_log_loss
        } else {
            f64::NAN
        };

        let present: Vec<f64> = class_correct
            .iter()
            .zip(&class_count)
            .filter(|(_, count)| **count > 0)
            .map(|(&ok, &count)| ok as f64 / count as f64)
            .collect();
        let macro_accuracy = present.iter().sum::<f64>() / present.len() as f64;

        Self {
            log_loss,
            per_class_log_loss,
            log_loss_reduction,
            micro_accuracy: correct as f64 / n,
            macro_accuracy,
            confusion_matrix,
            num_evaluated: records.len(),
            num_skipped: 0,
        }
    }

    /// コンソールに表示
    pub fn print(&self, labels: &LabelMap) {
        println!("LogLoss is: {}", self.log_loss);
        println!(
            "PerClassLogLoss is: {}",
            self.per_class_log_loss
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" , ")
        );
        println!("LogLossReduction is: {}", self.log_loss_reduction);
        println!("MicroAccuracy is: {}", self.micro_accuracy);
        println!("MacroAccuracy is: {}", self.macro_accuracy);
        println!("ConfusionMatrix (rows = truth, columns = predicted): {}", labels.labels().join(" , "));
        for (label, row) in labels.labels().iter().zip(&self.confusion_matrix) {
            println!(
                "  {}: {}",
                label,
                row.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ")
            );
        }
    }
}
