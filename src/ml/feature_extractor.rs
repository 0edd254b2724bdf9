//! 学習済みネットワークによる特徴抽出
//!
//! TensorFlowの凍結グラフ(.pb)を読み込み、指定した中間テンソルまで実行して
//! 固定長の埋め込みベクトルを得ます。重みは読み取り専用です。

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tract_tensorflow::prelude::*;

use crate::ml::preprocess::{PixelTensor, CHANNELS};
use crate::model::config::{GraphSettings, InceptionSettings};

/// 画素テンソルから埋め込みを得る凍結済みの特徴抽出器
pub trait FeatureExtractor {
    /// 埋め込みの次元数
    fn embedding_dim(&self) -> usize;

    /// 1枚分の画素テンソルから埋め込みを計算する
    fn extract(&self, pixels: &PixelTensor) -> Result<Vec<f32>>;

    /// 取り出しているテンソル名など（ログ・メタデータ用）
    fn describe(&self) -> String;

    /// 保存したモデルから再構築するためのグラフ設定
    fn graph_settings(&self) -> Option<&GraphSettings> {
        None
    }
}

type GraphPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// TensorFlowグラフを使う特徴抽出器
pub struct TensorFlowExtractor {
    plan: GraphPlan,
    graph: GraphSettings,
    input_shape: [usize; 4],
    embedding_dim: usize,
}

impl TensorFlowExtractor {
    /// グラフを読み込み、入力形状を固定して最適化する
    pub fn load(graph: &GraphSettings, image: &InceptionSettings) -> Result<Self> {
        let graph_path = PathBuf::from(&graph.graph_path);
        if !graph_path.is_file() {
            anyhow::bail!("TensorFlow graph not found: {}", graph_path.display());
        }

        let (width, height) = (image.image_width as usize, image.image_height as usize);
        let input_shape = if image.channels_last {
            [1, height, width, CHANNELS]
        } else {
            [1, CHANNELS, height, width]
        };

        tracing::info!(
            "学習済みグラフを読み込みます: {} ({} -> {})",
            graph_path.display(),
            graph.input_node,
            graph.output_node
        );

        let plan = Self::build_plan(&graph_path, graph, input_shape)
            .with_context(|| format!("Failed to load TensorFlow graph: {}", graph_path.display()))?;

        let mut extractor = Self {
            plan,
            graph: graph.clone(),
            input_shape,
            embedding_dim: 0,
        };

        // 出力次元はゼロ入力を1回流して確定させる
        let zeros = PixelTensor {
            data: vec![0.0; input_shape.iter().product()],
            width,
            height,
            channels_last: image.channels_last,
        };
        extractor.embedding_dim = extractor.extract(&zeros)?.len();
        tracing::info!("埋め込み次元: {}", extractor.embedding_dim);

        Ok(extractor)
    }

    fn build_plan(path: &Path, graph: &GraphSettings, input_shape: [usize; 4]) -> TractResult<GraphPlan> {
        tract_tensorflow::tensorflow()
            .model_for_path(path)?
            .with_input_names([graph.input_node.as_str()])?
            .with_input_fact(0, f32::fact(input_shape).into())?
            .with_output_names([graph.output_node.as_str()])?
            .into_optimized()?
            .into_runnable()
    }
}

impl FeatureExtractor for TensorFlowExtractor {
    fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    fn extract(&self, pixels: &PixelTensor) -> Result<Vec<f32>> {
        let shape = pixels.shape();
        if shape != self.input_shape {
            anyhow::bail!(
                "Pixel tensor shape {:?} does not match graph input {:?}",
                shape,
                self.input_shape
            );
        }

        let input = Tensor::from_shape(&shape, &pixels.data)?;
        let outputs = self.plan.run(tvec!(input.into()))?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow::anyhow!("Graph produced no output for {}", self.graph.output_node))?;

        let embedding: Vec<f32> = output.to_array_view::<f32>()?.iter().copied().collect();
        Ok(embedding)
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.graph.graph_path, self.graph.output_node)
    }

    fn graph_settings(&self) -> Option<&GraphSettings> {
        Some(&self.graph)
    }
}
