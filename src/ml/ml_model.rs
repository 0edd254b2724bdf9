//! 最大エントロピー分類器（多クラスロジスティック回帰）
//!
//! 凍結ネットワークの埋め込みを入力とし、学習するのはこの層の重みとバイアスだけです。

use anyhow::Result;
use burn::{
    module::{Module, Param},
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{activation::softmax, backend::Backend, Tensor, TensorData},
};

/// 埋め込み → クラススコアの線形分類器
///
/// # 構成
/// - logits = X·W + b（W: [埋め込み次元, クラス数]）
/// - スコア = softmax(logits)
#[derive(Module, Debug)]
pub struct MaxEntClassifier<B: Backend> {
    weights: Param<Tensor<B, 2>>,
    bias: Param<Tensor<B, 1>>,
}

impl<B: Backend> MaxEntClassifier<B> {
    /// 重み0で初期化
    pub fn zeros(embedding_dim: usize, num_classes: usize, device: &B::Device) -> Self {
        Self {
            weights: Param::from_tensor(Tensor::zeros([embedding_dim, num_classes], device)),
            bias: Param::from_tensor(Tensor::zeros([num_classes], device)),
        }
    }

    /// 平坦化されたパラメータ（W を行優先で並べた後に b）から構築
    pub fn from_parameters(
        parameters: &[f64],
        embedding_dim: usize,
        num_classes: usize,
        device: &B::Device,
    ) -> Result<Self> {
        let weight_len = embedding_dim * num_classes;
        if parameters.len() != weight_len + num_classes {
            anyhow::bail!(
                "Expected {} parameters for a {}x{} classifier, got {}",
                weight_len + num_classes,
                embedding_dim,
                num_classes,
                parameters.len()
            );
        }

        let (weights, bias) = parameters.split_at(weight_len);
        let weights: Vec<f32> = weights.iter().map(|&v| v as f32).collect();
        let bias: Vec<f32> = bias.iter().map(|&v| v as f32).collect();

        Ok(Self {
            weights: Param::from_tensor(Tensor::from_data(
                TensorData::new(weights, [embedding_dim, num_classes]),
                device,
            )),
            bias: Param::from_tensor(Tensor::from_data(TensorData::new(bias, [num_classes]), device)),
        })
    }

    /// パラメータを平坦化して取り出す（`from_parameters` と同じ並び）
    pub fn parameters(&self) -> Result<Vec<f64>> {
        let mut parameters: Vec<f64> = tensor_to_vec(self.weights.val())?
            .into_iter()
            .map(f64::from)
            .collect();
        parameters.extend(tensor_to_vec(self.bias.val())?.into_iter().map(f64::from));
        Ok(parameters)
    }

    pub fn embedding_dim(&self) -> usize {
        self.weights.val().dims()[0]
    }

    pub fn num_classes(&self) -> usize {
        self.weights.val().dims()[1]
    }

    /// 順伝播
    ///
    /// # 引数
    /// - `features`: 埋め込み [batch_size, embedding_dim]
    ///
    /// # 戻り値
    /// - クラスごとのロジット [batch_size, num_classes]
    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        features.matmul(self.weights.val()) + self.bias.val().unsqueeze::<2>()
    }

    /// softmax済みのスコア [batch_size, num_classes]
    pub fn predict_proba(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        softmax(self.forward(features), 1)
    }

    /// 埋め込みの行ごとにスコアを計算
    pub fn score_rows(&self, embeddings: &[Vec<f32>], device: &B::Device) -> Result<Vec<Vec<f32>>> {
        if embeddings.is_empty() {
            return Ok(Vec::new());
        }
        let features = features_tensor::<B>(embeddings, self.embedding_dim(), device)?;
        let scores = tensor_to_vec(self.predict_proba(features))?;
        Ok(scores.chunks(self.num_classes()).map(<[f32]>::to_vec).collect())
    }

    /// 重みをバイナリ化（f32精度）
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let recorder: BinBytesRecorder<FullPrecisionSettings> = BinBytesRecorder::default();
        recorder
            .record(self.clone().into_record(), ())
            .map_err(|e| anyhow::anyhow!("Failed to serialize classifier weights: {:?}", e))
    }

    /// バイナリから重みを復元
    pub fn from_bytes(
        bytes: Vec<u8>,
        embedding_dim: usize,
        num_classes: usize,
        device: &B::Device,
    ) -> Result<Self> {
        let recorder: BinBytesRecorder<FullPrecisionSettings> = BinBytesRecorder::default();
        let record = recorder
            .load(bytes, device)
            .map_err(|e| anyhow::anyhow!("Failed to load classifier weights: {:?}", e))?;

        let model = Self::zeros(embedding_dim, num_classes, device).load_record(record);
        if model.embedding_dim() != embedding_dim || model.num_classes() != num_classes {
            anyhow::bail!(
                "Classifier weights are {}x{}, expected {}x{}",
                model.embedding_dim(),
                model.num_classes(),
                embedding_dim,
                num_classes
            );
        }
        Ok(model)
    }
}

/// 埋め込みの並びを [n, dim] のテンソルにする
pub fn features_tensor<B: Backend>(
    embeddings: &[Vec<f32>],
    embedding_dim: usize,
    device: &B::Device,
) -> Result<Tensor<B, 2>> {
    let mut flat = Vec::with_capacity(embeddings.len() * embedding_dim);
    for (row, embedding) in embeddings.iter().enumerate() {
        if embedding.len() != embedding_dim {
            anyhow::bail!(
                "Embedding {} has {} values (expected {})",
                row,
                embedding.len(),
                embedding_dim
            );
        }
        flat.extend_from_slice(embedding);
    }
    Ok(Tensor::from_data(
        TensorData::new(flat, [embeddings.len(), embedding_dim]),
        device,
    ))
}

/// テンソルの中身をf32のVecとして取り出す
pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Failed to read tensor data: {:?}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ClassifierBackend;
    use burn_ndarray::NdArrayDevice;

    #[test]
    fn test_zero_weights_give_uniform_scores() {
        let device = NdArrayDevice::Cpu;
        let model = MaxEntClassifier::<ClassifierBackend>::zeros(3, 4, &device);

        let scores = model.score_rows(&[vec![1.0, -2.0, 3.0]], &device).unwrap();
        assert_eq!(scores.len(), 1);
        for s in &scores[0] {
            assert!((s - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn test_parameter_layout() {
        let device = NdArrayDevice::Cpu;
        // W = [[1, 0], [0, 1]], b = [0.5, -0.5]
        let params = [1.0, 0.0, 0.0, 1.0, 0.5, -0.5];
        let model = MaxEntClassifier::<ClassifierBackend>::from_parameters(&params, 2, 2, &device).unwrap();

        assert_eq!(model.parameters().unwrap(), params.to_vec());

        let features = features_tensor::<ClassifierBackend>(&[vec![2.0, 1.0]], 2, &device).unwrap();
        let logits = tensor_to_vec(model.forward(features)).unwrap();
        assert_eq!(logits, vec![2.5, 0.5]);
    }

    #[test]
    fn test_scores_sum_to_one() {
        let device = NdArrayDevice::Cpu;
        let params = [0.3, -1.2, 0.7, 2.0, 0.1, -0.4, 0.0, 0.5, -0.5];
        let model = MaxEntClassifier::<ClassifierBackend>::from_parameters(&params, 2, 3, &device).unwrap();

        let rows = model
            .score_rows(&[vec![10.0, -3.0], vec![0.0, 0.0], vec![-50.0, 80.0]], &device)
            .unwrap();
        for row in rows {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "{:?}", row);
        }
    }

    #[test]
    fn test_wrong_parameter_count() {
        let device = NdArrayDevice::Cpu;
        assert!(MaxEntClassifier::<ClassifierBackend>::from_parameters(&[0.0; 5], 2, 2, &device).is_err());
    }

    #[test]
    fn test_embedding_dimension_checked() {
        let device = NdArrayDevice::Cpu;
        assert!(features_tensor::<ClassifierBackend>(&[vec![1.0, 2.0], vec![1.0]], 2, &device).is_err());
    }

    #[test]
    fn test_weights_bytes_round_trip() {
        let device = NdArrayDevice::Cpu;
        let params = [0.25, -1.5, 2.0, 0.125, 0.5, -0.75];
        let model = MaxEntClassifier::<ClassifierBackend>::from_parameters(&params, 2, 2, &device).unwrap();

        let bytes = model.to_bytes().unwrap();
        let restored = MaxEntClassifier::<ClassifierBackend>::from_bytes(bytes, 2, 2, &device).unwrap();
        assert_eq!(restored.parameters().unwrap(), params.to_vec());
    }
}
