//! 分類器の学習（L-BFGS / OWL-QN による最大エントロピー）
//!
//! 目的関数は burn の自動微分バックエンド上で組み立て、勾配は `backward()` から得ます。
//! 最適化は argmin の L-BFGS に任せ、L1正則化が有効なら OWL-QN に切り替わります。

use anyhow::Result;
use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use burn::backend::Autodiff;
use burn::tensor::{activation::log_softmax, backend::Backend, Tensor, TensorData};
use burn_ndarray::{NdArray, NdArrayDevice};
use serde::{Deserialize, Serialize};

use crate::context::ClassifierBackend;
use crate::ml::ml_model::MaxEntClassifier;
use crate::model::config::TrainerSettings;

/// 学習時だけ使う倍精度の自動微分バックエンド
type TrainingBackend = Autodiff<NdArray<f64>>;

/// 学習結果の記録
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub num_examples: usize,
    pub iterations: usize,
    /// 正則化項を含む最終的な目的関数値
    pub final_loss: f64,
    pub converged: bool,
}

/// 負の対数尤度（総和）+ 0.5·l2·‖W‖²
///
/// L1項はソルバー側（OWL-QN）で加える。
struct MaxEntObjective {
    features: Tensor<TrainingBackend, 2>,
    targets: Tensor<TrainingBackend, 2>,
    l2: f64,
    embedding_dim: usize,
    num_classes: usize,
    device: NdArrayDevice,
}

impl MaxEntObjective {
    fn new(
        embeddings: &[Vec<f32>],
        keys: &[u32],
        num_classes: usize,
        l2: f64,
        device: &NdArrayDevice,
    ) -> Result<Self> {
        let embedding_dim = embeddings[0].len();

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
            flat.extend(embedding.iter().map(|&v| f64::from(v)));
        }
        let features = Tensor::from_data(TensorData::new(flat, [embeddings.len(), embedding_dim]), device);

        let mut one_hot = vec![0.0f64; keys.len() * num_classes];
        for (row, &key) in keys.iter().enumerate() {
            if key as usize >= num_classes {
                anyhow::bail!("Label key {} is outside of {} classes", key, num_classes);
            }
            one_hot[row * num_classes + key as usize] = 1.0;
        }
        let targets = Tensor::from_data(TensorData::new(one_hot, [keys.len(), num_classes]), device);

        Ok(Self {
            features,
            targets,
            l2,
            embedding_dim,
            num_classes,
            device: *device,
        })
    }

    fn num_parameters(&self) -> usize {
        self.embedding_dim * self.num_classes + self.num_classes
    }

    /// 平坦化されたパラメータ（W を行優先で並べた後に b）をテンソルに戻す
    fn unpack(&self, parameters: &[f64]) -> Result<(Tensor<TrainingBackend, 2>, Tensor<TrainingBackend, 1>)> {
        if parameters.len() != self.num_parameters() {
            anyhow::bail!(
                "Expected {} parameters, got {}",
                self.num_parameters(),
                parameters.len()
            );
        }
        let (weights, bias) = parameters.split_at(self.embedding_dim * self.num_classes);
        Ok((
            Tensor::from_data(
                TensorData::new(weights.to_vec(), [self.embedding_dim, self.num_classes]),
                &self.device,
            ),
            Tensor::from_data(TensorData::new(bias.to_vec(), [self.num_classes]), &self.device),
        ))
    }

    fn objective(&self, weights: Tensor<TrainingBackend, 2>, bias: Tensor<TrainingBackend, 1>) -> Tensor<TrainingBackend, 1> {
        let logits = self.features.clone().matmul(weights.clone()) + bias.unsqueeze::<2>();
        let nll = (log_softmax(logits, 1) * self.targets.clone()).sum().neg();
        nll + weights.powf_scalar(2.0).sum().mul_scalar(0.5 * self.l2)
    }

    fn loss(&self, parameters: &[f64]) -> Result<f64> {
        let (weights, bias) = self.unpack(parameters)?;
        scalar(self.objective(weights, bias))
    }

    fn loss_and_gradient(&self, parameters: &[f64]) -> Result<(f64, Vec<f64>)> {
        let (weights, bias) = self.unpack(parameters)?;
        let weights = weights.require_grad();
        let bias = bias.require_grad();

        let loss = self.objective(weights.clone(), bias.clone());
        let value = scalar(loss.clone())?;
        let grads = loss.backward();

        let grad_weights = weights
            .grad(&grads)
            .ok_or_else(|| anyhow::anyhow!("Missing gradient for classifier weights"))?;
        let grad_bias = bias
            .grad(&grads)
            .ok_or_else(|| anyhow::anyhow!("Missing gradient for classifier bias"))?;

        let mut gradient = to_f64_vec(grad_weights)?;
        gradient.extend(to_f64_vec(grad_bias)?);
        Ok((value, gradient))
    }
}

impl CostFunction for MaxEntObjective {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, parameters: &Self::Param) -> Result<Self::Output> {
        self.loss(parameters)
    }
}

impl Gradient for MaxEntObjective {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, parameters: &Self::Param) -> Result<Self::Gradient> {
        Ok(self.loss_and_gradient(parameters)?.1)
    }
}

fn to_f64_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f64>> {
    tensor
        .into_data()
        .convert::<f64>()
        .to_vec::<f64>()
        .map_err(|e| anyhow::anyhow!("Failed to read tensor data: {:?}", e))
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> Result<f64> {
    to_f64_vec(tensor)?
        .first()
        .copied()
        .ok_or_else(|| anyhow::anyhow!("Objective produced an empty tensor"))
}

/// 埋め込みとラベルキーから分類器を学習する
///
/// 初期値は全て0で、乱数は使わない。
pub fn train_classifier(
    embeddings: &[Vec<f32>],
    keys: &[u32],
    num_classes: usize,
    settings: &TrainerSettings,
    device: &NdArrayDevice,
) -> Result<(MaxEntClassifier<ClassifierBackend>, TrainingReport)> {
    if embeddings.is_empty() {
        anyhow::bail!("Cannot train a classifier without examples");
    }
    if embeddings.len() != keys.len() {
        anyhow::bail!(
            "Got {} embeddings but {} label keys",
            embeddings.len(),
            keys.len()
        );
    }
    if settings.l1_regularization < 0.0 || settings.l2_regularization < 0.0 {
        anyhow::bail!(
            "Regularization weights must not be negative (l1 = {}, l2 = {})",
            settings.l1_regularization,
            settings.l2_regularization
        );
    }
    if num_classes < 2 {
        tracing::warn!("クラスが{}個しかありません。全ての入力が同じラベルになります", num_classes);
    }

    let objective = MaxEntObjective::new(embeddings, keys, num_classes, settings.l2_regularization, device)?;
    let embedding_dim = objective.embedding_dim;
    let initial = vec![0.0; objective.num_parameters()];

    tracing::info!(
        "分類器の学習を開始します: {} 件, 埋め込み次元 {}, {} クラス (L1 {}, L2 {})",
        embeddings.len(),
        embedding_dim,
        num_classes,
        settings.l1_regularization,
        settings.l2_regularization
    );

    let linesearch = MoreThuenteLineSearch::new().with_c(1e-4, 0.9)?;
    let mut solver: LBFGS<_, Vec<f64>, Vec<f64>, f64> = LBFGS::new(linesearch, settings.history_size.max(1))
        .with_tolerance_cost(settings.optimization_tolerance)?;
    if settings.l1_regularization > 0.0 {
        solver = solver.with_l1_regularization(settings.l1_regularization)?;
    }

    let result = Executor::new(objective, solver)
        .configure(|state| state.param(initial).max_iters(settings.max_iterations as u64))
        .run()?;

    let state = result.state();
    let parameters = state
        .get_best_param()
        .or_else(|| state.get_param())
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Optimizer returned no parameters"))?;
    let converged = matches!(state.get_termination_reason(), Some(TerminationReason::SolverConverged));

    let objective = result
        .problem
        .problem
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("Optimizer did not return the objective"))?;
    let l1_penalty: f64 = parameters.iter().map(|p| p.abs()).sum::<f64>() * settings.l1_regularization;

    let report = TrainingReport {
        num_examples: embeddings.len(),
        iterations: state.get_iter() as usize,
        final_loss: objective.loss(&parameters)? + l1_penalty,
        converged,
    };

    if report.converged {
        tracing::info!("学習完了: {} iterations, loss {:.6}", report.iterations, report.final_loss);
    } else {
        tracing::warn!(
            "収束前に学習を終了しました: {} iterations, loss {:.6} ({:?})",
            report.iterations,
            report.final_loss,
            state.get_termination_reason()
        );
    }

    let classifier = MaxEntClassifier::from_parameters(&parameters, embedding_dim, num_classes, device)?;
    Ok((classifier, report))
}
