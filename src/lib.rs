mod types;
mod csv_loader;

pub mod context;
pub mod ml;
pub mod model;

pub use context::{ClassifierBackend, ClassifierContext};
pub use csv_loader::{load_dataset, load_tsv};
pub use types::{ImageData, ImagePrediction};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use ml::{FittedPipeline, ImagePipeline, MulticlassMetrics, TensorFlowExtractor};
use model::AppConfig;

/// tracingの出力先を設定する（2回目以降の呼び出しは無視）
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// 実行時の作業ディレクトリ基準で絶対パスにする
pub fn absolute_path(path: &str) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("Failed to resolve path: {}", path))
}

/// 学習 → テストデータで評価 → 必要なら保存
pub fn generate_model(ctx: &ClassifierContext) -> Result<FittedPipeline<TensorFlowExtractor>> {
    let config = ctx.config();

    let extractor = TensorFlowExtractor::load(&config.graph, &config.inception)?;
    let train = load_dataset(Path::new(&config.paths.train_tags))?;
    let test = load_dataset(Path::new(&config.paths.test_tags))?;

    tracing::info!("=============== 学習パイプラインの構築 ===============");
    let pipeline = ImagePipeline::from_config(config).fit(ctx, extractor, &train)?;

    tracing::info!("=============== テストデータで評価 ===============");
    let predictions = pipeline.transform(ctx, &test)?;
    display_results(&predictions);

    let metrics = MulticlassMetrics::evaluate(&predictions, pipeline.labels());
    metrics.print(pipeline.labels());

    if let Some(ref output) = config.model_output {
        pipeline.save(Path::new(output))?;
    }

    Ok(pipeline)
}

/// 推論結果を1行ずつ表示
pub fn display_results(predictions: &[ImagePrediction]) {
    for prediction in predictions {
        println!(
            "From image prediction data. Image: {} predicted as: {} with score: {}",
            prediction.file_name(),
            prediction.predicted_label,
            prediction.max_score().unwrap_or(f32::NAN)
        );
    }
}

/// 設定された1枚の画像を分類して表示
pub fn classify_single_image(
    ctx: &ClassifierContext,
    pipeline: &FittedPipeline<TensorFlowExtractor>,
) -> Result<ImagePrediction> {
    let image_path = absolute_path(&ctx.config().paths.predict_image)?;
    let record = ImageData::unlabeled(image_path.to_string_lossy());
    let prediction = pipeline.predict(ctx, &record)?;

    println!(
        "Classifying single image. Image: {} predicted as: {} with score: {}",
        prediction.file_name(),
        prediction.predicted_label,
        prediction.max_score().unwrap_or(f32::NAN)
    );

    Ok(prediction)
}

/// メインの処理（引数1つ目は設定ファイルのパス）
pub fn run() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load_or_default(&config_path)?;

    init_tracing(&config.log_level);
    config.display();

    let ctx = ClassifierContext::new(config);
    let pipeline = generate_model(&ctx)?;
    classify_single_image(&ctx, &pipeline)?;

    Ok(())
}
