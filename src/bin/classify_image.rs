//! 保存済みモデルで画像を分類するバイナリ

use image_classifier_lib::ml::InferenceEngine;
use image_classifier_lib::model::AppConfig;
use image_classifier_lib::{absolute_path, init_tracing, ClassifierContext};

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        anyhow::bail!("Usage: classify_image <model.tar.gz> <image>...");
    }

    let config = AppConfig::load_or_default(AppConfig::default_path())?;
    init_tracing(&config.log_level);
    let ctx = ClassifierContext::new(config);

    let engine: InferenceEngine = InferenceEngine::load(&ctx, &args[0])?;

    // コマンドラインの相対パスは作業ディレクトリ基準
    let images = args[1..]
        .iter()
        .map(|path| absolute_path(path).map(|p| p.to_string_lossy().to_string()))
        .collect::<anyhow::Result<Vec<_>>>()?;

    for prediction in engine.classify_batch(&ctx, &images)? {
        println!(
            "{}: {} (score: {:.4})",
            prediction.file_name(),
            prediction.predicted_label,
            prediction.max_score().unwrap_or(f32::NAN)
        );
    }

    Ok(())
}
