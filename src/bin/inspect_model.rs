//! 保存済みモデルの中身を表示するバイナリ

use image_classifier_lib::model::{load_metadata, load_model_binary, print_metadata_info, InferenceConfig};
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    println!("=== Model Inspector ===\n");

    let model_path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => anyhow::bail!("Usage: inspect_model <model.tar.gz>"),
    };

    match load_metadata(&model_path) {
        Ok(metadata) => {
            println!("✓ モデルメタデータ読み込み成功:");
            print_metadata_info(&metadata);

            let config = InferenceConfig::from_metadata(&metadata)?;
            config.print_info();
            print_label_table(&config);

            let weights = load_model_binary(&model_path)?;
            println!("\n✓ 分類器の重み: {} bytes", weights.len());
        }
        Err(e) => {
            eprintln!("✗ エラー: {:#}", e);
            return Err(e);
        }
    }

    Ok(())
}

/// キーとラベルの対応を表示し、逆引きが一致するか確認する
fn print_label_table(config: &InferenceConfig) {
    println!("\n--- ラベル対応表 ---");
    for index in 0..config.num_total_classes() {
        let Some(label) = config.class_index_to_label(index) else {
            println!("  {}: ✗ ラベルなし", index);
            continue;
        };
        let mark = if config.label_to_index(&label) == Some(index) { "✓" } else { "✗" };
        println!("  {} {}: {}", mark, index, label);
    }
}
