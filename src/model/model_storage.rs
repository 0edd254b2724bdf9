//! モデルとメタデータの永続化
//!
//! Tar.gz形式で分類器の重みとメタデータを1ファイルに統合して保存・読み込みします。
//!
//! ファイル構成（tar.gz内部）:
//! - metadata.json   - メタデータ（ラベル、前処理設定、グラフ設定など）
//! - model.bin       - 分類器の重み（burnのバイナリレコード）

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};

use crate::model::model_metadata::ModelMetadata;

const METADATA_ENTRY: &str = "metadata.json";
const MODEL_ENTRY: &str = "model.bin";

/// 保存先のパス（.gzで終わっていなければ .tar.gz を付ける）
pub fn archive_path(output_path: &Path) -> PathBuf {
    if output_path.extension().and_then(|s| s.to_str()) == Some("gz") {
        output_path.to_path_buf()
    } else {
        output_path.with_extension("tar.gz")
    }
}

fn append_entry<W: std::io::Write>(builder: &mut Builder<W>, name: &str, data: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name)?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append(&header, data)
        .with_context(|| format!("Failed to add {} to tar", name))
}

/// メタデータと共にモデルをTar.gz形式で保存し、保存先を返す
pub fn save_model_with_metadata(
    output_path: &Path,
    metadata: &ModelMetadata,
    model_binary: &[u8],
) -> Result<PathBuf> {
    let tar_gz_path = archive_path(output_path);

    if let Some(parent) = tar_gz_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create parent directory: {:?}", parent))?;
        }
    }

    let tar_gz_file = File::create(&tar_gz_path)
        .with_context(|| format!("Failed to create tar.gz file: {:?}", tar_gz_path))?;

    let encoder = GzEncoder::new(tar_gz_file, Compression::default());
    let mut tar_builder = Builder::new(encoder);

    append_entry(&mut tar_builder, METADATA_ENTRY, metadata.to_json_string()?.as_bytes())?;
    append_entry(&mut tar_builder, MODEL_ENTRY, model_binary)?;

    tar_builder
        .into_inner()
        .context("Failed to finalize tar archive")?
        .finish()
        .context("Failed to finalize gzip stream")?;

    tracing::info!("モデルを保存しました: {}", tar_gz_path.display());

    Ok(tar_gz_path)
}

fn open_archive(tar_gz_path: &Path) -> Result<Archive<GzDecoder<File>>> {
    let tar_gz_file = File::open(tar_gz_path)
        .with_context(|| format!("Failed to open tar.gz file: {:?}", tar_gz_path))?;
    Ok(Archive::new(GzDecoder::new(tar_gz_file)))
}

/// 指定したエントリだけを読み込む
fn read_entry(tar_gz_path: &Path, name: &str) -> Result<Vec<u8>> {
    let mut archive = open_archive(tar_gz_path)?;

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path()?.to_str() == Some(name) {
            let mut buffer = Vec::new();
            entry.read_to_end(&mut buffer)?;
            return Ok(buffer);
        }
    }

    Err(anyhow::anyhow!("{} not found in tar.gz archive {:?}", name, tar_gz_path))
}

/// Tar.gzからモデルメタデータを読み込む
pub fn load_metadata(tar_gz_path: &Path) -> Result<ModelMetadata> {
    let bytes = read_entry(tar_gz_path, METADATA_ENTRY)?;
    let json = String::from_utf8(bytes).context("metadata.json is not valid UTF-8")?;
    ModelMetadata::from_json_string(&json)
}

/// Tar.gzからモデルバイナリを読み込む
pub fn load_model_binary(tar_gz_path: &Path) -> Result<Vec<u8>> {
    read_entry(tar_gz_path, MODEL_ENTRY)
}

/// メタデータとモデルバイナリを共に読み込む
pub fn load_model_with_metadata(tar_gz_path: &Path) -> Result<(ModelMetadata, Vec<u8>)> {
    let mut archive = open_archive(tar_gz_path)?;

    let mut metadata_opt: Option<ModelMetadata> = None;
    let mut model_binary_opt: Option<Vec<u8>> = None;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().to_string();

        match name.as_str() {
            METADATA_ENTRY => {
                let mut json_str = String::new();
                entry.read_to_string(&mut json_str)?;
                metadata_opt = Some(ModelMetadata::from_json_string(&json_str)?);
            }
            MODEL_ENTRY => {
                let mut buffer = Vec::new();
                entry.read_to_end(&mut buffer)?;
                model_binary_opt = Some(buffer);
            }
            _ => {}
        }
    }

    match (metadata_opt, model_binary_opt) {
        (Some(metadata), Some(binary)) => Ok((metadata, binary)),
        (None, _) => Err(anyhow::anyhow!("metadata.json not found in tar.gz archive")),
        (_, None) => Err(anyhow::anyhow!("model.bin not found in tar.gz archive")),
    }
}

/// メタデータをコンソールに表示
pub fn print_metadata_info(metadata: &ModelMetadata) {
    println!("\n=== モデルメタデータ ===");
    println!("ラベル ({}): {}", metadata.num_classes(), metadata.labels.join(", "));
    println!("埋め込み次元: {}", metadata.embedding_dim);
    println!(
        "入力画像: {}x{} (mean: {}, scale: {}, channels_last: {}, resize: {})",
        metadata.image.image_width,
        metadata.image.image_height,
        metadata.image.mean,
        metadata.image.scale,
        metadata.image.channels_last,
        metadata.image.resize_mode
    );
    println!("画像フォルダ: {}", metadata.images_folder);
    println!("特徴抽出器: {}", metadata.extractor);
    if let Some(ref graph) = metadata.graph {
        println!("グラフ: {} ({} -> {})", graph.graph_path, graph.input_node, graph.output_node);
    }
    println!(
        "学習: {} 件, {} iterations, loss {:.6}, 収束: {}",
        metadata.training.num_examples,
        metadata.training.iterations,
        metadata.training.final_loss,
        metadata.training.converged
    );
    println!("学習日時: {}", metadata.trained_at);
    println!("========================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::training::TrainingReport;
    use crate::model::config::InceptionSettings;

    fn metadata() -> ModelMetadata {
        ModelMetadata::new(
            vec!["toaster".to_string(), "teapot".to_string()],
            3,
            InceptionSettings::default(),
            "images".to_string(),
            None,
            "test".to_string(),
            TrainingReport {
                num_examples: 4,
                iterations: 7,
                final_loss: 1.5,
                converged: true,
            },
        )
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = metadata();
        let saved = save_model_with_metadata(&dir.path().join("models/classifier"), &metadata, b"weights").unwrap();

        assert_eq!(saved, dir.path().join("models/classifier.tar.gz"));
        assert_eq!(load_metadata(&saved).unwrap(), metadata);
        assert_eq!(load_model_binary(&saved).unwrap(), b"weights".to_vec());

        let (m, binary) = load_model_with_metadata(&saved).unwrap();
        assert_eq!(m.labels, vec!["toaster", "teapot"]);
        assert_eq!(binary, b"weights".to_vec());
    }

    #[test]
    fn test_archive_path_keeps_gz() {
        assert_eq!(archive_path(Path::new("a/model.tar.gz")), PathBuf::from("a/model.tar.gz"));
        assert_eq!(archive_path(Path::new("a/model")), PathBuf::from("a/model.tar.gz"));
    }

    #[test]
    fn test_missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.tar.gz");

        let file = File::create(&path).unwrap();
        let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
        append_entry(&mut builder, METADATA_ENTRY, metadata().to_json_string().unwrap().as_bytes()).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        assert!(load_metadata(&path).is_ok());
        let err = load_model_with_metadata(&path).unwrap_err().to_string();
        assert!(err.contains("model.bin"), "{}", err);
    }

    #[test]
    fn test_missing_archive() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_metadata(&dir.path().join("nope.tar.gz")).is_err());
    }
}
