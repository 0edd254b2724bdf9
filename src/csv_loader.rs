use crate::types::ImageData;
use anyhow::{Context, Result};
use burn::data::dataset::InMemDataset;
use csv::ReaderBuilder;
use std::path::Path;

/// タグファイルの列数: [image_path, label]
const TAG_COLUMNS: usize = 2;

/// ヘッダー無しのTSV（画像パス<TAB>ラベル）を読み込む
pub fn load_tsv(path: &Path) -> Result<Vec<ImageData>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_path(path)
        .with_context(|| format!("Failed to open tag file: {}", path.display()))?;

    let mut records = Vec::new();

    for (line, result) in reader.records().enumerate() {
        let record = result
            .with_context(|| format!("{}: failed to read line {}", path.display(), line + 1))?;

        if record.len() != TAG_COLUMNS {
            anyhow::bail!(
                "{}: line {} has {} columns (expected {})",
                path.display(),
                line + 1,
                record.len(),
                TAG_COLUMNS
            );
        }

        let image_path = record.get(0).unwrap_or_default().trim();
        let label = record.get(1).unwrap_or_default().trim();
        if image_path.is_empty() {
            anyhow::bail!("{}: line {} has an empty image path", path.display(), line + 1);
        }
        if label.is_empty() {
            anyhow::bail!("{}: line {} has an empty label", path.display(), line + 1);
        }

        records.push(ImageData::new(image_path, label));
    }

    tracing::debug!("{} から {} 件読み込みました", path.display(), records.len());

    Ok(records)
}

/// TSVを読み込んでデータセットにする
pub fn load_dataset(path: &Path) -> Result<InMemDataset<ImageData>> {
    Ok(InMemDataset::new(load_tsv(path)?))
}
