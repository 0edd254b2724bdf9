//! テスト用の特徴抽出器と合成データ

use anyhow::Result;
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};

use crate::ml::feature_extractor::FeatureExtractor;
use crate::ml::preprocess::{PixelTensor, CHANNELS};
use crate::model::config::{GraphSettings, InceptionSettings};

/// チャンネルごとの平均画素値を埋め込みとする抽出器
pub struct ChannelMeanExtractor;

impl FeatureExtractor for ChannelMeanExtractor {
    fn embedding_dim(&self) -> usize {
        CHANNELS
    }

    fn extract(&self, pixels: &PixelTensor) -> Result<Vec<f32>> {
        let area = pixels.width * pixels.height;
        if area == 0 || pixels.data.len() != area * CHANNELS {
            anyhow::bail!("Unexpected pixel tensor size {}", pixels.data.len());
        }

        let mut sums = [0.0f32; CHANNELS];
        for (i, value) in pixels.data.iter().enumerate() {
            let channel = if pixels.channels_last { i % CHANNELS } else { i / area };
            sums[channel] += value;
        }
        Ok(sums.iter().map(|sum| sum / area as f32).collect())
    }

    fn describe(&self) -> String {
        "channel-mean".to_string()
    }
}

/// 小さい画像で動かすための前処理設定
pub fn small_settings() -> InceptionSettings {
    InceptionSettings {
        image_width: 8,
        image_height: 8,
        mean: 117.0,
        scale: 1.0 / 117.0,
        ..InceptionSettings::default()
    }
}

/// `input`(Placeholder) → `mid`(Relu) → `out`(Sigmoid) の凍結グラフを書き出す
pub fn write_relu_graph(dir: &Path) -> GraphSettings {
    use tract_tensorflow::tfpb;
    use tract_tensorflow::tfpb::tensorflow::DataType;

    let path = dir.join("relu_graph.pb");
    tfpb::graph()
        .node(tfpb::node().name("input").op("Placeholder").attr("dtype", DataType::DtFloat))
        .node(tfpb::node().name("mid").op("Relu").input("input").attr("T", DataType::DtFloat))
        .node(tfpb::node().name("out").op("Sigmoid").input("mid").attr("T", DataType::DtFloat))
        .save_to(&path)
        .unwrap();

    GraphSettings {
        graph_path: path.to_string_lossy().to_string(),
        input_node: "input".to_string(),
        output_node: "mid".to_string(),
    }
}

/// 2x1画素をそのまま流す前処理設定
pub fn raw_pixel_settings() -> InceptionSettings {
    InceptionSettings {
        image_width: 2,
        image_height: 1,
        mean: 0.0,
        scale: 1.0,
        ..InceptionSettings::default()
    }
}

/// トースター（赤系）とティーポット（青系）の画像とタグファイルを書き出す
///
/// 戻り値は (学習用TSV, テスト用TSV)
pub fn write_toy_dataset(dir: &Path) -> (PathBuf, PathBuf) {
    let images = [
        ("toaster1.png", [240, 20, 10], "toaster"),
        ("toaster2.png", [220, 40, 30], "toaster"),
        ("toaster3.png", [250, 0, 40], "toaster"),
        ("teapot1.png", [10, 30, 240], "teapot"),
        ("teapot2.png", [30, 10, 220], "teapot"),
        ("teapot3.png", [0, 50, 250], "teapot"),
        ("toaster_test.png", [230, 30, 20], "toaster"),
        ("teapot_test.png", [20, 20, 230], "teapot"),
    ];
    for (name, rgb, _) in &images {
        // 縦長にしてリサイズの経路も通す
        RgbImage::from_pixel(12, 20, Rgb(*rgb)).save(dir.join(name)).unwrap();
    }

    let train: String = images[..6]
        .iter()
        .map(|(name, _, label)| format!("{}\t{}\n", name, label))
        .collect();
    let test: String = images[6..]
        .iter()
        .map(|(name, _, label)| format!("{}\t{}\n", name, label))
        .collect();

    let train_path = dir.join("tags.tsv");
    let test_path = dir.join("test-tags.tsv");
    std::fs::write(&train_path, train).unwrap();
    std::fs::write(&test_path, test).unwrap();
    (train_path, test_path)
}
