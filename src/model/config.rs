//! アプリケーション設定管理モジュール
//!
//! 画像前処理・学習済みグラフ・学習器の設定をJSON形式で保存・読み込みします。
//! 設定ファイルが無い場合はコンパイル時の既定値を使います。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// リサイズ方法
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    /// アスペクト比を保って全面を覆うように拡大し、中央を切り出す
    #[default]
    Fill,
    /// アスペクト比を無視して指定サイズに合わせる
    Stretch,
    /// アスペクト比を保って収まるように縮小し、余白を黒で埋める
    Pad,
}

impl std::fmt::Display for ResizeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResizeMode::Fill => write!(f, "fill (iso crop)"),
            ResizeMode::Stretch => write!(f, "stretch"),
            ResizeMode::Pad => write!(f, "pad (iso pad)"),
        }
    }
}

/// 画像前処理の設定（Inceptionの入力仕様）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InceptionSettings {
    pub image_width: u32,
    pub image_height: u32,
    /// 画素値から引くオフセット
    pub mean: f32,
    /// オフセット後に掛ける係数
    pub scale: f32,
    /// trueならHWC（チャネル最後）、falseならCHW
    pub channels_last: bool,
    pub resize_mode: ResizeMode,
}

impl InceptionSettings {
    pub const IMAGE_WIDTH: u32 = 224;
    pub const IMAGE_HEIGHT: u32 = 224;
    pub const MEAN: f32 = 117.0;
    pub const SCALE: f32 = 1.0;
    pub const CHANNELS_LAST: bool = true;
}

impl Default for InceptionSettings {
    fn default() -> Self {
        Self {
            image_width: Self::IMAGE_WIDTH,
            image_height: Self::IMAGE_HEIGHT,
            mean: Self::MEAN,
            scale: Self::SCALE,
            channels_last: Self::CHANNELS_LAST,
            resize_mode: ResizeMode::default(),
        }
    }
}

/// 学習済みグラフの設定
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraphSettings {
    /// TensorFlowグラフ(.pb)のパス
    pub graph_path: String,
    /// 入力テンソル名
    pub input_node: String,
    /// 特徴量として取り出す中間テンソル名
    pub output_node: String,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            graph_path: "assets/inception/tensorflow_inception_graph.pb".to_string(),
            input_node: "input".to_string(),
            output_node: "softmax2_pre_activation".to_string(),
        }
    }
}

/// 入力ファイルのパス
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssetPaths {
    /// 画像フォルダ（タグファイル内の相対パスの基準）
    pub images_folder: String,
    pub train_tags: String,
    pub test_tags: String,
    /// 単体推論に使う画像
    pub predict_image: String,
}

impl Default for AssetPaths {
    fn default() -> Self {
        Self {
            images_folder: "assets/images".to_string(),
            train_tags: "assets/images/tags.tsv".to_string(),
            test_tags: "assets/images/test-tags.tsv".to_string(),
            predict_image: "assets/images/toa.jpg".to_string(),
        }
    }
}

/// 学習器（L-BFGS最大エントロピー）の設定
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainerSettings {
    /// L1正則化の重み（0なら通常のL-BFGS、正ならOWL-QN）
    pub l1_regularization: f64,
    /// L2正則化の重み
    pub l2_regularization: f64,
    /// 反復間の目的関数の変化がこれを下回ったら収束
    pub optimization_tolerance: f64,
    /// L-BFGSの履歴数
    pub history_size: usize,
    pub max_iterations: usize,
}

impl Default for TrainerSettings {
    fn default() -> Self {
        Self {
            l1_regularization: 1.0,
            l2_regularization: 1.0,
            optimization_tolerance: 1e-7,
            history_size: 20,
            max_iterations: 1000,
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub inception: InceptionSettings,
    #[serde(default)]
    pub graph: GraphSettings,
    #[serde(default)]
    pub paths: AssetPaths,
    #[serde(default)]
    pub trainer: TrainerSettings,
    /// tracingのフィルタ（例: "info", "image_classifier_lib=debug"）
    #[serde(default = "AppConfig::default_log_level")]
    pub log_level: String,
    /// 指定されていれば学習済みモデルをここへ保存する
    #[serde(default)]
    pub model_output: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            inception: InceptionSettings::default(),
            graph: GraphSettings::default(),
            paths: AssetPaths::default(),
            trainer: TrainerSettings::default(),
            log_level: Self::default_log_level(),
            model_output: None,
        }
    }
}

impl AppConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }

    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// 設定を読み込む、ファイルが存在しない場合はデフォルト設定を返す
    ///
    /// ファイルはあるが壊れている場合はエラー。
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let config = Self::load(path).map_err(|e| {
                anyhow::anyhow!("Failed to load config file {}: {}", path.display(), e)
            })?;
            tracing::debug!("設定ファイルを読み込みました: {}", path.display());
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 設定情報を表示
    pub fn display(&self) {
        println!("=== アプリケーション設定 ===");
        println!(
            "入力サイズ: {}x{} (mean: {}, scale: {}, channels_last: {}, resize: {})",
            self.inception.image_width,
            self.inception.image_height,
            self.inception.mean,
            self.inception.scale,
            self.inception.channels_last,
            self.inception.resize_mode
        );
        println!("グラフ: {}", self.graph.graph_path);
        println!("  入力: {} / 出力: {}", self.graph.input_node, self.graph.output_node);
        println!("画像フォルダ: {}", self.paths.images_folder);
        println!("学習データ: {}", self.paths.train_tags);
        println!("テストデータ: {}", self.paths.test_tags);
        println!(
            "L1: {}, L2: {}, tolerance: {}, history: {}, max_iter: {}",
            self.trainer.l1_regularization,
            self.trainer.l2_regularization,
            self.trainer.optimization_tolerance,
            self.trainer.history_size,
            self.trainer.max_iterations
        );
        if let Some(ref output) = self.model_output {
            println!("モデル保存先: {}", output);
        }
        println!("========================\n");
    }
}
