//! パイプライン全体で共有する明示的なコンテキスト
//!
//! 設定と計算デバイスをまとめ、構築・推論の各呼び出しに引数として渡します。
//! プロセス全体の暗黙の状態は持ちません。

use burn_ndarray::{NdArray, NdArrayDevice};

use crate::model::AppConfig;

/// 分類器の計算に使うバックエンド（CPU）
pub type ClassifierBackend = NdArray<f32>;

/// 分類器の構築・推論コンテキスト
#[derive(Debug, Clone)]
pub struct ClassifierContext {
    config: AppConfig,
    device: NdArrayDevice,
}

impl ClassifierContext {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            device: NdArrayDevice::Cpu,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn device(&self) -> &NdArrayDevice {
        &self.device
    }
}

impl Default for ClassifierContext {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}
