//! 画像の読み込み・リサイズ・画素抽出
//!
//! 学習時と推論時で同じ変換を使うため、設定は `ImageTransform` に固定して持ちます。

use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage, RgbImage};
use std::path::{Path, PathBuf};

use crate::model::config::{InceptionSettings, ResizeMode};

/// RGB
pub const CHANNELS: usize = 3;

/// 正規化済みの画素テンソル
#[derive(Debug, Clone, PartialEq)]
pub struct PixelTensor {
    pub data: Vec<f32>,
    pub width: usize,
    pub height: usize,
    /// trueなら [H, W, C]、falseなら [C, H, W] の順で平坦化
    pub channels_last: bool,
}

impl PixelTensor {
    /// バッチ次元付きの形状
    pub fn shape(&self) -> [usize; 4] {
        if self.channels_last {
            [1, self.height, self.width, CHANNELS]
        } else {
            [1, CHANNELS, self.height, self.width]
        }
    }
}

/// 画像前処理（読み込み → リサイズ → 画素抽出）
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTransform {
    images_folder: PathBuf,
    settings: InceptionSettings,
}

impl ImageTransform {
    pub fn new(images_folder: impl Into<PathBuf>, settings: InceptionSettings) -> Self {
        Self {
            images_folder: images_folder.into(),
            settings,
        }
    }

    pub fn images_folder(&self) -> &Path {
        &self.images_folder
    }

    pub fn settings(&self) -> &InceptionSettings {
        &self.settings
    }

    /// 画像フォルダ基準でパスを解決する（絶対パスはそのまま）
    pub fn resolve(&self, image_path: &str) -> PathBuf {
        self.images_folder.join(image_path)
    }

    /// 画像を読み込んで画素テンソルに変換
    pub fn load(&self, image_path: &str) -> Result<PixelTensor> {
        let path = self.resolve(image_path);
        let img = image::open(&path)
            .with_context(|| format!("Failed to load image: {}", path.display()))?;
        let resized = self.resize(img);
        Ok(self.extract_pixels(&resized))
    }

    /// 設定サイズへリサイズ
    pub fn resize(&self, img: DynamicImage) -> RgbImage {
        let width = self.settings.image_width;
        let height = self.settings.image_height;

        match self.settings.resize_mode {
            ResizeMode::Fill => img.resize_to_fill(width, height, FilterType::Triangle).to_rgb8(),
            ResizeMode::Stretch => img.resize_exact(width, height, FilterType::Triangle).to_rgb8(),
            ResizeMode::Pad => {
                let fitted = img.resize(width, height, FilterType::Triangle).to_rgb8();
                let mut canvas = RgbImage::new(width, height);
                let x = (width - fitted.width()) / 2;
                let y = (height - fitted.height()) / 2;
                image::imageops::overlay(&mut canvas, &fitted, x as i64, y as i64);
                canvas
            }
        }
    }

    /// 画素値を `(value - mean) * scale` で正規化して取り出す
    pub fn extract_pixels(&self, img: &RgbImage) -> PixelTensor {
        let (width, height) = img.dimensions();
        let mean = self.settings.mean;
        let scale = self.settings.scale;
        let normalize = |value: u8| (value as f32 - mean) * scale;

        let mut data = Vec::with_capacity(CHANNELS * width as usize * height as usize);

        if self.settings.channels_last {
            for pixel in img.pixels() {
                data.extend(pixel.0.iter().map(|&v| normalize(v)));
            }
        } else {
            for channel in 0..CHANNELS {
                for y in 0..height {
                    for x in 0..width {
                        data.push(normalize(img.get_pixel(x, y)[channel]));
                    }
                }
            }
        }

        PixelTensor {
            data,
            width: width as usize,
            height: height as usize,
            channels_last: self.settings.channels_last,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn settings(width: u32, height: u32, channels_last: bool) -> InceptionSettings {
        InceptionSettings {
            image_width: width,
            image_height: height,
            mean: 100.0,
            scale: 0.5,
            channels_last,
            resize_mode: ResizeMode::Stretch,
        }
    }

    /// 左が赤、右が青の2x1画像
    fn two_pixels() -> RgbImage {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([200, 100, 0]));
        img.put_pixel(1, 0, Rgb([0, 100, 200]));
        img
    }

    #[test]
    fn test_channels_last_layout() {
        let transform = ImageTransform::new("", settings(2, 1, true));
        let tensor = transform.extract_pixels(&two_pixels());

        assert_eq!(tensor.shape(), [1, 1, 2, 3]);
        assert_eq!(tensor.data, vec![50.0, 0.0, -50.0, -50.0, 0.0, 50.0]);
    }

    #[test]
    fn test_planar_layout() {
        let transform = ImageTransform::new("", settings(2, 1, false));
        let tensor = transform.extract_pixels(&two_pixels());

        assert_eq!(tensor.shape(), [1, 3, 1, 2]);
        assert_eq!(tensor.data, vec![50.0, -50.0, 0.0, 0.0, -50.0, 50.0]);
    }

    #[test]
    fn test_resize_modes_keep_target_size() {
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 20, Rgb([255, 255, 255])));

        for mode in [ResizeMode::Fill, ResizeMode::Stretch, ResizeMode::Pad] {
            let mut s = settings(16, 16, true);
            s.resize_mode = mode;
            let resized = ImageTransform::new("", s).resize(source.clone());
            assert_eq!(resized.dimensions(), (16, 16), "{}", mode);
        }
    }

    #[test]
    fn test_pad_fills_border_with_black() {
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 20, Rgb([255, 255, 255])));
        let mut s = settings(16, 16, true);
        s.resize_mode = ResizeMode::Pad;

        let resized = ImageTransform::new("", s).resize(source);
        assert_eq!(resized.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(resized.get_pixel(8, 8), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_load_missing_image() {
        let dir = tempfile::tempdir().unwrap();
        let transform = ImageTransform::new(dir.path(), settings(8, 8, true));

        let err = transform.load("missing.png").unwrap_err().to_string();
        assert!(err.contains("missing.png"), "{}", err);
    }

    #[test]
    fn test_load_resolves_against_folder() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(4, 4, Rgb([100, 100, 100]))
            .save(dir.path().join("gray.png"))
            .unwrap();
        let transform = ImageTransform::new(dir.path(), settings(8, 8, true));

        let tensor = transform.load("gray.png").unwrap();
        assert_eq!(tensor.data.len(), 8 * 8 * 3);
        assert!(tensor.data.iter().all(|&v| v == 0.0));
    }
}
