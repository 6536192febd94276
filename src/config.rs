// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 检测参数配置
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use thiserror::Error;
use url::Url;

use crate::FromUrl;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.7;
pub const DEFAULT_INPUT_WIDTH: u32 = 640;
pub const DEFAULT_INPUT_HEIGHT: u32 = 640;
/// 640x640 输入下三个检测头的锚点总数：80² + 40² + 20²
pub const DEFAULT_ANCHORS: usize = 8400;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("阈值 {name} 必须位于 [0, 1] 区间, 实际为 {value}")]
  ThresholdOutOfRange { name: &'static str, value: f32 },
  #[error("模型输入尺寸不能为 0: {width}x{height}")]
  EmptyInput { width: u32, height: u32 },
  #[error("锚点数量不能为 0")]
  NoAnchors,
  #[error("参数 {key} 的值无效: {value}")]
  InvalidValue { key: String, value: String },
}

/// 检测参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectConfig {
  /// 置信度阈值，最大类别分数不低于该值的位置才会输出
  pub confidence_threshold: f32,
  /// NMS IoU 阈值，重叠不低于该值的低分框被抑制
  pub iou_threshold: f32,
  /// 模型输入宽度
  pub input_width: u32,
  /// 模型输入高度
  pub input_height: u32,
  /// 输出张量的锚点（列）数量
  pub anchors: usize,
}

impl Default for DetectConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      input_width: DEFAULT_INPUT_WIDTH,
      input_height: DEFAULT_INPUT_HEIGHT,
      anchors: DEFAULT_ANCHORS,
    }
  }
}

impl DetectConfig {
  pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
    self.iou_threshold = threshold;
    self
  }

  pub fn with_input_size(mut self, width: u32, height: u32) -> Self {
    self.input_width = width;
    self.input_height = height;
    self
  }

  pub fn with_anchors(mut self, anchors: usize) -> Self {
    self.anchors = anchors;
    self
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    for (name, value) in [
      ("confidence", self.confidence_threshold),
      ("iou", self.iou_threshold),
    ] {
      if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ThresholdOutOfRange { name, value });
      }
    }

    if self.input_width == 0 || self.input_height == 0 {
      return Err(ConfigError::EmptyInput {
        width: self.input_width,
        height: self.input_height,
      });
    }

    if self.anchors == 0 {
      return Err(ConfigError::NoAnchors);
    }

    Ok(())
  }
}

/// 命令行等来源的覆盖项，`None` 保持原值
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConfigOverrides {
  pub confidence_threshold: Option<f32>,
  pub iou_threshold: Option<f32>,
  pub input_width: Option<u32>,
  pub input_height: Option<u32>,
  pub anchors: Option<usize>,
}

impl DetectConfig {
  /// 应用覆盖项，不做校验
  pub fn with_overrides(self, overrides: &ConfigOverrides) -> Self {
    Self {
      confidence_threshold: overrides
        .confidence_threshold
        .unwrap_or(self.confidence_threshold),
      iou_threshold: overrides.iou_threshold.unwrap_or(self.iou_threshold),
      input_width: overrides.input_width.unwrap_or(self.input_width),
      input_height: overrides.input_height.unwrap_or(self.input_height),
      anchors: overrides.anchors.unwrap_or(self.anchors),
    }
  }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
  value.parse().map_err(|_| ConfigError::InvalidValue {
    key: key.to_string(),
    value: value.to_string(),
  })
}

/// 从 URL 查询参数读取配置，未出现的参数保持默认值
///
/// 识别 `confidence`、`iou`、`width`、`height`、`anchors`，其余参数忽略。
impl FromUrl for DetectConfig {
  type Error = ConfigError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let mut config = DetectConfig::default();
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "confidence" => config.confidence_threshold = parse_value(&key, &value)?,
        "iou" => config.iou_threshold = parse_value(&key, &value)?,
        "width" => config.input_width = parse_value(&key, &value)?,
        "height" => config.input_height = parse_value(&key, &value)?,
        "anchors" => config.anchors = parse_value(&key, &value)?,
        _ => {}
      }
    }
    config.validate()?;
    Ok(config)
  }
}
