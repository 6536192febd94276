// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use std::sync::Arc;

use image::RgbImage;
use thiserror::Error;

use crate::tensor::{Tensor, TensorError};

mod preprocess;
pub use self::preprocess::to_input_tensor;

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileFrames, ImageFileInput};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际为 '{actual}'")]
  SchemeMismatch {
    expected: &'static str,
    actual: String,
  },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("张量错误: {0}")]
  TensorError(#[from] TensorError),
  #[error("参数 {key} 的值无效: {value}")]
  InvalidQuery { key: String, value: String },
}

/// 采集到的一帧：原始图像及其预处理后的模型输入
#[derive(Debug, Clone)]
pub struct InputFrame {
  pub index: u64,
  pub image: Arc<RgbImage>,
  pub tensor: Tensor,
}

impl InputFrame {
  pub fn new(
    index: u64,
    image: RgbImage,
    input_width: u32,
    input_height: u32,
  ) -> Result<Self, TensorError> {
    let tensor = to_input_tensor(&image, input_width, input_height)?;
    Ok(Self {
      index,
      image: Arc::new(image),
      tensor,
    })
  }

  /// 目标图像宽度，即检测框坐标所在空间
  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}
