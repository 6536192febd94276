// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/preprocess.rs - 模型输入预处理
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

use image::{RgbImage, imageops::FilterType};

use crate::tensor::{Tensor, TensorError};

const RGB_CHANNELS: usize = 3;

/// 缩放到模型输入尺寸并转为 `(1, 3, H, W)` 的归一化张量
///
/// 通道优先：先是全部红色分量，然后绿色、蓝色，取值 `pixel / 255`。
pub fn to_input_tensor(image: &RgbImage, width: u32, height: u32) -> Result<Tensor, TensorError> {
  let resized;
  let image = if image.dimensions() == (width, height) {
    image
  } else {
    resized = image::imageops::resize(image, width, height, FilterType::Triangle);
    &resized
  };

  let plane = (width as usize) * (height as usize);
  let mut data = vec![0.0f32; RGB_CHANNELS * plane];
  for (idx, pixel) in image.pixels().enumerate() {
    for c in 0..RGB_CHANNELS {
      data[c * plane + idx] = pixel[c] as f32 / 255.0;
    }
  }

  Tensor::new(data, &[1, RGB_CHANNELS, height as usize, width as usize])
}
