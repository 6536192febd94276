// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::{ImageReader, RgbImage};
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{InputError, InputFrame, to_input_tensor},
  tensor::Tensor,
};

/// 把一张静态图片当作采集源，可重复输出若干帧
///
/// URL 形式为 `image:///path/to/picture.jpg?repeat=100`，`repeat=0` 表示无限重复，
/// 缺省为 1。
pub struct ImageFileInput {
  image: RgbImage,
  repeat: Option<u64>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(InputError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }

    let mut repeat = Some(1);
    for (key, value) in url.query_pairs() {
      if key == "repeat" {
        let n = value.parse::<u64>().map_err(|_| InputError::InvalidQuery {
          key: key.to_string(),
          value: value.to_string(),
        })?;
        repeat = (n > 0).then_some(n);
      }
    }

    let path = url.path();
    let image = ImageReader::open(path)?.decode()?.to_rgb8();
    info!(
      "读取图像 {}: {}x{}",
      path,
      image.width(),
      image.height()
    );

    Ok(Self { image, repeat })
  }
}

impl ImageFileInput {
  pub fn new(image: RgbImage) -> Self {
    Self {
      image,
      repeat: Some(1),
    }
  }

  /// `None` 表示无限重复
  pub fn with_repeat(mut self, repeat: Option<u64>) -> Self {
    self.repeat = repeat;
    self
  }

  /// 预处理一次，之后每帧共享同一份图像和张量
  pub fn into_frames(self, input_width: u32, input_height: u32) -> Result<ImageFileFrames, InputError> {
    let tensor = to_input_tensor(&self.image, input_width, input_height)?;
    Ok(ImageFileFrames {
      image: Arc::new(self.image),
      tensor,
      remaining: self.repeat,
      index: 0,
    })
  }
}

pub struct ImageFileFrames {
  image: Arc<RgbImage>,
  tensor: Tensor,
  remaining: Option<u64>,
  index: u64,
}

impl Iterator for ImageFileFrames {
  type Item = InputFrame;

  fn next(&mut self) -> Option<Self::Item> {
    if let Some(remaining) = self.remaining.as_mut() {
      if *remaining == 0 {
        return None;
      }
      *remaining -= 1;
    }

    let frame = InputFrame {
      index: self.index,
      image: self.image.clone(),
      tensor: self.tensor.clone(),
    };
    self.index += 1;
    Some(frame)
  }
}
