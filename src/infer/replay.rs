// 该文件是 Shanan （山南西风） 项目的一部分。
// src/infer/replay.rs - 回放录制的模型输出
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

use std::{thread, time::Duration};

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  infer::Infer,
  tensor::{Tensor, TensorError},
};

#[derive(Error, Debug)]
pub enum ReplayInferError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际为 '{actual}'")]
  SchemeMismatch {
    expected: &'static str,
    actual: String,
  },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("张量错误: {0}")]
  TensorError(#[from] TensorError),
  #[error("参数 {key} 的值无效: {value}")]
  InvalidQuery { key: String, value: String },
  #[error("输入张量为空")]
  EmptyInput,
}

/// 回放一份录制好的输出张量（小端 f32 原始数据）
///
/// URL 形式为 `replay:///path/to/output.bin?delay_ms=120`，
/// `delay_ms` 用于模拟推理耗时。
pub struct ReplayInfer {
  output: Tensor,
  delay: Duration,
}

impl FromUrlWithScheme for ReplayInfer {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayInfer {
  type Error = ReplayInferError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际为 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ReplayInferError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }

    let mut delay = Duration::ZERO;
    for (key, value) in url.query_pairs() {
      if key == "delay_ms" {
        let ms = value
          .parse::<u64>()
          .map_err(|_| ReplayInferError::InvalidQuery {
            key: key.to_string(),
            value: value.to_string(),
          })?;
        delay = Duration::from_millis(ms);
      }
    }

    info!("加载录制的模型输出: {}", url.path());
    let bytes = std::fs::read(url.path())?;
    let output = Tensor::from_le_bytes(&bytes)?;
    debug!("输出张量元素数量: {}", output.len());

    Ok(Self { output, delay })
  }
}

impl ReplayInfer {
  pub fn new(output: Tensor) -> Self {
    Self {
      output,
      delay: Duration::ZERO,
    }
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }
}

impl Infer for ReplayInfer {
  type Error = ReplayInferError;

  fn infer(&mut self, input: &Tensor) -> Result<Tensor, Self::Error> {
    if input.is_empty() {
      return Err(ReplayInferError::EmptyInput);
    }
    if !self.delay.is_zero() {
      thread::sleep(self.delay);
    }
    Ok(self.output.clone())
  }
}
