// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/log_output.rs - 日志输出
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

use std::{convert::Infallible, sync::Arc};

use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::InputFrame,
  model::DetectResult,
  output::{LatestResult, Render},
};

/// 把新发布的检测结果写入日志，同一结果只输出一次
#[derive(Debug, Default)]
pub struct LogOutput {
  latest: LatestResult,
}

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = Infallible;

  fn from_url(_url: &Url) -> Result<Self, Self::Error> {
    Ok(Self::default())
  }
}

impl LogOutput {
  /// 渲染并返回是否真正输出
  pub fn log_if_new(&self, frame: &InputFrame, result: &Arc<DetectResult>) -> bool {
    if !self.latest.update(result) {
      return false;
    }

    info!(
      "帧 {}: 检测到 {} 个对象",
      frame.index,
      result.len()
    );
    for item in result.iter() {
      info!(
        "  - {}: {:.2}% at ({:.0}, {:.0}, {:.0}x{:.0})",
        item.label,
        item.score * 100.0,
        item.bbox[0],
        item.bbox[1],
        item.width(),
        item.height()
      );
    }
    true
  }
}

impl Render<InputFrame, Arc<DetectResult>> for LogOutput {
  type Error = Infallible;

  fn render_result(
    &self,
    frame: &InputFrame,
    result: &Arc<DetectResult>,
  ) -> Result<(), Self::Error> {
    self.log_if_new(frame, result);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  #[test]
  fn logs_each_result_once() {
    let frame = InputFrame::new(0, RgbImage::new(4, 4), 4, 4).unwrap();
    let output = LogOutput::default();
    let result = Arc::new(DetectResult::default());

    assert!(output.log_if_new(&frame, &result));
    assert!(!output.log_if_new(&frame, &result));
    assert!(output.log_if_new(&frame, &Arc::new(DetectResult::default())));
  }
}
