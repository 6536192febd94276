// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::{
  path::{Path, PathBuf},
  sync::{Arc, Mutex, PoisonError},
};

use chrono::{Datelike, Utc};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::InputFrame,
  model::DetectResult,
  output::{LatestResult, Render, draw::Draw},
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 检测结果的文本记录，每行 `label, score, x_min, y_min, x_max, y_max`
pub struct Record {
  pub label_with_name: bool,
}

impl Record {
  pub fn format(&self, result: &DetectResult) -> String {
    result
      .iter()
      .map(|item| {
        let name = if self.label_with_name {
          item.label.to_string()
        } else {
          item.class_id.to_string()
        };
        format!(
          "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}",
          name, item.score, item.bbox[0], item.bbox[1], item.bbox[2], item.bbox[3]
        )
      })
      .collect::<Vec<_>>()
      .join("\n")
  }

  pub fn record(&self, result: &DetectResult, path: &Path) -> Result<(), std::io::Error> {
    std::fs::write(path.with_extension("txt"), self.format(result))
  }
}

/// 按日期分目录保存画框后的快照和文本记录
///
/// URL 形式为 `folder:///path/to/dir?record=id&always`：
/// `record=id` 记录类别编号而非名称，`always` 表示空结果也保存。
/// 每个发布的结果只保存一次。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: Draw,
  record: Record,
  frame_counter: Mutex<u16>,
  always: bool,
  latest: LatestResult,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let label_with_name = !uri.query_pairs().any(|(k, v)| k == "record" && v == "id");
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(Self::new(uri.path())
      .with_label_name(label_with_name)
      .with_always(always))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
      draw: Draw::default(),
      record: Record {
        label_with_name: true,
      },
      frame_counter: Mutex::new(0),
      always: false,
      latest: LatestResult::default(),
    }
  }

  pub fn with_label_name(mut self, label_with_name: bool) -> Self {
    self.record.label_with_name = label_with_name;
    self
  }

  pub fn with_always(mut self, always: bool) -> Self {
    self.always = always;
    self
  }

  fn frame_id(&self) -> u16 {
    let mut counter = self
      .frame_counter
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    *counter = counter.wrapping_add(1);
    *counter
  }

  fn frame_path(&self) -> Result<PathBuf, std::io::Error> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<InputFrame, Arc<DetectResult>> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(
    &self,
    frame: &InputFrame,
    result: &Arc<DetectResult>,
  ) -> Result<(), Self::Error> {
    if !self.latest.update(result) || (result.is_empty() && !self.always) {
      return Ok(());
    }

    let path = self.frame_path()?;
    let mut image = (*frame.image).clone();
    self.draw.draw_detections(&mut image, result);
    image.save(&path)?;
    self.record.record(result, &path)?;
    debug!("保存检测快照: {}", path.display());
    Ok(())
  }
}
