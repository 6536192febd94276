// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 检测结果与后处理
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

use crate::geometry::BBox;

mod decoder;
mod nms;

pub use self::decoder::{DecodeError, Decoder, ScoreBuffer};
pub use self::nms::suppress;

/// 单个锚点位置解码出的候选，坐标位于模型输入空间
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
  pub class_id: usize,
  pub confidence: f32,
  pub center_x: f32,
  pub center_y: f32,
  pub width: f32,
  pub height: f32,
}

impl Candidate {
  /// 映射到目标图像坐标，`input` 为模型输入尺寸，`dest` 为目标图像尺寸
  pub fn to_bbox(&self, input: (f32, f32), dest: (f32, f32)) -> BBox {
    let (half_w, half_h) = (self.width / 2.0, self.height / 2.0);
    [
      (self.center_x - half_w) / input.0 * dest.0,
      (self.center_y - half_h) / input.1 * dest.1,
      (self.center_x + half_w) / input.0 * dest.0,
      (self.center_y + half_h) / input.1 * dest.1,
    ]
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: usize,
  pub label: Arc<str>,
  pub score: f32,
  pub bbox: BBox, // [x_min, y_min, x_max, y_max]，目标图像像素坐标
}

impl DetectItem {
  pub fn width(&self) -> f32 {
    self.bbox[2] - self.bbox[0]
  }

  pub fn height(&self) -> f32 {
    self.bbox[3] - self.bbox[1]
  }
}

/// 一次推理发布的完整结果，按置信度降序
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DetectItem> {
    self.items.iter()
  }

  /// 置信度最高的一项
  pub fn top(&self) -> Option<&DetectItem> {
    self
      .items
      .iter()
      .fold(None, |best: Option<&DetectItem>, item| match best {
        Some(b) if b.score >= item.score => Some(b),
        _ => Some(item),
      })
  }

  pub fn labels(&self) -> Vec<&str> {
    self.items.iter().map(|item| item.label.as_ref()).collect()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

impl<'a> IntoIterator for &'a DetectResult {
  type Item = &'a DetectItem;
  type IntoIter = std::slice::Iter<'a, DetectItem>;

  fn into_iter(self) -> Self::IntoIter {
    self.items.iter()
  }
}
