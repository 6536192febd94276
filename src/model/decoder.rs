// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/decoder.rs - 检测器输出解码
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
use tracing::{debug, error};

use crate::{
  config::DetectConfig,
  label::ClassTable,
  model::{Candidate, DetectItem},
  tensor::{OutputLayout, Tensor},
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
  #[error("输出张量长度不匹配: 期望 {expected} ((4 + {classes}) x {anchors}), 实际为 {actual}")]
  MalformedOutputTensor {
    expected: usize,
    actual: usize,
    classes: usize,
    anchors: usize,
  },
}

/// 逐列最大类别分数的累加缓冲区
///
/// 按行扫描类别分数，每列维护 (类别, 分数)，初值为 (0, 0.0)。
/// 缓冲区在多次解码之间复用，稳态下不分配内存。
#[derive(Debug, Default)]
pub struct ScoreBuffer {
  best_class: Vec<u32>,
  best_score: Vec<f32>,
  candidates: Vec<Candidate>,
}

impl ScoreBuffer {
  fn reset(&mut self, anchors: usize) {
    self.best_class.clear();
    self.best_class.resize(anchors, 0);
    self.best_score.clear();
    self.best_score.resize(anchors, 0.0);
  }

  fn accumulate(&mut self, class_id: u32, row: &[f32]) {
    for ((score, best_score), best_class) in row
      .iter()
      .zip(self.best_score.iter_mut())
      .zip(self.best_class.iter_mut())
    {
      // 严格大于：分数相同时保留较小的类别编号
      if *score > *best_score {
        *best_score = *score;
        *best_class = class_id;
      }
    }
  }
}

/// 将 `(4 + C) x L` 的输出张量解码为目标图像空间中的检测框
#[derive(Debug, Clone)]
pub struct Decoder {
  classes: ClassTable,
  layout: OutputLayout,
  input_width: f32,
  input_height: f32,
  confidence_threshold: f32,
}

impl Decoder {
  pub fn new(classes: ClassTable, config: &DetectConfig) -> Self {
    let layout = OutputLayout::new(classes.len(), config.anchors);
    Self {
      classes,
      layout,
      input_width: config.input_width as f32,
      input_height: config.input_height as f32,
      confidence_threshold: config.confidence_threshold,
    }
  }

  pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn layout(&self) -> OutputLayout {
    self.layout
  }

  pub fn classes(&self) -> &ClassTable {
    &self.classes
  }

  pub fn confidence_threshold(&self) -> f32 {
    self.confidence_threshold
  }

  /// 在读取任何元素之前校验输出长度
  pub fn check(&self, output: &[f32]) -> Result<(), DecodeError> {
    let expected = self.layout.expected_len();
    if output.len() != expected {
      error!(
        "输出张量长度不匹配: 期望 {}, 实际为 {}",
        expected,
        output.len()
      );
      return Err(DecodeError::MalformedOutputTensor {
        expected,
        actual: output.len(),
        classes: self.layout.classes,
        anchors: self.layout.anchors,
      });
    }
    Ok(())
  }

  /// 逐列找出最大类别并按置信度阈值过滤，结果按列序追加到 `candidates`
  pub fn candidates_with(
    &self,
    output: &Tensor,
    scores: &mut ScoreBuffer,
    candidates: &mut Vec<Candidate>,
  ) -> Result<(), DecodeError> {
    let data = output.data();
    self.check(data)?;

    let anchors = self.layout.anchors;
    scores.reset(anchors);
    for class_id in 0..self.layout.classes {
      let offset = self.layout.class_offset(class_id);
      scores.accumulate(class_id as u32, &data[offset..offset + anchors]);
    }

    let cx = &data[self.layout.row_offset(0)..self.layout.row_offset(1)];
    let cy = &data[self.layout.row_offset(1)..self.layout.row_offset(2)];
    let w = &data[self.layout.row_offset(2)..self.layout.row_offset(3)];
    let h = &data[self.layout.row_offset(3)..self.layout.row_offset(4)];

    for col in 0..anchors {
      let confidence = scores.best_score[col];
      if confidence < self.confidence_threshold {
        continue;
      }
      candidates.push(Candidate {
        class_id: scores.best_class[col] as usize,
        confidence,
        center_x: cx[col],
        center_y: cy[col],
        width: w[col],
        height: h[col],
      });
    }

    Ok(())
  }

  /// 解码到 `items`，复用 `scores` 缓冲区；输出顺序为列序，未做重叠过滤
  pub fn decode_with(
    &self,
    output: &Tensor,
    dest_width: u32,
    dest_height: u32,
    scores: &mut ScoreBuffer,
    items: &mut Vec<DetectItem>,
  ) -> Result<(), DecodeError> {
    let mut candidates = std::mem::take(&mut scores.candidates);
    candidates.clear();
    if let Err(e) = self.candidates_with(output, scores, &mut candidates) {
      scores.candidates = candidates;
      return Err(e);
    }

    let input = (self.input_width, self.input_height);
    let dest = (dest_width as f32, dest_height as f32);
    items.reserve(candidates.len());
    for candidate in candidates.drain(..) {
      let Some(label) = self.classes.get(candidate.class_id) else {
        continue;
      };
      items.push(DetectItem {
        class_id: candidate.class_id,
        label: label.clone(),
        score: candidate.confidence,
        bbox: candidate.to_bbox(input, dest),
      });
    }
    scores.candidates = candidates;

    debug!("解码得到 {} 个候选框", items.len());
    Ok(())
  }

  pub fn decode(
    &self,
    output: &Tensor,
    dest_width: u32,
    dest_height: u32,
  ) -> Result<Vec<DetectItem>, DecodeError> {
    let mut items = Vec::new();
    self.decode_with(
      output,
      dest_width,
      dest_height,
      &mut ScoreBuffer::default(),
      &mut items,
    )?;
    Ok(items)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const ANCHORS: usize = 4;

  fn table() -> ClassTable {
    ClassTable::new(["person", "bicycle", "car"]).unwrap()
  }

  fn decoder(threshold: f32) -> Decoder {
    let config = DetectConfig::default()
      .with_anchors(ANCHORS)
      .with_confidence_threshold(threshold);
    Decoder::new(table(), &config)
  }

  /// 构造 (4 + 3) x 4 的输出张量
  struct OutputBuilder {
    data: Vec<f32>,
  }

  impl OutputBuilder {
    fn new() -> Self {
      Self {
        data: vec![0.0; (4 + 3) * ANCHORS],
      }
    }

    fn geometry(mut self, col: usize, cx: f32, cy: f32, w: f32, h: f32) -> Self {
      for (row, value) in [cx, cy, w, h].into_iter().enumerate() {
        self.data[row * ANCHORS + col] = value;
      }
      self
    }

    fn score(mut self, col: usize, class_id: usize, score: f32) -> Self {
      self.data[(4 + class_id) * ANCHORS + col] = score;
      self
    }

    fn build(self) -> Tensor {
      Tensor::new(self.data, &[1, 4 + 3, ANCHORS]).unwrap()
    }
  }

  #[test]
  fn scores_below_threshold_yield_nothing() {
    let output = OutputBuilder::new()
      .score(0, 0, 0.49)
      .score(1, 1, 0.3)
      .score(2, 2, 0.1)
      .score(3, 0, 0.4999)
      .build();
    assert!(decoder(0.5).decode(&output, 640, 640).unwrap().is_empty());
  }

  #[test]
  fn threshold_is_inclusive() {
    let output = OutputBuilder::new()
      .geometry(2, 100.0, 100.0, 20.0, 20.0)
      .score(2, 1, 0.5)
      .build();
    let items = decoder(0.5).decode(&output, 640, 640).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].class_id, 1);
    assert_eq!(items[0].label.as_ref(), "bicycle");
    assert_eq!(items[0].score, 0.5);
  }

  #[test]
  fn maps_to_destination_size() {
    let output = OutputBuilder::new()
      .geometry(0, 320.0, 320.0, 100.0, 50.0)
      .score(0, 2, 0.8)
      .build();
    let items = decoder(0.5).decode(&output, 1280, 720).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].bbox, [540.0, 331.875, 740.0, 388.125]);
  }

  #[test]
  fn ties_pick_lowest_class() {
    let output = OutputBuilder::new()
      .score(1, 2, 0.75)
      .score(1, 1, 0.75)
      .build();
    let items = decoder(0.5).decode(&output, 640, 640).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].class_id, 1);
  }

  #[test]
  fn zero_threshold_keeps_every_column() {
    let output = OutputBuilder::new().score(3, 2, 0.2).build();
    let items = decoder(0.0).decode(&output, 640, 640).unwrap();
    assert_eq!(items.len(), ANCHORS);
    for item in &items[..3] {
      assert_eq!(item.class_id, 0);
      assert_eq!(item.score, 0.0);
    }
    assert_eq!(items[3].class_id, 2);
  }

  #[test]
  fn negative_scores_never_beat_initial_accumulator() {
    let output = OutputBuilder::new().score(0, 1, -3.0).build();
    let items = decoder(0.0).decode(&output, 640, 640).unwrap();
    assert_eq!(items[0].class_id, 0);
    assert_eq!(items[0].score, 0.0);
  }

  #[test]
  fn rejects_malformed_output() {
    let output = Tensor::flat(vec![0.0; (4 + 3) * ANCHORS - 1]);
    assert_eq!(
      decoder(0.5).decode(&output, 640, 640),
      Err(DecodeError::MalformedOutputTensor {
        expected: 28,
        actual: 27,
        classes: 3,
        anchors: ANCHORS,
      })
    );
  }

  #[test]
  fn buffers_are_reused_between_calls() {
    let decoder = decoder(0.5);
    let mut scores = ScoreBuffer::default();
    let mut items = Vec::new();

    let first = OutputBuilder::new().score(0, 2, 0.9).build();
    decoder
      .decode_with(&first, 640, 640, &mut scores, &mut items)
      .unwrap();
    assert_eq!(items.len(), 1);

    // 上一次的最大分数不能泄漏到下一次
    items.clear();
    let second = OutputBuilder::new().score(1, 0, 0.6).build();
    decoder
      .decode_with(&second, 640, 640, &mut scores, &mut items)
      .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].class_id, 0);
  }

  #[test]
  fn single_confident_person_spans_the_frame() {
    let config = DetectConfig::default();
    let decoder = Decoder::new(ClassTable::coco(), &config);
    let layout = decoder.layout();
    let mut data = vec![0.0f32; layout.expected_len()];
    let col = 4200;
    for (row, value) in [320.0, 320.0, 640.0, 640.0].into_iter().enumerate() {
      data[layout.row_offset(row) + col] = value;
    }
    data[layout.class_offset(0) + col] = 0.9;

    let output = Tensor::new(data, &[1, layout.rows(), layout.anchors]).unwrap();
    let items = decoder.decode(&output, 640, 640).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].label.as_ref(), "person");
    assert_eq!(items[0].score, 0.9);
    assert_eq!(items[0].bbox, [0.0, 0.0, 640.0, 640.0]);
  }
}
