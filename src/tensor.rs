// 该文件是 Shanan （山南西风） 项目的一部分。
// src/tensor.rs - 张量定义
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

use thiserror::Error;

/// 几何行数：cx, cy, w, h
pub const GEOMETRY_ROWS: usize = 4;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TensorError {
  #[error("张量形状 {shape:?} 需要 {expected} 个元素, 实际为 {actual}")]
  ShapeMismatch {
    shape: Vec<usize>,
    expected: usize,
    actual: usize,
  },
  #[error("字节长度 {0} 不是 4 的倍数")]
  UnalignedBytes(usize),
}

/// 不可变的一维 f32 张量，附带逻辑形状
///
/// 数据由 `Arc` 共享，克隆只增加引用计数。
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
  data: Arc<[f32]>,
  shape: Box<[usize]>,
}

impl Tensor {
  pub fn new(data: impl Into<Arc<[f32]>>, shape: &[usize]) -> Result<Self, TensorError> {
    let data = data.into();
    let expected = shape.iter().product::<usize>();
    if expected != data.len() {
      return Err(TensorError::ShapeMismatch {
        shape: shape.to_vec(),
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      data,
      shape: shape.into(),
    })
  }

  /// 不带形状信息的一维张量
  pub fn flat(data: impl Into<Arc<[f32]>>) -> Self {
    let data = data.into();
    let shape: Box<[usize]> = Box::new([data.len()]);
    Self { data, shape }
  }

  /// 按小端序解析原始字节
  pub fn from_le_bytes(bytes: &[u8]) -> Result<Self, TensorError> {
    if bytes.len() % 4 != 0 {
      return Err(TensorError::UnalignedBytes(bytes.len()));
    }

    let data: Vec<f32> = bytes
      .chunks_exact(4)
      .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
      .collect();
    Ok(Self::flat(data))
  }

  pub fn data(&self) -> &[f32] {
    &self.data
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
}

impl AsRef<[f32]> for Tensor {
  fn as_ref(&self) -> &[f32] {
    &self.data
  }
}

/// 检测器输出布局：`(4 + classes)` 行，`anchors` 列，行优先展开
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLayout {
  pub classes: usize,
  pub anchors: usize,
}

impl OutputLayout {
  pub fn new(classes: usize, anchors: usize) -> Self {
    Self { classes, anchors }
  }

  pub fn rows(&self) -> usize {
    GEOMETRY_ROWS + self.classes
  }

  pub fn expected_len(&self) -> usize {
    self.rows() * self.anchors
  }

  /// 第 `row` 行的起始偏移
  pub fn row_offset(&self, row: usize) -> usize {
    row * self.anchors
  }

  /// 第 `class_id` 个类别分数行的起始偏移
  pub fn class_offset(&self, class_id: usize) -> usize {
    self.row_offset(GEOMETRY_ROWS + class_id)
  }
}
