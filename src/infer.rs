// 该文件是 Shanan （山南西风） 项目的一部分。
// src/infer.rs - 推理能力定义
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

use crate::tensor::Tensor;

/// 检测模型：输入 `(1, 3, H, W)` 张量，输出 `(4 + C, L)` 张量
///
/// 实现者负责模型加载与会话生命周期；调用耗时没有上界。
/// 推理在调度器的工作线程中执行，因此要求 `Send + 'static`。
pub trait Infer: Send + 'static {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(&mut self, input: &Tensor) -> Result<Tensor, Self::Error>;
}

/// 以闭包实现 [`Infer`]
pub struct InferFn<F>(pub F);

impl<F, E> Infer for InferFn<F>
where
  F: FnMut(&Tensor) -> Result<Tensor, E> + Send + 'static,
  E: std::error::Error + Send + Sync + 'static,
{
  type Error = E;

  fn infer(&mut self, input: &Tensor) -> Result<Tensor, Self::Error> {
    (self.0)(input)
  }
}

impl<M: Infer + ?Sized> Infer for Box<M> {
  type Error = M::Error;

  fn infer(&mut self, input: &Tensor) -> Result<Tensor, Self::Error> {
    (**self).infer(input)
  }
}

mod replay;
pub use self::replay::{ReplayInfer, ReplayInferError};
