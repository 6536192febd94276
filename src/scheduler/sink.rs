// 该文件是 Shanan （山南西风） 项目的一部分。
// src/scheduler/sink.rs - 推理错误上报
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

use std::{fmt, sync::mpsc};

use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  /// 推理调用失败：运行时错误、输入形状错误、资源耗尽或推理过程崩溃
  InferenceFailure,
  /// 输出长度与 `(4 + C) x L` 不符
  MalformedOutputTensor,
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ErrorKind::InferenceFailure => write!(f, "InferenceFailure"),
      ErrorKind::MalformedOutputTensor => write!(f, "MalformedOutputTensor"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
  pub kind: ErrorKind,
  pub message: String,
}

impl ErrorReport {
  pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
    }
  }
}

impl fmt::Display for ErrorReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.kind, self.message)
  }
}

/// 接收调度器上报的推理错误，每次失败调用一次
pub trait ErrorSink: Send + 'static {
  fn report(&self, report: ErrorReport);
}

/// 写入日志
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ErrorSink for LogSink {
  fn report(&self, report: ErrorReport) {
    error!("推理失败 [{}]: {}", report.kind, report.message);
  }
}

impl<S: ErrorSink + ?Sized> ErrorSink for Box<S> {
  fn report(&self, report: ErrorReport) {
    (**self).report(report)
  }
}

impl ErrorSink for mpsc::Sender<ErrorReport> {
  fn report(&self, report: ErrorReport) {
    // 接收端已关闭时丢弃
    let _ = self.send(report);
  }
}

/// 以闭包实现 [`ErrorSink`]
pub struct SinkFn<F>(pub F);

impl<F> ErrorSink for SinkFn<F>
where
  F: Fn(ErrorReport) + Send + 'static,
{
  fn report(&self, report: ErrorReport) {
    (self.0)(report)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn channel_sink_forwards_reports() {
    let (tx, rx) = mpsc::channel();
    tx.report(ErrorReport::new(ErrorKind::InferenceFailure, "npu reset"));
    let report = rx.recv().unwrap();
    assert_eq!(report.kind, ErrorKind::InferenceFailure);
    assert_eq!(report.to_string(), "InferenceFailure: npu reset");
  }

  #[test]
  fn closed_channel_is_ignored() {
    let (tx, rx) = mpsc::channel::<ErrorReport>();
    drop(rx);
    tx.report(ErrorReport::new(ErrorKind::MalformedOutputTensor, "short"));
  }
}
