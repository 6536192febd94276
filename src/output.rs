// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output.rs - 输出定义
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

use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::InputFrame, model::DetectResult};

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

mod log_output;
pub use self::log_output::LogOutput;

#[cfg(feature = "directory_record")]
pub mod draw;

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 记住上一次渲染的结果，用于判断是否有新结果发布
///
/// 结果整体替换发布，比较 `Arc` 指针即可。
#[derive(Debug, Default)]
pub struct LatestResult {
  last: Mutex<Option<Arc<DetectResult>>>,
}

impl LatestResult {
  /// 与上一次不同时记录并返回 `true`
  pub fn update(&self, result: &Arc<DetectResult>) -> bool {
    let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
    if last.as_ref().is_some_and(|prev| Arc::ptr_eq(prev, result)) {
      return false;
    }
    *last = Some(result.clone());
    true
  }
}

pub enum OutputWrapper {
  Log(LogOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogOutput::SCHEME => Ok(OutputWrapper::Log(LogOutput::default())),
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Render<InputFrame, Arc<DetectResult>> for OutputWrapper {
  type Error = OutputError;

  fn render_result(
    &self,
    frame: &InputFrame,
    result: &Arc<DetectResult>,
  ) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Log(output) => match output.render_result(frame, result) {
        Ok(()) => Ok(()),
        Err(never) => match never {},
      },
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }
}
