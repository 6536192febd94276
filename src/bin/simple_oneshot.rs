// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/simple_oneshot.rs - 单帧检测程序
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use url::Url;

use shanan_live::{
  FromUrl,
  config::{ConfigOverrides, DetectConfig},
  infer::ReplayInfer,
  input::ImageFileInput,
  label::ClassTable,
  model::Decoder,
  output::OutputWrapper,
  task::{OneShotTask, Task},
};
use tracing::info;

/// Shanan 单帧检测参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 推理后端，例如 replay:///path/to/output.bin?confidence=0.4&anchors=8400
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，例如 image:///path/to/picture.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出，例如 log:/// 或 folder:///path/to/dir
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 置信度阈值
  #[arg(long)]
  pub confidence: Option<f32>,
  /// NMS IoU 阈值
  #[arg(long)]
  pub iou: Option<f32>,
  #[arg(long)]
  pub input_width: Option<u32>,
  #[arg(long)]
  pub input_height: Option<u32>,
  /// 模型输出的候选框数量
  #[arg(long)]
  pub anchors: Option<usize>,
  /// 类别名称文件（每行一个或 JSON 数组），缺省为 COCO
  #[arg(long, value_name = "LABELS")]
  pub labels: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出: {}", args.output);

  // 模型 URL 的查询参数给出默认值，命令行参数优先
  let config = DetectConfig::from_url(&args.model)?.with_overrides(&ConfigOverrides {
    confidence_threshold: args.confidence,
    iou_threshold: args.iou,
    input_width: args.input_width,
    input_height: args.input_height,
    anchors: args.anchors,
  });
  config.validate()?;
  info!("检测参数: {:?}", config);

  let classes = match &args.labels {
    Some(path) => ClassTable::from_path(path)?,
    None => ClassTable::coco(),
  };
  info!("类别数量: {}", classes.len());

  let input = ImageFileInput::from_url(&args.input)?
    .into_frames(config.input_width, config.input_height)?;
  let model = ReplayInfer::from_url(&args.model)?;
  let output = OutputWrapper::from_url(&args.output)?;

  OneShotTask::new(Decoder::new(classes, &config), config.iou_threshold)
    .run_task(input, model, output)?;

  Ok(())
}
