// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 推理任务
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
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread,
  time::{Duration, Instant},
};
use tracing::{debug, info, warn};

use crate::{
  infer::Infer,
  input::InputFrame,
  model::{DetectResult, Decoder, suppress},
  output::Render,
  scheduler::{Admission, ErrorSink, InferenceScheduler, LogSink},
};

/// 原版前端的绘制间隔
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(30);

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 对第一帧同步执行一次完整的推理、解码、抑制与渲染
pub struct OneShotTask {
  decoder: Decoder,
  iou_threshold: f32,
}

impl OneShotTask {
  pub fn new(decoder: Decoder, iou_threshold: f32) -> Self {
    Self {
      decoder,
      iou_threshold,
    }
  }
}

impl<I, M, O, RE> Task<I, M, O> for OneShotTask
where
  I: Iterator<Item = InputFrame>,
  M: Infer,
  O: Render<InputFrame, Arc<DetectResult>, Error = RE>,
  RE: std::error::Error + Sync + Send + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let raw = model.infer(&frame.tensor)?;
    let elapsed = now.elapsed();
    info!("推理完成，耗时: {:.2?}", elapsed);

    let items = self.decoder.decode(&raw, frame.width(), frame.height())?;
    let result = Arc::new(DetectResult::from(suppress(items, self.iou_threshold)));
    output.render_result(&frame, &result)?;
    info!(
      "渲染完成，{} 个检测框，耗时: {:.2?}",
      result.len(),
      now.elapsed()
    );

    Ok(())
  }
}

/// 按固定节拍采集并渲染，推理在后台单飞执行
///
/// 每个节拍把当前帧交给调度器（忙碌则丢弃），然后用最近发布的结果渲染当前帧。
/// 输入耗尽、达到帧数上限或停止标志被置位时退出，退出前等待进行中的推理完成。
pub struct ContinuousTask {
  decoder: Decoder,
  iou_threshold: f32,
  interval: Duration,
  frame_number: Option<usize>,
  stop: Option<Arc<AtomicBool>>,
  sink: Box<dyn ErrorSink>,
}

impl ContinuousTask {
  pub fn new(decoder: Decoder, iou_threshold: f32) -> Self {
    Self {
      decoder,
      iou_threshold,
      interval: DEFAULT_TICK_INTERVAL,
      frame_number: None,
      stop: None,
      sink: Box::new(LogSink),
    }
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_interval(mut self, interval: Duration) -> Self {
    self.interval = interval;
    self
  }

  pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
    self.stop = Some(stop);
    self
  }

  pub fn with_error_sink<S: ErrorSink>(mut self, sink: S) -> Self {
    self.sink = Box::new(sink);
    self
  }
}

impl<I, M, O, RE> Task<I, M, O> for ContinuousTask
where
  I: Iterator<Item = InputFrame>,
  M: Infer,
  O: Render<InputFrame, Arc<DetectResult>, Error = RE>,
  RE: std::error::Error + Sync + Send + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let scheduler =
      InferenceScheduler::spawn(model, self.decoder, self.iou_threshold, self.sink)?;
    let slot = scheduler.slot();

    let mut frame_index = 0usize;
    let mut last_frame = None;
    let mut next_tick = Instant::now();
    for frame in input {
      frame_index += 1;
      match scheduler.tick(frame.tensor.clone(), frame.width(), frame.height()) {
        Admission::Admitted => debug!("第 {} 帧提交推理", frame_index),
        Admission::Dropped => debug!("第 {} 帧被跳过", frame_index),
        Admission::Closed => {
          warn!("推理线程已退出，结束任务循环");
          break;
        }
      }

      output.render_result(&frame, &slot.load())?;
      last_frame = Some(frame);

      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if self.stop.as_ref().is_some_and(|s| s.load(Ordering::SeqCst)) {
        warn!("中断信号接收，退出任务循环");
        break;
      }

      next_tick += self.interval;
      let now = Instant::now();
      if next_tick > now {
        thread::sleep(next_tick - now);
      } else {
        next_tick = now;
      }
    }

    let stats = scheduler.shutdown();
    // 最后一次推理可能在循环结束后才完成
    if let Some(frame) = last_frame {
      output.render_result(&frame, &slot.load())?;
    }

    info!(
      "任务完成: {} 帧, 推理 {} 次 (成功 {}, 失败 {}), 跳过 {} 帧",
      frame_index, stats.admitted, stats.completed, stats.failed, stats.dropped
    );
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    config::DetectConfig,
    infer::InferFn,
    label::ClassTable,
    scheduler::ErrorReport,
    tensor::Tensor,
  };
  use image::RgbImage;
  use std::{convert::Infallible, sync::Mutex, sync::mpsc};

  const ANCHORS: usize = 2;

  fn decoder() -> Decoder {
    let config = DetectConfig::default()
      .with_anchors(ANCHORS)
      .with_input_size(8, 8);
    Decoder::new(ClassTable::new(["person", "car"]).unwrap(), &config)
  }

  /// 第 1 列是一辆车，占满整个输入
  fn car_output() -> Tensor {
    #[rustfmt::skip]
    let data = vec![
      0.0, 4.0, // cx
      0.0, 4.0, // cy
      0.0, 8.0, // w
      0.0, 8.0, // h
      0.0, 0.1, // person
      0.0, 0.8, // car
    ];
    Tensor::new(data, &[6, ANCHORS]).unwrap()
  }

  #[derive(Default)]
  struct Recorder {
    renders: Mutex<Vec<(u64, Vec<String>)>>,
  }

  impl Render<InputFrame, Arc<DetectResult>> for &Recorder {
    type Error = Infallible;

    fn render_result(
      &self,
      frame: &InputFrame,
      result: &Arc<DetectResult>,
    ) -> Result<(), Self::Error> {
      let labels = result.labels().into_iter().map(String::from).collect();
      self.renders.lock().unwrap().push((frame.index, labels));
      Ok(())
    }
  }

  fn frames(count: u64) -> impl Iterator<Item = InputFrame> {
    let frame = InputFrame::new(0, RgbImage::new(16, 16), 8, 8).unwrap();
    (0..count).map(move |index| InputFrame {
      index,
      ..frame.clone()
    })
  }

  #[test]
  fn one_shot_renders_suppressed_result() {
    let recorder = Recorder::default();
    let model = InferFn(|_: &Tensor| Ok::<_, std::io::Error>(car_output()));
    OneShotTask::new(decoder(), 0.7)
      .run_task(frames(1), model, &recorder)
      .unwrap();

    let renders = recorder.renders.lock().unwrap();
    assert_eq!(renders.as_slice(), &[(0, vec!["car".to_string()])]);
  }

  #[test]
  fn one_shot_without_frames_fails() {
    let recorder = Recorder::default();
    let model = InferFn(|_: &Tensor| Ok::<_, std::io::Error>(car_output()));
    assert!(
      OneShotTask::new(decoder(), 0.7)
        .run_task(frames(0), model, &recorder)
        .is_err()
    );
  }

  #[test]
  fn continuous_renders_every_tick_and_final_result() {
    let recorder = Recorder::default();
    let model = InferFn(|_: &Tensor| {
      thread::sleep(Duration::from_millis(20));
      Ok::<_, std::io::Error>(car_output())
    });

    ContinuousTask::new(decoder(), 0.7)
      .with_interval(Duration::from_millis(2))
      .run_task(frames(5), model, &recorder)
      .unwrap();

    let renders = recorder.renders.lock().unwrap();
    // 每帧一次，外加退出前的一次
    assert_eq!(renders.len(), 6);
    assert!(renders[0].1.is_empty());
    assert_eq!(renders[5], (4, vec!["car".to_string()]));
  }

  #[test]
  fn continuous_stops_on_frame_limit_and_flag() {
    let recorder = Recorder::default();
    let model = InferFn(|_: &Tensor| Ok::<_, std::io::Error>(car_output()));
    ContinuousTask::new(decoder(), 0.7)
      .with_interval(Duration::ZERO)
      .with_frame_number(Some(3))
      .run_task(frames(10), model, &recorder)
      .unwrap();
    assert_eq!(recorder.renders.lock().unwrap().len(), 4);

    let recorder = Recorder::default();
    let model = InferFn(|_: &Tensor| Ok::<_, std::io::Error>(car_output()));
    let stop = Arc::new(AtomicBool::new(true));
    ContinuousTask::new(decoder(), 0.7)
      .with_stop_flag(stop)
      .run_task(frames(10), model, &recorder)
      .unwrap();
    assert_eq!(recorder.renders.lock().unwrap().len(), 2);
  }

  #[test]
  fn continuous_reports_failures_to_sink() {
    let recorder = Recorder::default();
    let (tx, rx) = mpsc::channel::<ErrorReport>();
    let model = InferFn(|_: &Tensor| Err::<Tensor, _>(std::io::Error::other("npu reset")));

    ContinuousTask::new(decoder(), 0.7)
      .with_interval(Duration::from_millis(1))
      .with_error_sink(tx)
      .run_task(frames(3), model, &recorder)
      .unwrap();

    let reports: Vec<_> = rx.try_iter().collect();
    assert!(!reports.is_empty());
    assert!(reports.iter().all(|r| r.message.contains("npu reset")));
    assert!(
      recorder
        .renders
        .lock()
        .unwrap()
        .iter()
        .all(|(_, labels)| labels.is_empty())
    );
  }
}
