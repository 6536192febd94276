// 该文件是 Shanan （山南西风） 项目的一部分。
// src/scheduler.rs - 单飞推理调度
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

//! 采集循环与推理线程之间的调度。
//!
//! 采集端每个节拍调用 [`InferenceScheduler::tick`]，调度器空闲时把输入交给
//! 推理线程，忙碌时直接丢弃该帧，不排队。推理完成后解码、NMS，并整体替换
//! [`DetectionSlot`] 中的结果；失败时保留旧结果并上报错误。已提交的推理不可取消。

use std::{
  any::Any,
  panic::{self, AssertUnwindSafe},
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
    mpsc::{self, Receiver, SyncSender, TrySendError},
  },
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use arc_swap::ArcSwap;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  infer::Infer,
  model::{DetectResult, Decoder, ScoreBuffer, suppress},
  tensor::Tensor,
};

mod sink;
pub use self::sink::{ErrorKind, ErrorReport, ErrorSink, LogSink, SinkFn};

#[derive(Error, Debug)]
pub enum SchedulerError {
  #[error("无法启动推理线程: {0}")]
  Spawn(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
  Idle,
  Busy,
}

/// 一次节拍的准入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
  /// 已交给推理线程
  Admitted,
  /// 推理进行中，该帧被丢弃
  Dropped,
  /// 推理线程已退出
  Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
  pub admitted: u64,
  pub dropped: u64,
  pub completed: u64,
  pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
  admitted: AtomicU64,
  dropped: AtomicU64,
  completed: AtomicU64,
  failed: AtomicU64,
}

impl Counters {
  fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  fn snapshot(&self) -> SchedulerStats {
    SchedulerStats {
      admitted: self.admitted.load(Ordering::Relaxed),
      dropped: self.dropped.load(Ordering::Relaxed),
      completed: self.completed.load(Ordering::Relaxed),
      failed: self.failed.load(Ordering::Relaxed),
    }
  }
}

#[derive(Debug, Default)]
struct Published {
  generation: u64,
  result: Arc<DetectResult>,
}

/// 最近一次发布的检测结果
///
/// 结果与发布次数一起以 `Arc` 原子替换，读者拿到的总是完整的旧结果或完整的新结果，
/// 读取不加锁，也不会等待进行中的发布。只有推理线程发布。
#[derive(Debug, Default)]
pub struct DetectionSlot {
  current: ArcSwap<Published>,
}

impl DetectionSlot {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn load(&self) -> Arc<DetectResult> {
    self.current.load().result.clone()
  }

  /// 发布次数，每次成功推理加一
  pub fn generation(&self) -> u64 {
    self.current.load().generation
  }

  pub fn snapshot(&self) -> (u64, Arc<DetectResult>) {
    let current = self.current.load();
    (current.generation, current.result.clone())
  }

  fn publish(&self, result: DetectResult) -> u64 {
    let generation = self.current.load().generation + 1;
    self.current.store(Arc::new(Published {
      generation,
      result: Arc::new(result),
    }));
    generation
  }
}

#[derive(Debug, Default)]
struct Shared {
  busy: AtomicBool,
  slot: Arc<DetectionSlot>,
  counters: Counters,
}

struct Job {
  input: Tensor,
  dest_width: u32,
  dest_height: u32,
}

/// 单飞推理调度器
///
/// 同一时刻最多只有一个推理调用在执行。
pub struct InferenceScheduler {
  shared: Arc<Shared>,
  jobs: Option<SyncSender<Job>>,
  worker: Option<JoinHandle<()>>,
}

impl InferenceScheduler {
  /// 启动推理线程，`model` 归该线程所有
  pub fn spawn<M, S>(
    model: M,
    decoder: Decoder,
    iou_threshold: f32,
    sink: S,
  ) -> Result<Self, SchedulerError>
  where
    M: Infer,
    S: ErrorSink,
  {
    let shared = Arc::new(Shared::default());
    let (jobs, rx) = mpsc::sync_channel(1);

    let worker = Worker {
      model,
      decoder,
      iou_threshold,
      sink,
      shared: shared.clone(),
      scores: ScoreBuffer::default(),
    };
    let handle = thread::Builder::new()
      .name("shanan-infer".to_string())
      .spawn(move || worker.run(rx))?;
    info!("推理线程已启动, NMS 阈值: {}", iou_threshold);

    Ok(Self {
      shared,
      jobs: Some(jobs),
      worker: Some(handle),
    })
  }

  /// 提交当前帧；忙碌时丢弃，从不阻塞
  pub fn tick(&self, input: Tensor, dest_width: u32, dest_height: u32) -> Admission {
    let Some(jobs) = &self.jobs else {
      return Admission::Closed;
    };
    if self.worker.as_ref().is_some_and(JoinHandle::is_finished) {
      warn!("推理线程已退出，无法提交");
      return Admission::Closed;
    }

    if self
      .shared
      .busy
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      Counters::bump(&self.shared.counters.dropped);
      debug!("推理进行中，丢弃当前帧");
      return Admission::Dropped;
    }

    let job = Job {
      input,
      dest_width,
      dest_height,
    };
    match jobs.try_send(job) {
      Ok(()) => {
        Counters::bump(&self.shared.counters.admitted);
        debug!("提交推理: 目标尺寸 {}x{}", dest_width, dest_height);
        Admission::Admitted
      }
      Err(TrySendError::Full(_)) => {
        // 队列里已有任务，由它负责清除忙碌标记
        Counters::bump(&self.shared.counters.dropped);
        Admission::Dropped
      }
      Err(TrySendError::Disconnected(_)) => {
        self.shared.busy.store(false, Ordering::Release);
        warn!("推理线程已退出，无法提交");
        Admission::Closed
      }
    }
  }

  pub fn state(&self) -> SchedulerState {
    if self.shared.busy.load(Ordering::Acquire) {
      SchedulerState::Busy
    } else {
      SchedulerState::Idle
    }
  }

  pub fn slot(&self) -> Arc<DetectionSlot> {
    self.shared.slot.clone()
  }

  pub fn latest(&self) -> Arc<DetectResult> {
    self.shared.slot.load()
  }

  pub fn stats(&self) -> SchedulerStats {
    self.shared.counters.snapshot()
  }

  /// 轮询等待空闲，超时返回 `false`
  pub fn wait_idle(&self, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while self.state() == SchedulerState::Busy {
      if Instant::now() >= deadline {
        return false;
      }
      thread::sleep(Duration::from_millis(1));
    }
    true
  }

  /// 关闭提交通道并等待推理线程退出，进行中的推理会执行完毕
  pub fn shutdown(mut self) -> SchedulerStats {
    self.close();
    self.stats()
  }

  fn close(&mut self) {
    drop(self.jobs.take());
    if let Some(handle) = self.worker.take() {
      if handle.join().is_err() {
        error!("推理线程异常退出");
      }
      debug!("推理线程已结束");
    }
  }
}

impl Drop for InferenceScheduler {
  fn drop(&mut self) {
    self.close();
  }
}

struct Worker<M, S> {
  model: M,
  decoder: Decoder,
  iou_threshold: f32,
  sink: S,
  shared: Arc<Shared>,
  scores: ScoreBuffer,
}

/// 离开作用域时清除忙碌标记，推理线程崩溃时也不会卡在 Busy
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

impl<M: Infer, S: ErrorSink> Worker<M, S> {
  fn run(mut self, jobs: Receiver<Job>) {
    let shared = self.shared.clone();
    while let Ok(job) = jobs.recv() {
      let _busy = BusyGuard(&shared.busy);
      let started = Instant::now();
      match self.cycle(&job) {
        Ok(result) => {
          let count = result.len();
          let generation = self.shared.slot.publish(result);
          Counters::bump(&self.shared.counters.completed);
          debug!(
            "第 {} 次发布: {} 个检测框, 耗时 {:.2?}",
            generation,
            count,
            started.elapsed()
          );
        }
        Err(report) => {
          Counters::bump(&self.shared.counters.failed);
          warn!("推理失败，保留上一次结果, 耗时 {:.2?}", started.elapsed());
          let sink = &self.sink;
          if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| sink.report(report))) {
            error!("{}", panic_message("错误上报崩溃", payload.as_ref()));
          }
        }
      }
    }
  }

  fn cycle(&mut self, job: &Job) -> Result<DetectResult, ErrorReport> {
    let model = &mut self.model;
    let output = match panic::catch_unwind(AssertUnwindSafe(|| model.infer(&job.input))) {
      Ok(Ok(output)) => output,
      Ok(Err(e)) => return Err(ErrorReport::new(ErrorKind::InferenceFailure, e.to_string())),
      Err(payload) => {
        return Err(ErrorReport::new(
          ErrorKind::InferenceFailure,
          panic_message("推理过程崩溃", payload.as_ref()),
        ));
      }
    };

    let mut items = Vec::new();
    self
      .decoder
      .decode_with(
        &output,
        job.dest_width,
        job.dest_height,
        &mut self.scores,
        &mut items,
      )
      .map_err(|e| ErrorReport::new(ErrorKind::MalformedOutputTensor, e.to_string()))?;

    Ok(DetectResult::from(suppress(items, self.iou_threshold)))
  }
}

fn panic_message(context: &str, payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    format!("{}: {}", context, message)
  } else if let Some(message) = payload.downcast_ref::<String>() {
    format!("{}: {}", context, message)
  } else {
    context.to_string()
  }
}
