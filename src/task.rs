// 该文件是 rknn-yolo-post 项目的一部分。
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

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::{model::Model, output::Render};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

pub struct OneShotTask;

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let result = model.infer(&frame)?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());
    output.render_result(&frame, &result)?;
    info!("输出完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 对同一帧重复推理用于测速，前两次视为预热不计入平均耗时。
/// 只有最后一次的结果交给输出。
#[derive(Debug)]
pub struct RepeatShotTask {
  times: usize,
}

const WARMUP_RUNS: usize = 2;

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { times: 10 }
  }
}

impl RepeatShotTask {
  pub fn with_times(mut self, times: usize) -> Self {
    self.times = times.max(1);
    self
  }

  pub fn times(&self) -> usize {
    self.times
  }
}

/// 跳过预热后的平均耗时；次数不足时退化为全部平均
pub fn average_elapsed(times: &[Duration]) -> Option<Duration> {
  let measured = if times.len() > WARMUP_RUNS {
    &times[WARMUP_RUNS..]
  } else {
    times
  };
  if measured.is_empty() {
    return None;
  }
  Some(measured.iter().sum::<Duration>() / measured.len() as u32)
}

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理，共 {} 次...", self.times);
    let mut times = Vec::with_capacity(self.times);
    let mut last = None;
    for i in 0..self.times {
      let now = Instant::now();
      let result = model.infer(&frame)?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", i, elapsed);
      times.push(elapsed);
      last = Some(result);
    }

    if let Some(avg) = average_elapsed(&times) {
      warn!("平均推理时间: {:.2?}", avg);
    }

    if let Some(result) = last {
      output.render_result(&frame, &result)?;
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::Cell;
  use thiserror::Error;

  #[derive(Error, Debug)]
  #[error("never")]
  struct Never;

  struct CountingModel<'a> {
    calls: &'a Cell<usize>,
  }

  impl Model for CountingModel<'_> {
    type Input = u8;
    type Output = usize;
    type Error = Never;

    fn infer(&self, input: &u8) -> Result<usize, Never> {
      self.calls.set(self.calls.get() + 1);
      Ok(*input as usize + self.calls.get())
    }
  }

  struct Recorder<'a> {
    seen: &'a Cell<Option<usize>>,
  }

  impl Render<u8, usize> for Recorder<'_> {
    type Error = Never;

    fn render_result(&self, _frame: &u8, result: &usize) -> Result<(), Never> {
      self.seen.set(Some(*result));
      Ok(())
    }
  }

  #[test]
  fn one_shot_runs_once() {
    let calls = Cell::new(0);
    let seen = Cell::new(None);
    OneShotTask
      .run_task(
        [10u8].into_iter(),
        CountingModel { calls: &calls },
        Recorder { seen: &seen },
      )
      .unwrap();
    assert_eq!(calls.get(), 1);
    assert_eq!(seen.get(), Some(11));
  }

  #[test]
  fn one_shot_without_frame_fails() {
    let calls = Cell::new(0);
    let seen = Cell::new(None);
    let result = OneShotTask.run_task(
      std::iter::empty::<u8>(),
      CountingModel { calls: &calls },
      Recorder { seen: &seen },
    );
    assert!(result.is_err());
    assert_eq!(calls.get(), 0);
  }

  #[test]
  fn repeat_shot_renders_last_result() {
    let calls = Cell::new(0);
    let seen = Cell::new(None);
    RepeatShotTask::default()
      .with_times(5)
      .run_task(
        [0u8].into_iter(),
        CountingModel { calls: &calls },
        Recorder { seen: &seen },
      )
      .unwrap();
    assert_eq!(calls.get(), 5);
    assert_eq!(seen.get(), Some(5));
  }

  #[test]
  fn repeat_shot_with_single_run() {
    let task = RepeatShotTask::default().with_times(0);
    assert_eq!(task.times(), 1);
  }

  #[test]
  fn average_skips_warmup() {
    let ms = Duration::from_millis;
    assert_eq!(average_elapsed(&[]), None);
    assert_eq!(average_elapsed(&[ms(8)]), Some(ms(8)));
    assert_eq!(average_elapsed(&[ms(50), ms(40)]), Some(ms(45)));
    assert_eq!(
      average_elapsed(&[ms(50), ms(40), ms(10), ms(20)]),
      Some(ms(15))
    );
  }
}
