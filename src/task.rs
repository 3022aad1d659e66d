// 该文件是 Shibie （识别） 项目的一部分。
// src/task.rs - 后处理任务
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
  sync::mpsc::Receiver,
  thread,
  time::{Duration, Instant},
};
use tracing::{info, warn};

use crate::{model::Model, output::Render};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<TaskReport, Self::Error>;
}

/// 任务运行统计
#[derive(Debug, Default, Clone)]
pub struct TaskReport {
  pub frames: usize,
  pub timings: Vec<Duration>,
}

impl TaskReport {
  /// 跳过前 `warmup` 次后的平均耗时
  pub fn average(&self, warmup: usize) -> Option<Duration> {
    let measured = self.timings.get(warmup..)?;
    if measured.is_empty() {
      return None;
    }
    Some(measured.iter().sum::<Duration>() / measured.len() as u32)
  }
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

  fn run_task(self, mut input: I, model: M, output: O) -> Result<TaskReport, Self::Error> {
    info!("开始任务...");
    let tensor = input
      .next()
      .ok_or_else(|| anyhow::anyhow!("没有输入张量"))?;
    info!("输入张量获取成功，开始后处理...");
    let now = Instant::now();
    let result = model.infer(&tensor)?;
    let elapsed = now.elapsed();
    info!("后处理完成，耗时: {:.2?}", elapsed);
    output.render_result(&tensor, &result)?;
    info!("输出完成，总耗时: {:.2?}", now.elapsed());

    Ok(TaskReport {
      frames: 1,
      timings: vec![elapsed],
    })
  }
}

/// 对同一个输入重复后处理，统计平均耗时
pub struct RepeatShotTask {
  repeat: usize,
  warmup: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self {
      repeat: 1000,
      warmup: 2,
    }
  }
}

impl RepeatShotTask {
  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat;
    self
  }

  pub fn with_warmup(mut self, warmup: usize) -> Self {
    self.warmup = warmup;
    self
  }
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

  fn run_task(self, mut input: I, model: M, output: O) -> Result<TaskReport, Self::Error> {
    info!("开始任务...");
    let tensor = input
      .next()
      .ok_or_else(|| anyhow::anyhow!("没有输入张量"))?;
    info!("输入张量获取成功，重复后处理 {} 次...", self.repeat);

    let mut report = TaskReport {
      frames: 0,
      timings: Vec::with_capacity(self.repeat),
    };
    for i in 0..self.repeat {
      let now = Instant::now();
      let result = model.infer(&tensor)?;
      let elapsed = now.elapsed();
      info!("({})后处理完成，耗时: {:.2?}", i, elapsed);
      output.render_result(&tensor, &result)?;
      report.frames += 1;
      report.timings.push(elapsed);
    }

    match report.average(self.warmup) {
      Some(average) => warn!("平均后处理时间: {:.2?}", average),
      None => warn!("重复次数 {} 不足以跳过 {} 次预热", self.repeat, self.warmup),
    }

    Ok(report)
  }
}

#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 在收到停止信号或帧数达到上限前处理输入流
  pub fn run_until<F, D, ME, RE, I, M, O>(
    &self,
    input: I,
    model: M,
    output: O,
    stop: &Receiver<()>,
  ) -> anyhow::Result<TaskReport>
  where
    ME: std::error::Error + Sync + Send + 'static,
    RE: std::error::Error + Sync + Send + 'static,
    I: Iterator<Item = F>,
    M: Model<Input = F, Output = D, Error = ME>,
    O: Render<F, D, Error = RE>,
  {
    let mut report = TaskReport::default();
    for tensor in input {
      report.frames += 1;
      info!("处理第 {} 个输出张量", report.frames);
      let now = Instant::now();
      let result = model.infer(&tensor)?;
      let elapsed_a = now.elapsed();
      output.render_result(&tensor, &result)?;
      let elapsed_b = now.elapsed();
      info!("后处理完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);
      report.timings.push(elapsed_a);

      if self.frame_number.is_some_and(|n| report.frames >= n) {
        info!("达到指定帧数 {}, 退出任务循环", report.frames);
        break;
      }
      if stop.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!("任务完成，共处理 {} 帧", report.frames);
    Ok(report)
  }
}

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<TaskReport, Self::Error> {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;

    self.run_until(input, model, output, &rx)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn average_skips_warmup() {
    let report = TaskReport {
      frames: 4,
      timings: vec![
        Duration::from_millis(100),
        Duration::from_millis(2),
        Duration::from_millis(4),
        Duration::from_millis(6),
      ],
    };
    assert_eq!(report.average(1), Some(Duration::from_millis(4)));
    assert_eq!(report.average(4), None);
    assert_eq!(report.average(5), None);
    assert_eq!(TaskReport::default().average(0), None);
  }
}
