// 该文件是 Xifeng （西风） 项目的一部分。
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

/// 只处理第一帧
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

  fn run_task(self, mut input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let result = model.infer(&frame)?;
    let elapsed = now.elapsed();
    info!("推理完成，耗时: {:.2?}", elapsed);
    output.render_result(&frame, &result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 对每一帧预热后重复推理，统计端到端平均耗时
#[derive(Debug, Clone, Copy)]
pub struct RepeatShotTask {
  pub warmup: usize,
  pub repeats: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self {
      warmup: 10,
      repeats: 10,
    }
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

  fn run_task(self, input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    let repeats = self.repeats.max(1);
    info!("开始任务: 预热 {} 次, 重复 {} 次", self.warmup, repeats);

    let mut frame_count = 0usize;
    let mut total = Duration::ZERO;
    for frame in input {
      frame_count += 1;
      for _ in 0..self.warmup {
        model.infer(&frame)?;
      }

      let now = Instant::now();
      let mut result = model.infer(&frame)?;
      for _ in 1..repeats {
        result = model.infer(&frame)?;
      }
      let average = now.elapsed() / repeats as u32;
      info!("({})平均推理时间: {:.2?}", frame_count, average);
      total += average;

      output.render_result(&frame, &result)?;
    }

    if frame_count == 0 {
      return Err(anyhow::anyhow!("没有输入帧"));
    }
    warn!(
      "共 {} 帧, 平均推理时间: {:.2?}",
      frame_count,
      total / frame_count as u32
    );

    Ok(())
  }
}

/// 逐帧处理，可限制最大帧数
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
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
> Task<I, M, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let mut frame_index = 0;
    let mut now = Instant::now();
    for frame in input {
      frame_index += 1;
      info!("处理第 {} 帧图像", frame_index);
      let result = model.infer(&frame)?;
      let elapsed_a = now.elapsed();
      output.render_result(&frame, &result)?;
      let elapsed_b = now.elapsed();
      now = Instant::now();
      info!("推理完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);
      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
    }

    info!("任务完成，共处理 {} 帧", frame_index);
    Ok(())
  }
}
