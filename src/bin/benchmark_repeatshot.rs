// 该文件是 Xifeng （西风） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 重复推理计时
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

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use xifeng::{
  FromUrl,
  detector::DetectorBuilder,
  input::ImageFileInput,
  output::OutputWrapper,
  task::{RepeatShotTask, Task},
};

/// Xifeng 推理计时
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型目录
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入图像或目录
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 结果输出
  #[arg(long, value_name = "OUTPUT", default_value = "log://")]
  pub output: Url,
  /// 预热次数
  #[arg(long, default_value_t = 10)]
  pub warmup: usize,
  /// 计时推理次数
  #[arg(long, default_value_t = 10)]
  pub repeats: usize,
  /// 只计时后端推理，不含预处理与解码
  #[arg(long)]
  pub backend_only: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  info!("模型目录: {}", args.model);
  info!("输入来源: {}", args.input);

  let input = ImageFileInput::from_url(&args.input)?;
  let mut detector = DetectorBuilder::from_url(&args.model)?.build()?;

  if args.backend_only {
    let threshold = detector.threshold();
    let mut total = 0.0;
    let mut count = 0usize;
    for image in input {
      let (result, average_ms) = detector.predict_timed(&image, threshold, args.warmup, args.repeats)?;
      info!("({})检测数量: {}, 推理时间: {:.3} ms", count, result.len(), average_ms);
      total += average_ms;
      count += 1;
    }
    if count > 0 {
      warn!("共 {} 帧, 平均推理时间: {:.3} ms", count, total / count as f64);
    }
    return Ok(());
  }

  let output = OutputWrapper::from_url(&args.output)?
    .with_labels(detector.config().labels())
    .with_threshold(detector.threshold());
  let task = RepeatShotTask {
    warmup: args.warmup,
    repeats: args.repeats,
  };
  task.run_task(input, &mut detector, output)?;

  Ok(())
}
