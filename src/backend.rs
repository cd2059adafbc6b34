// 该文件是 Xifeng （西风） 项目的一部分。
// src/backend.rs - 执行后端
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

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::BackendMode;
use crate::tensor::{InputTensorSet, RawOutputSet};

#[cfg(feature = "graph_executor")]
mod graph;
#[cfg(feature = "graph_executor")]
pub use self::graph::GraphExecutor;

#[cfg(feature = "zero_copy_predictor")]
mod predictor;
#[cfg(feature = "zero_copy_predictor")]
pub use self::predictor::ZeroCopyPredictor;

#[cfg(test)]
mod fixture;

/// 模型目录下的计算图文件名
pub const MODEL_FILE: &str = "model.onnx";

#[derive(Error, Debug)]
pub enum BackendError {
  #[error("GPU 加速不可用: {0}")]
  AccelerationUnavailable(String),
  #[error("运行模式 {0} 需要 GPU 加速")]
  PrecisionRequiresAcceleration(RunMode),
  #[error("不支持的运行模式: {0}")]
  UnsupportedPrecision(RunMode),
  #[error("执行后端 {0} 未编译")]
  ModeUnavailable(&'static str),
  #[error("模型文件不存在: {}", .0.display())]
  ModelNotFound(PathBuf),
  #[error("计算图错误: {0}")]
  Graph(String),
  #[cfg(feature = "zero_copy_predictor")]
  #[error("ONNX Runtime 错误: {0}")]
  Runtime(#[from] ort::Error),
  #[error("缺少模型输入: {0}")]
  MissingInput(String),
  #[error("张量形状错误: {0}")]
  TensorShape(String),
  #[error("不支持的输出数据类型: {0}")]
  UnsupportedDtype(String),
  #[error("无效的设备: {0}")]
  InvalidDevice(String),
  #[error("无效的运行模式: {0}")]
  InvalidRunMode(String),
}

/// 推理设备
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
  #[default]
  Cpu,
  Gpu(u32),
}

impl FromStr for Device {
  type Err = BackendError;

  /// 接受 `cpu`、`gpu` 与 `gpu:N`
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "cpu" => Ok(Device::Cpu),
      "gpu" => Ok(Device::Gpu(0)),
      other => other
        .strip_prefix("gpu:")
        .and_then(|id| id.parse().ok())
        .map(Device::Gpu)
        .ok_or_else(|| BackendError::InvalidDevice(s.to_string())),
    }
  }
}

impl fmt::Display for Device {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Device::Cpu => write!(f, "cpu"),
      Device::Gpu(id) => write!(f, "gpu:{}", id),
    }
  }
}

/// 运行精度模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
  #[default]
  Fluid,
  TrtFp32,
  TrtFp16,
  TrtInt8,
}

impl RunMode {
  pub fn uses_tensorrt(self) -> bool {
    !matches!(self, RunMode::Fluid)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      RunMode::Fluid => "fluid",
      RunMode::TrtFp32 => "trt_fp32",
      RunMode::TrtFp16 => "trt_fp16",
      RunMode::TrtInt8 => "trt_int8",
    }
  }
}

impl FromStr for RunMode {
  type Err = BackendError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "fluid" => Ok(RunMode::Fluid),
      "trt_fp32" => Ok(RunMode::TrtFp32),
      "trt_fp16" => Ok(RunMode::TrtFp16),
      "trt_int8" => Ok(RunMode::TrtInt8),
      _ => Err(BackendError::InvalidRunMode(s.to_string())),
    }
  }
}

impl fmt::Display for RunMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 执行后端的构造选项，只在构造时生效
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PredictorOptions {
  pub device: Device,
  pub run_mode: RunMode,
  pub min_subgraph_size: u32,
  /// CPU 线程数，0 表示由运行时决定
  pub threads: usize,
}

impl PredictorOptions {
  /// 在读取任何模型文件之前检查选项组合
  pub fn validate(&self, mode: BackendMode) -> Result<(), BackendError> {
    if self.run_mode == RunMode::TrtInt8 {
      error!("不支持运行模式 {}", self.run_mode);
      return Err(BackendError::UnsupportedPrecision(self.run_mode));
    }
    if self.run_mode.uses_tensorrt() && self.device == Device::Cpu {
      error!("运行模式 {} 需要 GPU, 当前设备为 {}", self.run_mode, self.device);
      return Err(BackendError::PrecisionRequiresAcceleration(self.run_mode));
    }

    match mode {
      BackendMode::Interpreted => {
        if !cfg!(feature = "graph_executor") {
          return Err(BackendError::ModeUnavailable("graph_executor"));
        }
        if self.device != Device::Cpu {
          error!("解释执行后端只支持 CPU, 请求的设备为 {}", self.device);
          return Err(BackendError::AccelerationUnavailable(
            "解释执行后端只支持 CPU".to_string(),
          ));
        }
      }
      BackendMode::Optimized => {
        if !cfg!(feature = "zero_copy_predictor") {
          return Err(BackendError::ModeUnavailable("zero_copy_predictor"));
        }
        if matches!(self.device, Device::Gpu(_)) && !cfg!(feature = "cuda") {
          error!("请求设备 {}, 但未启用 cuda 特性", self.device);
          return Err(BackendError::AccelerationUnavailable(
            "未启用 cuda 特性".to_string(),
          ));
        }
        if self.run_mode.uses_tensorrt() && !cfg!(feature = "tensorrt") {
          error!("请求运行模式 {}, 但未启用 tensorrt 特性", self.run_mode);
          return Err(BackendError::AccelerationUnavailable(
            "未启用 tensorrt 特性".to_string(),
          ));
        }
      }
    }
    Ok(())
  }
}

/// 执行后端：按固定约定喂入输入并取回原始输出
pub trait ExecutionBackend: Send {
  fn name(&self) -> &'static str;

  /// 执行一次推理
  fn run_once(&mut self, inputs: &InputTensorSet) -> Result<RawOutputSet, BackendError>;

  /// 预热 `warmup` 次后计时执行 `max(repeats, 1)` 次，
  /// 返回最后一次的输出与平均耗时（毫秒）
  fn run(
    &mut self,
    inputs: &InputTensorSet,
    warmup: usize,
    repeats: usize,
  ) -> Result<(RawOutputSet, f64), BackendError> {
    for _ in 0..warmup {
      self.run_once(inputs)?;
    }

    let repeats = repeats.max(1);
    let start = Instant::now();
    let mut outputs = self.run_once(inputs)?;
    for _ in 1..repeats {
      outputs = self.run_once(inputs)?;
    }
    let average_ms = start.elapsed().as_secs_f64() * 1000.0 / repeats as f64;
    debug!(
      "{} 推理 {} 次, 平均耗时: {:.3} ms",
      self.name(),
      repeats,
      average_ms
    );

    Ok((outputs, average_ms))
  }
}

/// 按执行模式打开模型目录下的计算图
pub fn open_backend(
  model_dir: &Path,
  mode: BackendMode,
  options: &PredictorOptions,
) -> Result<Box<dyn ExecutionBackend>, BackendError> {
  options.validate(mode)?;
  let model_path = model_dir.join(MODEL_FILE);
  info!("打开执行后端 {:?}: {}", mode, model_path.display());

  match mode {
    #[cfg(feature = "graph_executor")]
    BackendMode::Interpreted => Ok(Box::new(GraphExecutor::load(&model_path)?)),
    #[cfg(feature = "zero_copy_predictor")]
    BackendMode::Optimized => Ok(Box::new(ZeroCopyPredictor::load(&model_path, options)?)),
    #[allow(unreachable_patterns)]
    BackendMode::Interpreted => Err(BackendError::ModeUnavailable("graph_executor")),
    #[allow(unreachable_patterns)]
    BackendMode::Optimized => Err(BackendError::ModeUnavailable("zero_copy_predictor")),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tensor::HostTensor;

  struct CountingBackend {
    calls: usize,
  }

  impl ExecutionBackend for CountingBackend {
    fn name(&self) -> &'static str {
      "counting"
    }

    fn run_once(&mut self, _inputs: &InputTensorSet) -> Result<RawOutputSet, BackendError> {
      self.calls += 1;
      let mut outputs = RawOutputSet::new();
      outputs.push("calls", HostTensor::from_i32(vec![1], vec![self.calls as i32]));
      Ok(outputs)
    }
  }

  #[test]
  fn test_run_warmup_and_repeats() {
    let mut backend = CountingBackend { calls: 0 };
    let (outputs, average_ms) = backend.run(&InputTensorSet::new(), 3, 4).unwrap();
    assert_eq!(backend.calls, 7);
    assert_eq!(outputs.get(0).map(|t| t.to_i64()[[0]]), Some(7));
    assert!(average_ms >= 0.0);
  }

  #[test]
  fn test_zero_repeats_runs_once() {
    let mut backend = CountingBackend { calls: 0 };
    backend.run(&InputTensorSet::new(), 0, 0).unwrap();
    assert_eq!(backend.calls, 1);
  }

  #[test]
  fn test_parse_device_and_run_mode() {
    assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
    assert_eq!("GPU".parse::<Device>().unwrap(), Device::Gpu(0));
    assert_eq!("gpu:2".parse::<Device>().unwrap(), Device::Gpu(2));
    assert!("npu".parse::<Device>().is_err());
    assert!("gpu:x".parse::<Device>().is_err());

    assert_eq!("trt_fp16".parse::<RunMode>().unwrap(), RunMode::TrtFp16);
    assert!("trt_fp64".parse::<RunMode>().is_err());
    assert_eq!(RunMode::TrtInt8.to_string(), "trt_int8");
  }

  #[test]
  fn test_reduced_precision_without_gpu() {
    let options = PredictorOptions {
      run_mode: RunMode::TrtFp16,
      ..Default::default()
    };
    for mode in [BackendMode::Optimized, BackendMode::Interpreted] {
      assert!(matches!(
        options.validate(mode),
        Err(BackendError::PrecisionRequiresAcceleration(RunMode::TrtFp16))
      ));
    }
    // 构造在读取模型之前失败
    let result = open_backend(Path::new("/nonexistent/xifeng"), BackendMode::Optimized, &options);
    assert!(matches!(
      result,
      Err(BackendError::PrecisionRequiresAcceleration(_))
    ));
  }

  #[test]
  fn test_int8_unsupported() {
    let options = PredictorOptions {
      device: Device::Gpu(0),
      run_mode: RunMode::TrtInt8,
      ..Default::default()
    };
    assert!(matches!(
      options.validate(BackendMode::Optimized),
      Err(BackendError::UnsupportedPrecision(RunMode::TrtInt8))
    ));
  }

  #[test]
  fn test_interpreted_rejects_gpu() {
    let options = PredictorOptions {
      device: Device::Gpu(0),
      ..Default::default()
    };
    assert!(options.validate(BackendMode::Interpreted).is_err());
  }

  #[cfg(not(feature = "cuda"))]
  #[test]
  fn test_gpu_without_cuda_feature() {
    let options = PredictorOptions {
      device: Device::Gpu(1),
      ..Default::default()
    };
    assert!(matches!(
      options.validate(BackendMode::Optimized),
      Err(BackendError::AccelerationUnavailable(_))
    ));
  }

  #[cfg(feature = "graph_executor")]
  #[test]
  fn test_missing_model_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = open_backend(dir.path(), BackendMode::Interpreted, &PredictorOptions::default());
    assert!(matches!(result, Err(BackendError::ModelNotFound(_))));
  }
}
