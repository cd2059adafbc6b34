// 该文件是 Xifeng （西风） 项目的一部分。
// src/backend/predictor.rs - 零拷贝预测器后端
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

use std::borrow::Cow;
use std::path::Path;

use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::{Session, SessionInputValue};
use ort::value::{DynValue, Tensor};
use tracing::{debug, error, info};

use super::{BackendError, Device, ExecutionBackend, PredictorOptions};
use crate::tensor::{HostTensor, InputTensorSet, RawOutputSet};

/// 运行时分配的输入张量，形状与类型不变时跨调用复用
struct InputSlot {
  shape: Vec<usize>,
  dtype: &'static str,
  value: DynValue,
}

/// 编译后的预测器
///
/// 输入按会话声明的输入名排列后拷贝进预测器持有的张量，
/// 输出按固定位置取回。
pub struct ZeroCopyPredictor {
  session: Session,
  input_names: Vec<String>,
  output_names: Vec<String>,
  slots: Vec<Option<InputSlot>>,
}

impl ZeroCopyPredictor {
  pub fn load<P: AsRef<Path>>(model_path: P, options: &PredictorOptions) -> Result<Self, BackendError> {
    let path = model_path.as_ref();
    if !path.exists() {
      error!("模型文件不存在: {}", path.display());
      return Err(BackendError::ModelNotFound(path.to_path_buf()));
    }

    info!("创建预测器: {} ({}, {})", path.display(), options.device, options.run_mode);
    let mut builder = Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;
    if options.threads > 0 {
      debug!("CPU 线程数: {}", options.threads);
      builder = builder.with_intra_threads(options.threads)?;
    }
    if let Device::Gpu(device_id) = options.device {
      builder = with_acceleration(builder, device_id, options)?;
    }

    let session = builder.commit_from_file(path)?;
    let input_names: Vec<String> = session.inputs.iter().map(|input| input.name.clone()).collect();
    let output_names: Vec<String> = session.outputs.iter().map(|output| output.name.clone()).collect();
    debug!("预测器输入: {:?}", input_names);
    debug!("预测器输出: {:?}", output_names);
    info!("预测器创建完成");

    let slots = input_names.iter().map(|_| None).collect();
    Ok(Self {
      session,
      input_names,
      output_names,
      slots,
    })
  }

  pub fn input_names(&self) -> &[String] {
    &self.input_names
  }

  pub fn output_names(&self) -> &[String] {
    &self.output_names
  }
}

#[cfg(feature = "cuda")]
fn with_acceleration(
  builder: SessionBuilder,
  device_id: u32,
  options: &PredictorOptions,
) -> Result<SessionBuilder, BackendError> {
  use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};

  let cuda = CUDAExecutionProvider::default().with_device_id(device_id as i32);
  if !cuda.is_available()? {
    error!("CUDA 执行提供程序不可用");
    return Err(BackendError::AccelerationUnavailable(
      "CUDA 执行提供程序不可用".to_string(),
    ));
  }

  let mut providers = Vec::new();
  #[cfg(feature = "tensorrt")]
  {
    use ort::execution_providers::TensorRTExecutionProvider;

    if options.run_mode.uses_tensorrt() {
      let tensorrt = TensorRTExecutionProvider::default()
        .with_device_id(device_id as i32)
        .with_fp16(options.run_mode == super::RunMode::TrtFp16)
        .with_min_subgraph_size(options.min_subgraph_size as usize);
      if !tensorrt.is_available()? {
        error!("TensorRT 执行提供程序不可用");
        return Err(BackendError::AccelerationUnavailable(
          "TensorRT 执行提供程序不可用".to_string(),
        ));
      }
      providers.push(tensorrt.build().error_on_failure());
    }
  }
  debug!("GPU {} 运行模式: {}", device_id, options.run_mode);
  providers.push(cuda.build().error_on_failure());

  Ok(builder.with_execution_providers(providers)?)
}

#[cfg(not(feature = "cuda"))]
fn with_acceleration(
  _builder: SessionBuilder,
  device_id: u32,
  _options: &PredictorOptions,
) -> Result<SessionBuilder, BackendError> {
  error!("请求 GPU {}, 但未启用 cuda 特性", device_id);
  Err(BackendError::AccelerationUnavailable(
    "未启用 cuda 特性".to_string(),
  ))
}

fn to_value(tensor: &HostTensor) -> Result<DynValue, BackendError> {
  let shape = tensor.shape().to_vec();
  let value = match tensor {
    HostTensor::F32(a) => {
      Tensor::from_array((shape, a.iter().copied().collect::<Vec<_>>().into_boxed_slice()))?.into_dyn()
    }
    HostTensor::I32(a) => {
      Tensor::from_array((shape, a.iter().copied().collect::<Vec<_>>().into_boxed_slice()))?.into_dyn()
    }
    HostTensor::I64(a) => {
      Tensor::from_array((shape, a.iter().copied().collect::<Vec<_>>().into_boxed_slice()))?.into_dyn()
    }
  };
  Ok(value)
}

/// 将数据原地拷贝进已分配的输入张量
fn refill(value: &mut DynValue, tensor: &HostTensor) -> Result<(), BackendError> {
  fn copy<T: Copy>(dst: &mut [T], src: impl Iterator<Item = T>) {
    for (d, s) in dst.iter_mut().zip(src) {
      *d = s;
    }
  }

  match tensor {
    HostTensor::F32(a) => copy(value.try_extract_tensor_mut::<f32>()?.1, a.iter().copied()),
    HostTensor::I32(a) => copy(value.try_extract_tensor_mut::<i32>()?.1, a.iter().copied()),
    HostTensor::I64(a) => copy(value.try_extract_tensor_mut::<i64>()?.1, a.iter().copied()),
  }
  Ok(())
}

fn dims(shape: &[i64]) -> Vec<usize> {
  shape.iter().map(|&d| d.max(0) as usize).collect()
}

fn from_value(value: &DynValue) -> Result<HostTensor, BackendError> {
  let host = if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
    HostTensor::try_f32(&dims(shape), data.to_vec())
  } else if let Ok((shape, data)) = value.try_extract_tensor::<i32>() {
    HostTensor::try_i32(&dims(shape), data.to_vec())
  } else if let Ok((shape, data)) = value.try_extract_tensor::<i64>() {
    HostTensor::try_i64(&dims(shape), data.to_vec())
  } else {
    return Err(BackendError::UnsupportedDtype(format!("{:?}", value.dtype())));
  };
  host.map_err(|e| BackendError::TensorShape(e.to_string()))
}

impl ExecutionBackend for ZeroCopyPredictor {
  fn name(&self) -> &'static str {
    "ZeroCopyPredictor"
  }

  fn run_once(&mut self, inputs: &InputTensorSet) -> Result<RawOutputSet, BackendError> {
    for (name, slot) in self.input_names.iter().zip(self.slots.iter_mut()) {
      let tensor = inputs.get(name).ok_or_else(|| {
        error!("预测器需要输入 {}, 但未提供", name);
        BackendError::MissingInput(name.clone())
      })?;
      match slot {
        Some(slot) if slot.shape == tensor.shape() && slot.dtype == tensor.dtype() => {
          refill(&mut slot.value, tensor)?
        }
        _ => {
          debug!("分配输入张量 {}: {:?} {}", name, tensor.shape(), tensor.dtype());
          *slot = Some(InputSlot {
            shape: tensor.shape().to_vec(),
            dtype: tensor.dtype(),
            value: to_value(tensor)?,
          });
        }
      }
    }

    let feeds: Vec<(Cow<'_, str>, SessionInputValue<'_>)> = self
      .input_names
      .iter()
      .zip(&self.slots)
      .filter_map(|(name, slot)| {
        slot
          .as_ref()
          .map(|slot| (Cow::Borrowed(name.as_str()), SessionInputValue::from(slot.value.view())))
      })
      .collect();

    let outputs = self.session.run(feeds)?;
    let mut raw = RawOutputSet::new();
    for (name, value) in outputs.iter() {
      raw.push(name, from_value(&value)?);
    }
    if raw.len() != self.output_names.len() {
      return Err(BackendError::TensorShape(format!(
        "预测器声明 {} 个输出, 实际为 {}",
        self.output_names.len(),
        raw.len()
      )));
    }
    Ok(raw)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_missing_model() {
    let result = ZeroCopyPredictor::load("/nonexistent/xifeng/model.onnx", &PredictorOptions::default());
    assert!(matches!(result, Err(BackendError::ModelNotFound(_))));
  }

  #[test]
  fn test_dims_clamps_unknown() {
    assert_eq!(dims(&[1, 3, -1]), vec![1, 3, 0]);
  }

  #[test]
  fn test_value_conversion_keeps_dtype() {
    let cases = [
      HostTensor::from_f32(vec![2, 2], vec![0.5, -1.0, 2.0, 3.5]),
      HostTensor::from_i32(vec![1, 2], vec![480, 640]),
      HostTensor::from_i64(vec![3], vec![-1, 0, 7]),
    ];
    for host in cases {
      let value = to_value(&host).unwrap();
      assert_eq!(from_value(&value).unwrap(), host);
    }
  }

  #[test]
  fn test_refill_in_place() {
    let mut value = to_value(&HostTensor::from_f32(vec![1, 3], vec![0.0; 3])).unwrap();
    let next = HostTensor::from_f32(vec![1, 3], vec![1.0, 2.0, 3.0]);
    refill(&mut value, &next).unwrap();
    assert_eq!(from_value(&value).unwrap(), next);
  }

  fn inputs(image: [f32; 3], size: [i64; 2]) -> InputTensorSet {
    let mut inputs = InputTensorSet::new();
    inputs.insert("im_size", HostTensor::from_i64(vec![2], size.to_vec()));
    inputs.insert("image", HostTensor::from_f32(vec![1, 3], image.to_vec()));
    inputs
  }

  #[test]
  fn test_run_feeds_by_name_and_reuses_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let path = crate::backend::fixture::write_doubling_model(dir.path());
    let mut predictor = ZeroCopyPredictor::load(&path, &PredictorOptions::default()).unwrap();
    assert_eq!(predictor.input_names(), ["image", "im_size"]);
    assert_eq!(predictor.output_names(), ["doubled", "sizes"]);

    let outputs = predictor.run_once(&inputs([0.5, 1.0, -2.0], [480, 640])).unwrap();
    assert_eq!(outputs.name(0), Some("doubled"));
    assert_eq!(
      outputs.get(0),
      Some(&HostTensor::from_f32(vec![1, 3], vec![1.0, 2.0, -4.0]))
    );
    assert_eq!(outputs.by_name("sizes"), Some(&HostTensor::from_i64(vec![2], vec![960, 1280])));

    // 第二次调用复用已分配的输入张量
    let outputs = predictor.run_once(&inputs([1.0, 1.0, 1.0], [10, 20])).unwrap();
    assert_eq!(
      outputs.get(0),
      Some(&HostTensor::from_f32(vec![1, 3], vec![2.0, 2.0, 2.0]))
    );
    assert_eq!(outputs.get(1), Some(&HostTensor::from_i64(vec![2], vec![20, 40])));
    assert!(predictor.slots.iter().all(Option::is_some));
  }
}
