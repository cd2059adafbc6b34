// 该文件是 Xifeng （西风） 项目的一部分。
// src/backend/graph.rs - 解释执行的计算图后端
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

use std::path::Path;

use tracing::{debug, error, info, warn};
use tract_onnx::prelude::{
  DatumType, Framework, Graph, InferenceModelExt, IntoTensor, SimplePlan, TValue, TVec, Tensor, TractError,
  TypedFact, TypedOp,
};

use super::{BackendError, ExecutionBackend};
use crate::tensor::{HostTensor, InputTensorSet, RawOutputSet};

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// 按名称喂入输入、取回全部输出的计算图执行器，只在 CPU 上运行
pub struct GraphExecutor {
  plan: RunnableModel,
  input_names: Vec<String>,
  output_names: Vec<String>,
}

fn graph_error(e: TractError) -> BackendError {
  BackendError::Graph(e.to_string())
}

fn load_plan(path: &Path, optimized: bool) -> Result<RunnableModel, BackendError> {
  let model = tract_onnx::onnx().model_for_path(path).map_err(graph_error)?;
  let plan = if optimized {
    model.into_optimized().and_then(|m| m.into_runnable())
  } else {
    model
      .into_typed()
      .and_then(|m| m.into_decluttered())
      .and_then(|m| m.into_runnable())
  };
  plan.map_err(graph_error)
}

impl GraphExecutor {
  pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self, BackendError> {
    let path = model_path.as_ref();
    if !path.exists() {
      error!("模型文件不存在: {}", path.display());
      return Err(BackendError::ModelNotFound(path.to_path_buf()));
    }

    info!("加载计算图: {}", path.display());
    let plan = match load_plan(path, true) {
      Ok(plan) => plan,
      Err(e) => {
        warn!("计算图优化失败 ({}), 回退到精简计算图", e);
        load_plan(path, false)?
      }
    };

    let model = plan.model();
    let input_names: Vec<String> = model
      .input_outlets()
      .map_err(graph_error)?
      .iter()
      .map(|outlet| model.node(outlet.node).name.clone())
      .collect();
    let output_names: Vec<String> = model
      .output_outlets()
      .map_err(graph_error)?
      .iter()
      .map(|outlet| {
        model
          .outlet_label(*outlet)
          .map(str::to_string)
          .unwrap_or_else(|| model.node(outlet.node).name.clone())
      })
      .collect();
    debug!("计算图输入: {:?}", input_names);
    debug!("计算图输出: {:?}", output_names);
    info!("计算图加载完成");

    Ok(Self {
      plan,
      input_names,
      output_names,
    })
  }

  pub fn input_names(&self) -> &[String] {
    &self.input_names
  }

  pub fn output_names(&self) -> &[String] {
    &self.output_names
  }
}

fn to_tract(tensor: &HostTensor) -> Result<Tensor, BackendError> {
  let shape = tensor.shape().to_vec();
  let tensor = match tensor {
    HostTensor::F32(a) => Tensor::from_shape(&shape, &a.iter().copied().collect::<Vec<_>>()),
    HostTensor::I32(a) => Tensor::from_shape(&shape, &a.iter().copied().collect::<Vec<_>>()),
    HostTensor::I64(a) => Tensor::from_shape(&shape, &a.iter().copied().collect::<Vec<_>>()),
  };
  tensor.map_err(graph_error)
}

fn from_tract(tensor: Tensor) -> Result<HostTensor, BackendError> {
  let shape = tensor.shape().to_vec();
  let host = match tensor.datum_type() {
    DatumType::I32 => HostTensor::try_i32(&shape, tensor.as_slice::<i32>().map_err(graph_error)?.to_vec()),
    DatumType::I64 => HostTensor::try_i64(&shape, tensor.as_slice::<i64>().map_err(graph_error)?.to_vec()),
    _ => {
      let cast = tensor.cast_to::<f32>().map_err(graph_error)?;
      HostTensor::try_f32(&shape, cast.as_slice::<f32>().map_err(graph_error)?.to_vec())
    }
  };
  host.map_err(|e| BackendError::TensorShape(e.to_string()))
}

impl ExecutionBackend for GraphExecutor {
  fn name(&self) -> &'static str {
    "GraphExecutor"
  }

  fn run_once(&mut self, inputs: &InputTensorSet) -> Result<RawOutputSet, BackendError> {
    let mut feeds: TVec<TValue> = TVec::new();
    for name in &self.input_names {
      let tensor = inputs.get(name).ok_or_else(|| {
        error!("计算图需要输入 {}, 但未提供", name);
        BackendError::MissingInput(name.clone())
      })?;
      feeds.push(to_tract(tensor)?.into());
    }

    let outputs = self.plan.run(feeds).map_err(graph_error)?;
    outputs
      .into_iter()
      .zip(&self.output_names)
      .map(|(value, name)| from_tract(value.into_tensor()).map(|tensor| (name.clone(), tensor)))
      .collect()
  }
}
