// 该文件是 Xifeng （西风） 项目的一部分。
// src/tensor.rs - 主机侧张量与输入输出集合
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

use ndarray::{ArrayD, IxDyn, ShapeError};

/// 主机内存中的稠密张量
#[derive(Debug, Clone, PartialEq)]
pub enum HostTensor {
  F32(ArrayD<f32>),
  I32(ArrayD<i32>),
  I64(ArrayD<i64>),
}

impl HostTensor {
  pub fn try_f32(shape: &[usize], data: Vec<f32>) -> Result<Self, ShapeError> {
    ArrayD::from_shape_vec(IxDyn(shape), data).map(HostTensor::F32)
  }

  pub fn try_i32(shape: &[usize], data: Vec<i32>) -> Result<Self, ShapeError> {
    ArrayD::from_shape_vec(IxDyn(shape), data).map(HostTensor::I32)
  }

  pub fn try_i64(shape: &[usize], data: Vec<i64>) -> Result<Self, ShapeError> {
    ArrayD::from_shape_vec(IxDyn(shape), data).map(HostTensor::I64)
  }

  pub fn from_f32(shape: Vec<usize>, data: Vec<f32>) -> Self {
    Self::try_f32(&shape, data).unwrap_or_else(|e| panic!("张量形状 {:?} 与数据不匹配: {}", shape, e))
  }

  pub fn from_i32(shape: Vec<usize>, data: Vec<i32>) -> Self {
    Self::try_i32(&shape, data).unwrap_or_else(|e| panic!("张量形状 {:?} 与数据不匹配: {}", shape, e))
  }

  pub fn from_i64(shape: Vec<usize>, data: Vec<i64>) -> Self {
    Self::try_i64(&shape, data).unwrap_or_else(|e| panic!("张量形状 {:?} 与数据不匹配: {}", shape, e))
  }

  pub fn shape(&self) -> &[usize] {
    match self {
      HostTensor::F32(a) => a.shape(),
      HostTensor::I32(a) => a.shape(),
      HostTensor::I64(a) => a.shape(),
    }
  }

  pub fn ndim(&self) -> usize {
    self.shape().len()
  }

  /// 元素总数
  pub fn len(&self) -> usize {
    self.shape().iter().product()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn dtype(&self) -> &'static str {
    match self {
      HostTensor::F32(_) => "float32",
      HostTensor::I32(_) => "int32",
      HostTensor::I64(_) => "int64",
    }
  }

  /// 转换为 f32 数组，整数按数值转换
  pub fn to_f32(&self) -> ArrayD<f32> {
    match self {
      HostTensor::F32(a) => a.clone(),
      HostTensor::I32(a) => a.mapv(|v| v as f32),
      HostTensor::I64(a) => a.mapv(|v| v as f32),
    }
  }

  /// 转换为 i64 数组，浮点数向零取整
  pub fn to_i64(&self) -> ArrayD<i64> {
    match self {
      HostTensor::F32(a) => a.mapv(|v| v as i64),
      HostTensor::I32(a) => a.mapv(i64::from),
      HostTensor::I64(a) => a.clone(),
    }
  }
}

/// 按名称组织的模型输入，保持插入顺序
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InputTensorSet {
  entries: Vec<(String, HostTensor)>,
}

impl InputTensorSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// 插入输入，同名输入会被替换
  pub fn insert(&mut self, name: impl Into<String>, tensor: HostTensor) {
    let name = name.into();
    match self.entries.iter_mut().find(|(n, _)| *n == name) {
      Some(entry) => entry.1 = tensor,
      None => self.entries.push((name, tensor)),
    }
  }

  pub fn get(&self, name: &str) -> Option<&HostTensor> {
    self
      .entries
      .iter()
      .find(|(n, _)| n == name)
      .map(|(_, tensor)| tensor)
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.entries.iter().map(|(n, _)| n.as_str())
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &HostTensor)> {
    self.entries.iter().map(|(n, t)| (n.as_str(), t))
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

/// 后端原始输出，按位置排列并保留输出名
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawOutputSet {
  entries: Vec<(String, HostTensor)>,
}

impl RawOutputSet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, name: impl Into<String>, tensor: HostTensor) {
    self.entries.push((name.into(), tensor));
  }

  pub fn get(&self, index: usize) -> Option<&HostTensor> {
    self.entries.get(index).map(|(_, tensor)| tensor)
  }

  pub fn name(&self, index: usize) -> Option<&str> {
    self.entries.get(index).map(|(n, _)| n.as_str())
  }

  pub fn by_name(&self, name: &str) -> Option<&HostTensor> {
    self
      .entries
      .iter()
      .find(|(n, _)| n == name)
      .map(|(_, tensor)| tensor)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

impl FromIterator<(String, HostTensor)> for RawOutputSet {
  fn from_iter<I: IntoIterator<Item = (String, HostTensor)>>(iter: I) -> Self {
    Self {
      entries: iter.into_iter().collect(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_host_tensor_conversions() {
    let tensor = HostTensor::from_i32(vec![1, 2], vec![480, 640]);
    assert_eq!(tensor.shape(), &[1, 2]);
    assert_eq!(tensor.len(), 2);
    assert_eq!(tensor.dtype(), "int32");
    assert_eq!(tensor.to_f32().iter().copied().collect::<Vec<_>>(), [480.0, 640.0]);

    let tensor = HostTensor::from_f32(vec![3], vec![1.9, -1.0, 0.0]);
    assert_eq!(tensor.to_i64().iter().copied().collect::<Vec<_>>(), [1, -1, 0]);
  }

  #[test]
  fn test_try_shape_mismatch() {
    assert!(HostTensor::try_f32(&[2, 3], vec![0.0; 5]).is_err());
    let empty = HostTensor::try_f32(&[0, 6], vec![]).unwrap();
    assert!(empty.is_empty());
    assert_eq!(empty.ndim(), 2);
  }

  #[test]
  fn test_input_set_replaces_by_name() {
    let mut inputs = InputTensorSet::new();
    inputs.insert("image", HostTensor::from_f32(vec![1], vec![0.0]));
    inputs.insert("im_size", HostTensor::from_i32(vec![1], vec![1]));
    inputs.insert("image", HostTensor::from_f32(vec![1], vec![2.0]));
    assert_eq!(inputs.len(), 2);
    assert_eq!(inputs.names().collect::<Vec<_>>(), ["image", "im_size"]);
    assert_eq!(inputs.get("image").map(|t| t.to_f32()[[0]]), Some(2.0));
    assert!(inputs.get("im_info").is_none());
  }

  #[test]
  fn test_raw_outputs_positional() {
    let outputs: RawOutputSet = vec![
      ("boxes".to_string(), HostTensor::from_f32(vec![1, 6], vec![0.0; 6])),
      ("masks".to_string(), HostTensor::from_f32(vec![1, 1, 2, 2], vec![0.0; 4])),
    ]
    .into_iter()
    .collect();
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs.name(1), Some("masks"));
    assert_eq!(outputs.get(0).map(|t| t.shape().to_vec()), Some(vec![1, 6]));
    assert!(outputs.by_name("boxes").is_some());
    assert!(outputs.get(2).is_none());
  }
}
