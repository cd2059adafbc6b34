// 该文件是 Xifeng （西风） 项目的一部分。
// src/model.rs - 模型与检测结果
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

use ndarray::ArrayD;
use serde::Serialize;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

impl<T: Model + ?Sized> Model for &mut T {
  type Input = T::Input;
  type Output = T::Output;
  type Error = T::Error;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    (**self).infer(input)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]
}

/// 五个人脸关键点，每个为 (x, y)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Landmarks {
  pub points: [[f32; 2]; 5],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
  /// `[N, classes, R, R]`，与 `items` 逐行对应
  #[serde(skip)]
  pub masks: Option<ArrayD<f32>>,
  /// 与 `items` 逐行对应
  #[serde(skip_serializing_if = "Option::is_none")]
  pub landmarks: Option<Vec<Landmarks>>,
}

/// 实例分割结果，不做阈值过滤
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentResult {
  pub labels: Vec<i64>,
  pub scores: Vec<f32>,
  #[serde(skip)]
  pub masks: ArrayD<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectionResult {
  Empty,
  Boxes(DetectResult),
  Segmentation(SegmentResult),
}

impl DetectionResult {
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// 检测框或分割实例的数量
  pub fn len(&self) -> usize {
    match self {
      DetectionResult::Empty => 0,
      DetectionResult::Boxes(result) => result.items.len(),
      DetectionResult::Segmentation(result) => result.labels.len(),
    }
  }

  pub fn boxes(&self) -> Option<&DetectResult> {
    match self {
      DetectionResult::Boxes(result) => Some(result),
      _ => None,
    }
  }

  pub fn segmentation(&self) -> Option<&SegmentResult> {
    match self {
      DetectionResult::Segmentation(result) => Some(result),
      _ => None,
    }
  }
}
