// 该文件是 Xifeng （西风） 项目的一部分。
// src/decode.rs - 按架构族解码模型输出
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

use ndarray::{Array2, Axis, Ix2};
use thiserror::Error;
use tracing::debug;

use crate::arch::ArchFamily;
use crate::model::{DetectItem, DetectResult, DetectionResult, SegmentResult};
use crate::preprocess::ImageMeta;
use crate::tensor::{HostTensor, RawOutputSet};

mod landmark;
pub use self::landmark::{LANDMARK_POINTS, decode_landmarks};

/// 检测框每行的列数：`[class_id, score, x_min, y_min, x_max, y_max]`
pub const BOX_COLUMNS: usize = 6;

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("缺少第 {0} 个输出张量")]
  MissingOutput(usize),
  #[error("{name} 形状错误: 期望 {expected}, 实际为 {actual:?}")]
  Shape {
    name: &'static str,
    expected: String,
    actual: Vec<usize>,
  },
  #[error("人脸索引 {index} 超出范围 [0, {len})")]
  FaceIndex { index: i64, len: usize },
}

impl DecodeError {
  fn shape(name: &'static str, expected: impl Into<String>, tensor: &HostTensor) -> Self {
    DecodeError::Shape {
      name,
      expected: expected.into(),
      actual: tensor.shape().to_vec(),
    }
  }
}

/// 后端输出的排列：检测框总在第 0 位，其后依次为可选的掩码与人脸关键点三元组
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputLayout {
  pub with_mask: bool,
  pub with_landmark: bool,
}

impl OutputLayout {
  pub fn mask_index(&self) -> Option<usize> {
    self.with_mask.then_some(1)
  }

  /// `face_index`、`landmark`、`prior_boxes` 的起始位置
  pub fn landmark_index(&self) -> Option<usize> {
    self.with_landmark.then_some(1 + usize::from(self.with_mask))
  }
}

/// 将原始输出解码为检测结果
pub fn decode(
  family: ArchFamily,
  outputs: &RawOutputSet,
  meta: &ImageMeta,
  threshold: f32,
  layout: OutputLayout,
) -> Result<DetectionResult, DecodeError> {
  if family.is_segmentation() {
    decode_segmentation(outputs)
  } else {
    decode_detection(family, outputs, meta, threshold, layout)
  }
}

fn output(outputs: &RawOutputSet, index: usize) -> Result<&HostTensor, DecodeError> {
  outputs.get(index).ok_or(DecodeError::MissingOutput(index))
}

/// 取出检测框矩阵，没有检测结果时返回 `None`
fn box_rows(boxes: &HostTensor) -> Result<Option<Array2<f32>>, DecodeError> {
  let shape = boxes.shape();
  let values = boxes.to_f32();

  // 后端在没有检测结果时输出 [1, 1] 的 -1
  if shape == [1, 1] && values.iter().all(|&v| v == -1.0) {
    return Ok(None);
  }
  if shape.len() != 2 || shape[1] != BOX_COLUMNS {
    return Err(DecodeError::shape("boxes", "[N, 6]", boxes));
  }
  if shape[0] == 0 {
    return Ok(None);
  }

  values
    .into_dimensionality::<Ix2>()
    .map(Some)
    .map_err(|_| DecodeError::shape("boxes", "[N, 6]", boxes))
}

fn decode_detection(
  family: ArchFamily,
  outputs: &RawOutputSet,
  meta: &ImageMeta,
  threshold: f32,
  layout: OutputLayout,
) -> Result<DetectionResult, DecodeError> {
  let boxes = output(outputs, 0)?;
  let Some(mut rows) = box_rows(boxes)? else {
    debug!("未检测到目标");
    return Ok(DetectionResult::Empty);
  };
  let num_rows = rows.nrows();

  let (origin_h, origin_w) = meta.origin_shape;
  if family.normalized_boxes() {
    let (w, h) = (origin_w as f32, origin_h as f32);
    for mut row in rows.rows_mut() {
      row[2] *= w;
      row[3] *= h;
      row[4] *= w;
      row[5] *= h;
    }
  }

  let keep: Vec<usize> = rows
    .rows()
    .into_iter()
    .enumerate()
    .filter(|(_, row)| row[1] > threshold && row[0] > -1.0)
    .map(|(index, _)| index)
    .collect();

  let masks = match layout.mask_index() {
    Some(index) => {
      let masks = output(outputs, index)?;
      if masks.ndim() == 0 || masks.shape()[0] != num_rows {
        return Err(DecodeError::shape(
          "masks",
          format!("[{}, classes, R, R]", num_rows),
          masks,
        ));
      }
      Some(masks.to_f32().select(Axis(0), &keep))
    }
    None => None,
  };

  let landmarks = match layout.landmark_index() {
    Some(index) => Some(decode_landmarks(
      output(outputs, index)?,
      output(outputs, index + 1)?,
      output(outputs, index + 2)?,
      &keep,
      meta.origin_shape,
      family.normalized_boxes(),
    )?),
    None => None,
  };

  if keep.is_empty() {
    debug!("{} 个检测框均低于阈值 {}", num_rows, threshold);
    return Ok(DetectionResult::Empty);
  }

  let items: Vec<DetectItem> = keep
    .iter()
    .map(|&index| {
      let row = rows.row(index);
      DetectItem {
        class_id: row[0] as u32,
        score: row[1],
        bbox: [row[2], row[3], row[4], row[5]],
      }
    })
    .collect();
  for item in &items {
    debug!(
      "class_id: {}, confidence: {:.4}, left_top: [{:.2}, {:.2}], right_bottom: [{:.2}, {:.2}]",
      item.class_id, item.score, item.bbox[0], item.bbox[1], item.bbox[2], item.bbox[3]
    );
  }

  Ok(DetectionResult::Boxes(DetectResult {
    items: items.into_boxed_slice(),
    masks,
    landmarks,
  }))
}

/// 分割结果 `(label, score, mask)` 原样返回
fn decode_segmentation(outputs: &RawOutputSet) -> Result<DetectionResult, DecodeError> {
  let labels = output(outputs, 0)?;
  let scores = output(outputs, 1)?;
  let masks = output(outputs, 2)?;

  if labels.ndim() != 1 {
    return Err(DecodeError::shape("label", "[K]", labels));
  }
  let count = labels.len();
  if scores.shape() != [count] {
    return Err(DecodeError::shape("score", format!("[{}]", count), scores));
  }
  if masks.ndim() == 0 || masks.shape()[0] != count {
    return Err(DecodeError::shape("segm", format!("[{}, H, W]", count), masks));
  }
  debug!("分割实例数量: {}", count);

  Ok(DetectionResult::Segmentation(SegmentResult {
    labels: labels.to_i64().iter().copied().collect(),
    scores: scores.to_f32().iter().copied().collect(),
    masks: masks.to_f32(),
  }))
}
