// 该文件是 Xifeng （西风） 项目的一部分。
// src/decode/landmark.rs - 人脸关键点解码
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

use super::DecodeError;
use crate::model::Landmarks;
use crate::tensor::HostTensor;

pub const LANDMARK_POINTS: usize = 5;
const LANDMARK_VALUES: usize = LANDMARK_POINTS * 2;
const PRIOR_VALUES: usize = 4;
const PRIOR_VARIANCE: f32 = 0.1;

/// 按先验框解码保留行的人脸关键点
///
/// `face_index` 的第 r 个值指向第 r 行检测框对应的先验框与关键点偏移。
/// 先验框为 `[x_min, y_min, x_max, y_max]`，偏移按先验框宽高与 0.1 的方差还原。
pub fn decode_landmarks(
  face_index: &HostTensor,
  landmark: &HostTensor,
  prior_boxes: &HostTensor,
  rows: &[usize],
  origin_shape: (usize, usize),
  normalized: bool,
) -> Result<Vec<Landmarks>, DecodeError> {
  let indices = face_index.to_i64();
  let indices = indices.as_slice().unwrap_or_default();
  let offsets = landmark.to_f32();
  let offsets = offsets.as_slice().unwrap_or_default();
  let priors = prior_boxes.to_f32();
  let priors = priors.as_slice().unwrap_or_default();

  if offsets.len() % LANDMARK_VALUES != 0 {
    return Err(DecodeError::shape("landmark", "[M, 10]", landmark));
  }
  if priors.len() % PRIOR_VALUES != 0 {
    return Err(DecodeError::shape("prior_boxes", "[M, 4]", prior_boxes));
  }
  let candidates = (offsets.len() / LANDMARK_VALUES).min(priors.len() / PRIOR_VALUES);

  let (scale_x, scale_y) = if normalized {
    (origin_shape.1 as f32, origin_shape.0 as f32)
  } else {
    (1.0, 1.0)
  };

  rows
    .iter()
    .map(|&row| {
      let index = *indices
        .get(row)
        .ok_or_else(|| DecodeError::shape("face_index", format!("[>{}]", row), face_index))?;
      if index < 0 || index as usize >= candidates {
        return Err(DecodeError::FaceIndex {
          index,
          len: candidates,
        });
      }
      let index = index as usize;

      let prior = &priors[index * PRIOR_VALUES..(index + 1) * PRIOR_VALUES];
      let offset = &offsets[index * LANDMARK_VALUES..(index + 1) * LANDMARK_VALUES];
      let prior_w = prior[2] - prior[0];
      let prior_h = prior[3] - prior[1];
      let center_x = (prior[2] + prior[0]) / 2.0;
      let center_y = (prior[3] + prior[1]) / 2.0;

      let mut points = [[0.0; 2]; LANDMARK_POINTS];
      for (point, delta) in points.iter_mut().zip(offset.chunks_exact(2)) {
        point[0] = (delta[0] * PRIOR_VARIANCE * prior_w + center_x) * scale_x;
        point[1] = (delta[1] * PRIOR_VARIANCE * prior_h + center_y) * scale_y;
      }
      Ok(Landmarks { points })
    })
    .collect()
}
