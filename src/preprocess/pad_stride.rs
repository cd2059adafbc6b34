// 该文件是 Xifeng （西风） 项目的一部分。
// src/preprocess/pad_stride.rs - 按步长补边
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

use super::{ImageMeta, PreprocessError, Transform};
use crate::config::PadStrideParams;
use crate::frame::ImageFrame;

/// 右下方补零，使高宽为 `stride` 的整数倍
#[derive(Debug, Clone)]
pub struct PadStride {
  params: PadStrideParams,
}

impl PadStride {
  pub fn new(params: PadStrideParams) -> Self {
    Self { params }
  }
}

impl Transform for PadStride {
  fn name(&self) -> &'static str {
    "PadStride"
  }

  fn apply(&self, frame: ImageFrame, meta: &mut ImageMeta) -> Result<ImageFrame, PreprocessError> {
    let stride = self.params.stride as usize;
    if stride == 0 {
      return Ok(frame);
    }

    let pad_h = frame.height().div_ceil(stride) * stride;
    let pad_w = frame.width().div_ceil(stride) * stride;
    meta.pad_shape = Some((pad_h, pad_w));
    if (pad_h, pad_w) == (frame.height(), frame.width()) {
      return Ok(frame);
    }
    Ok(frame.pad_to(pad_h, pad_w))
  }
}
