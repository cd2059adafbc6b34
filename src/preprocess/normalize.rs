// 该文件是 Xifeng （西风） 项目的一部分。
// src/preprocess/normalize.rs - 归一化
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

use super::{ImageMeta, PreprocessError, Transform, require_rgb};
use crate::config::NormalizeParams;
use crate::frame::ImageFrame;

/// 按通道减均值除标准差，`is_scale` 时先除以 255
#[derive(Debug, Clone)]
pub struct Normalize {
  params: NormalizeParams,
}

impl Normalize {
  pub fn new(params: NormalizeParams) -> Self {
    Self { params }
  }
}

impl Transform for Normalize {
  fn name(&self) -> &'static str {
    "Normalize"
  }

  fn apply(&self, frame: ImageFrame, _meta: &mut ImageMeta) -> Result<ImageFrame, PreprocessError> {
    require_rgb(self.name(), &frame)?;

    let (height, width, channels) = (frame.height(), frame.width(), frame.channels());
    let mut out = frame;
    for c in 0..channels {
      let mean = self.params.mean[c];
      let std = self.params.std[c];
      for h in 0..height {
        for w in 0..width {
          let mut v = out.get(c, h, w);
          if self.params.is_scale {
            v /= 255.0;
          }
          out.set(c, h, w, (v - mean) / std);
        }
      }
    }
    Ok(out)
  }
}
