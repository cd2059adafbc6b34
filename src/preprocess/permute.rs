// 该文件是 Xifeng （西风） 项目的一部分。
// src/preprocess/permute.rs - 通道重排
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
use crate::config::PermuteParams;
use crate::frame::{FrameLayout, ImageFrame};

#[derive(Debug, Clone)]
pub struct Permute {
  params: PermuteParams,
}

impl Permute {
  pub fn new(params: PermuteParams) -> Self {
    Self { params }
  }
}

impl Transform for Permute {
  fn name(&self) -> &'static str {
    "Permute"
  }

  fn apply(&self, frame: ImageFrame, _meta: &mut ImageMeta) -> Result<ImageFrame, PreprocessError> {
    require_rgb(self.name(), &frame)?;

    let mut out = if self.params.channel_first {
      if frame.layout() != FrameLayout::Hwc {
        return Err(PreprocessError::Layout {
          step: self.name(),
          expected: FrameLayout::Hwc,
          actual: frame.layout(),
        });
      }
      frame.into_chw()
    } else {
      frame
    };

    if self.params.to_bgr {
      for h in 0..out.height() {
        for w in 0..out.width() {
          let r = out.get(0, h, w);
          let b = out.get(2, h, w);
          out.set(0, h, w, b);
          out.set(2, h, w, r);
        }
      }
    }

    Ok(out)
  }
}
