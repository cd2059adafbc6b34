// 该文件是 Xifeng （西风） 项目的一部分。
// src/preprocess/resize.rs - 缩放
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

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb};

use super::{ImageMeta, PreprocessError, Transform, require_rgb};
use crate::arch::ArchFamily;
use crate::config::ResizeParams;
use crate::frame::{FrameLayout, ImageFrame, RGB_CHANNELS};

/// 缩放变换
///
/// 保持长宽比的架构族在 `max_size` 非零时按短边缩放并补边成
/// `max_size` x `max_size` 的画布，其余情况直接拉伸到 `target_size`。
#[derive(Debug, Clone)]
pub struct Resize {
  params: ResizeParams,
  family: ArchFamily,
}

impl Resize {
  pub fn new(params: ResizeParams, family: ArchFamily) -> Self {
    Self { params, family }
  }

  fn letterbox(&self) -> bool {
    self.params.max_size != 0 && self.family.keeps_aspect_ratio()
  }

  /// 计算 (scale_x, scale_y)
  pub fn generate_scale(&self, height: usize, width: usize) -> (f32, f32) {
    if self.letterbox() {
      let size_min = height.min(width) as f32;
      let size_max = height.max(width) as f32;
      let max_size = self.params.max_size as f32;
      let mut scale = self.params.target_size.short_side() as f32 / size_min;
      if (scale * size_max).round() > max_size {
        scale = max_size / size_max;
      }
      (scale, scale)
    } else {
      let (target_h, target_w) = self.params.target_size.hw();
      (target_w as f32 / width as f32, target_h as f32 / height as f32)
    }
  }

  /// 按 OpenCV 插值编号选择滤波器，3（area）在放大时与双线性相同
  fn filter(&self) -> FilterType {
    match self.params.interp {
      0 => FilterType::Nearest,
      2 => FilterType::CatmullRom,
      4 => FilterType::Lanczos3,
      _ => FilterType::Triangle,
    }
  }

  fn resample(
    &self,
    buffer: &ImageBuffer<Rgb<f32>, Vec<f32>>,
    width: u32,
    height: u32,
  ) -> ImageBuffer<Rgb<f32>, Vec<f32>> {
    match self.params.interp {
      // area: 缩小时按源像素面积取平均
      AREA if width <= buffer.width() && height <= buffer.height() => {
        imageops::thumbnail(buffer, width, height)
      }
      _ => imageops::resize(buffer, width, height, self.filter()),
    }
  }
}

const AREA: u32 = 3;

impl Transform for Resize {
  fn name(&self) -> &'static str {
    "Resize"
  }

  fn apply(&self, frame: ImageFrame, meta: &mut ImageMeta) -> Result<ImageFrame, PreprocessError> {
    if frame.layout() != FrameLayout::Hwc {
      return Err(PreprocessError::Layout {
        step: self.name(),
        expected: FrameLayout::Hwc,
        actual: frame.layout(),
      });
    }
    require_rgb(self.name(), &frame)?;

    let (height, width) = (frame.height(), frame.width());
    let (scale_x, scale_y) = self.generate_scale(height, width);
    let resize_w = ((width as f32 * scale_x).round() as usize).max(1);
    let resize_h = ((height as f32 * scale_y).round() as usize).max(1);

    // image 的浮点缩放会把结果限制在 [0, 1]，先映射到该区间，缩放后再映射回来
    let (low, high) = frame
      .as_slice()
      .iter()
      .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = (high - low).max(f32::EPSILON);
    let unit: Vec<f32> = frame.as_slice().iter().map(|&v| (v - low) / span).collect();

    let buffer: ImageBuffer<Rgb<f32>, Vec<f32>> = ImageBuffer::from_raw(width as u32, height as u32, unit)
      .ok_or(PreprocessError::Channels {
        step: self.name(),
        expected: RGB_CHANNELS,
        actual: frame.channels(),
      })?;
    let resized = self.resample(&buffer, resize_w as u32, resize_h as u32);
    let data = resized.into_raw().into_iter().map(|v| v * span + low).collect();

    let mut out = ImageFrame::new(data, resize_h, resize_w, RGB_CHANNELS, FrameLayout::Hwc);
    meta.resize_shape = (resize_h, resize_w);
    meta.scale = (scale_x, scale_y);

    if self.letterbox() {
      let side = self.params.max_size as usize;
      out = out.pad_to(side.max(resize_h), side.max(resize_w));
    }

    Ok(out)
  }
}
