// 该文件是 Xifeng （西风） 项目的一部分。
// src/frame.rs - 预处理中的浮点图像帧
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

use image::RgbImage;

use crate::tensor::HostTensor;

pub const RGB_CHANNELS: usize = 3;

/// 帧数据排列方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLayout {
  Hwc,
  Chw,
}

/// 预处理过程中的浮点图像帧
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFrame {
  data: Vec<f32>,
  height: usize,
  width: usize,
  channels: usize,
  layout: FrameLayout,
}

impl From<&RgbImage> for ImageFrame {
  fn from(image: &RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      data: image.as_raw().iter().map(|&v| v as f32).collect(),
      height: height as usize,
      width: width as usize,
      channels: RGB_CHANNELS,
      layout: FrameLayout::Hwc,
    }
  }
}

impl ImageFrame {
  pub fn new(data: Vec<f32>, height: usize, width: usize, channels: usize, layout: FrameLayout) -> Self {
    if data.len() != height * width * channels {
      panic!(
        "数据长度不匹配: 期望长度 {}, 实际长度 {}",
        height * width * channels,
        data.len()
      );
    }
    Self {
      data,
      height,
      width,
      channels,
      layout,
    }
  }

  pub fn zeros(height: usize, width: usize, channels: usize, layout: FrameLayout) -> Self {
    Self::new(vec![0.0; height * width * channels], height, width, channels, layout)
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn channels(&self) -> usize {
    self.channels
  }

  pub fn layout(&self) -> FrameLayout {
    self.layout
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  /// 像素 (h, w) 的通道 c 在数据中的下标
  pub fn index(&self, c: usize, h: usize, w: usize) -> usize {
    match self.layout {
      FrameLayout::Hwc => (h * self.width + w) * self.channels + c,
      FrameLayout::Chw => (c * self.height + h) * self.width + w,
    }
  }

  pub fn get(&self, c: usize, h: usize, w: usize) -> f32 {
    self.data[self.index(c, h, w)]
  }

  pub fn set(&mut self, c: usize, h: usize, w: usize, value: f32) {
    let index = self.index(c, h, w);
    self.data[index] = value;
  }

  /// HWC 转换为 CHW，已是 CHW 时原样返回
  pub fn into_chw(self) -> Self {
    if self.layout == FrameLayout::Chw {
      return self;
    }
    let mut out = Self::zeros(self.height, self.width, self.channels, FrameLayout::Chw);
    for h in 0..self.height {
      for w in 0..self.width {
        for c in 0..self.channels {
          out.set(c, h, w, self.get(c, h, w));
        }
      }
    }
    out
  }

  /// 以零填充到 (height, width)，原图位于左上角
  pub fn pad_to(&self, height: usize, width: usize) -> Self {
    let mut out = Self::zeros(height, width, self.channels, self.layout);
    for h in 0..self.height.min(height) {
      for w in 0..self.width.min(width) {
        for c in 0..self.channels {
          out.set(c, h, w, self.get(c, h, w));
        }
      }
    }
    out
  }

  /// 加上批次维度后转换为张量：`[1, C, H, W]` 或 `[1, H, W, C]`
  pub fn into_tensor(self) -> HostTensor {
    let shape = match self.layout {
      FrameLayout::Chw => vec![1, self.channels, self.height, self.width],
      FrameLayout::Hwc => vec![1, self.height, self.width, self.channels],
    };
    HostTensor::from_f32(shape, self.data)
  }
}
