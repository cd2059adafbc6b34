// 该文件是 Xifeng （西风） 项目的一部分。
// src/preprocess.rs - 预处理流水线
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

use std::borrow::Cow;
use std::path::PathBuf;

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::debug;

use crate::arch::ArchFamily;
use crate::config::{ModelConfig, PreprocessStep};
use crate::frame::{FrameLayout, ImageFrame};
use crate::tensor::HostTensor;

mod normalize;
mod pad_stride;
mod permute;
mod resize;

pub use self::normalize::Normalize;
pub use self::pad_stride::PadStride;
pub use self::permute::Permute;
pub use self::resize::Resize;

#[derive(Error, Debug)]
pub enum PreprocessError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("图像解码错误: {0}")]
  Decode(#[from] image::ImageError),
  #[error("输入图像为空")]
  EmptyImage,
  #[error("{step} 需要 {expected:?} 排列的图像, 实际为 {actual:?}")]
  Layout {
    step: &'static str,
    expected: FrameLayout,
    actual: FrameLayout,
  },
  #[error("{step} 需要 {expected} 个通道, 实际为 {actual}")]
  Channels {
    step: &'static str,
    expected: usize,
    actual: usize,
  },
}

/// 单张图像的形状与缩放信息，每次调用重新生成
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageMeta {
  /// 原图 (h, w)
  pub origin_shape: (usize, usize),
  /// 缩放后 (h, w)
  pub resize_shape: (usize, usize),
  /// 按步长补边后 (h, w)
  pub pad_shape: Option<(usize, usize)>,
  /// (scale_x, scale_y)
  pub scale: (f32, f32),
}

impl ImageMeta {
  pub fn new(height: usize, width: usize) -> Self {
    Self {
      origin_shape: (height, width),
      resize_shape: (height, width),
      pad_shape: None,
      scale: (1.0, 1.0),
    }
  }

  /// 补边后的形状，没有补边时为缩放后的形状
  pub fn padded_shape(&self) -> (usize, usize) {
    self.pad_shape.unwrap_or(self.resize_shape)
  }
}

/// 预处理变换
pub trait Transform: Send + Sync {
  fn name(&self) -> &'static str;
  fn apply(&self, frame: ImageFrame, meta: &mut ImageMeta) -> Result<ImageFrame, PreprocessError>;
}

/// 待预处理的图像来源
#[derive(Debug, Clone)]
pub enum ImageSource {
  Path(PathBuf),
  Bytes(Vec<u8>),
  Image(RgbImage),
}

impl ImageSource {
  /// 解码为 RGB 图像
  pub fn decode(&self) -> Result<Cow<'_, RgbImage>, PreprocessError> {
    match self {
      ImageSource::Path(path) => {
        let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
        Ok(Cow::Owned(image.to_rgb8()))
      }
      ImageSource::Bytes(bytes) => Ok(Cow::Owned(image::load_from_memory(bytes)?.to_rgb8())),
      ImageSource::Image(image) => Ok(Cow::Borrowed(image)),
    }
  }
}

impl From<PathBuf> for ImageSource {
  fn from(path: PathBuf) -> Self {
    ImageSource::Path(path)
  }
}

impl From<RgbImage> for ImageSource {
  fn from(image: RgbImage) -> Self {
    ImageSource::Image(image)
  }
}

/// 按声明顺序执行的预处理流水线
pub struct PreprocessPipeline {
  family: ArchFamily,
  stages: Vec<Box<dyn Transform>>,
}

impl PreprocessPipeline {
  pub fn new(steps: &[PreprocessStep], family: ArchFamily) -> Self {
    let stages = steps
      .iter()
      .map(|step| -> Box<dyn Transform> {
        match step {
          PreprocessStep::Resize(params) => Box::new(Resize::new(params.clone(), family)),
          PreprocessStep::Normalize(params) => Box::new(Normalize::new(params.clone())),
          PreprocessStep::Permute(params) => Box::new(Permute::new(params.clone())),
          PreprocessStep::PadStride(params) => Box::new(PadStride::new(params.clone())),
        }
      })
      .collect();
    Self { family, stages }
  }

  pub fn from_config(config: &ModelConfig) -> Self {
    Self::new(config.preprocess(), config.family())
  }

  pub fn family(&self) -> ArchFamily {
    self.family
  }

  pub fn stage_names(&self) -> Vec<&'static str> {
    self.stages.iter().map(|stage| stage.name()).collect()
  }

  /// 对已解码的图像执行全部变换，返回带批次维度的张量
  pub fn run(&self, image: &RgbImage) -> Result<(HostTensor, ImageMeta), PreprocessError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(PreprocessError::EmptyImage);
    }

    let mut meta = ImageMeta::new(height as usize, width as usize);
    let mut frame = ImageFrame::from(image);
    for stage in &self.stages {
      frame = stage.apply(frame, &mut meta)?;
      debug!(
        "预处理 {}: {}x{}x{} {:?}",
        stage.name(),
        frame.height(),
        frame.width(),
        frame.channels(),
        frame.layout()
      );
    }

    Ok((frame.into_tensor(), meta))
  }

  pub fn run_source(&self, source: &ImageSource) -> Result<(HostTensor, ImageMeta), PreprocessError> {
    let image = source.decode()?;
    self.run(&image)
  }
}

pub(crate) fn require_rgb(step: &'static str, frame: &ImageFrame) -> Result<(), PreprocessError> {
  if frame.channels() != crate::frame::RGB_CHANNELS {
    return Err(PreprocessError::Channels {
      step,
      expected: crate::frame::RGB_CHANNELS,
      actual: frame.channels(),
    });
  }
  Ok(())
}
