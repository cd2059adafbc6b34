// 该文件是 Xifeng （西风） 项目的一部分。
// src/input.rs - 图像文件输入
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

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配")]
  SchemaMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("目录 {} 中没有图像文件", .0.display())]
  NoImages(PathBuf),
  #[error("无效的输入路径: {0}")]
  InvalidPath(String),
}

/// 单个图像文件或图像目录，按文件名顺序逐张读取
///
/// 目录中无法解码的文件会被跳过。
#[derive(Debug)]
pub struct ImageFileInput {
  pending: VecDeque<PathBuf>,
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际为 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }
    let path = crate::decode_url_path(url).map_err(|e| {
      error!("输入路径解码失败: {}", e);
      ImageFileInputError::InvalidPath(url.path().to_string())
    })?;
    Self::open(path)
  }
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl ImageFileInput {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref();
    if !path.is_dir() {
      // 单个文件在打开时解码一次，尽早报告错误
      ImageReader::open(path)?.with_guessed_format()?.decode()?;
      info!("输入图像: {}", path.display());
      return Ok(Self {
        pending: VecDeque::from([path.to_path_buf()]),
      });
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(path)? {
      let entry = entry?;
      if entry.file_type()?.is_file() {
        files.push(entry.path());
      }
    }
    files.sort();
    if files.is_empty() {
      return Err(ImageFileInputError::NoImages(path.to_path_buf()));
    }
    info!("输入目录: {}, 共 {} 个文件", path.display(), files.len());

    Ok(Self {
      pending: files.into(),
    })
  }

  /// 尚未读取的文件数
  pub fn remaining(&self) -> usize {
    self.pending.len()
  }
}

fn read_image(path: &Path) -> Result<RgbImage, ImageFileInputError> {
  Ok(ImageReader::open(path)?.with_guessed_format()?.decode()?.to_rgb8())
}

impl Iterator for ImageFileInput {
  type Item = RgbImage;

  fn next(&mut self) -> Option<Self::Item> {
    while let Some(path) = self.pending.pop_front() {
      match read_image(&path) {
        Ok(image) => {
          debug!("读取图像: {} ({}x{})", path.display(), image.width(), image.height());
          return Some(image);
        }
        Err(e) => warn!("跳过无法读取的文件 {}: {}", path.display(), e),
      }
    }
    None
  }
}
