// 该文件是 Xifeng （西风） 项目的一部分。
// src/output.rs - 检测结果输出
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

use std::fs::File;
use std::io::Write;

use image::RgbImage;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::model::DetectionResult;
use crate::{FromUrl, FromUrlWithScheme};

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  Json(#[from] serde_json::Error),
  #[error("无效的输出路径: {0}")]
  InvalidPath(String),
}

fn label_of(labels: &[String], class_id: u32) -> &str {
  labels
    .get(class_id as usize)
    .map(String::as_str)
    .unwrap_or("unknown")
}

/// 以日志形式输出检测结果
#[derive(Debug, Clone, Default)]
pub struct LogRender {
  labels: Vec<String>,
  threshold: Option<f32>,
}

impl FromUrl for LogRender {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch);
    }
    Ok(Self::default())
  }
}

impl FromUrlWithScheme for LogRender {
  const SCHEME: &'static str = "log";
}

impl LogRender {
  pub fn new(labels: Vec<String>) -> Self {
    Self {
      labels,
      threshold: None,
    }
  }

  pub fn with_threshold(mut self, threshold: f32) -> Self {
    self.threshold = Some(threshold);
    self
  }
}

impl Render<RgbImage, DetectionResult> for LogRender {
  type Error = OutputError;

  fn render_result(&self, frame: &RgbImage, result: &DetectionResult) -> Result<(), Self::Error> {
    let (width, height) = frame.dimensions();
    match result {
      DetectionResult::Empty => warn!("图像 {}x{}: 未检测到目标", width, height),
      DetectionResult::Boxes(detect) => {
        match self.threshold {
          Some(threshold) => info!(
            "图像 {}x{}: 检测到 {} 个目标 (阈值 {})",
            width,
            height,
            detect.items.len(),
            threshold
          ),
          None => info!("图像 {}x{}: 检测到 {} 个目标", width, height, detect.items.len()),
        }
        for item in detect.items.iter() {
          info!(
            "--{} ({}): {:.4} [{:.2}, {:.2}, {:.2}, {:.2}]",
            label_of(&self.labels, item.class_id),
            item.class_id,
            item.score,
            item.bbox[0],
            item.bbox[1],
            item.bbox[2],
            item.bbox[3]
          );
        }
        if let Some(masks) = &detect.masks {
          info!("--掩码: {:?}", masks.shape());
        }
        if let Some(landmarks) = &detect.landmarks {
          info!("--人脸关键点: {} 组", landmarks.len());
        }
      }
      DetectionResult::Segmentation(segment) => {
        info!("图像 {}x{}: 分割实例 {} 个", width, height, segment.labels.len());
        for (label, score) in segment.labels.iter().zip(&segment.scores) {
          let name = u32::try_from(*label)
            .map(|id| label_of(&self.labels, id))
            .unwrap_or("unknown");
          info!("--{} ({}): {:.4}", name, label, score);
        }
      }
    }
    Ok(())
  }
}

#[derive(Serialize)]
struct JsonRecord<'a> {
  width: u32,
  height: u32,
  labels: Vec<&'a str>,
  result: &'a DetectionResult,
}

/// 每张图像写入一行 JSON
#[derive(Debug)]
pub struct JsonRender {
  file: File,
  labels: Vec<String>,
}

impl FromUrl for JsonRender {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch);
    }
    let path = crate::decode_url_path(url).map_err(|_| OutputError::InvalidPath(url.path().to_string()))?;
    let file = File::create(&path).inspect_err(|e| {
      error!("无法创建输出文件 {}: {}", path.display(), e);
    })?;
    info!("结果写入: {}", path.display());
    Ok(Self {
      file,
      labels: Vec::new(),
    })
  }
}

impl FromUrlWithScheme for JsonRender {
  const SCHEME: &'static str = "json";
}

impl Render<RgbImage, DetectionResult> for JsonRender {
  type Error = OutputError;

  fn render_result(&self, frame: &RgbImage, result: &DetectionResult) -> Result<(), Self::Error> {
    let labels = match result {
      DetectionResult::Boxes(detect) => detect
        .items
        .iter()
        .map(|item| label_of(&self.labels, item.class_id))
        .collect(),
      DetectionResult::Segmentation(segment) => segment
        .labels
        .iter()
        .map(|&label| {
          u32::try_from(label)
            .map(|id| label_of(&self.labels, id))
            .unwrap_or("unknown")
        })
        .collect(),
      DetectionResult::Empty => Vec::new(),
    };
    let record = JsonRecord {
      width: frame.width(),
      height: frame.height(),
      labels,
      result,
    };
    let mut writer = &self.file;
    serde_json::to_writer(&mut writer, &record)?;
    writeln!(writer)?;
    Ok(())
  }
}

/// 按 URL 方案选择的输出
#[derive(Debug)]
pub enum OutputWrapper {
  Log(LogRender),
  Json(JsonRender),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogRender::SCHEME => Ok(OutputWrapper::Log(LogRender::from_url(url)?)),
      JsonRender::SCHEME => Ok(OutputWrapper::Json(JsonRender::from_url(url)?)),
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl OutputWrapper {
  pub fn with_labels(self, labels: &[String]) -> Self {
    match self {
      OutputWrapper::Log(render) => OutputWrapper::Log(LogRender {
        labels: labels.to_vec(),
        ..render
      }),
      OutputWrapper::Json(render) => OutputWrapper::Json(JsonRender {
        labels: labels.to_vec(),
        ..render
      }),
    }
  }

  pub fn with_threshold(self, threshold: f32) -> Self {
    match self {
      OutputWrapper::Log(render) => OutputWrapper::Log(render.with_threshold(threshold)),
      other => other,
    }
  }
}

impl Render<RgbImage, DetectionResult> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &RgbImage, result: &DetectionResult) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Log(render) => render.render_result(frame, result),
      OutputWrapper::Json(render) => render.render_result(frame, result),
    }
  }
}
