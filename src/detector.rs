// 该文件是 Xifeng （西风） 项目的一部分。
// src/detector.rs - 检测器
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

use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::adapter::create_inputs;
use crate::backend::{BackendError, Device, ExecutionBackend, PredictorOptions, RunMode, open_backend};
use crate::config::{ConfigError, ModelConfig};
use crate::decode::{DecodeError, decode};
use crate::model::{DetectionResult, Model};
use crate::preprocess::{ImageSource, PreprocessError, PreprocessPipeline};
use crate::{FromUrl, FromUrlWithScheme};

pub const DEFAULT_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("无效的参数 {key}={value}")]
  InvalidQuery { key: String, value: String },
  #[error("配置错误: {0}")]
  Config(#[from] ConfigError),
  #[error("预处理错误: {0}")]
  Preprocess(#[from] PreprocessError),
  #[error("执行后端错误: {0}")]
  Backend(#[from] BackendError),
  #[error("输出解码错误: {0}")]
  Decode(#[from] DecodeError),
}

impl DetectorError {
  fn invalid_query(key: &str, value: &str) -> Self {
    DetectorError::InvalidQuery {
      key: key.to_string(),
      value: value.to_string(),
    }
  }
}

/// 检测器构造器
///
/// URL 形如 `detector:///path/to/model_dir?device=gpu:0&run_mode=trt_fp16&threshold=0.5`，
/// 路径指向包含 `infer_cfg.yml` 与 `model.onnx` 的模型目录。
#[derive(Debug, Clone)]
pub struct DetectorBuilder {
  model_dir: PathBuf,
  options: PredictorOptions,
  threshold: f32,
}

impl FromUrl for DetectorBuilder {
  type Error = DetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!("URI 方案不匹配: 期望 '{}', 实际为 '{}'", Self::SCHEME, url.scheme());
      return Err(DetectorError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }
    if url.path().is_empty() {
      return Err(DetectorError::ModelPathError("模型路径为空".to_string()));
    }

    let model_dir = crate::decode_url_path(url)
      .map_err(|e| DetectorError::ModelPathError(format!("模型路径解码失败: {}", e)))?;
    let mut builder = DetectorBuilder::new(model_dir);
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "device" => builder.options.device = value.parse()?,
        "run_mode" => builder.options.run_mode = value.parse()?,
        "threads" => {
          builder.options.threads = value
            .parse()
            .map_err(|_| DetectorError::invalid_query(&key, &value))?
        }
        "threshold" => {
          builder.threshold = value
            .parse::<f32>()
            .ok()
            .filter(|t| t.is_finite())
            .ok_or_else(|| DetectorError::invalid_query(&key, &value))?
        }
        other => warn!("忽略未知参数: {}={}", other, value),
      }
    }

    Ok(builder)
  }
}

impl FromUrlWithScheme for DetectorBuilder {
  const SCHEME: &'static str = "detector";
}

impl DetectorBuilder {
  pub fn new<P: Into<PathBuf>>(model_dir: P) -> Self {
    Self {
      model_dir: model_dir.into(),
      options: PredictorOptions::default(),
      threshold: DEFAULT_THRESHOLD,
    }
  }

  pub fn device(mut self, device: Device) -> Self {
    self.options.device = device;
    self
  }

  pub fn run_mode(mut self, run_mode: RunMode) -> Self {
    self.options.run_mode = run_mode;
    self
  }

  pub fn threads(mut self, threads: usize) -> Self {
    self.options.threads = threads;
    self
  }

  pub fn threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }

  pub fn model_dir(&self) -> &Path {
    &self.model_dir
  }

  pub fn options(&self) -> &PredictorOptions {
    &self.options
  }

  pub fn build(self) -> Result<Detector, DetectorError> {
    let config = ModelConfig::load(&self.model_dir)?;

    // 允许直接指向配置文件
    let model_dir = if self.model_dir.is_file() {
      self
        .model_dir
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
    } else {
      self.model_dir.clone()
    };

    let options = PredictorOptions {
      min_subgraph_size: config.min_subgraph_size(),
      ..self.options
    };
    info!("设备: {}, 运行模式: {}", options.device, options.run_mode);
    let backend = open_backend(&model_dir, config.backend_mode(), &options)?;
    let detector = Detector::with_backend(config, backend, self.threshold);
    info!("检测器创建完成, 后端: {}", detector.backend_name());

    Ok(detector)
  }
}

/// 检测器：持有一份配置、一条预处理流水线与一个执行后端
pub struct Detector {
  config: ModelConfig,
  pipeline: PreprocessPipeline,
  backend: Box<dyn ExecutionBackend>,
  threshold: f32,
}

impl Detector {
  pub fn with_backend(config: ModelConfig, backend: Box<dyn ExecutionBackend>, threshold: f32) -> Self {
    let pipeline = PreprocessPipeline::from_config(&config);
    Self {
      config,
      pipeline,
      backend,
      threshold,
    }
  }

  pub fn config(&self) -> &ModelConfig {
    &self.config
  }

  pub fn threshold(&self) -> f32 {
    self.threshold
  }

  pub fn backend_name(&self) -> &'static str {
    self.backend.name()
  }

  pub fn predict(&mut self, image: &RgbImage) -> Result<DetectionResult, DetectorError> {
    let threshold = self.threshold;
    self.predict_timed(image, threshold, 0, 1).map(|(result, _)| result)
  }

  pub fn predict_source(&mut self, source: &ImageSource) -> Result<DetectionResult, DetectorError> {
    let image = source.decode()?;
    self.predict(&image)
  }

  /// 预热 `warmup` 次并重复 `repeats` 次推理，返回结果与平均推理耗时（毫秒）
  pub fn predict_timed(
    &mut self,
    image: &RgbImage,
    threshold: f32,
    warmup: usize,
    repeats: usize,
  ) -> Result<(DetectionResult, f64), DetectorError> {
    let family = self.config.family();
    let (tensor, meta) = self.pipeline.run(image)?;
    debug!("图像信息: {:?}", meta);

    let inputs = create_inputs(tensor, &meta, family);
    let (outputs, average_ms) = self.backend.run(&inputs, warmup, repeats)?;
    for index in 0..outputs.len() {
      if let (Some(name), Some(tensor)) = (outputs.name(index), outputs.get(index)) {
        debug!("输出 {} {}: {:?} {}", index, name, tensor.shape(), tensor.dtype());
      }
    }
    info!("推理耗时: {:.3} ms", average_ms);

    let result = decode(family, &outputs, &meta, threshold, self.config.output_layout())?;
    if result.is_empty() {
      warn!("未检测到目标");
    }
    Ok((result, average_ms))
  }
}

impl Model for Detector {
  type Input = RgbImage;
  type Output = DetectionResult;
  type Error = DetectorError;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.predict(input)
  }
}
