// 该文件是 Xifeng （西风） 项目的一部分。
// src/config.rs - 模型部署配置
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

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_yaml::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::arch::{ArchFamily, supported_patterns};
use crate::decode::OutputLayout;

/// 模型目录下的部署配置文件名
pub const INFER_CONFIG_FILE: &str = "infer_cfg.yml";

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("无法读取配置文件 {}: {}", .0.display(), .1)]
  Io(PathBuf, #[source] std::io::Error),
  #[error("配置文件格式错误: {0}")]
  Yaml(#[from] serde_yaml::Error),
  #[error("缺少必需的配置项: {0}")]
  MissingKey(&'static str),
  #[error("不支持的模型架构: {arch}, 支持的架构: {supported:?}")]
  UnsupportedArch {
    arch: String,
    supported: Vec<&'static str>,
  },
  #[error("未知的预处理步骤: {0}")]
  UnknownStep(String),
  #[error("预处理步骤 {step} 的参数无效: {reason}")]
  InvalidStep { step: &'static str, reason: String },
}

/// 后端执行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
  /// 解释执行计算图，按名称输入输出
  Interpreted,
  /// 编译后的预测器，按位置零拷贝输入输出
  Optimized,
}

/// Resize 的目标尺寸，整数表示正方形，列表为 `[h, w]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TargetSize {
  Square(u32),
  Shape([u32; 2]),
}

impl TargetSize {
  /// (h, w)
  pub fn hw(self) -> (u32, u32) {
    match self {
      TargetSize::Square(size) => (size, size),
      TargetSize::Shape([h, w]) => (h, w),
    }
  }

  pub fn short_side(self) -> u32 {
    let (h, w) = self.hw();
    h.min(w)
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResizeParams {
  pub target_size: TargetSize,
  #[serde(default)]
  pub max_size: u32,
  /// OpenCV 插值代码
  #[serde(default = "default_interp")]
  pub interp: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NormalizeParams {
  pub mean: Vec<f32>,
  pub std: Vec<f32>,
  #[serde(default = "default_true")]
  pub is_scale: bool,
  #[serde(default)]
  pub is_channel_first: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PermuteParams {
  #[serde(default)]
  pub to_bgr: bool,
  #[serde(default = "default_true")]
  pub channel_first: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PadStrideParams {
  #[serde(default)]
  pub stride: u32,
}

fn default_interp() -> u32 {
  1
}

fn default_true() -> bool {
  true
}

/// 已解析的预处理步骤
#[derive(Debug, Clone, PartialEq)]
pub enum PreprocessStep {
  Resize(ResizeParams),
  Normalize(NormalizeParams),
  Permute(PermuteParams),
  PadStride(PadStrideParams),
}

impl PreprocessStep {
  pub fn name(&self) -> &'static str {
    match self {
      PreprocessStep::Resize(_) => "Resize",
      PreprocessStep::Normalize(_) => "Normalize",
      PreprocessStep::Permute(_) => "Permute",
      PreprocessStep::PadStride(_) => "PadStride",
    }
  }
}

type StepParser = fn(Value) -> Result<PreprocessStep, ConfigError>;

/// 预处理步骤注册表，步骤名到参数解析函数的封闭映射
static STEP_REGISTRY: [(&str, StepParser); 4] = [
  ("Resize", parse_resize),
  ("Normalize", parse_normalize),
  ("Permute", parse_permute),
  ("PadStride", parse_pad_stride),
];

fn parse_params<T: DeserializeOwned>(step: &'static str, value: Value) -> Result<T, ConfigError> {
  serde_yaml::from_value(value).map_err(|e| ConfigError::InvalidStep {
    step,
    reason: e.to_string(),
  })
}

fn parse_resize(value: Value) -> Result<PreprocessStep, ConfigError> {
  let params: ResizeParams = parse_params("Resize", value)?;
  let (h, w) = params.target_size.hw();
  if h == 0 || w == 0 {
    return Err(ConfigError::InvalidStep {
      step: "Resize",
      reason: "target_size 不能为 0".to_string(),
    });
  }
  if params.interp > 4 {
    return Err(ConfigError::InvalidStep {
      step: "Resize",
      reason: format!("不支持的插值方式: {}", params.interp),
    });
  }
  Ok(PreprocessStep::Resize(params))
}

fn parse_normalize(value: Value) -> Result<PreprocessStep, ConfigError> {
  let params: NormalizeParams = parse_params("Normalize", value)?;
  if params.mean.len() != 3 || params.std.len() != 3 {
    return Err(ConfigError::InvalidStep {
      step: "Normalize",
      reason: format!(
        "mean/std 长度必须为 3, 实际为 {}/{}",
        params.mean.len(),
        params.std.len()
      ),
    });
  }
  if params.std.iter().any(|&s| s == 0.0) {
    return Err(ConfigError::InvalidStep {
      step: "Normalize",
      reason: "std 不能包含 0".to_string(),
    });
  }
  Ok(PreprocessStep::Normalize(params))
}

fn parse_permute(value: Value) -> Result<PreprocessStep, ConfigError> {
  parse_params("Permute", value).map(PreprocessStep::Permute)
}

fn parse_pad_stride(value: Value) -> Result<PreprocessStep, ConfigError> {
  parse_params("PadStride", value).map(PreprocessStep::PadStride)
}

/// 从 `{type, ...params}` 描述解析单个预处理步骤
fn resolve_step(value: Value) -> Result<PreprocessStep, ConfigError> {
  let Value::Mapping(mut mapping) = value else {
    return Err(ConfigError::InvalidStep {
      step: "Preprocess",
      reason: "预处理步骤必须是映射".to_string(),
    });
  };

  let step_type = match mapping.remove("type") {
    Some(Value::String(name)) => name,
    Some(_) => {
      return Err(ConfigError::InvalidStep {
        step: "Preprocess",
        reason: "type 必须是字符串".to_string(),
      });
    }
    None => return Err(ConfigError::MissingKey("Preprocess[].type")),
  };

  let (_, parser) = STEP_REGISTRY
    .iter()
    .find(|(name, _)| *name == step_type)
    .ok_or(ConfigError::UnknownStep(step_type))?;

  parser(Value::Mapping(mapping))
}

/// 检查步骤顺序：通道优先排列之后不能再缩放或重复排列，
/// Normalize 声明的排列须与其所处位置一致
fn check_step_order(steps: &[PreprocessStep]) -> Result<(), ConfigError> {
  let mut channel_first = false;
  for step in steps {
    match step {
      PreprocessStep::Normalize(params) if params.is_channel_first != channel_first => {
        return Err(ConfigError::InvalidStep {
          step: "Normalize",
          reason: format!(
            "is_channel_first 为 {}, 但此处图像{}通道优先排列",
            params.is_channel_first,
            if channel_first { "已是" } else { "不是" }
          ),
        });
      }
      PreprocessStep::Resize(_) if channel_first => {
        return Err(ConfigError::InvalidStep {
          step: "Resize",
          reason: "Resize 必须位于通道优先的 Permute 之前".to_string(),
        });
      }
      PreprocessStep::Permute(params) if params.channel_first => {
        if channel_first {
          return Err(ConfigError::InvalidStep {
            step: "Permute",
            reason: "图像已经是通道优先排列".to_string(),
          });
        }
        channel_first = true;
      }
      _ => {}
    }
  }
  Ok(())
}

#[derive(Deserialize)]
struct RawConfig {
  arch: Option<String>,
  #[serde(rename = "Preprocess")]
  preprocess: Option<Vec<Value>>,
  use_python_inference: Option<bool>,
  min_subgraph_size: Option<u32>,
  label_list: Option<Vec<String>>,
  mask_resolution: Option<u32>,
  with_lmk: Option<bool>,
}

/// 模型部署配置，构造后不可变
#[derive(Debug, Clone)]
pub struct ModelConfig {
  arch: String,
  family: ArchFamily,
  preprocess: Vec<PreprocessStep>,
  backend_mode: BackendMode,
  min_subgraph_size: u32,
  labels: Vec<String>,
  mask_resolution: Option<u32>,
  with_landmark: bool,
}

impl ModelConfig {
  /// 读取模型目录（或配置文件本身）中的 `infer_cfg.yml`
  pub fn load<P: AsRef<Path>>(resource: P) -> Result<Self, ConfigError> {
    let resource = resource.as_ref();
    let path = if resource.is_dir() {
      resource.join(INFER_CONFIG_FILE)
    } else {
      resource.to_path_buf()
    };

    info!("加载模型配置: {}", path.display());
    let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(path.clone(), e))?;
    let config = Self::from_yaml_str(&text)?;
    config.print_summary();
    Ok(config)
  }

  pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
    let raw: RawConfig = serde_yaml::from_str(text)?;

    let arch = raw.arch.ok_or(ConfigError::MissingKey("arch"))?;
    let family = ArchFamily::resolve(&arch).ok_or_else(|| ConfigError::UnsupportedArch {
      arch: arch.clone(),
      supported: supported_patterns(),
    })?;
    debug!("模型架构 {} 解析为 {:?}", arch, family);

    let preprocess = raw
      .preprocess
      .ok_or(ConfigError::MissingKey("Preprocess"))?
      .into_iter()
      .map(resolve_step)
      .collect::<Result<Vec<_>, _>>()?;
    check_step_order(&preprocess)?;

    let backend_mode = match raw
      .use_python_inference
      .ok_or(ConfigError::MissingKey("use_python_inference"))?
    {
      true => BackendMode::Interpreted,
      false => BackendMode::Optimized,
    };

    Ok(ModelConfig {
      arch,
      family,
      preprocess,
      backend_mode,
      min_subgraph_size: raw
        .min_subgraph_size
        .ok_or(ConfigError::MissingKey("min_subgraph_size"))?,
      labels: raw.label_list.ok_or(ConfigError::MissingKey("label_list"))?,
      mask_resolution: raw.mask_resolution,
      with_landmark: raw.with_lmk.unwrap_or(false),
    })
  }

  pub fn arch(&self) -> &str {
    &self.arch
  }

  pub fn family(&self) -> ArchFamily {
    self.family
  }

  pub fn preprocess(&self) -> &[PreprocessStep] {
    &self.preprocess
  }

  pub fn backend_mode(&self) -> BackendMode {
    self.backend_mode
  }

  pub fn min_subgraph_size(&self) -> u32 {
    self.min_subgraph_size
  }

  pub fn labels(&self) -> &[String] {
    &self.labels
  }

  pub fn label(&self, class_id: u32) -> Option<&str> {
    self.labels.get(class_id as usize).map(String::as_str)
  }

  pub fn mask_resolution(&self) -> Option<u32> {
    self.mask_resolution
  }

  pub fn with_landmark(&self) -> bool {
    self.with_landmark
  }

  /// 后端输出张量的排列方式
  pub fn output_layout(&self) -> OutputLayout {
    OutputLayout {
      with_mask: self.mask_resolution.is_some(),
      with_landmark: self.with_landmark,
    }
  }

  fn print_summary(&self) {
    info!("-----------  模型配置 -----------");
    info!("模型架构: {} ({})", self.arch, self.family);
    info!("执行模式: {:?}", self.backend_mode);
    info!("类别数量: {}", self.labels.len());
    if let Some(resolution) = self.mask_resolution {
      info!("掩码分辨率: {}", resolution);
    }
    if self.with_landmark {
      info!("输出人脸关键点");
    }
    info!("预处理顺序:");
    for step in &self.preprocess {
      info!("--预处理: {}", step.name());
    }
    info!("--------------------------------");
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn yaml_with_arch(arch: &str) -> String {
    format!(
      r#"
arch: {arch}
use_python_inference: false
min_subgraph_size: 3
Preprocess:
- type: Resize
  target_size: 608
  interp: 2
- type: Normalize
  is_scale: true
  mean: [0.485, 0.456, 0.406]
  std: [0.229, 0.224, 0.225]
- type: Permute
  to_bgr: false
label_list:
- person
- car
"#
    )
  }

  #[test]
  fn test_load_succeeds_iff_arch_registered() {
    let cases = [
      ("YOLO", true),
      ("YOLOv3_MobileNet", true),
      ("SSD", true),
      ("RetinaNet", true),
      ("EfficientDet", true),
      ("CascadeRCNN", true),
      ("BlazeFace", true),
      ("TTFNet", true),
      ("FCOS", true),
      ("SOLOv2", true),
      ("DETR", false),
      ("yolo", false),
      ("Retina", false),
      ("SOLO", false),
    ];
    for (arch, ok) in cases {
      let result = ModelConfig::from_yaml_str(&yaml_with_arch(arch));
      assert_eq!(result.is_ok(), ok, "arch {arch}");
      if !ok {
        assert!(matches!(result, Err(ConfigError::UnsupportedArch { .. })));
      }
    }
  }

  #[test]
  fn test_parsed_fields() {
    let config = ModelConfig::from_yaml_str(&yaml_with_arch("YOLOv3")).unwrap();
    assert_eq!(config.family(), ArchFamily::Yolo);
    assert_eq!(config.backend_mode(), BackendMode::Optimized);
    assert_eq!(config.min_subgraph_size(), 3);
    assert_eq!(config.labels(), ["person", "car"]);
    assert_eq!(config.label(1), Some("car"));
    assert_eq!(config.label(2), None);
    assert_eq!(config.mask_resolution(), None);
    assert!(!config.with_landmark());

    let names: Vec<_> = config.preprocess().iter().map(|s| s.name()).collect();
    assert_eq!(names, ["Resize", "Normalize", "Permute"]);
    match &config.preprocess()[0] {
      PreprocessStep::Resize(params) => {
        assert_eq!(params.target_size, TargetSize::Square(608));
        assert_eq!(params.max_size, 0);
        assert_eq!(params.interp, 2);
      }
      other => panic!("unexpected step {other:?}"),
    }
    match &config.preprocess()[2] {
      PreprocessStep::Permute(params) => assert!(params.channel_first),
      other => panic!("unexpected step {other:?}"),
    }
  }

  #[test]
  fn test_optional_flags() {
    let text = yaml_with_arch("MaskRCNN") + "mask_resolution: 14\nwith_lmk: false\n";
    let config = ModelConfig::from_yaml_str(&text).unwrap();
    assert_eq!(config.mask_resolution(), Some(14));
    let layout = config.output_layout();
    assert!(layout.with_mask);
    assert!(!layout.with_landmark);
  }

  #[test]
  fn test_missing_keys() {
    for key in ["arch", "use_python_inference", "min_subgraph_size", "label_list"] {
      let text: String = yaml_with_arch("YOLO")
        .lines()
        .filter(|line| !line.starts_with(key))
        .map(|line| format!("{line}\n"))
        .collect();
      let text = if key == "label_list" {
        text.replace("- person\n- car\n", "")
      } else {
        text
      };
      match ModelConfig::from_yaml_str(&text) {
        Err(ConfigError::MissingKey(missing)) => assert_eq!(missing, key),
        other => panic!("expected missing {key}, got {other:?}"),
      }
    }
  }

  #[test]
  fn test_unknown_step() {
    let text = yaml_with_arch("YOLO").replace("type: Permute", "type: RandomFlip");
    assert!(matches!(
      ModelConfig::from_yaml_str(&text),
      Err(ConfigError::UnknownStep(name)) if name == "RandomFlip"
    ));
  }

  #[test]
  fn test_invalid_normalize() {
    let text = yaml_with_arch("YOLO").replace("std: [0.229, 0.224, 0.225]", "std: [0.229, 0.0, 0.225]");
    assert!(matches!(
      ModelConfig::from_yaml_str(&text),
      Err(ConfigError::InvalidStep { step: "Normalize", .. })
    ));

    let text = yaml_with_arch("YOLO").replace("mean: [0.485, 0.456, 0.406]", "mean: [0.485]");
    assert!(matches!(
      ModelConfig::from_yaml_str(&text),
      Err(ConfigError::InvalidStep { step: "Normalize", .. })
    ));
  }

  #[test]
  fn test_resize_after_permute_rejected() {
    let text = r#"
arch: YOLO
use_python_inference: true
min_subgraph_size: 3
Preprocess:
- type: Permute
- type: Resize
  target_size: [320, 480]
label_list: [a]
"#;
    assert!(matches!(
      ModelConfig::from_yaml_str(text),
      Err(ConfigError::InvalidStep { step: "Resize", .. })
    ));
  }

  #[test]
  fn test_normalize_declared_layout() {
    let text = |permute_first: bool, is_channel_first: bool| {
      let permute = "- type: Permute\n";
      let normalize = format!(
        "- type: Normalize\n  is_channel_first: {is_channel_first}\n  mean: [0.5, 0.5, 0.5]\n  std: [0.5, 0.5, 0.5]\n"
      );
      let steps = if permute_first {
        format!("{permute}{normalize}")
      } else {
        format!("{normalize}{permute}")
      };
      format!(
        "arch: SSD\nuse_python_inference: true\nmin_subgraph_size: 3\nPreprocess:\n{steps}label_list: [a]\n"
      )
    };

    assert!(ModelConfig::from_yaml_str(&text(false, false)).is_ok());
    assert!(ModelConfig::from_yaml_str(&text(true, true)).is_ok());
    for (permute_first, is_channel_first) in [(false, true), (true, false)] {
      assert!(matches!(
        ModelConfig::from_yaml_str(&text(permute_first, is_channel_first)),
        Err(ConfigError::InvalidStep { step: "Normalize", .. })
      ));
    }
  }

  #[test]
  fn test_load_from_model_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(INFER_CONFIG_FILE), yaml_with_arch("FCOS")).unwrap();
    let config = ModelConfig::load(dir.path()).unwrap();
    assert_eq!(config.family(), ArchFamily::Fcos);

    let missing = ModelConfig::load(dir.path().join("nope.yml"));
    assert!(matches!(missing, Err(ConfigError::Io(..))));
  }
}
