// 该文件是 Xifeng （西风） 项目的一部分。
// tests/round_trip.rs - 使用模拟后端的端到端测试
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

use std::sync::{Arc, Mutex};

use image::{Rgb, RgbImage};
use xifeng::backend::{BackendError, ExecutionBackend};
use xifeng::config::ModelConfig;
use xifeng::detector::Detector;
use xifeng::model::{DetectionResult, Model};
use xifeng::preprocess::ImageSource;
use xifeng::tensor::{HostTensor, InputTensorSet, RawOutputSet};

const YOLO_CONFIG: &str = r#"
arch: YOLOv3_DarkNet
use_python_inference: true
min_subgraph_size: 3
Preprocess:
- type: Resize
  target_size: 64
  interp: 2
- type: Normalize
  is_scale: true
  mean: [0.485, 0.456, 0.406]
  std: [0.229, 0.224, 0.225]
- type: Permute
  to_bgr: false
  channel_first: true
label_list: [person, bicycle, car]
"#;

const RCNN_CONFIG: &str = r#"
arch: Mask_RCNN
use_python_inference: false
min_subgraph_size: 40
mask_resolution: 2
Preprocess:
- type: Normalize
  is_scale: true
  mean: [0.485, 0.456, 0.406]
  std: [0.229, 0.224, 0.225]
- type: Resize
  target_size: 40
  max_size: 64
  interp: 1
- type: Permute
  to_bgr: false
  channel_first: true
- type: PadStride
  stride: 32
label_list: [person, bicycle, car]
"#;

/// 原样返回预先注入的输出，并记录收到的输入
struct EchoBackend {
  outputs: RawOutputSet,
  seen: Arc<Mutex<Vec<InputTensorSet>>>,
}

impl ExecutionBackend for EchoBackend {
  fn name(&self) -> &'static str {
    "echo"
  }

  fn run_once(&mut self, inputs: &InputTensorSet) -> Result<RawOutputSet, BackendError> {
    self.seen.lock().unwrap().push(inputs.clone());
    Ok(self.outputs.clone())
  }
}

fn boxes(rows: &[[f32; 6]]) -> HostTensor {
  HostTensor::from_f32(vec![rows.len(), 6], rows.iter().flatten().copied().collect())
}

fn echo(outputs: RawOutputSet) -> (Box<dyn ExecutionBackend>, Arc<Mutex<Vec<InputTensorSet>>>) {
  let seen = Arc::new(Mutex::new(Vec::new()));
  let backend = EchoBackend {
    outputs,
    seen: seen.clone(),
  };
  (Box::new(backend), seen)
}

#[test]
fn yolo_round_trip_keeps_boxes() {
  let config = ModelConfig::from_yaml_str(YOLO_CONFIG).unwrap();
  let rows = [
    [0.0, 0.9, 10.0, 20.0, 30.0, 40.0],
    [2.0, 0.3, 1.0, 2.0, 3.0, 4.0],
    [1.0, 0.7, 5.5, 6.5, 7.5, 8.5],
  ];
  let outputs: RawOutputSet = vec![("boxes".to_string(), boxes(&rows))].into_iter().collect();
  let (backend, seen) = echo(outputs);
  let mut detector = Detector::with_backend(config, backend, 0.5);
  assert_eq!(detector.backend_name(), "echo");

  let image = RgbImage::from_fn(80, 60, |x, y| Rgb([x as u8, y as u8, 128]));
  let result = detector.predict(&image).unwrap();
  let items = &result.boxes().unwrap().items;
  assert_eq!(items.len(), 2);
  assert_eq!(items[0].class_id, 0);
  assert_eq!(items[0].bbox, [10.0, 20.0, 30.0, 40.0]);
  assert_eq!(items[1].class_id, 1);
  assert_eq!(items[1].score, 0.7);
  assert_eq!(items[1].bbox, [5.5, 6.5, 7.5, 8.5]);

  let seen = seen.lock().unwrap();
  assert_eq!(seen.len(), 1);
  let inputs = &seen[0];
  assert_eq!(inputs.names().collect::<Vec<_>>(), ["image", "im_size"]);
  assert_eq!(inputs.get("image").unwrap().shape(), &[1, 3, 64, 64]);
  let im_size: Vec<i64> = inputs.get("im_size").unwrap().to_i64().iter().copied().collect();
  assert_eq!(im_size, [60, 80]);
}

#[test]
fn timed_prediction_runs_warmup_and_repeats() {
  let config = ModelConfig::from_yaml_str(YOLO_CONFIG).unwrap();
  let outputs: RawOutputSet = vec![("boxes".to_string(), HostTensor::from_f32(vec![1, 1], vec![-1.0]))]
    .into_iter()
    .collect();
  let (backend, seen) = echo(outputs);
  let mut detector = Detector::with_backend(config, backend, 0.5);

  let image = RgbImage::from_pixel(32, 32, Rgb([0, 0, 0]));
  let (result, average_ms) = detector.predict_timed(&image, 0.5, 2, 3).unwrap();
  assert_eq!(result, DetectionResult::Empty);
  assert!(average_ms >= 0.0);
  assert_eq!(seen.lock().unwrap().len(), 5);
}

#[test]
fn rcnn_round_trip_with_masks() {
  let config = ModelConfig::from_yaml_str(RCNN_CONFIG).unwrap();
  let rows = [
    [2.0, 0.95, 1.0, 1.0, 20.0, 20.0],
    [1.0, 0.05, 1.0, 1.0, 2.0, 2.0],
  ];
  let outputs: RawOutputSet = vec![
    ("boxes".to_string(), boxes(&rows)),
    ("masks".to_string(), HostTensor::from_f32(vec![2, 3, 2, 2], vec![0.25; 24])),
  ]
  .into_iter()
  .collect();
  let (backend, seen) = echo(outputs);
  let mut detector = Detector::with_backend(config, backend, 0.5);

  // 20x40 的图像短边缩放到 40，长边 80 超过 64，改为按 64 / 40 缩放
  let image = RgbImage::from_pixel(40, 20, Rgb([200, 100, 50]));
  let result = detector.infer(&image).unwrap();
  let detect = result.boxes().unwrap();
  assert_eq!(detect.items.len(), 1);
  assert_eq!(detect.items[0].class_id, 2);
  assert_eq!(detect.masks.as_ref().unwrap().shape(), &[1, 3, 2, 2]);

  let seen = seen.lock().unwrap();
  let inputs = &seen[0];
  assert_eq!(inputs.names().collect::<Vec<_>>(), ["image", "im_info", "im_shape"]);
  // 画布为 64x64，已是 32 的倍数
  assert_eq!(inputs.get("image").unwrap().shape(), &[1, 3, 64, 64]);
  let im_info: Vec<f32> = inputs.get("im_info").unwrap().to_f32().iter().copied().collect();
  assert_eq!(im_info[..2], [64.0, 64.0]);
  assert!((im_info[2] - 1.6).abs() < 1e-6);
  let im_shape: Vec<f32> = inputs.get("im_shape").unwrap().to_f32().iter().copied().collect();
  assert_eq!(im_shape, [20.0, 40.0, 1.0]);
}

#[test]
fn undecodable_source_is_an_error() {
  let config = ModelConfig::from_yaml_str(YOLO_CONFIG).unwrap();
  let (backend, seen) = echo(RawOutputSet::new());
  let mut detector = Detector::with_backend(config, backend, 0.5);
  let result = detector.predict_source(&ImageSource::Bytes(b"definitely not an image".to_vec()));
  assert!(result.is_err());
  assert!(seen.lock().unwrap().is_empty());
}
