// 该文件是 Xifeng （西风） 项目的一部分。
// src/adapter.rs - 按架构族构造模型输入
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

use tracing::debug;

use crate::arch::ArchFamily;
use crate::preprocess::ImageMeta;
use crate::tensor::{HostTensor, InputTensorSet};

pub const INPUT_IMAGE: &str = "image";
pub const INPUT_IM_SIZE: &str = "im_size";
pub const INPUT_IM_INFO: &str = "im_info";
pub const INPUT_IM_SHAPE: &str = "im_shape";
pub const INPUT_SCALE_FACTOR: &str = "scale_factor";

/// 根据架构族构造模型输入集合
///
/// 图像张量总是以 `image` 命名，其余辅助张量由架构族决定。
/// 同样的输入总是产生同样的输出。
pub fn create_inputs(image: HostTensor, meta: &ImageMeta, family: ArchFamily) -> InputTensorSet {
  let mut inputs = InputTensorSet::new();
  inputs.insert(INPUT_IMAGE, image);

  let (origin_h, origin_w) = meta.origin_shape;
  let (resize_h, resize_w) = meta.resize_shape;
  let (pad_h, pad_w) = meta.padded_shape();
  let (scale_x, scale_y) = meta.scale;

  match family {
    ArchFamily::Yolo => {
      inputs.insert(
        INPUT_IM_SIZE,
        HostTensor::from_i32(vec![1, 2], vec![origin_h as i32, origin_w as i32]),
      );
    }
    ArchFamily::RetinaNet | ArchFamily::EfficientDet => {
      inputs.insert(INPUT_IM_INFO, im_info(pad_h, pad_w, scale_x));
    }
    ArchFamily::Rcnn | ArchFamily::Fcos => {
      inputs.insert(INPUT_IM_INFO, im_info(pad_h, pad_w, scale_x));
      inputs.insert(
        INPUT_IM_SHAPE,
        HostTensor::from_f32(vec![1, 3], vec![origin_h as f32, origin_w as f32, 1.0]),
      );
    }
    ArchFamily::Ttf => {
      inputs.insert(
        INPUT_SCALE_FACTOR,
        HostTensor::from_f32(vec![4], vec![scale_x, scale_y, scale_x, scale_y]),
      );
    }
    ArchFamily::Solov2 => {
      inputs.insert(INPUT_IM_INFO, im_info(resize_h, resize_w, scale_x));
    }
    ArchFamily::Ssd | ArchFamily::Face => {}
  }

  for (name, tensor) in inputs.iter() {
    debug!("模型输入 {}: {:?} {}", name, tensor.shape(), tensor.dtype());
  }
  inputs
}

fn im_info(height: usize, width: usize, scale: f32) -> HostTensor {
  HostTensor::from_f32(vec![1, 3], vec![height as f32, width as f32, scale])
}
