// 该文件是 Xifeng （西风） 项目的一部分。
// src/backend/fixture.rs - 后端测试用的小型计算图
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

//! 手工编码的 ONNX 模型：
//!
//! ```text
//! image: f32 [1, 3]  -> Add(image, image)   -> doubled
//! im_size: i64 [2]   -> Add(im_size, im_size) -> sizes
//! ```
//!
//! 输出按 `doubled`、`sizes` 的顺序声明。

use std::path::{Path, PathBuf};

const FLOAT: u64 = 1;
const INT64: u64 = 7;

fn varint(buf: &mut Vec<u8>, mut value: u64) {
  while value >= 0x80 {
    buf.push((value as u8 & 0x7f) | 0x80);
    value >>= 7;
  }
  buf.push(value as u8);
}

fn field_varint(buf: &mut Vec<u8>, field: u64, value: u64) {
  varint(buf, field << 3);
  varint(buf, value);
}

fn field_bytes(buf: &mut Vec<u8>, field: u64, bytes: &[u8]) {
  varint(buf, (field << 3) | 2);
  varint(buf, bytes.len() as u64);
  buf.extend_from_slice(bytes);
}

fn value_info(name: &str, elem_type: u64, dims: &[u64]) -> Vec<u8> {
  let mut shape = Vec::new();
  for &dim in dims {
    let mut dimension = Vec::new();
    field_varint(&mut dimension, 1, dim);
    field_bytes(&mut shape, 1, &dimension);
  }
  let mut tensor_type = Vec::new();
  field_varint(&mut tensor_type, 1, elem_type);
  field_bytes(&mut tensor_type, 2, &shape);
  let mut type_proto = Vec::new();
  field_bytes(&mut type_proto, 1, &tensor_type);

  let mut info = Vec::new();
  field_bytes(&mut info, 1, name.as_bytes());
  field_bytes(&mut info, 2, &type_proto);
  info
}

fn add_node(input: &str, output: &str) -> Vec<u8> {
  let mut node = Vec::new();
  field_bytes(&mut node, 1, input.as_bytes());
  field_bytes(&mut node, 1, input.as_bytes());
  field_bytes(&mut node, 2, output.as_bytes());
  field_bytes(&mut node, 3, format!("add_{output}").as_bytes());
  field_bytes(&mut node, 4, b"Add");
  node
}

pub fn doubling_model() -> Vec<u8> {
  let mut graph = Vec::new();
  field_bytes(&mut graph, 1, &add_node("image", "doubled"));
  field_bytes(&mut graph, 1, &add_node("im_size", "sizes"));
  field_bytes(&mut graph, 2, b"doubling");
  field_bytes(&mut graph, 11, &value_info("image", FLOAT, &[1, 3]));
  field_bytes(&mut graph, 11, &value_info("im_size", INT64, &[2]));
  field_bytes(&mut graph, 12, &value_info("doubled", FLOAT, &[1, 3]));
  field_bytes(&mut graph, 12, &value_info("sizes", INT64, &[2]));

  let mut opset = Vec::new();
  field_bytes(&mut opset, 1, b"");
  field_varint(&mut opset, 2, 13);

  let mut model = Vec::new();
  field_varint(&mut model, 1, 7);
  field_bytes(&mut model, 7, &graph);
  field_bytes(&mut model, 8, &opset);
  model
}

/// 将模型写入 `dir/model.onnx` 并返回其路径
pub fn write_doubling_model(dir: &Path) -> PathBuf {
  let path = dir.join(super::MODEL_FILE);
  std::fs::write(&path, doubling_model()).unwrap();
  path
}
