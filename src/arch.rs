// 该文件是 Xifeng （西风） 项目的一部分。
// src/arch.rs - 模型架构族注册表
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

use std::fmt;

/// 模型架构族
///
/// 同一架构族共享输入张量与输出张量的约定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchFamily {
  Yolo,
  RetinaNet,
  EfficientDet,
  Rcnn,
  Fcos,
  Ttf,
  Solov2,
  Ssd,
  Face,
}

/// 已注册的架构子串，按匹配优先级排列
///
/// 架构名只需包含其中某个子串即可（例如 `YOLOv3_DarkNet`、`CascadeRCNN`），
/// 多个子串同时出现时取排在最前面的一项。
pub const SUPPORTED_ARCHS: [(&str, ArchFamily); 9] = [
  ("YOLO", ArchFamily::Yolo),
  ("RetinaNet", ArchFamily::RetinaNet),
  ("EfficientDet", ArchFamily::EfficientDet),
  ("RCNN", ArchFamily::Rcnn),
  ("FCOS", ArchFamily::Fcos),
  ("TTF", ArchFamily::Ttf),
  ("SOLOv2", ArchFamily::Solov2),
  ("SSD", ArchFamily::Ssd),
  ("Face", ArchFamily::Face),
];

impl ArchFamily {
  /// 根据架构名解析架构族，未注册时返回 `None`
  pub fn resolve(arch: &str) -> Option<Self> {
    SUPPORTED_ARCHS
      .iter()
      .find(|(pattern, _)| arch.contains(pattern))
      .map(|&(_, family)| family)
  }

  /// 注册表中的子串
  pub fn pattern(self) -> &'static str {
    SUPPORTED_ARCHS
      .iter()
      .find(|(_, family)| *family == self)
      .map(|&(pattern, _)| pattern)
      .unwrap_or_default()
  }

  /// 缩放时保持长宽比并补边到 `max_size` 的架构族
  pub fn keeps_aspect_ratio(self) -> bool {
    matches!(
      self,
      ArchFamily::Rcnn | ArchFamily::RetinaNet | ArchFamily::Fcos | ArchFamily::Solov2
    )
  }

  /// 输出框坐标位于 [0, 1] 归一化空间的架构族
  pub fn normalized_boxes(self) -> bool {
    matches!(self, ArchFamily::Ssd | ArchFamily::Face)
  }

  pub fn is_segmentation(self) -> bool {
    self == ArchFamily::Solov2
  }
}

impl fmt::Display for ArchFamily {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.pattern())
  }
}

/// 注册表中所有子串，用于错误信息
pub fn supported_patterns() -> Vec<&'static str> {
  SUPPORTED_ARCHS.iter().map(|&(pattern, _)| pattern).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_resolve_exact_names() {
    for (pattern, family) in SUPPORTED_ARCHS {
      assert_eq!(ArchFamily::resolve(pattern), Some(family));
    }
  }

  #[test]
  fn test_resolve_suffixed_variants() {
    assert_eq!(ArchFamily::resolve("YOLOv3_DarkNet"), Some(ArchFamily::Yolo));
    assert_eq!(ArchFamily::resolve("CascadeRCNN"), Some(ArchFamily::Rcnn));
    assert_eq!(ArchFamily::resolve("BlazeFace"), Some(ArchFamily::Face));
    assert_eq!(ArchFamily::resolve("SOLOv2_R50"), Some(ArchFamily::Solov2));
  }

  #[test]
  fn test_resolve_unsupported() {
    assert_eq!(ArchFamily::resolve("DETR"), None);
    assert_eq!(ArchFamily::resolve("yolo"), None);
    assert_eq!(ArchFamily::resolve(""), None);
  }

  #[test]
  fn test_priority_is_fixed() {
    // 同时包含两个子串时总是取优先级更高者
    assert_eq!(ArchFamily::resolve("YOLO_RCNN"), Some(ArchFamily::Yolo));
    assert_eq!(ArchFamily::resolve("RCNN_YOLO"), Some(ArchFamily::Yolo));
  }

  #[test]
  fn test_family_predicates() {
    assert!(ArchFamily::Rcnn.keeps_aspect_ratio());
    assert!(!ArchFamily::Yolo.keeps_aspect_ratio());
    assert!(ArchFamily::Ssd.normalized_boxes());
    assert!(ArchFamily::Face.normalized_boxes());
    assert!(!ArchFamily::Fcos.normalized_boxes());
    assert!(ArchFamily::Solov2.is_segmentation());
    assert_eq!(ArchFamily::Ttf.to_string(), "TTF");
  }
}
