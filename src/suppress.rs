// 该文件是 Kuangqu （框取） 项目的一部分。
// src/suppress.rs - 重叠框抑制
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

use std::cmp::Reverse;

use tracing::debug;

use crate::geometry::{BoundingBox, intersection_over_union};

/// 默认 IoU 阈值
pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.5;

/// 贪心去除重叠框，优先保留面积较大的框。
///
/// 按面积降序（面积相同时保持输入顺序）逐个检查，与已保留的任一框
/// IoU 超过 `threshold` 即丢弃。结果是近似解，不保证保留数量最多。
pub fn suppress_overlaps(mut boxes: Vec<BoundingBox>, threshold: f64) -> Vec<BoundingBox> {
  if boxes.is_empty() {
    return boxes;
  }

  let total = boxes.len();
  // sort_by_key 是稳定排序
  boxes.sort_by_key(|b| Reverse(b.area()));

  let mut kept: Vec<BoundingBox> = Vec::with_capacity(boxes.len());
  for candidate in boxes {
    let overlapping = kept
      .iter()
      .any(|existing| intersection_over_union(&candidate, existing) > threshold);
    if !overlapping {
      kept.push(candidate);
    }
  }

  debug!("重叠抑制: {} 个候选框保留 {} 个", total, kept.len());
  kept
}
