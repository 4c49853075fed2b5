// 该文件是 Kuangqu （框取） 项目的一部分。
// src/detector/contour.rs - 基于边缘与轮廓的窗口检测
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

use image::RgbImage;
#[cfg(feature = "primitive_contour")]
use tracing::debug;
#[cfg(not(feature = "primitive_contour"))]
use tracing::warn;

use crate::{
  detector::{Capability, WindowProposer, WindowShape},
  geometry::BoundingBox,
  suppress::DEFAULT_OVERLAP_THRESHOLD,
};

/// 轮廓检测参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContourDetector {
  pub canny_low: f32,
  pub canny_high: f32,
  pub dilate_iterations: usize,
  /// 多边形近似容差占轮廓周长的比例
  pub polygon_epsilon: f64,
  pub min_vertices: usize,
  pub overlap_threshold: f64,
  pub shape: WindowShape,
}

impl Default for ContourDetector {
  fn default() -> Self {
    Self {
      canny_low: 30.0,
      canny_high: 100.0,
      dilate_iterations: 2,
      polygon_epsilon: 0.02,
      min_vertices: 4,
      overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
      shape: WindowShape::default(),
    }
  }
}

impl Capability for ContourDetector {
  fn is_available(&self) -> bool {
    cfg!(feature = "primitive_contour")
  }
}

#[cfg(not(feature = "primitive_contour"))]
impl WindowProposer for ContourDetector {
  fn propose(&self, _image: &RgbImage) -> Vec<BoundingBox> {
    warn!("轮廓检测未编译 (primitive_contour)，返回空结果");
    Vec::new()
  }
}

#[cfg(feature = "primitive_contour")]
impl WindowProposer for ContourDetector {
  fn propose(&self, image: &RgbImage) -> Vec<BoundingBox> {
    use imageproc::{
      contours::{BorderType, find_contours},
      distance_transform::Norm,
      edges::canny,
      geometry::{approximate_polygon_dp, arc_length, contour_area},
      morphology::dilate,
    };

    use crate::{detector::WINDOW_LABEL, suppress::suppress_overlaps};

    let gray = image::imageops::grayscale(image);
    let edges = canny(&gray, self.canny_low, self.canny_high);

    // 3x3 结构元素膨胀，连接断开的边缘
    let mut thick = edges;
    for _ in 0..self.dilate_iterations {
      thick = dilate(&thick, Norm::LInf, 1);
    }

    let contours = find_contours::<i32>(&thick);
    let image_area = image.width() as f64 * image.height() as f64;

    let mut candidates = Vec::new();
    for contour in contours
      .iter()
      .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
    {
      let points = &contour.points;
      if points.len() < 3 {
        continue;
      }

      let area = contour_area(points);
      if !self.shape.accepts_area(area, image_area) {
        continue;
      }

      let bbox = bounding_rect(points);
      if !self
        .shape
        .accepts_aspect(bbox.width as f64, bbox.height as f64)
      {
        continue;
      }

      let epsilon = self.polygon_epsilon * arc_length(points, true);
      let approx = approximate_polygon_dp(points, epsilon, true);
      if approx.len() < self.min_vertices {
        continue;
      }

      candidates.push(bbox.with_label(WINDOW_LABEL));
    }

    debug!(
      "轮廓检测: {} 个外轮廓，{} 个候选窗口",
      contours.len(),
      candidates.len()
    );

    suppress_overlaps(candidates, self.overlap_threshold)
  }
}

#[cfg(feature = "primitive_contour")]
fn bounding_rect(points: &[imageproc::point::Point<i32>]) -> BoundingBox {
  let (mut min_x, mut min_y) = (i32::MAX, i32::MAX);
  let (mut max_x, mut max_y) = (i32::MIN, i32::MIN);
  for p in points {
    min_x = min_x.min(p.x);
    min_y = min_y.min(p.y);
    max_x = max_x.max(p.x);
    max_y = max_y.max(p.y);
  }
  BoundingBox::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1)
}
