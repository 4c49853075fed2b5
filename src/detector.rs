// 该文件是 Kuangqu （框取） 项目的一部分。
// src/detector.rs - 区域检测与回退策略
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
use thiserror::Error;
use tracing::{debug, info};

use crate::geometry::BoundingBox;
use crate::model::ModelError;

mod contour;
mod model_based;

pub use self::contour::ContourDetector;
pub use self::model_based::ModelDetector;

/// 窗口类区域的标签
pub const WINDOW_LABEL: &str = "window";

/// 可选能力：运行时可能不存在，缺失不是错误
pub trait Capability {
  fn is_available(&self) -> bool;
}

/// 不依赖模型、仅根据像素结构提出候选窗口的检测器
pub trait WindowProposer: Capability {
  /// 能力缺失时返回空结果
  fn propose(&self, image: &RgbImage) -> Vec<BoundingBox>;
}

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("object detection model is unavailable")]
  DetectorUnavailable,
  #[error(transparent)]
  Model(#[from] ModelError),
}

/// 窗口形状过滤条件
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowShape {
  pub min_area_fraction: f64,
  pub max_area_fraction: f64,
  pub min_aspect_ratio: f64,
  pub max_aspect_ratio: f64,
}

impl Default for WindowShape {
  fn default() -> Self {
    Self {
      min_area_fraction: 0.005,
      max_area_fraction: 0.9,
      min_aspect_ratio: 0.3,
      max_aspect_ratio: 3.0,
    }
  }
}

impl WindowShape {
  pub fn accepts_area(&self, area: f64, image_area: f64) -> bool {
    area >= image_area * self.min_area_fraction && area <= image_area * self.max_area_fraction
  }

  pub fn accepts_aspect(&self, width: f64, height: f64) -> bool {
    if height <= 0.0 {
      return false;
    }
    let aspect = width / height;
    aspect >= self.min_aspect_ratio && aspect <= self.max_aspect_ratio
  }

  /// 对边界框本身做面积与宽高比检查
  pub fn accepts_box(&self, bbox: &BoundingBox, image_width: u32, image_height: u32) -> bool {
    let image_area = image_width as f64 * image_height as f64;
    self.accepts_area(bbox.area() as f64, image_area)
      && self.accepts_aspect(bbox.width as f64, bbox.height as f64)
  }
}

/// 本张图像最终采用的检测方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectStrategy {
  Primitive,
  ModelBased,
}

/// 回退策略：仅窗口模式且轮廓检测有结果时直接采用，否则交给模型
pub fn select_strategy(windows_only: bool, primitive_found: bool) -> DetectStrategy {
  if windows_only && primitive_found {
    DetectStrategy::Primitive
  } else {
    DetectStrategy::ModelBased
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectOptions {
  pub windows_only: bool,
  pub confidence_threshold: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub strategy: DetectStrategy,
  pub boxes: Vec<BoundingBox>,
}

/// 决定运行哪个检测器以及先后顺序
pub struct DetectionOrchestrator {
  primitive: Box<dyn WindowProposer>,
  model: ModelDetector,
}

impl DetectionOrchestrator {
  pub fn new(primitive: Box<dyn WindowProposer>, model: ModelDetector) -> Self {
    Self { primitive, model }
  }

  pub fn primitive_available(&self) -> bool {
    self.primitive.is_available()
  }

  pub fn model_available(&self) -> bool {
    self.model.is_available()
  }

  pub fn detect(&self, image: &RgbImage, options: &DetectOptions) -> Result<Detection, DetectError> {
    let primitive_boxes = if options.windows_only {
      self.primitive.propose(image)
    } else {
      Vec::new()
    };

    let strategy = select_strategy(options.windows_only, !primitive_boxes.is_empty());
    info!("检测策略: {:?}", strategy);

    let boxes = match strategy {
      DetectStrategy::Primitive => primitive_boxes,
      DetectStrategy::ModelBased => {
        if options.windows_only {
          debug!("轮廓检测未找到窗口，回退到模型检测");
        }
        self
          .model
          .detect(image, options.confidence_threshold, options.windows_only)?
      }
    };

    Ok(Detection { strategy, boxes })
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use std::cell::Cell;
  use std::rc::Rc;

  use super::*;
  use crate::model::{DetectItem, DetectResult, Model};

  pub(crate) struct FixedProposer {
    pub available: bool,
    pub boxes: Vec<BoundingBox>,
  }

  impl Capability for FixedProposer {
    fn is_available(&self) -> bool {
      self.available
    }
  }

  impl WindowProposer for FixedProposer {
    fn propose(&self, _image: &RgbImage) -> Vec<BoundingBox> {
      if self.available {
        self.boxes.clone()
      } else {
        Vec::new()
      }
    }
  }

  pub(crate) struct CountingModel {
    pub calls: Rc<Cell<usize>>,
    pub items: Vec<DetectItem>,
  }

  impl Model for CountingModel {
    fn infer(&self, _image: &RgbImage, confidence: f32) -> Result<DetectResult, ModelError> {
      self.calls.set(self.calls.get() + 1);
      let items: Vec<_> = self
        .items
        .iter()
        .filter(|item| item.score >= confidence)
        .cloned()
        .collect();
      Ok(DetectResult {
        items: items.into_boxed_slice(),
      })
    }
  }

  pub(crate) fn item(label: &str, score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      label: label.to_string(),
      score,
      bbox,
    }
  }

  fn orchestrator(
    proposed: Vec<BoundingBox>,
    items: Vec<DetectItem>,
  ) -> (DetectionOrchestrator, Rc<Cell<usize>>) {
    let calls = Rc::new(Cell::new(0));
    let model = CountingModel {
      calls: calls.clone(),
      items,
    };
    let orchestrator = DetectionOrchestrator::new(
      Box::new(FixedProposer {
        available: true,
        boxes: proposed,
      }),
      ModelDetector::new(Box::new(model)),
    );
    (orchestrator, calls)
  }

  fn options(windows_only: bool) -> DetectOptions {
    DetectOptions {
      windows_only,
      confidence_threshold: 0.5,
    }
  }

  #[test]
  fn strategy_table() {
    assert_eq!(select_strategy(true, true), DetectStrategy::Primitive);
    assert_eq!(select_strategy(true, false), DetectStrategy::ModelBased);
    assert_eq!(select_strategy(false, true), DetectStrategy::ModelBased);
    assert_eq!(select_strategy(false, false), DetectStrategy::ModelBased);
  }

  #[test]
  fn primitive_hit_skips_model() {
    let window = BoundingBox::new(10, 10, 40, 30).with_label(WINDOW_LABEL);
    let (orchestrator, calls) = orchestrator(vec![window.clone()], vec![]);
    let image = RgbImage::new(100, 100);

    let detection = orchestrator.detect(&image, &options(true)).unwrap();
    assert_eq!(detection.strategy, DetectStrategy::Primitive);
    assert_eq!(detection.boxes, vec![window]);
    assert_eq!(calls.get(), 0);
  }

  #[test]
  fn primitive_miss_falls_back_to_filtered_model() {
    let (orchestrator, calls) = orchestrator(
      vec![],
      vec![
        item("tv", 0.9, [10.0, 10.0, 50.0, 40.0]),
        // 过细长，被窗口过滤
        item("bench", 0.9, [0.0, 0.0, 90.0, 5.0]),
      ],
    );
    let image = RgbImage::new(100, 100);

    let detection = orchestrator.detect(&image, &options(true)).unwrap();
    assert_eq!(detection.strategy, DetectStrategy::ModelBased);
    assert_eq!(
      detection.boxes,
      vec![BoundingBox::new(10, 10, 40, 30).with_label(WINDOW_LABEL)]
    );
    assert_eq!(calls.get(), 1);
  }

  #[test]
  fn general_mode_uses_model_only_with_native_labels() {
    let window = BoundingBox::new(10, 10, 40, 30).with_label(WINDOW_LABEL);
    let (orchestrator, calls) = orchestrator(
      vec![window],
      vec![
        item("bench", 0.9, [0.0, 0.0, 90.0, 5.0]),
        item("cat", 0.2, [0.0, 0.0, 10.0, 10.0]),
      ],
    );
    let image = RgbImage::new(100, 100);

    let detection = orchestrator.detect(&image, &options(false)).unwrap();
    assert_eq!(detection.strategy, DetectStrategy::ModelBased);
    assert_eq!(
      detection.boxes,
      vec![BoundingBox::new(0, 0, 90, 5).with_label("bench")]
    );
    assert_eq!(calls.get(), 1);
  }

  #[test]
  fn missing_model_is_reported_as_unavailable() {
    let orchestrator = DetectionOrchestrator::new(
      Box::new(FixedProposer {
        available: false,
        boxes: vec![],
      }),
      ModelDetector::unavailable(),
    );
    let image = RgbImage::new(64, 64);

    assert!(!orchestrator.primitive_available());
    assert!(!orchestrator.model_available());
    assert!(matches!(
      orchestrator.detect(&image, &options(true)),
      Err(DetectError::DetectorUnavailable)
    ));
  }

  #[test]
  fn window_shape_bounds_are_inclusive() {
    let shape = WindowShape::default();
    assert!(shape.accepts_area(5.0, 1000.0));
    assert!(!shape.accepts_area(4.9, 1000.0));
    assert!(shape.accepts_area(900.0, 1000.0));
    assert!(!shape.accepts_area(900.1, 1000.0));
    assert!(shape.accepts_aspect(3.0, 1.0));
    assert!(shape.accepts_aspect(0.3, 1.0));
    assert!(!shape.accepts_aspect(3.1, 1.0));
    assert!(!shape.accepts_aspect(1.0, 0.0));
  }
}
