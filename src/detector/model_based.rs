// 该文件是 Kuangqu （框取） 项目的一部分。
// src/detector/model_based.rs - 基于预训练模型的检测器
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
use tracing::{debug, warn};
use url::Url;

use crate::{
  detector::{Capability, DetectError, WINDOW_LABEL, WindowShape},
  geometry::BoundingBox,
  model::{DetectItem, Model, load_model},
};

/// 包装外部检测模型；模型缺失时检测返回 `DetectorUnavailable`
pub struct ModelDetector {
  model: Option<Box<dyn Model>>,
  shape: WindowShape,
}

impl ModelDetector {
  pub fn new(model: Box<dyn Model>) -> Self {
    Self {
      model: Some(model),
      shape: WindowShape::default(),
    }
  }

  pub fn unavailable() -> Self {
    Self {
      model: None,
      shape: WindowShape::default(),
    }
  }

  /// 从 URL 加载模型，失败时降级为不可用
  pub fn from_model_url(url: Option<&Url>) -> Self {
    let Some(url) = url else {
      debug!("未配置检测模型");
      return Self::unavailable();
    };

    match load_model(url) {
      Ok(model) => Self::new(model),
      Err(e) => {
        warn!("检测模型不可用 ({}): {}", url, e);
        Self::unavailable()
      }
    }
  }

  pub fn detect(
    &self,
    image: &RgbImage,
    confidence_threshold: f32,
    windows_only: bool,
  ) -> Result<Vec<BoundingBox>, DetectError> {
    let model = self.model.as_ref().ok_or(DetectError::DetectorUnavailable)?;
    let result = model.infer(image, confidence_threshold)?;

    let boxes: Vec<BoundingBox> = result
      .items
      .iter()
      .map(to_bounding_box)
      .filter_map(|bbox| {
        if !windows_only {
          return Some(bbox);
        }
        self
          .shape
          .accepts_box(&bbox, image.width(), image.height())
          .then(|| BoundingBox {
            label: Some(WINDOW_LABEL.to_string()),
            ..bbox
          })
      })
      .collect();

    debug!(
      "模型检测: {} 个结果，保留 {} 个",
      result.items.len(),
      boxes.len()
    );
    Ok(boxes)
  }
}

impl Capability for ModelDetector {
  fn is_available(&self) -> bool {
    self.model.is_some()
  }
}

fn to_bounding_box(item: &DetectItem) -> BoundingBox {
  let [x_min, y_min, x_max, y_max] = item.bbox;
  BoundingBox::new(
    x_min as i32,
    y_min as i32,
    (x_max - x_min) as i32,
    (y_max - y_min) as i32,
  )
  .with_label(item.label.clone())
}
