// 该文件是 Kuangqu （框取） 项目的一部分。
// src/model/yolov8.rs - YOLOv8 ONNX 模型
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

use std::sync::Mutex;

use image::RgbImage;
use ort::{session::Session, value::Tensor};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  geometry::{BoundingBox, intersection_over_union},
  model::{COCO_CLASSES, DetectItem, DetectResult, Model, ModelError, YOLOV8_SCHEME, coco_label},
};

const YOLOV8_INPUT_SIZE: u32 = 640;
const YOLOV8_BOX_VALUES: usize = 4;
const YOLOV8_DEFAULT_IOU: f32 = 0.45;

pub struct Yolov8 {
  session: Mutex<Session>,
  iou_threshold: f32,
}

pub struct Yolov8Builder {
  model_path: String,
  iou_threshold: f32,
}

impl FromUrlWithScheme for Yolov8Builder {
  const SCHEME: &'static str = YOLOV8_SCHEME;
}

impl FromUrl for Yolov8Builder {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::SchemeMismatch(url.scheme().to_string()));
    }

    let iou_threshold = url
      .query_pairs()
      .find(|(k, _)| k == "iou")
      .and_then(|(_, v)| v.parse::<f32>().ok())
      .unwrap_or(YOLOV8_DEFAULT_IOU);

    Ok(Yolov8Builder {
      model_path: url.path().to_string(),
      iou_threshold,
    })
  }
}

impl Yolov8Builder {
  pub fn build(self) -> Result<Yolov8, ModelError> {
    info!("加载模型文件: {}", self.model_path);
    let model_bytes = std::fs::read(&self.model_path)
      .map_err(|e| ModelError::Load(format!("{}: {}", self.model_path, e)))?;
    let session = Session::builder()
      .map_err(|e| ModelError::Load(e.to_string()))?
      .commit_from_memory(&model_bytes)
      .map_err(|e| ModelError::Load(format!("{}: {}", self.model_path, e)))?;
    info!("模型加载完成");

    Ok(Yolov8 {
      session: Mutex::new(session),
      iou_threshold: self.iou_threshold,
    })
  }
}

/// 缩放到 640x640，转为 NCHW 浮点张量并归一化到 [0, 1]
fn preprocess(image: &RgbImage) -> Vec<f32> {
  let resized = image::imageops::resize(
    image,
    YOLOV8_INPUT_SIZE,
    YOLOV8_INPUT_SIZE,
    image::imageops::FilterType::Triangle,
  );

  let plane = (YOLOV8_INPUT_SIZE * YOLOV8_INPUT_SIZE) as usize;
  let raw = resized.as_raw();
  let mut data = vec![0f32; 3 * plane];
  for idx in 0..plane {
    data[idx] = raw[idx * 3] as f32 / 255.0;
    data[plane + idx] = raw[idx * 3 + 1] as f32 / 255.0;
    data[2 * plane + idx] = raw[idx * 3 + 2] as f32 / 255.0;
  }
  data
}

impl Model for Yolov8 {
  fn infer(&self, image: &RgbImage, confidence_threshold: f32) -> Result<DetectResult, ModelError> {
    let input = preprocess(image);
    let shape = [1usize, 3, YOLOV8_INPUT_SIZE as usize, YOLOV8_INPUT_SIZE as usize];
    let tensor = Tensor::from_array((shape, input.into_boxed_slice()))
      .map_err(|e| ModelError::Inference(e.to_string()))?;

    debug!("执行模型推理");
    let mut session = self.session.lock().map_err(|_| {
      warn!("模型会话锁已损坏");
      ModelError::Inference("model session lock poisoned".to_string())
    })?;
    let outputs = session
      .run(ort::inputs![tensor])
      .map_err(|e| ModelError::Inference(e.to_string()))?;

    let (_shape, data) = outputs[0]
      .try_extract_tensor::<f32>()
      .map_err(|e| ModelError::InvalidOutput(e.to_string()))?;

    let items = postprocess(
      data,
      image.width() as f32,
      image.height() as f32,
      confidence_threshold,
      self.iou_threshold,
    )?;
    debug!("检测到 {} 个物体", items.len());

    Ok(DetectResult {
      items: items.into_boxed_slice(),
    })
  }
}

/// 解码 `[1, 84, N]` 输出：每列为 cx, cy, w, h 和 80 个类别分数
fn postprocess(
  data: &[f32],
  original_width: f32,
  original_height: f32,
  confidence_threshold: f32,
  iou_threshold: f32,
) -> Result<Vec<DetectItem>, ModelError> {
  let rows = YOLOV8_BOX_VALUES + COCO_CLASSES.len();
  if data.is_empty() || data.len() % rows != 0 {
    warn!("输出长度 {} 不是 {} 的整数倍", data.len(), rows);
    return Err(ModelError::InvalidOutput(format!(
      "output length {} is not a multiple of {}",
      data.len(),
      rows
    )));
  }
  let proposals = data.len() / rows;

  let scale_x = original_width / YOLOV8_INPUT_SIZE as f32;
  let scale_y = original_height / YOLOV8_INPUT_SIZE as f32;

  let mut candidates = Vec::new();
  for i in 0..proposals {
    let mut best_score = 0f32;
    let mut best_class = 0usize;
    for c in 0..COCO_CLASSES.len() {
      let score = data[(YOLOV8_BOX_VALUES + c) * proposals + i];
      if score > best_score {
        best_score = score;
        best_class = c;
      }
    }
    if best_score < confidence_threshold {
      continue;
    }

    let cx = data[i];
    let cy = data[proposals + i];
    let w = data[2 * proposals + i];
    let h = data[3 * proposals + i];

    candidates.push((
      best_class,
      DetectItem {
        label: coco_label(best_class).to_string(),
        score: best_score,
        bbox: [
          ((cx - w / 2.0) * scale_x).max(0.0),
          ((cy - h / 2.0) * scale_y).max(0.0),
          ((cx + w / 2.0) * scale_x).min(original_width),
          ((cy + h / 2.0) * scale_y).min(original_height),
        ],
      },
    ));
  }

  Ok(nms(candidates, iou_threshold))
}

fn as_bounding_box(item: &DetectItem) -> BoundingBox {
  BoundingBox::new(
    item.bbox[0] as i32,
    item.bbox[1] as i32,
    (item.bbox[2] - item.bbox[0]) as i32,
    (item.bbox[3] - item.bbox[1]) as i32,
  )
}

/// 按类别进行非极大值抑制
fn nms(mut candidates: Vec<(usize, DetectItem)>, iou_threshold: f32) -> Vec<DetectItem> {
  candidates.sort_by(|a, b| b.1.score.total_cmp(&a.1.score));

  let mut result: Vec<(usize, DetectItem)> = Vec::new();
  for (class_id, item) in candidates {
    let bbox = as_bounding_box(&item);
    let suppressed = result.iter().any(|(kept_class, kept)| {
      *kept_class == class_id
        && intersection_over_union(&bbox, &as_bounding_box(kept)) >= iou_threshold as f64
    });
    if !suppressed {
      result.push((class_id, item));
    }
  }

  result.into_iter().map(|(_, item)| item).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn synthetic_output(proposals: &[(f32, f32, f32, f32, usize, f32)]) -> Vec<f32> {
    let n = proposals.len();
    let rows = YOLOV8_BOX_VALUES + COCO_CLASSES.len();
    let mut data = vec![0f32; rows * n];
    for (i, &(cx, cy, w, h, class, score)) in proposals.iter().enumerate() {
      data[i] = cx;
      data[n + i] = cy;
      data[2 * n + i] = w;
      data[3 * n + i] = h;
      data[(YOLOV8_BOX_VALUES + class) * n + i] = score;
    }
    data
  }

  #[test]
  fn decodes_scales_and_suppresses() {
    let data = synthetic_output(&[
      (320.0, 320.0, 100.0, 100.0, 0, 0.9),
      (322.0, 322.0, 100.0, 100.0, 0, 0.8),
      (100.0, 100.0, 50.0, 50.0, 62, 0.7),
      (500.0, 500.0, 50.0, 50.0, 2, 0.1),
    ]);
    let items = postprocess(&data, 1280.0, 640.0, 0.5, 0.45).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].label, "person");
    assert_eq!(items[0].bbox, [540.0, 270.0, 740.0, 370.0]);
    assert_eq!(items[1].label, "tv");
  }

  #[test]
  fn rejects_malformed_output() {
    let err = postprocess(&[0.0; 85], 640.0, 640.0, 0.5, 0.45).unwrap_err();
    assert_eq!(
      err.to_string(),
      "invalid model output: output length 85 is not a multiple of 84"
    );
  }

  #[test]
  fn iou_threshold_comes_from_url() {
    let url = Url::parse("yolov8:///models/yolov8n.onnx?iou=0.3").unwrap();
    let builder = Yolov8Builder::from_url(&url).unwrap();
    assert_eq!(builder.model_path, "/models/yolov8n.onnx");
    assert_eq!(builder.iou_threshold, 0.3);
  }
}
