// 该文件是 Kuangqu （框取） 项目的一部分。
// src/model.rs - 目标检测模型
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
use url::Url;

/// 预训练检测模型
pub trait Model {
  fn infer(&self, image: &RgbImage, confidence_threshold: f32) -> Result<DetectResult, ModelError>;
}

#[derive(Debug, Clone)]
pub struct DetectItem {
  pub label: String,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，源图像像素坐标
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("failed to load model: {0}")]
  Load(String),
  #[error("inference error: {0}")]
  Inference(String),
  #[error("invalid model output: {0}")]
  InvalidOutput(String),
  #[error("unknown model scheme '{0}'")]
  SchemeMismatch(String),
  #[error("model backend not compiled in (feature {0})")]
  BackendDisabled(&'static str),
}

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

pub fn coco_label(class_id: usize) -> &'static str {
  COCO_CLASSES.get(class_id).copied().unwrap_or("unknown")
}

#[cfg(feature = "model_yolov8")]
mod yolov8;
#[cfg(feature = "model_yolov8")]
pub use self::yolov8::{Yolov8, Yolov8Builder};

pub const YOLOV8_SCHEME: &str = "yolov8";

/// 根据 URL 方案加载模型，例如 `yolov8:///models/yolov8n.onnx?iou=0.45`
pub fn load_model(url: &Url) -> Result<Box<dyn Model>, ModelError> {
  match url.scheme() {
    #[cfg(feature = "model_yolov8")]
    YOLOV8_SCHEME => {
      use crate::FromUrl;
      let model = Yolov8Builder::from_url(url)?.build()?;
      Ok(Box::new(model))
    }
    #[cfg(not(feature = "model_yolov8"))]
    YOLOV8_SCHEME => Err(ModelError::BackendDisabled("model_yolov8")),
    other => Err(ModelError::SchemeMismatch(other.to_string())),
  }
}
