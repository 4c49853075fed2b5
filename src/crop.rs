// 该文件是 Kuangqu （框取） 项目的一部分。
// src/crop.rs - 单张图像的批量裁剪
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

use image::{RgbImage, codecs::jpeg::JpegEncoder, imageops};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  detector::WINDOW_LABEL,
  geometry::{BoundingBox, GeometryError, clamp},
  output::{ArtifactSink, JobScratch},
};

pub const JPEG_QUALITY: u8 = 95;

#[derive(Error, Debug)]
pub enum CropError {
  #[error("No bounding boxes available for image {image}")]
  NoBoxes { image: usize },
  #[error("Failed to crop box {position} from image {image}: {source}")]
  Geometry {
    position: usize,
    image: usize,
    #[source]
    source: GeometryError,
  },
  #[error("Failed to crop box {position} from image {image}: {source}")]
  Encode {
    position: usize,
    image: usize,
    #[source]
    source: image::ImageError,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
  pub width: u32,
  pub height: u32,
}

/// 一个裁剪产物；编码后的字节交给存储后即不再保留
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CropArtifact {
  pub url: String,
  pub path: Option<String>,
  pub filename: String,
  pub label: String,
  pub source_image: String,
  /// 从 1 开始
  pub image_index: usize,
  pub dimensions: Dimensions,
  /// 实际使用的（裁剪到图像范围后的）框
  pub bbox: BoundingBox,
}

#[derive(Debug, Default)]
pub struct BatchReport {
  pub saved: Vec<CropArtifact>,
  pub errors: Vec<String>,
}

impl BatchReport {
  pub fn error(message: impl ToString) -> Self {
    Self {
      saved: Vec::new(),
      errors: vec![message.to_string()],
    }
  }
}

#[derive(Debug, Clone, Copy)]
pub struct CropContext<'a> {
  pub source_url: &'a str,
  /// 从 0 开始
  pub image_index: usize,
  pub multi_image: bool,
  pub windows_only: bool,
}

/// 仅保留字母数字、`-` 与 `_`
pub fn sanitize_label(label: &str) -> String {
  label
    .chars()
    .map(|c| {
      if c.is_alphanumeric() || c == '-' || c == '_' {
        c
      } else {
        '_'
      }
    })
    .collect()
}

pub fn crop_filename(context: &CropContext, position: usize, label: &str) -> String {
  if context.multi_image {
    format!(
      "img{}_{:03}_{}.jpg",
      context.image_index + 1,
      position,
      sanitize_label(label)
    )
  } else {
    format!("{:03}_{}.jpg", position, sanitize_label(label))
  }
}

/// 命名规则：带 window 标签的框或仅窗口模式下按顺序编号为 `window_<n>`
struct Labeler {
  windows_only: bool,
  window_count: usize,
}

impl Labeler {
  fn label(&mut self, bbox: &BoundingBox, position: usize) -> String {
    let label = bbox
      .label
      .clone()
      .filter(|label| !label.trim().is_empty())
      .unwrap_or_else(|| format!("crop_{}", position));

    if self.windows_only || label.to_lowercase().contains(WINDOW_LABEL) {
      self.window_count += 1;
      format!("{}_{}", WINDOW_LABEL, self.window_count)
    } else {
      label
    }
  }
}

pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, image::ImageError> {
  let mut bytes = Vec::new();
  JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY).encode_image(image)?;
  Ok(bytes)
}

pub struct CropBatch<'a> {
  sink: &'a dyn ArtifactSink,
  scratch: Option<&'a JobScratch>,
}

impl<'a> CropBatch<'a> {
  pub fn new(sink: &'a dyn ArtifactSink) -> Self {
    Self {
      sink,
      scratch: None,
    }
  }

  pub fn with_scratch(mut self, scratch: Option<&'a JobScratch>) -> Self {
    self.scratch = scratch;
    self
  }

  /// 依次裁剪每个框；单个框失败只记录错误，不中断整批
  pub fn process(
    &self,
    image: &RgbImage,
    boxes: &[BoundingBox],
    context: &CropContext,
  ) -> BatchReport {
    let image_number = context.image_index + 1;
    if boxes.is_empty() {
      return BatchReport::error(CropError::NoBoxes {
        image: image_number,
      });
    }

    let mut report = BatchReport::default();
    let mut labeler = Labeler {
      windows_only: context.windows_only,
      window_count: 0,
    };

    for (idx, bbox) in boxes.iter().enumerate() {
      let position = idx + 1;
      match self.crop_one(image, bbox, position, context, &mut labeler) {
        Ok(artifact) => report.saved.push(artifact),
        Err(e) => {
          warn!("{}", e);
          report.errors.push(e.to_string());
        }
      }
    }

    debug!(
      "图像 {}: 保存 {} 个裁剪，{} 个错误",
      image_number,
      report.saved.len(),
      report.errors.len()
    );
    report
  }

  fn crop_one(
    &self,
    image: &RgbImage,
    bbox: &BoundingBox,
    position: usize,
    context: &CropContext,
    labeler: &mut Labeler,
  ) -> Result<CropArtifact, CropError> {
    let image_number = context.image_index + 1;
    let (width, height) = image.dimensions();
    let clamped = clamp(bbox, width, height).map_err(|source| CropError::Geometry {
      position,
      image: image_number,
      source,
    })?;

    let cropped = imageops::crop_imm(
      image,
      clamped.x as u32,
      clamped.y as u32,
      clamped.width as u32,
      clamped.height as u32,
    )
    .to_image();

    let label = labeler.label(bbox, position);
    let filename = crop_filename(context, position, &label);
    let bytes = encode_jpeg(&cropped).map_err(|source| CropError::Encode {
      position,
      image: image_number,
      source,
    })?;

    let url = self.sink.store(&bytes, &filename);
    let path = self
      .scratch
      .and_then(|scratch| scratch.write(&filename, &bytes))
      .map(|path| path.display().to_string());

    Ok(CropArtifact {
      url,
      path,
      filename,
      label,
      source_image: context.source_url.to_string(),
      image_index: image_number,
      dimensions: Dimensions {
        width: cropped.width(),
        height: cropped.height(),
      },
      bbox: BoundingBox::new(clamped.x, clamped.y, clamped.width, clamped.height),
    })
  }
}
