// 该文件是 Kuangqu （框取） 项目的一部分。
// src/request.rs - 裁剪请求与校验
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

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::geometry::BoundingBox;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug)]
pub enum RequestError {
  #[error("Either image_url or image_urls must be provided")]
  MissingImageUrl,
  #[error("Invalid image URL '{url}': {source}")]
  InvalidImageUrl {
    url: String,
    #[source]
    source: url::ParseError,
  },
  #[error("confidence_threshold must be within [0, 1], got {0}")]
  InvalidConfidence(f32),
  #[error("Malformed request: {0}")]
  Parse(#[from] serde_json::Error),
}

/// 请求体，`image_urls` 非空时优先于 `image_url`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropRequest {
  pub image_url: Option<String>,
  pub image_urls: Option<Vec<String>>,
  pub bounding_boxes: Option<Vec<BoundingBox>>,
  pub use_detection: bool,
  pub detect_windows_only: bool,
  pub confidence_threshold: f32,
  pub clear_previous: bool,
}

impl Default for CropRequest {
  fn default() -> Self {
    Self {
      image_url: None,
      image_urls: None,
      bounding_boxes: None,
      use_detection: false,
      detect_windows_only: false,
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      clear_previous: true,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CropOptions {
  pub detect: bool,
  pub windows_only: bool,
  pub confidence_threshold: f32,
  /// 作业中的每张图像都使用同一组框
  pub explicit_boxes: Vec<BoundingBox>,
}

impl Default for CropOptions {
  fn default() -> Self {
    Self {
      detect: false,
      windows_only: false,
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      explicit_boxes: Vec::new(),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
  pub image_urls: Vec<String>,
  pub options: CropOptions,
  pub clear_previous: bool,
}

impl CropRequest {
  pub fn from_json(body: &str) -> Result<Self, RequestError> {
    Ok(serde_json::from_str(body)?)
  }

  pub fn image_urls(&self) -> Vec<String> {
    match (&self.image_urls, &self.image_url) {
      (Some(urls), _) if !urls.is_empty() => urls.clone(),
      (_, Some(url)) => vec![url.clone()],
      _ => Vec::new(),
    }
  }

  /// 结构性错误直接拒绝整个请求；非正宽高的框留到裁剪时逐框报错
  pub fn validate(self) -> Result<JobRequest, RequestError> {
    let image_urls = self.image_urls();
    if image_urls.is_empty() {
      return Err(RequestError::MissingImageUrl);
    }
    for url in &image_urls {
      Url::parse(url).map_err(|source| RequestError::InvalidImageUrl {
        url: url.clone(),
        source,
      })?;
    }

    if !(0.0..=1.0).contains(&self.confidence_threshold) {
      return Err(RequestError::InvalidConfidence(self.confidence_threshold));
    }

    Ok(JobRequest {
      image_urls,
      options: CropOptions {
        detect: self.use_detection,
        windows_only: self.detect_windows_only,
        confidence_threshold: self.confidence_threshold,
        explicit_boxes: self.bounding_boxes.unwrap_or_default(),
      },
      clear_previous: self.clear_previous,
    })
  }
}

impl TryFrom<CropRequest> for JobRequest {
  type Error = RequestError;

  fn try_from(request: CropRequest) -> Result<Self, Self::Error> {
    request.validate()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_wire_format() {
    let request = CropRequest::from_json(r#"{"image_url": "https://example.com/a.jpg"}"#).unwrap();
    assert!(!request.use_detection);
    assert!(!request.detect_windows_only);
    assert!(request.clear_previous);
    assert_eq!(request.confidence_threshold, 0.5);

    let job = request.validate().unwrap();
    assert_eq!(job.image_urls, ["https://example.com/a.jpg"]);
    assert!(job.options.explicit_boxes.is_empty());
  }

  #[test]
  fn image_urls_take_precedence() {
    let request = CropRequest::from_json(
      r#"{
        "image_url": "https://example.com/single.jpg",
        "image_urls": ["https://example.com/1.jpg", "https://example.com/2.jpg"],
        "use_detection": true,
        "detect_windows_only": true,
        "confidence_threshold": 0.3,
        "clear_previous": false
      }"#,
    )
    .unwrap();

    let job = JobRequest::try_from(request).unwrap();
    assert_eq!(
      job.image_urls,
      ["https://example.com/1.jpg", "https://example.com/2.jpg"]
    );
    assert!(job.options.detect);
    assert!(job.options.windows_only);
    assert_eq!(job.options.confidence_threshold, 0.3);
    assert!(!job.clear_previous);
  }

  #[test]
  fn empty_image_urls_falls_back_to_single() {
    let request = CropRequest {
      image_url: Some("https://example.com/a.jpg".to_string()),
      image_urls: Some(Vec::new()),
      ..CropRequest::default()
    };
    assert_eq!(request.image_urls(), ["https://example.com/a.jpg"]);
  }

  #[test]
  fn parses_bounding_boxes() {
    let request = CropRequest::from_json(
      r#"{
        "image_url": "https://example.com/a.jpg",
        "bounding_boxes": [
          {"x": 100, "y": 100, "width": 200, "height": 200, "label": "object1"},
          {"x": 0, "y": 0, "width": 0, "height": 5}
        ]
      }"#,
    )
    .unwrap();

    let job = request.validate().unwrap();
    assert_eq!(
      job.options.explicit_boxes,
      [
        BoundingBox::new(100, 100, 200, 200).with_label("object1"),
        BoundingBox::new(0, 0, 0, 5),
      ]
    );
  }

  #[test]
  fn rejects_structurally_invalid_requests() {
    assert!(matches!(
      CropRequest::default().validate(),
      Err(RequestError::MissingImageUrl)
    ));

    let relative = CropRequest {
      image_url: Some("images/a.jpg".to_string()),
      ..CropRequest::default()
    };
    assert!(matches!(
      relative.validate(),
      Err(RequestError::InvalidImageUrl { .. })
    ));

    let confidence = CropRequest {
      image_url: Some("https://example.com/a.jpg".to_string()),
      confidence_threshold: 1.5,
      ..CropRequest::default()
    };
    assert!(matches!(
      confidence.validate(),
      Err(RequestError::InvalidConfidence(_))
    ));

    assert!(matches!(
      CropRequest::from_json("{\"image_url\": 3}"),
      Err(RequestError::Parse(_))
    ));
  }
}
