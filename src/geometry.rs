// 该文件是 Kuangqu （框取） 项目的一部分。
// src/geometry.rs - 边界框几何工具
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

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 轴对齐的矩形区域，坐标以像素为单位，原点在左上角
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
  pub x: i32,
  pub y: i32,
  pub width: i32,
  pub height: i32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub label: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
  #[error("Invalid bounding box: {0}")]
  InvalidGeometry(BoundingBox),
  #[error("Malformed bounding box '{0}', expected x,y,width,height[,label]")]
  Malformed(String),
}

impl BoundingBox {
  pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
    Self {
      x,
      y,
      width,
      height,
      label: None,
    }
  }

  pub fn with_label(mut self, label: impl Into<String>) -> Self {
    self.label = Some(label.into());
    self
  }

  /// 面积；宽或高非正时为 0
  pub fn area(&self) -> i64 {
    if self.width <= 0 || self.height <= 0 {
      return 0;
    }
    self.width as i64 * self.height as i64
  }

  pub fn right(&self) -> i64 {
    self.x as i64 + self.width as i64
  }

  pub fn bottom(&self) -> i64 {
    self.y as i64 + self.height as i64
  }

  /// 宽高比 width / height，高度非正时为 0
  pub fn aspect_ratio(&self) -> f64 {
    if self.height <= 0 {
      return 0.0;
    }
    self.width as f64 / self.height as f64
  }
}

impl fmt::Display for BoundingBox {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "x={} y={} width={} height={}",
      self.x, self.y, self.width, self.height
    )?;
    if let Some(label) = &self.label {
      write!(f, " label={}", label)?;
    }
    Ok(())
  }
}

/// 解析命令行形式 `x,y,width,height[,label]`
impl FromStr for BoundingBox {
  type Err = GeometryError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let malformed = || GeometryError::Malformed(s.to_string());
    let mut parts = s.splitn(5, ',').map(str::trim);

    let mut next_int = || -> Result<i32, GeometryError> {
      parts
        .next()
        .and_then(|v| v.parse::<i32>().ok())
        .ok_or_else(malformed)
    };
    let x = next_int()?;
    let y = next_int()?;
    let width = next_int()?;
    let height = next_int()?;

    let bbox = BoundingBox::new(x, y, width, height);
    match parts.next() {
      Some(label) if !label.is_empty() => Ok(bbox.with_label(label)),
      _ => Ok(bbox),
    }
  }
}

/// 将边界框裁剪到图像范围内。
///
/// 左上角被推到图像内部，右下角保持不变但不超过图像边界，
/// 因此对已裁剪的框再次裁剪结果不变。
pub fn clamp(
  bbox: &BoundingBox,
  image_width: u32,
  image_height: u32,
) -> Result<BoundingBox, GeometryError> {
  let x = (bbox.x as i64).max(0);
  let y = (bbox.y as i64).max(0);
  let right = bbox.right().min(image_width as i64);
  let bottom = bbox.bottom().min(image_height as i64);

  let width = right - x;
  let height = bottom - y;
  if width <= 0 || height <= 0 {
    return Err(GeometryError::InvalidGeometry(bbox.clone()));
  }

  Ok(BoundingBox {
    x: x as i32,
    y: y as i32,
    width: width as i32,
    height: height as i32,
    label: bbox.label.clone(),
  })
}

/// 计算两个边界框的 IoU，结果位于 [0, 1]
pub fn intersection_over_union(a: &BoundingBox, b: &BoundingBox) -> f64 {
  let x1 = (a.x as i64).max(b.x as i64);
  let y1 = (a.y as i64).max(b.y as i64);
  let x2 = a.right().min(b.right());
  let y2 = a.bottom().min(b.bottom());

  if x2 <= x1 || y2 <= y1 {
    return 0.0;
  }

  let intersection = ((x2 - x1) * (y2 - y1)) as f64;
  let union = (a.area() + b.area()) as f64 - intersection;
  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}
