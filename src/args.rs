// 该文件是 Kuangqu （框取） 项目的一部分。
// src/args.rs - 命令行参数
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

use std::{io::Read, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use url::Url;

use kuangqu::{config::Settings, geometry::BoundingBox, request::CropRequest};

/// Kuangqu 图像区域裁剪
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 图像地址（http、https 或 file）
  #[arg(value_name = "URL")]
  pub urls: Vec<String>,

  /// 自动检测区域
  #[arg(long)]
  pub detect: bool,

  /// 仅保留窗口形状的区域
  #[arg(long)]
  pub windows_only: bool,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,

  /// 手动指定的边界框，可重复
  #[arg(long = "box", value_name = "X,Y,W,H[,LABEL]", allow_hyphen_values = true)]
  pub boxes: Vec<BoundingBox>,

  /// JSON 请求文件，`-` 表示标准输入
  #[arg(long, value_name = "FILE")]
  pub request: Option<PathBuf>,

  /// 本地副本根目录，覆盖 OUTPUT_DIR
  #[arg(long, value_name = "DIR")]
  pub output_dir: Option<PathBuf>,

  /// 不清理之前的输出
  #[arg(long)]
  pub keep_previous: bool,

  /// 不写本地副本
  #[arg(long)]
  pub no_scratch: bool,

  /// 检测模型，例如 yolov8:///models/yolov8n.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Option<Url>,

  /// 远程图床（imgbb:// 或 cloudinary://），按顺序尝试，可重复
  #[arg(long = "store", value_name = "STORE")]
  pub stores: Vec<Url>,
}

impl Args {
  /// 命令行参数覆盖环境变量
  pub fn apply(&self, settings: &mut Settings) {
    if let Some(dir) = &self.output_dir {
      settings.output_dir = dir.clone();
    }
    if let Some(model) = &self.model {
      settings.model = Some(model.clone());
    }
    if !self.stores.is_empty() {
      settings.stores = self.stores.clone();
    }
  }

  pub fn crop_request(&self) -> Result<CropRequest> {
    let base = match &self.request {
      Some(path) => {
        let body = if path.as_os_str() == "-" {
          let mut body = String::new();
          std::io::stdin()
            .read_to_string(&mut body)
            .context("无法读取标准输入")?;
          body
        } else {
          std::fs::read_to_string(path)
            .with_context(|| format!("无法读取请求文件 {}", path.display()))?
        };
        CropRequest::from_json(&body)?
      }
      None => CropRequest::default(),
    };
    Ok(self.merge(base))
  }

  fn merge(&self, mut request: CropRequest) -> CropRequest {
    if !self.urls.is_empty() {
      request.image_urls = Some(self.urls.clone());
    }
    if !self.boxes.is_empty() {
      request.bounding_boxes = Some(self.boxes.clone());
    }
    request.use_detection |= self.detect;
    request.detect_windows_only |= self.windows_only;
    if let Some(confidence) = self.confidence {
      request.confidence_threshold = confidence;
    }
    if self.keep_previous {
      request.clear_previous = false;
    }
    request
  }
}
