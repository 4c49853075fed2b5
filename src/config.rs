// 该文件是 Kuangqu （框取） 项目的一部分。
// src/config.rs - 环境变量配置
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

use std::{path::PathBuf, time::Duration};

use tracing::{info, warn};
use url::Url;

use crate::{
  detector::{ContourDetector, DetectionOrchestrator, ModelDetector},
  output::{FallbackSink, load_store},
};

pub const DEFAULT_OUTPUT_DIR: &str = "./cropped_images";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
  pub output_dir: PathBuf,
  pub model: Option<Url>,
  /// 按优先级排列的远程图床
  pub stores: Vec<Url>,
  pub download_timeout: Duration,
  pub upload_timeout: Duration,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
      model: None,
      stores: Vec::new(),
      download_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
      upload_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
    }
  }
}

impl Settings {
  pub fn from_env() -> Self {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    let secs = |key: &str| {
      Duration::from_secs(
        var(key)
          .and_then(|s| s.trim().parse().ok())
          .unwrap_or(DEFAULT_TIMEOUT_SECS),
      )
    };

    let model = var("KUANGQU_MODEL").and_then(|s| parse_url("KUANGQU_MODEL", &s));

    let mut stores = Vec::new();
    if let Some(key) = var("IMGBB_API_KEY") {
      match Url::parse_with_params("imgbb://api.imgbb.com/1/upload", &[("key", key)]) {
        Ok(url) => stores.push(url),
        Err(e) => warn!("忽略 IMGBB_API_KEY: {}", e),
      }
    }
    if let Some(url) = cloudinary_url(&var) {
      stores.push(url);
    }

    Self {
      output_dir: var("OUTPUT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
      model,
      stores,
      download_timeout: secs("DOWNLOAD_TIMEOUT_SECS"),
      upload_timeout: secs("UPLOAD_TIMEOUT_SECS"),
    }
  }

  /// 构造存储链；无法创建的图床仅记录警告
  pub fn sink(&self) -> FallbackSink {
    let mut sink = FallbackSink::new();
    for url in &self.stores {
      match load_store(url, self.upload_timeout) {
        Ok(store) => {
          info!("启用图床: {}", store.name());
          sink = sink.with_store(store);
        }
        Err(e) => warn!("忽略图床 {}://: {}", url.scheme(), e),
      }
    }
    sink
  }

  pub fn detector(&self) -> DetectionOrchestrator {
    DetectionOrchestrator::new(
      Box::new(ContourDetector::default()),
      ModelDetector::from_model_url(self.model.as_ref()),
    )
  }
}

/// CLOUDINARY_URL 优先，否则由三个分项拼出
fn cloudinary_url(var: &impl Fn(&str) -> Option<String>) -> Option<Url> {
  if let Some(raw) = var("CLOUDINARY_URL") {
    return parse_url("CLOUDINARY_URL", &raw);
  }

  let cloud_name = var("CLOUDINARY_CLOUD_NAME")?;
  let api_key = var("CLOUDINARY_API_KEY")?;
  let api_secret = var("CLOUDINARY_API_SECRET")?;
  let mut url = parse_url("CLOUDINARY_CLOUD_NAME", &format!("cloudinary://{}", cloud_name))?;
  if url.set_username(&api_key).is_err() || url.set_password(Some(&api_secret)).is_err() {
    warn!("忽略 Cloudinary 凭据: 无法写入 URL");
    return None;
  }
  Some(url)
}

fn parse_url(key: &str, raw: &str) -> Option<Url> {
  match Url::parse(raw.trim()) {
    Ok(url) => Some(url),
    Err(e) => {
      warn!("忽略 {}: {}", key, e);
      None
    }
  }
}
