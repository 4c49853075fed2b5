// 该文件是 Kuangqu （框取） 项目的一部分。
// src/output/cloudinary.rs - Cloudinary 签名上传
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

use std::time::Duration;

use reqwest::blocking::{
  Client,
  multipart::{Form, Part},
};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{RemoteStore, UploadError},
};

const CLOUDINARY_API: &str = "https://api.cloudinary.com/v1_1";
const CLOUDINARY_FOLDER: &str = "cropped-images";
const CLOUDINARY_DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudinaryCredentials {
  pub cloud_name: String,
  pub api_key: String,
  pub api_secret: String,
}

pub struct CloudinaryStore {
  client: Client,
  credentials: CloudinaryCredentials,
  timeout: Duration,
}

#[derive(Deserialize)]
struct UploadResponse {
  secure_url: Option<String>,
  error: Option<UploadFailure>,
}

#[derive(Deserialize)]
struct UploadFailure {
  message: String,
}

impl FromUrlWithScheme for CloudinaryStore {
  const SCHEME: &'static str = "cloudinary";
}

impl FromUrl for CloudinaryStore {
  type Error = UploadError;

  /// `cloudinary://<api_key>:<api_secret>@<cloud_name>`，即 CLOUDINARY_URL 的格式
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(UploadError::SchemeMismatch(url.scheme().to_string()));
    }

    let cloud_name = url.host_str().unwrap_or_default();
    let api_key = url.username();
    let api_secret = url.password().unwrap_or_default();
    if cloud_name.is_empty() || api_key.is_empty() || api_secret.is_empty() {
      return Err(UploadError::Config(
        "CLOUDINARY_URL 需要 api_key、api_secret 与 cloud_name".to_string(),
      ));
    }

    Ok(Self::new(
      CloudinaryCredentials {
        cloud_name: cloud_name.to_string(),
        api_key: api_key.to_string(),
        api_secret: api_secret.to_string(),
      },
      CLOUDINARY_DEFAULT_TIMEOUT,
    ))
  }
}

impl CloudinaryStore {
  pub fn new(credentials: CloudinaryCredentials, timeout: Duration) -> Self {
    Self {
      client: Client::new(),
      credentials,
      timeout,
    }
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn credentials(&self) -> &CloudinaryCredentials {
    &self.credentials
  }
}

/// 参数按名称排序后拼接，再追加 api_secret 做 SHA-1
fn sign(params: &[(&str, &str)], api_secret: &str) -> String {
  let mut sorted = params.to_vec();
  sorted.sort_by(|a, b| a.0.cmp(b.0));
  let joined = sorted
    .iter()
    .map(|(k, v)| format!("{}={}", k, v))
    .collect::<Vec<_>>()
    .join("&");

  Sha1::digest(format!("{}{}", joined, api_secret).as_bytes())
    .iter()
    .map(|b| format!("{:02x}", b))
    .collect()
}

impl RemoteStore for CloudinaryStore {
  fn name(&self) -> &str {
    "cloudinary"
  }

  fn upload(&self, bytes: &[u8], filename: &str) -> Result<String, UploadError> {
    let public_id = filename.strip_suffix(".jpg").unwrap_or(filename);
    let timestamp = chrono::Utc::now().timestamp().to_string();
    let signature = sign(
      &[
        ("folder", CLOUDINARY_FOLDER),
        ("public_id", public_id),
        ("timestamp", &timestamp),
      ],
      &self.credentials.api_secret,
    );

    let file = Part::bytes(bytes.to_vec())
      .file_name(filename.to_string())
      .mime_str("image/jpeg")?;
    let form = Form::new()
      .part("file", file)
      .text("api_key", self.credentials.api_key.clone())
      .text("timestamp", timestamp)
      .text("folder", CLOUDINARY_FOLDER)
      .text("public_id", public_id.to_string())
      .text("signature", signature);

    let endpoint = format!(
      "{}/{}/image/upload",
      CLOUDINARY_API, self.credentials.cloud_name
    );
    let response = self
      .client
      .post(endpoint)
      .timeout(self.timeout)
      .multipart(form)
      .send()?;

    let status = response.status();
    let body: UploadResponse = response.json()?;
    match (body.secure_url, body.error) {
      (Some(url), _) if status.is_success() => Ok(url),
      (_, Some(failure)) => Err(UploadError::Rejected(failure.message)),
      _ => Err(UploadError::Status(status.as_u16())),
    }
  }
}
