// 该文件是 Kuangqu （框取） 项目的一部分。
// src/output/imgbb.rs - ImgBB 图床上传
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

use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{RemoteStore, UploadError},
};

const IMGBB_DEFAULT_ENDPOINT: &str = "https://api.imgbb.com/1/upload";
const IMGBB_DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ImgbbStore {
  client: Client,
  endpoint: String,
  api_key: String,
  timeout: Duration,
}

#[derive(Deserialize)]
struct ImgbbResponse {
  #[serde(default)]
  success: bool,
  data: Option<ImgbbData>,
}

#[derive(Deserialize)]
struct ImgbbData {
  url: String,
}

impl FromUrlWithScheme for ImgbbStore {
  const SCHEME: &'static str = "imgbb";
}

/// `imgbb://api.imgbb.com/1/upload?key=<API_KEY>`
impl FromUrl for ImgbbStore {
  type Error = UploadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(UploadError::SchemeMismatch(url.scheme().to_string()));
    }

    let api_key = url
      .query_pairs()
      .find(|(k, _)| k == "key")
      .map(|(_, v)| v.into_owned())
      .filter(|v| !v.is_empty())
      .ok_or_else(|| UploadError::Config("ImgBB 缺少 key 参数".to_string()))?;

    let mut store = Self::new(api_key, IMGBB_DEFAULT_TIMEOUT);
    if let Some(host) = url.host_str() {
      store.endpoint = format!("https://{}{}", host, url.path());
    }
    Ok(store)
  }
}

impl ImgbbStore {
  pub fn new(api_key: impl Into<String>, timeout: Duration) -> Self {
    Self {
      client: Client::new(),
      endpoint: IMGBB_DEFAULT_ENDPOINT.to_string(),
      api_key: api_key.into(),
      timeout,
    }
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }
}

impl RemoteStore for ImgbbStore {
  fn name(&self) -> &str {
    "imgbb"
  }

  fn upload(&self, bytes: &[u8], filename: &str) -> Result<String, UploadError> {
    let encoded = STANDARD.encode(bytes);
    let response = self
      .client
      .post(&self.endpoint)
      .timeout(self.timeout)
      .form(&[
        ("key", self.api_key.as_str()),
        ("image", encoded.as_str()),
        ("name", filename),
      ])
      .send()?;

    let status = response.status();
    if !status.is_success() {
      return Err(UploadError::Status(status.as_u16()));
    }

    let body: ImgbbResponse = response.json()?;
    debug!("ImgBB 响应 success={}", body.success);
    match body.data {
      Some(data) if body.success => Ok(data.url),
      _ => Err(UploadError::Rejected("ImgBB success=false".to_string())),
    }
  }
}
