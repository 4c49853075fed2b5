// 该文件是 Kuangqu （框取） 项目的一部分。
// src/input/http_image.rs - HTTP 图像下载
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

use image::RgbImage;
use reqwest::blocking::Client;
use tracing::{debug, error};

use crate::input::{DownloadError, ImageSource, decode_rgb};

pub struct HttpImageSource {
  client: Client,
}

impl HttpImageSource {
  pub const SCHEME_HTTP: &'static str = "http";
  pub const SCHEME_HTTPS: &'static str = "https";

  pub fn new() -> Self {
    Self::with_client(Client::new())
  }

  pub fn with_client(client: Client) -> Self {
    Self { client }
  }
}

impl Default for HttpImageSource {
  fn default() -> Self {
    Self::new()
  }
}

impl ImageSource for HttpImageSource {
  fn download(&self, url: &str, timeout: Duration) -> Result<RgbImage, DownloadError> {
    let into_error = |e: reqwest::Error| {
      if e.is_timeout() {
        DownloadError::Timeout(timeout)
      } else {
        DownloadError::Network(e)
      }
    };

    let response = self
      .client
      .get(url)
      .timeout(timeout)
      .send()
      .map_err(into_error)?;

    let status = response.status();
    if !status.is_success() {
      error!("下载图像失败: {} 返回 {}", url, status);
      return Err(DownloadError::Status(status.as_u16()));
    }

    let bytes = response.bytes().map_err(into_error)?;
    debug!(
      "下载完成: {} ({:.2} KB)",
      url,
      bytes.len() as f64 / 1024.0
    );

    decode_rgb(&bytes)
  }
}
