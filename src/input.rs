// 该文件是 Kuangqu （框取） 项目的一部分。
// src/input.rs - 图像输入
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
use thiserror::Error;
use tracing::debug;
use url::Url;

mod http_image;
mod read_image_file;

pub use self::http_image::HttpImageSource;
pub use self::read_image_file::ImageFileSource;

/// 获取并解码一张图像，统一转换为 RGB
pub trait ImageSource {
  fn download(&self, url: &str, timeout: Duration) -> Result<RgbImage, DownloadError>;
}

#[derive(Error, Debug)]
pub enum DownloadError {
  #[error("invalid image URL: {0}")]
  InvalidUrl(#[from] url::ParseError),
  #[error("unsupported URL scheme '{0}'")]
  SchemeMismatch(String),
  #[error("request timed out after {0:?}")]
  Timeout(Duration),
  #[error("network error: {0}")]
  Network(#[from] reqwest::Error),
  #[error("server responded with status {0}")]
  Status(u16),
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("cannot decode image: {0}")]
  Decode(#[from] image::ImageError),
}

/// 按 URL 方案分派到 HTTP 或本地文件输入
pub struct InputWrapper {
  http: HttpImageSource,
  file: ImageFileSource,
}

impl InputWrapper {
  pub fn new(http: HttpImageSource) -> Self {
    Self {
      http,
      file: ImageFileSource,
    }
  }
}

impl ImageSource for InputWrapper {
  fn download(&self, url: &str, timeout: Duration) -> Result<RgbImage, DownloadError> {
    let parsed = Url::parse(url)?;
    debug!("读取图像: {} ({})", url, parsed.scheme());
    match parsed.scheme() {
      HttpImageSource::SCHEME_HTTP | HttpImageSource::SCHEME_HTTPS => {
        self.http.download(url, timeout)
      }
      ImageFileSource::SCHEME => self.file.download(url, timeout),
      other => Err(DownloadError::SchemeMismatch(other.to_string())),
    }
  }
}

/// 解码内存中的图像数据
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, DownloadError> {
  Ok(image::load_from_memory(bytes)?.to_rgb8())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_unknown_scheme() {
    let input = InputWrapper::new(HttpImageSource::new());
    let err = input
      .download("ftp://example.com/a.jpg", Duration::from_secs(1))
      .unwrap_err();
    assert!(matches!(err, DownloadError::SchemeMismatch(s) if s == "ftp"));
  }

  #[test]
  fn rejects_relative_url() {
    let input = InputWrapper::new(HttpImageSource::new());
    assert!(matches!(
      input.download("images/a.jpg", Duration::from_secs(1)),
      Err(DownloadError::InvalidUrl(_))
    ));
  }

  #[test]
  fn decode_rejects_garbage() {
    assert!(matches!(
      decode_rgb(b"definitely not an image"),
      Err(DownloadError::Decode(_))
    ));
  }
}
