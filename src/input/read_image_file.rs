// 该文件是 Kuangqu （框取） 项目的一部分。
// src/input/read_image_file.rs - 本地图像文件输入
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

use image::{ImageReader, RgbImage};
use tracing::error;
use url::Url;

use crate::input::{DownloadError, ImageSource};

/// `file:///path/to/image.jpg`，超时参数对本地文件无效
pub struct ImageFileSource;

impl ImageFileSource {
  pub const SCHEME: &'static str = "file";
}

impl ImageSource for ImageFileSource {
  fn download(&self, url: &str, _timeout: Duration) -> Result<RgbImage, DownloadError> {
    let url = Url::parse(url)?;
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(DownloadError::SchemeMismatch(url.scheme().to_string()));
    }

    let path = url
      .to_file_path()
      .map_err(|_| DownloadError::SchemeMismatch(url.to_string()))?;
    let image = ImageReader::open(&path)?.with_guessed_format()?.decode()?;

    Ok(image.to_rgb8())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reads_png_from_file_url() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tiny.png");
    RgbImage::from_pixel(7, 5, image::Rgb([1, 2, 3])).save(&path).unwrap();

    let url = Url::from_file_path(&path).unwrap();
    let image = ImageFileSource
      .download(url.as_str(), Duration::from_secs(1))
      .unwrap();
    assert_eq!(image.dimensions(), (7, 5));
    assert_eq!(image.get_pixel(3, 3).0, [1, 2, 3]);
  }

  #[test]
  fn missing_file_is_io_error() {
    let err = ImageFileSource
      .download("file:///definitely/not/here.png", Duration::from_secs(1))
      .unwrap_err();
    assert!(matches!(err, DownloadError::Io(_)));
  }
}
