// 该文件是 Kuangqu （框取） 项目的一部分。
// src/output.rs - 裁剪结果的存储与引用
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
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

mod cloudinary;
mod imgbb;
pub mod scratch;

pub use self::cloudinary::{CloudinaryCredentials, CloudinaryStore};
pub use self::imgbb::ImgbbStore;
pub use self::scratch::{JobScratch, ScratchError, clear_previous};

/// 远程图床，可能失败
pub trait RemoteStore {
  fn name(&self) -> &str;
  fn upload(&self, bytes: &[u8], filename: &str) -> Result<String, UploadError>;
}

/// 产物存储：总是返回一个可用的引用
pub trait ArtifactSink {
  fn store(&self, bytes: &[u8], filename: &str) -> String;
}

#[derive(Error, Debug)]
pub enum UploadError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("存储配置错误: {0}")]
  Config(String),
  #[error("网络错误: {0}")]
  Network(#[from] reqwest::Error),
  #[error("服务端返回状态 {0}")]
  Status(u16),
  #[error("服务端拒绝上传: {0}")]
  Rejected(String),
}

/// 以 `data:` URL 内联图像数据
pub fn inline_data_url(bytes: &[u8]) -> String {
  format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes))
}

/// 依次尝试远程图床，全部失败时退回内联数据
#[derive(Default)]
pub struct FallbackSink {
  stores: Vec<Box<dyn RemoteStore>>,
}

impl FallbackSink {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_store(mut self, store: Box<dyn RemoteStore>) -> Self {
    self.stores.push(store);
    self
  }

  pub fn len(&self) -> usize {
    self.stores.len()
  }

  pub fn is_empty(&self) -> bool {
    self.stores.is_empty()
  }
}

impl ArtifactSink for FallbackSink {
  fn store(&self, bytes: &[u8], filename: &str) -> String {
    for store in &self.stores {
      match store.upload(bytes, filename) {
        Ok(url) => {
          info!("已上传 {} 到 {}", filename, store.name());
          return url;
        }
        Err(e) => warn!("上传 {} 到 {} 失败: {}", filename, store.name(), e),
      }
    }

    debug!("{} 使用内联数据引用", filename);
    inline_data_url(bytes)
  }
}

/// 根据 URL 方案创建远程图床
pub fn load_store(url: &Url, timeout: Duration) -> Result<Box<dyn RemoteStore>, UploadError> {
  match url.scheme() {
    ImgbbStore::SCHEME => Ok(Box::new(ImgbbStore::from_url(url)?.with_timeout(timeout))),
    CloudinaryStore::SCHEME => Ok(Box::new(
      CloudinaryStore::from_url(url)?.with_timeout(timeout),
    )),
    other => Err(UploadError::SchemeMismatch(other.to_string())),
  }
}
