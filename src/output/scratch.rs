// 该文件是 Kuangqu （框取） 项目的一部分。
// src/output/scratch.rs - 本地临时目录副本
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

use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ScratchError {
  #[error("无法创建临时目录 {path}: {source}")]
  Create {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// 单个作业的临时目录：`<root>/<YYYYmmdd_HHMMSS>_<job_id>/`
#[derive(Debug, Clone)]
pub struct JobScratch {
  directory: PathBuf,
}

impl JobScratch {
  pub fn create(root: &Path, job_id: &str) -> Result<Self, ScratchError> {
    let name = format!("{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), job_id);
    let directory = root.join(name);
    std::fs::create_dir_all(&directory).map_err(|source| ScratchError::Create {
      path: directory.clone(),
      source,
    })?;
    debug!("临时目录: {}", directory.display());
    Ok(Self { directory })
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  /// 写入失败不影响作业，仅记录警告
  pub fn write(&self, filename: &str, bytes: &[u8]) -> Option<PathBuf> {
    let path = self.directory.join(filename);
    match std::fs::write(&path, bytes) {
      Ok(()) => Some(path),
      Err(e) => {
        warn!("写入临时文件 {} 失败: {}", path.display(), e);
        None
      }
    }
  }
}

/// 清空根目录下的内容，返回删除的条目数；任何失败仅记录警告
pub fn clear_previous(root: &Path) -> usize {
  let entries = match std::fs::read_dir(root) {
    Ok(entries) => entries,
    Err(e) => {
      debug!("跳过清理 {}: {}", root.display(), e);
      return 0;
    }
  };

  let mut removed = 0;
  for entry in entries.flatten() {
    let path = entry.path();
    let result = if path.is_dir() {
      std::fs::remove_dir_all(&path)
    } else {
      std::fs::remove_file(&path)
    };
    match result {
      Ok(()) => removed += 1,
      Err(e) => warn!("无法删除 {}: {}", path.display(), e),
    }
  }

  if removed > 0 {
    info!("已清理 {} 个旧条目于 {}", removed, root.display());
  }
  removed
}
