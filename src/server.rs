// 该文件是 Kuangqu （框取） 项目的一部分。
// src/server.rs - HTTP 服务接口
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

use std::sync::Arc;

use axum::{
  Json, Router,
  extract::State,
  http::StatusCode,
  response::{IntoResponse, Response},
  routing::{get, post},
};
use serde::Serialize;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::{
  config::Settings,
  input::{HttpImageSource, InputWrapper},
  job::{JobError, JobReport, JobRunner},
  request::CropRequest,
};

#[derive(Error, Debug)]
pub enum ApiError {
  #[error(transparent)]
  Job(#[from] JobError),
  #[error("Crop job aborted: {0}")]
  Aborted(#[from] tokio::task::JoinError),
}

impl ApiError {
  fn status_code(&self) -> StatusCode {
    match self {
      ApiError::Job(_) => StatusCode::BAD_REQUEST,
      ApiError::Aborted(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

#[derive(Serialize)]
struct ErrorResponse {
  detail: String,
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status_code();
    if status.is_server_error() {
      error!("{}", self);
    } else {
      warn!("拒绝请求: {}", self);
    }
    let body = ErrorResponse {
      detail: self.to_string(),
    };
    (status, Json(body)).into_response()
  }
}

/// 服务共享状态；下载与上传客户端是阻塞的，每个作业在阻塞线程里单独构造
#[derive(Clone)]
pub struct AppState {
  settings: Arc<Settings>,
  scratch: bool,
}

impl AppState {
  pub fn new(settings: Settings) -> Self {
    Self {
      settings: Arc::new(settings),
      scratch: true,
    }
  }

  pub fn without_scratch(mut self) -> Self {
    self.scratch = false;
    self
  }
}

/// 在当前线程上按配置完整执行一个作业
pub fn run_job(
  settings: &Settings,
  scratch: bool,
  request: CropRequest,
) -> Result<JobReport, JobError> {
  let source = InputWrapper::new(HttpImageSource::new());
  let detector = settings.detector();
  let sink = settings.sink();
  JobRunner::new(&source, &detector, &sink)
    .with_scratch_root(scratch.then(|| settings.output_dir.clone()))
    .with_download_timeout(settings.download_timeout)
    .run_request(request)
}

pub fn create_router(state: AppState) -> Router {
  Router::new()
    .route("/", get(usage))
    .route("/crop-image", post(crop_image))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

async fn crop_image(
  State(state): State<AppState>,
  body: String,
) -> Result<Json<JobReport>, ApiError> {
  let request = CropRequest::from_json(&body).map_err(JobError::from)?;
  let report = tokio::task::spawn_blocking(move || {
    run_job(&state.settings, state.scratch, request)
  })
  .await??;
  Ok(Json(report))
}

async fn usage() -> Json<serde_json::Value> {
  Json(serde_json::json!({
    "message": "Kuangqu image region cropping API",
    "version": env!("CARGO_PKG_VERSION"),
    "endpoints": {
      "POST /crop-image": "Crop bounding boxes from one or more image URLs. Supports single image_url or multiple image_urls."
    },
    "usage": {
      "single_image": {
        "image_url": "https://example.com/image.jpg",
        "use_detection": true,
        "detect_windows_only": true
      },
      "multiple_images": {
        "image_urls": [
          "https://example.com/image1.jpg",
          "https://example.com/image2.jpg"
        ],
        "use_detection": true,
        "detect_windows_only": true
      }
    }
  }))
}
