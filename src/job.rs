// 该文件是 Kuangqu （框取） 项目的一部分。
// src/job.rs - 多图像作业编排与结果汇总
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

use std::{
  path::{Path, PathBuf},
  time::{Duration, Instant},
};

use image::RgbImage;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
  crop::{BatchReport, CropArtifact, CropBatch, CropContext},
  detector::{DetectError, DetectOptions, DetectionOrchestrator},
  geometry::BoundingBox,
  input::ImageSource,
  output::{ArtifactSink, JobScratch, clear_previous},
  request::{CropOptions, CropRequest, JobRequest, RequestError},
};

pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// 整个请求级别的错误，出现时不返回任何部分结果
#[derive(Error, Debug)]
pub enum JobError {
  #[error(transparent)]
  Request(#[from] RequestError),
  #[error("Either image_url or image_urls must be provided")]
  NoImages,
}

/// 单张图像的检测失败，记入报告后作业继续
#[derive(Error, Debug)]
pub enum ImageDetectError {
  #[error("No objects detected in image {image}{}", windows_suffix(.windows_only))]
  NothingDetected { image: usize, windows_only: bool },
  #[error("Detection failed for image {image}: {source}")]
  Failed {
    image: usize,
    #[source]
    source: DetectError,
  },
}

fn windows_suffix(windows_only: &bool) -> &'static str {
  if *windows_only { " (no windows found)" } else { "" }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
  pub status: &'static str,
  pub job_id: String,
  pub output_dir: Option<String>,
  pub images_processed: usize,
  pub saved_count: usize,
  pub saved_files: Vec<CropArtifact>,
  pub errors: Vec<String>,
}

pub fn new_job_id() -> String {
  uuid::Uuid::new_v4().simple().to_string()
}

pub struct JobRunner<'a> {
  source: &'a dyn ImageSource,
  detector: &'a DetectionOrchestrator,
  sink: &'a dyn ArtifactSink,
  scratch_root: Option<PathBuf>,
  download_timeout: Duration,
}

impl<'a> JobRunner<'a> {
  pub fn new(
    source: &'a dyn ImageSource,
    detector: &'a DetectionOrchestrator,
    sink: &'a dyn ArtifactSink,
  ) -> Self {
    Self {
      source,
      detector,
      sink,
      scratch_root: None,
      download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
    }
  }

  pub fn with_scratch_root(mut self, root: Option<PathBuf>) -> Self {
    self.scratch_root = root;
    self
  }

  pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
    self.download_timeout = timeout;
    self
  }

  pub fn run_request(&self, request: CropRequest) -> Result<JobReport, JobError> {
    let request = request.validate()?;
    self.run(&request)
  }

  /// 按顺序处理每张图像；单张图像失败只记录错误，作业总会完成
  pub fn run(&self, request: &JobRequest) -> Result<JobReport, JobError> {
    if request.image_urls.is_empty() {
      return Err(JobError::NoImages);
    }

    let job_id = new_job_id();
    info!("开始作业 {}，共 {} 张图像", job_id, request.image_urls.len());

    if request.clear_previous {
      if let Some(root) = &self.scratch_root {
        clear_previous(root);
      }
    }
    let scratch = self
      .scratch_root
      .as_deref()
      .and_then(|root| open_scratch(root, &job_id));
    let batch = CropBatch::new(self.sink).with_scratch(scratch.as_ref());

    let now = Instant::now();
    let multi_image = request.image_urls.len() > 1;
    let mut saved_files = Vec::new();
    let mut errors = Vec::new();
    for (index, url) in request.image_urls.iter().enumerate() {
      let context = CropContext {
        source_url: url,
        image_index: index,
        multi_image,
        windows_only: request.options.windows_only,
      };
      let report = self.process_image(&batch, &request.options, &context);
      saved_files.extend(report.saved);
      errors.extend(report.errors);
    }
    info!(
      "作业 {} 完成，保存 {} 个裁剪，{} 个错误，耗时: {:.2?}",
      job_id,
      saved_files.len(),
      errors.len(),
      now.elapsed()
    );

    Ok(JobReport {
      status: "success",
      job_id,
      output_dir: scratch.map(|s| s.directory().display().to_string()),
      images_processed: request.image_urls.len(),
      saved_count: saved_files.len(),
      saved_files,
      errors,
    })
  }

  fn process_image(
    &self,
    batch: &CropBatch,
    options: &CropOptions,
    context: &CropContext,
  ) -> BatchReport {
    let number = context.image_index + 1;
    let image = match self.source.download(context.source_url, self.download_timeout) {
      Ok(image) => image,
      Err(e) => {
        warn!("下载图像 {} 失败: {}", number, e);
        return BatchReport::error(format!(
          "Failed to download image {} ({}): {}",
          number, context.source_url, e
        ));
      }
    };
    info!(
      "图像 {} 已读取: {}x{}",
      number,
      image.width(),
      image.height()
    );

    if !options.detect {
      return batch.process(&image, &options.explicit_boxes, context);
    }

    match self.detect(&image, options, number) {
      Ok(boxes) => batch.process(&image, &boxes, context),
      Err(e) if options.explicit_boxes.is_empty() => BatchReport::error(e),
      Err(e) => {
        info!("图像 {} 回退到请求中的边界框", number);
        let mut report = batch.process(&image, &options.explicit_boxes, context);
        report.errors.insert(0, e.to_string());
        report
      }
    }
  }

  /// 检测成功但为空时返回错误信息；检测器缺失时退回请求中的框
  fn detect(
    &self,
    image: &RgbImage,
    options: &CropOptions,
    number: usize,
  ) -> Result<Vec<BoundingBox>, ImageDetectError> {
    let detect_options = DetectOptions {
      windows_only: options.windows_only,
      confidence_threshold: options.confidence_threshold,
    };

    let now = Instant::now();
    match self.detector.detect(image, &detect_options) {
      Ok(detection) if detection.boxes.is_empty() => {
        info!("图像 {} 未检测到目标", number);
        Err(ImageDetectError::NothingDetected {
          image: number,
          windows_only: options.windows_only,
        })
      }
      Ok(detection) => {
        info!(
          "图像 {} 检测到 {} 个区域 ({:?})，耗时: {:.2?}",
          number,
          detection.boxes.len(),
          detection.strategy,
          now.elapsed()
        );
        Ok(detection.boxes)
      }
      Err(DetectError::DetectorUnavailable) => {
        warn!("图像 {}: 检测能力不可用", number);
        Ok(options.explicit_boxes.clone())
      }
      Err(e) => {
        warn!("图像 {} 检测失败: {}", number, e);
        Err(ImageDetectError::Failed {
          image: number,
          source: e,
        })
      }
    }
  }
}

fn open_scratch(root: &Path, job_id: &str) -> Option<JobScratch> {
  match JobScratch::create(root, job_id) {
    Ok(scratch) => Some(scratch),
    Err(e) => {
      warn!("不使用本地副本: {}", e);
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{cell::Cell, collections::HashMap, rc::Rc};

  use super::*;
  use crate::{
    crop::tests::RecordingSink,
    detector::{
      ModelDetector,
      tests::{CountingModel, FixedProposer, item},
    },
    input::DownloadError,
    model::{DetectResult, Model, ModelError},
  };

  struct MapSource {
    images: HashMap<&'static str, RgbImage>,
  }

  impl ImageSource for MapSource {
    fn download(&self, url: &str, timeout: Duration) -> Result<RgbImage, DownloadError> {
      self
        .images
        .get(url)
        .cloned()
        .ok_or(DownloadError::Timeout(timeout))
    }
  }

  struct FailingModel;

  impl Model for FailingModel {
    fn infer(&self, _image: &RgbImage, _confidence: f32) -> Result<DetectResult, ModelError> {
      Err(ModelError::Inference("tensor shape mismatch".to_string()))
    }
  }

  fn source(urls: &[&'static str]) -> MapSource {
    MapSource {
      images: urls
        .iter()
        .map(|url| (*url, RgbImage::from_pixel(100, 80, image::Rgb([200, 10, 10]))))
        .collect(),
    }
  }

  fn no_capabilities() -> DetectionOrchestrator {
    DetectionOrchestrator::new(
      Box::new(FixedProposer {
        available: false,
        boxes: Vec::new(),
      }),
      ModelDetector::unavailable(),
    )
  }

  fn request(urls: &[&str], options: CropOptions) -> JobRequest {
    JobRequest {
      image_urls: urls.iter().map(|u| u.to_string()).collect(),
      options,
      clear_previous: false,
    }
  }

  fn explicit(boxes: Vec<BoundingBox>) -> CropOptions {
    CropOptions {
      explicit_boxes: boxes,
      ..CropOptions::default()
    }
  }

  #[test]
  fn explicit_boxes_apply_to_every_image() {
    let source = source(&["mem://a", "mem://b"]);
    let detector = no_capabilities();
    let sink = RecordingSink::default();
    let report = JobRunner::new(&source, &detector, &sink)
      .run(&request(
        &["mem://a", "mem://b"],
        explicit(vec![BoundingBox::new(10, 10, 50, 50)]),
      ))
      .unwrap();

    assert_eq!(report.status, "success");
    assert_eq!(report.images_processed, 2);
    assert_eq!(report.saved_count, 2);
    let names: Vec<_> = report.saved_files.iter().map(|a| a.filename.as_str()).collect();
    assert_eq!(names, ["img1_001_crop_1.jpg", "img2_001_crop_1.jpg"]);
    assert_eq!(report.saved_files[1].source_image, "mem://b");
    assert_eq!(report.saved_files[1].image_index, 2);
    assert!(report.errors.is_empty());
    assert_eq!(report.output_dir, None);
  }

  #[test]
  fn failed_downloads_do_not_abort_job() {
    let source = source(&["mem://ok1", "mem://ok2"]);
    let detector = no_capabilities();
    let sink = RecordingSink::default();
    let urls = ["mem://ok1", "mem://missing1", "mem://ok2", "mem://missing2"];
    let report = JobRunner::new(&source, &detector, &sink)
      .run(&request(
        &urls,
        explicit(vec![BoundingBox::new(0, 0, 20, 20)]),
      ))
      .unwrap();

    assert_eq!(report.images_processed, 4);
    assert_eq!(report.saved_count, 2);
    assert_eq!(report.errors.len(), 2);
    assert!(report.errors[0].starts_with("Failed to download image 2 (mem://missing1)"));
    assert!(report.errors[1].starts_with("Failed to download image 4 (mem://missing2)"));
  }

  #[test]
  fn unavailable_capabilities_report_one_error_per_image() {
    let source = source(&["mem://a", "mem://b", "mem://c"]);
    let detector = no_capabilities();
    let sink = RecordingSink::default();
    let options = CropOptions {
      detect: true,
      ..CropOptions::default()
    };
    let report = JobRunner::new(&source, &detector, &sink)
      .run(&request(&["mem://a", "mem://b", "mem://c"], options))
      .unwrap();

    assert_eq!(report.status, "success");
    assert_eq!(report.saved_count, 0);
    assert_eq!(
      report.errors,
      [
        "No bounding boxes available for image 1",
        "No bounding boxes available for image 2",
        "No bounding boxes available for image 3",
      ]
    );
  }

  #[test]
  fn detected_boxes_are_cropped() {
    let source = source(&["mem://a"]);
    let detector = DetectionOrchestrator::new(
      Box::new(FixedProposer {
        available: false,
        boxes: Vec::new(),
      }),
      ModelDetector::new(Box::new(CountingModel {
        calls: Rc::new(Cell::new(0)),
        items: vec![
          item("dog", 0.9, [5.0, 5.0, 45.0, 35.0]),
          item("cat", 0.2, [50.0, 5.0, 90.0, 35.0]),
        ],
      })),
    );
    let sink = RecordingSink::default();
    let options = CropOptions {
      detect: true,
      confidence_threshold: 0.5,
      ..CropOptions::default()
    };
    let report = JobRunner::new(&source, &detector, &sink)
      .run(&request(&["mem://a"], options))
      .unwrap();

    assert_eq!(report.saved_count, 1);
    assert_eq!(report.saved_files[0].filename, "001_dog.jpg");
    assert_eq!(report.saved_files[0].bbox, BoundingBox::new(5, 5, 40, 30));
  }

  #[test]
  fn empty_detection_in_windows_mode() {
    let source = source(&["mem://a"]);
    let detector = DetectionOrchestrator::new(
      Box::new(FixedProposer {
        available: true,
        boxes: Vec::new(),
      }),
      ModelDetector::new(Box::new(CountingModel {
        calls: Rc::new(Cell::new(0)),
        items: Vec::new(),
      })),
    );
    let sink = RecordingSink::default();
    let options = CropOptions {
      detect: true,
      windows_only: true,
      ..CropOptions::default()
    };
    let report = JobRunner::new(&source, &detector, &sink)
      .run(&request(&["mem://a"], options))
      .unwrap();

    assert_eq!(report.errors, ["No objects detected in image 1 (no windows found)"]);
  }

  #[test]
  fn inference_failure_falls_back_to_explicit_boxes() {
    let source = source(&["mem://a"]);
    let detector = DetectionOrchestrator::new(
      Box::new(FixedProposer {
        available: false,
        boxes: Vec::new(),
      }),
      ModelDetector::new(Box::new(FailingModel)),
    );
    let sink = RecordingSink::default();
    let options = CropOptions {
      detect: true,
      explicit_boxes: vec![BoundingBox::new(0, 0, 10, 10).with_label("sign")],
      ..CropOptions::default()
    };
    let report = JobRunner::new(&source, &detector, &sink)
      .run(&request(&["mem://a"], options))
      .unwrap();

    assert_eq!(report.saved_count, 1);
    assert_eq!(report.saved_files[0].label, "sign");
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].starts_with("Detection failed for image 1"));
  }

  #[test]
  fn detection_failures_render_report_strings() {
    assert_eq!(
      ImageDetectError::NothingDetected {
        image: 2,
        windows_only: false
      }
      .to_string(),
      "No objects detected in image 2"
    );
    let failed = ImageDetectError::Failed {
      image: 3,
      source: DetectError::Model(ModelError::Inference("bad input".to_string())),
    };
    assert_eq!(
      failed.to_string(),
      "Detection failed for image 3: inference error: bad input"
    );
  }

  #[test]
  fn blank_explicit_label_is_named_by_position() {
    let source = source(&["mem://a"]);
    let detector = no_capabilities();
    let sink = RecordingSink::default();
    let report = JobRunner::new(&source, &detector, &sink)
      .run_request(CropRequest {
        image_url: Some("mem://a".to_string()),
        bounding_boxes: Some(vec![BoundingBox::new(0, 0, 10, 10).with_label("")]),
        clear_previous: false,
        ..CropRequest::default()
      })
      .unwrap();

    assert_eq!(report.saved_files[0].filename, "001_crop_1.jpg");
    assert_eq!(report.saved_files[0].label, "crop_1");
  }

  #[test]
  fn scratch_directory_is_reported_and_cleared() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("stale.jpg"), b"old").unwrap();

    let source = source(&["mem://a"]);
    let detector = no_capabilities();
    let sink = RecordingSink::default();
    let mut job = request(&["mem://a"], explicit(vec![BoundingBox::new(0, 0, 10, 10)]));
    job.clear_previous = true;
    let report = JobRunner::new(&source, &detector, &sink)
      .with_scratch_root(Some(root.path().to_path_buf()))
      .run(&job)
      .unwrap();

    assert!(!root.path().join("stale.jpg").exists());
    let output_dir = report.output_dir.unwrap();
    assert!(output_dir.ends_with(&report.job_id));
    let copy = Path::new(&output_dir).join("001_crop_1.jpg");
    assert!(copy.is_file());
    assert_eq!(report.saved_files[0].path, Some(copy.display().to_string()));
  }

  #[test]
  fn invalid_request_is_fatal() {
    let source = source(&[]);
    let detector = no_capabilities();
    let sink = RecordingSink::default();
    let runner = JobRunner::new(&source, &detector, &sink);

    assert!(matches!(
      runner.run_request(CropRequest::default()),
      Err(JobError::Request(RequestError::MissingImageUrl))
    ));
    assert!(matches!(
      runner.run(&request(&[], CropOptions::default())),
      Err(JobError::NoImages)
    ));
  }
}
