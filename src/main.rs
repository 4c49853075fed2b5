// 该文件是 Kuangqu （框取） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use kuangqu::{
  config::Settings,
  input::{HttpImageSource, InputWrapper},
  job::JobRunner,
};

fn main() -> Result<()> {
  dotenvy::dotenv().ok();
  tracing_subscriber::fmt().with_writer(std::io::stderr).init();

  let args = args::Args::parse();
  let mut settings = Settings::from_env();
  args.apply(&mut settings);
  let request = args.crop_request()?;

  info!("输出目录: {}", settings.output_dir.display());
  if let Some(model) = &settings.model {
    info!("检测模型: {}", model);
  }

  let source = InputWrapper::new(HttpImageSource::new());
  let detector = settings.detector();
  info!(
    "检测能力: 轮廓={} 模型={}",
    detector.primitive_available(),
    detector.model_available()
  );
  let sink = settings.sink();

  let scratch_root = (!args.no_scratch).then(|| settings.output_dir.clone());
  let report = JobRunner::new(&source, &detector, &sink)
    .with_scratch_root(scratch_root)
    .with_download_timeout(settings.download_timeout)
    .run_request(request)?;

  println!("{}", serde_json::to_string_pretty(&report)?);
  Ok(())
}
