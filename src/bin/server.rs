// 该文件是 Kuangqu （框取） 项目的一部分。
// src/bin/server.rs - HTTP 服务程序
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

use std::{net::SocketAddr, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use url::Url;

use kuangqu::{
  config::Settings,
  server::{AppState, create_router},
};

/// Kuangqu HTTP 服务
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 监听地址
  #[arg(long, value_name = "ADDR", default_value = "0.0.0.0:8000")]
  pub listen: SocketAddr,
  /// 本地副本根目录，覆盖 OUTPUT_DIR
  #[arg(long, value_name = "DIR")]
  pub output_dir: Option<PathBuf>,
  /// 不写本地副本
  #[arg(long)]
  pub no_scratch: bool,
  /// 检测模型，例如 yolov8:///models/yolov8n.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Option<Url>,
}

#[tokio::main]
async fn main() -> Result<()> {
  dotenvy::dotenv().ok();
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let mut settings = Settings::from_env();
  if let Some(dir) = args.output_dir {
    settings.output_dir = dir;
  }
  if let Some(model) = args.model {
    settings.model = Some(model);
  }

  info!("输出目录: {}", settings.output_dir.display());
  info!("远程图床: {} 个", settings.stores.len());
  let mut state = AppState::new(settings);
  if args.no_scratch {
    state = state.without_scratch();
  }

  let listener = tokio::net::TcpListener::bind(args.listen)
    .await
    .with_context(|| format!("无法监听 {}", args.listen))?;
  info!("监听 {}", args.listen);
  axum::serve(listener, create_router(state))
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("服务异常退出")?;

  info!("服务已停止");
  Ok(())
}

async fn shutdown_signal() {
  if tokio::signal::ctrl_c().await.is_ok() {
    info!("收到退出信号");
  }
}
