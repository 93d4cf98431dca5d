// 该文件是 Citodet （细胞检测） 项目的一部分。
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

use std::io::Write;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, error::ErrorKind};
use tracing::{error, info, warn};

use citodet::{
  model::{Device, LoaderConfig, ModelLoader, ModelProvider},
  output::Report,
  task::{OneShotTask, PipelineError},
};

use args::Args;

fn run<P: ModelProvider>(args: &Args, device: Device, provider: P) -> Report {
  let config = LoaderConfig::default()
    .weights_dir(args.weights_dir.clone())
    .device(device);
  let mut task = OneShotTask::new(ModelLoader::new(config, provider));
  task
    .run_task(&args.image_path, &args.model)
    .unwrap_or_else(Report::error)
}

fn emit(report: &Report) -> anyhow::Result<()> {
  let json = report.to_json().context("无法序列化结果")?;
  let mut stdout = std::io::stdout().lock();
  writeln!(stdout, "{}", json).context("无法写入标准输出")?;
  Ok(())
}

fn main() -> ExitCode {
  let report = match Args::try_parse() {
    Ok(args) => {
      tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .with_writer(std::io::stderr)
        .init();

      info!("图像: {}", args.image_path.display());
      info!("模型: {}", args.model);
      info!("权重目录: {}", args.weights_dir.display());
      if !args.rest.is_empty() {
        warn!("忽略多余参数: {:?}", args.rest);
      }

      let device = Device::select(args.cpu);
      info!("推理设备: {}", device);

      #[cfg(feature = "torch")]
      let provider = citodet::model::TorchProvider;
      #[cfg(not(feature = "torch"))]
      let provider = citodet::model::NoBackendProvider;

      run(&args, device, provider)
    }
    Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
      err.exit()
    }
    Err(_) => Report::error(PipelineError::Usage),
  };

  if let Err(e) = emit(&report) {
    error!("{:#}", e);
    return ExitCode::FAILURE;
  }

  if report.is_error() {
    ExitCode::FAILURE
  } else {
    ExitCode::SUCCESS
  }
}
