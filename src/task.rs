// 该文件是 Citodet （细胞检测） 项目的一部分。
// src/task.rs - 单次检测任务
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

use std::{fmt, path::Path};

use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
  input::{ImageFileInput, InputError},
  model::{BethesdaLabel, ModelError, ModelLoader, ModelProvider, resolve_labels},
  output::{OutputError, Render, Report, SaveImageFileOutput},
};

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("Uso: citodet <image_path> <model_type>")]
  Usage,
  #[error(transparent)]
  Model(#[from] ModelError),
  #[error(transparent)]
  Input(#[from] InputError),
  #[error(transparent)]
  Output(#[from] OutputError),
}

/// 单次调用的阶段，严格顺序推进，任何失败进入 Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
  #[default]
  Idle,
  Loading,
  Ready,
  Inferring,
  Normalizing,
  AnnotatingAndReporting,
  Done,
  Failed,
}

impl fmt::Display for PipelineState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      PipelineState::Idle => "idle",
      PipelineState::Loading => "loading",
      PipelineState::Ready => "ready",
      PipelineState::Inferring => "inferring",
      PipelineState::Normalizing => "normalizing",
      PipelineState::AnnotatingAndReporting => "annotating",
      PipelineState::Done => "done",
      PipelineState::Failed => "failed",
    };
    f.write_str(name)
  }
}

/// 加载 → 推理 → 归一化 → 标注与报告，一次调用只处理一张图像
pub struct OneShotTask<P> {
  loader: ModelLoader<P>,
  state: PipelineState,
}

impl<P: ModelProvider> OneShotTask<P> {
  pub fn new(loader: ModelLoader<P>) -> Self {
    Self {
      loader,
      state: PipelineState::Idle,
    }
  }

  pub fn state(&self) -> PipelineState {
    self.state
  }

  fn enter(&mut self, next: PipelineState) {
    debug!("{} -> {}", self.state, next);
    self.state = next;
  }

  pub fn run_task(&mut self, image_path: &Path, model_tag: &str) -> Result<Report, PipelineError> {
    let result = self.run_stages(image_path, model_tag);
    match &result {
      Ok(_) => self.enter(PipelineState::Done),
      Err(e) => {
        error!("任务在 {} 阶段失败: {}", self.state, e);
        self.enter(PipelineState::Failed);
      }
    }
    result
  }

  fn run_stages(&mut self, image_path: &Path, model_tag: &str) -> Result<Report, PipelineError> {
    info!("开始任务...");
    self.enter(PipelineState::Loading);
    let now = std::time::Instant::now();
    let handle = self.loader.load(model_tag)?;
    info!("模型加载完成，耗时: {:.2?}", now.elapsed());
    self.enter(PipelineState::Ready);

    self.enter(PipelineState::Inferring);
    let input = ImageFileInput::open(image_path)?;
    let now = std::time::Instant::now();
    let raw = handle.run(input.image())?;
    info!("推理完成 ({})，耗时: {:.2?}", handle.device(), now.elapsed());

    self.enter(PipelineState::Normalizing);
    let detections = raw.normalize();
    let labeled = resolve_labels::<BethesdaLabel>(&detections)?;
    info!("{} 检测到 {} 个目标", raw.family(), labeled.len());

    // 报告先于图像写出构建，标签解析失败时不产生输出图像
    self.enter(PipelineState::AnnotatingAndReporting);
    let report = Report::from_detections(&labeled);
    let now = std::time::Instant::now();
    let output = SaveImageFileOutput::beside(input.path())?;
    output.render_result(input.image(), &labeled)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(report)
  }
}
