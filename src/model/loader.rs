// 该文件是 Citodet （细胞检测） 项目的一部分。
// src/model/loader.rs - 模型加载
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

use tracing::{debug, error, info};

use crate::model::{
  Detector, DetectorHandle, Device, FamilyKind, ModelError, ModelFamily,
  SingleStageResultsNormalizer, SingleStageRowsNormalizer, TwoStageNormalizer, TwoStageOutput,
  XyxyRows, YoloResults,
};

pub const WEIGHTS_EXTENSION: &str = "pt";
const DEFAULT_WEIGHTS_DIR: &str = "weights";

/// 两阶段模型的网络结构
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoStageArch {
  FasterRcnnResnet50Fpn,
  RetinaNetResnet50Fpn,
}

pub type BoxedDetector<R> = Box<dyn Detector<Raw = R>>;

/// 构建各模型族的推理后端：创建网络、载入权重、切换到推理模式并放置到设备上
pub trait ModelProvider {
  fn single_stage_a(
    &self,
    weights: &Path,
    device: Device,
  ) -> Result<BoxedDetector<XyxyRows>, ModelError>;

  fn single_stage_b(
    &self,
    family: ModelFamily,
    weights: &Path,
    device: Device,
  ) -> Result<BoxedDetector<YoloResults>, ModelError>;

  fn two_stage(
    &self,
    arch: TwoStageArch,
    weights: &Path,
    device: Device,
  ) -> Result<BoxedDetector<TwoStageOutput>, ModelError>;
}

/// 未编译任何推理后端时使用
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBackendProvider;

impl NoBackendProvider {
  fn unavailable<R: 'static>(family: &str) -> Result<BoxedDetector<R>, ModelError> {
    Err(ModelError::backend(format!(
      "no hay motor de inferencia compilado para '{}' (activar la característica 'torch')",
      family
    )))
  }
}

impl ModelProvider for NoBackendProvider {
  fn single_stage_a(&self, _: &Path, _: Device) -> Result<BoxedDetector<XyxyRows>, ModelError> {
    Self::unavailable(ModelFamily::Yolov5.tag())
  }

  fn single_stage_b(
    &self,
    family: ModelFamily,
    _: &Path,
    _: Device,
  ) -> Result<BoxedDetector<YoloResults>, ModelError> {
    Self::unavailable(family.tag())
  }

  fn two_stage(
    &self,
    arch: TwoStageArch,
    _: &Path,
    _: Device,
  ) -> Result<BoxedDetector<TwoStageOutput>, ModelError> {
    let family = match arch {
      TwoStageArch::FasterRcnnResnet50Fpn => ModelFamily::FasterRcnn,
      TwoStageArch::RetinaNetResnet50Fpn => ModelFamily::RetinaNet,
    };
    Self::unavailable(family.tag())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
  pub weights_dir: PathBuf,
  pub device: Device,
}

impl Default for LoaderConfig {
  fn default() -> Self {
    Self {
      weights_dir: PathBuf::from(DEFAULT_WEIGHTS_DIR),
      device: Device::Cpu,
    }
  }
}

impl LoaderConfig {
  pub fn weights_dir(mut self, weights_dir: impl Into<PathBuf>) -> Self {
    self.weights_dir = weights_dir.into();
    self
  }

  pub fn device(mut self, device: Device) -> Self {
    self.device = device;
    self
  }

  pub fn weights_path(&self, tag: &str) -> PathBuf {
    self
      .weights_dir
      .join(format!("{}.{}", tag, WEIGHTS_EXTENSION))
  }
}

pub struct ModelLoader<P> {
  config: LoaderConfig,
  provider: P,
}

impl<P: ModelProvider> ModelLoader<P> {
  pub fn new(config: LoaderConfig, provider: P) -> Self {
    Self { config, provider }
  }

  /// 按模型族标签加载检测器
  pub fn load(&self, tag: &str) -> Result<DetectorHandle, ModelError> {
    let family: ModelFamily = tag.parse().inspect_err(|e| error!("{}", e))?;

    let weights = self.config.weights_path(family.tag());
    if !weights.is_file() {
      error!("权重文件不存在: {}", weights.display());
      return Err(ModelError::WeightsNotFound(weights));
    }

    let device = self.config.device;
    info!("加载 {} 模型: {} ({})", family, weights.display(), device);
    let offset = family.label_offset();

    let handle = match family.kind() {
      FamilyKind::SingleStageA => {
        let detector = self.provider.single_stage_a(&weights, device)?;
        DetectorHandle::new(
          family,
          device,
          detector,
          SingleStageRowsNormalizer::new(offset),
        )
      }
      FamilyKind::SingleStageB => {
        let detector = self.provider.single_stage_b(family, &weights, device)?;
        DetectorHandle::new(
          family,
          device,
          detector,
          SingleStageResultsNormalizer::new(offset),
        )
      }
      FamilyKind::TwoStageProposal => {
        let detector =
          self
            .provider
            .two_stage(TwoStageArch::FasterRcnnResnet50Fpn, &weights, device)?;
        DetectorHandle::new(family, device, detector, TwoStageNormalizer::new(offset))
      }
      FamilyKind::TwoStageAnchor => {
        let detector =
          self
            .provider
            .two_stage(TwoStageArch::RetinaNetResnet50Fpn, &weights, device)?;
        DetectorHandle::new(family, device, detector, TwoStageNormalizer::new(offset))
      }
    };

    debug!("{} 模型加载完成", family);
    Ok(handle)
  }
}
