// 该文件是 Citodet （细胞检测） 项目的一部分。
// src/model/detector.rs - 检测器能力与句柄
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

use image::RgbImage;
use tracing::debug;

use crate::model::{Detection, Device, ModelError, ModelFamily, Normalizer};

/// 单阶段 A 的原始输出，每行 [x1, y1, x2, y2, conf, cls]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XyxyRows {
  pub rows: Vec<[f32; 6]>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoloBox {
  pub cls: f32,
  pub conf: f32,
  pub xyxy: [f32; 4],
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct YoloResult {
  pub boxes: Vec<YoloBox>,
}

/// 单阶段 B 的原始输出
#[derive(Debug, Clone, Default, PartialEq)]
pub struct YoloResults {
  pub results: Vec<YoloResult>,
}

/// 两阶段模型的原始输出，三个序列按位置对应，未经置信度过滤
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TwoStageOutput {
  pub boxes: Vec<[f32; 4]>,
  pub scores: Vec<f32>,
  pub labels: Vec<i64>,
}

/// 检测器能力：对单张图像推理，返回模型族特有的原始输出
pub trait Detector {
  type Raw;

  fn run(&self, image: &RgbImage) -> Result<Self::Raw, ModelError>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
  type Raw = D::Raw;

  fn run(&self, image: &RgbImage) -> Result<Self::Raw, ModelError> {
    (**self).run(image)
  }
}

trait PendingNormalize {
  fn normalize(&self) -> Vec<Detection>;
}

struct Pending<R, N> {
  raw: R,
  normalizer: N,
}

impl<R, N: Normalizer<Raw = R>> PendingNormalize for Pending<R, N> {
  fn normalize(&self) -> Vec<Detection> {
    self.normalizer.normalize(&self.raw)
  }
}

/// 推理得到的原始输出，仅能交由其配对的归一化器处理
pub struct RawOutput {
  family: ModelFamily,
  inner: Box<dyn PendingNormalize>,
}

impl RawOutput {
  pub fn family(&self) -> ModelFamily {
    self.family
  }

  /// 按模型输出顺序生成检测结果，可重复调用
  pub fn normalize(&self) -> Vec<Detection> {
    self.inner.normalize()
  }
}

trait ErasedDetector {
  fn run_erased(&self, family: ModelFamily, image: &RgbImage) -> Result<RawOutput, ModelError>;
}

struct Paired<D, N> {
  detector: D,
  normalizer: N,
}

impl<D, N> ErasedDetector for Paired<D, N>
where
  D: Detector,
  D::Raw: 'static,
  N: Normalizer<Raw = D::Raw> + Clone + 'static,
{
  fn run_erased(&self, family: ModelFamily, image: &RgbImage) -> Result<RawOutput, ModelError> {
    let raw = self.detector.run(image)?;
    Ok(RawOutput {
      family,
      inner: Box::new(Pending {
        raw,
        normalizer: self.normalizer.clone(),
      }),
    })
  }
}

/// 已加载的检测器，只暴露 run
pub struct DetectorHandle {
  family: ModelFamily,
  device: Device,
  inner: Box<dyn ErasedDetector>,
}

impl DetectorHandle {
  pub fn new<D, N>(family: ModelFamily, device: Device, detector: D, normalizer: N) -> Self
  where
    D: Detector + 'static,
    D::Raw: 'static,
    N: Normalizer<Raw = D::Raw> + Clone + 'static,
  {
    Self {
      family,
      device,
      inner: Box::new(Paired {
        detector,
        normalizer,
      }),
    }
  }

  pub fn family(&self) -> ModelFamily {
    self.family
  }

  pub fn device(&self) -> Device {
    self.device
  }

  pub fn run(&self, image: &RgbImage) -> Result<RawOutput, ModelError> {
    debug!(
      "{} 在 {} 上推理 {}x{} 图像",
      self.family,
      self.device,
      image.width(),
      image.height()
    );
    self.inner.run_erased(self.family, image)
  }
}
