// 该文件是 Citodet （细胞检测） 项目的一部分。
// src/model.rs - 模型
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

use std::path::PathBuf;

use thiserror::Error;

mod detector;
mod device;
mod family;
mod label;
mod loader;
mod normalize;
pub mod postprocess;
#[cfg(feature = "torch")]
mod torch;

pub use self::detector::{
  Detector, DetectorHandle, RawOutput, TwoStageOutput, XyxyRows, YoloBox, YoloResult, YoloResults,
};
pub use self::device::Device;
pub use self::family::{FamilyKind, ModelFamily};
pub use self::label::{BethesdaLabel, CLASS_NAMES};
pub use self::loader::{
  BoxedDetector, LoaderConfig, ModelLoader, ModelProvider, NoBackendProvider, TwoStageArch,
  WEIGHTS_EXTENSION,
};
pub use self::normalize::{
  Normalizer, SingleStageResultsNormalizer, SingleStageRowsNormalizer, TWO_STAGE_SCORE_THRESHOLD,
  TwoStageNormalizer,
};
#[cfg(feature = "torch")]
pub use self::torch::TorchProvider;

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("Modelo '{0}' no soportado")]
  UnsupportedFamily(String),
  #[error("No se encontró el archivo de pesos en {}", .0.display())]
  WeightsNotFound(PathBuf),
  #[error("Índice de clase fuera de rango: {0}")]
  LabelOutOfRange(i64),
  #[error("Salida del modelo inválida: {0}")]
  InvalidOutput(String),
  #[error("Error del motor de inferencia: {0}")]
  Backend(String),
}

impl ModelError {
  pub fn invalid_output(msg: impl Into<String>) -> Self {
    ModelError::InvalidOutput(msg.into())
  }

  pub fn backend(msg: impl Into<String>) -> Self {
    ModelError::Backend(msg.into())
  }
}

pub trait WithLabel: Sized + std::fmt::Debug {
  fn to_label_str(&self) -> &'static str;
  fn to_label_id(&self) -> i64;
  fn from_label_id(id: i64) -> Option<Self>;
}

/// 类别索引，未经校验；解析为标签时才检查范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassIndex(pub i64);

impl ClassIndex {
  pub fn resolve<T: WithLabel>(self) -> Result<T, ModelError> {
    T::from_label_id(self.0).ok_or(ModelError::LabelOutOfRange(self.0))
  }
}

/// 源图像像素坐标下的边界框
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
  pub x1: i32,
  pub y1: i32,
  pub x2: i32,
  pub y2: i32,
}

impl BoundingBox {
  /// 浮点坐标向零截断
  pub fn from_xyxy(xyxy: [f32; 4]) -> Self {
    Self {
      x1: xyxy[0] as i32,
      y1: xyxy[1] as i32,
      x2: xyxy[2] as i32,
      y2: xyxy[3] as i32,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub bbox: BoundingBox,
  pub class: ClassIndex,
  pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabeledDetection<T = BethesdaLabel> {
  pub detection: Detection,
  pub label: T,
}

/// 四舍五入到两位小数
pub fn round_confidence(score: f32) -> f64 {
  (f64::from(score) * 100.0).round_ties_even() / 100.0
}

/// 为所有检测结果解析类别标签，任一索引越界即失败
pub fn resolve_labels<T: WithLabel>(
  detections: &[Detection],
) -> Result<Vec<LabeledDetection<T>>, ModelError> {
  detections
    .iter()
    .map(|detection| {
      Ok(LabeledDetection {
        label: detection.class.resolve()?,
        detection: detection.clone(),
      })
    })
    .collect()
}
