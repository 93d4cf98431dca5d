// 该文件是 Citodet （细胞检测） 项目的一部分。
// src/model/torch.rs - 基于 libtorch 的推理后端
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

use std::path::Path;

use image::RgbImage;
use tch::{CModule, IValue, Kind, Tensor};
use tracing::{debug, info};

use crate::model::{
  Detector, Device, ModelError, ModelFamily, TwoStageOutput, XyxyRows, YoloBox, YoloResult,
  YoloResults,
  loader::{BoxedDetector, ModelProvider, TwoStageArch},
  postprocess::{
    Letterbox, NmsConfig, SINGLE_STAGE_INPUT_SIZE, decode_channel_first, decode_objectness_rows,
    non_max_suppression,
  },
};

impl From<tch::TchError> for ModelError {
  fn from(err: tch::TchError) -> Self {
    ModelError::Backend(err.to_string())
  }
}

/// 加载 TorchScript 权重的提供者
///
/// 权重文件须为 `torch.jit.save` 导出的脚本模块：
/// - yolov5 返回 `[1, N, 5 + nc]` 原始预测；
/// - yolov8 / yolov12 返回 `[1, 4 + nc, N]` 原始预测；
/// - 两阶段模型为 torchvision 脚本化检测器，输入张量列表，输出 boxes/scores/labels 字典列表。
#[derive(Debug, Default, Clone, Copy)]
pub struct TorchProvider;

fn load_module(weights: &Path, device: Device) -> Result<CModule, ModelError> {
  info!("加载 TorchScript 模块: {}", weights.display());
  let now = std::time::Instant::now();
  let mut module = CModule::load_on_device(weights, device.into())?;
  module.set_eval();
  debug!("模块加载耗时: {:.2?}", now.elapsed());
  Ok(module)
}

impl ModelProvider for TorchProvider {
  fn single_stage_a(
    &self,
    weights: &Path,
    device: Device,
  ) -> Result<BoxedDetector<XyxyRows>, ModelError> {
    Ok(Box::new(TorchYolo {
      module: load_module(weights, device)?,
      device: device.into(),
      nms: NmsConfig::YOLOV5,
    }))
  }

  fn single_stage_b(
    &self,
    family: ModelFamily,
    weights: &Path,
    device: Device,
  ) -> Result<BoxedDetector<YoloResults>, ModelError> {
    debug!("{} 使用 ultralytics 输出格式", family);
    Ok(Box::new(TorchUltralytics(TorchYolo {
      module: load_module(weights, device)?,
      device: device.into(),
      nms: NmsConfig::ULTRALYTICS,
    })))
  }

  fn two_stage(
    &self,
    arch: TwoStageArch,
    weights: &Path,
    device: Device,
  ) -> Result<BoxedDetector<TwoStageOutput>, ModelError> {
    debug!("两阶段网络结构: {:?}", arch);
    Ok(Box::new(TorchTwoStage {
      module: load_module(weights, device)?,
      device: device.into(),
    }))
  }
}

/// HWC u8 图像转为 CHW 浮点张量，取值 [0, 1]
fn image_to_tensor(image: &RgbImage, device: tch::Device) -> Result<Tensor, ModelError> {
  let (w, h) = image.dimensions();
  let tensor = Tensor::f_from_slice(image.as_raw())?
    .f_view([h as i64, w as i64, 3])?
    .f_permute([2, 0, 1])?
    .f_to_kind(Kind::Float)?
    .f_to_device(device)?;
  Ok(tensor / 255.0)
}

fn tensor_to_vec(tensor: &Tensor) -> Result<Vec<f32>, ModelError> {
  let flat = tensor
    .f_to_device(tch::Device::Cpu)?
    .f_to_kind(Kind::Float)?
    .f_contiguous()?
    .f_flatten(0, -1)?;
  Ok(Vec::<f32>::try_from(&flat)?)
}

/// 取脚本模块输出中的第一个张量
fn first_tensor(output: IValue) -> Result<Tensor, ModelError> {
  match output {
    IValue::Tensor(t) => Ok(t),
    IValue::Tuple(items) | IValue::GenericList(items) => items
      .into_iter()
      .next()
      .ok_or_else(|| ModelError::invalid_output("salida vacía"))
      .and_then(first_tensor),
    IValue::TensorList(tensors) => tensors
      .into_iter()
      .next()
      .ok_or_else(|| ModelError::invalid_output("lista de tensores vacía")),
    _ => Err(ModelError::invalid_output("se esperaba un tensor")),
  }
}

struct TorchYolo {
  module: CModule,
  device: tch::Device,
  nms: NmsConfig,
}

impl TorchYolo {
  /// 返回批次中第一张图像的预测与其形状（去掉批维度）
  fn forward(&self, image: &RgbImage) -> Result<(Letterbox, Vec<f32>, Vec<i64>), ModelError> {
    let letterbox = Letterbox::new(image.width(), image.height(), SINGLE_STAGE_INPUT_SIZE);
    let input = image_to_tensor(&letterbox.apply(image), self.device)?.f_unsqueeze(0)?;

    let now = std::time::Instant::now();
    let output = tch::no_grad(|| self.module.forward_is(&[IValue::Tensor(input)]))?;
    debug!("前向推理耗时: {:.2?}", now.elapsed());

    let pred = first_tensor(output)?;
    let shape = pred.size();
    if shape.len() != 3 || shape[0] < 1 {
      return Err(ModelError::invalid_output(format!(
        "forma de predicción inesperada: {:?}",
        shape
      )));
    }
    let first = pred.f_get(0)?;
    Ok((letterbox, tensor_to_vec(&first)?, shape[1..].to_vec()))
  }
}

impl Detector for TorchYolo {
  type Raw = XyxyRows;

  fn run(&self, image: &RgbImage) -> Result<XyxyRows, ModelError> {
    let (letterbox, pred, shape) = self.forward(image)?;
    let candidates = decode_objectness_rows(&pred, shape[1] as usize, self.nms.conf_threshold)?;
    let kept = non_max_suppression(candidates, self.nms.iou_threshold, self.nms.max_det);

    let rows = kept
      .into_iter()
      .map(|c| {
        let [x1, y1, x2, y2] = letterbox.restore(c.xyxy);
        [x1, y1, x2, y2, c.conf, c.cls as f32]
      })
      .collect();
    Ok(XyxyRows { rows })
  }
}

struct TorchUltralytics(TorchYolo);

impl Detector for TorchUltralytics {
  type Raw = YoloResults;

  fn run(&self, image: &RgbImage) -> Result<YoloResults, ModelError> {
    let (letterbox, pred, shape) = self.0.forward(image)?;
    let nms = self.0.nms;
    let candidates = decode_channel_first(&pred, shape[0] as usize, nms.conf_threshold)?;
    let kept = non_max_suppression(candidates, nms.iou_threshold, nms.max_det);

    let boxes = kept
      .into_iter()
      .map(|c| YoloBox {
        cls: c.cls as f32,
        conf: c.conf,
        xyxy: letterbox.restore(c.xyxy),
      })
      .collect();
    Ok(YoloResults {
      results: vec![YoloResult { boxes }],
    })
  }
}

struct TorchTwoStage {
  module: CModule,
  device: tch::Device,
}

/// 脚本化的 torchvision 检测器返回 (losses, detections) 或直接返回 detections
fn detections_list(output: IValue) -> Result<Vec<IValue>, ModelError> {
  match output {
    IValue::Tuple(mut items) if items.len() == 2 => match items.pop() {
      Some(IValue::GenericList(list)) => Ok(list),
      _ => Err(ModelError::invalid_output("tupla de salida sin lista de detecciones")),
    },
    IValue::GenericList(list) => Ok(list),
    _ => Err(ModelError::invalid_output("salida de detector de dos etapas inesperada")),
  }
}

fn dict_tensor<'a>(entries: &'a [(IValue, IValue)], key: &str) -> Result<&'a Tensor, ModelError> {
  entries
    .iter()
    .find_map(|(k, v)| match (k, v) {
      (IValue::String(name), IValue::Tensor(t)) if name == key => Some(t),
      _ => None,
    })
    .ok_or_else(|| ModelError::invalid_output(format!("falta la clave '{}'", key)))
}

impl Detector for TorchTwoStage {
  type Raw = TwoStageOutput;

  fn run(&self, image: &RgbImage) -> Result<TwoStageOutput, ModelError> {
    let input = image_to_tensor(image, self.device)?;

    let now = std::time::Instant::now();
    let output = tch::no_grad(|| {
      self
        .module
        .forward_is(&[IValue::TensorList(vec![input])])
    })?;
    debug!("前向推理耗时: {:.2?}", now.elapsed());

    let Some(IValue::GenericDict(entries)) = detections_list(output)?.into_iter().next() else {
      return Err(ModelError::invalid_output("sin resultados para la imagen"));
    };

    let boxes = tensor_to_vec(dict_tensor(&entries, "boxes")?)?;
    let scores = tensor_to_vec(dict_tensor(&entries, "scores")?)?;
    let labels = Vec::<i64>::try_from(
      &dict_tensor(&entries, "labels")?
        .f_to_device(tch::Device::Cpu)?
        .f_to_kind(Kind::Int64)?
        .f_flatten(0, -1)?,
    )?;

    if boxes.len() != scores.len() * 4 {
      return Err(ModelError::invalid_output(format!(
        "{} coordenadas para {} puntuaciones",
        boxes.len(),
        scores.len()
      )));
    }

    Ok(TwoStageOutput {
      boxes: boxes
        .chunks_exact(4)
        .map(|c| [c[0], c[1], c[2], c[3]])
        .collect(),
      scores,
      labels,
    })
  }
}
