// 该文件是 Citodet （细胞检测） 项目的一部分。
// src/model/postprocess.rs - 单阶段模型的预处理与后处理
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

use image::{Rgb, RgbImage, imageops::FilterType};
use tracing::debug;

use crate::model::ModelError;

/// 单阶段模型的固定输入边长
pub const SINGLE_STAGE_INPUT_SIZE: u32 = 1024;
const LETTERBOX_FILL: u8 = 114;

/// 单阶段模型内部的过滤参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NmsConfig {
  pub conf_threshold: f32,
  pub iou_threshold: f32,
  pub max_det: usize,
}

impl NmsConfig {
  pub const YOLOV5: NmsConfig = NmsConfig {
    conf_threshold: 0.25,
    iou_threshold: 0.45,
    max_det: 1000,
  };

  pub const ULTRALYTICS: NmsConfig = NmsConfig {
    conf_threshold: 0.25,
    iou_threshold: 0.7,
    max_det: 300,
  };
}

/// 等比缩放并填充到正方形输入
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub scale: f32,
  pub pad_x: f32,
  pub pad_y: f32,
  pub size: u32,
  src_width: u32,
  src_height: u32,
}

impl Letterbox {
  pub fn new(src_width: u32, src_height: u32, size: u32) -> Self {
    let long_side = src_width.max(src_height).max(1) as f32;
    let scale = size as f32 / long_side;
    let new_w = ((src_width as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((src_height as f32 * scale).round() as u32).clamp(1, size);

    Self {
      scale,
      pad_x: (size - new_w) as f32 / 2.0,
      pad_y: (size - new_h) as f32 / 2.0,
      size,
      src_width,
      src_height,
    }
  }

  fn resized_dims(&self) -> (u32, u32) {
    (
      self.size - (self.pad_x * 2.0).round() as u32,
      self.size - (self.pad_y * 2.0).round() as u32,
    )
  }

  pub fn apply(&self, image: &RgbImage) -> RgbImage {
    let (new_w, new_h) = self.resized_dims();
    let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let mut canvas = RgbImage::from_pixel(self.size, self.size, Rgb([LETTERBOX_FILL; 3]));
    image::imageops::replace(
      &mut canvas,
      &resized,
      self.pad_x.floor() as i64,
      self.pad_y.floor() as i64,
    );
    canvas
  }

  /// 将输入空间的框映射回源图像并裁剪到图像范围
  pub fn restore(&self, xyxy: [f32; 4]) -> [f32; 4] {
    let (max_x, max_y) = (self.src_width as f32, self.src_height as f32);
    let pad_x = self.pad_x.floor();
    let pad_y = self.pad_y.floor();
    [
      ((xyxy[0] - pad_x) / self.scale).clamp(0.0, max_x),
      ((xyxy[1] - pad_y) / self.scale).clamp(0.0, max_y),
      ((xyxy[2] - pad_x) / self.scale).clamp(0.0, max_x),
      ((xyxy[3] - pad_y) / self.scale).clamp(0.0, max_y),
    ]
  }
}

/// 解码后、抑制前的候选框
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
  pub xyxy: [f32; 4],
  pub conf: f32,
  pub cls: usize,
}

fn cxcywh_to_xyxy(cx: f32, cy: f32, w: f32, h: f32) -> [f32; 4] {
  [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]
}

fn argmax(scores: impl Iterator<Item = f32>) -> Option<(usize, f32)> {
  scores
    .enumerate()
    .fold(None, |best, (idx, score)| match best {
      Some((_, best_score)) if best_score >= score => best,
      _ => Some((idx, score)),
    })
}

/// 解码按行排列的预测 [N, 5 + nc]：cx, cy, w, h, obj, 各类别分数
pub fn decode_objectness_rows(
  pred: &[f32],
  row_len: usize,
  conf_threshold: f32,
) -> Result<Vec<Candidate>, ModelError> {
  if row_len <= 5 || pred.len() % row_len != 0 {
    return Err(ModelError::invalid_output(format!(
      "预测长度 {} 与行长度 {} 不匹配",
      pred.len(),
      row_len
    )));
  }

  let mut candidates = Vec::new();
  for row in pred.chunks_exact(row_len) {
    let objectness = row[4];
    if objectness <= conf_threshold {
      continue;
    }

    let Some((cls, cls_score)) = argmax(row[5..].iter().copied()) else {
      continue;
    };
    let conf = objectness * cls_score;
    if conf <= conf_threshold {
      continue;
    }

    candidates.push(Candidate {
      xyxy: cxcywh_to_xyxy(row[0], row[1], row[2], row[3]),
      conf,
      cls,
    });
  }

  debug!("按行解码得到 {} 个候选框", candidates.len());
  Ok(candidates)
}

/// 解码通道优先的预测 [4 + nc, N]：前四个通道为 cx, cy, w, h
pub fn decode_channel_first(
  pred: &[f32],
  channels: usize,
  conf_threshold: f32,
) -> Result<Vec<Candidate>, ModelError> {
  if channels <= 4 || pred.len() % channels != 0 {
    return Err(ModelError::invalid_output(format!(
      "预测长度 {} 与通道数 {} 不匹配",
      pred.len(),
      channels
    )));
  }

  let anchors = pred.len() / channels;
  let at = |c: usize, a: usize| pred[c * anchors + a];

  let mut candidates = Vec::new();
  for a in 0..anchors {
    let Some((cls, conf)) = argmax((4..channels).map(|c| at(c, a))) else {
      continue;
    };
    if conf <= conf_threshold {
      continue;
    }

    candidates.push(Candidate {
      xyxy: cxcywh_to_xyxy(at(0, a), at(1, a), at(2, a), at(3, a)),
      conf,
      cls,
    });
  }

  debug!("按通道解码得到 {} 个候选框", candidates.len());
  Ok(candidates)
}

/// 计算两个边界框的 IoU
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 按类别的非极大值抑制，结果按置信度降序
pub fn non_max_suppression(
  mut candidates: Vec<Candidate>,
  iou_threshold: f32,
  max_det: usize,
) -> Vec<Candidate> {
  candidates.sort_by(|a, b| b.conf.total_cmp(&a.conf));

  let mut kept: Vec<Candidate> = Vec::new();
  for candidate in candidates {
    if kept.len() >= max_det {
      break;
    }
    let suppressed = kept
      .iter()
      .any(|k| k.cls == candidate.cls && iou(&k.xyxy, &candidate.xyxy) > iou_threshold);
    if !suppressed {
      kept.push(candidate);
    }
  }
  kept
}
