// 该文件是 Citodet （细胞检测） 项目的一部分。
// src/model/family.rs - 模型族定义
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

use std::{fmt, str::FromStr};

use crate::model::ModelError;

/// 支持的模型族，标签即权重文件名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFamily {
  Yolov5,
  Yolov8,
  Yolov12,
  FasterRcnn,
  RetinaNet,
}

/// 模型族的接口形态，决定检测器变体与归一化适配器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FamilyKind {
  /// 整图检测，输出 (x1, y1, x2, y2, conf, cls) 行
  SingleStageA,
  /// predict 接口，输出带 boxes 的结果对象
  SingleStageB,
  /// 候选区域两阶段检测
  TwoStageProposal,
  /// 锚框检测，标签空间偏移一位
  TwoStageAnchor,
}

impl ModelFamily {
  pub const ALL: [ModelFamily; 5] = [
    ModelFamily::Yolov5,
    ModelFamily::Yolov8,
    ModelFamily::Yolov12,
    ModelFamily::FasterRcnn,
    ModelFamily::RetinaNet,
  ];

  pub fn tag(self) -> &'static str {
    match self {
      ModelFamily::Yolov5 => "yolov5",
      ModelFamily::Yolov8 => "yolov8",
      ModelFamily::Yolov12 => "yolov12",
      ModelFamily::FasterRcnn => "fasterrcnn",
      ModelFamily::RetinaNet => "retinanet",
    }
  }

  pub fn kind(self) -> FamilyKind {
    match self {
      ModelFamily::Yolov5 => FamilyKind::SingleStageA,
      ModelFamily::Yolov8 | ModelFamily::Yolov12 => FamilyKind::SingleStageB,
      ModelFamily::FasterRcnn => FamilyKind::TwoStageProposal,
      ModelFamily::RetinaNet => FamilyKind::TwoStageAnchor,
    }
  }

  /// 原始标签减去该值得到类别索引
  pub fn label_offset(self) -> i64 {
    match self {
      ModelFamily::RetinaNet => 1,
      _ => 0,
    }
  }
}

impl FromStr for ModelFamily {
  type Err = ModelError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let tag = s.to_lowercase();
    Self::ALL
      .into_iter()
      .find(|family| family.tag() == tag)
      .ok_or(ModelError::UnsupportedFamily(tag))
  }
}

impl fmt::Display for ModelFamily {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.tag())
  }
}
